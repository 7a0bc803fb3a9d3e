#![warn(missing_docs)]
//! Deterministic testing surfaces: a hand-driven clock, a tick harness around
//! `Wait`, and a JSONL event stream.

mod clock;
mod harness;

use anyhow::Result;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tabletop_core::SimTick;

pub use clock::ManualClock;
pub use harness::{FireLog, TickHarness};

/// Event record written by headless runs.
#[derive(Debug, Serialize)]
pub struct EventRecord<'a> {
    /// Simulation tick when the event occurred.
    pub tick: SimTick,
    /// Event kind (`fired`, `timed_out`, `stopped`, `fault`, ...).
    pub kind: &'a str,
    /// Script label of the task involved.
    pub label: &'a str,
    /// Scheduler id of the task involved, if it had one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<u64>,
}

/// A sink that writes newline-delimited JSON to disk.
pub struct JsonlSink {
    file: File,
    written: usize,
}

impl JsonlSink {
    /// Create a new sink at `path`, creating parent dirs if needed.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Self { file, written: 0 })
    }

    /// Append an event to the log.
    pub fn write(&mut self, event: &EventRecord<'_>) -> Result<()> {
        let line = serde_json::to_string(event)?;
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// Number of records written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush buffered output.
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}
