#![warn(missing_docs)]
//! Script-facing scheduling for the tabletop host.
//!
//! [`Wait`] lets script code defer work until a predicate holds, a number of
//! frames pass, or a delay elapses (optionally repeating), and cancel any of
//! it by id. Everything runs on the host's tick thread: the host calls
//! [`Wait::on_tick`] (or [`ScriptContext::on_tick`]) once per simulation step
//! and ready callbacks run inside that call.
//!
//! Scheduled tasks are not persisted. Scripts re-register after a reload.

mod config;
mod error;
mod evaluator;
mod registry;
mod task;
mod wait;

use anyhow::Result;
use tabletop_core::ClockReading;

pub use config::WaitConfig;
pub use error::{CallbackFault, CallbackRole, WaitError};
pub use evaluator::TickReport;
pub use task::{Repetitions, Step, TaskId, TaskKind, Timeout};
pub use wait::{Wait, WeakWait};

/// A script context invoked each tick.
pub trait ScriptContext {
    /// Called once per host step with the current clock reading.
    fn on_tick(&mut self, reading: ClockReading) -> Result<()>;
}

impl ScriptContext for Wait {
    fn on_tick(&mut self, reading: ClockReading) -> Result<()> {
        // Callback faults are isolated and logged by the scheduler itself.
        self.on_reading(reading);
        Ok(())
    }
}
