//! Clock sources.
//!
//! The host supplies one [`ClockReading`] per simulation step: the frame
//! counter and the wall-clock seconds elapsed since the previous step. Anything
//! that needs time (the `Wait` scheduler in particular) consumes readings and
//! never queries the system clock on its own, so tests can substitute a
//! deterministic clock.

use crate::{seconds_per_tick, SimTick, DEFAULT_TICKS_PER_SECOND};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// A single tick as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClockReading {
    /// Frame number for this step.
    pub frame: SimTick,
    /// Seconds elapsed since the previous step.
    pub elapsed_seconds: f64,
}

impl ClockReading {
    /// Build a reading.
    pub fn new(frame: SimTick, elapsed_seconds: f64) -> Self {
        Self {
            frame,
            elapsed_seconds,
        }
    }
}

/// Supplies readings once per host step.
pub trait ClockSource {
    /// Advance the clock by one step and return the new reading.
    fn tick(&mut self) -> ClockReading;

    /// Frame number of the most recent reading.
    fn frame(&self) -> SimTick;
}

/// Deterministic clock advancing by a constant delta every tick.
#[derive(Debug, Clone)]
pub struct FixedStepClock {
    frame: SimTick,
    step_seconds: f64,
}

impl FixedStepClock {
    /// Clock running at `ticks_per_second`.
    pub fn new(ticks_per_second: u32) -> Self {
        Self::with_step(seconds_per_tick(ticks_per_second))
    }

    /// Clock advancing by exactly `step_seconds` per tick.
    pub fn with_step(step_seconds: f64) -> Self {
        Self {
            frame: SimTick::ZERO,
            step_seconds: step_seconds.max(0.0),
        }
    }

    /// Seconds added per tick.
    pub fn step_seconds(&self) -> f64 {
        self.step_seconds
    }
}

impl Default for FixedStepClock {
    fn default() -> Self {
        Self::new(DEFAULT_TICKS_PER_SECOND)
    }
}

impl ClockSource for FixedStepClock {
    fn tick(&mut self) -> ClockReading {
        self.frame = self.frame.advance(1);
        ClockReading::new(self.frame, self.step_seconds)
    }

    fn frame(&self) -> SimTick {
        self.frame
    }
}

/// Clock measuring real elapsed time between calls to [`ClockSource::tick`].
#[derive(Debug, Clone)]
pub struct WallClock {
    frame: SimTick,
    last: Instant,
}

impl WallClock {
    /// Start measuring from now.
    pub fn start() -> Self {
        Self {
            frame: SimTick::ZERO,
            last: Instant::now(),
        }
    }
}

impl ClockSource for WallClock {
    fn tick(&mut self) -> ClockReading {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        self.last = now;
        self.frame = self.frame.advance(1);
        ClockReading::new(self.frame, elapsed)
    }

    fn frame(&self) -> SimTick {
        self.frame
    }
}
