#![warn(missing_docs)]
//! Core primitives shared across the workspace: simulation ticks and the
//! clock sources that drive them.

pub mod clock;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use clock::{ClockReading, ClockSource, FixedStepClock, WallClock};

/// Default host simulation rate (20 TPS => 50 ms per tick).
pub const DEFAULT_TICKS_PER_SECOND: u32 = 20;

/// Monotonic host frame counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimTick(pub u64);

impl SimTick {
    /// First tick in any deterministic timeline.
    pub const ZERO: Self = Self(0);

    /// Advance by `delta` ticks.
    pub fn advance(self, delta: u64) -> Self {
        Self(self.0.saturating_add(delta))
    }

    /// Number of ticks from `earlier` to `self` (zero if `earlier` is ahead).
    pub fn since(self, earlier: SimTick) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for SimTick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Seconds per tick for a fixed tick rate.
///
/// A rate of zero is treated as one tick per second.
pub fn seconds_per_tick(ticks_per_second: u32) -> f64 {
    1.0 / f64::from(ticks_per_second.max(1))
}
