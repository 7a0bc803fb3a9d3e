//! Hand-driven clock for tests.

use std::collections::VecDeque;
use tabletop_core::{ClockReading, ClockSource, SimTick};

/// Clock whose per-tick delta is chosen by the test.
///
/// Queued deltas are consumed first; once the queue is empty every tick uses
/// the default delta.
#[derive(Debug, Clone)]
pub struct ManualClock {
    frame: SimTick,
    default_delta: f64,
    queued: VecDeque<f64>,
}

impl ManualClock {
    /// Clock that advances by `default_delta` seconds per tick.
    pub fn new(default_delta: f64) -> Self {
        Self {
            frame: SimTick::ZERO,
            default_delta,
            queued: VecDeque::new(),
        }
    }

    /// Use `delta` for the next unqueued tick.
    pub fn queue(&mut self, delta: f64) -> &mut Self {
        self.queued.push_back(delta);
        self
    }

    /// Queue several deltas in order.
    pub fn queue_all<I: IntoIterator<Item = f64>>(&mut self, deltas: I) -> &mut Self {
        self.queued.extend(deltas);
        self
    }

    /// Change the delta used once the queue is drained.
    pub fn set_default_delta(&mut self, delta: f64) {
        self.default_delta = delta;
    }
}

impl ClockSource for ManualClock {
    fn tick(&mut self) -> ClockReading {
        self.frame = self.frame.advance(1);
        let delta = self.queued.pop_front().unwrap_or(self.default_delta);
        ClockReading::new(self.frame, delta)
    }

    fn frame(&self) -> SimTick {
        self.frame
    }
}
