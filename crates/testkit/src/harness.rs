//! Tick harness around a `Wait` scheduler.

use crate::clock::ManualClock;
use std::cell::RefCell;
use std::rc::Rc;
use tabletop_core::SimTick;
use tabletop_scripting::{TickReport, Wait, WaitConfig, WeakWait};

/// Drives a [`Wait`] with a [`ManualClock`], one tick at a time.
pub struct TickHarness {
    wait: Wait,
    clock: ManualClock,
}

impl TickHarness {
    /// Harness whose ticks advance by `delta` seconds by default.
    pub fn new(delta: f64) -> Self {
        Self::with_config(delta, WaitConfig::default())
    }

    /// Harness around a scheduler built from `config`.
    pub fn with_config(delta: f64, config: WaitConfig) -> Self {
        Self {
            wait: Wait::with_config(config),
            clock: ManualClock::new(delta),
        }
    }

    /// The scheduler under test.
    pub fn wait(&self) -> &Wait {
        &self.wait
    }

    /// The clock, for queueing custom deltas.
    pub fn clock_mut(&mut self) -> &mut ManualClock {
        &mut self.clock
    }

    /// Run one tick with the clock's next delta.
    pub fn step(&mut self) -> TickReport {
        self.wait.advance(&mut self.clock)
    }

    /// Run one tick of exactly `delta` seconds.
    pub fn step_with(&mut self, delta: f64) -> TickReport {
        self.clock.queue(delta);
        self.step()
    }

    /// Run `ticks` ticks, returning every report.
    pub fn run(&mut self, ticks: u64) -> Vec<TickReport> {
        (0..ticks).map(|_| self.step()).collect()
    }

    /// Step until no tasks are pending or `max_ticks` ticks have run.
    /// Returns the number of ticks run.
    pub fn run_until_idle(&mut self, max_ticks: u64) -> u64 {
        let mut ran = 0;
        while ran < max_ticks && self.wait.pending_count() > 0 {
            self.step();
            ran += 1;
        }
        ran
    }
}

/// Shared record of which callbacks ran on which tick.
///
/// Holds only a weak handle to the scheduler so recorders captured by
/// repeating tasks do not keep it alive.
#[derive(Clone)]
pub struct FireLog {
    wait: WeakWait,
    entries: Rc<RefCell<Vec<(SimTick, String)>>>,
}

impl FireLog {
    /// Log stamping entries with `wait`'s current tick.
    pub fn new(wait: &Wait) -> Self {
        Self {
            wait: wait.downgrade(),
            entries: Rc::default(),
        }
    }

    /// Append `label` at the current tick.
    pub fn record(&self, label: &str) {
        let tick = self
            .wait
            .upgrade()
            .map(|wait| wait.current_tick())
            .unwrap_or(SimTick::ZERO);
        self.entries.borrow_mut().push((tick, label.to_string()));
    }

    /// Callback that records `label` each time it runs.
    pub fn recorder(&self, label: &str) -> impl FnMut() + 'static {
        let log = self.clone();
        let label = label.to_string();
        move || log.record(&label)
    }

    /// All entries in invocation order.
    pub fn entries(&self) -> Vec<(SimTick, String)> {
        self.entries.borrow().clone()
    }

    /// Ticks on which `label` was recorded.
    pub fn ticks_of(&self, label: &str) -> Vec<SimTick> {
        self.entries
            .borrow()
            .iter()
            .filter(|(_, l)| l == label)
            .map(|(tick, _)| *tick)
            .collect()
    }

    /// Number of times `label` was recorded.
    pub fn count(&self, label: &str) -> usize {
        self.ticks_of(label).len()
    }

    /// Labels in invocation order.
    pub fn labels(&self) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .map(|(_, label)| label.clone())
            .collect()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}
