//! Per-tick evaluation.
//!
//! One pass per host tick:
//!
//! 1. snapshot the pending ids (tasks registered during the pass wait for the
//!    next tick);
//! 2. for each snapshotted id still pending, advance its progress while the
//!    registry is borrowed;
//! 3. release the borrow and run whatever user code the task needs
//!    (callback, predicate, coroutine step) under `catch_unwind`;
//! 4. re-borrow to put moved-out closures back, or drop the task if user code
//!    cancelled it in the meantime.
//!
//! Firing order is ascending id.

use crate::error::{CallbackFault, CallbackRole};
use crate::task::{Advance, Step, TaskBody, TaskId};
use crate::wait::Wait;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use tabletop_core::{ClockReading, ClockSource, SimTick};
use tracing::{debug, error, warn};

/// What happened during one [`Wait::on_tick`] pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    /// Frame number of the pass.
    pub tick: SimTick,
    /// Elapsed seconds actually applied after clamping.
    pub elapsed_seconds: f64,
    /// Number of snapshotted tasks that were still pending when reached.
    pub evaluated: usize,
    /// Tasks whose completion callback ran (including repeats and finished
    /// coroutines), in firing order.
    pub fired: Vec<TaskId>,
    /// Condition tasks that ran out of time.
    pub timed_out: Vec<TaskId>,
    /// Callback panics captured during the pass.
    pub faults: Vec<CallbackFault>,
}

impl TickReport {
    /// Whether nothing fired, timed out, or faulted.
    pub fn is_quiet(&self) -> bool {
        self.fired.is_empty() && self.timed_out.is_empty() && self.faults.is_empty()
    }
}

impl Wait {
    /// Evaluate every pending task for one host tick.
    ///
    /// `elapsed_seconds` is the wall-clock delta since the previous tick.
    /// Negative or non-finite deltas are treated as zero; deltas above
    /// [`WaitConfig::max_tick_seconds`](crate::WaitConfig::max_tick_seconds)
    /// are clamped to it.
    ///
    /// Calling this from inside a task callback is refused and returns an
    /// empty report.
    pub fn on_tick(&self, frame: SimTick, elapsed_seconds: f64) -> TickReport {
        let (snapshot, elapsed) = {
            let mut state = self.inner.borrow_mut();
            if state.evaluating {
                warn!(tick = %frame, "Wait.on_tick called re-entrantly; ignoring");
                return TickReport {
                    tick: frame,
                    ..TickReport::default()
                };
            }
            if frame <= state.tick && state.tick != SimTick::ZERO {
                debug!(previous = %state.tick, current = %frame, "Host frame counter did not advance");
            }
            let elapsed = sanitize_elapsed(elapsed_seconds, state.config.max_tick_seconds);
            state.evaluating = true;
            state.tick = frame;
            (state.registry.snapshot(), elapsed)
        };

        let mut report = TickReport {
            tick: frame,
            elapsed_seconds: elapsed,
            ..TickReport::default()
        };
        for id in snapshot {
            self.evaluate(id, frame, elapsed, &mut report);
        }

        let mut state = self.inner.borrow_mut();
        state.evaluating = false;
        for fault in &report.faults {
            state.record_fault(fault.clone());
        }
        report
    }

    /// Pull one reading from `clock` and evaluate it.
    pub fn advance<C: ClockSource + ?Sized>(&self, clock: &mut C) -> TickReport {
        let reading = clock.tick();
        self.on_tick(reading.frame, reading.elapsed_seconds)
    }

    /// Evaluate a host-supplied reading.
    pub fn on_reading(&self, reading: ClockReading) -> TickReport {
        self.on_tick(reading.frame, reading.elapsed_seconds)
    }

    fn evaluate(&self, id: TaskId, tick: SimTick, elapsed: f64, report: &mut TickReport) {
        // A removed record may still own closures; it is dropped after the borrow ends.
        let (advance, _finished) = {
            let mut state = self.inner.borrow_mut();
            let Some(record) = state.registry.get_mut(id) else {
                // Stopped by an earlier callback in this pass.
                return;
            };
            let created = record.created;
            let (advance, remove) = record.body.advance(elapsed);
            let finished = if remove {
                debug!(task = %id, waited_ticks = tick.since(created), "Wait task finished");
                state.registry.remove(id)
            } else {
                None
            };
            (advance, finished)
        };
        report.evaluated += 1;

        match advance {
            Advance::Wait => {}
            Advance::Fire(callback) => {
                report.fired.push(id);
                if let Some(callback) = callback {
                    if let Err(fault) = guard(id, CallbackRole::OnReady, tick, callback) {
                        report_fault(report, fault);
                    }
                }
            }
            Advance::FireRepeat { mut callback, last } => {
                report.fired.push(id);
                let outcome = guard(id, CallbackRole::OnReady, tick, || callback());
                match outcome {
                    Ok(()) if !last => self.restore(id, |body| {
                        if let TaskBody::Time(task) = body {
                            task.on_ready = Some(callback);
                        }
                    }),
                    Ok(()) => {}
                    Err(fault) => {
                        self.remove(id);
                        report_fault(report, fault);
                    }
                }
            }
            Advance::TimedOut(on_timeout) => {
                report.timed_out.push(id);
                debug!(task = %id, tick = %tick, "Wait condition timed out");
                if let Some(on_timeout) = on_timeout {
                    if let Err(fault) = guard(id, CallbackRole::OnTimeout, tick, on_timeout) {
                        report_fault(report, fault);
                    }
                }
            }
            Advance::Poll(mut predicate) => {
                match guard(id, CallbackRole::Predicate, tick, || predicate()) {
                    Ok(true) => {
                        // The predicate may have stopped its own task; cancellation wins.
                        let Some(record) = self.remove(id) else {
                            return;
                        };
                        report.fired.push(id);
                        if let TaskBody::Condition(mut task) = record.body {
                            if let Some(callback) = task.on_ready.take() {
                                if let Err(fault) =
                                    guard(id, CallbackRole::OnReady, tick, callback)
                                {
                                    report_fault(report, fault);
                                }
                            }
                        }
                    }
                    Ok(false) => self.restore(id, |body| {
                        if let TaskBody::Condition(task) = body {
                            task.predicate = Some(predicate);
                        }
                    }),
                    Err(fault) => {
                        self.remove(id);
                        report_fault(report, fault);
                    }
                }
            }
            Advance::Resume(mut step) => match guard(id, CallbackRole::Step, tick, || step()) {
                Ok(Step::Yield) => self.restore(id, |body| {
                    if let TaskBody::Coroutine(task) = body {
                        task.step = Some(step);
                    }
                }),
                Ok(Step::Complete) => {
                    if self.remove(id).is_some() {
                        report.fired.push(id);
                    }
                }
                Err(fault) => {
                    self.remove(id);
                    report_fault(report, fault);
                }
            },
        }
    }

    /// Hand moved-out state back to a task that is still pending. If user code
    /// stopped the task meanwhile, the state is dropped instead.
    fn restore(&self, id: TaskId, put_back: impl FnOnce(&mut TaskBody)) {
        let mut state = self.inner.borrow_mut();
        match state.registry.get_mut(id) {
            Some(record) => put_back(&mut record.body),
            None => {
                drop(state);
                drop(put_back);
            }
        }
    }

    fn remove(&self, id: TaskId) -> Option<crate::task::TaskRecord> {
        self.inner.borrow_mut().registry.remove(id)
    }
}

fn guard<T>(
    id: TaskId,
    role: CallbackRole,
    tick: SimTick,
    f: impl FnOnce() -> T,
) -> Result<T, CallbackFault> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .map_err(|payload| CallbackFault::from_panic(id, role, tick, payload))
}

fn report_fault(report: &mut TickReport, fault: CallbackFault) {
    error!(
        task = %fault.task,
        role = %fault.role,
        tick = %fault.tick,
        message = %fault.message,
        "Wait callback panicked"
    );
    report.faults.push(fault);
}

fn sanitize_elapsed(elapsed: f64, max: Option<f64>) -> f64 {
    let elapsed = if elapsed.is_finite() && elapsed >= 0.0 {
        elapsed
    } else {
        warn!(elapsed, "Host clock reported an invalid delta; using 0");
        0.0
    };
    match max {
        Some(max) if elapsed > max => {
            debug!(elapsed, max, "Clamping tick delta");
            max
        }
        _ => elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_clamps_negative_nan_and_spikes() {
        assert_eq!(sanitize_elapsed(-0.5, None), 0.0);
        assert_eq!(sanitize_elapsed(f64::NAN, None), 0.0);
        assert_eq!(sanitize_elapsed(3.0, Some(0.25)), 0.25);
        assert_eq!(sanitize_elapsed(0.1, Some(0.25)), 0.1);
    }

    #[test]
    fn guard_captures_panics() {
        let ok = guard(TaskId(1), CallbackRole::OnReady, SimTick(1), || 5);
        assert_eq!(ok, Ok(5));

        let err = guard(TaskId(2), CallbackRole::Step, SimTick(3), || -> u8 {
            panic!("bad step")
        })
        .unwrap_err();
        assert_eq!(err.task, TaskId(2));
        assert_eq!(err.role, CallbackRole::Step);
        assert_eq!(err.message, "bad step");
    }

    #[test]
    fn quiet_report() {
        let wait = Wait::new();
        wait.frames(|| {}, 3).unwrap();
        let report = wait.on_tick(SimTick(1), 0.05);
        assert!(report.is_quiet());
        assert_eq!(report.evaluated, 1);
    }
}
