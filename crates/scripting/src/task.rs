//! Task records held by the registry.
//!
//! A task is a deferred callback plus the progress state its completion
//! strategy needs. Callbacks are stored behind `Option` so the evaluator can
//! move them out of the registry while they run and put them back afterwards.

use crate::error::WaitError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tabletop_core::SimTick;

/// Tolerance for comparing accumulated seconds against a target.
///
/// Fixed-step clocks accumulate binary rounding error (twenty 0.05 s steps do
/// not sum to exactly 1.0), so a delay or timeout counts as reached once the
/// accumulated time is within this many seconds of it.
pub(crate) const TIME_EPSILON: f64 = 1e-9;

/// Opaque handle returned by every scheduling call.
///
/// Ids increase monotonically and are never reused by the scheduler that
/// issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Completion strategy of a pending task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Fires once a predicate returns true.
    Condition,
    /// Fires after a number of ticks.
    Frames,
    /// Fires after a delay, optionally repeating.
    Time,
    /// Resumed once per tick until it completes.
    Coroutine,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskKind::Condition => "condition",
            TaskKind::Frames => "frames",
            TaskKind::Time => "time",
            TaskKind::Coroutine => "coroutine",
        };
        f.write_str(label)
    }
}

/// How many times a time task fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repetitions {
    /// Fire this many more times.
    Finite(u64),
    /// Fire until stopped.
    Infinite,
}

impl Repetitions {
    /// Interpret a host-style repetition count: any negative value is
    /// infinite, zero is rejected.
    pub fn from_count(count: i64) -> Result<Self, WaitError> {
        match count {
            0 => Err(WaitError::invalid(
                "time",
                "repetitions must be non-zero (use a negative value for infinite)",
            )),
            n if n < 0 => Ok(Repetitions::Infinite),
            n => Ok(Repetitions::Finite(n.unsigned_abs())),
        }
    }

    /// Record one firing. Returns true when the budget is exhausted.
    fn consume(&mut self) -> bool {
        match self {
            Repetitions::Infinite => false,
            Repetitions::Finite(left) => {
                *left = left.saturating_sub(1);
                *left == 0
            }
        }
    }
}

/// Result of resuming a coroutine step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Resume again on the next tick.
    Yield,
    /// Finished; remove the task.
    Complete,
}

impl From<bool> for Step {
    /// `true` means the coroutine is done.
    fn from(done: bool) -> Self {
        if done {
            Step::Complete
        } else {
            Step::Yield
        }
    }
}

pub(crate) type OnceCallback = Box<dyn FnOnce()>;
pub(crate) type RepeatCallback = Box<dyn FnMut()>;
pub(crate) type Predicate = Box<dyn FnMut() -> bool>;
pub(crate) type StepFn = Box<dyn FnMut() -> Step>;

/// Timeout budget for a condition task.
///
/// ```ignore
/// wait.condition_with_timeout(
///     || println!("came to rest"),
///     move || die.resting(),
///     Timeout::after(2.0).then(|| println!("took too long")),
/// )?;
/// ```
pub struct Timeout {
    pub(crate) seconds: f64,
    pub(crate) on_timeout: Option<OnceCallback>,
}

impl Timeout {
    /// Give up after `seconds` of accumulated tick time.
    pub fn after(seconds: f64) -> Self {
        Self {
            seconds,
            on_timeout: None,
        }
    }

    /// Run `on_timeout` when the budget is exhausted.
    pub fn then<F>(mut self, on_timeout: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        self.on_timeout = Some(Box::new(on_timeout));
        self
    }

    pub(crate) fn validate(&self) -> Result<(), WaitError> {
        if !self.seconds.is_finite() || self.seconds < 0.0 {
            return Err(WaitError::invalid(
                "condition",
                format!("timeout must be a finite value >= 0 (got {})", self.seconds),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timeout")
            .field("seconds", &self.seconds)
            .field("has_callback", &self.on_timeout.is_some())
            .finish()
    }
}

pub(crate) struct ConditionTask {
    pub(crate) on_ready: Option<OnceCallback>,
    pub(crate) predicate: Option<Predicate>,
    pub(crate) timeout: Option<f64>,
    pub(crate) on_timeout: Option<OnceCallback>,
    pub(crate) age: f64,
}

pub(crate) struct FrameTask {
    pub(crate) remaining: u64,
    pub(crate) on_ready: Option<OnceCallback>,
}

pub(crate) struct TimeTask {
    pub(crate) delay: f64,
    pub(crate) accumulated: f64,
    pub(crate) repetitions: Repetitions,
    pub(crate) on_ready: Option<RepeatCallback>,
}

pub(crate) struct CoroutineTask {
    pub(crate) step: Option<StepFn>,
}

pub(crate) enum TaskBody {
    Condition(ConditionTask),
    Frames(FrameTask),
    Time(TimeTask),
    Coroutine(CoroutineTask),
}

/// A pending task. Terminal tasks are never stored.
pub(crate) struct TaskRecord {
    pub(crate) id: TaskId,
    pub(crate) created: SimTick,
    pub(crate) body: TaskBody,
}

impl TaskRecord {
    pub(crate) fn kind(&self) -> TaskKind {
        match self.body {
            TaskBody::Condition(_) => TaskKind::Condition,
            TaskBody::Frames(_) => TaskKind::Frames,
            TaskBody::Time(_) => TaskKind::Time,
            TaskBody::Coroutine(_) => TaskKind::Coroutine,
        }
    }
}

/// What the evaluator must do for a task after advancing its progress.
///
/// Produced while the registry is borrowed; carried out after the borrow is
/// released so user code can re-enter the scheduler.
pub(crate) enum Advance {
    /// Not ready yet.
    Wait,
    /// Fire a one-shot callback. The task has already been removed.
    Fire(Option<OnceCallback>),
    /// Fire a repeating callback taken out of the record. `last` means the
    /// task has already been removed.
    FireRepeat { callback: RepeatCallback, last: bool },
    /// Run the predicate taken out of the record.
    Poll(Predicate),
    /// Timed out. The task has already been removed.
    TimedOut(Option<OnceCallback>),
    /// Resume the step taken out of the record.
    Resume(StepFn),
}

impl TaskBody {
    /// Advance progress by one tick of `elapsed` seconds.
    ///
    /// Returns the action to take and whether the task must be removed from
    /// the registry before that action runs.
    pub(crate) fn advance(&mut self, elapsed: f64) -> (Advance, bool) {
        match self {
            TaskBody::Frames(task) => {
                task.remaining = task.remaining.saturating_sub(1);
                if task.remaining == 0 {
                    (Advance::Fire(task.on_ready.take()), true)
                } else {
                    (Advance::Wait, false)
                }
            }
            TaskBody::Time(task) => {
                task.accumulated += elapsed;
                if task.accumulated + TIME_EPSILON < task.delay {
                    return (Advance::Wait, false);
                }
                // The evaluator restores the callback before the next pass.
                let Some(callback) = task.on_ready.take() else {
                    debug_assert!(false, "time task advanced without its callback");
                    return (Advance::Wait, false);
                };
                task.accumulated = (task.accumulated - task.delay).max(0.0);
                let last = task.repetitions.consume();
                (Advance::FireRepeat { callback, last }, last)
            }
            TaskBody::Condition(task) => {
                if let Some(limit) = task.timeout {
                    task.age += elapsed;
                    if task.age + TIME_EPSILON >= limit {
                        return (Advance::TimedOut(task.on_timeout.take()), true);
                    }
                }
                match task.predicate.take() {
                    Some(predicate) => (Advance::Poll(predicate), false),
                    None => (Advance::Wait, false),
                }
            }
            TaskBody::Coroutine(task) => match task.step.take() {
                Some(step) => (Advance::Resume(step), false),
                None => (Advance::Wait, false),
            },
        }
    }
}
