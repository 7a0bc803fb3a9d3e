//! The `Wait` facade: schedule deferred callbacks and cancel them by id.

use crate::config::WaitConfig;
use crate::error::{CallbackFault, WaitError};
use crate::registry::TaskRegistry;
use crate::task::{
    ConditionTask, CoroutineTask, FrameTask, Repetitions, Step, TaskBody, TaskId, TaskKind,
    TaskRecord, TimeTask, Timeout,
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use tabletop_core::SimTick;
use tracing::{debug, warn};

/// Deferred-task scheduler.
///
/// `Wait` is a cheap handle over shared single-threaded state: clone it into a
/// callback to schedule or cancel work from inside a tick. The host drives it
/// by calling [`Wait::on_tick`] once per simulation step.
///
/// Callbacks run synchronously on the tick thread. A slow or blocking callback
/// stalls the whole tick and delays every other pending task, so keep them
/// short.
///
/// A callback that captures a clone of its own scheduler keeps the scheduler
/// alive until the task leaves the registry. Capture a [`WeakWait`] instead
/// in tasks that repeat forever.
#[derive(Clone, Default)]
pub struct Wait {
    pub(crate) inner: Rc<RefCell<WaitState>>,
}

/// Non-owning handle to a [`Wait`] scheduler.
#[derive(Clone, Default)]
pub struct WeakWait {
    inner: Weak<RefCell<WaitState>>,
}

impl WeakWait {
    /// The scheduler, if it is still alive.
    pub fn upgrade(&self) -> Option<Wait> {
        self.inner.upgrade().map(|inner| Wait { inner })
    }
}

impl std::fmt::Debug for WeakWait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakWait")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

#[derive(Default)]
pub(crate) struct WaitState {
    pub(crate) registry: TaskRegistry,
    pub(crate) config: WaitConfig,
    pub(crate) tick: SimTick,
    pub(crate) evaluating: bool,
    pub(crate) faults: VecDeque<CallbackFault>,
    next_id: u64,
    over_threshold: bool,
}

impl WaitState {
    fn register(&mut self, body: TaskBody) -> TaskId {
        self.next_id += 1;
        let id = TaskId(self.next_id);
        let record = TaskRecord {
            id,
            created: self.tick,
            body,
        };
        debug!(task = %id, kind = %record.kind(), tick = %self.tick, "Wait task registered");
        self.registry.insert(record);

        let pending = self.registry.len();
        if pending > self.config.pending_warn_threshold {
            if !self.over_threshold {
                warn!(
                    pending,
                    threshold = self.config.pending_warn_threshold,
                    "Wait registry is growing; tasks may be leaking"
                );
                self.over_threshold = true;
            }
        } else {
            self.over_threshold = false;
        }
        id
    }

    pub(crate) fn record_fault(&mut self, fault: CallbackFault) {
        if self.config.fault_history == 0 {
            return;
        }
        while self.faults.len() >= self.config.fault_history {
            self.faults.pop_front();
        }
        self.faults.push_back(fault);
    }
}

impl Wait {
    /// Scheduler with default configuration.
    pub fn new() -> Self {
        Self::with_config(WaitConfig::default())
    }

    /// Non-owning handle for capture inside long-lived callbacks.
    pub fn downgrade(&self) -> WeakWait {
        WeakWait {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Scheduler with explicit configuration.
    pub fn with_config(config: WaitConfig) -> Self {
        let state = WaitState {
            config,
            ..WaitState::default()
        };
        Self {
            inner: Rc::new(RefCell::new(state)),
        }
    }

    /// Run `on_ready` once `predicate` returns true.
    ///
    /// The predicate is first evaluated on the next tick, then once per tick
    /// until it holds, so it must be safe to call repeatedly.
    pub fn condition<R, P>(&self, on_ready: R, predicate: P) -> TaskId
    where
        R: FnOnce() + 'static,
        P: FnMut() -> bool + 'static,
    {
        self.register(TaskBody::Condition(ConditionTask {
            on_ready: Some(Box::new(on_ready)),
            predicate: Some(Box::new(predicate)),
            timeout: None,
            on_timeout: None,
            age: 0.0,
        }))
    }

    /// Like [`Wait::condition`], but give up once `timeout` seconds of tick
    /// time have accumulated since registration.
    ///
    /// On the tick the budget runs out the timeout callback (if any) runs
    /// instead of the predicate; `on_ready` never runs. A tick on which both
    /// the budget is exhausted and the predicate would hold counts as a
    /// timeout.
    pub fn condition_with_timeout<R, P>(
        &self,
        on_ready: R,
        predicate: P,
        timeout: Timeout,
    ) -> Result<TaskId, WaitError>
    where
        R: FnOnce() + 'static,
        P: FnMut() -> bool + 'static,
    {
        timeout.validate()?;
        Ok(self.register(TaskBody::Condition(ConditionTask {
            on_ready: Some(Box::new(on_ready)),
            predicate: Some(Box::new(predicate)),
            timeout: Some(timeout.seconds),
            on_timeout: timeout.on_timeout,
            age: 0.0,
        })))
    }

    /// Run `on_ready` after `frame_count` ticks.
    ///
    /// Both 0 and 1 fire on the next tick. Negative counts are rejected.
    pub fn frames<R>(&self, on_ready: R, frame_count: i64) -> Result<TaskId, WaitError>
    where
        R: FnOnce() + 'static,
    {
        if frame_count < 0 {
            return Err(WaitError::invalid(
                "frames",
                format!("frame count must be >= 0 (got {frame_count})"),
            ));
        }
        Ok(self.register(TaskBody::Frames(FrameTask {
            remaining: frame_count.unsigned_abs(),
            on_ready: Some(Box::new(on_ready)),
        })))
    }

    /// Run `on_ready` on the next tick.
    pub fn next_frame<R>(&self, on_ready: R) -> TaskId
    where
        R: FnOnce() + 'static,
    {
        self.register(TaskBody::Frames(FrameTask {
            remaining: 1,
            on_ready: Some(Box::new(on_ready)),
        }))
    }

    /// Run `on_ready` every `seconds` of tick time, `repetitions` times.
    ///
    /// A negative `repetitions` repeats until stopped; zero is rejected, as is
    /// a negative or non-finite delay. Overshoot past the delay carries into
    /// the next cycle, but a task fires at most once per tick.
    pub fn time<R>(&self, on_ready: R, seconds: f64, repetitions: i64) -> Result<TaskId, WaitError>
    where
        R: FnMut() + 'static,
    {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(WaitError::invalid(
                "time",
                format!("seconds must be a finite value >= 0 (got {seconds})"),
            ));
        }
        let repetitions = Repetitions::from_count(repetitions)?;
        Ok(self.register(TaskBody::Time(TimeTask {
            delay: seconds,
            accumulated: 0.0,
            repetitions,
            on_ready: Some(Box::new(on_ready)),
        })))
    }

    /// Run `on_ready` once after `seconds` of tick time.
    pub fn after<R>(&self, on_ready: R, seconds: f64) -> Result<TaskId, WaitError>
    where
        R: FnOnce() + 'static,
    {
        let mut on_ready = Some(on_ready);
        self.time(
            move || {
                if let Some(callback) = on_ready.take() {
                    callback();
                }
            },
            seconds,
            1,
        )
    }

    /// Resume `step` once per tick, starting next tick, until it returns
    /// [`Step::Complete`].
    pub fn coroutine<S>(&self, step: S) -> TaskId
    where
        S: FnMut() -> Step + 'static,
    {
        self.register(TaskBody::Coroutine(CoroutineTask {
            step: Some(Box::new(step)),
        }))
    }

    /// Cancel a pending task. Returns false if `id` is unknown or has already
    /// fired, timed out, or been stopped.
    pub fn stop(&self, id: TaskId) -> bool {
        let removed = self.inner.borrow_mut().registry.remove(id);
        match removed {
            Some(record) => {
                debug!(task = %id, kind = %record.kind(), "Wait task stopped");
                // Captured state drops here, outside the borrow.
                drop(record);
                true
            }
            None => false,
        }
    }

    /// Like [`Wait::stop`], but report a miss as [`WaitError::UnknownTask`]
    /// for callers that propagate errors instead of checking a flag.
    pub fn try_stop(&self, id: TaskId) -> Result<(), WaitError> {
        if self.stop(id) {
            Ok(())
        } else {
            Err(WaitError::UnknownTask(id))
        }
    }

    /// Cancel every pending task, including ones registered by unrelated
    /// callers. Prefer [`Wait::stop`].
    pub fn stop_all(&self) {
        let drained = self.inner.borrow_mut().registry.drain();
        if !drained.is_empty() {
            warn!(count = drained.len(), "Wait.stop_all discarded pending tasks");
        }
        drop(drained);
    }

    /// Whether `id` is still waiting to fire.
    pub fn is_pending(&self, id: TaskId) -> bool {
        self.inner.borrow().registry.contains(id)
    }

    /// Completion strategy of a pending task.
    pub fn kind_of(&self, id: TaskId) -> Option<TaskKind> {
        self.inner.borrow().registry.kind_of(id)
    }

    /// Number of pending tasks.
    pub fn pending_count(&self) -> usize {
        self.inner.borrow().registry.len()
    }

    /// Pending task ids in firing order.
    pub fn pending_ids(&self) -> Vec<TaskId> {
        self.inner.borrow().registry.ids().collect()
    }

    /// Frame number of the most recent tick.
    pub fn current_tick(&self) -> SimTick {
        self.inner.borrow().tick
    }

    /// Faults captured by recent ticks, oldest first.
    pub fn recent_faults(&self) -> Vec<CallbackFault> {
        self.inner.borrow().faults.iter().cloned().collect()
    }

    /// Active configuration.
    pub fn config(&self) -> WaitConfig {
        self.inner.borrow().config.clone()
    }

    fn register(&self, body: TaskBody) -> TaskId {
        self.inner.borrow_mut().register(body)
    }
}

impl std::fmt::Debug for Wait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.try_borrow() {
            Ok(state) => f
                .debug_struct("Wait")
                .field("tick", &state.tick)
                .field("pending", &state.registry.len())
                .finish(),
            Err(_) => f.debug_struct("Wait").finish_non_exhaustive(),
        }
    }
}
