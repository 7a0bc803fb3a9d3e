//! Errors surfaced by the `Wait` scheduler.

use crate::task::TaskId;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use tabletop_core::SimTick;
use thiserror::Error;

/// Errors returned synchronously from scheduling calls.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WaitError {
    /// A scheduling call received an argument outside its contract.
    /// Nothing is registered when this is returned.
    #[error("invalid argument to Wait.{operation}: {reason}")]
    InvalidArgument {
        /// Facade operation that rejected the call.
        operation: &'static str,
        /// Human-readable description of the violated contract.
        reason: String,
    },
    /// Lookup of an id that is not pending.
    #[error("no pending task with id {0}")]
    UnknownTask(TaskId),
}

impl WaitError {
    pub(crate) fn invalid(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            operation,
            reason: reason.into(),
        }
    }
}

/// Which user-supplied function faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackRole {
    /// The completion callback of any task.
    OnReady,
    /// A condition task's predicate.
    Predicate,
    /// A condition task's timeout callback.
    OnTimeout,
    /// A coroutine step.
    Step,
}

impl fmt::Display for CallbackRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CallbackRole::OnReady => "on_ready",
            CallbackRole::Predicate => "predicate",
            CallbackRole::OnTimeout => "on_timeout",
            CallbackRole::Step => "step",
        };
        f.write_str(label)
    }
}

/// A panic captured while running a task's callback.
///
/// The faulting task is removed from the registry; the rest of the tick
/// proceeds normally.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{role} of task {task} panicked at tick {tick}: {message}")]
pub struct CallbackFault {
    /// Task whose callback faulted.
    pub task: TaskId,
    /// Which callback faulted.
    pub role: CallbackRole,
    /// Tick during which the fault happened.
    pub tick: SimTick,
    /// Panic payload rendered as text.
    pub message: String,
}

impl CallbackFault {
    pub(crate) fn from_panic(
        task: TaskId,
        role: CallbackRole,
        tick: SimTick,
        payload: Box<dyn Any + Send>,
    ) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self {
            task,
            role,
            tick,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_argument_names_the_operation() {
        let err = WaitError::invalid("time", "seconds must be >= 0 (got -1)");
        assert_eq!(
            err.to_string(),
            "invalid argument to Wait.time: seconds must be >= 0 (got -1)"
        );
    }

    #[test]
    fn fault_extracts_string_payloads() {
        let fault = CallbackFault::from_panic(
            TaskId(4),
            CallbackRole::Predicate,
            SimTick(9),
            Box::new(String::from("boom")),
        );
        assert_eq!(fault.message, "boom");
        assert_eq!(
            fault.to_string(),
            "predicate of task 4 panicked at tick #9: boom"
        );

        let opaque = CallbackFault::from_panic(
            TaskId(1),
            CallbackRole::Step,
            SimTick(0),
            Box::new(17_u32),
        );
        assert_eq!(opaque.message, "non-string panic payload");
    }
}
