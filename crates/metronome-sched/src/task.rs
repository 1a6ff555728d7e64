//! Task descriptor: the immutable record of one registered periodic callback.
//!
//! Descriptors are created only through [`Scheduler::add_task`] and never
//! change after registration. The callback owns no resources itself; any
//! state it touches is captured by the closure (or shared via `Arc`) and
//! must outlive the scheduler's running period.
//!
//! [`Scheduler::add_task`]: crate::scheduler::Scheduler::add_task

use metronome_common::error::{SchedError, SchedResult};
use std::time::Duration;

/// Error type a task callback may return.
///
/// Boxed so callbacks can surface whatever error type their domain uses;
/// the dispatch loop only ever logs it and escalates to a global stop.
pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

/// A registered periodic callback.
///
/// `FnMut` rather than `Fn`: per-task state (loop counters, previous
/// timestamps) lives inside the closure instead of in function-local
/// statics, making its lifetime explicit.
pub type TaskCallback = Box<dyn FnMut() -> Result<(), TaskError> + Send + 'static>;

/// Immutable description of one periodic task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    /// Human-readable name, unique within one scheduler instance.
    pub name: String,
    /// Fixed interval between successive invocations.
    pub period: Duration,
    /// Logical priority in `[0, max_priority]`; 0 is lowest and maps to
    /// the host's normal (non-RT) scheduling class.
    pub priority: u8,
}

impl TaskDescriptor {
    /// Validate and build a descriptor.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty name, a zero period, or a
    /// priority above `max_priority`.
    pub fn new(name: &str, period: Duration, priority: u8, max_priority: u8) -> SchedResult<Self> {
        if name.is_empty() {
            return Err(SchedError::InvalidArgument(
                "task name must not be empty".into(),
            ));
        }
        if period.is_zero() {
            return Err(SchedError::InvalidArgument(format!(
                "task '{name}': period must be positive"
            )));
        }
        if priority > max_priority {
            return Err(SchedError::InvalidArgument(format!(
                "task '{name}': priority {priority} exceeds max_priority {max_priority}"
            )));
        }

        Ok(Self {
            name: name.to_string(),
            period,
            priority,
        })
    }
}
