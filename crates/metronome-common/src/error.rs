use thiserror::Error;

/// Scheduler error types covering registration misuse, lifecycle misuse,
/// and faults raised inside running dispatch threads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedError {
    /// Malformed task registration: bad period, priority out of range,
    /// or duplicate task name. Surfaced synchronously to the caller.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Lifecycle misuse: registering after start, or starting twice.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A user callback returned an error during dispatch. Caught at the
    /// loop boundary and escalated to a global stop, never retried.
    #[error("callback failure in task '{task}': {reason}")]
    CallbackFailure {
        /// Name of the task whose callback failed.
        task: String,
        /// Error reported by the callback.
        reason: String,
    },

    /// Sustained deadline violation detected by the timeliness monitor.
    #[error(
        "timeliness fault in task '{task}': {consecutive} consecutive deadline \
         violations (threshold: {threshold})"
    )]
    TimelinessFault {
        /// Name of the offending task.
        task: String,
        /// Number of consecutive violations observed.
        consecutive: u32,
        /// Configured violation threshold.
        threshold: u32,
    },

    /// Failed to spawn a dispatch thread.
    #[error("failed to spawn dispatch thread for task '{task}': {reason}")]
    Spawn {
        /// Name of the task whose thread could not be spawned.
        task: String,
        /// Underlying spawn error.
        reason: String,
    },
}

/// Convenience type alias for scheduler operations.
pub type SchedResult<T> = Result<T, SchedError>;
