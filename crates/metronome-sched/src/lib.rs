#![doc = "Thread-per-task periodic scheduler with real-time priority elevation."]

pub mod dispatch;
pub mod monitor;
pub mod priority;
pub mod scheduler;
pub mod task;

pub use dispatch::StopToken;
pub use monitor::{MonitorState, MonitorVerdict, TimelinessMonitor};
pub use priority::PriorityMapper;
pub use scheduler::Scheduler;
pub use task::{TaskCallback, TaskDescriptor, TaskError};
