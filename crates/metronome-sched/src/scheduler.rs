//! Scheduler orchestration: task registration, dispatch thread
//! lifecycle, and introspection.
//!
//! The scheduler owns its descriptors and dispatch threads exclusively.
//! `start` spawns one thread per registered task, `stop` signals the
//! shared stop token and joins every thread before returning, and drop
//! performs an implicit stop so no dispatch thread can outlive the
//! scheduler. A stopped scheduler can be started again with its
//! registered tasks intact.

use crate::dispatch::{DispatchLoop, StopToken};
use crate::monitor::TimelinessMonitor;
use crate::priority::{self, PriorityMapper};
use crate::task::{TaskCallback, TaskDescriptor, TaskError};
use metronome_common::config::SchedulerConfig;
use metronome_common::error::{SchedError, SchedResult};
use metronome_common::metrics::{IntervalMetrics, MetricsSnapshot};
use metronome_common::state::SchedState;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

/// One registered task: its immutable descriptor plus the shared cells
/// handed to the dispatch thread on each start.
struct TaskEntry {
    descriptor: TaskDescriptor,
    callback: Arc<Mutex<TaskCallback>>,
    metrics: Option<Arc<Mutex<IntervalMetrics>>>,
}

/// Periodic task scheduler with one dispatch thread per task.
pub struct Scheduler {
    config: SchedulerConfig,
    mapper: PriorityMapper,
    state: SchedState,
    tasks: Vec<TaskEntry>,
    stop: StopToken,
    fault: Arc<Mutex<Option<SchedError>>>,
    handles: Vec<JoinHandle<()>>,
    memory_locked: bool,
}

impl Scheduler {
    /// Create a scheduler with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Create a scheduler with an explicit configuration.
    #[must_use]
    pub fn with_config(config: SchedulerConfig) -> Self {
        let mapper = PriorityMapper::new(&config.realtime);
        Self {
            config,
            mapper,
            state: SchedState::Idle,
            tasks: Vec::new(),
            stop: StopToken::new(),
            fault: Arc::new(Mutex::new(None)),
            handles: Vec::new(),
            memory_locked: false,
        }
    }

    /// The highest logical priority this process may request.
    ///
    /// Fixed for the lifetime of the process; query it before registering
    /// tasks with elevated priority.
    #[must_use]
    pub fn max_priority(&self) -> u8 {
        self.mapper.max_priority()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SchedState {
        self.state
    }

    /// Register a periodic task.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` - zero period, priority above
    ///   [`max_priority`](Self::max_priority), or duplicate name.
    /// * `InvalidState` - the scheduler is currently running.
    pub fn add_task<F>(
        &mut self,
        callback: F,
        name: &str,
        period: Duration,
        priority: u8,
    ) -> SchedResult<()>
    where
        F: FnMut() -> Result<(), TaskError> + Send + 'static,
    {
        if self.state.is_running() {
            return Err(SchedError::InvalidState(format!(
                "cannot register task '{name}' while the scheduler is {}",
                self.state
            )));
        }
        if self.tasks.iter().any(|t| t.descriptor.name == name) {
            return Err(SchedError::InvalidArgument(format!(
                "task name '{name}' already registered"
            )));
        }

        let descriptor = TaskDescriptor::new(name, period, priority, self.max_priority())?;

        let metrics = self.config.metrics.enabled.then(|| {
            let tolerance = self.config.timeliness.tolerance.unwrap_or(period);
            Arc::new(Mutex::new(IntervalMetrics::new(
                self.config.metrics.histogram_size,
                period,
                tolerance,
            )))
        });

        info!(
            task = name,
            period_us = period.as_micros() as u64,
            priority,
            "task registered"
        );

        self.tasks.push(TaskEntry {
            descriptor,
            callback: Arc::new(Mutex::new(Box::new(callback))),
            metrics,
        });
        Ok(())
    }

    /// Start all registered tasks.
    ///
    /// Spawns one dispatch thread per descriptor, each requesting its
    /// mapped native priority. Callable again after [`stop`](Self::stop).
    ///
    /// # Errors
    ///
    /// * `InvalidState` - already running.
    /// * `Spawn` - the OS refused to create a dispatch thread; any
    ///   threads spawned before the failure are stopped and joined.
    pub fn start(&mut self) -> SchedResult<()> {
        self.state.transition_to(SchedState::Running)?;

        if self.config.realtime.lock_memory && !self.memory_locked {
            self.memory_locked = priority::lock_memory();
        }

        // fresh token and fault slot for this run
        self.stop = StopToken::new();
        self.fault = Arc::new(Mutex::new(None));

        let mut dispatches = Vec::with_capacity(self.tasks.len());
        for entry in &self.tasks {
            let monitor = self
                .config
                .timeliness
                .enabled
                .then(|| TimelinessMonitor::new(entry.descriptor.period, &self.config.timeliness));

            dispatches.push(DispatchLoop {
                descriptor: entry.descriptor.clone(),
                callback: Arc::clone(&entry.callback),
                metrics: entry.metrics.as_ref().map(Arc::clone),
                monitor,
                mapper: self.mapper.clone(),
                stop: self.stop.clone(),
                fault: Arc::clone(&self.fault),
            });
        }

        for dispatch in dispatches {
            let task = dispatch.descriptor.name.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("dispatch-{task}"))
                .spawn(move || dispatch.run());

            match spawned {
                Ok(handle) => self.handles.push(handle),
                Err(e) => {
                    let err = SchedError::Spawn {
                        task,
                        reason: e.to_string(),
                    };
                    self.stop.set();
                    self.join_all();
                    self.state = SchedState::Stopped;
                    return Err(err);
                }
            }
        }

        info!(
            tasks = self.tasks.len(),
            max_priority = self.max_priority(),
            "scheduler started"
        );
        Ok(())
    }

    /// Stop all tasks.
    ///
    /// Sets the stop token, joins every dispatch thread, and only then
    /// returns: on return no callback is executing and no dispatch
    /// thread remains alive. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if !self.state.is_running() {
            return;
        }

        info!("stopping scheduler");
        self.stop.set();
        self.join_all();
        // Running -> Stopped is always a valid transition
        self.state = SchedState::Stopped;
        info!("scheduler stopped");
    }

    /// A clone of the current run's stop token.
    ///
    /// Lets callers request a global stop from outside (or from inside a
    /// callback), and observe stops requested by a faulting dispatch
    /// loop. Each `start` installs a fresh token.
    #[must_use]
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    /// The first fault recorded by a dispatch loop in the current run,
    /// if any.
    #[must_use]
    pub fn last_fault(&self) -> Option<SchedError> {
        self.fault.lock().ok().and_then(|slot| slot.clone())
    }

    /// Names of all registered tasks, in registration order.
    #[must_use]
    pub fn task_names(&self) -> Vec<String> {
        self.tasks
            .iter()
            .map(|t| t.descriptor.name.clone())
            .collect()
    }

    /// Interval metrics snapshot for one task, if metrics are enabled.
    #[must_use]
    pub fn metrics(&self, name: &str) -> Option<MetricsSnapshot> {
        let entry = self.tasks.iter().find(|t| t.descriptor.name == name)?;
        let metrics = entry.metrics.as_ref()?;
        metrics.lock().ok().map(|m| m.snapshot())
    }

    fn join_all(&mut self) {
        for handle in self.handles.drain(..) {
            let name = handle.thread().name().unwrap_or("dispatch").to_string();
            if handle.join().is_err() {
                warn!(thread = %name, "dispatch thread panicked");
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
