//! Per-task dispatch loop and the cooperative stop token.
//!
//! Each registered task gets one dedicated OS thread running a dispatch
//! loop: sleep until the next absolute tick, invoke the callback, re-arm.
//! The next wake time advances by exactly one period from the previous
//! wake time rather than "sleep period after finishing work", so callback
//! execution time does not accumulate as drift.
//!
//! Everything discovered inside a running loop (callback error, timeliness
//! fault) follows one uniform path: log, record the fault, request a
//! global stop. A failed periodic task cannot be safely resumed in
//! isolation.

use crate::monitor::{MonitorState, TimelinessMonitor};
use crate::priority::PriorityMapper;
use crate::task::{TaskCallback, TaskDescriptor};
use metronome_common::error::SchedError;
use metronome_common::metrics::IntervalMetrics;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

/// Upper bound on one sleep slice so the stop token is observed promptly
/// even for long-period tasks.
const STOP_POLL_SLICE: Duration = Duration::from_millis(20);

/// Cooperative cancellation token shared by all dispatch loops of one
/// scheduler run.
///
/// An atomically-readable flag rather than process-wide state: every
/// scheduler instance owns its own token, and readers on the dispatch hot
/// path never block.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    inner: Arc<AtomicBool>,
}

impl StopToken {
    /// Create a fresh, unset token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that all loops holding this token exit at their next wake.
    pub fn set(&self) {
        self.inner.store(true, Ordering::Release);
    }

    /// Check whether a stop has been requested.
    #[inline]
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.inner.load(Ordering::Acquire)
    }
}

/// One periodic dispatch loop, consumed by its dedicated thread.
pub(crate) struct DispatchLoop {
    pub(crate) descriptor: TaskDescriptor,
    pub(crate) callback: Arc<Mutex<TaskCallback>>,
    pub(crate) metrics: Option<Arc<Mutex<IntervalMetrics>>>,
    pub(crate) monitor: Option<TimelinessMonitor>,
    pub(crate) mapper: PriorityMapper,
    pub(crate) stop: StopToken,
    /// First fault observed by any loop of this run, for introspection.
    pub(crate) fault: Arc<Mutex<Option<SchedError>>>,
}

impl DispatchLoop {
    /// Run the loop to completion on the calling thread.
    pub(crate) fn run(mut self) {
        let task = self.descriptor.name.clone();
        let period = self.descriptor.period;

        self.mapper
            .apply_to_current_thread(self.descriptor.priority, &task);
        debug!(task, period_us = period.as_micros() as u64, "dispatch loop armed");

        let mut previous_invocation: Option<Instant> = None;
        let mut next_wake = Instant::now() + period;

        loop {
            sleep_until(next_wake, &self.stop);
            if self.stop.is_set() {
                break;
            }

            let invoke_result = match self.callback.lock() {
                Ok(mut callback) => (callback)(),
                Err(_) => {
                    // poisoned by a panicking lock holder; nothing left to run
                    self.record_fault(SchedError::CallbackFailure {
                        task: task.clone(),
                        reason: "callback mutex poisoned".into(),
                    });
                    break;
                }
            };

            if let Err(e) = invoke_result {
                self.record_fault(SchedError::CallbackFailure {
                    task: task.clone(),
                    reason: e.to_string(),
                });
                break;
            }

            let now = Instant::now();

            if let Some(prev) = previous_invocation.replace(now) {
                if let Some(metrics) = &self.metrics {
                    if let Ok(mut metrics) = metrics.lock() {
                        metrics.record(now - prev);
                    }
                }
            }

            if let Some(monitor) = self.monitor.as_mut() {
                let verdict = monitor.observe(now);
                match verdict.state {
                    MonitorState::Nominal => {}
                    MonitorState::Warned => {
                        warn!(
                            task,
                            jitter_us = verdict.jitter_ns / 1_000,
                            consecutive = verdict.consecutive,
                            "deadline violation"
                        );
                    }
                    MonitorState::Faulted => {
                        let threshold = monitor.warn_threshold();
                        self.record_fault(SchedError::TimelinessFault {
                            task: task.clone(),
                            consecutive: verdict.consecutive,
                            threshold,
                        });
                        break;
                    }
                }
            }

            next_wake += period;
            if next_wake <= now {
                // more than a full period behind; re-seed instead of
                // replaying missed ticks as a burst
                trace!(task, "wake overran a full period, re-seeding schedule");
                next_wake = now + period;
            }
        }

        debug!(task, "dispatch loop exited");
    }

    /// Log the fault, store it for introspection, and request a global stop.
    fn record_fault(&self, fault: SchedError) {
        error!(%fault, "requesting global stop");
        if let Ok(mut slot) = self.fault.lock() {
            slot.get_or_insert(fault);
        }
        self.stop.set();
    }
}

/// Suspend until `deadline` or until the stop token is set.
///
/// Long waits are sliced so the token is observed at least every
/// [`STOP_POLL_SLICE`]; the final slice runs to the absolute deadline.
pub(crate) fn sleep_until(deadline: Instant, stop: &StopToken) {
    loop {
        if stop.is_set() {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        let remaining = deadline - now;
        if remaining > STOP_POLL_SLICE {
            std::thread::sleep(STOP_POLL_SLICE);
        } else {
            wait_final_slice(remaining);
            return;
        }
    }
}

/// High-precision sleep for the final slice before a tick.
#[cfg(target_os = "linux")]
fn wait_final_slice(remaining: Duration) {
    // clock_nanosleep on CLOCK_MONOTONIC for precision; relative here
    // since Instant does not expose a raw timespec for TIMER_ABSTIME.
    let ts = libc::timespec {
        tv_sec: remaining.as_secs() as libc::time_t,
        tv_nsec: remaining.subsec_nanos() as libc::c_long,
    };

    // SAFETY: clock_nanosleep only reads the request timespec
    unsafe {
        libc::clock_nanosleep(libc::CLOCK_MONOTONIC, 0, &ts, std::ptr::null_mut());
    }
}

#[cfg(not(target_os = "linux"))]
fn wait_final_slice(remaining: Duration) {
    std::thread::sleep(remaining);
}
