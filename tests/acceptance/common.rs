//! Common utilities for integration tests.
//!
//! Provides helpers for:
//! - Building CI-friendly scheduler configurations
//! - Counting task invocations
//! - Waiting on stop tokens with a timeout

#![allow(dead_code)] // Not every helper is used by every test module

use metronome_common::config::{SchedulerConfig, TimelinessConfig};
use metronome_sched::{StopToken, TaskError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Scheduler configuration suitable for unprivileged CI runners.
///
/// Real-time scheduling is disabled so tasks run at normal priority,
/// and the timeliness tolerance is widened so ordinary CI jitter does
/// not trip the monitor in tests that are not about faults.
pub fn ci_config() -> SchedulerConfig {
    let mut config = SchedulerConfig::default();
    config.realtime.enabled = false;
    config.timeliness = TimelinessConfig {
        enabled: true,
        tolerance: Some(Duration::from_secs(1)),
        warn_threshold: 3,
    };
    config
}

/// Like [`ci_config`] but with a tight timeliness budget, for tests
/// that provoke a fault deliberately.
pub fn strict_timeliness_config(tolerance: Duration, warn_threshold: u32) -> SchedulerConfig {
    let mut config = ci_config();
    config.timeliness = TimelinessConfig {
        enabled: true,
        tolerance: Some(tolerance),
        warn_threshold,
    };
    config
}

/// A callback that bumps the shared counter on every invocation.
pub fn counting_callback(
    counter: &Arc<AtomicU64>,
) -> impl FnMut() -> Result<(), TaskError> + Send + 'static {
    let counter = Arc::clone(counter);
    move || {
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Poll a stop token until it is set or the timeout expires.
///
/// Returns `true` if the token was set in time.
pub fn wait_for_stop(token: &StopToken, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if token.is_set() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    token.is_set()
}
