//! Priority mapping between the scheduler's logical scale and the host's
//! real-time priority band.
//!
//! Logical priorities are small integers, 0 = lowest. 0 maps to the normal
//! time-sharing class; 1 and above map monotonically into the host's
//! real-time band (SCHED_FIFO or SCHED_RR on Linux). The usable ceiling is
//! queried once at construction: it is the native band maximum, further
//! capped by RLIMIT_RTPRIO for unprivileged processes.
//!
//! Elevation failures degrade gracefully: a task denied its requested
//! priority keeps running at the best available class with a warning, it
//! never fails the whole scheduler.

use metronome_common::config::{RealtimeConfig, SchedPolicy};
use tracing::{debug, warn};

/// Maps logical task priorities onto the host scheduling facilities.
#[derive(Debug, Clone)]
pub struct PriorityMapper {
    policy: SchedPolicy,
    /// Lowest native priority of the real-time band.
    native_min: i32,
    /// Highest native priority this process may request.
    native_ceiling: i32,
    /// Highest logical priority callers may register.
    max_logical: u8,
}

impl PriorityMapper {
    /// Query the host environment and build the mapper.
    ///
    /// The result is fixed for the lifetime of the process; callers should
    /// read [`max_priority`](Self::max_priority) before registering tasks
    /// with elevated priority.
    #[must_use]
    pub fn new(config: &RealtimeConfig) -> Self {
        if !config.enabled || config.policy == SchedPolicy::Other {
            debug!("real-time elevation disabled, all tasks run in the normal class");
            return Self::from_band(config.policy, 0, -1);
        }

        let (native_min, native_ceiling) = Self::query_native_band(config.policy);
        let mapper = Self::from_band(config.policy, native_min, native_ceiling);
        debug!(
            policy = ?mapper.policy,
            native_min = mapper.native_min,
            native_ceiling = mapper.native_ceiling,
            max_priority = mapper.max_logical,
            "priority mapper initialized"
        );
        mapper
    }

    /// Build from an explicit native band. `native_ceiling < native_min`
    /// means no real-time band is usable.
    fn from_band(policy: SchedPolicy, native_min: i32, native_ceiling: i32) -> Self {
        let max_logical = if native_ceiling >= native_min && native_min >= 0 {
            // logical 1 -> native_min, so the span above 0 is ceiling - min + 1
            (native_ceiling - native_min + 1).clamp(0, i32::from(u8::MAX)) as u8
        } else {
            0
        };
        Self {
            policy,
            native_min,
            native_ceiling,
            max_logical,
        }
    }

    /// The highest logical priority this process is permitted to request.
    ///
    /// Constant for the lifetime of the process. 0 means no real-time
    /// elevation is available and every task runs in the normal class.
    #[must_use]
    pub fn max_priority(&self) -> u8 {
        self.max_logical
    }

    /// Map a logical priority to its native real-time priority.
    ///
    /// Returns `None` for logical 0 (normal class). The mapping is
    /// monotonic: a strictly larger logical priority never maps below a
    /// smaller one, and never above the permitted ceiling.
    #[must_use]
    pub fn map(&self, logical: u8) -> Option<i32> {
        if logical == 0 || self.max_logical == 0 {
            return None;
        }
        let native = self.native_min + i32::from(logical.min(self.max_logical)) - 1;
        Some(native.min(self.native_ceiling))
    }

    /// Apply the mapped priority to the calling thread.
    ///
    /// Returns `true` if the requested class was applied, `false` if the
    /// thread was left degraded (logged, never fatal).
    pub fn apply_to_current_thread(&self, logical: u8, task: &str) -> bool {
        let Some(native) = self.map(logical) else {
            debug!(task, "task runs in the normal scheduling class");
            return true;
        };
        self.set_current_thread_priority(native, task)
    }

    /// Query `[min, permitted max]` of the native real-time band.
    #[cfg(target_os = "linux")]
    fn query_native_band(policy: SchedPolicy) -> (i32, i32) {
        let linux_policy = match policy {
            SchedPolicy::Fifo => libc::SCHED_FIFO,
            SchedPolicy::Rr => libc::SCHED_RR,
            SchedPolicy::Other => return (0, -1),
        };

        // SAFETY: sched_get_priority_* take only a policy constant
        let native_min = unsafe { libc::sched_get_priority_min(linux_policy) };
        let native_max = unsafe { libc::sched_get_priority_max(linux_policy) };
        if native_min < 0 || native_max < 0 {
            return (0, -1);
        }

        // Root may use the whole band; otherwise RLIMIT_RTPRIO caps it
        // SAFETY: geteuid has no preconditions
        if unsafe { libc::geteuid() } == 0 {
            return (native_min, native_max);
        }

        let mut rlim = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        // SAFETY: getrlimit writes into the rlimit struct we own
        if unsafe { libc::getrlimit(libc::RLIMIT_RTPRIO, &mut rlim) } != 0 {
            return (0, -1);
        }
        let permitted = i64::try_from(rlim.rlim_cur).unwrap_or(0).min(i64::from(native_max)) as i32;
        (native_min, permitted)
    }

    #[cfg(not(target_os = "linux"))]
    fn query_native_band(_policy: SchedPolicy) -> (i32, i32) {
        warn!("real-time priority elevation not available on this platform");
        (0, -1)
    }

    /// Set the real-time class and priority of the calling thread.
    #[cfg(target_os = "linux")]
    fn set_current_thread_priority(&self, native: i32, task: &str) -> bool {
        let linux_policy = match self.policy {
            SchedPolicy::Fifo => libc::SCHED_FIFO,
            SchedPolicy::Rr => libc::SCHED_RR,
            SchedPolicy::Other => return true,
        };

        let param = libc::sched_param {
            sched_priority: native,
        };

        // SAFETY: pid 0 targets the calling thread; param outlives the call
        let result = unsafe { libc::sched_setscheduler(0, linux_policy, &param) };
        if result == 0 {
            debug!(task, native, policy = ?self.policy, "real-time priority applied");
            return true;
        }

        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EPERM) {
            warn!(
                task,
                native,
                "priority degraded: host denied real-time elevation (EPERM), \
                 continuing in the normal class"
            );
        } else {
            warn!(
                task,
                native,
                error = %err,
                "priority degraded: failed to set real-time class, \
                 continuing in the normal class"
            );
        }
        false
    }

    #[cfg(not(target_os = "linux"))]
    fn set_current_thread_priority(&self, native: i32, task: &str) -> bool {
        warn!(
            task,
            native, "priority degraded: real-time elevation not available on this platform"
        );
        false
    }
}

/// Lock all current and future memory pages to prevent page faults on the
/// dispatch hot path. EPERM (missing CAP_IPC_LOCK) is tolerated.
#[cfg(target_os = "linux")]
pub fn lock_memory() -> bool {
    use nix::sys::mman::{mlockall, MlockAllFlags};

    match mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE) {
        Ok(()) => {
            debug!("memory locked");
            true
        }
        Err(e) => {
            warn!(
                error = %e,
                "mlockall failed, page faults may occur during dispatch"
            );
            false
        }
    }
}

/// Memory locking is not available on this platform.
#[cfg(not(target_os = "linux"))]
pub fn lock_memory() -> bool {
    warn!("mlockall not available on this platform");
    false
}
