//! Timeliness monitor: detects and classifies deadline overruns of a
//! single periodic task.
//!
//! On each invocation the monitor compares the measured interval since
//! the previous invocation against the task's period. An interval more
//! than the configured tolerance over the period is a violation: one
//! violation warns (transient OS jitter), `warn_threshold` consecutive
//! violations fault. A fault is terminal for the task and the owning
//! scheduler is expected to stop everything, since sustained misses mean
//! the host cannot hold the requested rate.

use metronome_common::config::TimelinessConfig;
use std::time::{Duration, Instant};

/// Threshold state machine of one monitored task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitorState {
    /// Deadlines are being met.
    #[default]
    Nominal,
    /// At least one recent violation; recovers on the next on-time tick.
    Warned,
    /// Sustained violations; terminal.
    Faulted,
}

/// Outcome of one [`TimelinessMonitor::observe`] call.
#[derive(Debug, Clone, Copy)]
pub struct MonitorVerdict {
    /// State after this observation.
    pub state: MonitorState,
    /// Signed deviation of the measured interval from the period, in
    /// nanoseconds. Zero for the arming observation.
    pub jitter_ns: i64,
    /// Current consecutive violation count.
    pub consecutive: u32,
    /// Cumulative violation count since construction.
    pub total_violations: u64,
}

impl MonitorVerdict {
    /// True when this observation crossed into `Warned` or stayed late.
    #[must_use]
    pub fn is_violation(&self) -> bool {
        self.consecutive > 0
    }
}

/// Deadline-overrun detector for one periodic task.
#[derive(Debug)]
pub struct TimelinessMonitor {
    period: Duration,
    /// Allowed excess over the period before an interval is a violation.
    tolerance: Duration,
    /// Consecutive violations before entering `Faulted`.
    warn_threshold: u32,
    state: MonitorState,
    previous: Option<Instant>,
    consecutive: u32,
    total_violations: u64,
}

impl TimelinessMonitor {
    /// Create a monitor for a task with the given period.
    ///
    /// When `config.tolerance` is unset the tolerance defaults to one
    /// full period, i.e. an invocation is a violation once it arrives
    /// later than two periods after the previous one.
    #[must_use]
    pub fn new(period: Duration, config: &TimelinessConfig) -> Self {
        Self {
            period,
            tolerance: config.tolerance.unwrap_or(period),
            warn_threshold: config.warn_threshold.max(1),
            state: MonitorState::Nominal,
            previous: None,
            consecutive: 0,
            total_violations: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// The configured consecutive-violation threshold.
    #[must_use]
    pub fn warn_threshold(&self) -> u32 {
        self.warn_threshold
    }

    /// Record an invocation at `now` and classify it.
    ///
    /// The first observation only arms the baseline. Once `Faulted`, the
    /// monitor stays faulted regardless of later intervals.
    pub fn observe(&mut self, now: Instant) -> MonitorVerdict {
        let Some(previous) = self.previous.replace(now) else {
            return self.verdict(0);
        };

        if self.state == MonitorState::Faulted {
            return self.verdict(Self::jitter_ns(now - previous, self.period));
        }

        let interval = now - previous;
        let jitter = Self::jitter_ns(interval, self.period);

        if interval > self.period + self.tolerance {
            self.consecutive += 1;
            self.total_violations += 1;
            self.state = if self.consecutive >= self.warn_threshold {
                MonitorState::Faulted
            } else {
                MonitorState::Warned
            };
        } else {
            // any on-time invocation recovers a warned task
            self.consecutive = 0;
            self.state = MonitorState::Nominal;
        }

        self.verdict(jitter)
    }

    fn verdict(&self, jitter_ns: i64) -> MonitorVerdict {
        MonitorVerdict {
            state: self.state,
            jitter_ns,
            consecutive: self.consecutive,
            total_violations: self.total_violations,
        }
    }

    fn jitter_ns(interval: Duration, period: Duration) -> i64 {
        interval.as_nanos() as i64 - period.as_nanos() as i64
    }
}
