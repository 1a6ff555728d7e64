//! Per-task interval metrics for jitter monitoring.
//!
//! Tracks measured inter-invocation intervals of one periodic task in a
//! ring buffer so the hot dispatch path never allocates.

use serde::Serialize;
use std::time::Duration;

/// Interval metrics with a ring buffer for jitter tracking.
///
/// One instance exists per registered task. The dispatch loop records the
/// measured interval between consecutive invocations; anything above the
/// violation threshold (period + tolerance) counts as a deadline miss.
#[derive(Debug)]
pub struct IntervalMetrics {
    /// Ring buffer of measured intervals in nanoseconds.
    samples: Box<[u64]>,
    /// Current write position in the ring buffer.
    write_pos: usize,
    /// Number of samples retained (saturates at buffer size).
    sample_count: usize,
    /// Total intervals recorded. One fewer than invocations: the first
    /// invocation only arms the previous-tick baseline.
    intervals_recorded: u64,
    /// Minimum observed interval in nanoseconds.
    min_ns: u64,
    /// Maximum observed interval in nanoseconds.
    max_ns: u64,
    /// Sum of all intervals for mean calculation.
    sum_ns: u64,
    /// Number of deadline misses detected.
    miss_count: u64,
    /// Nominal period of the task in nanoseconds.
    period_ns: u64,
    /// Interval above which an invocation counts as a deadline miss.
    violation_threshold_ns: u64,
}

impl IntervalMetrics {
    /// Create a new metrics collector.
    ///
    /// # Arguments
    ///
    /// * `histogram_size` - Number of samples retained in the ring buffer.
    /// * `period` - Nominal period of the monitored task.
    /// * `tolerance` - Allowed jitter above the period before an interval
    ///   counts as a deadline miss.
    #[must_use]
    pub fn new(histogram_size: usize, period: Duration, tolerance: Duration) -> Self {
        let size = histogram_size.max(1);
        let period_ns = period.as_nanos() as u64;
        Self {
            samples: vec![0u64; size].into_boxed_slice(),
            write_pos: 0,
            sample_count: 0,
            intervals_recorded: 0,
            min_ns: u64::MAX,
            max_ns: 0,
            sum_ns: 0,
            miss_count: 0,
            period_ns,
            violation_threshold_ns: period_ns.saturating_add(tolerance.as_nanos() as u64),
        }
    }

    /// Record a measured inter-invocation interval.
    ///
    /// Allocation-free for use on the dispatch hot path.
    pub fn record(&mut self, interval: Duration) {
        self.record_ns(interval.as_nanos() as u64);
    }

    /// Record an interval in nanoseconds directly.
    pub fn record_ns(&mut self, ns: u64) {
        self.samples[self.write_pos] = ns;
        self.write_pos = (self.write_pos + 1) % self.samples.len();
        self.sample_count = self.sample_count.saturating_add(1).min(self.samples.len());

        self.intervals_recorded += 1;
        self.min_ns = self.min_ns.min(ns);
        self.max_ns = self.max_ns.max(ns);
        self.sum_ns = self.sum_ns.wrapping_add(ns);

        if ns > self.violation_threshold_ns {
            self.miss_count += 1;
        }
    }

    /// Get total number of intervals recorded.
    ///
    /// A task invoked `n` times yields `n - 1` intervals.
    #[must_use]
    pub fn intervals_recorded(&self) -> u64 {
        self.intervals_recorded
    }

    /// Get minimum observed interval.
    #[must_use]
    pub fn min(&self) -> Option<Duration> {
        (self.intervals_recorded > 0).then(|| Duration::from_nanos(self.min_ns))
    }

    /// Get maximum observed interval.
    #[must_use]
    pub fn max(&self) -> Option<Duration> {
        (self.intervals_recorded > 0).then(|| Duration::from_nanos(self.max_ns))
    }

    /// Get mean observed interval.
    #[must_use]
    pub fn mean(&self) -> Option<Duration> {
        (self.intervals_recorded > 0)
            .then(|| Duration::from_nanos(self.sum_ns / self.intervals_recorded))
    }

    /// Get number of deadline misses.
    #[must_use]
    pub fn miss_count(&self) -> u64 {
        self.miss_count
    }

    /// Compute a percentile over the retained samples.
    ///
    /// Returns `None` if no samples have been recorded or if `percentile`
    /// is outside `0.0..=100.0`.
    #[must_use]
    pub fn percentile(&self, percentile: f64) -> Option<Duration> {
        if self.sample_count == 0 {
            return None;
        }
        if !(0.0..=100.0).contains(&percentile) || percentile.is_nan() {
            return None;
        }

        let mut sorted: Vec<u64> = self.samples[..self.sample_count].to_vec();
        sorted.sort_unstable();

        let idx = ((percentile / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        let idx = idx.min(sorted.len() - 1);

        Some(Duration::from_nanos(sorted[idx]))
    }

    /// Get a snapshot of the current metrics.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let populated = self.intervals_recorded > 0;
        MetricsSnapshot {
            intervals_recorded: self.intervals_recorded,
            period_ns: self.period_ns,
            min_ns: populated.then_some(self.min_ns),
            max_ns: populated.then_some(self.max_ns),
            mean_ns: populated.then(|| self.sum_ns / self.intervals_recorded),
            miss_count: self.miss_count,
            sample_count: self.sample_count,
        }
    }

    /// Reset all metrics to the initial state.
    pub fn reset(&mut self) {
        self.samples.fill(0);
        self.write_pos = 0;
        self.sample_count = 0;
        self.intervals_recorded = 0;
        self.min_ns = u64::MAX;
        self.max_ns = 0;
        self.sum_ns = 0;
        self.miss_count = 0;
    }
}

/// Immutable snapshot of one task's interval metrics.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricsSnapshot {
    /// Total inter-invocation intervals recorded (invocations minus one).
    pub intervals_recorded: u64,
    /// Nominal period of the task in nanoseconds.
    pub period_ns: u64,
    /// Minimum interval in nanoseconds.
    pub min_ns: Option<u64>,
    /// Maximum interval in nanoseconds.
    pub max_ns: Option<u64>,
    /// Mean interval in nanoseconds.
    pub mean_ns: Option<u64>,
    /// Number of deadline misses.
    pub miss_count: u64,
    /// Number of samples retained in the histogram.
    pub sample_count: usize,
}

impl MetricsSnapshot {
    /// Peak-to-peak jitter (max - min) in nanoseconds.
    #[must_use]
    pub fn jitter_ns(&self) -> Option<u64> {
        match (self.min_ns, self.max_ns) {
            (Some(min), Some(max)) => Some(max - min),
            _ => None,
        }
    }

    /// Signed mean drift from the nominal period in nanoseconds.
    #[must_use]
    pub fn mean_drift_ns(&self) -> Option<i64> {
        self.mean_ns
            .map(|mean| mean as i64 - self.period_ns as i64)
    }

    /// Serialize the snapshot as a JSON object, for log shipping and
    /// external tooling.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
