//! Message velocity tracking.
//!
//! A single process-wide counter is incremented by every worker and sampled
//! by one periodic reporter. The counter is the only shared mutable state in
//! the workload: a lock-free atomic, safe under unbounded concurrent
//! callers, monotonically non-decreasing for the life of the process and
//! never reset.
//!
//! The counter is constructed once per run and passed by `Arc` through
//! worker configuration; there is no ambient global state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::constants::REPORT_INTERVAL;

/// Process-wide count of messages handled.
#[derive(Debug, Default)]
pub struct VelocityCounter {
    total: AtomicU64,
}

impl VelocityCounter {
    /// Create a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one handled message.
    ///
    /// Lock-free; relaxed ordering is sufficient because the reporter only
    /// needs an eventually-consistent total, not a synchronization point.
    pub fn increment(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Current total.
    pub fn snapshot(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

/// Periodic reporter logging messages-per-second.
///
/// Exactly one reporter reads the counter. It samples every
/// [`REPORT_INTERVAL`] until the shared token is cancelled, then logs a
/// stop notice and exits.
pub struct VelocityReporter {
    label: &'static str,
    counter: Arc<VelocityCounter>,
    token: CancellationToken,
}

impl VelocityReporter {
    /// Create a reporter. `label` names the measured direction
    /// ("produce" or "consume") in the emitted samples.
    pub fn new(label: &'static str, counter: Arc<VelocityCounter>, token: CancellationToken) -> Self {
        Self {
            label,
            counter,
            token,
        }
    }

    /// Messages per second for `total` messages over `elapsed`.
    ///
    /// An elapsed time of zero yields a rate of zero, not a division fault;
    /// the reporter may fire before any worker has incremented.
    pub fn rate(total: u64, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs <= f64::EPSILON {
            return 0.0;
        }
        total as f64 / secs
    }

    /// Run the sampling loop until cancellation.
    pub async fn run(self) {
        let start = Instant::now();
        loop {
            tokio::select! {
                _ = self.token.cancelled() => {
                    info!("{} velocity reporter stopped", self.label);
                    return;
                }
                _ = tokio::time::sleep(REPORT_INTERVAL) => {}
            }

            let elapsed = start.elapsed();
            let mps = Self::rate(self.counter.snapshot(), elapsed);
            info!(
                "time elapsed: {:.1?}. {} velocity: {:.4} msg/s",
                elapsed, self.label, mps
            );
        }
    }
}
