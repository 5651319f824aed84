use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Outcome of one broadcast pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Connections listed at the start of the pass
    pub attempted: usize,
    pub delivered_count: usize,
    /// Connections that reported gone and were scheduled for removal
    pub stale_count: usize,
    /// Connections that failed transiently and were kept
    pub transient_count: usize,
    /// Stale connections whose removal failed (retried on the next pass)
    pub removal_failures: usize,
}

impl DeliveryReport {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Running totals for the fanout engine
#[derive(Debug, Default)]
pub struct FanoutStats {
    pub passes: AtomicU64,
    pub failed_passes: AtomicU64,
    pub delivered: AtomicU64,
    pub stale_removed: AtomicU64,
    pub transient_failures: AtomicU64,
    pub connects: AtomicU64,
    pub disconnects: AtomicU64,
    pub lifecycle_failures: AtomicU64,
}

impl FanoutStats {
    pub fn record_pass(&self, report: &DeliveryReport) {
        self.passes.fetch_add(1, Ordering::Relaxed);
        self.delivered
            .fetch_add(report.delivered_count as u64, Ordering::Relaxed);
        self.stale_removed.fetch_add(
            (report.stale_count - report.removal_failures) as u64,
            Ordering::Relaxed,
        );
        self.transient_failures
            .fetch_add(report.transient_count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FanoutStatsSnapshot {
        FanoutStatsSnapshot {
            passes: self.passes.load(Ordering::Relaxed),
            failed_passes: self.failed_passes.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            stale_removed: self.stale_removed.load(Ordering::Relaxed),
            transient_failures: self.transient_failures.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            lifecycle_failures: self.lifecycle_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FanoutStatsSnapshot {
    pub passes: u64,
    pub failed_passes: u64,
    pub delivered: u64,
    pub stale_removed: u64,
    pub transient_failures: u64,
    pub connects: u64,
    pub disconnects: u64,
    pub lifecycle_failures: u64,
}
