use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{info, warn};

const WARN_THRESHOLD: f64 = 0.75;
const REFUSE_THRESHOLD: f64 = 0.90;
const HARD_CEILING_BYTES: u64 = 3 * 1024 * 1024 * 1024;

/// Samples this process's resident set size against a soft memory budget, the
/// way a worker pool needs to know whether it's safe to accept another job.
/// Linux-only (`/proc/self/status`); on other platforms sampling always
/// reports healthy, since there's no portable equivalent in the dependency tree.
pub struct MemoryGovernor {
    budget_bytes: u64,
}

impl MemoryGovernor {
    pub fn new(budget_bytes: u64) -> Self {
        Self {
            budget_bytes: budget_bytes.min(HARD_CEILING_BYTES),
        }
    }

    pub fn sample_rss_bytes() -> Option<u64> {
        #[cfg(target_os = "linux")]
        {
            let status = std::fs::read_to_string("/proc/self/status").ok()?;
            for line in status.lines() {
                if let Some(rest) = line.strip_prefix("VmRSS:") {
                    let kb: u64 = rest.trim().trim_end_matches(" kB").trim().parse().ok()?;
                    return Some(kb * 1024);
                }
            }
            None
        }
        #[cfg(not(target_os = "linux"))]
        {
            None
        }
    }

    /// `true` if a new job should be refused right now.
    pub fn should_refuse(&self) -> bool {
        match Self::sample_rss_bytes() {
            Some(rss) => rss as f64 / self.budget_bytes as f64 >= REFUSE_THRESHOLD,
            None => false,
        }
    }

    pub fn log_if_elevated(&self) {
        let Some(rss) = Self::sample_rss_bytes() else {
            return;
        };
        let ratio = rss as f64 / self.budget_bytes as f64;
        if ratio >= REFUSE_THRESHOLD {
            warn!(rss_bytes = rss, ratio, "memory usage above refuse threshold");
        } else if ratio >= WARN_THRESHOLD {
            warn!(rss_bytes = rss, ratio, "memory usage elevated");
        }
    }
}

/// Rolling processed/failed/average-duration counters per worker class, the
/// source for the "estimated sustainable throughput" figure the CV worker
/// reports on its periodic emission.
#[derive(Clone)]
pub struct ThroughputCounter {
    processed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
    total_millis: Arc<AtomicU64>,
}

impl Default for ThroughputCounter {
    fn default() -> Self {
        Self {
            processed: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
            total_millis: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl ThroughputCounter {
    pub fn record_success(&self, elapsed: Duration) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.total_millis
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn average_millis(&self) -> f64 {
        let processed = self.processed.load(Ordering::Relaxed);
        if processed == 0 {
            return 0.0;
        }
        self.total_millis.load(Ordering::Relaxed) as f64 / processed as f64
    }

    /// `concurrency * 3_600_000 / avg_ms`, the capacity estimate spec.md asks for.
    pub fn sustainable_per_hour(&self, concurrency: u32) -> f64 {
        let avg_ms = self.average_millis();
        if avg_ms <= 0.0 {
            return 0.0;
        }
        concurrency as f64 * 3_600_000.0 / avg_ms
    }

    pub fn log_summary(&self, label: &str, concurrency: u32) {
        info!(
            worker = label,
            processed = self.processed.load(Ordering::Relaxed),
            failed = self.failed.load(Ordering::Relaxed),
            avg_ms = self.average_millis(),
            sustainable_per_hour = self.sustainable_per_hour(concurrency),
            "throughput summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sustainable_throughput_scales_with_concurrency_and_average_duration() {
        let counter = ThroughputCounter::default();
        counter.record_success(Duration::from_millis(500));
        counter.record_success(Duration::from_millis(1500));
        // average is 1000ms
        let per_hour = counter.sustainable_per_hour(8);
        assert!((per_hour - 28_800.0).abs() < 0.001);
    }

    #[test]
    fn zero_samples_reports_zero_throughput() {
        let counter = ThroughputCounter::default();
        assert_eq!(counter.sustainable_per_hour(8), 0.0);
    }

    #[test]
    fn governor_budget_is_capped_at_the_hard_ceiling() {
        let governor = MemoryGovernor::new(u64::MAX);
        assert_eq!(governor.budget_bytes, HARD_CEILING_BYTES);
    }
}
