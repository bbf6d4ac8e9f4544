//! Metric recording for tracked operations
//!
//! Per-operation rolling aggregates (count, total time, max time, errors)
//! plus counters for cache write skips.

use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Records latency and error counters per named operation.
pub struct MetricsRecorder {
    operations: RwLock<HashMap<String, OpMetric>>,
    write_skips: AtomicU64,
    start_time: Instant,
}

#[derive(Debug, Default, Clone)]
struct OpMetric {
    count: u64,
    total: Duration,
    max: Duration,
    errors: u64,
}

/// Snapshot of one operation's rolling aggregate.
#[derive(Debug, Clone, Serialize)]
pub struct OperationStats {
    pub count: u64,
    pub total_ms: u64,
    pub max_ms: u64,
    pub avg_ms: f64,
    pub errors: u64,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            operations: RwLock::new(HashMap::new()),
            write_skips: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record one completed call of a named operation
    pub async fn record(&self, operation: &str, elapsed: Duration, is_error: bool) {
        let mut operations = self.operations.write().await;
        let metric = operations.entry(operation.to_string()).or_default();
        metric.count += 1;
        metric.total += elapsed;
        if elapsed > metric.max {
            metric.max = elapsed;
        }
        if is_error {
            metric.errors += 1;
        }
    }

    /// Time an async operation and record its outcome
    pub async fn track<F, T, E>(&self, operation: &str, fut: F) -> std::result::Result<T, E>
    where
        F: Future<Output = std::result::Result<T, E>>,
    {
        let started = Instant::now();
        let result = fut.await;
        self.record(operation, started.elapsed(), result.is_err())
            .await;
        result
    }

    /// Count a cache write that was skipped because the value was too large
    pub fn record_write_skip(&self, namespace: &str, size: u64) {
        self.write_skips.fetch_add(1, Ordering::Relaxed);
        debug!(
            namespace,
            size, "cache write skipped: value exceeds namespace budget"
        );
    }

    pub fn write_skips(&self) -> u64 {
        self.write_skips.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Snapshot all per-operation aggregates
    pub async fn snapshot(&self) -> HashMap<String, OperationStats> {
        let operations = self.operations.read().await;
        operations
            .iter()
            .map(|(name, m)| {
                let avg_ms = if m.count > 0 {
                    m.total.as_secs_f64() * 1000.0 / m.count as f64
                } else {
                    0.0
                };
                (
                    name.clone(),
                    OperationStats {
                        count: m.count,
                        total_ms: m.total.as_millis() as u64,
                        max_ms: m.max.as_millis() as u64,
                        avg_ms,
                        errors: m.errors,
                    },
                )
            })
            .collect()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn record_aggregates_count_max_and_errors() {
        let recorder = MetricsRecorder::new();
        recorder
            .record("records.list", Duration::from_millis(10), false)
            .await;
        recorder
            .record("records.list", Duration::from_millis(30), true)
            .await;

        let snapshot = recorder.snapshot().await;
        let stats = snapshot.get("records.list").unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.max_ms, 30);
        assert_eq!(stats.total_ms, 40);
        assert_eq!(stats.errors, 1);
        assert!((stats.avg_ms - 20.0).abs() < 1.0);
    }

    #[tokio::test]
    async fn track_records_success_and_failure() {
        let recorder = MetricsRecorder::new();

        let ok: Result<u32, String> = recorder.track("op", async { Ok(7) }).await;
        assert_eq!(assert_ok!(ok), 7);

        let err: Result<u32, String> = recorder.track("op", async { Err("boom".into()) }).await;
        assert!(err.is_err());

        let snapshot = recorder.snapshot().await;
        let stats = snapshot.get("op").unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.errors, 1);
    }

    #[tokio::test]
    async fn write_skips_counter() {
        let recorder = MetricsRecorder::new();
        assert_eq!(recorder.write_skips(), 0);
        recorder.record_write_skip("organizations", 1 << 20);
        recorder.record_write_skip("organizations", 2 << 20);
        assert_eq!(recorder.write_skips(), 2);
    }
}
