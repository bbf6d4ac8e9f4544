//! Pressure monitoring and cascading eviction
//!
//! A background loop samples global cache usage; when utilization crosses
//! the high-water mark, whole namespaces are cleared in the configured
//! priority order (least business-critical first) until utilization drops
//! below the low-water mark. The same cascade runs inline when a write
//! would breach the global ceiling.

use crate::manager::CacheManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Outcome of one cascading eviction.
#[derive(Debug, Clone)]
pub struct PressureReport {
    pub before_percent: f64,
    pub after_percent: f64,
    /// Namespaces fully cleared, in the order they were cleared
    pub cleared: Vec<String>,
}

impl CacheManager {
    /// One monitor tick: fire the cascade if utilization exceeds the
    /// high-water mark. Returns what happened, if anything.
    pub fn check_pressure(&self) -> Option<PressureReport> {
        let utilization = self.utilization_percent();
        if utilization <= self.high_water_percent() {
            debug!(
                utilization_percent = utilization,
                "cache pressure below high-water mark"
            );
            return None;
        }
        Some(self.relieve(None))
    }

    /// Clear namespaces in cascade order until utilization drops to the
    /// low-water mark, stopping as soon as the target is met. `spare`
    /// protects the namespace a write is currently landing in.
    pub(crate) fn relieve(&self, spare: Option<&str>) -> PressureReport {
        let before_percent = self.utilization_percent();
        let mut cleared = Vec::new();

        for name in self.cascade_order() {
            if self.utilization_percent() <= self.low_water_percent() {
                break;
            }
            if spare == Some(name.as_str()) {
                continue;
            }
            if let Some(ns) = self.namespace_by_name(name) {
                if ns.entry_count() == 0 {
                    continue;
                }
                let freed = ns.clear();
                debug!(namespace = %name, freed_bytes = freed, "cleared namespace under pressure");
                cleared.push(name.clone());
            }
        }

        let after_percent = self.utilization_percent();
        warn!(
            before_percent,
            after_percent,
            cleared = ?cleared,
            "cache pressure eviction fired"
        );
        PressureReport {
            before_percent,
            after_percent,
            cleared,
        }
    }
}

/// Periodic loop driving `check_pressure`.
pub struct PressureMonitor;

impl PressureMonitor {
    pub fn spawn(manager: Arc<CacheManager>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; skip it so the monitor
            // only samples after one full interval.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                manager.check_pressure();
            }
        })
    }
}
