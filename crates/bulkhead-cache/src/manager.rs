//! Memory-budgeted cache manager
//!
//! Owns every namespace, enforces the global byte ceiling and provides the
//! typed get/set/invalidate surface plus the read-through helper.

use crate::namespace::Namespace;
use bulkhead_core::{BulkheadConfig, BulkheadError, MetricsRecorder, NamespaceUsage, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Cache manager over all configured namespaces.
///
/// Namespaces are created once from static configuration; the set never
/// changes afterwards, so lookups need no locking.
pub struct CacheManager {
    namespaces: HashMap<String, Arc<Namespace>>,
    /// Namespaces in pressure-eviction order, least business-critical first
    cascade_order: Vec<String>,
    global_ceiling: u64,
    high_water_percent: f64,
    low_water_percent: f64,
    metrics: Arc<MetricsRecorder>,
}

impl CacheManager {
    pub fn new(config: &BulkheadConfig, metrics: Arc<MetricsRecorder>) -> Self {
        let mut namespaces = HashMap::new();
        let mut declared = Vec::new();
        for ns in &config.namespaces {
            declared.push(ns.name.clone());
            namespaces.insert(
                ns.name.clone(),
                Arc::new(Namespace::new(
                    &ns.name,
                    ns.max_entries,
                    ns.max_bytes,
                    Duration::from_secs(ns.ttl_secs),
                )),
            );
        }
        // Configured priority first; namespaces it doesn't mention keep
        // their declaration order at the end (most protected).
        let mut cascade_order = config.pressure.eviction_priority.clone();
        for name in declared {
            if !cascade_order.contains(&name) {
                cascade_order.push(name);
            }
        }

        Self {
            namespaces,
            cascade_order,
            global_ceiling: config.global_ceiling_bytes,
            high_water_percent: config.pressure.high_water_percent as f64,
            low_water_percent: config.pressure.low_water_percent as f64,
            metrics,
        }
    }

    fn namespace(&self, name: &str) -> Result<&Arc<Namespace>> {
        self.namespaces
            .get(name)
            .ok_or_else(|| BulkheadError::UnknownNamespace(name.to_string()))
    }

    /// Raw lookup. Expired entries are absent.
    pub fn get_bytes(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.namespace(namespace)?.get(key))
    }

    /// Typed lookup. An entry that no longer deserializes is treated as
    /// absent and dropped rather than failing the caller.
    pub fn get<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Result<Option<T>> {
        let Some(bytes) = self.get_bytes(namespace, key)? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                debug!(namespace, key, error = %e, "dropping undecodable cache entry");
                self.invalidate(namespace, key)?;
                Ok(None)
            }
        }
    }

    /// Raw write. Returns false when the write was skipped because the
    /// value alone exceeds the namespace budget (fail-soft: the caller
    /// still has the value, it just goes uncached).
    pub fn set_bytes(&self, namespace: &str, key: &str, bytes: Vec<u8>) -> Result<bool> {
        let ns = self.namespace(namespace)?;
        let size = bytes.len() as u64;
        if size > ns.max_bytes() {
            self.metrics.record_write_skip(namespace, size);
            return Ok(false);
        }

        // Namespace-level LRU eviction happens inside insert.
        ns.insert(key, bytes);

        // If the write pushed the total over the global ceiling, relieve
        // pressure synchronously. The namespace just written is spared so
        // the write survives its own cascade.
        if self.total_bytes() > self.global_ceiling {
            self.relieve(Some(namespace));
        }
        Ok(true)
    }

    /// Serialize and write. Byte size is estimated from the serialized
    /// length; deliberately approximate.
    pub fn set<T: Serialize>(&self, namespace: &str, key: &str, value: &T) -> Result<bool> {
        let bytes = serde_json::to_vec(value)?;
        self.set_bytes(namespace, key, bytes)
    }

    pub fn invalidate(&self, namespace: &str, key: &str) -> Result<()> {
        self.namespace(namespace)?.remove(key);
        Ok(())
    }

    pub fn clear(&self, namespace: &str) -> Result<()> {
        self.namespace(namespace)?.clear();
        Ok(())
    }

    /// Return the cached value if present, otherwise invoke the producer,
    /// cache its result and return it.
    pub async fn with_cache<T, F, Fut>(&self, namespace: &str, key: &str, producer: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(cached) = self.get(namespace, key)? {
            return Ok(cached);
        }
        let value = producer().await?;
        self.set(namespace, key, &value)?;
        Ok(value)
    }

    pub fn total_bytes(&self) -> u64 {
        self.namespaces.values().map(|ns| ns.bytes_used()).sum()
    }

    pub fn utilization_percent(&self) -> f64 {
        self.total_bytes() as f64 / self.global_ceiling as f64 * 100.0
    }

    pub fn global_ceiling(&self) -> u64 {
        self.global_ceiling
    }

    /// Per-namespace usage in cascade order.
    pub fn usage(&self) -> Vec<NamespaceUsage> {
        self.cascade_order
            .iter()
            .filter_map(|name| self.namespaces.get(name))
            .map(|ns| ns.usage())
            .collect()
    }

    pub(crate) fn cascade_order(&self) -> &[String] {
        &self.cascade_order
    }

    pub(crate) fn namespace_by_name(&self, name: &str) -> Option<&Arc<Namespace>> {
        self.namespaces.get(name)
    }

    pub(crate) fn high_water_percent(&self) -> f64 {
        self.high_water_percent
    }

    pub(crate) fn low_water_percent(&self) -> f64 {
        self.low_water_percent
    }
}
