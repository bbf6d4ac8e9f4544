//! Resource governor facade
//!
//! Wires the cache manager, admission controller, micro-batcher and metric
//! recorder into one explicitly constructed object. Build one instance at
//! startup and share it by `Arc`; there are no module-level globals.

use bulkhead_admission::{AdmissionController, AdmissionPermit, MicroBatcher};
use bulkhead_cache::{CacheManager, PressureMonitor};
use bulkhead_core::{
    query, BulkheadConfig, ComplexityReport, HealthSnapshot, MetricsRecorder, Priority,
    QueryDescriptor, Result,
};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// The resource-governance layer, one instance per process.
pub struct ResourceGovernor {
    config: BulkheadConfig,
    metrics: Arc<MetricsRecorder>,
    cache: Arc<CacheManager>,
    admission: Arc<AdmissionController>,
    batcher: MicroBatcher<Value, Value>,
}

impl ResourceGovernor {
    /// Validate the configuration and build the layer. Configuration is
    /// read once; there is no live reconfiguration.
    pub fn new(config: BulkheadConfig) -> Result<Self> {
        config.validate()?;
        let metrics = Arc::new(MetricsRecorder::new());
        let cache = Arc::new(CacheManager::new(&config, metrics.clone()));
        let admission = Arc::new(AdmissionController::new(&config.admission, metrics.clone()));
        let batcher = MicroBatcher::new(&config.batch);
        info!(
            namespaces = config.namespaces.len(),
            global_ceiling_bytes = config.global_ceiling_bytes,
            max_concurrent = config.admission.max_concurrent,
            "resource governor initialized"
        );
        Ok(Self {
            config,
            metrics,
            cache,
            admission,
            batcher,
        })
    }

    /// Spawn the background pressure monitor. Call once after startup; the
    /// returned handle can be aborted at shutdown.
    pub fn start(&self) -> JoinHandle<()> {
        PressureMonitor::spawn(
            self.cache.clone(),
            Duration::from_secs(self.config.pressure.interval_secs),
        )
    }

    pub fn cache_get(&self, namespace: &str, key: &str) -> Result<Option<Value>> {
        self.cache.get(namespace, key)
    }

    /// Write through to the cache. A value too large for its namespace is
    /// skipped silently (metric only); that is not an error.
    pub fn cache_set(&self, namespace: &str, key: &str, value: &Value) -> Result<()> {
        self.cache.set(namespace, key, value)?;
        Ok(())
    }

    /// Remove one key, or the whole namespace when `key` is `None`.
    pub fn cache_invalidate(&self, namespace: &str, key: Option<&str>) -> Result<()> {
        match key {
            Some(key) => self.cache.invalidate(namespace, key),
            None => self.cache.clear(namespace),
        }
    }

    /// Return the cached value if present, otherwise invoke `producer`,
    /// cache its result and return it. Latency is tracked per namespace.
    pub async fn with_cache<T, F, Fut>(&self, namespace: &str, key: &str, producer: F) -> Result<T>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let operation = format!("cache.{}", namespace);
        self.metrics
            .track(&operation, self.cache.with_cache(namespace, key, producer))
            .await
    }

    /// Score and, if necessary, rewrite a query descriptor to fit the
    /// configured complexity budget. Never fails.
    pub fn optimize_query(&self, descriptor: &QueryDescriptor) -> ComplexityReport {
        query::optimize(descriptor, &self.config.query)
    }

    /// Run `fut` once an admission slot is available.
    pub async fn admit<F, T>(&self, priority: Priority, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        self.admission.admit(priority, fut).await
    }

    /// Wait for an admission slot without wrapping the operation.
    pub async fn acquire(&self, priority: Priority) -> AdmissionPermit {
        self.admission.acquire(priority).await
    }

    /// Join or start the batch window for `key`.
    pub async fn batch<F, Fut>(&self, key: &str, request: Value, executor: F) -> Result<Value>
    where
        F: FnOnce(Vec<Value>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<Value>>> + Send,
    {
        self.batcher.execute(key, request, executor).await
    }

    /// Snapshot for external health reporting.
    pub async fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            uptime_secs: self.metrics.uptime().as_secs(),
            cache_utilization_percent: self.cache.utilization_percent(),
            cache_total_bytes: self.cache.total_bytes(),
            cache_global_ceiling_bytes: self.cache.global_ceiling(),
            cache_write_skips: self.metrics.write_skips(),
            namespaces: self.cache.usage(),
            admission: self.admission.status(),
            operations: self.metrics.snapshot().await,
        }
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }
}
