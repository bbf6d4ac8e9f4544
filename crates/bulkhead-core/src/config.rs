//! Configuration for the bulkhead layer
//!
//! Read once at startup; the layer does not support live reconfiguration.

use crate::error::{BulkheadError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration file names to search for
pub const CONFIG_FILE_NAMES: &[&str] = &[
    "bulkhead.config.yaml",
    "bulkhead.config.yml",
    "bulkhead.config.json",
];

/// One logical cache partition with its own budget and eviction scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
    /// Namespace name, e.g. "organizations" or "search-results"
    pub name: String,
    /// Maximum entry count
    pub max_entries: usize,
    /// Maximum byte budget
    pub max_bytes: u64,
    /// Entry time-to-live in seconds; 0 disables expiry
    pub ttl_secs: u64,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            max_entries: 10_000,
            max_bytes: 16 * 1024 * 1024,
            ttl_secs: 300,
        }
    }
}

impl NamespaceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_budget(mut self, max_entries: usize, max_bytes: u64) -> Self {
        self.max_entries = max_entries;
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }
}

/// Admission controller configuration.
///
/// The controller always queues excess requests; a bounded queue with hard
/// rejection would be added here as a variant if backpressure is ever needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Maximum concurrently in-flight logical operations
    pub max_concurrent: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self { max_concurrent: 10 }
    }
}

/// Micro-batcher configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// How long a batch window stays open after the first arrival
    pub window_ms: u64,
    /// Window closes immediately once this many members have joined
    pub max_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            window_ms: 50,
            max_batch_size: 25,
        }
    }
}

/// Pressure monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureConfig {
    /// Monitoring interval in seconds
    pub interval_secs: u64,
    /// Utilization percent above which cascading eviction fires
    pub high_water_percent: u8,
    /// Utilization percent the cascade evicts down to
    pub low_water_percent: u8,
    /// Namespaces to clear under pressure, least business-critical first.
    /// Empty means declaration order of `namespaces`.
    pub eviction_priority: Vec<String>,
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            high_water_percent: 85,
            low_water_percent: 70,
            eviction_priority: Vec::new(),
        }
    }
}

/// Query complexity budget and scoring weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryLimits {
    /// Maximum permitted complexity for a single read
    pub complexity_budget: u32,
    /// Maximum include breadth after rewriting
    pub max_includes: usize,
    /// Maximum include nesting depth; 1 means no nested includes survive
    pub max_include_depth: usize,
    /// Maximum page size after clamping
    pub max_page_size: u32,
    /// Filter trees above this many conditions get flagged
    pub max_filter_conditions: u32,
    /// Base cost of any read
    pub base_cost: u32,
    /// Heavy weight per included relation
    pub include_weight: u32,
    /// Bonus when any include itself requests a nested include
    pub nested_include_bonus: u32,
    /// Light weight per filter condition
    pub filter_weight: u32,
    /// Medium weight per sort field
    pub sort_weight: u32,
    /// Weight added when page size exceeds the maximum
    pub page_overage_weight: u32,
    /// Weight per 1000 rows of page offset, penalizing deep pagination
    pub offset_weight_per_1k: u32,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            complexity_budget: 100,
            max_includes: 3,
            max_include_depth: 1,
            max_page_size: 100,
            max_filter_conditions: 10,
            base_cost: 1,
            include_weight: 10,
            nested_include_bonus: 15,
            filter_weight: 2,
            sort_weight: 5,
            page_overage_weight: 20,
            offset_weight_per_1k: 5,
        }
    }
}

/// Top-level configuration for the bulkhead layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkheadConfig {
    /// Hard ceiling on total bytes across all namespaces
    pub global_ceiling_bytes: u64,
    pub namespaces: Vec<NamespaceConfig>,
    pub admission: AdmissionConfig,
    pub batch: BatchConfig,
    pub pressure: PressureConfig,
    pub query: QueryLimits,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            global_ceiling_bytes: 64 * 1024 * 1024,
            namespaces: Vec::new(),
            admission: AdmissionConfig::default(),
            batch: BatchConfig::default(),
            pressure: PressureConfig::default(),
            query: QueryLimits::default(),
        }
    }
}

impl BulkheadConfig {
    /// Find a configuration file in a directory
    pub fn find_config_file(dir: &Path) -> Option<PathBuf> {
        for name in CONFIG_FILE_NAMES {
            let path = dir.join(name);
            if path.exists() {
                return Some(path);
            }
        }
        None
    }

    /// Load configuration from a file, picking the parser by extension
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(config_path)?;
        let config: Self = if config_path
            .extension()
            .map(|e| e == "json")
            .unwrap_or(false)
        {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a directory (searches for config files)
    pub fn load_from_directory(dir: &Path) -> Result<(Self, PathBuf)> {
        let config_path = Self::find_config_file(dir)
            .ok_or_else(|| BulkheadError::ConfigNotFound(dir.display().to_string()))?;
        let config = Self::load(&config_path)?;
        Ok((config, config_path))
    }

    /// Validate internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.global_ceiling_bytes == 0 {
            return Err(BulkheadError::InvalidConfig(
                "global_ceiling_bytes must be greater than zero".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for ns in &self.namespaces {
            if ns.name.is_empty() {
                return Err(BulkheadError::InvalidConfig(
                    "namespace name must not be empty".to_string(),
                ));
            }
            if !seen.insert(&ns.name) {
                return Err(BulkheadError::InvalidConfig(format!(
                    "duplicate namespace: {}",
                    ns.name
                )));
            }
            if ns.max_bytes == 0 || ns.max_entries == 0 {
                return Err(BulkheadError::InvalidConfig(format!(
                    "namespace {} must have non-zero budgets",
                    ns.name
                )));
            }
        }

        for name in &self.pressure.eviction_priority {
            if !seen.contains(name) {
                return Err(BulkheadError::InvalidConfig(format!(
                    "eviction_priority references unknown namespace: {}",
                    name
                )));
            }
        }

        if self.pressure.high_water_percent > 100
            || self.pressure.low_water_percent >= self.pressure.high_water_percent
        {
            return Err(BulkheadError::InvalidConfig(format!(
                "pressure water marks must satisfy low < high <= 100, got low={} high={}",
                self.pressure.low_water_percent, self.pressure.high_water_percent
            )));
        }

        if self.admission.max_concurrent == 0 {
            return Err(BulkheadError::InvalidConfig(
                "admission.max_concurrent must be greater than zero".to_string(),
            ));
        }

        if self.batch.window_ms == 0 || self.batch.max_batch_size == 0 {
            return Err(BulkheadError::InvalidConfig(
                "batch window and size must be greater than zero".to_string(),
            ));
        }

        if self.query.complexity_budget == 0 || self.query.max_page_size == 0 {
            return Err(BulkheadError::InvalidConfig(
                "query budget and max_page_size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> BulkheadConfig {
        BulkheadConfig {
            namespaces: vec![
                NamespaceConfig::new("organizations"),
                NamespaceConfig::new("search-results"),
            ],
            ..BulkheadConfig::default()
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn rejects_duplicate_namespace() {
        let mut config = base_config();
        config.namespaces.push(NamespaceConfig::new("organizations"));
        assert!(matches!(
            config.validate(),
            Err(BulkheadError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_inverted_water_marks() {
        let mut config = base_config();
        config.pressure.low_water_percent = 90;
        config.pressure.high_water_percent = 85;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_eviction_priority_entry() {
        let mut config = base_config();
        config.pressure.eviction_priority = vec!["no-such-namespace".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_concurrency() {
        let mut config = base_config();
        config.admission.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_yaml_config() -> Result<()> {
        let temp_dir_name = format!(
            "bulkhead_config_test_{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        );
        let temp_dir = std::env::temp_dir().join(temp_dir_name);
        std::fs::create_dir_all(&temp_dir)?;

        let content = r#"
global_ceiling_bytes: 1048576
namespaces:
  - name: organizations
    max_entries: 100
    max_bytes: 524288
    ttl_secs: 60
  - name: search-results
pressure:
  eviction_priority:
    - search-results
    - organizations
"#;
        let config_path = temp_dir.join("bulkhead.config.yaml");
        std::fs::write(&config_path, content)?;

        let (config, found_path) = BulkheadConfig::load_from_directory(&temp_dir)?;
        let _ = std::fs::remove_dir_all(&temp_dir);

        assert_eq!(found_path, config_path);
        assert_eq!(config.global_ceiling_bytes, 1_048_576);
        assert_eq!(config.namespaces.len(), 2);
        assert_eq!(config.namespaces[0].max_entries, 100);
        // Unspecified fields fall back to defaults
        assert_eq!(config.namespaces[1].max_entries, 10_000);
        assert_eq!(config.batch.window_ms, 50);
        assert_eq!(
            config.pressure.eviction_priority,
            vec!["search-results".to_string(), "organizations".to_string()]
        );
        Ok(())
    }

    #[test]
    fn missing_config_dir_reports_not_found() {
        let dir = std::env::temp_dir().join("bulkhead_no_config_here");
        let _ = std::fs::create_dir_all(&dir);
        let err = BulkheadConfig::load_from_directory(&dir).unwrap_err();
        assert!(matches!(err, BulkheadError::ConfigNotFound(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
