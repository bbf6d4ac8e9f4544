//! Shared data types for the bulkhead layer

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::metrics::OperationStats;

/// Priority of a logical operation awaiting an admission slot.
///
/// Ordering matters: `Low < Medium < High`. The admission controller serves
/// higher priorities first and is strictly FIFO within one priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
        }
    }
}

/// One requested relation include, possibly carrying nested includes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncludeSpec {
    /// Relation name to include
    pub relation: String,
    /// Nested includes requested through this relation
    #[serde(default)]
    pub nested: Vec<IncludeSpec>,
}

impl IncludeSpec {
    pub fn new(relation: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            nested: Vec::new(),
        }
    }

    pub fn with_nested(mut self, nested: Vec<IncludeSpec>) -> Self {
        self.nested = nested;
        self
    }
}

/// A filter tree: leaf conditions combined with AND/OR branches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterNode {
    Condition {
        field: String,
        op: String,
        value: serde_json::Value,
    },
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
}

impl FilterNode {
    /// Count leaf conditions, recursing through AND/OR branches.
    pub fn condition_count(&self) -> u32 {
        match self {
            FilterNode::Condition { .. } => 1,
            FilterNode::And(children) | FilterNode::Or(children) => {
                children.iter().map(FilterNode::condition_count).sum()
            }
        }
    }
}

/// One requested sort field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    #[serde(default)]
    pub descending: bool,
}

/// Abstract representation of a requested read. Constructed per call,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    #[serde(default)]
    pub includes: Vec<IncludeSpec>,
    #[serde(default)]
    pub filter: Option<FilterNode>,
    #[serde(default)]
    pub sort: Vec<SortField>,
    pub page_size: u32,
    #[serde(default)]
    pub page_offset: u64,
}

impl Default for QueryDescriptor {
    fn default() -> Self {
        Self {
            includes: Vec::new(),
            filter: None,
            sort: Vec::new(),
            page_size: 25,
            page_offset: 0,
        }
    }
}

impl QueryDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_includes(mut self, includes: Vec<IncludeSpec>) -> Self {
        self.includes = includes;
        self
    }

    pub fn with_filter(mut self, filter: FilterNode) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_sort(mut self, sort: Vec<SortField>) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_page(mut self, size: u32, offset: u64) -> Self {
        self.page_size = size;
        self.page_offset = offset;
        self
    }

    /// Total filter conditions across the whole tree.
    pub fn filter_condition_count(&self) -> u32 {
        self.filter.as_ref().map_or(0, FilterNode::condition_count)
    }
}

/// Snapshot of the admission controller for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct AdmissionStatus {
    /// Operations currently holding a slot
    pub running: usize,
    /// Configured concurrency ceiling
    pub max_concurrent: usize,
    /// Requests waiting for a slot
    pub queue_depth: usize,
}

/// Per-namespace usage for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct NamespaceUsage {
    pub name: String,
    pub bytes: u64,
    pub max_bytes: u64,
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Health snapshot exposed to external health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    /// Seconds since the governor was constructed
    pub uptime_secs: u64,
    /// Global cache utilization against the configured ceiling, 0-100
    pub cache_utilization_percent: f64,
    /// Total bytes held across all namespaces
    pub cache_total_bytes: u64,
    /// Configured global byte ceiling
    pub cache_global_ceiling_bytes: u64,
    /// Writes skipped because the value was larger than its namespace budget
    pub cache_write_skips: u64,
    /// Per-namespace usage
    pub namespaces: Vec<NamespaceUsage>,
    /// Admission controller state
    pub admission: AdmissionStatus,
    /// Per-operation latency statistics
    pub operations: HashMap<String, OperationStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering() {
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn filter_condition_count_recurses() {
        let filter = FilterNode::And(vec![
            FilterNode::Condition {
                field: "status".into(),
                op: "eq".into(),
                value: serde_json::json!("active"),
            },
            FilterNode::Or(vec![
                FilterNode::Condition {
                    field: "owner".into(),
                    op: "eq".into(),
                    value: serde_json::json!("a"),
                },
                FilterNode::Condition {
                    field: "owner".into(),
                    op: "eq".into(),
                    value: serde_json::json!("b"),
                },
            ]),
        ]);
        assert_eq!(filter.condition_count(), 3);
    }

    #[test]
    fn descriptor_defaults() {
        let d = QueryDescriptor::new();
        assert_eq!(d.page_size, 25);
        assert_eq!(d.page_offset, 0);
        assert!(d.includes.is_empty());
        assert_eq!(d.filter_condition_count(), 0);
    }
}
