//! Query complexity governor
//!
//! Scores an abstract read shape and rewrites it to fit the configured
//! complexity budget before it reaches the underlying store. The governor
//! never fails: it always returns a best-effort descriptor plus warnings.

use crate::config::QueryLimits;
use crate::types::{IncludeSpec, QueryDescriptor, SortField};
use serde::Serialize;

/// Result of scoring and rewriting one descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct ComplexityReport {
    /// Complexity of the descriptor as returned (post-rewrite)
    pub complexity: u32,
    /// The clamped descriptor, safe to execute
    pub descriptor: QueryDescriptor,
    /// One entry per rewrite that changed the descriptor
    pub warnings: Vec<String>,
    /// Set when the filter tree is too complex to rewrite automatically;
    /// the caller decides how to react
    pub filter_warning: Option<String>,
}

/// Assign a numeric cost to a requested read shape.
pub fn score(descriptor: &QueryDescriptor, limits: &QueryLimits) -> u32 {
    let mut cost = limits.base_cost;

    cost = cost.saturating_add(
        (descriptor.includes.len() as u32).saturating_mul(limits.include_weight),
    );
    if descriptor.includes.iter().any(|i| !i.nested.is_empty()) {
        cost = cost.saturating_add(limits.nested_include_bonus);
    }

    cost = cost.saturating_add(
        descriptor
            .filter_condition_count()
            .saturating_mul(limits.filter_weight),
    );

    cost = cost.saturating_add((descriptor.sort.len() as u32).saturating_mul(limits.sort_weight));

    if descriptor.page_size > limits.max_page_size {
        cost = cost.saturating_add(limits.page_overage_weight);
    }

    let offset_units = (descriptor.page_offset / 1000).min(u32::MAX as u64) as u32;
    cost = cost.saturating_add(offset_units.saturating_mul(limits.offset_weight_per_1k));

    cost
}

/// Rewrite a descriptor that exceeds the budget.
///
/// Rewrites are applied in a fixed order and each one appends a warning.
/// Every rewrite is idempotent: re-optimizing the returned descriptor
/// produces no further warnings, even when unfixable cost (deep offsets,
/// large filter trees) keeps it above budget.
pub fn optimize(descriptor: &QueryDescriptor, limits: &QueryLimits) -> ComplexityReport {
    let mut rewritten = descriptor.clone();
    let mut warnings = Vec::new();
    let mut filter_warning = None;

    if score(descriptor, limits) > limits.complexity_budget {
        // 1. Truncate the include set: breadth first (last-declared dropped
        // first), then nesting beyond the depth limit.
        if rewritten.includes.len() > limits.max_includes {
            let dropped = rewritten.includes.len() - limits.max_includes;
            rewritten.includes.truncate(limits.max_includes);
            warnings.push(format!(
                "include set truncated to {} relations ({} dropped)",
                limits.max_includes, dropped
            ));
        }
        let depth_limit = limits.max_include_depth.max(1);
        if includes_deeper_than(&rewritten.includes, depth_limit) {
            for include in &mut rewritten.includes {
                prune_to_depth(include, depth_limit);
            }
            warnings.push(format!(
                "nested includes beyond depth {} removed",
                depth_limit
            ));
        }

        // 2. Clamp page size.
        if rewritten.page_size > limits.max_page_size {
            warnings.push(format!(
                "page size clamped from {} to {}",
                rewritten.page_size, limits.max_page_size
            ));
            rewritten.page_size = limits.max_page_size;
        }

        // 3. Inject a deterministic default sort so pagination stays stable.
        if rewritten.sort.is_empty() {
            rewritten.sort.push(SortField {
                field: "updated_at".to_string(),
                descending: true,
            });
            warnings.push("default sort by updated_at descending injected".to_string());
        }

        // 4. Flag (never drop) overly complex filter trees.
        let conditions = rewritten.filter_condition_count();
        if conditions > limits.max_filter_conditions {
            filter_warning = Some(format!(
                "filter tree has {} conditions (limit {}); consider splitting the query",
                conditions, limits.max_filter_conditions
            ));
        }
    }

    ComplexityReport {
        complexity: score(&rewritten, limits),
        descriptor: rewritten,
        warnings,
        filter_warning,
    }
}

fn includes_deeper_than(includes: &[IncludeSpec], depth_limit: usize) -> bool {
    fn depth(include: &IncludeSpec) -> usize {
        1 + include.nested.iter().map(depth).max().unwrap_or(0)
    }
    includes.iter().map(depth).max().unwrap_or(0) > depth_limit
}

fn prune_to_depth(include: &mut IncludeSpec, depth_limit: usize) {
    if depth_limit <= 1 {
        include.nested.clear();
    } else {
        for nested in &mut include.nested {
            prune_to_depth(nested, depth_limit - 1);
        }
    }
}
