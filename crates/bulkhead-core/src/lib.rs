//! Bulkhead - Core Library
//!
//! Shared types, configuration, error taxonomy, metric recording and the
//! query complexity governor for the bulkhead resource-governance layer.

pub mod config;
pub mod error;
pub mod metrics;
pub mod query;
pub mod types;

pub use config::*;
pub use error::*;
pub use metrics::*;
pub use query::*;
pub use types::*;
