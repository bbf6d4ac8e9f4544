//! Bulkhead - Memory-Budgeted Cache
//!
//! Independently sized, independently expiring key/value namespaces under a
//! shared global byte ceiling, with LRU eviction, stable cache-key
//! derivation and a background pressure monitor.

pub mod keys;
pub mod manager;
pub mod namespace;
pub mod pressure;

pub use keys::*;
pub use manager::*;
pub use pressure::*;
