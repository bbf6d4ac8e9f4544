//! Bulkhead - Resource-Governed Cache & Query-Admission Layer
//!
//! A single-process, in-memory facility that keeps a backend correct and
//! responsive under hard resource ceilings: memory-budgeted caches with
//! pressure eviction, a query complexity governor, priority admission
//! control and request micro-batching. Consumed as a library by a
//! data-access layer; it is not a network-facing service.

pub mod governor;

pub use governor::*;

pub use bulkhead_admission::*;
pub use bulkhead_cache::*;
pub use bulkhead_core::*;
