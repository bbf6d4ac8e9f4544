//! Bulkhead - Admission Control & Micro-Batching
//!
//! Caps the number of concurrently in-flight logical operations against the
//! backing store, queues the rest by priority, and coalesces near-simultaneous
//! identical-shape requests into single executions.

pub mod batcher;
pub mod controller;

pub use batcher::*;
pub use controller::*;
