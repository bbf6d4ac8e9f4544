//! One budgeted cache namespace
//!
//! Entries expire lazily on read and are evicted least-recently-used when a
//! write would exceed the entry-count or byte budget. All mutation happens
//! under one lock with no await points, so check-then-evict-then-write is a
//! single logical step.

use bulkhead_core::NamespaceUsage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

struct CacheEntry {
    bytes: Vec<u8>,
    size: u64,
    expires_at: Option<Instant>,
    inserted_seq: u64,
    last_access_seq: u64,
}

struct NamespaceState {
    entries: HashMap<String, CacheEntry>,
    bytes: u64,
    seq: u64,
}

/// One logical cache partition with its own budget and eviction scope.
pub struct Namespace {
    name: String,
    max_entries: usize,
    max_bytes: u64,
    ttl: Option<Duration>,
    state: Mutex<NamespaceState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Namespace {
    pub fn new(name: impl Into<String>, max_entries: usize, max_bytes: u64, ttl: Duration) -> Self {
        Self {
            name: name.into(),
            max_entries,
            max_bytes,
            ttl: (!ttl.is_zero()).then_some(ttl),
            state: Mutex::new(NamespaceState {
                entries: HashMap::new(),
                bytes: 0,
                seq: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Look up a key, refreshing its recency. An expired entry counts as a
    /// miss and is removed on the spot.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();

        let expired = matches!(
            state.entries.get(key),
            Some(entry) if entry.expires_at.map(|at| now >= at).unwrap_or(false)
        );
        if expired {
            if let Some(entry) = state.entries.remove(key) {
                state.bytes -= entry.size;
            }
        }

        state.seq += 1;
        let seq = state.seq;
        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.last_access_seq = seq;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.bytes.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a value, evicting LRU entries until it fits. Returns false
    /// without writing when the value alone exceeds the byte budget.
    pub fn insert(&self, key: &str, bytes: Vec<u8>) -> bool {
        let size = bytes.len() as u64;
        if size > self.max_bytes {
            return false;
        }

        let mut state = self.state.lock().unwrap();

        if let Some(old) = state.entries.remove(key) {
            state.bytes -= old.size;
        }
        while !state.entries.is_empty()
            && (state.entries.len() >= self.max_entries || state.bytes + size > self.max_bytes)
        {
            Self::evict_lru(&self.name, &mut state);
        }

        state.seq += 1;
        let seq = state.seq;
        state.bytes += size;
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                bytes,
                size,
                expires_at: self.ttl.map(|ttl| Instant::now() + ttl),
                inserted_seq: seq,
                last_access_seq: seq,
            },
        );
        true
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.entries.remove(key) {
            state.bytes -= entry.size;
            true
        } else {
            false
        }
    }

    /// Drop every entry, returning the bytes freed.
    pub fn clear(&self) -> u64 {
        let mut state = self.state.lock().unwrap();
        let freed = state.bytes;
        state.entries.clear();
        state.bytes = 0;
        freed
    }

    pub fn bytes_used(&self) -> u64 {
        self.state.lock().unwrap().bytes
    }

    pub fn entry_count(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    pub fn usage(&self) -> NamespaceUsage {
        let state = self.state.lock().unwrap();
        NamespaceUsage {
            name: self.name.clone(),
            bytes: state.bytes,
            max_bytes: self.max_bytes,
            entries: state.entries.len(),
            max_entries: self.max_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    // Strict LRU, ties broken by earliest insertion. Linear scan is fine at
    // the entry counts namespaces are budgeted for.
    fn evict_lru(name: &str, state: &mut NamespaceState) {
        let victim = state
            .entries
            .iter()
            .min_by_key(|(_, e)| (e.last_access_seq, e.inserted_seq))
            .map(|(k, _)| k.clone());
        if let Some(key) = victim {
            if let Some(entry) = state.entries.remove(&key) {
                state.bytes -= entry.size;
                debug!(namespace = name, key = %key, "evicted LRU entry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(len: usize) -> Vec<u8> {
        vec![b'x'; len]
    }

    #[test]
    fn byte_budget_is_never_exceeded() {
        let ns = Namespace::new("t", 1000, 100, Duration::ZERO);
        for i in 0..50 {
            assert!(ns.insert(&format!("k{}", i), value(30)));
            assert!(ns.bytes_used() <= 100);
        }
    }

    #[test]
    fn evicts_least_recently_used_first() {
        // Budget fits three 30-byte entries.
        let ns = Namespace::new("t", 1000, 100, Duration::ZERO);
        ns.insert("a", value(30));
        ns.insert("b", value(30));
        ns.insert("c", value(30));

        // Touch a and b so c becomes the LRU entry.
        assert!(ns.get("a").is_some());
        assert!(ns.get("b").is_some());

        ns.insert("d", value(30));
        assert!(ns.get("c").is_none());
        assert!(ns.get("a").is_some());
        assert!(ns.get("b").is_some());
        assert!(ns.get("d").is_some());
    }

    #[test]
    fn eviction_ties_break_by_earliest_insertion() {
        let ns = Namespace::new("t", 3, 1000, Duration::ZERO);
        ns.insert("first", value(10));
        ns.insert("second", value(10));
        ns.insert("third", value(10));

        // Nothing accessed; insertion order decides.
        ns.insert("fourth", value(10));
        assert!(ns.get("first").is_none());
        assert!(ns.get("second").is_some());
    }

    #[test]
    fn entry_count_budget_enforced() {
        let ns = Namespace::new("t", 2, 1000, Duration::ZERO);
        ns.insert("a", value(1));
        ns.insert("b", value(1));
        ns.insert("c", value(1));
        assert_eq!(ns.entry_count(), 2);
    }

    #[test]
    fn oversized_value_is_rejected_without_eviction() {
        let ns = Namespace::new("t", 10, 50, Duration::ZERO);
        ns.insert("keep", value(20));
        assert!(!ns.insert("huge", value(51)));
        assert!(ns.get("keep").is_some());
        assert_eq!(ns.bytes_used(), 20);
    }

    #[test]
    fn replacing_a_key_reuses_its_budget() {
        let ns = Namespace::new("t", 10, 100, Duration::ZERO);
        ns.insert("a", value(60));
        ns.insert("a", value(80));
        assert_eq!(ns.bytes_used(), 80);
        assert_eq!(ns.entry_count(), 1);
    }

    #[tokio::test]
    async fn entries_expire_lazily() {
        let ns = Namespace::new("t", 10, 1000, Duration::from_millis(10));
        ns.insert("k", value(5));
        assert!(ns.get("k").is_some());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(ns.get("k").is_none());
        assert_eq!(ns.bytes_used(), 0);

        let usage = ns.usage();
        assert_eq!(usage.hits, 1);
        assert_eq!(usage.misses, 1);
    }
}
