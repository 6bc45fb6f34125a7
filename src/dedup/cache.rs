//! In-memory dedup cache
//!
//! Process-local; suitable for a single replica and for tests. Claims are
//! atomic per key through the `DashMap` entry API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::dedup::DedupCache;
use crate::error::DedupError;

/// Expired entries are swept after this many claims
const PURGE_EVERY: u64 = 1024;

/// `DashMap`-backed cache mapping key to expiry instant
#[derive(Debug, Default)]
pub struct MemoryDedupCache {
    entries: DashMap<String, Instant>,
    claims: AtomicU64,
}

impl MemoryDedupCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired key
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, expires_at| *expires_at > now);
    }
}

#[async_trait]
impl DedupCache for MemoryDedupCache {
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool, DedupError> {
        if self.claims.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY == PURGE_EVERY - 1 {
            self.purge_expired();
        }

        let now = Instant::now();
        let claimed = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() <= now {
                    entry.insert(now + ttl);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now + ttl);
                true
            }
        };
        Ok(claimed)
    }

    async fn release(&self, key: &str) -> Result<(), DedupError> {
        self.entries.remove(key);
        Ok(())
    }
}
