use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use super::CacheKey;
use super::FetchFuture;
use super::QueryCache;
use crate::CacheConfig;
use crate::Result;

struct CacheEntry {
    value: Value,
    // insertion sequence, lowest is evicted first
    seq: u64,
}

/// In-process [`QueryCache`] backed by a concurrent map.
///
/// Eviction is insertion-ordered: once `capacity` entries are resident, the
/// oldest stored entries make room for new ones. The scan on eviction is
/// linear, which is fine for the entry counts a single process holds.
pub struct MemoryQueryCache {
    entries: DashMap<CacheKey, CacheEntry>,
    capacity: usize,
    next_seq: AtomicU64,
}

impl MemoryQueryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(
        &self,
        key: &CacheKey,
    ) -> bool {
        self.entries.contains_key(key)
    }

    fn store(
        &self,
        key: CacheKey,
        value: Value,
    ) {
        while self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().seq)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(victim) => {
                    self.entries.remove(&victim);
                }
                None => break,
            }
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(key, CacheEntry { value, seq });
    }
}

#[async_trait]
impl QueryCache for MemoryQueryCache {
    fn invalidate(
        &self,
        key: &CacheKey,
    ) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            debug!("invalidated cache key {}", key);
        }
        removed
    }

    fn invalidate_prefix(
        &self,
        prefix: &str,
    ) -> usize {
        let victims: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|entry| entry.key().canonical().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        let mut removed = 0;
        for key in victims {
            if self.entries.remove(&key).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("invalidated {} cache keys under prefix {}", removed, prefix);
        }
        removed
    }

    async fn read_through(
        &self,
        key: &CacheKey,
        fetch: FetchFuture,
    ) -> Result<Value> {
        if let Some(hit) = self.entries.get(key) {
            return Ok(hit.value.clone());
        }
        let value = fetch.await?;
        self.store(key.clone(), value.clone());
        Ok(value)
    }
}
