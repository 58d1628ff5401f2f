use std::collections::HashSet;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::CacheKey;
use crate::ChangeEvent;
use crate::ChangeFeed;
use crate::ChannelSpec;
use crate::FeedError;
use crate::FetchFuture;
use crate::LocalChangeFeed;
use crate::QueryCache;
use crate::Result;

/// Cache double that records invalidations instead of storing values.
#[derive(Default)]
pub struct RecordingCache {
    invalidated: Mutex<Vec<CacheKey>>,
    swept_prefixes: Mutex<Vec<String>>,
}

impl RecordingCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every key invalidated so far, in arrival order.
    pub fn invalidated(&self) -> Vec<CacheKey> {
        self.invalidated.lock().clone()
    }

    /// Every prefix sweep applied so far, in arrival order.
    pub fn swept_prefixes(&self) -> Vec<String> {
        self.swept_prefixes.lock().clone()
    }

    /// Canonical forms of the distinct keys invalidated so far.
    pub fn unique_invalidated(&self) -> HashSet<String> {
        self.invalidated
            .lock()
            .iter()
            .map(|key| key.canonical())
            .collect()
    }

    pub fn total_operations(&self) -> usize {
        self.invalidated.lock().len() + self.swept_prefixes.lock().len()
    }

    pub fn clear(&self) {
        self.invalidated.lock().clear();
        self.swept_prefixes.lock().clear();
    }
}

#[async_trait]
impl QueryCache for RecordingCache {
    fn invalidate(
        &self,
        key: &CacheKey,
    ) -> bool {
        self.invalidated.lock().push(key.clone());
        true
    }

    fn invalidate_prefix(
        &self,
        prefix: &str,
    ) -> usize {
        self.swept_prefixes.lock().push(prefix.to_string());
        0
    }

    async fn read_through(
        &self,
        _key: &CacheKey,
        fetch: FetchFuture,
    ) -> Result<Value> {
        fetch.await
    }
}

/// Feed double whose first `failures` opens fail before delegating to an
/// in-process feed, for exercising connect retries.
pub struct FlakyFeed {
    inner: LocalChangeFeed,
    failures_remaining: AtomicUsize,
    opens: AtomicUsize,
}

impl FlakyFeed {
    pub fn new(
        channel_capacity: usize,
        failures: usize,
    ) -> Arc<Self> {
        Arc::new(FlakyFeed {
            inner: LocalChangeFeed::new(channel_capacity),
            failures_remaining: AtomicUsize::new(failures),
            opens: AtomicUsize::new(0),
        })
    }

    pub fn feed(&self) -> &LocalChangeFeed {
        &self.inner
    }

    /// Total `open` calls observed, successful or not.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChangeFeed for FlakyFeed {
    async fn open(
        &self,
        spec: &ChannelSpec,
    ) -> Result<mpsc::Receiver<ChangeEvent>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let scripted_failure = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if scripted_failure {
            return Err(FeedError::SubscribeFailed {
                entity: spec.entity.to_string(),
                reason: "scripted failure".to_string(),
            }
            .into());
        }
        self.inner.open(spec).await
    }
}
