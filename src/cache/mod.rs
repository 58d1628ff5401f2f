//! Keyed query-result cache consumed by the subscription router.
//!
//! Cached values are memoized query results. The router never writes values
//! into the cache from change events; it only removes entries so the next
//! read recomputes through [`QueryCache::read_through`].

mod memory;
pub use memory::*;

#[cfg(test)]
mod cache_test;

use std::fmt;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde_json::Value;

use crate::Result;

/// Uniquely identifies one cached query result as an ordered tuple of
/// (namespace, parameters). Two keys are equal iff the namespace and every
/// parameter match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: String,
    params: Vec<String>,
}

impl CacheKey {
    pub fn new(
        namespace: impl Into<String>,
        params: Vec<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            params,
        }
    }

    /// Key with no parameters, covering a whole namespace-level query
    pub fn root(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            params: Vec::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Canonical `namespace:param1:param2` form used for prefix matching
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.namespace)?;
        for param in &self.params {
            write!(f, ":{}", param)?;
        }
        Ok(())
    }
}

/// Boxed fetch computation used by the read-through path
pub type FetchFuture = futures::future::BoxFuture<'static, Result<Value>>;

/// Contract between the router and whatever holds memoized query results.
///
/// Invalidation is superset-safe: removing more entries than strictly
/// necessary only costs re-fetches, while removing fewer would serve stale
/// data. Implementations must therefore prefer over-invalidating when a
/// request is ambiguous.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait QueryCache: Send + Sync + 'static {
    /// Removes one cached result. Returns whether a value was present.
    fn invalidate(
        &self,
        key: &CacheKey,
    ) -> bool;

    /// Removes every cached result whose canonical key form starts with
    /// `prefix`. Returns the number of removed entries.
    fn invalidate_prefix(
        &self,
        prefix: &str,
    ) -> usize;

    /// Returns the cached value for `key`, computing and storing it via
    /// `fetch` on a miss.
    async fn read_through(
        &self,
        key: &CacheKey,
        fetch: FetchFuture,
    ) -> Result<Value>;
}
