use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::json;

use super::*;
use crate::Error;

fn key(namespace: &str, params: &[&str]) -> CacheKey {
    CacheKey::new(namespace, params.iter().map(|p| p.to_string()).collect())
}

async fn warm(cache: &MemoryQueryCache, key: &CacheKey, value: serde_json::Value) {
    cache
        .read_through(key, async move { Ok(value) }.boxed())
        .await
        .unwrap();
}

#[test]
fn canonical_form_should_join_namespace_and_params() {
    assert_eq!(CacheKey::root("projects").canonical(), "projects");
    assert_eq!(key("tasks", &["ws1", "p7"]).canonical(), "tasks:ws1:p7");
}

#[test]
fn keys_should_compare_by_namespace_and_every_param() {
    assert_eq!(key("tasks", &["a"]), key("tasks", &["a"]));
    assert_ne!(key("tasks", &["a"]), key("tasks", &["a", "b"]));
    assert_ne!(key("tasks", &["a"]), key("notes", &["a"]));
}

#[tokio::test]
async fn read_through_should_memoize_first_fetch() {
    let cache = MemoryQueryCache::new(16);
    let k = key("projects", &["ws1"]);
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let calls = calls.clone();
        let value = cache
            .read_through(
                &k,
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"rows": 3}))
                }
                .boxed(),
            )
            .await
            .unwrap();
        assert_eq!(value, json!({"rows": 3}));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn read_through_should_not_store_failed_fetches() {
    let cache = MemoryQueryCache::new(16);
    let k = key("projects", &["ws1"]);

    let result = cache
        .read_through(&k, async { Err(Error::Fatal("fetch failed".into())) }.boxed())
        .await;

    assert!(result.is_err());
    assert!(!cache.contains(&k));
}

#[tokio::test]
async fn invalidate_should_report_presence() {
    let cache = MemoryQueryCache::new(16);
    let k = key("tasks", &["ws1", "p1"]);
    warm(&cache, &k, json!([1, 2, 3])).await;

    assert!(cache.invalidate(&k));
    assert!(!cache.invalidate(&k));
    assert!(!cache.contains(&k));
}

#[tokio::test]
async fn invalidated_key_should_refetch_on_next_read() {
    let cache = MemoryQueryCache::new(16);
    let k = key("tasks", &["ws1"]);
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let calls = calls.clone();
        cache
            .read_through(
                &k,
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!("result"))
                }
                .boxed(),
            )
            .await
            .unwrap();
        cache.invalidate(&k);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn invalidate_prefix_should_remove_only_matching_keys() {
    let cache = MemoryQueryCache::new(16);
    warm(&cache, &key("tasks", &["ws1"]), json!(1)).await;
    warm(&cache, &key("tasks", &["ws2"]), json!(2)).await;
    warm(&cache, &key("tasks_archive", &["ws1"]), json!(3)).await;
    warm(&cache, &key("projects", &["ws1"]), json!(4)).await;

    let removed = cache.invalidate_prefix("tasks:");

    assert_eq!(removed, 2);
    assert!(cache.contains(&key("tasks_archive", &["ws1"])));
    assert!(cache.contains(&key("projects", &["ws1"])));
}

#[tokio::test]
async fn bare_namespace_prefix_should_sweep_wider() {
    let cache = MemoryQueryCache::new(16);
    warm(&cache, &key("tasks", &["ws1"]), json!(1)).await;
    warm(&cache, &key("tasks_archive", &["ws1"]), json!(2)).await;

    // without the separator the prefix also covers sibling namespaces;
    // over-removal is allowed, serving stale data is not
    let removed = cache.invalidate_prefix("tasks");

    assert_eq!(removed, 2);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn store_should_evict_oldest_beyond_capacity() {
    let cache = MemoryQueryCache::new(2);
    warm(&cache, &key("q", &["1"]), json!(1)).await;
    warm(&cache, &key("q", &["2"]), json!(2)).await;
    warm(&cache, &key("q", &["3"]), json!(3)).await;

    assert_eq!(cache.len(), 2);
    assert!(!cache.contains(&key("q", &["1"])));
    assert!(cache.contains(&key("q", &["2"])));
    assert!(cache.contains(&key("q", &["3"])));
}
