//! Cached repositories: the relational store behind the cache-aside layer.
//!
//! Writes always commit to the store first, then refresh or drop the item
//! key, then invalidate derived list entries. Cache failures are logged here
//! and never fail the request.

mod categories;
mod events;

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cache::Cache;

pub use categories::CategoryRepository;
pub use events::EventRepository;

/// TTLs applied by the repositories.
#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub item: Duration,
    pub list: Duration,
}

async fn lookup<T: DeserializeOwned>(cache: &Cache, key: &str) -> Option<T> {
    match cache.get::<T>(key).await {
        Ok(Some(value)) => {
            tracing::debug!(key, "cache hit");
            Some(value)
        }
        Ok(None) => {
            tracing::debug!(key, "cache miss");
            None
        }
        Err(e) => {
            tracing::warn!(key, error = %e, "cache read failed, reading from store");
            None
        }
    }
}

async fn fill<T: Serialize + ?Sized>(cache: &Cache, key: &str, value: &T, ttl: Duration) {
    if let Err(e) = cache.set(key, value, Some(ttl)).await {
        tracing::warn!(key, error = %e, "cache write failed");
    }
}

async fn fill_derived<T: Serialize + ?Sized>(
    cache: &Cache,
    index: &str,
    key: &str,
    value: &T,
    ttl: Duration,
) {
    if let Err(e) = cache.set_derived(index, key, value, Some(ttl)).await {
        tracing::warn!(key, index, error = %e, "cache write failed");
    }
}

async fn evict(cache: &Cache, key: &str) {
    if let Err(e) = cache.delete(key).await {
        tracing::warn!(key, error = %e, "cache delete failed");
    }
}

async fn invalidate(cache: &Cache, index: &str) {
    match cache.invalidate_derived(index).await {
        Ok(dropped) => tracing::debug!(index, dropped, "derived cache entries invalidated"),
        Err(e) => tracing::warn!(index, error = %e, "cache invalidation failed"),
    }
}
