//! Cache-aside layer over the shared key-value store.
//!
//! The cache is never authoritative: a miss and a failure both mean
//! "recompute from the relational store". Errors are returned rather than
//! logged so the caller decides how loudly to report them.
//!
//! ```text
//! read:  cache.get(key) ──miss/err──▶ store ──▶ cache.set(key)
//! write: store commit ──▶ refresh/delete item key ──▶ invalidate derived lists
//! ```

pub mod keys;

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::kv::{DynKvStore, KvError};

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Store(#[from] KvError),

    #[error("cache payload could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct Cache {
    store: DynKvStore,
    default_ttl: Duration,
}

impl Cache {
    pub fn new(store: DynKvStore, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    pub fn store(&self) -> &DynKvStore {
        &self.store
    }

    /// `None` or a zero TTL falls back to the configured default.
    pub fn effective_ttl(&self, ttl: Option<Duration>) -> Duration {
        match ttl {
            Some(ttl) if !ttl.is_zero() => ttl,
            _ => self.default_ttl,
        }
    }

    /// `Ok(None)` is a plain miss. `Err` means the cache could not answer.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        match self.store.get(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let payload = serde_json::to_vec(value)?;
        self.store
            .set(key, &payload, self.effective_ttl(ttl))
            .await?;
        Ok(())
    }

    /// Idempotent: deleting a missing key succeeds.
    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        self.store.delete(key).await?;
        Ok(())
    }

    /// Deletes every key matching a glob such as `events:list:*`.
    ///
    /// Walks the keyspace; prefer [`Cache::invalidate_derived`] on hot paths.
    pub async fn delete_by_pattern(&self, pattern: &str) -> CacheResult<u64> {
        Ok(self.store.delete_matching(pattern).await?)
    }

    /// Stores a derived entry (a list or search page) and records it in `index`.
    pub async fn set_derived<T: Serialize + ?Sized>(
        &self,
        index: &str,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let payload = serde_json::to_vec(value)?;
        self.store
            .set_indexed(key, &payload, self.effective_ttl(ttl), index)
            .await?;
        Ok(())
    }

    /// Drops every derived entry recorded in `index`.
    pub async fn invalidate_derived(&self, index: &str) -> CacheResult<u64> {
        Ok(self.store.delete_indexed(index).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use std::sync::Arc;

    fn cache() -> Cache {
        Cache::new(Arc::new(MemoryStore::new()), Duration::from_secs(60))
    }

    #[test]
    fn zero_ttl_uses_default() {
        let cache = cache();
        assert_eq!(cache.effective_ttl(None), Duration::from_secs(60));
        assert_eq!(cache.effective_ttl(Some(Duration::ZERO)), Duration::from_secs(60));
        assert_eq!(
            cache.effective_ttl(Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
    }

    #[tokio::test]
    async fn corrupt_payload_is_an_error_not_a_hit() {
        let cache = cache();
        cache
            .store()
            .set("event:1", b"{not json", Duration::from_secs(10))
            .await
            .unwrap();
        let result = cache.get::<serde_json::Value>("event:1").await;
        assert!(matches!(result, Err(CacheError::Serialization(_))));
    }
}
