#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use evently_server::health::{HealthProbe, ProbeResult};
use evently_server::kv::{KeyValueStore, KvError, KvResult, WindowCount};

/// A key-value store whose every operation fails, as an unreachable Redis would.
pub struct UnreachableStore;

fn refused<T>() -> KvResult<T> {
    Err(KvError::Pool("connection refused".into()))
}

#[async_trait]
impl KeyValueStore for UnreachableStore {
    async fn get(&self, _key: &str) -> KvResult<Option<Vec<u8>>> {
        refused()
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> KvResult<()> {
        refused()
    }

    async fn delete(&self, _key: &str) -> KvResult<bool> {
        refused()
    }

    async fn delete_matching(&self, _pattern: &str) -> KvResult<u64> {
        refused()
    }

    async fn set_indexed(
        &self,
        _key: &str,
        _value: &[u8],
        _ttl: Duration,
        _index: &str,
    ) -> KvResult<()> {
        refused()
    }

    async fn delete_indexed(&self, _index: &str) -> KvResult<u64> {
        refused()
    }

    async fn incr_window(&self, _key: &str, _window: Duration) -> KvResult<WindowCount> {
        refused()
    }

    async fn ping(&self) -> KvResult<()> {
        refused()
    }

    async fn memory_info(&self) -> KvResult<BTreeMap<String, String>> {
        refused()
    }

    fn backend_name(&self) -> &'static str {
        "unreachable"
    }
}

pub enum Behavior {
    Up,
    Down(&'static str),
    /// Sleeps, then reports UP.
    Slow(Duration),
    /// Never completes and ignores cancellation.
    Hang,
    Panic,
}

pub struct StubProbe {
    name: &'static str,
    behavior: Behavior,
}

impl StubProbe {
    pub fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self { name, behavior })
    }
}

#[async_trait]
impl HealthProbe for StubProbe {
    fn name(&self) -> &str {
        self.name
    }

    async fn check(&self) -> ProbeResult {
        match self.behavior {
            Behavior::Up => ProbeResult::up(),
            Behavior::Down(msg) => ProbeResult::down(msg),
            Behavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                ProbeResult::up()
            }
            Behavior::Hang => std::future::pending().await,
            Behavior::Panic => panic!("probe exploded"),
        }
    }
}
