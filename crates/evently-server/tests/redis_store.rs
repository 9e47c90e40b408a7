//! Key-value store semantics against a real Redis.
//!
//! Tests use testcontainers to spin up a shared Redis instance.

use std::sync::Arc;
use std::time::Duration;

use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

use evently_server::config::RedisConfig;
use evently_server::kv::{DynKvStore, connect_kv_store};
use evently_server::{Cache, RateLimiter};

static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, String)> = OnceCell::const_new();

async fn get_redis_url() -> String {
    let (_, url) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");

            let host_port = container.get_host_port_ipv4(6379).await.expect("get port");
            let url = format!("redis://127.0.0.1:{host_port}");

            (container, url)
        })
        .await;

    url.clone()
}

async fn redis_store() -> DynKvStore {
    let config = RedisConfig {
        enabled: true,
        url: get_redis_url().await,
        ..RedisConfig::default()
    };
    let store = connect_kv_store(&config).await;
    assert_eq!(store.backend_name(), "redis");
    store
}

/// Keys unique to one test so tests can share the container.
fn scoped(test: &str, key: &str) -> String {
    format!("{test}:{}:{key}", uuid::Uuid::new_v4().simple())
}

#[tokio::test]
async fn test_set_get_delete() {
    let store = redis_store().await;
    let key = scoped("basic", "event:1");

    store.set(&key, b"payload", Duration::from_secs(60)).await.unwrap();
    assert_eq!(store.get(&key).await.unwrap(), Some(b"payload".to_vec()));

    assert!(store.delete(&key).await.unwrap());
    assert!(!store.delete(&key).await.unwrap());
    assert_eq!(store.get(&key).await.unwrap(), None);
}

#[tokio::test]
async fn test_entries_expire() {
    let store = redis_store().await;
    let key = scoped("expiry", "event:1");

    store.set(&key, b"short", Duration::from_millis(100)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(store.get(&key).await.unwrap(), None);
}

#[tokio::test]
async fn test_delete_matching_scans_without_touching_others() {
    let store = redis_store().await;
    let prefix = scoped("pattern", "events:list");
    for i in 0..1200 {
        store
            .set(&format!("{prefix}:{i}"), b"[]", Duration::from_secs(60))
            .await
            .unwrap();
    }
    let survivor = scoped("pattern", "event:keep");
    store.set(&survivor, b"{}", Duration::from_secs(60)).await.unwrap();

    let removed = store.delete_matching(&format!("{prefix}:*")).await.unwrap();
    assert_eq!(removed, 1200);
    assert!(store.get(&survivor).await.unwrap().is_some());
}

#[tokio::test]
async fn test_indexed_entries_are_invalidated_together() {
    let store = redis_store().await;
    let index = scoped("index", "cache:index:events:lists");
    let a = scoped("index", "events:list:a");
    let b = scoped("index", "events:list:b");

    store.set_indexed(&a, b"[1]", Duration::from_secs(60), &index).await.unwrap();
    store.set_indexed(&b, b"[2]", Duration::from_secs(300), &index).await.unwrap();

    assert_eq!(store.delete_indexed(&index).await.unwrap(), 2);
    assert_eq!(store.get(&a).await.unwrap(), None);
    assert_eq!(store.get(&b).await.unwrap(), None);
    assert_eq!(store.delete_indexed(&index).await.unwrap(), 0);
}

#[tokio::test]
async fn test_window_ttl_is_set_once() {
    let store = redis_store().await;
    let key = scoped("window", "rate_limit:user:1");
    let window = Duration::from_secs(2);

    let first = store.incr_window(&key, window).await.unwrap();
    assert_eq!(first.count, 1);
    tokio::time::sleep(Duration::from_millis(600)).await;
    let second = store.incr_window(&key, window).await.unwrap();
    assert_eq!(second.count, 2);
    assert!(second.ttl < first.ttl);

    tokio::time::sleep(Duration::from_millis(1600)).await;
    let fresh = store.incr_window(&key, window).await.unwrap();
    assert_eq!(fresh.count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_increments_are_not_lost() {
    const N: u64 = 200;
    let store = redis_store().await;
    let key = scoped("burst", "rate_limit:user:1");

    let mut handles = Vec::new();
    for _ in 0..N {
        let store = Arc::clone(&store);
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            store.incr_window(&key, Duration::from_secs(60)).await.unwrap().count
        }));
    }
    let mut counts = Vec::new();
    for handle in handles {
        counts.push(handle.await.unwrap());
    }
    counts.sort_unstable();
    assert_eq!(counts, (1..=N).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_limiter_over_redis() {
    let store = redis_store().await;
    let limiter = RateLimiter::new(store, 2, Duration::from_secs(60));
    let identity = evently_server::ClientIdentity::User(uuid::Uuid::new_v4().to_string());

    assert!(limiter.check(&identity).await.unwrap().allowed);
    assert!(limiter.check(&identity).await.unwrap().allowed);
    let third = limiter.check(&identity).await.unwrap();
    assert!(!third.allowed);
    assert!(third.retry_after_secs >= 59);
}

#[tokio::test]
async fn test_cache_round_trip_and_stats() {
    let store = redis_store().await;
    let cache = Cache::new(store.clone(), Duration::from_secs(60));
    let key = scoped("cache", "event:123");

    cache
        .set(&key, &serde_json::json!({"id": "123"}), None)
        .await
        .unwrap();
    let value: Option<serde_json::Value> = cache.get(&key).await.unwrap();
    assert_eq!(value.unwrap()["id"], "123");

    store.ping().await.unwrap();
    let info = store.memory_info().await.unwrap();
    assert!(info.contains_key("used_memory"));
}
