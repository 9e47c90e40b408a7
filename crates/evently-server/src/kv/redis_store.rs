use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool};
use redis::{AsyncCommands, Script};

use super::{KeyValueStore, KvError, KvResult, WindowCount};

/// Increment, attach the window TTL on creation, and report the remaining TTL.
/// A key that exists without a TTL gets one here so it can never leak.
const INCR_WINDOW_SCRIPT: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
  ttl = tonumber(ARGV[1])
end
return {count, ttl}
";

/// Store a value and register it in a reverse index whose TTL never drops
/// below the member's.
const SET_INDEXED_SCRIPT: &str = r"
redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
redis.call('SADD', KEYS[2], KEYS[1])
local ttl = redis.call('PTTL', KEYS[2])
if ttl < tonumber(ARGV[2]) then
  redis.call('PEXPIRE', KEYS[2], ARGV[2])
end
return 1
";

const DELETE_INDEXED_SCRIPT: &str = r"
local members = redis.call('SMEMBERS', KEYS[1])
local deleted = 0
for _, key in ipairs(members) do
  deleted = deleted + redis.call('DEL', key)
end
redis.call('DEL', KEYS[1])
return deleted
";

const SCAN_BATCH: usize = 500;

/// Redis-backed store over a `deadpool-redis` pool.
///
/// A connection is checked out per operation and returned on drop. Each
/// operation, including the checkout, is bounded by `command_timeout`.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    command_timeout: Duration,
    incr_window: Script,
    set_indexed: Script,
    delete_indexed: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("pool", &self.pool.status())
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

impl RedisStore {
    pub fn new(pool: Pool, command_timeout: Duration) -> Self {
        Self {
            pool,
            command_timeout,
            incr_window: Script::new(INCR_WINDOW_SCRIPT),
            set_indexed: Script::new(SET_INDEXED_SCRIPT),
            delete_indexed: Script::new(DELETE_INDEXED_SCRIPT),
        }
    }

    async fn conn(&self) -> KvResult<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| KvError::Pool(e.to_string()))
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = KvResult<T>>,
    ) -> KvResult<T> {
        tokio::time::timeout(self.command_timeout, fut)
            .await
            .map_err(|_| KvError::Timeout {
                op,
                after: self.command_timeout,
            })?
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Parses `INFO` output (`key:value` lines, `#` section headers).
pub(crate) fn parse_info(raw: &str) -> BTreeMap<String, String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        self.bounded("GET", async {
            let mut conn = self.conn().await?;
            let value: Option<Vec<u8>> = conn.get(key).await?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> KvResult<()> {
        self.bounded("SET", async {
            let mut conn = self.conn().await?;
            let () = conn.pset_ex(key, value, ttl_millis(ttl)).await?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> KvResult<bool> {
        self.bounded("DEL", async {
            let mut conn = self.conn().await?;
            let removed: u64 = conn.del(key).await?;
            Ok(removed > 0)
        })
        .await
    }

    async fn delete_matching(&self, pattern: &str) -> KvResult<u64> {
        self.bounded("SCAN+DEL", async {
            let mut conn = self.conn().await?;
            let mut deleted: u64 = 0;
            let mut cursor: u64 = 0;

            // SCAN never blocks the server the way KEYS does
            loop {
                let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query_async(&mut conn)
                    .await?;

                if !keys.is_empty() {
                    let count: u64 = conn.del(&keys).await?;
                    deleted += count;
                }

                cursor = next_cursor;
                if cursor == 0 {
                    break;
                }
            }

            tracing::debug!(pattern, deleted, "pattern delete");
            Ok(deleted)
        })
        .await
    }

    async fn set_indexed(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
        index: &str,
    ) -> KvResult<()> {
        self.bounded("SET_INDEXED", async {
            let mut conn = self.conn().await?;
            let _: i64 = self
                .set_indexed
                .key(key)
                .key(index)
                .arg(value)
                .arg(ttl_millis(ttl))
                .invoke_async(&mut conn)
                .await?;
            Ok(())
        })
        .await
    }

    async fn delete_indexed(&self, index: &str) -> KvResult<u64> {
        self.bounded("DELETE_INDEXED", async {
            let mut conn = self.conn().await?;
            let deleted: u64 = self
                .delete_indexed
                .key(index)
                .invoke_async(&mut conn)
                .await?;
            Ok(deleted)
        })
        .await
    }

    async fn incr_window(&self, key: &str, window: Duration) -> KvResult<WindowCount> {
        self.bounded("INCR_WINDOW", async {
            let mut conn = self.conn().await?;
            let (count, ttl_ms): (i64, i64) = self
                .incr_window
                .key(key)
                .arg(ttl_millis(window))
                .invoke_async(&mut conn)
                .await?;
            let count = u64::try_from(count)
                .map_err(|_| KvError::Protocol(format!("negative counter {count} at {key}")))?;
            Ok(WindowCount {
                count,
                ttl: Duration::from_millis(u64::try_from(ttl_ms).unwrap_or(0)),
            })
        })
        .await
    }

    async fn ping(&self) -> KvResult<()> {
        self.bounded("PING", async {
            let mut conn = self.conn().await?;
            let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
            if pong != "PONG" {
                return Err(KvError::Protocol(format!("PING returned {pong}")));
            }
            Ok(())
        })
        .await
    }

    async fn memory_info(&self) -> KvResult<BTreeMap<String, String>> {
        self.bounded("INFO", async {
            let mut conn = self.conn().await?;
            let raw: String = redis::cmd("INFO").arg("memory").query_async(&mut conn).await?;
            Ok(parse_info(&raw))
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_info_sections() {
        let raw = "# Memory\r\nused_memory:1048576\r\nused_memory_human:1.00M\r\n\r\nmaxmemory_policy:noeviction\r\n";
        let info = parse_info(raw);
        assert_eq!(info.get("used_memory").map(String::as_str), Some("1048576"));
        assert_eq!(
            info.get("maxmemory_policy").map(String::as_str),
            Some("noeviction")
        );
        assert!(!info.contains_key("# Memory"));
    }

    #[test]
    fn ttl_is_never_zero() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_secs(60)), 60_000);
    }
}
