use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use regex::Regex;
use tokio::time::Instant;

use super::{KeyValueStore, KvError, KvResult, WindowCount};

#[derive(Debug, Clone)]
enum Value {
    Bytes(Vec<u8>),
    Counter(u64),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: Value,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Process-local store with the same semantics as [`super::RedisStore`].
///
/// Expiry uses `tokio::time::Instant`, so paused-clock tests can advance
/// through TTLs deterministically. Per-key atomicity comes from the DashMap
/// shard lock held by `entry()`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredValue>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining TTL of a live key.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, v| !v.is_expired(now));
    }
}

/// Translates a Redis glob (`*`, `?`, `[...]`) into an anchored regex.
pub(crate) fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                out.push('[');
                for inner in chars.by_ref() {
                    if inner == ']' {
                        break;
                    }
                    if inner == '\\' {
                        out.push_str("\\\\");
                    } else {
                        out.push(inner);
                    }
                }
                out.push(']');
            }
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out)
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };
        if entry.is_expired(now) {
            drop(entry);
            self.entries.remove_if(key, |_, v| v.is_expired(now));
            return Ok(None);
        }
        match &entry.value {
            Value::Bytes(bytes) => Ok(Some(bytes.clone())),
            Value::Counter(n) => Ok(Some(n.to_string().into_bytes())),
            Value::Set(_) => Err(KvError::Protocol(format!(
                "WRONGTYPE key {key} holds a set"
            ))),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> KvResult<()> {
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value: Value::Bytes(value.to_vec()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> KvResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, v)| !v.is_expired(now)))
    }

    async fn delete_matching(&self, pattern: &str) -> KvResult<u64> {
        let matcher = glob_to_regex(pattern)
            .map_err(|e| KvError::Protocol(format!("invalid pattern {pattern}: {e}")))?;
        self.purge_expired();
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| matcher.is_match(e.key()))
            .map(|e| e.key().clone())
            .collect();
        let deleted = keys
            .iter()
            .filter(|k| self.entries.remove(k.as_str()).is_some())
            .count();
        Ok(deleted as u64)
    }

    async fn set_indexed(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
        index: &str,
    ) -> KvResult<()> {
        let now = Instant::now();
        let member_expiry = now + ttl;
        self.set(key, value, ttl).await?;

        match self.entries.entry(index.to_string()) {
            Entry::Occupied(mut occupied) => {
                let stored = occupied.get_mut();
                if stored.is_expired(now) {
                    *stored = StoredValue {
                        value: Value::Set(HashSet::new()),
                        expires_at: None,
                    };
                }
                let Value::Set(members) = &mut stored.value else {
                    return Err(KvError::Protocol(format!(
                        "WRONGTYPE index {index} is not a set"
                    )));
                };
                members.insert(key.to_string());
                if stored.expires_at.is_none_or(|at| at < member_expiry) {
                    stored.expires_at = Some(member_expiry);
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredValue {
                    value: Value::Set(HashSet::from([key.to_string()])),
                    expires_at: Some(member_expiry),
                });
            }
        }
        Ok(())
    }

    async fn delete_indexed(&self, index: &str) -> KvResult<u64> {
        let now = Instant::now();
        let Some((_, stored)) = self.entries.remove(index) else {
            return Ok(0);
        };
        let Value::Set(members) = stored.value else {
            return Err(KvError::Protocol(format!(
                "WRONGTYPE index {index} is not a set"
            )));
        };
        let deleted = members
            .iter()
            .filter(|k| {
                self.entries
                    .remove(k.as_str())
                    .is_some_and(|(_, v)| !v.is_expired(now))
            })
            .count();
        Ok(deleted as u64)
    }

    async fn incr_window(&self, key: &str, window: Duration) -> KvResult<WindowCount> {
        let now = Instant::now();
        let fresh = StoredValue {
            value: Value::Counter(1),
            expires_at: Some(now + window),
        };

        let stored = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get_mut();
                if current.is_expired(now) {
                    *current = fresh;
                } else {
                    let next = match &current.value {
                        Value::Counter(n) => n + 1,
                        Value::Bytes(raw) => {
                            std::str::from_utf8(raw)
                                .ok()
                                .and_then(|s| s.parse::<u64>().ok())
                                .ok_or_else(|| {
                                    KvError::Protocol(format!("value at {key} is not an integer"))
                                })?
                                + 1
                        }
                        Value::Set(_) => {
                            return Err(KvError::Protocol(format!(
                                "WRONGTYPE key {key} holds a set"
                            )));
                        }
                    };
                    current.value = Value::Counter(next);
                    if current.expires_at.is_none() {
                        current.expires_at = Some(now + window);
                    }
                }
                current.clone()
            }
            Entry::Vacant(vacant) => vacant.insert(fresh).clone(),
        };

        let count = match stored.value {
            Value::Counter(n) => n,
            _ => return Err(KvError::Protocol(format!("value at {key} is not a counter"))),
        };
        let ttl = stored
            .expires_at
            .map(|at| at.saturating_duration_since(now))
            .unwrap_or(window);
        Ok(WindowCount { count, ttl })
    }

    async fn ping(&self) -> KvResult<()> {
        Ok(())
    }

    async fn memory_info(&self) -> KvResult<BTreeMap<String, String>> {
        Ok(BTreeMap::from([("keys".to_string(), self.len().to_string())]))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
