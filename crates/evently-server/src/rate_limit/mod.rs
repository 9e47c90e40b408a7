//! Fixed-window rate limiting over the shared key-value store.
//!
//! Each identity owns one counter, `rate_limit:<identity>`. The store
//! increments it and attaches the window TTL in a single atomic step, so
//! concurrent requests across processes never lose an update and the window
//! cannot slide under sustained traffic.

mod middleware;

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use serde::Serialize;

use crate::config::{FailurePolicy, RateLimitConfig};
use crate::kv::{DynKvStore, KvError, WindowCount};

pub use middleware::{RateLimitState, rate_limit};

/// Whose quota a request counts against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientIdentity {
    User(String),
    Ip(IpAddr),
    /// No principal and no resolvable address.
    Unknown,
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Ip(addr) => write!(f, "ip:{addr}"),
            Self::Unknown => f.write_str("ip:unknown"),
        }
    }
}

pub fn counter_key(identity: &ClientIdentity) -> String {
    format!("rate_limit:{identity}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Unix seconds at which the current window closes.
    pub reset_at: u64,
    /// Zero when allowed.
    pub retry_after_secs: u64,
}

impl RateLimitDecision {
    /// Reduces a counter snapshot to a decision. `now` is unix seconds.
    pub fn from_count(limit: u64, window: WindowCount, now: u64) -> Self {
        let allowed = window.count <= limit;
        let ttl_secs = window.ttl.as_millis().div_ceil(1000) as u64;
        Self {
            allowed,
            limit,
            remaining: limit.saturating_sub(window.count),
            reset_at: now + ttl_secs,
            retry_after_secs: if allowed { 0 } else { ttl_secs.max(1) },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit store unavailable: {0}")]
    Store(#[from] KvError),
}

#[derive(Clone)]
pub struct RateLimiter {
    store: DynKvStore,
    limit: u64,
    window: Duration,
    failure_policy: FailurePolicy,
}

impl RateLimiter {
    pub fn new(store: DynKvStore, limit: u64, window: Duration) -> Self {
        Self {
            store,
            limit,
            window,
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn from_config(store: DynKvStore, config: &RateLimitConfig) -> Self {
        Self::new(store, config.requests, Duration::from_secs(config.window_secs))
            .with_failure_policy(config.failure_policy)
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Counts one request against `identity`.
    ///
    /// Store failures are returned as-is; the failure policy is applied by
    /// the HTTP layer.
    pub async fn check(
        &self,
        identity: &ClientIdentity,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let key = counter_key(identity);
        let window = self.store.incr_window(&key, self.window).await?;
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
        Ok(RateLimitDecision::from_count(self.limit, window, now))
    }
}
