//! Concurrent health aggregation.
//!
//! Probes register with a [`HealthAggregator`]; a check fans out one task per
//! probe and collects results from a channel until every probe has reported or
//! the deadline passes. A probe that ignores cancellation cannot hold the
//! aggregate past the deadline: it is reported DOWN and its task aborted.

mod probes;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinSet;
use tokio::time::Instant;

pub use probes::{DatabaseProbe, DiskProbe, KvStoreProbe, MemoryProbe, format_bytes};

pub const DEADLINE_MESSAGE: &str = "did not complete before deadline";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down,
}

/// Outcome of one probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, Value>,
}

impl ProbeResult {
    pub fn up() -> Self {
        Self {
            status: HealthStatus::Up,
            message: None,
            details: BTreeMap::new(),
        }
    }

    pub fn down(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Down,
            message: Some(message.into()),
            details: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn is_up(&self) -> bool {
        self.status == HealthStatus::Up
    }
}

/// A dependency check.
///
/// `check` should honor its own timeouts, but the aggregator does not rely
/// on it.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self) -> ProbeResult;
}

/// Aggregate health, serialized as the health endpoint body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: BTreeMap<String, ProbeResult>,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub uptime: String,
}

impl HealthReport {
    pub fn is_up(&self) -> bool {
        self.status == HealthStatus::Up
    }
}

pub struct HealthAggregator {
    probes: RwLock<Vec<Arc<dyn HealthProbe>>>,
    timeout: Duration,
    version: String,
    started_at: Instant,
}

impl HealthAggregator {
    pub fn new(version: impl Into<String>, timeout: Duration) -> Self {
        Self {
            probes: RwLock::new(Vec::new()),
            timeout,
            version: version.into(),
            started_at: Instant::now(),
        }
    }

    /// Adds a probe, replacing any registered under the same name.
    pub async fn register(&self, probe: Arc<dyn HealthProbe>) {
        let mut probes = self.probes.write().await;
        probes.retain(|p| p.name() != probe.name());
        tracing::debug!(probe = probe.name(), "health probe registered");
        probes.push(probe);
    }

    pub async fn probe_names(&self) -> Vec<String> {
        self.probes
            .read()
            .await
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub async fn check_all(&self) -> HealthReport {
        self.check_all_within(self.timeout).await
    }

    /// Runs every registered probe concurrently, bounded by `timeout`.
    pub async fn check_all_within(&self, timeout: Duration) -> HealthReport {
        // Snapshot so registration never waits on in-flight checks
        let probes: Vec<Arc<dyn HealthProbe>> = self.probes.read().await.clone();
        let deadline = Instant::now() + timeout;

        let (tx, mut rx) = mpsc::channel::<(String, ProbeResult)>(probes.len().max(1));
        let mut tasks = JoinSet::new();
        for probe in &probes {
            let probe = Arc::clone(probe);
            let tx = tx.clone();
            tasks.spawn(async move {
                let result = probe.check().await;
                let _ = tx.send((probe.name().to_string(), result)).await;
            });
        }
        drop(tx);

        let mut components = BTreeMap::new();
        let mut deadline_hit = false;
        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some((name, result))) => {
                    components.insert(name, result);
                }
                Ok(None) => break,
                Err(_) => {
                    deadline_hit = true;
                    break;
                }
            }
        }
        tasks.abort_all();

        for probe in &probes {
            components
                .entry(probe.name().to_string())
                .or_insert_with(|| {
                    if deadline_hit {
                        tracing::warn!(probe = probe.name(), "health probe timed out");
                        ProbeResult::down(DEADLINE_MESSAGE)
                    } else {
                        tracing::warn!(probe = probe.name(), "health probe task failed");
                        ProbeResult::down("probe task failed")
                    }
                });
        }

        let status = if components.values().all(ProbeResult::is_up) {
            HealthStatus::Up
        } else {
            HealthStatus::Down
        };

        HealthReport {
            status,
            components,
            timestamp: Utc::now(),
            version: self.version.clone(),
            uptime: format_uptime(self.uptime()),
        }
    }
}

/// Renders a duration as `1h2m3s`, `2m3s` or `3s`.
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{m}m{s}s")
    } else {
        format!("{s}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, bool);

    #[async_trait]
    impl HealthProbe for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        async fn check(&self) -> ProbeResult {
            if self.1 {
                ProbeResult::up().with_detail("answer", 42)
            } else {
                ProbeResult::down("unreachable")
            }
        }
    }

    #[test]
    fn uptime_format() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0s");
        assert_eq!(format_uptime(Duration::from_secs(125)), "2m5s");
        assert_eq!(format_uptime(Duration::from_secs(3723)), "1h2m3s");
        assert_eq!(format_uptime(Duration::from_secs(90_000)), "25h0m0s");
    }

    #[tokio::test]
    async fn empty_aggregator_is_up() {
        let aggregator = HealthAggregator::new("1.0.0", Duration::from_secs(5));
        let report = aggregator.check_all().await;
        assert!(report.is_up());
        assert!(report.components.is_empty());
        assert_eq!(report.version, "1.0.0");
    }

    #[tokio::test]
    async fn any_down_component_fails_the_aggregate() {
        let aggregator = HealthAggregator::new("1.0.0", Duration::from_secs(5));
        aggregator.register(Arc::new(Fixed("memory", true))).await;
        aggregator.register(Arc::new(Fixed("database", false))).await;

        let report = aggregator.check_all().await;
        assert_eq!(report.status, HealthStatus::Down);
        assert!(report.components["memory"].is_up());
        assert_eq!(
            report.components["database"].message.as_deref(),
            Some("unreachable")
        );
    }

    #[tokio::test]
    async fn register_replaces_same_name() {
        let aggregator = HealthAggregator::new("1.0.0", Duration::from_secs(5));
        aggregator.register(Arc::new(Fixed("database", false))).await;
        aggregator.register(Arc::new(Fixed("database", true))).await;

        assert_eq!(aggregator.probe_names().await, vec!["database"]);
        assert!(aggregator.check_all().await.is_up());
    }

    #[test]
    fn report_serialization_shape() {
        let report = HealthReport {
            status: HealthStatus::Up,
            components: BTreeMap::from([("memory".to_string(), ProbeResult::up())]),
            timestamp: Utc::now(),
            version: "1.0.0".into(),
            uptime: "3s".into(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "UP");
        assert_eq!(json["components"]["memory"]["status"], "UP");
        assert!(json["components"]["memory"].get("message").is_none());
        assert!(json["components"]["memory"].get("details").is_none());
    }
}
