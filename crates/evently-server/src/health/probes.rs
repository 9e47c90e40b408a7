//! Concrete health probes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use evently_db_postgres::{PgPool, PoolStats};
use serde_json::{Map, Value};
use sysinfo::{Disks, System};

use super::{HealthProbe, ProbeResult};
use crate::kv::DynKvStore;

/// Formats a byte count the way operators read it: `1.50GB`, `12.00MB`, `512B`.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1 << 10;
    const MB: u64 = 1 << 20;
    const GB: u64 = 1 << 30;
    match bytes {
        b if b >= GB => format!("{:.2}GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.2}MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.2}KB", b as f64 / KB as f64),
        b => format!("{b}B"),
    }
}

/// Pings the relational store and reports pool occupancy.
pub struct DatabaseProbe {
    pool: PgPool,
    timeout: Duration,
}

impl DatabaseProbe {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl HealthProbe for DatabaseProbe {
    fn name(&self) -> &str {
        "database"
    }

    async fn check(&self) -> ProbeResult {
        match tokio::time::timeout(self.timeout, evently_db_postgres::ping(&self.pool)).await {
            Err(_) => {
                return ProbeResult::down(format!(
                    "Database ping timed out after {}ms",
                    self.timeout.as_millis()
                ));
            }
            Ok(Err(e)) => return ProbeResult::down(format!("Database ping failed: {e}")),
            Ok(Ok(())) => {}
        }

        let stats = PoolStats::from_pool(&self.pool);
        ProbeResult::up()
            .with_detail("open_connections", stats.size)
            .with_detail("in_use", stats.in_use)
            .with_detail("idle", stats.idle)
            .with_detail("max_open_connections", stats.max_connections)
    }
}

/// Pings the shared key-value store and reports its memory statistics.
pub struct KvStoreProbe {
    store: DynKvStore,
    timeout: Duration,
}

impl KvStoreProbe {
    pub fn new(store: DynKvStore, timeout: Duration) -> Self {
        Self { store, timeout }
    }
}

#[async_trait]
impl HealthProbe for KvStoreProbe {
    fn name(&self) -> &str {
        "cache"
    }

    async fn check(&self) -> ProbeResult {
        match tokio::time::timeout(self.timeout, self.store.ping()).await {
            Err(_) => {
                return ProbeResult::down(format!(
                    "Cache ping timed out after {}ms",
                    self.timeout.as_millis()
                ));
            }
            Ok(Err(e)) => return ProbeResult::down(format!("Cache ping failed: {e}")),
            Ok(Ok(())) => {}
        }

        let result = ProbeResult::up().with_detail("backend", self.store.backend_name());
        // Statistics are best effort once the ping succeeded
        match tokio::time::timeout(self.timeout, self.store.memory_info()).await {
            Ok(Ok(info)) => result.with_detail("info", format_memory_info(&info)),
            Ok(Err(e)) => result.with_message(format!("memory info unavailable: {e}")),
            Err(_) => result.with_message("memory info timed out"),
        }
    }
}

fn format_memory_info(info: &BTreeMap<String, String>) -> Value {
    let bytes = |key: &str| -> Option<Value> {
        info.get(key).map(|raw| {
            raw.parse::<u64>()
                .map(format_bytes)
                .unwrap_or_else(|_| raw.clone())
                .into()
        })
    };
    let raw = |key: &str| info.get(key).map(|v| Value::from(v.as_str()));

    let fields = [
        ("Used Memory", bytes("used_memory")),
        ("Used Memory RSS", bytes("used_memory_rss")),
        ("Memory Fragmentation Ratio", raw("mem_fragmentation_ratio")),
        ("Max Memory", bytes("maxmemory")),
        ("Max Memory Policy", raw("maxmemory_policy")),
        ("Overhead Memory", bytes("used_memory_overhead")),
        ("Dataset Memory", bytes("used_memory_dataset")),
        ("Total System Memory", bytes("total_system_memory")),
        ("Keys", raw("keys")),
    ];
    let map: Map<String, Value> = fields
        .into_iter()
        .filter_map(|(label, value)| value.map(|v| (label.to_string(), v)))
        .collect();
    Value::Object(map)
}

/// Reports process and system memory.
#[derive(Debug, Default)]
pub struct MemoryProbe;

impl MemoryProbe {
    pub fn new() -> Self {
        Self
    }
}

struct MemorySnapshot {
    process_rss: Option<u64>,
    process_virtual: Option<u64>,
    total: u64,
    used: u64,
    available: u64,
}

fn memory_snapshot() -> MemorySnapshot {
    let mut sys = System::new();
    sys.refresh_memory();
    let process = sysinfo::get_current_pid().ok().and_then(|pid| {
        sys.refresh_process(pid);
        sys.process(pid)
            .map(|p| (p.memory(), p.virtual_memory()))
    });
    MemorySnapshot {
        process_rss: process.map(|(rss, _)| rss),
        process_virtual: process.map(|(_, virt)| virt),
        total: sys.total_memory(),
        used: sys.used_memory(),
        available: sys.available_memory(),
    }
}

#[async_trait]
impl HealthProbe for MemoryProbe {
    fn name(&self) -> &str {
        "memory"
    }

    async fn check(&self) -> ProbeResult {
        let snapshot = match tokio::task::spawn_blocking(memory_snapshot).await {
            Ok(snapshot) => snapshot,
            Err(e) => return ProbeResult::down(format!("memory statistics unavailable: {e}")),
        };

        let mut result = ProbeResult::up()
            .with_detail("system_total", format_bytes(snapshot.total))
            .with_detail("system_used", format_bytes(snapshot.used))
            .with_detail("system_available", format_bytes(snapshot.available));
        if let Some(rss) = snapshot.process_rss {
            result = result.with_detail("process_rss", format_bytes(rss));
        }
        if let Some(virt) = snapshot.process_virtual {
            result = result.with_detail("process_virtual", format_bytes(virt));
        }
        result
    }
}

/// Reports free space on the filesystem holding `path`.
pub struct DiskProbe {
    path: PathBuf,
    min_free_ratio: f64,
}

impl DiskProbe {
    pub fn new(path: impl Into<PathBuf>, min_free_ratio: f64) -> Self {
        Self {
            path: path.into(),
            min_free_ratio,
        }
    }
}

struct DiskUsage {
    mount_point: PathBuf,
    total: u64,
    available: u64,
}

/// The disk whose mount point is the longest prefix of `path`.
fn disk_usage(path: &Path) -> Option<DiskUsage> {
    let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|d| path.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .map(|d| DiskUsage {
            mount_point: d.mount_point().to_path_buf(),
            total: d.total_space(),
            available: d.available_space(),
        })
}

/// DOWN when the free/total ratio drops below `min_free_ratio`.
fn evaluate_disk(path: &Path, usage: &DiskUsage, min_free_ratio: f64) -> ProbeResult {
    let free_ratio = if usage.total == 0 {
        0.0
    } else {
        usage.available as f64 / usage.total as f64
    };
    let result = if free_ratio < min_free_ratio {
        ProbeResult::down(format!(
            "free space {:.1}% is below the {:.1}% threshold",
            free_ratio * 100.0,
            min_free_ratio * 100.0
        ))
    } else {
        ProbeResult::up()
    };
    result
        .with_detail("path", path.display().to_string())
        .with_detail("mount_point", usage.mount_point.display().to_string())
        .with_detail("total", format_bytes(usage.total))
        .with_detail("free", format_bytes(usage.available))
        .with_detail("used", format_bytes(usage.total.saturating_sub(usage.available)))
        .with_detail("free_ratio", (free_ratio * 1000.0).round() / 1000.0)
}

#[async_trait]
impl HealthProbe for DiskProbe {
    fn name(&self) -> &str {
        "disk"
    }

    async fn check(&self) -> ProbeResult {
        let path = self.path.clone();
        let usage = match tokio::task::spawn_blocking(move || disk_usage(&path)).await {
            Ok(Some(usage)) => usage,
            Ok(None) => {
                return ProbeResult::down(format!(
                    "no filesystem found for {}",
                    self.path.display()
                ));
            }
            Err(e) => return ProbeResult::down(format!("disk statistics unavailable: {e}")),
        };
        evaluate_disk(&self.path, &usage, self.min_free_ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthStatus;
    use crate::kv::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn byte_formatting() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(1536), "1.50KB");
        assert_eq!(format_bytes(12 * 1024 * 1024), "12.00MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024 / 2), "1.50GB");
    }

    #[test]
    fn memory_info_labels() {
        let info = BTreeMap::from([
            ("used_memory".to_string(), "1048576".to_string()),
            ("maxmemory_policy".to_string(), "allkeys-lru".to_string()),
            ("mem_fragmentation_ratio".to_string(), "1.07".to_string()),
        ]);
        let formatted = format_memory_info(&info);
        assert_eq!(formatted["Used Memory"], "1.00MB");
        assert_eq!(formatted["Max Memory Policy"], "allkeys-lru");
        assert_eq!(formatted["Memory Fragmentation Ratio"], "1.07");
        assert!(formatted.get("Dataset Memory").is_none());
    }

    #[test]
    fn disk_threshold() {
        let usage = DiskUsage {
            mount_point: PathBuf::from("/"),
            total: 1000,
            available: 40,
        };
        let result = evaluate_disk(Path::new("/var/lib"), &usage, 0.05);
        assert_eq!(result.status, HealthStatus::Down);
        assert_eq!(result.details["free_ratio"], 0.04);

        let result = evaluate_disk(Path::new("/var/lib"), &usage, 0.01);
        assert!(result.is_up());
    }

    #[tokio::test]
    async fn kv_probe_reports_backend() {
        let probe = KvStoreProbe::new(Arc::new(MemoryStore::new()), Duration::from_secs(1));
        let result = probe.check().await;
        assert!(result.is_up());
        assert_eq!(result.details["backend"], "memory");
        assert_eq!(result.details["info"]["Keys"], "0");
    }

    #[tokio::test]
    async fn memory_probe_is_up() {
        let result = MemoryProbe::new().check().await;
        assert!(result.is_up());
        assert!(result.details.contains_key("system_total"));
    }
}
