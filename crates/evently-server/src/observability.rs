//! Log output: a `fmt` layer behind a reloadable `EnvFilter`.
//!
//! The subscriber is installed at `info` before the config file is read.
//! Once configuration is loaded, [`apply_logging_level`] swaps in
//! `logging.level`. A `RUST_LOG` variable overrides both.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

const STARTUP_LEVEL: &str = "info";

type FilterHandle = reload::Handle<EnvFilter, Registry>;

static FILTER: OnceLock<FilterHandle> = OnceLock::new();

fn rust_log_set() -> bool {
    std::env::var_os(EnvFilter::DEFAULT_ENV).is_some()
}

/// Filter for a configured level. Unparseable directives fall back to `info`.
fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(STARTUP_LEVEL))
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init_tracing() {
    let filter = rust_log_set()
        .then(|| EnvFilter::try_from_default_env().ok())
        .flatten()
        .unwrap_or_else(|| level_filter(STARTUP_LEVEL));

    let (filter, handle) = reload::Layer::new(filter);
    if tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()
        .is_ok()
    {
        let _ = FILTER.set(handle);
    }
}

/// Switches the active filter to `level` unless `RUST_LOG` is set.
///
/// Returns `false` when nothing changed.
pub fn apply_logging_level(level: &str) -> bool {
    if rust_log_set() {
        return false;
    }
    let Some(handle) = FILTER.get() else {
        return false;
    };
    match handle.reload(level_filter(level)) {
        Ok(()) => {
            tracing::debug!(level, "log level applied");
            true
        }
        Err(e) => {
            tracing::warn!(level, error = %e, "failed to apply log level");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_level_falls_back_to_info() {
        assert_eq!(level_filter("verbose=[").to_string(), "info");
        assert_eq!(level_filter("debug").to_string(), "debug");
    }
}
