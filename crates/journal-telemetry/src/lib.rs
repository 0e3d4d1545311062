mod logging;

pub use logging::{WarnLog, WarnLogLayer};

use std::path::PathBuf;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "journal_store" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// JSON lines on stdout instead of human-readable output.
    pub json: bool,
    /// Whether to persist warn+ logs to SQLite.
    pub log_to_sqlite: bool,
    /// Path to the log database.
    pub log_db_path: PathBuf,
    /// Persisted warnings older than this are dropped at startup.
    pub log_retention_days: u32,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
            log_to_sqlite: false,
            log_db_path: PathBuf::from("data").join("logs.sqlite"),
            log_retention_days: 14,
        }
    }
}

impl TelemetryConfig {
    /// Filter directive string, e.g. `info,journal_store=debug`.
    pub fn filter_directives(&self) -> String {
        let mut filter = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("subscriber already installed: {0}")]
    AlreadyInitialized(String),
    #[error("failed to open log database: {0}")]
    WarnLog(#[from] rusqlite::Error),
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(env_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(env_filter)
            .boxed()
    };

    let warn_layer = if config.log_to_sqlite {
        let log = WarnLog::open(&config.log_db_path, config.log_retention_days)?;
        Some(WarnLogLayer::new(Arc::new(log)))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(warn_layer)
        .try_init()
        .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.log_level, Level::INFO);
        assert!(!config.log_to_sqlite);
        assert_eq!(config.log_db_path, PathBuf::from("data/logs.sqlite"));
        assert_eq!(config.log_retention_days, 14);
    }

    #[test]
    fn filter_directives_include_module_overrides() {
        let config = TelemetryConfig {
            log_level: Level::WARN,
            module_levels: vec![
                ("journal_store".into(), Level::DEBUG),
                ("tower_http".into(), Level::TRACE),
            ],
            ..Default::default()
        };
        assert_eq!(
            config.filter_directives(),
            "warn,journal_store=debug,tower_http=trace"
        );
    }
}
