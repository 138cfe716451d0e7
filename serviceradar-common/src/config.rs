//! Core configuration loading.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Logging output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format.
    #[default]
    Text,
    /// Structured JSON format for log aggregation.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Poller liveness and alerting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    /// How long a poller may stay silent before it is declared offline.
    #[serde(default = "default_alert_threshold_secs", with = "secs")]
    pub alert_threshold: Duration,

    /// Minimum spacing between repeated alerts for the same
    /// (poller_id, title, service_name) key. Zero disables suppression.
    #[serde(default = "default_alert_cooldown_secs", with = "secs")]
    pub alert_cooldown: Duration,

    /// How often the liveness evaluator sweeps cached poller statuses.
    #[serde(default = "default_evaluator_interval_secs", with = "secs")]
    pub evaluator_interval: Duration,
}

fn default_alert_threshold_secs() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_alert_cooldown_secs() -> Duration {
    Duration::from_secs(60)
}

fn default_evaluator_interval_secs() -> Duration {
    Duration::from_secs(30)
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            alert_threshold: default_alert_threshold_secs(),
            alert_cooldown: default_alert_cooldown_secs(),
            evaluator_interval: default_evaluator_interval_secs(),
        }
    }
}

/// Buffered-emitter flush cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitterConfig {
    /// Periodic flush cadence for all six per-poller buffers.
    #[serde(default = "default_flush_interval_secs", with = "secs")]
    pub flush_interval: Duration,
}

fn default_flush_interval_secs() -> Duration {
    Duration::from_secs(5)
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            flush_interval: default_flush_interval_secs(),
        }
    }
}

/// Stats aggregator cadence and anomaly cooldown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Snapshot refresh cadence.
    #[serde(default = "default_stats_interval_secs", with = "secs")]
    pub refresh_interval: Duration,

    /// Cooldown before the device-count anomaly alert may fire again.
    #[serde(default = "default_anomaly_cooldown_secs", with = "secs")]
    pub anomaly_cooldown: Duration,

    /// Consecutive empty sysmon payloads before a stall alert.
    #[serde(default = "default_sysmon_stall_threshold")]
    pub sysmon_stall_threshold: u32,
}

fn default_stats_interval_secs() -> Duration {
    Duration::from_secs(10)
}

fn default_anomaly_cooldown_secs() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_sysmon_stall_threshold() -> u32 {
    5
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            refresh_interval: default_stats_interval_secs(),
            anomaly_cooldown: default_anomaly_cooldown_secs(),
            sysmon_stall_threshold: default_sysmon_stall_threshold(),
        }
    }
}

/// Canonical-ID alias cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries retained (LRU eviction beyond this).
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Entry time-to-live. Should be at least 60s to meaningfully cut
    /// repeat datastore lookups.
    #[serde(default = "default_cache_ttl_secs", with = "secs")]
    pub ttl: Duration,
}

fn default_cache_capacity() -> usize {
    10_000
}

fn default_cache_ttl_secs() -> Duration {
    Duration::from_secs(60)
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl: default_cache_ttl_secs(),
        }
    }
}

/// Top-level configuration for the ServiceRadar ingest core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Liveness/alerting configuration.
    #[serde(default)]
    pub liveness: LivenessConfig,

    /// Buffered emitter configuration.
    #[serde(default)]
    pub emitter: EmitterConfig,

    /// Stats aggregator configuration.
    #[serde(default)]
    pub stats: StatsConfig,

    /// Canonical-ID alias cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Data directory for any local core state. Created at startup if
    /// missing; defaults to the platform data directory when unset.
    #[serde(default)]
    pub data_dir: Option<String>,

    /// Optional poller allow-list. Unknown pollers are still acknowledged
    /// but receive no liveness bookkeeping.
    #[serde(default)]
    pub known_pollers: Vec<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            liveness: LivenessConfig::default(),
            emitter: EmitterConfig::default(),
            stats: StatsConfig::default(),
            cache: CacheConfig::default(),
            data_dir: None,
            known_pollers: Vec::new(),
        }
    }
}

impl CoreConfig {
    /// Load configuration from a JSON5 file, validating it afterwards.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string, validating it afterwards.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = json5::from_str(content)
            .map_err(|e| CoreError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field invariants not expressible via serde defaults.
    pub fn validate(&self) -> Result<()> {
        if self.liveness.alert_threshold.is_zero() {
            return Err(CoreError::validation(
                "liveness.alert_threshold must be greater than zero",
            ));
        }
        if self.emitter.flush_interval.is_zero() {
            return Err(CoreError::validation(
                "emitter.flush_interval must be greater than zero",
            ));
        }
        if self.cache.ttl < Duration::from_secs(60) {
            return Err(CoreError::validation(
                "cache.ttl must be at least 60 seconds",
            ));
        }
        if self.stats.sysmon_stall_threshold == 0 {
            return Err(CoreError::validation(
                "stats.sysmon_stall_threshold must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Resolve the data directory, ensuring it exists. Falls back to the
    /// platform data directory (`dirs::data_dir`) joined with
    /// `serviceradar-core` when unset.
    pub fn ensure_data_dir(&self) -> Result<std::path::PathBuf> {
        let dir = match &self.data_dir {
            Some(configured) => std::path::PathBuf::from(configured),
            None => dirs::data_dir()
                .unwrap_or_else(|| std::path::PathBuf::from("."))
                .join("serviceradar-core"),
        };
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// Initialize tracing from a [`LoggingConfig`].
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| CoreError::config(format!("failed to initialize tracing: {e}")))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| CoreError::config(format!("failed to initialize tracing: {e}")))?;
        }
    }

    Ok(())
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
