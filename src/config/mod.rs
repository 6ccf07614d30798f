//! Configuration layer: typed settings with layered precedence (file → env).

use std::{path::Path, str::FromStr, time::Duration};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::CacheConfig;
use crate::infra::PoolSettings;

const LOCAL_CONFIG_BASENAME: &str = "agora";
const ENV_PREFIX: &str = "AGORA";
const DEFAULT_QUERY_TIMEOUT_MS: u64 = 2_000;

/// Fully-resolved engine settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub logging: LoggingSettings,
    pub cache: CacheConfig,
    pub pool: PoolSettings,
    pub query: QuerySettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct QuerySettings {
    /// Ceiling on one aggregation round trip to the source of truth.
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment).
///
/// An `agora.toml` in the working directory is picked up when present; an
/// explicit path is required to exist. Environment variables use the
/// `AGORA` prefix with `__` as the section separator, e.g.
/// `AGORA_CACHE__WARM_TTL_SECS=900`.
pub fn load(config_file: Option<&Path>) -> Result<EngineSettings, LoadError> {
    let mut builder =
        Config::builder().add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    EngineSettings::from_raw(raw)
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            logging: LoggingSettings {
                level: LevelFilter::INFO,
                format: LogFormat::Compact,
            },
            cache: CacheConfig::default(),
            pool: PoolSettings::default(),
            query: QuerySettings {
                timeout: Duration::from_millis(DEFAULT_QUERY_TIMEOUT_MS),
            },
        }
    }
}

impl EngineSettings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let logging = build_logging_settings(raw.logging)?;

        raw.cache
            .validate()
            .map_err(|reason| LoadError::invalid("cache", reason))?;
        raw.pool
            .validate()
            .map_err(|err| LoadError::invalid("pool", err.to_string()))?;

        let timeout_ms = raw.query.timeout_ms.unwrap_or(DEFAULT_QUERY_TIMEOUT_MS);
        if timeout_ms == 0 {
            return Err(LoadError::invalid(
                "query.timeout_ms",
                "must be positive",
            ));
        }

        Ok(Self {
            logging,
            cache: raw.cache,
            pool: raw.pool,
            query: QuerySettings {
                timeout: Duration::from_millis(timeout_ms),
            },
        })
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: CacheConfig,
    pool: PoolSettings,
    query: RawQuerySettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawQuerySettings {
    timeout_ms: Option<u64>,
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_from_empty_raw() {
        let settings = EngineSettings::from_raw(RawSettings::default()).expect("valid settings");
        assert!(matches!(settings.logging.format, LogFormat::Compact));
        assert_eq!(settings.logging.level, LevelFilter::INFO);
        assert_eq!(settings.query.timeout, Duration::from_millis(2_000));
        assert!(settings.cache.enabled);
    }

    #[test]
    fn logging_level_and_format_are_parsed() {
        let mut raw = RawSettings::default();
        raw.logging.level = Some("debug".to_string());
        raw.logging.json = Some(true);

        let settings = EngineSettings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn invalid_log_level_is_rejected() {
        let mut raw = RawSettings::default();
        raw.logging.level = Some("chatty".to_string());

        let result = EngineSettings::from_raw(raw);
        assert!(matches!(
            result,
            Err(LoadError::Invalid {
                key: "logging.level",
                ..
            })
        ));
    }

    #[test]
    fn misordered_cache_tiers_fail_load() {
        let mut raw = RawSettings::default();
        raw.cache.hot_ttl_secs = 7_200;

        let result = EngineSettings::from_raw(raw);
        assert!(matches!(result, Err(LoadError::Invalid { key: "cache", .. })));
    }

    #[test]
    fn zero_query_timeout_is_rejected() {
        let mut raw = RawSettings::default();
        raw.query.timeout_ms = Some(0);

        let result = EngineSettings::from_raw(raw);
        assert!(matches!(
            result,
            Err(LoadError::Invalid {
                key: "query.timeout_ms",
                ..
            })
        ));
    }

    #[test]
    fn unbounded_pool_fails_load() {
        let mut raw = RawSettings::default();
        raw.pool.max_size = 0;

        let result = EngineSettings::from_raw(raw);
        assert!(matches!(result, Err(LoadError::Invalid { key: "pool", .. })));
    }
}
