//! Configuration layer: typed settings with layered precedence (file → env).

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const ENV_PREFIX: &str = "RAFFICA";
const LOCAL_CONFIG_BASENAME: &str = "raffica";

const DEFAULT_STORE_TIMEOUT_MS: u64 = 200;
const DEFAULT_STORE_SWEEP_INTERVAL_MS: u64 = 30_000;
const DEFAULT_CACHE_TTL_SECS: u64 = 60;
const DEFAULT_CACHE_MAX_BODY_BYTES: u64 = 1024 * 1024;
const DEFAULT_SESSION_MAX_MESSAGES: u64 = 100;
const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_SESSION_CONTEXT_WINDOW: u64 = 10;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u64 = 180;
const DEFAULT_CHAT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_CHAT_RATE_LIMIT_MAX_REQUESTS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LogLevel,
    pub format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Deadline applied to every store call.
    pub timeout: Duration,
    /// Cadence of the expired-entry sweeper.
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    /// TTL for routes the registry resolves to the default policy.
    pub default_ttl: Duration,
    /// Responses larger than this are never cached.
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub max_messages: usize,
    pub ttl: Duration,
    /// Log entries fed to the completion context.
    pub context_window: usize,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub window: Duration,
    pub max_requests: u64,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub store: StoreSettings,
    pub cache: CacheSettings,
    pub session: SessionSettings,
    /// Generic per-IP gate.
    pub rate_limit: RateLimitSettings,
    /// Per-user chat gate, independent of the generic one.
    pub chat_rate_limit: RateLimitSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            logging: LoggingSettings {
                level: LogLevel::Info,
                format: LogFormat::Compact,
            },
            store: StoreSettings {
                timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
                sweep_interval: Duration::from_millis(DEFAULT_STORE_SWEEP_INTERVAL_MS),
            },
            cache: CacheSettings {
                enabled: true,
                default_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
                max_body_bytes: DEFAULT_CACHE_MAX_BODY_BYTES as usize,
            },
            session: SessionSettings {
                max_messages: DEFAULT_SESSION_MAX_MESSAGES as usize,
                ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
                context_window: DEFAULT_SESSION_CONTEXT_WINDOW as usize,
            },
            rate_limit: RateLimitSettings {
                window: Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECS),
                max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            },
            chat_rate_limit: RateLimitSettings {
                window: Duration::from_secs(DEFAULT_CHAT_RATE_LIMIT_WINDOW_SECS),
                max_requests: DEFAULT_CHAT_RATE_LIMIT_MAX_REQUESTS,
            },
        }
    }
}

/// Load settings from an optional TOML file, then the `RAFFICA__*`
/// environment, then built-in defaults for whatever remains.
pub fn load(file: Option<&Path>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();
    builder = match file {
        Some(path) => builder.add_source(File::from(path).required(true)),
        None => builder.add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false)),
    };
    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.finalize()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    store: RawStoreSettings,
    cache: RawCacheSettings,
    session: RawSessionSettings,
    rate_limit: RawRateLimitSettings,
    chat_rate_limit: RawChatRateLimitSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<LogLevel>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStoreSettings {
    timeout_ms: Option<u64>,
    sweep_interval_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    default_ttl_seconds: Option<u64>,
    max_body_bytes: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSessionSettings {
    max_messages: Option<u64>,
    ttl_seconds: Option<u64>,
    context_window: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRateLimitSettings {
    window_seconds: Option<u64>,
    max_requests: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawChatRateLimitSettings {
    window_seconds: Option<u64>,
    max_requests: Option<u64>,
}

impl RawSettings {
    fn finalize(self) -> Result<Settings, ConfigError> {
        let settings = Settings {
            logging: LoggingSettings {
                level: self.logging.level.unwrap_or(LogLevel::Info),
                format: self.logging.format.unwrap_or(LogFormat::Compact),
            },
            store: StoreSettings {
                timeout: Duration::from_millis(
                    self.store.timeout_ms.unwrap_or(DEFAULT_STORE_TIMEOUT_MS),
                ),
                sweep_interval: Duration::from_millis(
                    self.store
                        .sweep_interval_ms
                        .unwrap_or(DEFAULT_STORE_SWEEP_INTERVAL_MS),
                ),
            },
            cache: CacheSettings {
                enabled: self.cache.enabled.unwrap_or(true),
                default_ttl: Duration::from_secs(
                    self.cache
                        .default_ttl_seconds
                        .unwrap_or(DEFAULT_CACHE_TTL_SECS),
                ),
                max_body_bytes: self
                    .cache
                    .max_body_bytes
                    .unwrap_or(DEFAULT_CACHE_MAX_BODY_BYTES)
                    as usize,
            },
            session: SessionSettings {
                max_messages: self
                    .session
                    .max_messages
                    .unwrap_or(DEFAULT_SESSION_MAX_MESSAGES) as usize,
                ttl: Duration::from_secs(
                    self.session.ttl_seconds.unwrap_or(DEFAULT_SESSION_TTL_SECS),
                ),
                context_window: self
                    .session
                    .context_window
                    .unwrap_or(DEFAULT_SESSION_CONTEXT_WINDOW) as usize,
            },
            rate_limit: RateLimitSettings {
                window: Duration::from_secs(
                    self.rate_limit
                        .window_seconds
                        .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECS),
                ),
                max_requests: self
                    .rate_limit
                    .max_requests
                    .unwrap_or(DEFAULT_RATE_LIMIT_MAX_REQUESTS),
            },
            chat_rate_limit: RateLimitSettings {
                window: Duration::from_secs(
                    self.chat_rate_limit
                        .window_seconds
                        .unwrap_or(DEFAULT_CHAT_RATE_LIMIT_WINDOW_SECS),
                ),
                max_requests: self
                    .chat_rate_limit
                    .max_requests
                    .unwrap_or(DEFAULT_CHAT_RATE_LIMIT_MAX_REQUESTS),
            },
        };
        settings.validate()?;
        Ok(settings)
    }
}

impl Settings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.store.timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "store.timeout_ms must be positive".into(),
            ));
        }
        if self.session.max_messages == 0 {
            return Err(ConfigError::Invalid(
                "session.max_messages must be positive".into(),
            ));
        }
        if self.session.context_window == 0 {
            return Err(ConfigError::Invalid(
                "session.context_window must be positive".into(),
            ));
        }
        if self.rate_limit.window.is_zero() || self.chat_rate_limit.window.is_zero() {
            return Err(ConfigError::Invalid(
                "rate limit windows must be positive".into(),
            ));
        }
        Ok(())
    }
}
