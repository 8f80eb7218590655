//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{CliArgs, Command, DatabaseOverride, HealthArgs, LoggingOverrides, MigrateArgs};

use std::{num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::articles::PublishMode;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "lectern";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_DB_STATEMENT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_REDIS_OP_TIMEOUT_MS: u64 = 500;
const DEFAULT_REDIS_CONNECT_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_REDIS_RETRIES: u32 = 1;
const DEFAULT_PUBLISH_ATTEMPTS: u32 = 3;
const DEFAULT_CONTENT_TTL_SECS: u64 = 600;
const DEFAULT_INTERACTIVE_TTL_SECS: u64 = 900;
const DEFAULT_FIRST_PAGE_SIZE: u32 = 100;
const DEFAULT_PRECACHE_MAX_BYTES: u64 = 1024 * 1024;
const DEFAULT_CODE_TTL_SECS: u64 = 600;
const DEFAULT_CODE_RESEND_COOLDOWN_SECS: u64 = 60;
const DEFAULT_CODE_VERIFY_ATTEMPTS: u32 = 3;
const DEFAULT_CODE_LENGTH: u32 = 6;
const MAX_CODE_LENGTH: u32 = 18;
const DEFAULT_WRITE_BACK_CONCURRENCY: u32 = 64;
const DEFAULT_WRITE_BACK_TIMEOUT_MS: u64 = 1_000;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub store: StoreSettings,
    pub cache: CacheSettings,
    pub codes: CodeSettings,
    pub write_back: WriteBackSettings,
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
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
    pub statement_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RedisSettings {
    /// `None` selects the in-process cache.
    pub url: Option<String>,
    pub op_timeout: Duration,
    pub connect_timeout: Duration,
    pub retries: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown backend `{other}` (expected postgres|memory)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub publish_mode: PublishMode,
    pub publish_attempts: NonZeroU32,
    /// Mirror published bodies into this directory when set.
    pub blob_directory: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub content_ttl: Duration,
    pub interactive_ttl: Duration,
    pub first_page_size: NonZeroU32,
    pub precache_max_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct CodeSettings {
    pub ttl: Duration,
    pub resend_cooldown: Duration,
    pub verify_attempts: NonZeroU32,
    pub length: usize,
}

#[derive(Debug, Clone)]
pub struct WriteBackSettings {
    pub concurrency: NonZeroU32,
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

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("LECTERN").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Migrate(args)) => raw.apply_migrate_overrides(args),
        Some(Command::Health(args)) => raw.apply_health_overrides(args),
        None => {}
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    redis: RawRedisSettings,
    store: RawStoreSettings,
    cache: RawCacheSettings,
    codes: RawCodeSettings,
    write_back: RawWriteBackSettings,
}

impl RawSettings {
    fn apply_migrate_overrides(&mut self, args: &MigrateArgs) {
        self.apply_logging_overrides(&args.logging);
        self.apply_database_override(&args.database);
    }

    fn apply_health_overrides(&mut self, args: &HealthArgs) {
        self.apply_logging_overrides(&args.logging);
        self.apply_database_override(&args.database);
        if let Some(url) = args.redis_url.as_ref() {
            self.redis.url = Some(url.clone());
        }
        if let Some(backend) = args.store_backend.as_ref() {
            self.store.backend = Some(backend.clone());
        }
    }

    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            redis,
            store,
            cache,
            codes,
            write_back,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let redis = build_redis_settings(redis)?;
        let store = build_store_settings(store)?;
        let cache = build_cache_settings(cache)?;
        let codes = build_code_settings(codes)?;
        let write_back = build_write_back_settings(write_back)?;

        Ok(Self {
            logging,
            database,
            redis,
            store,
            cache,
            codes,
            write_back,
        })
    }
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

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;
    let statement_timeout = non_zero_millis(
        database
            .statement_timeout_ms
            .unwrap_or(DEFAULT_DB_STATEMENT_TIMEOUT_MS),
        "database.statement_timeout_ms",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
        statement_timeout,
    })
}

fn build_redis_settings(redis: RawRedisSettings) -> Result<RedisSettings, LoadError> {
    let url = non_blank(redis.url);
    let op_timeout = non_zero_millis(
        redis.op_timeout_ms.unwrap_or(DEFAULT_REDIS_OP_TIMEOUT_MS),
        "redis.op_timeout_ms",
    )?;
    let connect_timeout = non_zero_millis(
        redis
            .connect_timeout_ms
            .unwrap_or(DEFAULT_REDIS_CONNECT_TIMEOUT_MS),
        "redis.connect_timeout_ms",
    )?;
    let retries = redis.retries.unwrap_or(DEFAULT_REDIS_RETRIES) as usize;

    Ok(RedisSettings {
        url,
        op_timeout,
        connect_timeout,
        retries,
    })
}

fn build_store_settings(store: RawStoreSettings) -> Result<StoreSettings, LoadError> {
    let backend = match store.backend {
        Some(value) => StoreBackend::from_str(&value)
            .map_err(|reason| LoadError::invalid("store.backend", reason))?,
        None => StoreBackend::Postgres,
    };

    let publish_mode = match store.publish_mode.as_deref().map(str::trim) {
        None | Some("transactional") => PublishMode::Transactional,
        Some("split") => PublishMode::Split,
        Some(other) => {
            return Err(LoadError::invalid(
                "store.publish_mode",
                format!("unknown mode `{other}` (expected transactional|split)"),
            ));
        }
    };

    let publish_attempts = non_zero_u32(
        store
            .publish_attempts
            .unwrap_or(DEFAULT_PUBLISH_ATTEMPTS)
            .into(),
        "store.publish_attempts",
    )?;

    let blob_directory = store
        .blob_directory
        .filter(|path| !path.as_os_str().is_empty());

    Ok(StoreSettings {
        backend,
        publish_mode,
        publish_attempts,
        blob_directory,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let content_ttl = non_zero_secs(
        cache.content_ttl_seconds.unwrap_or(DEFAULT_CONTENT_TTL_SECS),
        "cache.content_ttl_seconds",
    )?;
    let interactive_ttl = non_zero_secs(
        cache
            .interactive_ttl_seconds
            .unwrap_or(DEFAULT_INTERACTIVE_TTL_SECS),
        "cache.interactive_ttl_seconds",
    )?;
    let first_page_size = non_zero_u32(
        cache
            .first_page_size
            .unwrap_or(DEFAULT_FIRST_PAGE_SIZE)
            .into(),
        "cache.first_page_size",
    )?;

    let precache_value = cache
        .precache_max_bytes
        .unwrap_or(DEFAULT_PRECACHE_MAX_BYTES);
    if precache_value == 0 {
        return Err(LoadError::invalid(
            "cache.precache_max_bytes",
            "must be greater than zero",
        ));
    }
    let precache_max_bytes = usize::try_from(precache_value).map_err(|_| {
        LoadError::invalid(
            "cache.precache_max_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(CacheSettings {
        content_ttl,
        interactive_ttl,
        first_page_size,
        precache_max_bytes,
    })
}

fn build_code_settings(codes: RawCodeSettings) -> Result<CodeSettings, LoadError> {
    let ttl = non_zero_secs(
        codes.ttl_seconds.unwrap_or(DEFAULT_CODE_TTL_SECS),
        "codes.ttl_seconds",
    )?;
    let resend_cooldown = non_zero_secs(
        codes
            .resend_cooldown_seconds
            .unwrap_or(DEFAULT_CODE_RESEND_COOLDOWN_SECS),
        "codes.resend_cooldown_seconds",
    )?;
    if resend_cooldown >= ttl {
        return Err(LoadError::invalid(
            "codes.resend_cooldown_seconds",
            "must be shorter than codes.ttl_seconds",
        ));
    }

    let verify_attempts = non_zero_u32(
        codes
            .verify_attempts
            .unwrap_or(DEFAULT_CODE_VERIFY_ATTEMPTS)
            .into(),
        "codes.verify_attempts",
    )?;

    let length = codes.length.unwrap_or(DEFAULT_CODE_LENGTH);
    if length == 0 || length > MAX_CODE_LENGTH {
        return Err(LoadError::invalid(
            "codes.length",
            format!("must be between 1 and {MAX_CODE_LENGTH}"),
        ));
    }

    Ok(CodeSettings {
        ttl,
        resend_cooldown,
        verify_attempts,
        length: length as usize,
    })
}

fn build_write_back_settings(
    write_back: RawWriteBackSettings,
) -> Result<WriteBackSettings, LoadError> {
    let concurrency = non_zero_u32(
        write_back
            .concurrency
            .unwrap_or(DEFAULT_WRITE_BACK_CONCURRENCY)
            .into(),
        "write_back.concurrency",
    )?;
    let timeout = non_zero_millis(
        write_back
            .timeout_ms
            .unwrap_or(DEFAULT_WRITE_BACK_TIMEOUT_MS),
        "write_back.timeout_ms",
    )?;

    Ok(WriteBackSettings {
        concurrency,
        timeout,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
    statement_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRedisSettings {
    url: Option<String>,
    op_timeout_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    retries: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStoreSettings {
    backend: Option<String>,
    publish_mode: Option<String>,
    publish_attempts: Option<u32>,
    blob_directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    content_ttl_seconds: Option<u64>,
    interactive_ttl_seconds: Option<u64>,
    first_page_size: Option<u32>,
    precache_max_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCodeSettings {
    ttl_seconds: Option<u64>,
    resend_cooldown_seconds: Option<u64>,
    verify_attempts: Option<u32>,
    length: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWriteBackSettings {
    concurrency: Option<u32>,
    timeout_ms: Option<u64>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn non_zero_millis(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(value))
}
