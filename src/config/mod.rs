//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::Ttl;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "quire";
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_PROGRESS_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_VERSION_KEY_PREFIX: &str = "ver:";
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_SIMULATE_ITEMS: u64 = 12;
const DEFAULT_SIMULATE_STEP_DELAY_MS: u64 = 25;
const DEFAULT_SIMULATE_POLL_INTERVAL_MS: u64 = 40;
const DEFAULT_SIMULATE_TIMEOUT_SECS: u64 = 60;

/// Command-line arguments for the Quire binary.
#[derive(Debug, Parser)]
#[command(name = "quire", version, about = "Quire cache and progress tooling")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "QUIRE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run an in-memory import with a progress poller and a cached listing demo.
    Simulate(SimulateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub overrides: SimulateOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SimulateOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Toggle read-through caching.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the default cache entry TTL.
    #[arg(long = "cache-default-ttl-seconds", value_name = "SECONDS")]
    pub cache_default_ttl_seconds: Option<u64>,

    /// Override the TTL of task progress records.
    #[arg(long = "cache-progress-ttl-seconds", value_name = "SECONDS")]
    pub cache_progress_ttl_seconds: Option<u64>,

    /// Number of items the simulated import processes.
    #[arg(long = "items", value_name = "COUNT")]
    pub items: Option<u64>,

    /// Delay between simulated import steps.
    #[arg(long = "step-delay-ms", value_name = "MILLIS")]
    pub step_delay_ms: Option<u64>,

    /// Interval between progress polls.
    #[arg(long = "poll-interval-ms", value_name = "MILLIS")]
    pub poll_interval_ms: Option<u64>,

    /// Give up waiting for the simulated import after this many seconds.
    #[arg(long = "timeout-seconds", value_name = "SECONDS")]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub simulate: SimulateSettings,
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
pub struct CacheSettings {
    pub enabled: bool,
    pub default_ttl: Ttl,
    pub progress_ttl: Ttl,
    pub version_key_prefix: String,
    /// How often the in-memory backend drops expired entries.
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct SimulateSettings {
    pub items: NonZeroU32,
    pub step_delay: Duration,
    pub poll_interval: Duration,
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

    builder = builder.add_source(Environment::with_prefix("QUIRE").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Simulate(args)) => raw.apply_simulate_overrides(&args.overrides),
        None => raw.apply_simulate_overrides(&SimulateOverrides::default()),
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
    cache: RawCacheSettings,
    simulate: RawSimulateSettings,
}

impl RawSettings {
    fn apply_simulate_overrides(&mut self, overrides: &SimulateOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(seconds) = overrides.cache_default_ttl_seconds {
            self.cache.default_ttl_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.cache_progress_ttl_seconds {
            self.cache.progress_ttl_seconds = Some(seconds);
        }
        if let Some(items) = overrides.items {
            self.simulate.items = Some(items);
        }
        if let Some(delay) = overrides.step_delay_ms {
            self.simulate.step_delay_ms = Some(delay);
        }
        if let Some(interval) = overrides.poll_interval_ms {
            self.simulate.poll_interval_ms = Some(interval);
        }
        if let Some(seconds) = overrides.timeout_seconds {
            self.simulate.timeout_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            cache,
            simulate,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let simulate = build_simulate_settings(simulate)?;

        Ok(Self {
            logging,
            cache,
            simulate,
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

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let default_ttl = ttl(
        cache.default_ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS),
        "cache.default_ttl_seconds",
    )?;
    let progress_ttl = ttl(
        cache
            .progress_ttl_seconds
            .unwrap_or(DEFAULT_PROGRESS_TTL_SECS),
        "cache.progress_ttl_seconds",
    )?;

    let version_key_prefix = cache
        .version_key_prefix
        .unwrap_or_else(|| DEFAULT_VERSION_KEY_PREFIX.to_string());
    if version_key_prefix.trim().is_empty() {
        return Err(LoadError::invalid(
            "cache.version_key_prefix",
            "must not be empty",
        ));
    }

    let sweep_interval = ttl(
        cache
            .sweep_interval_seconds
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
        "cache.sweep_interval_seconds",
    )?
    .as_duration();

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        default_ttl,
        progress_ttl,
        version_key_prefix,
        sweep_interval,
    })
}

fn build_simulate_settings(simulate: RawSimulateSettings) -> Result<SimulateSettings, LoadError> {
    let items = non_zero_u32(
        simulate.items.unwrap_or(DEFAULT_SIMULATE_ITEMS),
        "simulate.items",
    )?;

    let poll_interval_ms = simulate
        .poll_interval_ms
        .unwrap_or(DEFAULT_SIMULATE_POLL_INTERVAL_MS);
    if poll_interval_ms == 0 {
        return Err(LoadError::invalid(
            "simulate.poll_interval_ms",
            "must be greater than zero",
        ));
    }

    let timeout = ttl(
        simulate
            .timeout_seconds
            .unwrap_or(DEFAULT_SIMULATE_TIMEOUT_SECS),
        "simulate.timeout_seconds",
    )?
    .as_duration();

    Ok(SimulateSettings {
        items,
        step_delay: Duration::from_millis(
            simulate
                .step_delay_ms
                .unwrap_or(DEFAULT_SIMULATE_STEP_DELAY_MS),
        ),
        poll_interval: Duration::from_millis(poll_interval_ms),
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
struct RawCacheSettings {
    enabled: Option<bool>,
    default_ttl_seconds: Option<u64>,
    progress_ttl_seconds: Option<u64>,
    version_key_prefix: Option<String>,
    sweep_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSimulateSettings {
    items: Option<u64>,
    step_delay_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    timeout_seconds: Option<u64>,
}

fn ttl(seconds: u64, key: &'static str) -> Result<Ttl, LoadError> {
    Ttl::from_secs(seconds).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
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
