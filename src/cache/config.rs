//! Cache configuration.
//!
//! Resolved from the `[cache]` table of `quire.toml`.

use serde::Deserialize;

use super::backend::Ttl;

const DEFAULT_TTL_SECONDS: u64 = 300;
const DEFAULT_PROGRESS_TTL_SECONDS: u64 = Ttl::DAY.as_secs();
const DEFAULT_VERSION_KEY_PREFIX: &str = "ver:";

/// Cache configuration from `quire.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false, every read computes and nothing is written back.
    pub enabled: bool,
    /// TTL applied by callers that do not pick their own.
    pub default_ttl_seconds: u64,
    /// TTL of task progress records. Defaults to 86400 (one day), the
    /// retention pollers are promised; lowering it hides finished tasks sooner.
    pub progress_ttl_seconds: u64,
    /// Prefix of namespace generation counters.
    pub version_key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_seconds: DEFAULT_TTL_SECONDS,
            progress_ttl_seconds: DEFAULT_PROGRESS_TTL_SECONDS,
            version_key_prefix: DEFAULT_VERSION_KEY_PREFIX.to_string(),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            default_ttl_seconds: settings.default_ttl.as_secs(),
            progress_ttl_seconds: settings.progress_ttl.as_secs(),
            version_key_prefix: settings.version_key_prefix.clone(),
        }
    }
}

impl CacheConfig {
    /// Default TTL, clamped to one second if configured as zero.
    pub fn default_ttl(&self) -> Ttl {
        Ttl::from_secs(self.default_ttl_seconds.max(1)).unwrap_or(Ttl::DAY)
    }

    /// Progress TTL, one day unless overridden; zero also falls back to one day.
    pub fn progress_ttl(&self) -> Ttl {
        Ttl::from_secs(self.progress_ttl_seconds).unwrap_or(Ttl::DAY)
    }
}
