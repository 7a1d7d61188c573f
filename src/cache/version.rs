//! Namespace generation counters.
//!
//! Callers weave the version string into their keys, e.g.
//! `["posts", "list", version, ...]`. Bumping the counter makes every later
//! lookup build new keys; old entries are orphaned and expire on their own TTL.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use super::backend::CacheBackend;

const DEFAULT_GENERATION: u64 = 1;
const METRIC_VERSION_BUMP: &str = "quire_cache_version_bump_total";

pub struct VersionManager {
    backend: Arc<dyn CacheBackend>,
    prefix: String,
}

impl VersionManager {
    pub fn new(backend: Arc<dyn CacheBackend>, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
        }
    }

    fn counter_key(&self, namespace: &str) -> String {
        format!("{}{}", self.prefix, namespace)
    }

    /// Current version string (`"v<n>"`), `"v1"` when absent or unreadable.
    pub async fn get_version(&self, namespace: &str) -> String {
        format!("v{}", self.current_generation(namespace).await)
    }

    async fn current_generation(&self, namespace: &str) -> u64 {
        let key = self.counter_key(namespace);
        match self.backend.get(&key).await {
            Ok(Some(raw)) => match raw.trim().parse::<u64>() {
                Ok(generation) => generation,
                Err(err) => {
                    warn!(namespace, raw = %raw, error = %err, "corrupt cache version, using default");
                    DEFAULT_GENERATION
                }
            },
            Ok(None) => DEFAULT_GENERATION,
            Err(err) => {
                warn!(namespace, error = %err, "cache version read failed, using default");
                DEFAULT_GENERATION
            }
        }
    }

    /// Advance the namespace generation. Best-effort: failures are logged.
    pub async fn bump_version(&self, namespace: &str) {
        let key = self.counter_key(namespace);

        match self.backend.increment(&key, DEFAULT_GENERATION).await {
            Ok(Some(next)) => {
                counter!(METRIC_VERSION_BUMP, "mode" => "atomic").increment(1);
                debug!(namespace, version = next, "cache version bumped");
                return;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(namespace, error = %err, "cache version increment failed");
                return;
            }
        }

        // Read-then-write: concurrent bumps from the same value may lose an increment.
        let current = match self.backend.get(&key).await {
            Ok(Some(raw)) => raw.trim().parse::<u64>().unwrap_or(DEFAULT_GENERATION),
            Ok(None) => DEFAULT_GENERATION,
            Err(err) => {
                warn!(namespace, error = %err, "cache version read failed during bump");
                return;
            }
        };
        let next = current.saturating_add(1);

        match self.backend.put(&key, next.to_string(), None).await {
            Ok(()) => {
                counter!(METRIC_VERSION_BUMP, "mode" => "read_write").increment(1);
                debug!(namespace, version = next, "cache version bumped");
            }
            Err(err) => warn!(namespace, error = %err, "cache version write failed"),
        }
    }
}
