//! Key-value capability consumed by the cache.
//!
//! [`CacheBackend`] is the seam between the cache policy and whatever store is
//! deployed. [`MemoryBackend`] is the in-process implementation.

use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Entry lifetime in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ttl(NonZeroU64);

impl Ttl {
    /// Fixed lifetime of task progress records.
    pub const DAY: Ttl = match Ttl::from_secs(24 * 60 * 60) {
        Some(ttl) => ttl,
        None => panic!("one day is a non-zero duration"),
    };

    /// Returns `None` for zero seconds.
    pub const fn from_secs(seconds: u64) -> Option<Self> {
        match NonZeroU64::new(seconds) {
            Some(value) => Some(Self(value)),
            None => None,
        }
    }

    pub const fn as_secs(self) -> u64 {
        self.0.get()
    }

    pub const fn as_duration(self) -> Duration {
        Duration::from_secs(self.0.get())
    }
}

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache backend operation timed out")]
    Timeout,
    #[error("stored value under `{key}` is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
}

impl BackendError {
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable(message.to_string())
    }

    pub fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// String-keyed store with per-entry TTL. No transactions are assumed.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Store `value`; `None` keeps the entry until it is deleted or overwritten.
    async fn put(&self, key: &str, value: String, ttl: Option<Ttl>) -> Result<(), BackendError>;

    async fn delete(&self, key: &str) -> Result<(), BackendError>;

    /// Atomically increment a decimal counter, treating absent or unparseable
    /// values as `baseline`. Returns `Ok(None)` when the backend has no such
    /// primitive.
    async fn increment(&self, _key: &str, _baseline: u64) -> Result<Option<u64>, BackendError> {
        Ok(None)
    }
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| now < deadline)
    }
}

/// In-process backend on a concurrent map. Expired entries are dropped lazily
/// on access and by the optional sweeper.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, StoredValue>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including ones that expired but were not yet touched.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a live entry exists for the serialized `key`.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .get(key)
            .is_some_and(|stored| stored.is_live(now))
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, stored| stored.is_live(now));
        before - self.entries.len()
    }

    /// Purge expired entries every `period` until the backend is dropped.
    /// Periods below one millisecond are raised to one millisecond.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let backend = Arc::downgrade(self);
        let period = period.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(backend) = backend.upgrade() else {
                    return;
                };
                let purged = backend.purge_expired();
                if purged > 0 {
                    debug!(purged, remaining = backend.len(), "expired cache entries swept");
                }
            }
        })
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let now = Instant::now();
        if let Some(stored) = self.entries.get(key) {
            if stored.is_live(now) {
                return Ok(Some(stored.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, stored| !stored.is_live(now));
        Ok(None)
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Ttl>) -> Result<(), BackendError> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl.as_duration());
        self.entries
            .insert(key.to_string(), StoredValue { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str, baseline: u64) -> Result<Option<u64>, BackendError> {
        let now = Instant::now();
        let next = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let stored = occupied.get_mut();
                let current = if stored.is_live(now) {
                    stored.value.trim().parse::<u64>().unwrap_or(baseline)
                } else {
                    stored.expires_at = None;
                    baseline
                };
                let next = current.saturating_add(1);
                stored.value = next.to_string();
                next
            }
            Entry::Vacant(vacant) => {
                let next = baseline.saturating_add(1);
                vacant.insert(StoredValue {
                    value: next.to_string(),
                    expires_at: None,
                });
                next
            }
        };
        Ok(Some(next))
    }
}
