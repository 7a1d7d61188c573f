//! Read-through cache service.
//!
//! Storage failures degrade to misses and dropped writes; only explicit
//! [`CacheService::set`] calls and the caller's own compute errors surface.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::backend::{BackendError, CacheBackend, Ttl};
use super::background::BackgroundTasks;
use super::codec::{Codec, EncodeError};
use super::config::CacheConfig;
use super::key::CacheKey;
use super::version::VersionManager;

const METRIC_CACHE_HIT: &str = "quire_cache_hit_total";
const METRIC_CACHE_MISS: &str = "quire_cache_miss_total";
const METRIC_CACHE_DECODE_FAILURE: &str = "quire_cache_decode_failure_total";
const METRIC_CACHE_WRITE_FAILURE: &str = "quire_cache_write_failure_total";
const METRIC_CACHE_COMPUTE_MS: &str = "quire_cache_compute_ms";

/// Errors surfaced by explicit cache writes.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub struct CacheService {
    config: CacheConfig,
    backend: Arc<dyn CacheBackend>,
    versions: VersionManager,
    background: Arc<BackgroundTasks>,
}

impl CacheService {
    pub fn new(
        config: CacheConfig,
        backend: Arc<dyn CacheBackend>,
        background: Arc<BackgroundTasks>,
    ) -> Self {
        let versions = VersionManager::new(backend.clone(), config.version_key_prefix.clone());
        Self {
            config,
            backend,
            versions,
            background,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn background(&self) -> &Arc<BackgroundTasks> {
        &self.background
    }

    /// Return the cached value for `key`, or run `compute` and cache its result.
    ///
    /// The fresh value is returned as soon as `compute` resolves; the write-back
    /// runs on the background executor. `Ok(None)` from `compute` is returned
    /// as-is and not stored. Errors from `compute` propagate unchanged.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn get_or_compute<T, C, F, Fut, E>(
        &self,
        key: &CacheKey,
        codec: &C,
        compute: F,
        ttl: Ttl,
    ) -> Result<Option<T>, E>
    where
        C: Codec<T> + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let serialized = key.serialize();

        if self.config.enabled {
            if let Some(hit) = self.lookup(&serialized, codec).await {
                return Ok(Some(hit));
            }
        }

        let started_at = Instant::now();
        let fresh = compute().await?;
        histogram!(METRIC_CACHE_COMPUTE_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        if let Some(value) = fresh.as_ref() {
            if self.config.enabled {
                self.store_in_background(serialized, value, codec, ttl);
            }
        }

        Ok(fresh)
    }

    /// Like [`get_or_compute`](Self::get_or_compute) for computations that
    /// always produce a value.
    pub async fn get_or_compute_value<T, C, F, Fut, E>(
        &self,
        key: &CacheKey,
        codec: &C,
        compute: F,
        ttl: Ttl,
    ) -> Result<T, E>
    where
        C: Codec<T> + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let serialized = key.serialize();

        if self.config.enabled {
            if let Some(hit) = self.lookup(&serialized, codec).await {
                return Ok(hit);
            }
        }

        let started_at = Instant::now();
        let value = compute().await?;
        histogram!(METRIC_CACHE_COMPUTE_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        if self.config.enabled {
            self.store_in_background(serialized, &value, codec, ttl);
        }

        Ok(value)
    }

    /// Encode and write `value` now. Failures are returned to the caller.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn set<T, C>(
        &self,
        key: &CacheKey,
        value: &T,
        codec: &C,
        ttl: Ttl,
    ) -> Result<(), CacheError>
    where
        C: Codec<T> + ?Sized,
    {
        let encoded = codec.encode(value)?;
        self.backend
            .put(&key.serialize(), encoded, Some(ttl))
            .await?;
        Ok(())
    }

    /// Stored text for `key`; read failures read as absent.
    pub async fn get_raw(&self, key: &CacheKey) -> Option<String> {
        let serialized = key.serialize();
        match self.backend.get(&serialized).await {
            Ok(found) => found,
            Err(err) => {
                warn!(key = %serialized, error = %err, "cache read failed");
                None
            }
        }
    }

    /// Stored value for `key` decoded with `codec`; missing or invalid data reads as absent.
    pub async fn get_decoded<T, C>(&self, key: &CacheKey, codec: &C) -> Option<T>
    where
        C: Codec<T> + ?Sized,
    {
        let raw = self.get_raw(key).await?;
        match codec.decode(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                counter!(METRIC_CACHE_DECODE_FAILURE).increment(1);
                debug!(key = %key, error = %err, "stored value failed to decode");
                None
            }
        }
    }

    /// Delete every key concurrently. Individual failures are logged and ignored.
    #[instrument(skip_all, fields(count = keys.len()))]
    pub async fn delete_keys(&self, keys: &[CacheKey]) {
        let deletes = keys.iter().map(|key| {
            let serialized = key.serialize();
            async move {
                if let Err(err) = self.backend.delete(&serialized).await {
                    warn!(key = %serialized, error = %err, "cache delete failed");
                }
            }
        });
        join_all(deletes).await;
    }

    /// Current version string of `namespace`, e.g. `"v3"`.
    pub async fn get_cache_version(&self, namespace: &str) -> String {
        self.versions.get_version(namespace).await
    }

    /// Orphan every key built with the current version of `namespace`.
    pub async fn bump_cache_version(&self, namespace: &str) {
        self.versions.bump_version(namespace).await
    }

    /// Wait for all pending background writes.
    pub async fn drain_background(&self) {
        self.background.drain().await
    }

    async fn lookup<T, C>(&self, serialized: &str, codec: &C) -> Option<T>
    where
        C: Codec<T> + ?Sized,
    {
        let raw = match self.backend.get(serialized).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                counter!(METRIC_CACHE_MISS, "reason" => "absent").increment(1);
                debug!(outcome = "miss", "cache miss");
                return None;
            }
            Err(err) => {
                counter!(METRIC_CACHE_MISS, "reason" => "backend_error").increment(1);
                warn!(error = %err, "cache read failed, computing directly");
                return None;
            }
        };

        match codec.decode(&raw) {
            Ok(value) => {
                counter!(METRIC_CACHE_HIT).increment(1);
                debug!(outcome = "hit", "cache hit");
                Some(value)
            }
            Err(err) => {
                counter!(METRIC_CACHE_DECODE_FAILURE).increment(1);
                counter!(METRIC_CACHE_MISS, "reason" => "decode_error").increment(1);
                debug!(error = %err, "cached value failed to decode, recomputing");
                None
            }
        }
    }

    fn store_in_background<T, C>(&self, serialized: String, value: &T, codec: &C, ttl: Ttl)
    where
        C: Codec<T> + ?Sized,
    {
        let encoded = match codec.encode(value) {
            Ok(encoded) => encoded,
            Err(err) => {
                counter!(METRIC_CACHE_WRITE_FAILURE, "stage" => "encode").increment(1);
                warn!(key = %serialized, error = %err, "failed to encode value for caching");
                return;
            }
        };

        let backend = self.backend.clone();
        self.background.spawn(async move {
            if let Err(err) = backend.put(&serialized, encoded, Some(ttl)).await {
                counter!(METRIC_CACHE_WRITE_FAILURE, "stage" => "put").increment(1);
                warn!(key = %serialized, error = %err, "background cache write failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cache::backend::MemoryBackend;
    use crate::cache::codec::{JsonCodec, TextCodec};
    use crate::cache_key;

    fn service_with(backend: Arc<MemoryBackend>, config: CacheConfig) -> CacheService {
        CacheService::new(config, backend, Arc::new(BackgroundTasks::new()))
    }

    fn minute() -> Ttl {
        Ttl::from_secs(60).expect("non-zero ttl")
    }

    #[tokio::test]
    async fn none_results_are_not_stored() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = service_with(backend.clone(), CacheConfig::default());
        let key = cache_key!["posts", "by-slug", "missing"];

        let value: Option<String> = cache
            .get_or_compute(&key, &TextCodec, || async { Ok::<_, ()>(None) }, minute())
            .await
            .expect("compute succeeds");
        cache.drain_background().await;

        assert!(value.is_none());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn disabled_cache_always_computes() {
        let backend = Arc::new(MemoryBackend::new());
        let config = CacheConfig {
            enabled: false,
            ..Default::default()
        };
        let cache = service_with(backend.clone(), config);
        let key = cache_key!["stats", "dashboard"];
        let calls = &AtomicUsize::new(0);

        for _ in 0..2 {
            let value = cache
                .get_or_compute_value(
                    &key,
                    &JsonCodec::<u32>::new(),
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, ()>(42)
                    },
                    minute(),
                )
                .await
                .expect("compute succeeds");
            cache.drain_background().await;
            assert_eq!(value, 42);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn set_then_get_decoded() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = service_with(backend, CacheConfig::default());
        let key = cache_key!["search", "submitted", 7];
        let codec = JsonCodec::<Vec<String>>::new();

        cache
            .set(&key, &vec!["/posts/a".to_string()], &codec, minute())
            .await
            .expect("explicit write");

        let stored = cache.get_decoded(&key, &codec).await;
        assert_eq!(stored, Some(vec!["/posts/a".to_string()]));
        assert_eq!(
            cache.get_raw(&key).await.as_deref(),
            Some(r#"["/posts/a"]"#)
        );
    }

    #[tokio::test]
    async fn get_decoded_treats_invalid_payload_as_absent() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = service_with(backend.clone(), CacheConfig::default());
        let key = cache_key!["progress", "task"];

        backend
            .put(&key.serialize(), "{not json".to_string(), None)
            .await
            .expect("prime");

        let decoded: Option<u32> = cache.get_decoded(&key, &JsonCodec::new()).await;
        assert!(decoded.is_none());
    }

    #[tokio::test]
    async fn versioned_keys_follow_namespace() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = service_with(backend, CacheConfig::default());

        assert_eq!(cache.get_cache_version("posts:list").await, "v1");
        cache.bump_cache_version("posts:list").await;
        cache.bump_cache_version("posts:list").await;
        assert_eq!(cache.get_cache_version("posts:list").await, "v3");
        assert_eq!(cache.get_cache_version("tags").await, "v1");
    }
}
