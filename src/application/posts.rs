//! Cached post listings.
//!
//! Listing keys embed the `posts:list` namespace version, so every write
//! invalidates all cached pages with a single version bump.

use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::application::repos::{PostQueryFilter, PostsRepo, PostsWriteRepo, RepoError};
use crate::cache::{CacheKey, CacheService, JsonCodec, Ttl};
use crate::cache_key;
use crate::domain::posts::{PostListPage, PostSummary};

pub const POSTS_LIST_NAMESPACE: &str = "posts:list";

static LIST_CODEC: JsonCodec<PostListPage> = JsonCodec::new();

pub struct PostListService {
    cache: Arc<CacheService>,
    reader: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    ttl: Ttl,
}

impl PostListService {
    pub fn new(
        cache: Arc<CacheService>,
        reader: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
    ) -> Self {
        let ttl = cache.config().default_ttl();
        Self {
            cache,
            reader,
            writer,
            ttl,
        }
    }

    /// Key of one listing page under namespace version `version`.
    pub fn list_key(version: &str, filter: &PostQueryFilter, limit: u32, offset: u32) -> CacheKey {
        let tag = match filter.tag.as_deref() {
            Some(tag) => format!("tag={tag}"),
            None => "all".to_string(),
        };
        let theme = match filter.theme.as_deref() {
            Some(theme) => format!("theme={theme}"),
            None => "any".to_string(),
        };
        cache_key!["posts", "list", version, tag, theme, limit, offset]
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: &PostQueryFilter,
        limit: u32,
        offset: u32,
    ) -> Result<PostListPage, RepoError> {
        if limit == 0 {
            return Err(RepoError::invalid_input("limit must be greater than zero"));
        }

        let version = self.cache.get_cache_version(POSTS_LIST_NAMESPACE).await;
        let key = Self::list_key(&version, filter, limit, offset);
        let reader = &self.reader;

        self.cache
            .get_or_compute_value(
                &key,
                &LIST_CODEC,
                || reader.list_posts(filter, limit, offset),
                self.ttl,
            )
            .await
    }

    /// Create or update a post and invalidate every cached listing.
    #[instrument(skip(self, post), fields(slug = %post.slug))]
    pub async fn publish(&self, post: PostSummary) -> Result<(), RepoError> {
        self.writer.upsert_post(post).await?;
        self.cache.bump_cache_version(POSTS_LIST_NAMESPACE).await;
        info!("post published, listings invalidated");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, id: Uuid) -> Result<bool, RepoError> {
        let removed = self.writer.delete_post(id).await?;
        if removed {
            self.cache.bump_cache_version(POSTS_LIST_NAMESPACE).await;
            info!("post removed, listings invalidated");
        }
        Ok(removed)
    }
}
