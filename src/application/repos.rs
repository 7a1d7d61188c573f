//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::posts::{PostListPage, PostSummary};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

impl RepoError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PostQueryFilter {
    pub tag: Option<String>,
    pub theme: Option<String>,
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn list_posts(
        &self,
        filter: &PostQueryFilter,
        limit: u32,
        offset: u32,
    ) -> Result<PostListPage, RepoError>;
}

#[async_trait]
pub trait PostsWriteRepo: Send + Sync {
    async fn upsert_post(&self, post: PostSummary) -> Result<(), RepoError>;

    /// Returns whether a post was removed.
    async fn delete_post(&self, id: Uuid) -> Result<bool, RepoError>;
}
