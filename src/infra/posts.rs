//! In-process post repository used by the demo binary and tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::application::repos::{PostQueryFilter, PostsRepo, PostsWriteRepo, RepoError};
use crate::domain::posts::{PostListPage, PostSummary};

#[derive(Clone, Default)]
pub struct InMemoryPostsRepo {
    posts: Arc<RwLock<HashMap<Uuid, PostSummary>>>,
    list_calls: Arc<AtomicUsize>,
}

impl InMemoryPostsRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of listing queries served so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

fn matches_filter(post: &PostSummary, filter: &PostQueryFilter) -> bool {
    let tag_ok = filter
        .tag
        .as_ref()
        .is_none_or(|tag| post.tags.iter().any(|candidate| candidate == tag));
    let theme_ok = filter
        .theme
        .as_ref()
        .is_none_or(|theme| &post.theme == theme);
    tag_ok && theme_ok
}

#[async_trait]
impl PostsRepo for InMemoryPostsRepo {
    async fn list_posts(
        &self,
        filter: &PostQueryFilter,
        limit: u32,
        offset: u32,
    ) -> Result<PostListPage, RepoError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let guard = self.posts.read().await;
        let mut matching: Vec<&PostSummary> = guard
            .values()
            .filter(|post| matches_filter(post, filter))
            .collect();
        matching.sort_by(|a, b| a.slug.cmp(&b.slug));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();

        Ok(PostListPage {
            items,
            total,
            limit,
            offset,
        })
    }
}

#[async_trait]
impl PostsWriteRepo for InMemoryPostsRepo {
    async fn upsert_post(&self, post: PostSummary) -> Result<(), RepoError> {
        if post.slug.trim().is_empty() {
            return Err(RepoError::invalid_input("slug must not be empty"));
        }
        self.posts.write().await.insert(post.id, post);
        Ok(())
    }

    async fn delete_post(&self, id: Uuid) -> Result<bool, RepoError> {
        Ok(self.posts.write().await.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(slug: &str, theme: &str, tags: &[&str]) -> PostSummary {
        PostSummary {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            title: slug.to_string(),
            excerpt: String::new(),
            theme: theme.to_string(),
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn list_filters_and_paginates() {
        let repo = InMemoryPostsRepo::new();
        repo.upsert_post(post("a", "paper", &["tabs"])).await.expect("seed");
        repo.upsert_post(post("b", "paper", &["gear"])).await.expect("seed");
        repo.upsert_post(post("c", "night", &["tabs"])).await.expect("seed");

        let tabs = repo
            .list_posts(
                &PostQueryFilter {
                    tag: Some("tabs".to_string()),
                    theme: None,
                },
                10,
                0,
            )
            .await
            .expect("list");
        assert_eq!(tabs.total, 2);

        let second_page = repo
            .list_posts(&PostQueryFilter::default(), 2, 2)
            .await
            .expect("list");
        assert_eq!(second_page.total, 3);
        assert_eq!(second_page.items.len(), 1);
        assert_eq!(second_page.items[0].slug, "c");
        assert_eq!(repo.list_calls(), 2);
    }

    #[tokio::test]
    async fn empty_slug_is_rejected() {
        let repo = InMemoryPostsRepo::new();
        let err = repo
            .upsert_post(post(" ", "paper", &[]))
            .await
            .expect_err("empty slug");
        assert!(matches!(err, RepoError::InvalidInput { .. }));
    }
}
