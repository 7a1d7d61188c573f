//! Post listing records served through the read-through cache.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Summary row shown on listing pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSummary {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    pub theme: String,
    pub tags: Vec<String>,
}

/// One page of a post listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostListPage {
    pub items: Vec<PostSummary>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

impl PostListPage {
    pub fn has_more(&self) -> bool {
        u64::from(self.offset) + (self.items.len() as u64) < self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_more_compares_window_to_total() {
        let page = PostListPage {
            items: Vec::new(),
            total: 5,
            limit: 10,
            offset: 0,
        };
        assert!(page.has_more());

        let last = PostListPage {
            items: vec![PostSummary {
                id: Uuid::nil(),
                slug: "a".to_string(),
                title: "A".to_string(),
                excerpt: String::new(),
                theme: "default".to_string(),
                tags: Vec::new(),
            }],
            total: 1,
            limit: 10,
            offset: 0,
        };
        assert!(!last.has_more());
    }
}
