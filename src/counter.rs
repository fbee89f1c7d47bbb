//! View and like counting for anonymous visitors
//!
//! Every operation takes the raw requester address, turns it into a
//! [`VisitorId`] and hands the per-visitor work to [`Storage`], which owns
//! the transactional guarantees.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

use crate::cursor::{CursorData, CursorSigner};
use crate::identity::{IdentityHasher, VisitorId};
use crate::models::{is_valid_slug, LikeOutcome, Post, PostStats, ViewOutcome};
use crate::storage::{Storage, StorageError};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("invalid slug")]
    InvalidSlug,
    #[error("delta must be 1 or -1")]
    InvalidDelta,
    #[error("invalid cursor")]
    InvalidCursor,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type CounterResult<T> = Result<T, CounterError>;

/// One page of posts plus the cursor for the next page
#[derive(Debug, Clone)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub next_cursor: Option<String>,
}

pub struct CounterService {
    storage: Arc<dyn Storage>,
    identities: Arc<IdentityHasher>,
    cursors: Arc<CursorSigner>,
    max_likes_per_visitor: i64,
}

impl CounterService {
    pub fn new(
        storage: Arc<dyn Storage>,
        identities: Arc<IdentityHasher>,
        cursors: Arc<CursorSigner>,
        max_likes_per_visitor: i64,
    ) -> Self {
        Self {
            storage,
            identities,
            cursors,
            max_likes_per_visitor: max_likes_per_visitor.max(1),
        }
    }

    pub fn max_likes_per_visitor(&self) -> i64 {
        self.max_likes_per_visitor
    }

    pub fn visitor_id(&self, address: &str) -> VisitorId {
        self.identities.derive(address)
    }

    /// Count a view of `slug` at most once per visitor and return the current total
    pub async fn record_view(&self, slug: &str, address: &str) -> CounterResult<ViewOutcome> {
        validate_slug(slug)?;
        let visitor = self.visitor_id(address);

        let outcome = self
            .storage
            .record_view(slug, &visitor)
            .await
            .inspect_err(|e| error!(slug, error = %e, "failed to record view"))?;

        debug!(
            slug,
            visitor = %visitor,
            counted = outcome.counted,
            views = outcome.views,
            "view recorded"
        );

        Ok(outcome)
    }

    /// Apply a like (`1`) or unlike (`-1`) from the requester
    pub async fn apply_like(
        &self,
        slug: &str,
        address: &str,
        delta: i64,
    ) -> CounterResult<LikeOutcome> {
        validate_slug(slug)?;
        if delta != 1 && delta != -1 {
            return Err(CounterError::InvalidDelta);
        }
        let visitor = self.visitor_id(address);

        let outcome = self
            .storage
            .apply_like(slug, &visitor, delta, self.max_likes_per_visitor)
            .await
            .inspect_err(|e| error!(slug, error = %e, "failed to apply like"))?;

        debug!(
            slug,
            visitor = %visitor,
            requested = delta,
            applied = outcome.applied,
            likes = outcome.likes,
            "like applied"
        );

        Ok(outcome)
    }

    pub async fn post_stats(&self, slug: &str, address: &str) -> CounterResult<PostStats> {
        validate_slug(slug)?;
        let visitor = self.visitor_id(address);

        let stats = self
            .storage
            .post_stats(slug, &visitor)
            .await
            .inspect_err(|e| error!(slug, error = %e, "failed to load post stats"))?;

        Ok(stats)
    }

    /// List posts newest first. `limit` is clamped to `1..=MAX_PAGE_SIZE`.
    pub async fn list_posts(
        &self,
        limit: Option<i64>,
        cursor: Option<&str>,
    ) -> CounterResult<PostPage> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

        let after = match cursor.filter(|c| !c.is_empty()) {
            Some(c) => Some(
                self.cursors
                    .verify(c)
                    .map_err(|_| CounterError::InvalidCursor)?,
            ),
            None => None,
        };

        // Fetch one extra row to learn whether another page exists
        let mut posts = self
            .storage
            .list_posts(limit + 1, after.as_ref())
            .await
            .inspect_err(|e| error!(error = %e, "failed to list posts"))?;

        let next_cursor = if posts.len() as i64 > limit {
            posts.truncate(limit as usize);
            posts
                .last()
                .map(|last| {
                    self.cursors.create(&CursorData {
                        created_at: last.created_at,
                        id: last.id,
                    })
                })
                .transpose()
                .map_err(StorageError::Other)?
        } else {
            None
        };

        Ok(PostPage { posts, next_cursor })
    }
}

fn validate_slug(slug: &str) -> CounterResult<()> {
    if is_valid_slug(slug) {
        Ok(())
    } else {
        Err(CounterError::InvalidSlug)
    }
}
