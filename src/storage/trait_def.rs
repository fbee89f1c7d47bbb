use crate::cursor::CursorData;
use crate::identity::VisitorId;
use crate::models::{LikeOutcome, Post, PostStats, ViewOutcome};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Stored counters next to the records they are derived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostAudit {
    pub slug: String,
    pub views: i64,
    pub view_records: i64,
    pub likes: i64,
    pub like_records_total: i64,
}

impl PostAudit {
    pub fn is_consistent(&self) -> bool {
        self.views == self.view_records && self.likes == self.like_records_total
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables, indexes)
    async fn init(&self) -> Result<()>;

    /// Record a view of `slug` by `visitor`.
    ///
    /// The view counter moves only when this call creates the view record;
    /// a record that already exists is the normal no-op path.
    async fn record_view(&self, slug: &str, visitor: &VisitorId) -> StorageResult<ViewOutcome>;

    /// Apply a like delta for `visitor` on `slug`.
    ///
    /// The per-visitor count never goes below zero and a like never takes it
    /// past `max_per_visitor`. A count stored under a higher earlier bound is
    /// left in place until unlikes bring it down.
    async fn apply_like(
        &self,
        slug: &str,
        visitor: &VisitorId,
        delta: i64,
        max_per_visitor: i64,
    ) -> StorageResult<LikeOutcome>;

    /// Get a post by slug
    async fn get_post(&self, slug: &str) -> StorageResult<Option<Post>>;

    /// Counters for `slug` plus what `visitor` has contributed to them
    async fn post_stats(&self, slug: &str, visitor: &VisitorId) -> StorageResult<PostStats>;

    /// List posts newest first, starting strictly after `after`
    async fn list_posts(&self, limit: i64, after: Option<&CursorData>)
        -> StorageResult<Vec<Post>>;

    /// Compare the stored counters of `slug` against its view and like records
    async fn audit_post(&self, slug: &str) -> StorageResult<Option<PostAudit>>;
}
