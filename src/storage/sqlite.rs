use crate::cursor::CursorData;
use crate::identity::VisitorId;
use crate::models::{next_like_count, LikeOutcome, Post, PostStats, ViewOutcome};
use crate::storage::{unix_now, PostAudit, Storage, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        let mut options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let mut pool_options = SqlitePoolOptions::new();
        if in_memory {
            // Each connection to an in-memory database sees its own database
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            options = options.journal_mode(SqliteJournalMode::Wal);
            pool_options = pool_options.max_connections(max_connections);
        }

        let pool = pool_options.connect_with(options).await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Create the post row if this is the first interaction with `slug`.
    ///
    /// Run as the first statement of every write transaction so the database
    /// write lock is held before anything is read.
    async fn ensure_post(
        tx: &mut Transaction<'_, Sqlite>,
        slug: &str,
        now: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO posts (slug, views, likes, created_at)
            VALUES (?, 0, 0, ?)
            ON CONFLICT(slug) DO NOTHING
            "#,
        )
        .bind(slug)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug TEXT NOT NULL UNIQUE,
                views INTEGER NOT NULL DEFAULT 0 CHECK (views >= 0),
                likes INTEGER NOT NULL DEFAULT 0 CHECK (likes >= 0),
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_posts_created ON posts(created_at DESC, id DESC)",
        )
        .execute(self.pool.as_ref())
        .await?;

        // The primary key is what makes a view count at most once
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS post_views (
                visitor_id TEXT NOT NULL,
                slug TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (visitor_id, slug)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_post_views_slug ON post_views(slug)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS post_likes (
                visitor_id TEXT NOT NULL,
                slug TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0 CHECK (count >= 0),
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (visitor_id, slug)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_post_likes_slug ON post_likes(slug)")
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn record_view(&self, slug: &str, visitor: &VisitorId) -> StorageResult<ViewOutcome> {
        let now = unix_now();
        let mut tx = self.pool.begin().await?;

        Self::ensure_post(&mut tx, slug, now).await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO post_views (visitor_id, slug, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(visitor_id, slug) DO NOTHING
            "#,
        )
        .bind(visitor.as_str())
        .bind(slug)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if inserted {
            sqlx::query("UPDATE posts SET views = views + 1 WHERE slug = ?")
                .bind(slug)
                .execute(&mut *tx)
                .await?;
        }

        let views = sqlx::query_scalar::<_, i64>("SELECT views FROM posts WHERE slug = ?")
            .bind(slug)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(ViewOutcome {
            slug: slug.to_string(),
            views,
            counted: inserted,
        })
    }

    async fn apply_like(
        &self,
        slug: &str,
        visitor: &VisitorId,
        delta: i64,
        max_per_visitor: i64,
    ) -> StorageResult<LikeOutcome> {
        let now = unix_now();
        let mut tx = self.pool.begin().await?;

        Self::ensure_post(&mut tx, slug, now).await?;

        sqlx::query(
            r#"
            INSERT INTO post_likes (visitor_id, slug, count, updated_at)
            VALUES (?, ?, 0, ?)
            ON CONFLICT(visitor_id, slug) DO NOTHING
            "#,
        )
        .bind(visitor.as_str())
        .bind(slug)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let current = sqlx::query_scalar::<_, i64>(
            "SELECT count FROM post_likes WHERE visitor_id = ? AND slug = ?",
        )
        .bind(visitor.as_str())
        .bind(slug)
        .fetch_one(&mut *tx)
        .await?;

        let next = next_like_count(current, delta, max_per_visitor);
        let applied = next - current;

        if applied != 0 {
            sqlx::query(
                r#"
                UPDATE post_likes
                SET count = ?, updated_at = ?
                WHERE visitor_id = ? AND slug = ?
                "#,
            )
            .bind(next)
            .bind(now)
            .bind(visitor.as_str())
            .bind(slug)
            .execute(&mut *tx)
            .await?;

            sqlx::query("UPDATE posts SET likes = likes + ? WHERE slug = ?")
                .bind(applied)
                .bind(slug)
                .execute(&mut *tx)
                .await?;
        }

        let likes = sqlx::query_scalar::<_, i64>("SELECT likes FROM posts WHERE slug = ?")
            .bind(slug)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(LikeOutcome {
            slug: slug.to_string(),
            likes,
            visitor_likes: next,
            applied,
        })
    }

    async fn get_post(&self, slug: &str) -> StorageResult<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, slug, views, likes, created_at
            FROM posts
            WHERE slug = ?
            "#,
        )
        .bind(slug)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(post)
    }

    async fn post_stats(&self, slug: &str, visitor: &VisitorId) -> StorageResult<PostStats> {
        let counters =
            sqlx::query_as::<_, (i64, i64)>("SELECT views, likes FROM posts WHERE slug = ?")
                .bind(slug)
                .fetch_optional(self.pool.as_ref())
                .await?;

        let viewed = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM post_views WHERE visitor_id = ? AND slug = ?",
        )
        .bind(visitor.as_str())
        .bind(slug)
        .fetch_one(self.pool.as_ref())
        .await?
            > 0;

        let visitor_likes = sqlx::query_scalar::<_, i64>(
            "SELECT count FROM post_likes WHERE visitor_id = ? AND slug = ?",
        )
        .bind(visitor.as_str())
        .bind(slug)
        .fetch_optional(self.pool.as_ref())
        .await?
        .unwrap_or(0);

        let (views, likes) = counters.unwrap_or((0, 0));

        Ok(PostStats {
            slug: slug.to_string(),
            views,
            likes,
            visitor_likes,
            viewed,
        })
    }

    async fn list_posts(
        &self,
        limit: i64,
        after: Option<&CursorData>,
    ) -> StorageResult<Vec<Post>> {
        let posts = if let Some(cursor) = after {
            sqlx::query_as::<_, Post>(
                r#"
                SELECT id, slug, views, likes, created_at
                FROM posts
                WHERE created_at < ? OR (created_at = ? AND id < ?)
                ORDER BY created_at DESC, id DESC
                LIMIT ?
                "#,
            )
            .bind(cursor.created_at)
            .bind(cursor.created_at)
            .bind(cursor.id)
            .bind(limit)
            .fetch_all(self.pool.as_ref())
            .await?
        } else {
            sqlx::query_as::<_, Post>(
                r#"
                SELECT id, slug, views, likes, created_at
                FROM posts
                ORDER BY created_at DESC, id DESC
                LIMIT ?
                "#,
            )
            .bind(limit)
            .fetch_all(self.pool.as_ref())
            .await?
        };

        Ok(posts)
    }

    async fn audit_post(&self, slug: &str) -> StorageResult<Option<PostAudit>> {
        let audit = sqlx::query_as::<_, (i64, i64, i64, i64)>(
            r#"
            SELECT
                p.views,
                (SELECT COUNT(*) FROM post_views v WHERE v.slug = p.slug),
                p.likes,
                (SELECT COALESCE(SUM(l.count), 0) FROM post_likes l WHERE l.slug = p.slug)
            FROM posts p
            WHERE p.slug = ?
            "#,
        )
        .bind(slug)
        .fetch_optional(self.pool.as_ref())
        .await?
        .map(|(views, view_records, likes, like_records_total)| PostAudit {
            slug: slug.to_string(),
            views,
            view_records,
            likes,
            like_records_total,
        });

        Ok(audit)
    }
}
