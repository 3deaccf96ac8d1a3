use chrono::{DateTime, Utc};
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;

use crate::models::{Paste, PasteStatus};

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS pastes (
    id VARCHAR(10) PRIMARY KEY,
    content TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    expires_at TIMESTAMPTZ,
    max_views INTEGER,
    view_count INTEGER NOT NULL DEFAULT 0,
    is_active BOOLEAN NOT NULL DEFAULT TRUE
)";

const COLUMNS: &str = "id, content, created_at, expires_at, max_views, view_count, is_active";

#[derive(Clone)]
pub struct Database {
    pool: AnyPool,
}

impl Database {
    /// Connect to a database by URL.
    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Create the paste table if it does not exist yet.
    pub async fn init_schema(&self) -> crate::ApiResult<()> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Run a trivial query to check the connection.
    pub async fn ping(&self) -> crate::ApiResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close every connection in the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Get a paste by id.
    pub async fn get_paste(&self, id: &str) -> crate::ApiResult<Option<Paste>> {
        let paste = sqlx::query_as::<_, Paste>(&format!(
            "SELECT {COLUMNS} FROM pastes WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(paste)
    }

    /// Get the status of every paste still marked active, without content.
    pub async fn get_active_statuses(&self) -> crate::ApiResult<Vec<PasteStatus>> {
        Ok(sqlx::query_as::<_, PasteStatus>(
            "SELECT id, expires_at, max_views, view_count, is_active FROM pastes WHERE \
             is_active = TRUE",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    /// Insert a fresh paste. Returns `None` if the id is already taken.
    pub async fn insert_paste(
        &self,
        id: &str,
        content: &str,
        created_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
        max_views: Option<i32>,
    ) -> crate::ApiResult<Option<Paste>> {
        let paste = sqlx::query_as::<_, Paste>(&format!(
            "INSERT INTO pastes (id, content, created_at, expires_at, max_views, view_count, \
             is_active) VALUES ($1, $2, $3, $4, $5, 0, TRUE) ON CONFLICT (id) DO NOTHING \
             RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(content)
        .bind(created_at)
        .bind(expires_at)
        .bind(max_views)
        .fetch_optional(&self.pool)
        .await?;
        Ok(paste)
    }

    /// Count one view of an active paste with quota left, deactivating it
    /// when the quota is reached.
    ///
    /// Runs as a single statement so concurrent readers can never push
    /// `view_count` past `max_views`. Returns the updated paste, or `None`
    /// if the paste was inactive or its quota was already used up.
    pub async fn record_view(&self, id: &str) -> crate::ApiResult<Option<Paste>> {
        let paste = sqlx::query_as::<_, Paste>(&format!(
            "UPDATE pastes SET view_count = view_count + 1, is_active = CASE WHEN max_views IS \
             NOT NULL AND view_count + 1 >= max_views THEN FALSE ELSE is_active END WHERE id = \
             $1 AND is_active = TRUE AND (max_views IS NULL OR view_count < max_views) \
             RETURNING {COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(paste)
    }

    /// Mark a paste inactive. Deactivating twice is a no-op.
    pub async fn deactivate(&self, id: &str) -> crate::ApiResult<()> {
        sqlx::query("UPDATE pastes SET is_active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) async fn memory() -> Database {
    let database = Database::connect("sqlite::memory:", 1).await.unwrap();
    database.init_schema().await.unwrap();
    database
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_and_get() {
        let db = memory().await;
        let now = Utc::now();

        let inserted = db
            .insert_paste("abc123", "hello", now, None, Some(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(inserted.view_count, 0);
        assert!(inserted.is_active);

        let fetched = db.get_paste("abc123").await.unwrap().unwrap();
        assert_eq!(fetched.content, "hello");
        assert_eq!(fetched.max_views, Some(2));
        assert_eq!(fetched.expires_at, None);

        assert!(db.get_paste("nope00").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn conflicting_id_is_not_inserted() {
        let db = memory().await;
        let now = Utc::now();

        db.insert_paste("dupe00", "first", now, None, None)
            .await
            .unwrap()
            .unwrap();
        let second = db
            .insert_paste("dupe00", "second", now, None, None)
            .await
            .unwrap();
        assert!(second.is_none());

        let kept = db.get_paste("dupe00").await.unwrap().unwrap();
        assert_eq!(kept.content, "first");
    }

    #[tokio::test]
    async fn record_view_stops_at_quota() {
        let db = memory().await;
        db.insert_paste("quota1", "x", Utc::now(), None, Some(2))
            .await
            .unwrap();

        let first = db.record_view("quota1").await.unwrap().unwrap();
        assert_eq!(first.view_count, 1);
        assert!(first.is_active);

        let second = db.record_view("quota1").await.unwrap().unwrap();
        assert_eq!(second.view_count, 2);
        assert!(!second.is_active);

        assert!(db.record_view("quota1").await.unwrap().is_none());
        let stored = db.get_paste("quota1").await.unwrap().unwrap();
        assert_eq!(stored.view_count, 2);
    }

    #[tokio::test]
    async fn record_view_without_quota_stays_active() {
        let db = memory().await;
        db.insert_paste("free01", "x", Utc::now(), None, None)
            .await
            .unwrap();

        for expected in 1..=5 {
            let paste = db.record_view("free01").await.unwrap().unwrap();
            assert_eq!(paste.view_count, expected);
            assert!(paste.is_active);
        }
    }

    #[tokio::test]
    async fn deactivate_is_idempotent() {
        let db = memory().await;
        db.insert_paste("gone01", "x", Utc::now(), None, None)
            .await
            .unwrap();

        db.deactivate("gone01").await.unwrap();
        let once = db.get_paste("gone01").await.unwrap().unwrap();
        db.deactivate("gone01").await.unwrap();
        let twice = db.get_paste("gone01").await.unwrap().unwrap();

        assert!(!once.is_active);
        assert_eq!(once.is_active, twice.is_active);
        assert_eq!(once.view_count, twice.view_count);
        assert!(db.record_view("gone01").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ping_and_active_listing() {
        let db = memory().await;
        db.ping().await.unwrap();

        db.insert_paste("live01", "x", Utc::now(), None, None)
            .await
            .unwrap();
        db.insert_paste("dead01", "x", Utc::now(), None, None)
            .await
            .unwrap();
        db.deactivate("dead01").await.unwrap();

        let active = db.get_active_statuses().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "live01");
        assert!(active[0].is_active);
    }
}
