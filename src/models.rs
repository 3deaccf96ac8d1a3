use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Paste {
    pub id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_views: Option<i32>,
    pub view_count: i32,
    pub is_active: bool,
}

impl Paste {
    pub fn status(&self) -> PasteStatus {
        PasteStatus {
            id: self.id.clone(),
            expires_at: self.expires_at,
            max_views: self.max_views,
            view_count: self.view_count,
            is_active: self.is_active,
        }
    }

    /// Views left before the quota is used up, or `None` if unlimited.
    pub fn remaining_views(&self) -> Option<i32> {
        self.max_views
            .map(|max_views| (max_views - self.view_count).max(0))
    }
}

/// The columns of a paste that decide whether it can still be served.
#[derive(Debug, Clone, FromRow)]
pub struct PasteStatus {
    pub id: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_views: Option<i32>,
    pub view_count: i32,
    pub is_active: bool,
}

impl PasteStatus {
    /// Active, not past its expiry (exclusive) and with views left.
    pub fn is_servable(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }

        if self.expires_at.map_or(false, |expires_at| now > expires_at) {
            return false;
        }

        if self
            .max_views
            .map_or(false, |max_views| self.view_count >= max_views)
        {
            return false;
        }

        true
    }
}

/// A validated paste that has not been assigned an id yet.
#[derive(Debug, Clone)]
pub struct NewPaste {
    pub content: String,
    pub ttl_seconds: Option<i64>,
    pub max_views: Option<i32>,
}
