use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Paste;

/// Body of `POST /pastes`.
///
/// Fields are kept as raw JSON so that each one can be rejected with its own
/// message instead of a generic deserialization error.
#[derive(Debug, Default, Deserialize)]
pub struct CreatePaste {
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub ttl_seconds: Value,
    #[serde(default)]
    pub max_views: Value,
}

#[derive(Debug, Serialize)]
pub struct CreatedPaste {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct PasteView {
    pub content: String,
    pub remaining_views: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<Paste> for PasteView {
    fn from(paste: Paste) -> Self {
        PasteView {
            remaining_views: paste.remaining_views(),
            expires_at: paste.expires_at,
            content: paste.content,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}
