use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::id::generate_id;
use crate::models::{NewPaste, Paste, PasteStatus};
use crate::types::api::CreatePaste;
use crate::App;

/// How many fresh ids to try before giving up on an insert.
const MAX_ID_ATTEMPTS: usize = 8;

/// Check a creation request and normalize it into a [`NewPaste`].
pub fn validate(request: CreatePaste) -> crate::ApiResult<NewPaste> {
    let content = match request.content {
        Value::String(content) if !content.trim().is_empty() => content.trim().to_owned(),
        _ => return Err(ApiError::InvalidContent),
    };

    let ttl_seconds = match request.ttl_seconds {
        Value::Null => None,
        value => Some(
            value
                .as_i64()
                .filter(|ttl| *ttl >= 1)
                .ok_or(ApiError::InvalidTtl)?,
        ),
    };

    let max_views = match request.max_views {
        Value::Null => None,
        value => Some(
            value
                .as_i64()
                .filter(|max| *max >= 1)
                .and_then(|max| i32::try_from(max).ok())
                .ok_or(ApiError::InvalidMaxViews)?,
        ),
    };

    Ok(NewPaste {
        content,
        ttl_seconds,
        max_views,
    })
}

/// Store a validated paste, retrying with a new id on collision.
pub async fn create(app: &App, paste: NewPaste, now: DateTime<Utc>) -> crate::ApiResult<Paste> {
    create_with(app, paste, now, generate_id).await
}

/// Like [`create`], drawing candidate ids from `next_id`.
pub async fn create_with(
    app: &App,
    paste: NewPaste,
    now: DateTime<Utc>,
    mut next_id: impl FnMut() -> String,
) -> crate::ApiResult<Paste> {
    let expires_at = match paste.ttl_seconds {
        Some(ttl) => Some(
            Duration::try_seconds(ttl)
                .and_then(|ttl| now.checked_add_signed(ttl))
                .ok_or(ApiError::InvalidTtl)?,
        ),
        None => None,
    };

    for _ in 0..MAX_ID_ATTEMPTS {
        let id = next_id();
        let inserted = app
            .database
            .insert_paste(&id, &paste.content, now, expires_at, paste.max_views)
            .await?;

        match inserted {
            Some(created) => {
                info!(
                    "new paste: id='{id}', size={size}, expires_at={expires_at:?}, \
                     max_views={max_views:?}",
                    size = created.content.len(),
                    max_views = created.max_views,
                );
                return Ok(created);
            }
            None => warn!("paste id collision on '{id}', regenerating"),
        }
    }

    Err(ApiError::IdsExhausted {
        attempts: MAX_ID_ATTEMPTS,
    })
}

/// Serve one view of a paste as of `now`.
///
/// Unknown ids are [`ApiError::NotFound`]. Pastes that are inactive, past
/// their expiry or out of views are deactivated and reported as
/// [`ApiError::Unavailable`].
pub async fn view(app: &App, id: &str, now: DateTime<Utc>) -> crate::ApiResult<Paste> {
    let Some(paste) = app.database.get_paste(id).await? else {
        return Err(ApiError::NotFound);
    };

    if !is_valid(Some(&paste), now) {
        debug!("paste '{id}' unavailable: {}", unavailable_reason(&paste, now));
        app.database.deactivate(id).await?;
        return Err(ApiError::Unavailable);
    }

    match app.database.record_view(id).await? {
        Some(paste) => {
            if !paste.is_active {
                info!("paste '{id}' reached its view limit");
            }
            Ok(paste)
        }
        None => {
            debug!("paste '{id}' used up by a concurrent view");
            Err(ApiError::Unavailable)
        }
    }
}

/// Deactivate every active paste that can no longer be served.
pub async fn deactivate_expired(app: &App, now: DateTime<Utc>) -> crate::ApiResult<usize> {
    let pastes = app.database.get_active_statuses().await?;

    let mut count = 0;
    for paste in pastes {
        if !paste.is_servable(now) {
            app.database.deactivate(&paste.id).await?;
            count += 1;
        }
    }

    if count > 0 {
        info!("deactivated {count} pastes");
    }

    Ok(count)
}

/// Whether a paste may still be served at `now`.
pub fn is_valid(paste: Option<&Paste>, now: DateTime<Utc>) -> bool {
    paste.map_or(false, |paste| paste.status().is_servable(now))
}

fn unavailable_reason(paste: &Paste, now: DateTime<Utc>) -> &'static str {
    if !paste.is_active {
        "inactive"
    } else if paste.expires_at.map_or(false, |expires_at| now > expires_at) {
        "expired"
    } else {
        "view limit reached"
    }
}
