use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ApiError {
    #[error("Content is required and must be a non-empty string")]
    InvalidContent,
    #[error("ttl_seconds must be an integer ≥ 1")]
    InvalidTtl,
    #[error("max_views must be an integer ≥ 1")]
    InvalidMaxViews,
    #[error("Invalid JSON body")]
    InvalidBody { source: JsonRejection },
    #[error("Paste is too large")]
    TooLarge,
    #[error("Paste not found")]
    NotFound,
    #[error("Paste not available")]
    Unavailable,
    #[error("no free paste id after {attempts} attempts")]
    IdsExhausted { attempts: usize },
    #[error("database error")]
    Database {
        #[from]
        source: sqlx::Error,
    },
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidContent => StatusCode::BAD_REQUEST,
            ApiError::InvalidTtl => StatusCode::BAD_REQUEST,
            ApiError::InvalidMaxViews => StatusCode::BAD_REQUEST,
            ApiError::InvalidBody { .. } => StatusCode::BAD_REQUEST,
            ApiError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Unavailable => StatusCode::NOT_FOUND,
            ApiError::IdsExhausted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Database { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the paste is missing or can no longer be served.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound | ApiError::Unavailable)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();

        let message = if status_code.is_server_error() {
            match &self {
                ApiError::Database { source } => error!("database error: {source}"),
                other => error!("{other}"),
            }
            "Internal server error".to_owned()
        } else {
            if let ApiError::InvalidBody { source } = &self {
                debug!("rejected request body: {source}");
            }
            self.to_string()
        };

        (status_code, Json(json!({ "error": message }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(source: JsonRejection) -> Self {
        if source.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::TooLarge
        } else {
            ApiError::InvalidBody { source }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_keep_their_message() {
        assert_eq!(
            ApiError::InvalidContent.to_string(),
            "Content is required and must be a non-empty string"
        );
        assert_eq!(ApiError::InvalidTtl.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Unavailable.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn database_errors_are_server_errors() {
        let error = ApiError::from(sqlx::Error::RowNotFound);
        assert!(matches!(error, ApiError::Database { .. }));
        assert!(!error.is_not_found());
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn server_errors_are_generic_on_the_wire() {
        let response = ApiError::from(sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
