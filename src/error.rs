use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application-level errors
///
/// Only `InvalidInput` is expected to reach a client. The upstream classes are
/// recovered inside the composer and degrade to empty candidate lists.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream call timed out after {0:?}")]
    UpstreamTimeout(Duration),

    #[error("Malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// True for the expected "nothing stored for this key" outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    /// True for errors caused by a collaborator rather than by this service
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            AppError::HttpClient(_)
                | AppError::UpstreamUnavailable(_)
                | AppError::UpstreamTimeout(_)
                | AppError::MalformedResponse(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Database(_) | AppError::Cache(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::HttpClient(_)
            | AppError::UpstreamUnavailable(_)
            | AppError::UpstreamTimeout(_)
            | AppError::MalformedResponse(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_maps_to_bad_request() {
        let response = AppError::InvalidInput("k must be non-negative".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_upstream_errors_map_to_bad_gateway() {
        let errors = vec![
            AppError::UpstreamUnavailable("history returned 503".to_string()),
            AppError::UpstreamTimeout(Duration::from_millis(200)),
            AppError::MalformedResponse("missing column".to_string()),
        ];

        for error in errors {
            assert!(error.is_upstream());
            assert_eq!(error.into_response().status(), StatusCode::BAD_GATEWAY);
        }
    }

    #[test]
    fn test_not_found_classification() {
        let error = AppError::NotFound("user 7".to_string());
        assert!(error.is_not_found());
        assert!(!error.is_upstream());
        assert_eq!(error.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_timeout_message_includes_duration() {
        let error = AppError::UpstreamTimeout(Duration::from_millis(1500));
        assert_eq!(error.to_string(), "Upstream call timed out after 1.5s");
    }
}
