// Error types for the library and the HTTP layer.
// The library surfaces `KslError`; the axum handlers wrap it in `AppError`
// so every failure turns into a `{"error": ...}` JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

/// Result alias for library operations.
pub type Result<T> = std::result::Result<T, KslError>;

#[derive(Debug, Error)]
pub enum KslError {
    /// A filter value failed the field's validation rule.
    #[error("invalid value for filter '{field}': expected {expected}, got {actual}")]
    InvalidFilter {
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("unknown filter '{0}'")]
    UnknownFilter(String),

    /// Neither a keyword nor any filter was supplied.
    #[error("a keyword or at least one filter is required")]
    EmptyQuery,

    #[error("'{0}' was not found in the make/model catalog")]
    NotInCatalog(String),

    /// The proxy kept answering 503 until the retry budget ran out.
    #[error("max retries reached for endpoint '{endpoint}' after {attempts} attempts")]
    MaxRetriesExceeded { endpoint: String, attempts: u32 },

    /// Any non-200, non-503 answer from the proxy.
    #[error("proxy returned HTTP {status}: {body}")]
    Service { status: u16, body: String },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The proxy answered 200 but the payload did not have the expected shape.
    #[error("unexpected proxy response: {0}")]
    MalformedResponse(String),

    /// A listing record is missing (or has an unusable) required field.
    #[error("malformed listing record: field '{field}' {reason}")]
    MalformedRecord { field: &'static str, reason: String },
}

impl KslError {
    pub fn malformed_record(field: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            field,
            reason: reason.into(),
        }
    }

    /// True for errors caused by the caller's input rather than the remote side.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidFilter { .. } | Self::UnknownFilter(_) | Self::EmptyQuery | Self::NotInCatalog(_)
        )
    }
}

// Application error returned by the axum handlers
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Upstream(KslError),
    InternalServerError(anyhow::Error),
}

impl From<KslError> for AppError {
    fn from(error: KslError) -> Self {
        if error.is_validation() {
            AppError::BadRequest(error.to_string())
        } else {
            AppError::Upstream(error)
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::InternalServerError(error)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(message) => {
                tracing::info!("Rejected request: {}", message);
                (StatusCode::BAD_REQUEST, message)
            }
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            AppError::Upstream(e) => {
                tracing::error!("Proxy API failure: {:?}", e);
                (StatusCode::BAD_GATEWAY, e.to_string())
            }
            AppError::InternalServerError(e) => {
                tracing::error!("Internal server error: {:?}", e);
                // Don't expose internal details to the client
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        (status, Json(json!({ "error": error_message }))).into_response()
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_bad_request() {
        let response = AppError::from(KslError::EmptyQuery).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn service_errors_map_to_bad_gateway() {
        let err = KslError::Service {
            status: 500,
            body: "boom".into(),
        };
        assert!(!err.is_validation());
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn invalid_filter_message_names_the_field() {
        let err = KslError::InvalidFilter {
            field: "sellerType",
            expected: "one of [\"Dealership\"]".into(),
            actual: "\"Invalid Seller\"".into(),
        };
        let message = err.to_string();
        assert!(message.contains("sellerType"));
        assert!(message.contains("Invalid Seller"));
    }
}
