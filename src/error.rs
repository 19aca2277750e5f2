use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Why a share link failed to resolve. The distinction feeds logging and the
/// share manager's internal flow; HTTP callers always see a plain 404 so that
/// token probing cannot distinguish revoked from expired from unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareInvalidReason {
    NotFound,
    Revoked,
    Expired,
    Exhausted,
}

impl ShareInvalidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareInvalidReason::NotFound => "not_found",
            ShareInvalidReason::Revoked => "revoked",
            ShareInvalidReason::Expired => "expired",
            ShareInvalidReason::Exhausted => "exhausted",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found")]
    NotFound,

    #[error("Payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("Storage failure: {0}")]
    StorageFailure(#[from] std::io::Error),

    #[error("Payload missing from disk")]
    PayloadMissing,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Share link invalid: {}", .0.as_str())]
    InvalidShare(ShareInvalidReason),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::PayloadTooLarge { limit } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("Payload exceeds {} bytes", limit),
            ),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::InvalidShare(reason) => {
                tracing::debug!("share rejected: {}", reason.as_str());
                (StatusCode::NOT_FOUND, "Not found".to_string())
            }
            AppError::PayloadMissing => {
                tracing::error!("item record exists but payload bytes are gone");
                (StatusCode::NOT_FOUND, "Not found".to_string())
            }
            AppError::StorageFailure(e) => {
                tracing::error!("Storage failure: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, message).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
