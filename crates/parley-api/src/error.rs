use axum::{Json, http::StatusCode, response::IntoResponse};
use thiserror::Error;
use tracing::error;

use parley_db::DbError;

/// API error taxonomy, matched exhaustively at the response boundary.
/// Dispatch failures are deliberately not a variant: live delivery is
/// best-effort and never surfaces to the caller.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing/invalid/expired credential, or a credential whose principal
    /// no longer exists.
    #[error("{0}")]
    Unauthenticated(&'static str),

    /// Malformed input: missing required field, unparsable recipient id,
    /// failed attachment registration.
    #[error("{0}")]
    Validation(String),

    /// Storage rejected the write (unique username/email, foreign keys).
    #[error("{0}")]
    Constraint(String),

    #[error("not found")]
    NotFound,

    /// Anything else. The detail is logged, never sent to the client.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Constraint(msg) => ApiError::Constraint(msg),
            other => ApiError::Internal(other.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg.to_string()),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Constraint(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            ApiError::Internal(err) => {
                error!("internal error: {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = serde_json::json!({ "message": message });
        (status, Json(body)).into_response()
    }
}
