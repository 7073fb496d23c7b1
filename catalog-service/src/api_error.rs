use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common_auth::{GuardError, Role};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("This credential already taken")]
    DuplicateCredential,
    #[error("User is not registered or wrong password")]
    InvalidCredentials,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Insufficient role")]
    Forbidden { required: Vec<Role> },
    #[error("This movie no longer exists")]
    MovieNotFound,
    #[error("{message}")]
    BadRequest {
        code: &'static str,
        message: String,
    },
    #[error("An error occurred on server-side")]
    Internal,
}

impl ApiError {
    /// Log the underlying failure server-side and surface an opaque error.
    ///
    /// Persistence and system error detail never reaches the caller.
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        error!(error = %err, "unexpected server-side failure");
        ApiError::Internal
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            code,
            message: message.into(),
        }
    }
}

impl From<GuardError> for ApiError {
    fn from(value: GuardError) -> Self {
        let GuardError::Forbidden { required } = value;
        ApiError::Forbidden { required }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::DuplicateCredential => (StatusCode::BAD_REQUEST, "credential_taken"),
            ApiError::InvalidCredentials => (StatusCode::BAD_REQUEST, "invalid_credentials"),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Forbidden { .. } => (StatusCode::FORBIDDEN, "missing_role"),
            ApiError::MovieNotFound => (StatusCode::NOT_FOUND, "movie_not_found"),
            ApiError::BadRequest { code, .. } => (StatusCode::BAD_REQUEST, *code),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = ErrorBody {
            code,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
