use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Users service domain error variants.
#[derive(Debug, thiserror::Error)]
pub enum UsersServiceError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("user already exists")]
    UserAlreadyExists,
    #[error("user not found")]
    UserNotFound,
    #[error("verification token not found")]
    TokenNotFound,
    #[error("outbox event not found")]
    OutboxEventNotFound,
    #[error("user already verified")]
    AlreadyVerified,
    #[error("verification token already used")]
    TokenAlreadyUsed,
    #[error("verification token expired")]
    TokenExpired,
    #[error("verification requested too frequently")]
    TooFrequent,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid token")]
    InvalidToken,
    #[error("user not verified")]
    NotVerified,
    #[error("forbidden")]
    Forbidden,
    #[error("storage unavailable")]
    StorageUnavailable(#[source] anyhow::Error),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl UsersServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::UserAlreadyExists => "USER_ALREADY_EXISTS",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::TokenNotFound => "TOKEN_NOT_FOUND",
            Self::OutboxEventNotFound => "OUTBOX_EVENT_NOT_FOUND",
            Self::AlreadyVerified => "ALREADY_VERIFIED",
            Self::TokenAlreadyUsed => "TOKEN_ALREADY_USED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TooFrequent => "TOO_FREQUENT",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::NotVerified => "NOT_VERIFIED",
            Self::Forbidden => "FORBIDDEN",
            Self::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::UserAlreadyExists | Self::AlreadyVerified | Self::TokenAlreadyUsed => {
                StatusCode::CONFLICT
            }
            Self::UserNotFound | Self::TokenNotFound | Self::OutboxEventNotFound => {
                StatusCode::NOT_FOUND
            }
            Self::TokenExpired => StatusCode::GONE,
            Self::TooFrequent => StatusCode::TOO_MANY_REQUESTS,
            Self::InvalidCredentials | Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::NotVerified | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for UsersServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Internal(e) | Self::StorageUnavailable(e) => {
                tracing::error!(error = %format!("{e:#}"), kind = self.kind(), "request failed");
            }
            _ => {}
        }
        let body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}
