use axum::{
    Json,
    extract::{FromRequestParts, State},
    http::{StatusCode, request::Parts},
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use serde::{Deserialize, Serialize};

use crate::domain::repository::TokenIssuer;
use crate::domain::types::{IssuedTokens, SessionClaims};
use crate::error::UsersServiceError;
use crate::handlers::users::UserResponse;
use crate::state::AppState;
use crate::usecase::session::{LoginUseCase, LogoutUseCase, RefreshUseCase};

/// Caller identity taken from a valid `Authorization: Bearer <access token>` header.
///
/// Rejects with 401 `INVALID_TOKEN` when the header is absent or the token does not validate.
#[derive(Debug, Clone)]
pub struct Authenticated(pub SessionClaims);

impl Authenticated {
    /// Forbid acting on another user's account.
    pub fn ensure_owner(&self, username: &str) -> Result<(), UsersServiceError> {
        if self.0.username == username {
            Ok(())
        } else {
            Err(UsersServiceError::Forbidden)
        }
    }
}

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = UsersServiceError;

    // Validate synchronously and hand back a 'static future, as axum-core 0.5
    // declares this method as `fn -> impl Future + Send`.
    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let claims = parts
            .headers
            .typed_get::<Authorization<Bearer>>()
            .ok_or(UsersServiceError::InvalidToken)
            .and_then(|bearer| state.tokens.validate_access(bearer.token()));
        async move { claims.map(Self) }
    }
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(serialize_with = "tradedesk_core::serde::to_rfc3339_ms")]
    pub access_expires_at: chrono::DateTime<chrono::Utc>,
    pub refresh_token: String,
    #[serde(serialize_with = "tradedesk_core::serde::to_rfc3339_ms")]
    pub refresh_expires_at: chrono::DateTime<chrono::Utc>,
}

impl From<IssuedTokens> for TokenResponse {
    fn from(tokens: IssuedTokens) -> Self {
        Self {
            access_token: tokens.access_token,
            access_expires_at: tokens.access_expires_at,
            refresh_token: tokens.refresh_token,
            refresh_expires_at: tokens.refresh_expires_at,
        }
    }
}

// ── POST /auth/login ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub user: UserResponse,
    #[serde(flatten)]
    pub tokens: TokenResponse,
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, UsersServiceError> {
    let usecase = LoginUseCase {
        repo: state.user_repo(),
        tokens: state.token_issuer(),
    };
    let output = usecase.execute(&body.username, &body.password).await?;
    Ok(Json(LoginResponse {
        user: output.user.into(),
        tokens: output.tokens.into(),
    }))
}

// ── POST /auth/refresh ───────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, UsersServiceError> {
    let usecase = RefreshUseCase {
        repo: state.user_repo(),
        tokens: state.token_issuer(),
    };
    let tokens = usecase.execute(&body.refresh_token).await?;
    Ok(Json(tokens.into()))
}

// ── POST /auth/logout ────────────────────────────────────────────────────────

pub async fn logout(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<StatusCode, UsersServiceError> {
    let usecase = LogoutUseCase {
        tokens: state.token_issuer(),
    };
    usecase.execute(&body.refresh_token)?;
    Ok(StatusCode::NO_CONTENT)
}
