use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::Deserialize;

use crate::error::UsersServiceError;
use crate::handlers::users::UserResponse;
use crate::state::AppState;
use crate::usecase::verification::{ResendVerificationUseCase, VerifyUseCase};

// ── POST /users/verification/resend ──────────────────────────────────────────

#[derive(Deserialize)]
pub struct ResendRequest {
    pub email: String,
}

pub async fn resend_verification(
    State(state): State<AppState>,
    Json(body): Json<ResendRequest>,
) -> Result<StatusCode, UsersServiceError> {
    let usecase = ResendVerificationUseCase {
        repo: state.user_repo(),
        token_ttl: state.token_ttl,
        cooldown: state.resend_cooldown,
    };
    usecase.execute(&body.email).await?;
    Ok(StatusCode::ACCEPTED)
}

// ── POST /users/verify, GET /users/verify?token= ─────────────────────────────

#[derive(Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub token: String,
}

async fn verify(state: AppState, token: &str) -> Result<Json<UserResponse>, UsersServiceError> {
    let usecase = VerifyUseCase {
        repo: state.user_repo(),
    };
    let user = usecase.execute(token).await?;
    Ok(Json(user.into()))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<UserResponse>, UsersServiceError> {
    verify(state, &body.token).await
}

/// Target of the emailed verification link.
pub async fn verify_email_link(
    State(state): State<AppState>,
    Query(query): Query<VerifyRequest>,
) -> Result<Json<UserResponse>, UsersServiceError> {
    verify(state, &query.token).await
}
