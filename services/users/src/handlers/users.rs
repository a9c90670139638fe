use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradedesk_domain::pagination::PageRequest;

use crate::domain::types::{ProfileUpdate, User};
use crate::error::UsersServiceError;
use crate::handlers::auth::Authenticated;
use crate::state::AppState;
use crate::usecase::account::{
    ChangePasswordInput, ChangePasswordUseCase, DeleteAccountUseCase, GetUserUseCase,
    ListUsersUseCase, UpdateProfileUseCase,
};
use crate::usecase::verification::{RegisterInput, RegisterUseCase};

#[derive(Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub name: String,
    pub document_id: String,
    #[serde(serialize_with = "tradedesk_core::serde::opt_to_rfc3339_ms")]
    pub birthday: Option<DateTime<Utc>>,
    pub gender: bool,
    pub permanent_address: String,
    pub phone_number: String,
    pub verified: bool,
    #[serde(serialize_with = "tradedesk_core::serde::opt_to_rfc3339_ms")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(serialize_with = "tradedesk_core::serde::to_rfc3339_ms")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "tradedesk_core::serde::to_rfc3339_ms")]
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            name: user.name,
            document_id: user.document_id,
            birthday: user.birthday,
            gender: user.gender,
            permanent_address: user.permanent_address,
            phone_number: user.phone_number,
            verified: user.verified,
            verified_at: user.verified_at,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

// ── POST /users ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub document_id: String,
    pub birthday: Option<DateTime<Utc>>,
    #[serde(default)]
    pub gender: bool,
    #[serde(default)]
    pub permanent_address: String,
    #[serde(default)]
    pub phone_number: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), UsersServiceError> {
    let usecase = RegisterUseCase {
        repo: state.user_repo(),
        token_ttl: state.token_ttl,
    };
    let user = usecase
        .execute(RegisterInput {
            username: body.username,
            password: body.password,
            email: body.email,
            name: body.name,
            document_id: body.document_id,
            birthday: body.birthday,
            gender: body.gender,
            permanent_address: body.permanent_address,
            phone_number: body.phone_number,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

// ── GET /users ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct UserPageResponse {
    pub users: Vec<UserResponse>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

pub async fn list_users(
    _caller: Authenticated,
    State(state): State<AppState>,
    Query(page): Query<PageRequest>,
) -> Result<Json<UserPageResponse>, UsersServiceError> {
    let usecase = ListUsersUseCase {
        repo: state.user_repo(),
    };
    let page = usecase.execute(page).await?;
    Ok(Json(UserPageResponse {
        users: page.users.into_iter().map(UserResponse::from).collect(),
        total: page.total,
        page: page.page,
        page_size: page.page_size,
    }))
}

// ── GET /users/{username} ────────────────────────────────────────────────────

pub async fn get_user(
    _caller: Authenticated,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<UserResponse>, UsersServiceError> {
    let usecase = GetUserUseCase {
        repo: state.user_repo(),
    };
    let user = usecase.execute(&username).await?;
    Ok(Json(user.into()))
}

// ── PATCH /users/{username} ──────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub document_id: String,
    pub birthday: Option<DateTime<Utc>>,
    #[serde(default)]
    pub gender: bool,
    #[serde(default)]
    pub permanent_address: String,
    #[serde(default)]
    pub phone_number: String,
}

pub async fn update_user(
    caller: Authenticated,
    State(state): State<AppState>,
    Path(username): Path<String>,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, UsersServiceError> {
    caller.ensure_owner(&username)?;
    let usecase = UpdateProfileUseCase {
        repo: state.user_repo(),
    };
    let user = usecase
        .execute(
            &username,
            ProfileUpdate {
                email: body.email,
                name: body.name,
                document_id: body.document_id,
                birthday: body.birthday,
                gender: body.gender,
                permanent_address: body.permanent_address,
                phone_number: body.phone_number,
            },
        )
        .await?;
    Ok(Json(user.into()))
}

// ── PUT /users/{username}/password ───────────────────────────────────────────

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

pub async fn change_password(
    caller: Authenticated,
    State(state): State<AppState>,
    Path(username): Path<String>,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<StatusCode, UsersServiceError> {
    caller.ensure_owner(&username)?;
    let usecase = ChangePasswordUseCase {
        repo: state.user_repo(),
    };
    usecase
        .execute(
            &username,
            ChangePasswordInput {
                current_password: body.current_password,
                new_password: body.new_password,
            },
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── DELETE /users/{username} ─────────────────────────────────────────────────

pub async fn delete_user(
    caller: Authenticated,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<StatusCode, UsersServiceError> {
    caller.ensure_owner(&username)?;
    let usecase = DeleteAccountUseCase {
        repo: state.user_repo(),
    };
    usecase.execute(&username).await?;
    Ok(StatusCode::NO_CONTENT)
}
