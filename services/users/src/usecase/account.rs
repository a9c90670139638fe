use tradedesk_domain::pagination::PageRequest;

use crate::domain::repository::UserRepository;
use crate::domain::types::{ProfileUpdate, User};
use crate::error::UsersServiceError;
use crate::infra::password::{hash_password, verify_password};

// ── GetUser ──────────────────────────────────────────────────────────────────

pub struct GetUserUseCase<R: UserRepository> {
    pub repo: R,
}

impl<R: UserRepository> GetUserUseCase<R> {
    pub async fn execute(&self, username: &str) -> Result<User, UsersServiceError> {
        self.repo
            .get_user(username)
            .await?
            .ok_or(UsersServiceError::UserNotFound)
    }
}

// ── ListUsers ────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct UserPage {
    pub users: Vec<User>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

pub struct ListUsersUseCase<R: UserRepository> {
    pub repo: R,
}

impl<R: UserRepository> ListUsersUseCase<R> {
    pub async fn execute(&self, page: PageRequest) -> Result<UserPage, UsersServiceError> {
        let page = page.clamped();
        let (users, total) = self.repo.list_users(page).await?;
        Ok(UserPage {
            users,
            total,
            page: page.page,
            page_size: page.page_size,
        })
    }
}

// ── UpdateProfile ────────────────────────────────────────────────────────────

pub struct UpdateProfileUseCase<R: UserRepository> {
    pub repo: R,
}

impl<R: UserRepository> UpdateProfileUseCase<R> {
    pub async fn execute(
        &self,
        username: &str,
        update: ProfileUpdate,
    ) -> Result<User, UsersServiceError> {
        if username.is_empty() {
            return Err(UsersServiceError::InvalidInput("username is required"));
        }
        if update.email.is_empty() {
            return Err(UsersServiceError::InvalidInput("email is required"));
        }
        if update.name.is_empty() {
            return Err(UsersServiceError::InvalidInput("name is required"));
        }
        self.repo.update_profile(username, &update).await
    }
}

// ── ChangePassword ───────────────────────────────────────────────────────────

pub struct ChangePasswordInput {
    pub current_password: String,
    pub new_password: String,
}

pub struct ChangePasswordUseCase<R: UserRepository> {
    pub repo: R,
}

impl<R: UserRepository> ChangePasswordUseCase<R> {
    pub async fn execute(
        &self,
        username: &str,
        input: ChangePasswordInput,
    ) -> Result<(), UsersServiceError> {
        if username.is_empty() {
            return Err(UsersServiceError::InvalidInput("username is required"));
        }
        if input.new_password.is_empty() {
            return Err(UsersServiceError::InvalidInput("new password is required"));
        }
        let user = self
            .repo
            .get_user(username)
            .await?
            .ok_or(UsersServiceError::UserNotFound)?;
        let credentials = self
            .repo
            .get_credentials(user.id)
            .await?
            .ok_or(UsersServiceError::InvalidCredentials)?;
        if !verify_password(&input.current_password, &credentials.password_hash)? {
            return Err(UsersServiceError::InvalidCredentials);
        }
        let hash = hash_password(&input.new_password)?;
        self.repo.update_password(user.id, &hash).await
    }
}

// ── DeleteAccount ────────────────────────────────────────────────────────────

pub struct DeleteAccountUseCase<R: UserRepository> {
    pub repo: R,
}

impl<R: UserRepository> DeleteAccountUseCase<R> {
    pub async fn execute(&self, username: &str) -> Result<(), UsersServiceError> {
        if username.is_empty() {
            return Err(UsersServiceError::InvalidInput("username is required"));
        }
        self.repo.delete_user(username).await?;
        tracing::info!(username, "account deleted");
        Ok(())
    }
}
