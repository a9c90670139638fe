use crate::domain::repository::{TokenIssuer, UserRepository};
use crate::domain::types::{IssuedTokens, User};
use crate::error::UsersServiceError;
use crate::infra::password::verify_password;

// ── Login ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct LoginOutput {
    pub user: User,
    pub tokens: IssuedTokens,
}

pub struct LoginUseCase<R: UserRepository, T: TokenIssuer> {
    pub repo: R,
    pub tokens: T,
}

impl<R: UserRepository, T: TokenIssuer> LoginUseCase<R, T> {
    pub async fn execute(
        &self,
        username: &str,
        password: &str,
    ) -> Result<LoginOutput, UsersServiceError> {
        if username.is_empty() || password.is_empty() {
            return Err(UsersServiceError::InvalidCredentials);
        }
        let user = self
            .repo
            .get_user(username)
            .await?
            .ok_or(UsersServiceError::InvalidCredentials)?;
        let credentials = self
            .repo
            .get_credentials(user.id)
            .await?
            .ok_or(UsersServiceError::InvalidCredentials)?;
        if !verify_password(password, &credentials.password_hash)? {
            return Err(UsersServiceError::InvalidCredentials);
        }
        if !user.verified {
            return Err(UsersServiceError::NotVerified);
        }

        let tokens = self.tokens.issue(&user)?;
        tracing::info!(user_id = user.id, "login succeeded");
        Ok(LoginOutput { user, tokens })
    }
}

// ── Refresh ──────────────────────────────────────────────────────────────────

pub struct RefreshUseCase<R: UserRepository, T: TokenIssuer> {
    pub repo: R,
    pub tokens: T,
}

impl<R: UserRepository, T: TokenIssuer> RefreshUseCase<R, T> {
    pub async fn execute(&self, refresh_token: &str) -> Result<IssuedTokens, UsersServiceError> {
        let claims = self.tokens.validate_refresh(refresh_token)?;
        let user = self
            .repo
            .get_user(&claims.username)
            .await?
            .filter(|u| u.id == claims.user_id)
            .ok_or(UsersServiceError::InvalidToken)?;
        self.tokens.revoke(refresh_token)?;
        self.tokens.issue(&user)
    }
}

// ── Logout ───────────────────────────────────────────────────────────────────

pub struct LogoutUseCase<T: TokenIssuer> {
    pub tokens: T,
}

impl<T: TokenIssuer> LogoutUseCase<T> {
    pub fn execute(&self, refresh_token: &str) -> Result<(), UsersServiceError> {
        self.tokens.revoke(refresh_token)
    }
}
