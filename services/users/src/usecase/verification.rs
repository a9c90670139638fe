use chrono::{DateTime, Duration, Utc};
use rand::RngExt;

use tradedesk_domain::verification::{VerificationPayload, VerificationPurpose};

use crate::domain::repository::{UserRepository, VerificationStore};
use crate::domain::types::{NewOutboxEvent, NewUser, NewVerificationToken, User};
use crate::error::UsersServiceError;
use crate::infra::password::hash_password;

/// Default lifetime of a verification token.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;
/// Default minimum gap between two resend requests.
pub const DEFAULT_RESEND_COOLDOWN_SECS: i64 = 60;

const TOKEN_LEN: usize = 32;
const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

fn generate_token() -> String {
    let mut rng = rand::rng();
    (0..TOKEN_LEN)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

fn issue_token(
    email: &str,
    purpose: VerificationPurpose,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<(NewVerificationToken, NewOutboxEvent), UsersServiceError> {
    let token = NewVerificationToken {
        token: generate_token(),
        purpose,
        issued_at: now,
        expires_at: now + ttl,
    };
    let payload = VerificationPayload::new(email, &token.token, purpose);
    let event = NewOutboxEvent::verification(&payload, purpose)
        .map_err(|e| UsersServiceError::Internal(e.into()))?;
    Ok((token, event))
}

// ── Register ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct RegisterInput {
    pub username: String,
    pub password: String,
    pub email: String,
    pub name: String,
    pub document_id: String,
    pub birthday: Option<DateTime<Utc>>,
    pub gender: bool,
    pub permanent_address: String,
    pub phone_number: String,
}

pub struct RegisterUseCase<R: VerificationStore> {
    pub repo: R,
    pub token_ttl: Duration,
}

impl<R: VerificationStore> RegisterUseCase<R> {
    pub async fn execute(&self, input: RegisterInput) -> Result<User, UsersServiceError> {
        if input.username.is_empty() {
            return Err(UsersServiceError::InvalidInput("username is required"));
        }
        if input.password.is_empty() {
            return Err(UsersServiceError::InvalidInput("password is required"));
        }
        if input.email.is_empty() {
            return Err(UsersServiceError::InvalidInput("email is required"));
        }

        let password_hash = hash_password(&input.password)?;
        let (token, event) = issue_token(
            &input.email,
            VerificationPurpose::Register,
            Utc::now(),
            self.token_ttl,
        )?;
        let user = NewUser {
            username: input.username,
            email: input.email,
            name: input.name,
            document_id: input.document_id,
            birthday: input.birthday,
            gender: input.gender,
            permanent_address: input.permanent_address,
            phone_number: input.phone_number,
        };

        let created = self
            .repo
            .create_with_verification(&user, &password_hash, &token, &event)
            .await?;
        tracing::info!(user_id = created.id, "user registered, verification queued");
        Ok(created)
    }
}

// ── ResendVerification ───────────────────────────────────────────────────────

pub struct ResendVerificationUseCase<R>
where
    R: UserRepository + VerificationStore,
{
    pub repo: R,
    pub token_ttl: Duration,
    pub cooldown: Duration,
}

impl<R> ResendVerificationUseCase<R>
where
    R: UserRepository + VerificationStore,
{
    pub async fn execute(&self, email: &str) -> Result<(), UsersServiceError> {
        if email.is_empty() {
            return Err(UsersServiceError::InvalidInput("email is required"));
        }
        let user = self
            .repo
            .get_user_by_email(email)
            .await?
            .ok_or(UsersServiceError::UserNotFound)?;
        if user.verified {
            return Err(UsersServiceError::AlreadyVerified);
        }

        let now = Utc::now();
        // Only resend-issued tokens count towards the cooldown.
        if let Some(latest) = self.repo.get_latest_verification_token(user.id).await? {
            if latest.purpose == VerificationPurpose::Resend
                && now - latest.created_at < self.cooldown
            {
                return Err(UsersServiceError::TooFrequent);
            }
        }

        let (token, event) = issue_token(
            &user.email,
            VerificationPurpose::Resend,
            now,
            self.token_ttl,
        )?;
        self.repo
            .rotate_verification_token(user.id, &token, &event)
            .await?;
        tracing::info!(user_id = user.id, "verification token rotated");
        Ok(())
    }
}

// ── Verify ───────────────────────────────────────────────────────────────────

pub struct VerifyUseCase<R: VerificationStore> {
    pub repo: R,
}

impl<R: VerificationStore> VerifyUseCase<R> {
    pub async fn execute(&self, token: &str) -> Result<User, UsersServiceError> {
        if token.is_empty() {
            return Err(UsersServiceError::InvalidInput("token is required"));
        }
        let (found, user) = self
            .repo
            .find_verification_token(token)
            .await?
            .ok_or(UsersServiceError::TokenNotFound)?;
        if found.is_consumed() {
            return Err(UsersServiceError::TokenAlreadyUsed);
        }
        let now = Utc::now();
        if found.is_expired(now) {
            return Err(UsersServiceError::TokenExpired);
        }

        let verified = self.repo.verify_with_token(found.id, user.id, now).await?;
        tracing::info!(user_id = verified.id, "user verified");
        Ok(verified)
    }
}
