#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};

use tradedesk_domain::outbox::OutboxStatus;
use tradedesk_domain::pagination::PageRequest;

use crate::domain::types::{
    IssuedTokens, LoginCredentials, NewOutboxEvent, NewUser, NewVerificationToken, OutboxEvent,
    ProfileUpdate, SessionClaims, User, VerificationToken,
};
use crate::error::UsersServiceError;

/// Repository for user profiles and login credentials.
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, username: &str) -> Result<Option<User>, UsersServiceError>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, UsersServiceError>;
    async fn get_credentials(
        &self,
        user_id: i64,
    ) -> Result<Option<LoginCredentials>, UsersServiceError>;

    /// Users ordered by username, plus the total count. `page` must be clamped.
    async fn list_users(&self, page: PageRequest) -> Result<(Vec<User>, u64), UsersServiceError>;

    /// Fails with `UserNotFound`, or `UserAlreadyExists` when the new email is taken.
    async fn update_profile(
        &self,
        username: &str,
        update: &ProfileUpdate,
    ) -> Result<User, UsersServiceError>;

    async fn update_password(
        &self,
        user_id: i64,
        password_hash: &str,
    ) -> Result<(), UsersServiceError>;

    /// Removes the user together with its credentials and verification tokens.
    async fn delete_user(&self, username: &str) -> Result<(), UsersServiceError>;
}

/// Verification token persistence. Every mutation that issues a token appends
/// its outbox row in the same transaction.
pub trait VerificationStore: Send + Sync {
    /// Insert user, credentials, token and outbox row atomically.
    /// Fails with `UserAlreadyExists` on a username or email collision.
    async fn create_with_verification(
        &self,
        user: &NewUser,
        password_hash: &str,
        token: &NewVerificationToken,
        event: &NewOutboxEvent,
    ) -> Result<User, UsersServiceError>;

    /// Consume every active token of `user_id` at `token.issued_at`, then insert
    /// `token` and `event`. Fails with `UserNotFound` if the user does not exist.
    async fn rotate_verification_token(
        &self,
        user_id: i64,
        token: &NewVerificationToken,
        event: &NewOutboxEvent,
    ) -> Result<(), UsersServiceError>;

    async fn find_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<(VerificationToken, User)>, UsersServiceError>;

    /// Most recently created token regardless of state.
    async fn get_latest_verification_token(
        &self,
        user_id: i64,
    ) -> Result<Option<VerificationToken>, UsersServiceError>;

    /// Consume the token and mark the user verified in one transaction.
    /// Only an unconsumed token is updated; otherwise fails with `TokenAlreadyUsed`.
    async fn verify_with_token(
        &self,
        token_id: i64,
        user_id: i64,
        verified_at: DateTime<Utc>,
    ) -> Result<User, UsersServiceError>;
}

/// Outbox status write-back used by the relay.
pub trait OutboxStore: Send + Sync {
    async fn find_outbox_event(&self, id: i64) -> Result<Option<OutboxEvent>, UsersServiceError>;

    /// Move a pending row to `status`. Returns `false` when the row was already
    /// terminal and left unchanged; fails with `OutboxEventNotFound` when absent.
    async fn update_outbox_status(
        &self,
        id: i64,
        status: OutboxStatus,
    ) -> Result<bool, UsersServiceError>;
}

/// Session token capability (sign, validate, revoke).
pub trait TokenIssuer: Send + Sync {
    fn issue(&self, user: &User) -> Result<IssuedTokens, UsersServiceError>;
    fn validate_access(&self, token: &str) -> Result<SessionClaims, UsersServiceError>;
    fn validate_refresh(&self, token: &str) -> Result<SessionClaims, UsersServiceError>;
    fn revoke(&self, refresh_token: &str) -> Result<(), UsersServiceError>;
}
