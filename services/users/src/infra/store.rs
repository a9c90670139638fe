use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;

use tradedesk_domain::outbox::OutboxStatus;
use tradedesk_domain::pagination::PageRequest;

use crate::domain::repository::{OutboxStore, UserRepository, VerificationStore};
use crate::domain::types::{
    LoginCredentials, NewOutboxEvent, NewUser, NewVerificationToken, OutboxEvent, ProfileUpdate,
    User, VerificationToken,
};
use crate::error::UsersServiceError;
use crate::infra::db::DbStore;
use crate::infra::memory::MemoryStore;

/// Repository backend chosen once at startup.
#[derive(Clone)]
pub enum Store {
    Postgres(DbStore),
    Memory(MemoryStore),
}

impl Store {
    pub fn postgres(db: DatabaseConnection) -> Self {
        Self::Postgres(DbStore { db })
    }

    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::Memory(_) => "memory",
        }
    }

    /// Fails when the backend cannot serve requests.
    pub async fn ping(&self) -> Result<(), UsersServiceError> {
        match self {
            Self::Postgres(store) => store.ping().await,
            Self::Memory(_) => Ok(()),
        }
    }
}

macro_rules! delegate {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            Store::Postgres($store) => $call,
            Store::Memory($store) => $call,
        }
    };
}

impl UserRepository for Store {
    async fn get_user(&self, username: &str) -> Result<Option<User>, UsersServiceError> {
        delegate!(self, s => s.get_user(username).await)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, UsersServiceError> {
        delegate!(self, s => s.get_user_by_email(email).await)
    }

    async fn get_credentials(
        &self,
        user_id: i64,
    ) -> Result<Option<LoginCredentials>, UsersServiceError> {
        delegate!(self, s => s.get_credentials(user_id).await)
    }

    async fn list_users(&self, page: PageRequest) -> Result<(Vec<User>, u64), UsersServiceError> {
        delegate!(self, s => s.list_users(page).await)
    }

    async fn update_profile(
        &self,
        username: &str,
        update: &ProfileUpdate,
    ) -> Result<User, UsersServiceError> {
        delegate!(self, s => s.update_profile(username, update).await)
    }

    async fn update_password(
        &self,
        user_id: i64,
        password_hash: &str,
    ) -> Result<(), UsersServiceError> {
        delegate!(self, s => s.update_password(user_id, password_hash).await)
    }

    async fn delete_user(&self, username: &str) -> Result<(), UsersServiceError> {
        delegate!(self, s => s.delete_user(username).await)
    }
}

impl VerificationStore for Store {
    async fn create_with_verification(
        &self,
        user: &NewUser,
        password_hash: &str,
        token: &NewVerificationToken,
        event: &NewOutboxEvent,
    ) -> Result<User, UsersServiceError> {
        delegate!(self, s => s.create_with_verification(user, password_hash, token, event).await)
    }

    async fn rotate_verification_token(
        &self,
        user_id: i64,
        token: &NewVerificationToken,
        event: &NewOutboxEvent,
    ) -> Result<(), UsersServiceError> {
        delegate!(self, s => s.rotate_verification_token(user_id, token, event).await)
    }

    async fn find_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<(VerificationToken, User)>, UsersServiceError> {
        delegate!(self, s => s.find_verification_token(token).await)
    }

    async fn get_latest_verification_token(
        &self,
        user_id: i64,
    ) -> Result<Option<VerificationToken>, UsersServiceError> {
        delegate!(self, s => s.get_latest_verification_token(user_id).await)
    }

    async fn verify_with_token(
        &self,
        token_id: i64,
        user_id: i64,
        verified_at: DateTime<Utc>,
    ) -> Result<User, UsersServiceError> {
        delegate!(self, s => s.verify_with_token(token_id, user_id, verified_at).await)
    }
}

impl OutboxStore for Store {
    async fn find_outbox_event(&self, id: i64) -> Result<Option<OutboxEvent>, UsersServiceError> {
        delegate!(self, s => s.find_outbox_event(id).await)
    }

    async fn update_outbox_status(
        &self,
        id: i64,
        status: OutboxStatus,
    ) -> Result<bool, UsersServiceError> {
        delegate!(self, s => s.update_outbox_status(id, status).await)
    }
}
