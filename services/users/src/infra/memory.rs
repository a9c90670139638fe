//! In-process store for tests and database-less deployments.
//!
//! A single mutex guards every table so each trait method is atomic,
//! matching the transactional guarantees of the Postgres store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use tradedesk_domain::outbox::OutboxStatus;
use tradedesk_domain::pagination::PageRequest;

use crate::domain::repository::{OutboxStore, UserRepository, VerificationStore};
use crate::domain::types::{
    LoginCredentials, NewOutboxEvent, NewUser, NewVerificationToken, OutboxEvent, ProfileUpdate,
    User, VerificationToken,
};
use crate::error::UsersServiceError;

#[derive(Default)]
struct Tables {
    next_user_id: i64,
    next_token_id: i64,
    next_event_id: i64,
    users: BTreeMap<i64, User>,
    credentials: HashMap<i64, String>,
    tokens: BTreeMap<i64, VerificationToken>,
    outbox: BTreeMap<i64, OutboxEvent>,
}

impl Tables {
    fn user_by_username(&self, username: &str) -> Option<&User> {
        self.users.values().find(|u| u.username == username)
    }

    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }

    fn insert_token(&mut self, user_id: i64, token: &NewVerificationToken) {
        self.next_token_id += 1;
        let id = self.next_token_id;
        self.tokens.insert(
            id,
            VerificationToken {
                id,
                user_id,
                token: token.token.clone(),
                purpose: token.purpose,
                expires_at: token.expires_at,
                consumed_at: None,
                created_at: token.issued_at,
                updated_at: token.issued_at,
            },
        );
    }

    fn insert_event(&mut self, aggregate_id: i64, event: &NewOutboxEvent, now: DateTime<Utc>) {
        self.next_event_id += 1;
        let id = self.next_event_id;
        self.outbox.insert(
            id,
            OutboxEvent {
                id,
                aggregate_id,
                aggregate_type: event.aggregate_type.to_owned(),
                event_type: event.event_type.to_owned(),
                payload: event.payload.clone(),
                status: OutboxStatus::Pending,
                created_at: now,
                updated_at: now,
                processed_at: None,
            },
        );
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, UsersServiceError> {
        self.tables
            .lock()
            .map_err(|_| UsersServiceError::Internal(anyhow::anyhow!("memory store poisoned")))
    }

    /// Snapshot of every outbox row in insertion order.
    pub fn outbox_events(&self) -> Result<Vec<OutboxEvent>, UsersServiceError> {
        Ok(self.lock()?.outbox.values().cloned().collect())
    }

    /// Snapshot of a user's tokens in insertion order.
    pub fn verification_tokens(
        &self,
        user_id: i64,
    ) -> Result<Vec<VerificationToken>, UsersServiceError> {
        Ok(self
            .lock()?
            .tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }
}

impl UserRepository for MemoryStore {
    async fn get_user(&self, username: &str) -> Result<Option<User>, UsersServiceError> {
        Ok(self.lock()?.user_by_username(username).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, UsersServiceError> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn get_credentials(
        &self,
        user_id: i64,
    ) -> Result<Option<LoginCredentials>, UsersServiceError> {
        Ok(self
            .lock()?
            .credentials
            .get(&user_id)
            .map(|hash| LoginCredentials {
                user_id,
                password_hash: hash.clone(),
            }))
    }

    async fn list_users(&self, page: PageRequest) -> Result<(Vec<User>, u64), UsersServiceError> {
        let tables = self.lock()?;
        let mut users: Vec<User> = tables.users.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        let total = users.len() as u64;
        let items = users
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.page_size as usize)
            .collect();
        Ok((items, total))
    }

    async fn update_profile(
        &self,
        username: &str,
        update: &ProfileUpdate,
    ) -> Result<User, UsersServiceError> {
        let mut tables = self.lock()?;
        let id = tables
            .user_by_username(username)
            .map(|u| u.id)
            .ok_or(UsersServiceError::UserNotFound)?;
        if tables.email_taken(&update.email, Some(id)) {
            return Err(UsersServiceError::UserAlreadyExists);
        }
        let user = tables
            .users
            .get_mut(&id)
            .ok_or(UsersServiceError::UserNotFound)?;
        user.email = update.email.clone();
        user.name = update.name.clone();
        user.document_id = update.document_id.clone();
        user.birthday = update.birthday;
        user.gender = update.gender;
        user.permanent_address = update.permanent_address.clone();
        user.phone_number = update.phone_number.clone();
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn update_password(
        &self,
        user_id: i64,
        password_hash: &str,
    ) -> Result<(), UsersServiceError> {
        let mut tables = self.lock()?;
        match tables.credentials.get_mut(&user_id) {
            Some(hash) => {
                *hash = password_hash.to_owned();
                Ok(())
            }
            None => Err(UsersServiceError::UserNotFound),
        }
    }

    async fn delete_user(&self, username: &str) -> Result<(), UsersServiceError> {
        let mut tables = self.lock()?;
        let id = tables
            .user_by_username(username)
            .map(|u| u.id)
            .ok_or(UsersServiceError::UserNotFound)?;
        tables.users.remove(&id);
        tables.credentials.remove(&id);
        tables.tokens.retain(|_, t| t.user_id != id);
        Ok(())
    }
}

impl VerificationStore for MemoryStore {
    async fn create_with_verification(
        &self,
        user: &NewUser,
        password_hash: &str,
        token: &NewVerificationToken,
        event: &NewOutboxEvent,
    ) -> Result<User, UsersServiceError> {
        let mut tables = self.lock()?;
        if tables.user_by_username(&user.username).is_some()
            || tables.email_taken(&user.email, None)
        {
            return Err(UsersServiceError::UserAlreadyExists);
        }

        let now = token.issued_at;
        tables.next_user_id += 1;
        let created = User {
            id: tables.next_user_id,
            username: user.username.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            document_id: user.document_id.clone(),
            birthday: user.birthday,
            gender: user.gender,
            permanent_address: user.permanent_address.clone(),
            phone_number: user.phone_number.clone(),
            verified: false,
            verified_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(created.id, created.clone());
        tables
            .credentials
            .insert(created.id, password_hash.to_owned());
        tables.insert_token(created.id, token);
        tables.insert_event(created.id, event, now);
        Ok(created)
    }

    async fn rotate_verification_token(
        &self,
        user_id: i64,
        token: &NewVerificationToken,
        event: &NewOutboxEvent,
    ) -> Result<(), UsersServiceError> {
        let mut tables = self.lock()?;
        if !tables.users.contains_key(&user_id) {
            return Err(UsersServiceError::UserNotFound);
        }
        let now = token.issued_at;
        for existing in tables.tokens.values_mut() {
            if existing.user_id == user_id && existing.is_active(now) {
                existing.consumed_at = Some(now);
                existing.updated_at = now;
            }
        }
        tables.insert_token(user_id, token);
        tables.insert_event(user_id, event, now);
        Ok(())
    }

    async fn find_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<(VerificationToken, User)>, UsersServiceError> {
        let tables = self.lock()?;
        let Some(found) = tables.tokens.values().find(|t| t.token == token) else {
            return Ok(None);
        };
        Ok(tables
            .users
            .get(&found.user_id)
            .map(|user| (found.clone(), user.clone())))
    }

    async fn get_latest_verification_token(
        &self,
        user_id: i64,
    ) -> Result<Option<VerificationToken>, UsersServiceError> {
        Ok(self
            .lock()?
            .tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .max_by_key(|t| (t.created_at, t.id))
            .cloned())
    }

    async fn verify_with_token(
        &self,
        token_id: i64,
        user_id: i64,
        verified_at: DateTime<Utc>,
    ) -> Result<User, UsersServiceError> {
        let mut tables = self.lock()?;
        if !tables.users.contains_key(&user_id) {
            return Err(UsersServiceError::UserNotFound);
        }
        let token = tables
            .tokens
            .get_mut(&token_id)
            .filter(|t| t.consumed_at.is_none())
            .ok_or(UsersServiceError::TokenAlreadyUsed)?;
        token.consumed_at = Some(verified_at);
        token.updated_at = verified_at;

        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or(UsersServiceError::UserNotFound)?;
        user.verified = true;
        user.verified_at = Some(verified_at);
        user.updated_at = verified_at;
        Ok(user.clone())
    }
}

impl OutboxStore for MemoryStore {
    async fn find_outbox_event(&self, id: i64) -> Result<Option<OutboxEvent>, UsersServiceError> {
        Ok(self.lock()?.outbox.get(&id).cloned())
    }

    async fn update_outbox_status(
        &self,
        id: i64,
        status: OutboxStatus,
    ) -> Result<bool, UsersServiceError> {
        let mut tables = self.lock()?;
        let event = tables
            .outbox
            .get_mut(&id)
            .ok_or(UsersServiceError::OutboxEventNotFound)?;
        if !event.status.can_transition_to(status) {
            return Ok(false);
        }
        let now = Utc::now();
        event.status = status;
        event.updated_at = now;
        if status == OutboxStatus::Processed {
            event.processed_at = Some(now);
        }
        Ok(true)
    }
}
