use chrono::{DateTime, Utc};

use tradedesk_domain::outbox::{AGGREGATE_USER, OutboxStatus};
use tradedesk_domain::verification::{VerificationPayload, VerificationPurpose};

/// User profile owned by the users service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub name: String,
    pub document_id: String,
    pub birthday: Option<DateTime<Utc>>,
    pub gender: bool,
    pub permanent_address: String,
    pub phone_number: String,
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile fields supplied at registration. The store assigns `id` and timestamps.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub name: String,
    pub document_id: String,
    pub birthday: Option<DateTime<Utc>>,
    pub gender: bool,
    pub permanent_address: String,
    pub phone_number: String,
}

/// Replacement profile for an existing user. Identity and verification state are untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub email: String,
    pub name: String,
    pub document_id: String,
    pub birthday: Option<DateTime<Utc>>,
    pub gender: bool,
    pub permanent_address: String,
    pub phone_number: String,
}

/// Password login method attached to a user.
#[derive(Debug, Clone)]
pub struct LoginCredentials {
    pub user_id: i64,
    pub password_hash: String,
}

/// Stored email verification token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationToken {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub purpose: VerificationPurpose,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VerificationToken {
    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_consumed() && self.expires_at > now
    }
}

/// Token to insert. `issued_at` becomes `created_at` and, on rotation,
/// the `consumed_at` of the token it supersedes.
#[derive(Debug, Clone)]
pub struct NewVerificationToken {
    pub token: String,
    pub purpose: VerificationPurpose,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Outbox row as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEvent {
    pub id: i64,
    pub aggregate_id: i64,
    pub aggregate_type: String,
    pub event_type: String,
    pub payload: String,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Outbox row to append. The aggregate id is the owning user's id, filled in by the store.
#[derive(Debug, Clone)]
pub struct NewOutboxEvent {
    pub aggregate_type: &'static str,
    pub event_type: &'static str,
    pub payload: String,
}

impl NewOutboxEvent {
    pub fn verification(
        payload: &VerificationPayload,
        purpose: VerificationPurpose,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            aggregate_type: AGGREGATE_USER,
            event_type: purpose.event_type(),
            payload: payload.to_json()?,
        })
    }
}

/// Identity carried by a validated session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    pub user_id: i64,
    pub username: String,
}

/// Access/refresh pair returned by login and refresh.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}
