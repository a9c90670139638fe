use chrono::Duration;

use crate::infra::jwt::JwtTokenIssuer;
use crate::infra::store::Store;
use crate::usecase::verification::{DEFAULT_RESEND_COOLDOWN_SECS, DEFAULT_TOKEN_TTL_SECS};

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub tokens: JwtTokenIssuer,
    pub token_ttl: Duration,
    pub resend_cooldown: Duration,
}

impl AppState {
    /// State with the default verification token lifetime and resend cooldown.
    pub fn new(store: Store, tokens: JwtTokenIssuer) -> Self {
        Self {
            store,
            tokens,
            token_ttl: Duration::seconds(DEFAULT_TOKEN_TTL_SECS),
            resend_cooldown: Duration::seconds(DEFAULT_RESEND_COOLDOWN_SECS),
        }
    }

    pub fn user_repo(&self) -> Store {
        self.store.clone()
    }

    pub fn token_issuer(&self) -> JwtTokenIssuer {
        self.tokens.clone()
    }
}
