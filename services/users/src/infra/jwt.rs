//! HS256 session tokens.
//!
//! Access and refresh tokens are signed with separate secrets so one can never
//! be presented as the other. Refresh tokens carry a random `jti`; revoked ids
//! sit in an in-process deny-list until their natural expiry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::repository::TokenIssuer;
use crate::domain::types::{IssuedTokens, SessionClaims, User};
use crate::error::UsersServiceError;

/// Shortest HMAC secret accepted for either token kind.
pub const MIN_SECRET_LEN: usize = 32;

const LEEWAY_SECS: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum JwtConfigError {
    #[error("{0} secret must be at least {MIN_SECRET_LEN} characters")]
    SecretTooShort(&'static str),
    #[error("token ttl must be positive")]
    NonPositiveTtl,
}

#[derive(Debug, Clone)]
pub struct JwtSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    uid: i64,
    iss: String,
    aud: String,
    iat: i64,
    exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    jti: Option<String>,
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

struct Inner {
    access: Keys,
    refresh: Keys,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    revoked: Mutex<HashMap<String, i64>>,
}

#[derive(Clone)]
pub struct JwtTokenIssuer {
    inner: Arc<Inner>,
}

impl JwtTokenIssuer {
    pub fn new(settings: JwtSettings) -> Result<Self, JwtConfigError> {
        if settings.access_secret.len() < MIN_SECRET_LEN {
            return Err(JwtConfigError::SecretTooShort("access"));
        }
        if settings.refresh_secret.len() < MIN_SECRET_LEN {
            return Err(JwtConfigError::SecretTooShort("refresh"));
        }
        if settings.access_ttl <= Duration::zero() || settings.refresh_ttl <= Duration::zero() {
            return Err(JwtConfigError::NonPositiveTtl);
        }
        Ok(Self {
            inner: Arc::new(Inner {
                access: Keys::new(&settings.access_secret),
                refresh: Keys::new(&settings.refresh_secret),
                issuer: settings.issuer,
                audience: settings.audience,
                access_ttl: settings.access_ttl,
                refresh_ttl: settings.refresh_ttl,
                revoked: Mutex::new(HashMap::new()),
            }),
        })
    }

    fn sign(
        &self,
        keys: &Keys,
        user: &User,
        now: DateTime<Utc>,
        ttl: Duration,
        jti: Option<String>,
    ) -> Result<(String, DateTime<Utc>), UsersServiceError> {
        let expires_at = now + ttl;
        let claims = Claims {
            sub: user.username.clone(),
            uid: user.id,
            iss: self.inner.issuer.clone(),
            aud: self.inner.audience.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| UsersServiceError::Internal(e.into()))?;
        Ok((token, expires_at))
    }

    fn verify(&self, keys: &Keys, token: &str) -> Result<Claims, UsersServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY_SECS;
        validation.set_issuer(&[self.inner.issuer.as_str()]);
        validation.set_audience(&[self.inner.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        let data = decode::<Claims>(token, &keys.decoding, &validation)
            .map_err(|_| UsersServiceError::InvalidToken)?;
        Ok(data.claims)
    }

    fn is_revoked(&self, jti: &str) -> Result<bool, UsersServiceError> {
        let revoked = self
            .inner
            .revoked
            .lock()
            .map_err(|_| anyhow::anyhow!("revocation list poisoned"))?;
        Ok(revoked.contains_key(jti))
    }
}

impl TokenIssuer for JwtTokenIssuer {
    fn issue(&self, user: &User) -> Result<IssuedTokens, UsersServiceError> {
        let now = Utc::now();
        let (access_token, access_expires_at) =
            self.sign(&self.inner.access, user, now, self.inner.access_ttl, None)?;
        let (refresh_token, refresh_expires_at) = self.sign(
            &self.inner.refresh,
            user,
            now,
            self.inner.refresh_ttl,
            Some(Uuid::new_v4().to_string()),
        )?;
        Ok(IssuedTokens {
            access_token,
            access_expires_at,
            refresh_token,
            refresh_expires_at,
        })
    }

    fn validate_access(&self, token: &str) -> Result<SessionClaims, UsersServiceError> {
        let claims = self.verify(&self.inner.access, token)?;
        Ok(SessionClaims {
            user_id: claims.uid,
            username: claims.sub,
        })
    }

    fn validate_refresh(&self, token: &str) -> Result<SessionClaims, UsersServiceError> {
        let claims = self.verify(&self.inner.refresh, token)?;
        let jti = claims.jti.ok_or(UsersServiceError::InvalidToken)?;
        if self.is_revoked(&jti)? {
            return Err(UsersServiceError::InvalidToken);
        }
        Ok(SessionClaims {
            user_id: claims.uid,
            username: claims.sub,
        })
    }

    fn revoke(&self, refresh_token: &str) -> Result<(), UsersServiceError> {
        let claims = self.verify(&self.inner.refresh, refresh_token)?;
        let jti = claims.jti.ok_or(UsersServiceError::InvalidToken)?;
        let now = Utc::now().timestamp();
        let mut revoked = self
            .inner
            .revoked
            .lock()
            .map_err(|_| anyhow::anyhow!("revocation list poisoned"))?;
        revoked.retain(|_, exp| *exp + LEEWAY_SECS as i64 >= now);
        // Check and insert under one lock so a refresh token is spent at most once.
        if revoked.insert(jti, claims.exp).is_some() {
            return Err(UsersServiceError::InvalidToken);
        }
        tracing::debug!(user_id = claims.uid, "refresh token revoked");
        Ok(())
    }
}
