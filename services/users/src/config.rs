use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::Deserialize;

use tradedesk_core::config::Config;

use crate::infra::broker::JetStreamSettings;
use crate::infra::jwt::JwtSettings;
use crate::infra::mail::{DEFAULT_SMTP_PORT, SmtpSettings};
use crate::usecase::verification::{DEFAULT_RESEND_COOLDOWN_SECS, DEFAULT_TOKEN_TTL_SECS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailProvider {
    Noop,
    Smtp,
}

/// Users service configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct UsersConfig {
    /// PostgreSQL connection URL. Unset selects the in-memory store.
    pub database_url: Option<String>,
    /// TCP port for the HTTP server. Env var: `USERS_PORT`.
    #[serde(default = "default_users_port")]
    pub users_port: u16,
    #[serde(default = "default_token_ttl_secs")]
    pub verification_token_ttl_secs: i64,
    #[serde(default = "default_resend_cooldown_secs")]
    pub resend_cooldown_secs: i64,

    /// NATS server URL. Unset disables the outbox relay.
    pub nats_url: Option<String>,
    #[serde(default = "default_outbox_stream")]
    pub outbox_stream: String,
    #[serde(default = "default_outbox_subject")]
    pub outbox_subject: String,
    #[serde(default = "default_outbox_consumer_group")]
    pub outbox_consumer_group: String,

    #[serde(default = "default_email_provider")]
    pub email_provider: EmailProvider,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    #[serde(default)]
    pub smtp_from: String,
    #[serde(default)]
    pub smtp_tls: bool,
    #[serde(default = "default_smtp_timeout_secs")]
    pub smtp_timeout_secs: u64,
    pub verification_url_base: Option<String>,

    pub access_token_secret: String,
    pub refresh_token_secret: String,
    #[serde(default = "default_access_token_ttl_minutes")]
    pub access_token_ttl_minutes: i64,
    #[serde(default = "default_refresh_token_ttl_minutes")]
    pub refresh_token_ttl_minutes: i64,
    #[serde(default = "default_token_issuer")]
    pub token_issuer: String,
    #[serde(default = "default_token_audience")]
    pub token_audience: String,
}

impl Config for UsersConfig {}

fn default_users_port() -> u16 {
    8080
}

fn default_token_ttl_secs() -> i64 {
    DEFAULT_TOKEN_TTL_SECS
}

fn default_resend_cooldown_secs() -> i64 {
    DEFAULT_RESEND_COOLDOWN_SECS
}

fn default_outbox_stream() -> String {
    "USER_OUTBOX".to_owned()
}

fn default_outbox_subject() -> String {
    "outbox.user".to_owned()
}

fn default_outbox_consumer_group() -> String {
    "email-service".to_owned()
}

fn default_email_provider() -> EmailProvider {
    EmailProvider::Noop
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

fn default_smtp_timeout_secs() -> u64 {
    10
}

fn default_access_token_ttl_minutes() -> i64 {
    15
}

fn default_refresh_token_ttl_minutes() -> i64 {
    4320
}

fn default_token_issuer() -> String {
    "tradedesk".to_owned()
}

fn default_token_audience() -> String {
    "tradedesk-clients".to_owned()
}

/// Longest lifetime or cooldown accepted from the environment (ten years).
const MAX_DURATION_SECS: i64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is out of range")]
    OutOfRange(&'static str),
}

fn bounded(name: &'static str, value: Option<Duration>) -> Result<Duration, ConfigError> {
    value
        .filter(|d| d.num_seconds() <= MAX_DURATION_SECS)
        .ok_or(ConfigError::OutOfRange(name))
}

impl UsersConfig {
    /// Verification token lifetime. Non-positive values fall back to the default.
    pub fn token_ttl(&self) -> Result<Duration, ConfigError> {
        if self.verification_token_ttl_secs <= 0 {
            tracing::warn!(
                value = self.verification_token_ttl_secs,
                "non-positive VERIFICATION_TOKEN_TTL_SECS, using default"
            );
            return Ok(Duration::seconds(DEFAULT_TOKEN_TTL_SECS));
        }
        bounded(
            "VERIFICATION_TOKEN_TTL_SECS",
            Duration::try_seconds(self.verification_token_ttl_secs),
        )
    }

    /// Resend cooldown. Negative values disable it.
    pub fn resend_cooldown(&self) -> Result<Duration, ConfigError> {
        bounded(
            "RESEND_COOLDOWN_SECS",
            Duration::try_seconds(self.resend_cooldown_secs.max(0)),
        )
    }

    pub fn jetstream(&self) -> Option<JetStreamSettings> {
        self.nats_url.as_ref().map(|url| JetStreamSettings {
            url: url.clone(),
            stream: self.outbox_stream.clone(),
            subject: self.outbox_subject.clone(),
            consumer_group: self.outbox_consumer_group.clone(),
        })
    }

    pub fn smtp(&self) -> SmtpSettings {
        SmtpSettings {
            host: self.smtp_host.clone(),
            port: self.smtp_port,
            username: self.smtp_username.clone(),
            password: self.smtp_password.clone(),
            from: self.smtp_from.clone(),
            use_tls: self.smtp_tls,
            timeout: StdDuration::from_secs(self.smtp_timeout_secs),
            verification_url_base: self.verification_url_base.clone(),
        }
    }

    /// Session token settings. Non-positive TTLs pass through and are
    /// rejected by the token issuer.
    pub fn jwt(&self) -> Result<JwtSettings, ConfigError> {
        Ok(JwtSettings {
            access_secret: self.access_token_secret.clone(),
            refresh_secret: self.refresh_token_secret.clone(),
            issuer: self.token_issuer.clone(),
            audience: self.token_audience.clone(),
            access_ttl: bounded(
                "ACCESS_TOKEN_TTL_MINUTES",
                Duration::try_minutes(self.access_token_ttl_minutes),
            )?,
            refresh_ttl: bounded(
                "REFRESH_TOKEN_TTL_MINUTES",
                Duration::try_minutes(self.refresh_token_ttl_minutes),
            )?,
        })
    }
}
