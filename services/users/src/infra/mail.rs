//! Verification email delivery.

#![allow(async_fn_in_trait)]

use std::time::Duration;

use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// Default SMTP submission port.
pub const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("smtp transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
    #[error("email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("email build error: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("smtp {0} is required")]
    MissingSetting(&'static str),
}

/// Capability the outbox relay uses to deliver verification tokens.
pub trait VerificationMailer: Send + Sync {
    async fn send_verification_email(
        &self,
        recipient: &str,
        token: &str,
        purpose: &str,
    ) -> Result<(), MailError>;
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    /// Implicit TLS from the first byte. Off means a plain connection.
    pub use_tls: bool,
    pub timeout: Duration,
    /// Prefix the URL-escaped token is appended to, e.g. `https://host/users/verify?token=`.
    pub verification_url_base: Option<String>,
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    verification_url_base: Option<String>,
}

impl SmtpMailer {
    pub fn new(settings: SmtpSettings) -> Result<Self, MailError> {
        if settings.host.is_empty() {
            return Err(MailError::MissingSetting("host"));
        }
        if settings.from.is_empty() {
            return Err(MailError::MissingSetting("from address"));
        }
        let from = settings.from.parse::<Mailbox>()?;

        let builder = if settings.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
        };
        let mut builder = builder
            .port(settings.port)
            .timeout(Some(settings.timeout));
        if let Some(username) = settings.username.filter(|u| !u.is_empty()) {
            let password = settings.password.unwrap_or_default();
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            verification_url_base: settings.verification_url_base.filter(|b| !b.is_empty()),
        })
    }
}

impl VerificationMailer for SmtpMailer {
    async fn send_verification_email(
        &self,
        recipient: &str,
        token: &str,
        purpose: &str,
    ) -> Result<(), MailError> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(recipient.parse()?)
            .subject(subject(purpose))
            .header(ContentType::TEXT_PLAIN)
            .body(body(token, self.verification_url_base.as_deref()))?;
        self.transport.send(email).await?;
        tracing::info!(purpose, "verification email sent");
        Ok(())
    }
}

/// Accepts every message without sending anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMailer;

impl VerificationMailer for NoopMailer {
    async fn send_verification_email(
        &self,
        _recipient: &str,
        _token: &str,
        purpose: &str,
    ) -> Result<(), MailError> {
        tracing::debug!(purpose, "noop mailer dropped verification email");
        Ok(())
    }
}

/// Email provider chosen at config-load time.
pub enum Mailer {
    Smtp(SmtpMailer),
    Noop(NoopMailer),
}

impl Mailer {
    pub fn provider(&self) -> &'static str {
        match self {
            Self::Smtp(_) => "smtp",
            Self::Noop(_) => "noop",
        }
    }
}

impl VerificationMailer for Mailer {
    async fn send_verification_email(
        &self,
        recipient: &str,
        token: &str,
        purpose: &str,
    ) -> Result<(), MailError> {
        match self {
            Self::Smtp(m) => m.send_verification_email(recipient, token, purpose).await,
            Self::Noop(m) => m.send_verification_email(recipient, token, purpose).await,
        }
    }
}

fn subject(purpose: &str) -> String {
    if purpose.is_empty() || purpose == "register" {
        "Verify your account".to_owned()
    } else {
        format!("User verification ({purpose})")
    }
}

fn body(token: &str, url_base: Option<&str>) -> String {
    let link = url_base
        .map(|base| {
            let escaped: String = url::form_urlencoded::byte_serialize(token.as_bytes()).collect();
            format!("Link: {base}{escaped}")
        })
        .unwrap_or_default();
    format!(
        "Hello,\n\nPlease verify your account using the information below:\n\nToken: {token}\n{link}\n\nThank you.\n"
    )
}
