//! Email verification types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Why a verification token was issued.
///
/// Wire format: lowercase string (`"register"`, `"resend"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationPurpose {
    Register,
    Resend,
}

impl VerificationPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Resend => "resend",
        }
    }

    /// Outbox event type emitted when a token with this purpose is issued.
    pub fn event_type(self) -> &'static str {
        match self {
            Self::Register => "user.verification.register",
            Self::Resend => "user.verification.resend",
        }
    }
}

impl fmt::Display for VerificationPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown verification purpose: {0}")]
pub struct UnknownPurpose(pub String);

impl FromStr for VerificationPurpose {
    type Err = UnknownPurpose;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "register" => Ok(Self::Register),
            "resend" => Ok(Self::Resend),
            other => Err(UnknownPurpose(other.to_owned())),
        }
    }
}

/// Body of a verification outbox event, stored as a JSON string in the outbox row.
///
/// `purpose` stays a plain string so the relay can forward purposes it does not know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationPayload {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub purpose: String,
}

impl VerificationPayload {
    pub fn new(email: &str, token: &str, purpose: VerificationPurpose) -> Self {
        Self {
            email: email.to_owned(),
            token: token.to_owned(),
            purpose: purpose.as_str().to_owned(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// A payload missing either the recipient or the token cannot be delivered.
    pub fn is_deliverable(&self) -> bool {
        !self.email.is_empty() && !self.token.is_empty()
    }
}
