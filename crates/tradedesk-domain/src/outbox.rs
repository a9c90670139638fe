//! Outbox event status and aggregate constants.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Aggregate type recorded on every user-originated outbox row.
pub const AGGREGATE_USER: &str = "user";

/// Delivery status of an outbox row.
///
/// Transitions only move forward: `Pending → Processed` or `Pending → Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Processed,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether a row in `self` may be moved to `next`.
    pub fn can_transition_to(self, next: OutboxStatus) -> bool {
        self == Self::Pending && next.is_terminal()
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown outbox status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OutboxStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}
