//! Outbox relay: consumes outbox rows published to the broker, sends the
//! verification email, and writes the delivery status back to the outbox.
//!
//! Every fetched message is acknowledged once handled, whatever the outcome.
//! A failed send is recorded as `failed` on the row; it is not retried here.

#![allow(async_fn_in_trait)]

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use tradedesk_domain::outbox::OutboxStatus;
use tradedesk_domain::verification::VerificationPayload;

use crate::domain::repository::OutboxStore;
use crate::error::UsersServiceError;
use crate::infra::mail::VerificationMailer;

// ── Broker seam ──────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("connect to broker: {0}")]
    Connect(String),
    #[error("set up consumer: {0}")]
    Setup(String),
    #[error("fetch message: {0}")]
    Fetch(String),
    #[error("acknowledge message: {0}")]
    Commit(String),
}

/// One fetched message plus the handle used to acknowledge it.
pub struct Delivery<A> {
    pub body: Vec<u8>,
    pub ack: A,
}

/// Durable consumer-group subscription.
pub trait MessageSource: Send {
    type Ack: Send;

    /// Next message, or `None` once the subscription has been closed.
    async fn fetch(&mut self) -> Result<Option<Delivery<Self::Ack>>, BrokerError>;

    async fn commit(&mut self, ack: Self::Ack) -> Result<(), BrokerError>;
}

// ── Decoding ─────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("message is not an outbox record: {0}")]
    Record(#[from] serde_json::Error),
    #[error("outbox payload is not valid json: {0}")]
    Payload(#[source] serde_json::Error),
}

/// Outbox row as published by change capture.
#[derive(Debug, Clone, Deserialize)]
pub struct OutboxRecord {
    pub id: i64,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub aggregate_id: Option<i64>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub created_at: Option<serde_json::Value>,
    #[serde(default)]
    pub updated_at: Option<serde_json::Value>,
}

impl OutboxRecord {
    /// Status carried by the message itself, if it names a known one.
    fn published_status(&self) -> Option<OutboxStatus> {
        self.status.as_deref().and_then(|s| s.parse().ok())
    }
}

/// Decode a raw record or a `{schema, payload}` change-capture envelope.
///
/// Only an object-valued `payload` marks an envelope; a raw record's `payload`
/// is the serialized event body and therefore a string.
pub fn decode_outbox_message(body: &[u8]) -> Result<OutboxRecord, DecodeError> {
    let mut value: serde_json::Value = serde_json::from_slice(body)?;
    if let Some(inner) = value
        .get_mut("payload")
        .filter(|inner| inner.is_object())
        .map(serde_json::Value::take)
    {
        value = inner;
    }
    Ok(serde_json::from_value(value)?)
}

// ── Relay ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("outbox store: {0}")]
    Store(#[from] UsersServiceError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    Processed,
    Failed,
    Skipped,
}

pub struct OutboxRelay<S, O, M>
where
    S: MessageSource,
    O: OutboxStore,
    M: VerificationMailer,
{
    pub source: S,
    pub outbox: O,
    pub mailer: M,
}

impl<S, O, M> OutboxRelay<S, O, M>
where
    S: MessageSource,
    O: OutboxStore,
    M: VerificationMailer,
{
    /// Consume until cancelled or the subscription closes. Any other fetch
    /// failure ends the loop with an error for the supervisor.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), RelayError> {
        tracing::info!("outbox relay started");
        loop {
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("outbox relay stopping");
                    return Ok(());
                }
                fetched = self.source.fetch() => fetched,
            };
            let delivery = match fetched {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    tracing::info!("outbox subscription closed");
                    return Ok(());
                }
                Err(e) => {
                    tracing::error!(error = %e, "outbox fetch failed");
                    return Err(e.into());
                }
            };

            match self.handle(&delivery.body).await {
                Ok(outcome) => tracing::debug!(?outcome, "outbox message handled"),
                Err(e) => tracing::error!(error = %e, "outbox message handling failed"),
            }
            if let Err(e) = self.source.commit(delivery.ack).await {
                tracing::error!(error = %e, "outbox message commit failed");
            }
        }
    }

    pub async fn handle(&self, body: &[u8]) -> Result<HandleOutcome, RelayError> {
        let record = decode_outbox_message(body)?;
        let event_id = record.id;
        let payload =
            VerificationPayload::from_json(&record.payload).map_err(DecodeError::Payload)?;
        if !payload.is_deliverable() {
            tracing::warn!(event_id, "outbox payload missing email or token, skipping");
            return Ok(HandleOutcome::Skipped);
        }

        // Change capture re-publishes the row after every status write.
        if record.published_status().is_some_and(OutboxStatus::is_terminal) {
            tracing::debug!(event_id, "terminal outbox row echoed, skipping");
            return Ok(HandleOutcome::Skipped);
        }
        match self.outbox.find_outbox_event(event_id).await? {
            Some(row) if row.status.is_terminal() => {
                tracing::debug!(event_id, status = %row.status, "outbox row already settled, skipping");
                return Ok(HandleOutcome::Skipped);
            }
            Some(_) => {}
            None => {
                tracing::warn!(event_id, "outbox row not found, skipping");
                return Ok(HandleOutcome::Skipped);
            }
        }

        let sent = self
            .mailer
            .send_verification_email(&payload.email, &payload.token, &payload.purpose)
            .await;
        match sent {
            Ok(()) => {
                self.settle(event_id, OutboxStatus::Processed).await?;
                tracing::info!(event_id, purpose = %payload.purpose, "verification email delivered");
                Ok(HandleOutcome::Processed)
            }
            Err(e) => {
                tracing::warn!(event_id, error = %e, "verification email failed");
                self.settle(event_id, OutboxStatus::Failed).await?;
                Ok(HandleOutcome::Failed)
            }
        }
    }

    async fn settle(&self, event_id: i64, status: OutboxStatus) -> Result<(), RelayError> {
        if !self.outbox.update_outbox_status(event_id, status).await? {
            tracing::debug!(event_id, %status, "outbox row settled concurrently");
        }
        Ok(())
    }
}
