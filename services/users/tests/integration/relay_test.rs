use tokio_util::sync::CancellationToken;

use tradedesk_domain::outbox::OutboxStatus;
use tradedesk_domain::verification::VerificationPayload;
use tradedesk_users::infra::mail::NoopMailer;
use tradedesk_users::infra::memory::MemoryStore;
use tradedesk_users::relay::{BrokerError, HandleOutcome, OutboxRelay, RelayError};

use crate::helpers::{
    ChannelSource, RecordingMailer, alice, bob, envelope_body, latest_token, raw_body, register,
    unreachable_smtp,
};

fn relay<M>(
    store: &MemoryStore,
    source: ChannelSource,
    mailer: M,
) -> OutboxRelay<ChannelSource, MemoryStore, M>
where
    M: tradedesk_users::infra::mail::VerificationMailer,
{
    OutboxRelay {
        source,
        outbox: store.clone(),
        mailer,
    }
}

// ── End to end ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_deliver_registration_email_and_mark_processed() {
    let store = MemoryStore::new();
    let user = register(&store, alice()).await;
    let token = latest_token(&store, user.id);
    let event = store.outbox_events().unwrap().remove(0);

    let source = ChannelSource::with_messages(vec![raw_body(&event)]);
    let committed = source.committed.clone();
    let mailer = RecordingMailer::default();

    relay(&store, source, mailer.clone())
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        mailer.sent(),
        vec![(
            "alice@example.com".to_string(),
            token,
            "register".to_string()
        )]
    );
    let row = store.outbox_events().unwrap().remove(0);
    assert_eq!(row.status, OutboxStatus::Processed);
    assert!(row.processed_at.is_some());
    assert_eq!(*committed.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn should_mark_failed_and_still_commit_when_transport_fails() {
    let store = MemoryStore::new();
    register(&store, alice()).await;
    let event = store.outbox_events().unwrap().remove(0);

    let source = ChannelSource::with_messages(vec![raw_body(&event)]);
    let committed = source.committed.clone();

    relay(&store, source, unreachable_smtp())
        .run(CancellationToken::new())
        .await
        .unwrap();

    let row = store.outbox_events().unwrap().remove(0);
    assert_eq!(row.status, OutboxStatus::Failed);
    assert!(row.processed_at.is_none());
    assert_eq!(*committed.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn should_unwrap_change_capture_envelope() {
    let store = MemoryStore::new();
    register(&store, bob()).await;
    let event = store.outbox_events().unwrap().remove(0);
    let mailer = RecordingMailer::default();

    let relay = relay(&store, ChannelSource::with_messages(vec![]), mailer.clone());
    let outcome = relay.handle(&envelope_body(&event)).await.unwrap();

    assert_eq!(outcome, HandleOutcome::Processed);
    assert_eq!(mailer.sent()[0].0, "bob@example.com");
}

#[tokio::test]
async fn should_commit_every_message_whatever_the_outcome() {
    let store = MemoryStore::new();
    register(&store, alice()).await;
    let event = store.outbox_events().unwrap().remove(0);

    let source = ChannelSource::with_messages(vec![
        b"not json".to_vec(),
        raw_body(&event),
        br#"{"id":999,"payload":"{\"email\":\"x@example.com\",\"token\":\"t\"}"}"#.to_vec(),
    ]);
    let committed = source.committed.clone();
    let mailer = RecordingMailer::default();

    relay(&store, source, mailer.clone())
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(*committed.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(mailer.sent().len(), 1);
}

// ── Skips ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_skip_payload_without_email_or_token() {
    let store = MemoryStore::new();
    register(&store, alice()).await;
    let mut event = store.outbox_events().unwrap().remove(0);
    let mut payload = VerificationPayload::from_json(&event.payload).unwrap();
    payload.token.clear();
    event.payload = payload.to_json().unwrap();
    let mailer = RecordingMailer::default();

    let relay = relay(&store, ChannelSource::with_messages(vec![]), mailer.clone());
    let outcome = relay.handle(&raw_body(&event)).await.unwrap();

    assert_eq!(outcome, HandleOutcome::Skipped);
    assert!(mailer.sent().is_empty());
    let row = store.outbox_events().unwrap().remove(0);
    assert_eq!(row.status, OutboxStatus::Pending);
}

#[tokio::test]
async fn should_not_resend_after_redelivery() {
    let store = MemoryStore::new();
    register(&store, alice()).await;
    let event = store.outbox_events().unwrap().remove(0);
    let mailer = RecordingMailer::default();
    let relay = relay(&store, ChannelSource::with_messages(vec![]), mailer.clone());

    assert_eq!(
        relay.handle(&raw_body(&event)).await.unwrap(),
        HandleOutcome::Processed
    );
    // Same pending snapshot delivered again, and the status-write echo.
    assert_eq!(
        relay.handle(&raw_body(&event)).await.unwrap(),
        HandleOutcome::Skipped
    );
    let echoed = store.outbox_events().unwrap().remove(0);
    assert_eq!(
        relay.handle(&raw_body(&echoed)).await.unwrap(),
        HandleOutcome::Skipped
    );

    assert_eq!(mailer.sent().len(), 1);
    let row = store.outbox_events().unwrap().remove(0);
    assert_eq!(row.status, OutboxStatus::Processed);
}

#[tokio::test]
async fn should_skip_rows_missing_from_the_store() {
    let store = MemoryStore::new();
    let mailer = RecordingMailer::default();
    let relay = relay(&store, ChannelSource::with_messages(vec![]), mailer.clone());
    let body = br#"{"id":42,"payload":"{\"email\":\"a@example.com\",\"token\":\"t\",\"purpose\":\"register\"}","status":"pending"}"#;
    assert_eq!(relay.handle(body).await.unwrap(), HandleOutcome::Skipped);
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn should_report_decode_errors_from_handle() {
    let store = MemoryStore::new();
    let relay = relay(&store, ChannelSource::with_messages(vec![]), NoopMailer);
    assert!(matches!(
        relay.handle(b"{").await,
        Err(RelayError::Decode(_))
    ));
    assert!(matches!(
        relay.handle(br#"{"id":1,"payload":"not json"}"#).await,
        Err(RelayError::Decode(_))
    ));
}

// ── Shutdown ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_stop_cleanly_when_cancelled() {
    let store = MemoryStore::new();
    let (_feed, source) = ChannelSource::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    relay(&store, source, NoopMailer)
        .run(cancel)
        .await
        .unwrap();
}

#[tokio::test]
async fn should_return_fatal_fetch_errors() {
    let store = MemoryStore::new();
    let (feed, source) = ChannelSource::new();
    feed.send(Err(BrokerError::Fetch("connection reset".into())))
        .unwrap();

    let result = relay(&store, source, NoopMailer)
        .run(CancellationToken::new())
        .await;

    assert!(matches!(result, Err(RelayError::Broker(BrokerError::Fetch(_)))));
}
