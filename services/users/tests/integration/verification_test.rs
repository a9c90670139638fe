use chrono::Duration;

use tradedesk_domain::outbox::OutboxStatus;
use tradedesk_domain::verification::{VerificationPayload, VerificationPurpose};
use tradedesk_users::domain::repository::{UserRepository, VerificationStore};
use tradedesk_users::error::UsersServiceError;
use tradedesk_users::infra::memory::MemoryStore;
use tradedesk_users::usecase::verification::{
    RegisterInput, RegisterUseCase, ResendVerificationUseCase, VerifyUseCase,
};

use crate::helpers::{alice, latest_token, register, register_with_ttl};

fn resend(store: &MemoryStore, cooldown: Duration) -> ResendVerificationUseCase<MemoryStore> {
    ResendVerificationUseCase {
        repo: store.clone(),
        token_ttl: Duration::hours(24),
        cooldown,
    }
}

fn verify(store: &MemoryStore) -> VerifyUseCase<MemoryStore> {
    VerifyUseCase {
        repo: store.clone(),
    }
}

// ── Register ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_register_unverified_user_with_token_and_pending_outbox_row() {
    let store = MemoryStore::new();
    let user = register(&store, alice()).await;

    assert!(!user.verified);
    assert!(user.verified_at.is_none());

    let tokens = store.verification_tokens(user.id).unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].purpose, VerificationPurpose::Register);
    assert!(tokens[0].consumed_at.is_none());
    assert_eq!(tokens[0].expires_at - tokens[0].created_at, Duration::hours(24));

    let events = store.outbox_events().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, OutboxStatus::Pending);
    assert_eq!(events[0].aggregate_id, user.id);
    assert_eq!(events[0].aggregate_type, "user");
    let payload = VerificationPayload::from_json(&events[0].payload).unwrap();
    assert_eq!(payload.email, "alice@example.com");
    assert_eq!(payload.token, tokens[0].token);
    assert_eq!(payload.purpose, "register");
}

#[tokio::test]
async fn should_store_password_as_hash() {
    let store = MemoryStore::new();
    let user = register(&store, alice()).await;
    let credentials = store.get_credentials(user.id).await.unwrap().unwrap();
    assert_ne!(credentials.password_hash, alice().password);
    assert!(credentials.password_hash.starts_with("$argon2"));
}

#[tokio::test]
async fn should_reject_duplicate_username_or_email_without_side_effects() {
    let store = MemoryStore::new();
    register(&store, alice()).await;
    let usecase = RegisterUseCase {
        repo: store.clone(),
        token_ttl: Duration::hours(24),
    };

    let same_email = RegisterInput {
        username: "alice2".into(),
        ..alice()
    };
    assert!(matches!(
        usecase.execute(same_email).await,
        Err(UsersServiceError::UserAlreadyExists)
    ));
    assert!(matches!(
        usecase.execute(alice()).await,
        Err(UsersServiceError::UserAlreadyExists)
    ));
    assert_eq!(store.outbox_events().unwrap().len(), 1);
}

#[tokio::test]
async fn should_require_username_password_and_email() {
    let usecase = RegisterUseCase {
        repo: MemoryStore::new(),
        token_ttl: Duration::hours(24),
    };
    for input in [
        RegisterInput {
            username: String::new(),
            ..alice()
        },
        RegisterInput {
            password: String::new(),
            ..alice()
        },
        RegisterInput {
            email: String::new(),
            ..alice()
        },
    ] {
        assert!(matches!(
            usecase.execute(input).await,
            Err(UsersServiceError::InvalidInput(_))
        ));
    }
}

// ── Verify ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_verify_once_then_report_token_used() {
    let store = MemoryStore::new();
    let user = register(&store, alice()).await;
    let token = latest_token(&store, user.id);

    let verified = verify(&store).execute(&token).await.unwrap();
    assert!(verified.verified);
    assert!(verified.verified_at.is_some());

    let tokens = store.verification_tokens(user.id).unwrap();
    assert!(tokens[0].consumed_at.is_some());

    assert!(matches!(
        verify(&store).execute(&token).await,
        Err(UsersServiceError::TokenAlreadyUsed)
    ));
}

#[tokio::test]
async fn should_report_expired_token_and_leave_it_unconsumed() {
    let store = MemoryStore::new();
    let user = register_with_ttl(&store, alice(), Duration::seconds(-1)).await;
    let token = latest_token(&store, user.id);

    assert!(matches!(
        verify(&store).execute(&token).await,
        Err(UsersServiceError::TokenExpired)
    ));
    let tokens = store.verification_tokens(user.id).unwrap();
    assert!(tokens[0].consumed_at.is_none());
    let user = store.get_user("alice").await.unwrap().unwrap();
    assert!(!user.verified);
}

#[tokio::test]
async fn should_report_unknown_and_empty_tokens() {
    let store = MemoryStore::new();
    assert!(matches!(
        verify(&store).execute("nope").await,
        Err(UsersServiceError::TokenNotFound)
    ));
    assert!(matches!(
        verify(&store).execute("").await,
        Err(UsersServiceError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn should_let_exactly_one_of_two_racing_verifies_consume_the_token() {
    let store = MemoryStore::new();
    let user = register(&store, alice()).await;
    let token = latest_token(&store, user.id);

    // Both requests look the token up before either consumes it.
    let (first, _) = store.find_verification_token(&token).await.unwrap().unwrap();
    let (second, _) = store.find_verification_token(&token).await.unwrap().unwrap();
    assert!(!first.is_consumed() && !second.is_consumed());

    let now = chrono::Utc::now();
    let a = store.verify_with_token(first.id, user.id, now).await;
    let b = store.verify_with_token(second.id, user.id, now).await;

    assert!(a.unwrap().verified);
    assert!(matches!(b, Err(UsersServiceError::TokenAlreadyUsed)));
    let tokens = store.verification_tokens(user.id).unwrap();
    assert_eq!(tokens[0].consumed_at, Some(now));
}

// ── Resend ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_rotate_token_leaving_exactly_one_active() {
    let store = MemoryStore::new();
    let user = register(&store, alice()).await;
    let old = latest_token(&store, user.id);

    resend(&store, Duration::zero())
        .execute("alice@example.com")
        .await
        .unwrap();

    let tokens = store.verification_tokens(user.id).unwrap();
    assert_eq!(tokens.len(), 2);
    let now = chrono::Utc::now();
    assert_eq!(tokens.iter().filter(|t| t.is_active(now)).count(), 1);
    assert_eq!(tokens[0].token, old);
    assert_eq!(tokens[0].consumed_at, Some(tokens[1].created_at));
    assert_eq!(tokens[1].purpose, VerificationPurpose::Resend);

    let events = store.outbox_events().unwrap();
    assert_eq!(events.len(), 2);
    let payload = VerificationPayload::from_json(&events[1].payload).unwrap();
    assert_eq!(payload.token, tokens[1].token);
    assert_eq!(payload.purpose, "resend");

    // The superseded token can no longer verify; the new one can.
    assert!(matches!(
        verify(&store).execute(&old).await,
        Err(UsersServiceError::TokenAlreadyUsed)
    ));
    verify(&store).execute(&tokens[1].token).await.unwrap();
}

#[tokio::test]
async fn should_refuse_resend_for_verified_user() {
    let store = MemoryStore::new();
    let user = register(&store, alice()).await;
    verify(&store)
        .execute(&latest_token(&store, user.id))
        .await
        .unwrap();

    assert!(matches!(
        resend(&store, Duration::zero())
            .execute("alice@example.com")
            .await,
        Err(UsersServiceError::AlreadyVerified)
    ));
}

#[tokio::test]
async fn should_enforce_cooldown_between_resends() {
    let store = MemoryStore::new();
    register(&store, alice()).await;
    let usecase = resend(&store, Duration::milliseconds(200));

    // A fresh registration token does not count towards the cooldown.
    usecase.execute("alice@example.com").await.unwrap();
    assert!(matches!(
        usecase.execute("alice@example.com").await,
        Err(UsersServiceError::TooFrequent)
    ));

    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    usecase.execute("alice@example.com").await.unwrap();
    assert_eq!(store.outbox_events().unwrap().len(), 3);
}

#[tokio::test]
async fn should_report_unknown_email_on_resend() {
    let store = MemoryStore::new();
    assert!(matches!(
        resend(&store, Duration::zero())
            .execute("ghost@example.com")
            .await,
        Err(UsersServiceError::UserNotFound)
    ));
}
