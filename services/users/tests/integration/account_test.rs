use tradedesk_domain::pagination::PageRequest;
use tradedesk_users::domain::repository::UserRepository;
use tradedesk_users::domain::types::ProfileUpdate;
use tradedesk_users::error::UsersServiceError;
use tradedesk_users::infra::memory::MemoryStore;
use tradedesk_users::usecase::account::{
    ChangePasswordInput, ChangePasswordUseCase, DeleteAccountUseCase, GetUserUseCase,
    ListUsersUseCase, UpdateProfileUseCase,
};
use tradedesk_users::usecase::verification::{RegisterInput, VerifyUseCase};

use crate::helpers::{ALICE_PASSWORD, alice, bob, latest_token, register};

fn profile(email: &str, name: &str) -> ProfileUpdate {
    ProfileUpdate {
        email: email.into(),
        name: name.into(),
        phone_number: "+1 555 0100".into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn should_get_user_or_report_missing() {
    let store = MemoryStore::new();
    register(&store, alice()).await;
    let usecase = GetUserUseCase {
        repo: store.clone(),
    };
    assert_eq!(usecase.execute("alice").await.unwrap().email, "alice@example.com");
    assert!(matches!(
        usecase.execute("ghost").await,
        Err(UsersServiceError::UserNotFound)
    ));
}

#[tokio::test]
async fn should_list_users_ordered_by_username_with_total() {
    let store = MemoryStore::new();
    register(&store, bob()).await;
    register(&store, alice()).await;
    register(
        &store,
        RegisterInput {
            username: "carol".into(),
            email: "carol@example.com".into(),
            ..alice()
        },
    )
    .await;

    let usecase = ListUsersUseCase {
        repo: store.clone(),
    };
    let first = usecase
        .execute(PageRequest {
            page: 1,
            page_size: 2,
        })
        .await
        .unwrap();
    let names: Vec<_> = first.users.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names, ["alice", "bob"]);
    assert_eq!(first.total, 3);

    let second = usecase
        .execute(PageRequest {
            page: 2,
            page_size: 2,
        })
        .await
        .unwrap();
    assert_eq!(second.users.len(), 1);
    assert_eq!(second.users[0].username, "carol");
}

#[tokio::test]
async fn should_update_profile_preserving_identity_and_verification() {
    let store = MemoryStore::new();
    let user = register(&store, alice()).await;
    let verified = VerifyUseCase {
        repo: store.clone(),
    }
    .execute(&latest_token(&store, user.id))
    .await
    .unwrap();

    let updated = UpdateProfileUseCase {
        repo: store.clone(),
    }
    .execute("alice", profile("alice@new.example.com", "Alice Liddell"))
    .await
    .unwrap();

    assert_eq!(updated.id, user.id);
    assert_eq!(updated.username, "alice");
    assert_eq!(updated.email, "alice@new.example.com");
    assert_eq!(updated.phone_number, "+1 555 0100");
    assert!(updated.verified);
    assert_eq!(updated.verified_at, verified.verified_at);
    assert_eq!(updated.created_at, user.created_at);
}

#[tokio::test]
async fn should_reject_profile_email_owned_by_another_user() {
    let store = MemoryStore::new();
    register(&store, alice()).await;
    register(&store, bob()).await;
    let result = UpdateProfileUseCase {
        repo: store.clone(),
    }
    .execute("alice", profile("bob@example.com", "Alice"))
    .await;
    assert!(matches!(result, Err(UsersServiceError::UserAlreadyExists)));
}

#[tokio::test]
async fn should_change_password_only_with_current_password() {
    let store = MemoryStore::new();
    let user = register(&store, alice()).await;
    let usecase = ChangePasswordUseCase {
        repo: store.clone(),
    };

    let wrong = usecase
        .execute(
            "alice",
            ChangePasswordInput {
                current_password: "nope".into(),
                new_password: "new-password-123".into(),
            },
        )
        .await;
    assert!(matches!(wrong, Err(UsersServiceError::InvalidCredentials)));

    let before = store.get_credentials(user.id).await.unwrap().unwrap();
    usecase
        .execute(
            "alice",
            ChangePasswordInput {
                current_password: ALICE_PASSWORD.into(),
                new_password: "new-password-123".into(),
            },
        )
        .await
        .unwrap();
    let after = store.get_credentials(user.id).await.unwrap().unwrap();
    assert_ne!(before.password_hash, after.password_hash);
}

#[tokio::test]
async fn should_delete_account_with_its_tokens() {
    let store = MemoryStore::new();
    let user = register(&store, alice()).await;
    let usecase = DeleteAccountUseCase {
        repo: store.clone(),
    };

    usecase.execute("alice").await.unwrap();

    assert!(store.get_user("alice").await.unwrap().is_none());
    assert!(store.get_credentials(user.id).await.unwrap().is_none());
    assert!(store.verification_tokens(user.id).unwrap().is_empty());
    assert!(matches!(
        usecase.execute("alice").await,
        Err(UsersServiceError::UserNotFound)
    ));
}
