use axum::http::{HeaderValue, StatusCode, header};
use axum_test::{TestResponse, TestServer};
use sea_orm::DatabaseConnection;
use serde_json::{Value, json};

use tradedesk_users::infra::memory::MemoryStore;
use tradedesk_users::infra::store::Store;
use tradedesk_users::router::build_router;
use tradedesk_users::state::AppState;

use crate::helpers::{ALICE_PASSWORD, jwt_issuer, latest_token};

struct TestApp {
    server: TestServer,
    store: MemoryStore,
}

fn app() -> TestApp {
    let store = MemoryStore::new();
    let state = AppState::new(Store::Memory(store.clone()), jwt_issuer());
    TestApp {
        server: TestServer::new(build_router(state)).unwrap(),
        store,
    }
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
}

fn assert_error(response: &TestResponse, status: StatusCode, kind: &str) {
    assert_eq!(response.status_code(), status);
    assert_eq!(response.json::<Value>()["kind"], kind);
}

impl TestApp {
    async fn register(&self, username: &str, email: &str) -> Value {
        let response = self
            .server
            .post("/users")
            .json(&json!({
                "username": username,
                "password": ALICE_PASSWORD,
                "email": email,
                "name": username,
            }))
            .await;
        assert_eq!(response.status_code(), StatusCode::CREATED);
        response.json::<Value>()
    }

    /// Register, verify through the emailed link and log in. Returns the access token.
    async fn signed_in(&self, username: &str, email: &str) -> String {
        let user = self.register(username, email).await;
        let id = user["id"].as_i64().unwrap();
        let response = self
            .server
            .get("/users/verify")
            .add_query_param("token", latest_token(&self.store, id))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);

        let login = self
            .server
            .post("/auth/login")
            .json(&json!({"username": username, "password": ALICE_PASSWORD}))
            .await;
        assert_eq!(login.status_code(), StatusCode::OK);
        login.json::<Value>()["access_token"]
            .as_str()
            .unwrap()
            .to_owned()
    }
}

// ── Health ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_answer_health_checks_with_request_id() {
    let app = app();
    let response = app.server.get("/healthz").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(app.server.get("/readyz").await.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn should_report_unready_when_database_is_unreachable() {
    let store = Store::postgres(DatabaseConnection::default());
    let state = AppState::new(store, jwt_issuer());
    let server = TestServer::new(build_router(state)).unwrap();

    assert_eq!(server.get("/healthz").await.status_code(), StatusCode::OK);
    assert_eq!(
        server.get("/readyz").await.status_code(),
        StatusCode::SERVICE_UNAVAILABLE
    );
}

// ── Registration and verification ────────────────────────────────────────────

#[tokio::test]
async fn should_register_and_verify_over_http() {
    let app = app();
    let user = app.register("alice", "alice@example.com").await;
    assert_eq!(user["username"], "alice");
    assert_eq!(user["verified"], false);
    assert_eq!(user["verified_at"], Value::Null);

    let token = latest_token(&app.store, user["id"].as_i64().unwrap());
    let response = app
        .server
        .post("/users/verify")
        .json(&json!({"token": token}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let verified = response.json::<Value>();
    assert_eq!(verified["verified"], true);
    assert!(verified["verified_at"].is_string());

    let again = app
        .server
        .post("/users/verify")
        .json(&json!({"token": token}))
        .await;
    assert_error(&again, StatusCode::CONFLICT, "TOKEN_ALREADY_USED");
}

#[tokio::test]
async fn should_map_registration_errors() {
    let app = app();
    app.register("alice", "alice@example.com").await;

    let duplicate = app
        .server
        .post("/users")
        .json(&json!({"username": "alice", "password": "pw", "email": "other@example.com"}))
        .await;
    assert_error(&duplicate, StatusCode::CONFLICT, "USER_ALREADY_EXISTS");

    let missing = app
        .server
        .post("/users")
        .json(&json!({"username": "", "password": "pw", "email": "x@example.com"}))
        .await;
    assert_error(&missing, StatusCode::BAD_REQUEST, "INVALID_INPUT");
}

#[tokio::test]
async fn should_accept_resend_then_throttle() {
    let app = app();
    app.register("alice", "alice@example.com").await;

    let first = app
        .server
        .post("/users/verification/resend")
        .json(&json!({"email": "alice@example.com"}))
        .await;
    assert_eq!(first.status_code(), StatusCode::ACCEPTED);

    let second = app
        .server
        .post("/users/verification/resend")
        .json(&json!({"email": "alice@example.com"}))
        .await;
    assert_error(&second, StatusCode::TOO_MANY_REQUESTS, "TOO_FREQUENT");
}

#[tokio::test]
async fn should_report_unknown_verification_token() {
    let app = app();
    let response = app
        .server
        .get("/users/verify")
        .add_query_param("token", "missing")
        .await;
    assert_error(&response, StatusCode::NOT_FOUND, "TOKEN_NOT_FOUND");
}

// ── Sessions ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_refuse_login_until_verified() {
    let app = app();
    app.register("alice", "alice@example.com").await;
    let response = app
        .server
        .post("/auth/login")
        .json(&json!({"username": "alice", "password": ALICE_PASSWORD}))
        .await;
    assert_error(&response, StatusCode::FORBIDDEN, "NOT_VERIFIED");
}

#[tokio::test]
async fn should_refresh_and_logout() {
    let app = app();
    app.signed_in("alice", "alice@example.com").await;
    let login = app
        .server
        .post("/auth/login")
        .json(&json!({"username": "alice", "password": ALICE_PASSWORD}))
        .await
        .json::<Value>();
    assert_eq!(login["user"]["username"], "alice");
    let refresh_token = login["refresh_token"].as_str().unwrap();

    let refreshed = app
        .server
        .post("/auth/refresh")
        .json(&json!({"refresh_token": refresh_token}))
        .await;
    assert_eq!(refreshed.status_code(), StatusCode::OK);
    let renewed = refreshed.json::<Value>()["refresh_token"]
        .as_str()
        .unwrap()
        .to_owned();

    let logout = app
        .server
        .post("/auth/logout")
        .json(&json!({"refresh_token": renewed}))
        .await;
    assert_eq!(logout.status_code(), StatusCode::NO_CONTENT);

    let reuse = app
        .server
        .post("/auth/refresh")
        .json(&json!({"refresh_token": renewed}))
        .await;
    assert_error(&reuse, StatusCode::UNAUTHORIZED, "INVALID_TOKEN");
}

// ── Accounts ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_require_bearer_token_for_accounts() {
    let app = app();
    app.register("alice", "alice@example.com").await;

    let anonymous = app.server.get("/users/alice").await;
    assert_error(&anonymous, StatusCode::UNAUTHORIZED, "INVALID_TOKEN");

    let forged = app
        .server
        .get("/users")
        .add_header(header::AUTHORIZATION, bearer("not-a-jwt"))
        .await;
    assert_error(&forged, StatusCode::UNAUTHORIZED, "INVALID_TOKEN");
}

#[tokio::test]
async fn should_list_and_read_users_when_signed_in() {
    let app = app();
    let token = app.signed_in("alice", "alice@example.com").await;
    app.register("bob", "bob@example.com").await;

    let list = app
        .server
        .get("/users")
        .add_query_param("page_size", 1)
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await;
    assert_eq!(list.status_code(), StatusCode::OK);
    let page = list.json::<Value>();
    assert_eq!(page["total"], 2);
    assert_eq!(page["page"], 1);
    assert_eq!(page["users"][0]["username"], "alice");

    let bob = app
        .server
        .get("/users/bob")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await;
    assert_eq!(bob.status_code(), StatusCode::OK);
    assert_eq!(bob.json::<Value>()["email"], "bob@example.com");
}

#[tokio::test]
async fn should_only_let_owner_modify_account() {
    let app = app();
    let token = app.signed_in("alice", "alice@example.com").await;
    app.register("bob", "bob@example.com").await;

    let foreign = app
        .server
        .delete("/users/bob")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await;
    assert_error(&foreign, StatusCode::FORBIDDEN, "FORBIDDEN");

    let updated = app
        .server
        .patch("/users/alice")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .json(&json!({"email": "alice@new.example.com", "name": "Alice L."}))
        .await;
    assert_eq!(updated.status_code(), StatusCode::OK);
    assert_eq!(updated.json::<Value>()["email"], "alice@new.example.com");

    let password = app
        .server
        .put("/users/alice/password")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .json(&json!({"current_password": ALICE_PASSWORD, "new_password": "brand-new-pw"}))
        .await;
    assert_eq!(password.status_code(), StatusCode::NO_CONTENT);

    let deleted = app
        .server
        .delete("/users/alice")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await;
    assert_eq!(deleted.status_code(), StatusCode::NO_CONTENT);
    assert!(app.store.outbox_events().unwrap().len() >= 2);
}
