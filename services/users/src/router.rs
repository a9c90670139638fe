use axum::{
    Router,
    routing::{get, post, put},
};

use tradedesk_core::health::healthz;
use tradedesk_core::middleware::{propagate_request_id_layer, request_id_layer, trace_layer};

use crate::handlers::{
    auth::{login, logout, refresh},
    health::readyz,
    users::{change_password, delete_user, get_user, list_users, register, update_user},
    verification::{resend_verification, verify_email, verify_email_link},
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Registration and verification
        .route("/users", post(register).get(list_users))
        .route("/users/verification/resend", post(resend_verification))
        .route("/users/verify", post(verify_email).get(verify_email_link))
        // Sessions
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        // Accounts
        .route(
            "/users/{username}",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route("/users/{username}/password", put(change_password))
        .with_state(state)
        .layer(propagate_request_id_layer())
        .layer(trace_layer())
        .layer(request_id_layer())
}
