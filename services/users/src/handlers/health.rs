use axum::{extract::State, http::StatusCode};

use crate::state::AppState;

/// Handler for `GET /readyz`. Unready while the store cannot be reached.
pub async fn readyz(State(state): State<AppState>) -> StatusCode {
    match state.store.ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, backend = state.store.backend(), "store not ready");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
