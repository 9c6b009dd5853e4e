use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{info, warn};

use super::AppState;
use crate::rotation::RotationState;

/// Liveness probe: 200 only when both backing stores answer
pub(super) async fn ping(State(state): State<AppState>) -> StatusCode {
    if let Err(e) = state.registry.ping().await {
        warn!(error = %e, "Domain registry connectivity check failed");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }

    if let Err(e) = state.state_store.probe().await {
        warn!(
            location = %state.state_store.location(),
            error = %e,
            "State bucket connectivity check failed"
        );
        return StatusCode::INTERNAL_SERVER_ERROR;
    }

    info!("ping");
    StatusCode::OK
}

#[derive(Serialize)]
struct StatusBody {
    #[serde(flatten)]
    state: RotationState,
    held: bool,
}

pub(super) async fn status(State(state): State<AppState>) -> Response {
    let snapshot = state.rotation.snapshot();
    Json(StatusBody {
        state: RotationState::clone(&snapshot),
        held: state.rotation.is_held(),
    })
    .into_response()
}
