//! Public HTTP surface
//!
//! - `GET /ping`: registry and state bucket reachability
//! - `GET /status`: snapshot of the rotation state
//! - `/.well-known/*`: forwarded to the local challenge responder

mod health;
mod proxy;

pub use proxy::ChallengeProxy;

use std::sync::Arc;

use axum::routing::{any, get};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::registry::DomainRegistry;
use crate::rotation::{StateHandle, StateStore};

/// Shared state for the request handlers; never writes rotation state
#[derive(Clone)]
pub struct AppState {
    /// Pinged by `/ping`
    pub registry: Arc<dyn DomainRegistry>,
    /// Probed by `/ping`
    pub state_store: Arc<dyn StateStore>,
    /// Read-only view of the scheduler's state, served by `/status`
    pub rotation: StateHandle,
    /// Forwards `/.well-known/` requests to the challenge responder
    pub challenges: ChallengeProxy,
}

/// Routes for the public surface
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(health::ping))
        .route("/status", get(health::status))
        .route("/.well-known/", any(proxy::forward))
        .route("/.well-known/{*rest}", any(proxy::forward))
        .with_state(state)
}

/// Serve `app` on `listener` until `cancel` fires, then finish in-flight requests
pub async fn serve(
    listener: TcpListener,
    app: Router,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(address = %addr, "HTTP server listening");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    info!("HTTP server stopped");
    Ok(())
}
