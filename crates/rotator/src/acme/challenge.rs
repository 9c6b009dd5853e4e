//! HTTP-01 challenge responder
//!
//! While an order is being validated the authority fetches
//! `http://<domain>/.well-known/acme-challenge/<token>`. The public HTTP
//! surface forwards every `/.well-known/` request to a local responder,
//! which answers from the token map held by [`ChallengeManager`].

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use dashmap::DashMap;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, trace, warn};

use super::error::AcmeError;

/// Pending HTTP-01 challenges, token -> key authorization.
///
/// Clones share the same map, so the ACME client can register tokens while
/// the responder task serves them.
#[derive(Debug, Clone, Default)]
pub struct ChallengeManager {
    challenges: Arc<DashMap<String, String>>,
}

impl ChallengeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token before telling the authority the challenge is ready
    pub fn add_challenge(&self, token: &str, key_authorization: &str) {
        debug!(token = %token, "Registering ACME HTTP-01 challenge");
        self.challenges
            .insert(token.to_string(), key_authorization.to_string());
    }

    pub fn remove_challenge(&self, token: &str) {
        if self.challenges.remove(token).is_some() {
            debug!(token = %token, "Removed ACME challenge");
        }
    }

    /// Key authorization for a token, if it is pending
    pub fn get_response(&self, token: &str) -> Option<String> {
        let result = self.challenges.get(token).map(|v| v.clone());
        trace!(token = %token, found = result.is_some(), "ACME challenge lookup");
        result
    }

    pub fn clear(&self) {
        let count = self.challenges.len();
        self.challenges.clear();
        if count > 0 {
            debug!(cleared = count, "Cleared all pending ACME challenges");
        }
    }

    /// Router answering `/.well-known/acme-challenge/{token}`
    pub fn router(&self) -> Router {
        Router::new()
            .route("/.well-known/acme-challenge/{token}", get(serve_challenge))
            .with_state(self.clone())
    }
}

async fn serve_challenge(
    State(manager): State<ChallengeManager>,
    Path(token): Path<String>,
) -> Response {
    match manager.get_response(&token) {
        Some(key_authorization) => {
            info!(token = %token, "Serving ACME challenge response");
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain")],
                key_authorization,
            )
                .into_response()
        }
        None => {
            warn!(token = %token, "Unknown ACME challenge token requested");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Running challenge responder.
///
/// Bound for the duration of a single certificate order and stopped with
/// [`ChallengeResponder::shutdown`] once the order is settled. Dropping it
/// also stops the server, so an abandoned order does not keep the port bound.
pub struct ChallengeResponder {
    local_addr: SocketAddr,
    stop: DropGuard,
    task: JoinHandle<()>,
}

impl ChallengeResponder {
    /// Bind `0.0.0.0:<port>` and start answering challenges.
    ///
    /// Port `0` picks an ephemeral port; see [`ChallengeResponder::local_addr`].
    pub async fn start(port: u16, manager: ChallengeManager) -> Result<Self, AcmeError> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| AcmeError::ResponderBind { port, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| AcmeError::ResponderBind { port, source })?;

        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        let router = manager.router();

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                warn!(error = %e, "Challenge responder stopped with error");
            }
            debug!(address = %local_addr, "Challenge responder stopped");
        });

        debug!(address = %local_addr, "Challenge responder listening");

        Ok(Self {
            local_addr,
            stop: cancel.drop_guard(),
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for the server task to exit
    pub async fn shutdown(self) {
        let Self { stop, task, .. } = self;
        drop(stop);
        if let Err(e) = task.await {
            warn!(error = %e, "Challenge responder task panicked");
        }
    }
}
