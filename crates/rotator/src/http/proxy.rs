//! Forwarding of `/.well-known/` requests to the challenge responder

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use http::header::{CONNECTION, HOST};
use http::{HeaderMap, Method, StatusCode, Uri};
use tracing::{debug, info, warn};

use super::AppState;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Hop-by-hop headers (RFC 7230 section 6.1); never forwarded in either direction
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including any the `Connection` header names
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<String> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();
    for name in named {
        headers.remove(name.as_str());
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Client for the local challenge responder
#[derive(Debug, Clone)]
pub struct ChallengeProxy {
    client: reqwest::Client,
    upstream: String,
}

impl ChallengeProxy {
    /// `upstream` is a base URL such as `http://127.0.0.1:5002`
    pub fn new(upstream: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            upstream: upstream.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    async fn send(
        &self,
        method: Method,
        uri: &Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Response, reqwest::Error> {
        let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
        let url = format!("{}{}", self.upstream, path);

        let mut forwarded = headers;
        strip_hop_by_hop(&mut forwarded);
        // The client sets Host from the upstream URL.
        forwarded.remove(HOST);

        let upstream = self
            .client
            .request(method, &url)
            .headers(forwarded)
            .body(body)
            .send()
            .await?;

        let status = upstream.status();
        let mut response_headers = upstream.headers().clone();
        strip_hop_by_hop(&mut response_headers);
        let body = upstream.bytes().await?;

        debug!(url = %url, status = status.as_u16(), "Challenge responder answered");
        Ok((status, response_headers, body).into_response())
    }
}

pub(super) async fn forward(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    info!(path = %uri.path(), "Serving well-known request");

    match state.challenges.send(method, &uri, headers, body).await {
        Ok(response) => response,
        Err(e) => {
            warn!(
                path = %uri.path(),
                upstream = %state.challenges.upstream(),
                error = %e,
                "Challenge responder unreachable"
            );
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}
