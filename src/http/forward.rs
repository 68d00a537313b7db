//! Forwarding to the configured upstream.
//!
//! # Responsibilities
//! - Rewrite the request URI onto the upstream base (path and query kept)
//! - Strip hop-by-hop headers in both directions
//! - Map transport failures to 502

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderName, Request, StatusCode, Uri, Version},
    response::{IntoResponse, Response},
};
use hyper_util::client::legacy::{connect::HttpConnector, Client};

use crate::http::request_id::request_id_of;

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP: [HeaderName; 6] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
];

/// State for the forwarding handler.
#[derive(Clone)]
pub struct ForwardState {
    pub client: Client<HttpConnector, Body>,
    pub upstream: Uri,
}

/// Join the upstream base URI with the path and query of an inbound URI.
pub fn build_upstream_uri(base: &Uri, inbound: &Uri) -> Result<Uri, axum::http::Error> {
    let prefix = base.path().trim_end_matches('/');
    let path_and_query = inbound
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let mut builder = Uri::builder().path_and_query(format!("{prefix}{path_and_query}"));
    if let Some(scheme) = base.scheme() {
        builder = builder.scheme(scheme.clone());
    }
    if let Some(authority) = base.authority() {
        builder = builder.authority(authority.clone());
    }
    builder.build()
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove("keep-alive");
    headers.remove("proxy-connection");
}

/// Forward a request to the upstream and relay its response.
pub async fn forward_handler(State(state): State<ForwardState>, request: Request<Body>) -> Response {
    let (mut parts, body) = request.into_parts();
    let request_id = request_id_of(&parts.headers).unwrap_or("unknown").to_string();

    let uri = match build_upstream_uri(&state.upstream, &parts.uri) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to build upstream URI");
            return (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
        }
    };

    strip_hop_by_hop(&mut parts.headers);
    parts.headers.remove(header::HOST);
    parts.uri = uri;
    parts.version = Version::HTTP_11;

    tracing::debug!(
        request_id = %request_id,
        method = %parts.method,
        uri = %parts.uri,
        "Forwarding request"
    );

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            let (mut parts, body) = response.into_parts();
            strip_hop_by_hop(&mut parts.headers);
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Upstream error");
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}
