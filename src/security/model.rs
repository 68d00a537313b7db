//! Request/response audit snapshots handed to the logging service.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::{request, response, HeaderMap, Method};
use bytes::Bytes;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Maximum number of body bytes rendered into a log preview.
pub const PAYLOAD_PREVIEW_BYTES: usize = 512;

/// Headers never copied into a snapshot.
pub const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
    "proxy-authorization",
    "x-api-key",
];

/// Immutable snapshot of an inbound request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestLog {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    #[serde(rename = "payload", serialize_with = "serialize_preview")]
    pub body: Option<Bytes>,
    pub body_len: usize,
    pub body_sha256: String,
    pub timestamp_ms: u64,
}

impl RequestLog {
    /// Capture a request. The body bytes are kept only when `include_payload`.
    pub fn capture(
        request_id: &str,
        parts: &request::Parts,
        body: &Bytes,
        include_payload: bool,
    ) -> Self {
        Self {
            request_id: request_id.to_string(),
            method: parts.method.to_string(),
            path: parts.uri.path().to_string(),
            headers: loggable_headers(&parts.headers),
            body: include_payload.then(|| body.clone()),
            body_len: body.len(),
            body_sha256: sha256_hex(body),
            timestamp_ms: now_ms(),
        }
    }
}

/// Immutable snapshot of an outbound response.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseLog {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    #[serde(rename = "payload", serialize_with = "serialize_preview")]
    pub body: Option<Bytes>,
    pub body_len: usize,
    pub body_sha256: String,
    pub timestamp_ms: u64,
    pub duration_ms: Option<u64>,
}

impl ResponseLog {
    pub fn capture(
        request_id: &str,
        method: &Method,
        path: &str,
        parts: &response::Parts,
        body: &Bytes,
        include_payload: bool,
        duration_ms: Option<u64>,
    ) -> Self {
        Self {
            request_id: request_id.to_string(),
            method: method.to_string(),
            path: path.to_string(),
            status: parts.status.as_u16(),
            headers: loggable_headers(&parts.headers),
            body: include_payload.then(|| body.clone()),
            body_len: body.len(),
            body_sha256: sha256_hex(body),
            timestamp_ms: now_ms(),
            duration_ms,
        }
    }
}

/// Copy headers into a sorted map, dropping sensitive and non-text values.
pub fn loggable_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| !SENSITIVE_HEADERS.contains(&name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// Lossy UTF-8 rendering of at most `PAYLOAD_PREVIEW_BYTES` of the body.
pub fn payload_preview(body: &[u8]) -> String {
    let end = body.len().min(PAYLOAD_PREVIEW_BYTES);
    let mut preview = String::from_utf8_lossy(&body[..end]).into_owned();
    if body.len() > end {
        preview.push_str("...");
    }
    preview
}

pub fn sha256_hex(body: &[u8]) -> String {
    format!("{:x}", Sha256::digest(body))
}

fn serialize_preview<S: Serializer>(body: &Option<Bytes>, s: S) -> Result<S::Ok, S::Error> {
    match body {
        Some(bytes) => s.serialize_some(&payload_preview(bytes)),
        None => s.serialize_none(),
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
