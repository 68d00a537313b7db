//! Terminal rejections produced by the filter chain.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::security::body::JoinError;
use crate::services::crypto::{DecryptError, EncryptError};
use crate::services::replay::ReplayRejection;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("payload too large: {seen} > limit {limit}")]
    PayloadTooLarge { seen: u64, limit: u64 },

    #[error("failed to read request body: {0}")]
    BodyRead(String),

    #[error("failed to read upstream response body: {0}")]
    UpstreamBody(String),

    #[error("replay check rejected request: {0}")]
    Replay(#[from] ReplayRejection),

    #[error("decryption failed: {0}")]
    Decrypt(#[source] DecryptError),

    #[error("encryption failed: {0}")]
    Encrypt(#[source] EncryptError),
}

impl SecurityError {
    pub fn status(&self) -> StatusCode {
        match self {
            SecurityError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            SecurityError::BodyRead(_) => StatusCode::BAD_REQUEST,
            SecurityError::UpstreamBody(_) => StatusCode::BAD_GATEWAY,
            SecurityError::Replay(rejection) => rejection.status(),
            SecurityError::Decrypt(_) => StatusCode::BAD_REQUEST,
            SecurityError::Encrypt(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            SecurityError::PayloadTooLarge { .. } => "payload_too_large",
            SecurityError::BodyRead(_) => "body_read",
            SecurityError::UpstreamBody(_) => "upstream_body",
            SecurityError::Replay(ReplayRejection::ReplayDetected) => "replay_detected",
            SecurityError::Replay(ReplayRejection::Expired) => "replay_expired",
            SecurityError::Replay(ReplayRejection::Invalid(_)) => "replay_invalid",
            SecurityError::Decrypt(_) => "decrypt_failure",
            SecurityError::Encrypt(_) => "encrypt_failure",
        }
    }

    /// Client-facing message. Never includes the underlying cause.
    fn public_message(&self) -> &'static str {
        match self {
            SecurityError::PayloadTooLarge { .. } => "Payload too large",
            SecurityError::BodyRead(_) => "Malformed request body",
            SecurityError::UpstreamBody(_) => "Upstream response failed",
            SecurityError::Replay(ReplayRejection::ReplayDetected) => "Replay detected",
            SecurityError::Replay(ReplayRejection::Expired) => "Request expired",
            SecurityError::Replay(ReplayRejection::Invalid(_)) => "Invalid replay headers",
            SecurityError::Decrypt(_) => "Unable to decrypt request",
            SecurityError::Encrypt(_) => "Unable to encrypt response",
        }
    }

    /// Map a request-side join failure.
    pub fn from_request_join(err: JoinError) -> Self {
        match err {
            JoinError::PayloadTooLarge { seen, limit } => SecurityError::PayloadTooLarge {
                seen: seen as u64,
                limit: limit as u64,
            },
            JoinError::Stream(e) => SecurityError::BodyRead(e.to_string()),
        }
    }

    /// Map a response-side join failure.
    pub fn from_response_join(err: JoinError) -> Self {
        match err {
            JoinError::PayloadTooLarge { seen, limit } => SecurityError::PayloadTooLarge {
                seen: seen as u64,
                limit: limit as u64,
            },
            JoinError::Stream(e) => SecurityError::UpstreamBody(e.to_string()),
        }
    }
}

impl IntoResponse for SecurityError {
    fn into_response(self) -> Response {
        (self.status(), self.public_message()).into_response()
    }
}
