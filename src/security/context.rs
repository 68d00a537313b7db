//! Per-request scratch space shared between filters.
//!
//! One `RequestContext` is created per request by the pipeline and passed by
//! `&mut` down the chain. It never outlives the request and is never shared
//! across requests.

use std::time::Instant;

use bytes::Bytes;

/// Values computed by one filter and consumed by a later one.
#[derive(Debug, Default)]
pub struct RequestContext {
    request_id: String,
    start_time: Option<Instant>,
    decrypted_body: Option<Bytes>,
    replay_verified: bool,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Self::default()
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Record the start time. Only the first call has an effect.
    pub fn mark_started(&mut self, at: Instant) {
        if self.start_time.is_none() {
            self.start_time = Some(at);
        }
    }

    pub fn start_time(&self) -> Option<Instant> {
        self.start_time
    }

    /// Milliseconds since `mark_started`, if it was called.
    pub fn elapsed_ms(&self) -> Option<u64> {
        self.start_time
            .map(|start| u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX))
    }

    /// Store the plaintext request body. Write-once: later writes are ignored.
    pub fn set_decrypted_body(&mut self, body: Bytes) {
        if self.decrypted_body.is_some() {
            tracing::warn!(
                request_id = %self.request_id,
                "Decrypted body already recorded, ignoring second write"
            );
            return;
        }
        self.decrypted_body = Some(body);
    }

    pub fn decrypted_body(&self) -> Option<&Bytes> {
        self.decrypted_body.as_ref()
    }

    pub fn replay_verified(&self) -> bool {
        self.replay_verified
    }

    pub fn mark_replay_verified(&mut self) {
        self.replay_verified = true;
    }
}
