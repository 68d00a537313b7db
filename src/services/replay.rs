//! Replay protection boundary.
//!
//! # Data Flow
//! ```text
//! request headers
//!     → X-Nonce / X-Timestamp present?          (no  → Invalid, 400)
//!     → timestamp parses as epoch millis?       (no  → Invalid, 400)
//!     → |now - timestamp| <= ttl?               (no  → Expired, 403)
//!     → cache.put_if_absent(prefix + nonce)?    (no  → ReplayDetected, 403)
//!     → accepted
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::http::{request, StatusCode};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use crate::config::schema::ReplayConfig;

pub const NONCE_HEADER: &str = "x-nonce";
pub const TIMESTAMP_HEADER: &str = "x-timestamp";

/// Verdicts raised by a replay-protection service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayRejection {
    #[error("replay detected")]
    ReplayDetected,

    #[error("request timestamp expired")]
    Expired,

    #[error("invalid replay headers: {0}")]
    Invalid(String),
}

impl ReplayRejection {
    pub fn status(&self) -> StatusCode {
        match self {
            ReplayRejection::Invalid(_) => StatusCode::BAD_REQUEST,
            ReplayRejection::Expired | ReplayRejection::ReplayDetected => StatusCode::FORBIDDEN,
        }
    }
}

/// Replay-protection collaborator used by the filter chain.
#[async_trait]
pub trait ReplayProtectionService: Send + Sync {
    async fn perform_pre_checks(&self, request: &request::Parts) -> Result<(), ReplayRejection>;
}

/// Nonce store with atomic insert-if-absent.
#[async_trait]
pub trait ReplayCache: Send + Sync {
    /// Returns false if the key is already present and unexpired.
    async fn put_if_absent(&self, key: String, ttl: Duration) -> bool;
}

/// Timestamp window plus single-use nonce.
pub struct NonceReplayProtection<C> {
    cache: Arc<C>,
    ttl: Duration,
    key_prefix: String,
}

impl<C: ReplayCache> NonceReplayProtection<C> {
    pub fn new(cache: Arc<C>, config: &ReplayConfig) -> Self {
        Self {
            cache,
            ttl: Duration::from_secs(config.ttl_secs),
            key_prefix: config.nonce_key_prefix.clone(),
        }
    }
}

#[async_trait]
impl<C: ReplayCache> ReplayProtectionService for NonceReplayProtection<C> {
    async fn perform_pre_checks(&self, request: &request::Parts) -> Result<(), ReplayRejection> {
        let header = |name: &str| request.headers.get(name).and_then(|v| v.to_str().ok());

        let (nonce, timestamp) = match (header(NONCE_HEADER), header(TIMESTAMP_HEADER)) {
            (Some(n), Some(t)) if !n.trim().is_empty() => (n.trim(), t.trim()),
            _ => {
                return Err(ReplayRejection::Invalid(
                    "missing X-Nonce or X-Timestamp header".into(),
                ))
            }
        };

        let timestamp: i64 = timestamp
            .parse()
            .map_err(|_| ReplayRejection::Invalid("invalid X-Timestamp format".into()))?;

        let now = now_ms();
        let window = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        if now.saturating_sub(timestamp).saturating_abs() > window {
            return Err(ReplayRejection::Expired);
        }

        let key = format!("{}{}", self.key_prefix, nonce);
        if self.cache.put_if_absent(key, self.ttl).await {
            Ok(())
        } else {
            Err(ReplayRejection::ReplayDetected)
        }
    }
}

/// In-process nonce store. Expired entries are treated as absent and removed
/// lazily or by `purge_expired`.
#[derive(Debug, Default)]
pub struct MemoryReplayCache {
    entries: DashMap<String, Instant>,
}

impl MemoryReplayCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired nonces. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let now = Instant::now();
        self.entries.retain(|_, expires| *expires > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ReplayCache for MemoryReplayCache {
    async fn put_if_absent(&self, key: String, ttl: Duration) -> bool {
        let now = Instant::now();
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if *occupied.get() > now {
                    return false;
                }
                occupied.insert(now + ttl);
                true
            }
            Entry::Vacant(vacant) => {
                vacant.insert(now + ttl);
                true
            }
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
