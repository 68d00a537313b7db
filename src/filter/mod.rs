//! Security filter chain.
//!
//! # Data Flow
//! ```text
//! Incoming request (one SecurityRule snapshot, one RequestContext)
//!     → precheck.rs  (-200) start time, Content-Length ceiling, replay pre-check
//!     → replay.rs    (-200) replay verdict (skipped if already verified)
//!     → decrypt.rs   (-190) bounded join, decrypt, request audit log
//!     → encrypt.rs   (-1)   wraps the response: bounded join, response
//!                           audit log, encrypt or fall back
//!     → routed handler (forward to upstream)
//! ```
//!
//! # Design Decisions
//! - Filters are a closed enum; `run` is the shared "skip unless globally
//!   applicable" wrapper and each variant owns its module logic
//! - Lower order runs earlier inbound; equal orders keep registration order
//! - Response interception is the innermost filter: it awaits the rest of the
//!   chain and transforms the response before it travels back out
//! - Any rejection short-circuits the chain; nothing behind it runs

pub mod chain;
pub mod decrypt;
pub mod encrypt;
pub mod pipeline;
pub mod precheck;
pub mod replay;

pub use chain::{Chain, Collaborators, Exchange, Terminal};
pub use pipeline::{security_middleware, ReloadError, SecurityPipeline};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Request};
use axum::response::Response;
use futures_util::future::BoxFuture;

use crate::security::{RequestContext, SecurityError};

/// One stage of the security chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityFilter {
    PreCheck,
    ReplayProtection,
    RequestDecryption,
    ResponseEncryption,
}

impl SecurityFilter {
    /// The standard chain in registration order.
    pub const DEFAULT_CHAIN: [SecurityFilter; 4] = [
        SecurityFilter::PreCheck,
        SecurityFilter::ReplayProtection,
        SecurityFilter::RequestDecryption,
        SecurityFilter::ResponseEncryption,
    ];

    pub const fn order(&self) -> i32 {
        match self {
            SecurityFilter::PreCheck => -200,
            SecurityFilter::ReplayProtection => -200,
            SecurityFilter::RequestDecryption => -190,
            SecurityFilter::ResponseEncryption => -1,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            SecurityFilter::PreCheck => "pre_check",
            SecurityFilter::ReplayProtection => "replay_protection",
            SecurityFilter::RequestDecryption => "request_decryption",
            SecurityFilter::ResponseEncryption => "response_encryption",
        }
    }

    /// Run this filter, or pass straight through when the request is
    /// globally disabled or excluded.
    pub fn run<'a, 'c>(
        self,
        ctx: &'c mut RequestContext,
        req: Request<Body>,
        chain: Chain<'a>,
    ) -> BoxFuture<'c, Result<Response, SecurityError>>
    where
        'a: 'c,
    {
        if !chain.exchange().applies.global {
            return chain.proceed(ctx, req);
        }

        match self {
            SecurityFilter::PreCheck => Box::pin(precheck::apply(ctx, req, chain)),
            SecurityFilter::ReplayProtection => Box::pin(replay::apply(ctx, req, chain)),
            SecurityFilter::RequestDecryption => Box::pin(decrypt::apply(ctx, req, chain)),
            SecurityFilter::ResponseEncryption => Box::pin(encrypt::apply(ctx, req, chain)),
        }
    }
}

/// Stable sort by order; equal orders keep registration order.
pub fn sort_filters(filters: &mut [SecurityFilter]) {
    filters.sort_by_key(|f| f.order());
}

/// Replace any framing headers with an exact Content-Length.
pub(crate) fn set_content_length(headers: &mut HeaderMap, len: usize) {
    headers.remove(header::TRANSFER_ENCODING);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
}
