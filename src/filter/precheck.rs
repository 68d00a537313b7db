//! Pre-check filter: the cheapest rejections, before any body is read.

use std::time::Instant;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request};
use axum::response::Response;

use crate::filter::replay::verify_once;
use crate::filter::Chain;
use crate::security::{RequestContext, SecurityError};

pub(super) async fn apply(
    ctx: &mut RequestContext,
    req: Request<Body>,
    chain: Chain<'_>,
) -> Result<Response, SecurityError> {
    ctx.mark_started(Instant::now());
    let exchange = chain.exchange();

    // Only bodies that will be buffered are bounded.
    if exchange.applies.crypto || exchange.applies.logging {
        if let Some(declared) = declared_content_length(req.headers()) {
            let limit = exchange.rule.max_body_bytes() as u64;
            if declared > limit {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    declared,
                    limit,
                    "Declared Content-Length over limit"
                );
                return Err(SecurityError::PayloadTooLarge {
                    seen: declared,
                    limit,
                });
            }
        }
    }

    if exchange.applies.replay {
        let (parts, body) = req.into_parts();
        verify_once(exchange, ctx, &parts).await?;
        return chain.proceed(ctx, Request::from_parts(parts, body)).await;
    }

    chain.proceed(ctx, req).await
}

/// Parsed Content-Length, if present and well-formed.
fn declared_content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
