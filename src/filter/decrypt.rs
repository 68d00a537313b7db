//! Request-decryption filter.
//!
//! Joins the request body under the ceiling, decrypts it when crypto
//! applies, records the plaintext in the request context, logs the request,
//! and forwards a replacement request carrying the plaintext.

use axum::body::Body;
use axum::http::{request, Request};
use axum::response::Response;
use bytes::Bytes;

use crate::filter::{set_content_length, Chain, Exchange};
use crate::security::model::RequestLog;
use crate::security::{BoundedBodyJoiner, RequestContext, SecurityError};
use crate::services::crypto::KEY_VERSION_HEADER;

pub(super) async fn apply(
    ctx: &mut RequestContext,
    req: Request<Body>,
    chain: Chain<'_>,
) -> Result<Response, SecurityError> {
    let exchange = chain.exchange();

    // Neither module needs the body: leave the stream untouched.
    if !exchange.applies.crypto && !exchange.applies.logging {
        ctx.set_decrypted_body(Bytes::new());
        return chain.proceed(ctx, req).await;
    }

    let (mut parts, body) = req.into_parts();
    let raw = BoundedBodyJoiner::new(exchange.rule.max_body_bytes())
        .join_body(body)
        .await
        .map_err(SecurityError::from_request_join)?;

    let plain = if raw.is_empty() || !exchange.applies.crypto {
        raw
    } else {
        let key_version = parts
            .headers
            .get(KEY_VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        exchange
            .services
            .crypto
            .decrypt_from_transport(raw, key_version.as_deref())
            .await
            .map_err(|e| {
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    key_version = ?key_version,
                    error = %e,
                    "Request decryption failed"
                );
                SecurityError::Decrypt(e)
            })?
    };

    ctx.set_decrypted_body(plain.clone());
    log_request(exchange, ctx, &parts, &plain);

    set_content_length(&mut parts.headers, plain.len());
    chain
        .proceed(ctx, Request::from_parts(parts, Body::from(plain)))
        .await
}

fn log_request(exchange: Exchange<'_>, ctx: &RequestContext, parts: &request::Parts, body: &Bytes) {
    if !exchange.applies.logging {
        return;
    }
    let log = RequestLog::capture(
        ctx.request_id(),
        parts,
        body,
        exchange.rule.include_payload(),
    );
    exchange.services.logging.log_request_async(log);
}
