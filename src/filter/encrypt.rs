//! Response encryption and logging filter.
//!
//! Awaits the rest of the chain, then joins the response body under the
//! ceiling, logs the response and replaces the body with ciphertext. On
//! encryption failure the configured policy decides between a 500 and a
//! plaintext response.

use axum::body::Body;
use axum::http::{response, HeaderValue, Method, Request};
use axum::response::Response;
use bytes::Bytes;

use crate::config::EncryptFailurePolicy;
use crate::filter::{set_content_length, Chain, Exchange};
use crate::observability::metrics;
use crate::security::model::ResponseLog;
use crate::security::{BoundedBodyJoiner, RequestContext, SecurityError};
use crate::services::crypto::{EncryptError, KEY_VERSION_HEADER};

pub(super) async fn apply(
    ctx: &mut RequestContext,
    req: Request<Body>,
    chain: Chain<'_>,
) -> Result<Response, SecurityError> {
    let exchange = chain.exchange();
    if !exchange.applies.crypto {
        return chain.proceed(ctx, req).await;
    }

    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = chain.proceed(&mut *ctx, req).await?;

    let (mut parts, body) = response.into_parts();
    let plain = BoundedBodyJoiner::new(exchange.rule.max_body_bytes())
        .join_body(body)
        .await
        .map_err(SecurityError::from_response_join)?;

    log_response(exchange, ctx, &method, &path, &parts, &plain);

    // Nothing to protect, and bodiless statuses must stay bodiless.
    if plain.is_empty() {
        return Ok(Response::from_parts(parts, Body::empty()));
    }

    let encrypted = match exchange.services.crypto.encrypt_for_transport(plain.clone()).await {
        Ok(result) => HeaderValue::from_str(&result.key_version)
            .map(|version| (result.cipher_bytes, version))
            .map_err(|_| EncryptError::InvalidKeyVersion(result.key_version)),
        Err(e) => Err(e),
    };

    match encrypted {
        Ok((cipher, version)) => {
            parts.headers.insert(KEY_VERSION_HEADER, version);
            set_content_length(&mut parts.headers, cipher.len());
            Ok(Response::from_parts(parts, Body::from(cipher)))
        }
        Err(e) => match exchange.rule.on_encrypt_failure() {
            EncryptFailurePolicy::Fail => Err(SecurityError::Encrypt(e)),
            EncryptFailurePolicy::PassThrough => {
                tracing::error!(
                    request_id = %ctx.request_id(),
                    path = %path,
                    error = %e,
                    "Response encryption failed, sending plaintext"
                );
                metrics::record_encrypt_fallback();
                parts.headers.remove(KEY_VERSION_HEADER);
                set_content_length(&mut parts.headers, plain.len());
                Ok(Response::from_parts(parts, Body::from(plain)))
            }
        },
    }
}

fn log_response(
    exchange: Exchange<'_>,
    ctx: &RequestContext,
    method: &Method,
    path: &str,
    parts: &response::Parts,
    body: &Bytes,
) {
    if !exchange.applies.logging {
        return;
    }
    let log = ResponseLog::capture(
        ctx.request_id(),
        method,
        path,
        parts,
        body,
        exchange.rule.include_payload(),
        ctx.elapsed_ms(),
    );
    exchange.services.logging.log_response_async(log);
}
