//! Replay-protection filter.
//!
//! Surfaces the collaborator's verdict unchanged. The check runs at most once
//! per request: whichever of the pre-check and this filter runs first does it.

use axum::body::Body;
use axum::http::{request, Request};
use axum::response::Response;

use crate::filter::{Chain, Exchange};
use crate::security::{RequestContext, SecurityError};

pub(super) async fn apply(
    ctx: &mut RequestContext,
    req: Request<Body>,
    chain: Chain<'_>,
) -> Result<Response, SecurityError> {
    let exchange = chain.exchange();
    if !exchange.applies.replay {
        return chain.proceed(ctx, req).await;
    }

    let (parts, body) = req.into_parts();
    verify_once(exchange, ctx, &parts).await?;
    chain.proceed(ctx, Request::from_parts(parts, body)).await
}

/// Ask the replay collaborator unless this request was already verified.
pub(super) async fn verify_once(
    exchange: Exchange<'_>,
    ctx: &mut RequestContext,
    parts: &request::Parts,
) -> Result<(), SecurityError> {
    if ctx.replay_verified() {
        return Ok(());
    }

    if let Err(rejection) = exchange.services.replay.perform_pre_checks(parts).await {
        tracing::debug!(
            request_id = %ctx.request_id(),
            reason = %rejection,
            "Replay pre-check rejected request"
        );
        return Err(rejection.into());
    }

    ctx.mark_replay_verified();
    Ok(())
}
