//! Security pipeline: the live rule snapshot plus the sorted filter chain.
//!
//! # Design Decisions
//! - Each request loads one `SecurityRule` snapshot and evaluates
//!   applicability once; every filter of that request sees the same answer
//! - `reload` swaps in a rebuilt rule and clears the exclusion cache; in-flight
//!   requests finish on the snapshot they started with
//! - Rejections become plain status responses here, after being counted

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::config::SecurityConfig;
use crate::filter::{sort_filters, Chain, Collaborators, Exchange, SecurityFilter};
use crate::http::request_id::request_id_of;
use crate::observability::metrics;
use crate::security::{ExclusionCache, RequestContext, SecurityError, SecurityRule};

/// A configuration the running pipeline refuses to apply.
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("crypto cannot be enabled on reload: no crypto engine is configured")]
    CryptoUnavailable,
}

pub struct SecurityPipeline {
    rule: ArcSwap<SecurityRule>,
    exclusions: Arc<ExclusionCache>,
    collaborators: Collaborators,
    filters: Vec<SecurityFilter>,
}

impl SecurityPipeline {
    /// Pipeline with the standard four filters.
    pub fn new(config: SecurityConfig, collaborators: Collaborators) -> Self {
        Self::with_filters(config, collaborators, SecurityFilter::DEFAULT_CHAIN.to_vec())
    }

    /// Pipeline with a custom filter registration list, sorted by order.
    pub fn with_filters(
        config: SecurityConfig,
        collaborators: Collaborators,
        mut filters: Vec<SecurityFilter>,
    ) -> Self {
        sort_filters(&mut filters);
        let exclusions = Arc::new(ExclusionCache::new());
        let rule = SecurityRule::new(config, Arc::clone(&exclusions));
        Self {
            rule: ArcSwap::from_pointee(rule),
            exclusions,
            collaborators,
            filters,
        }
    }

    /// Current rule snapshot.
    pub fn rule(&self) -> Arc<SecurityRule> {
        self.rule.load_full()
    }

    pub fn filters(&self) -> &[SecurityFilter] {
        &self.filters
    }

    /// Replace the rule snapshot with one built from `config`.
    ///
    /// A reload may not switch crypto on when no engine backs the crypto
    /// collaborator; the current rule stays in place.
    pub fn reload(&self, config: SecurityConfig) -> Result<(), ReloadError> {
        let enabling_crypto = config.crypto.enabled && !self.rule.load().config().crypto.enabled;
        if enabling_crypto && !self.collaborators.crypto.is_configured() {
            return Err(ReloadError::CryptoUnavailable);
        }

        let rule = SecurityRule::new(config, Arc::clone(&self.exclusions));
        self.rule.store(Arc::new(rule));
        self.exclusions.refresh();
        tracing::info!("Security rule reloaded");
        Ok(())
    }

    /// Run the chain with a caller-owned context.
    pub async fn run<F, Fut>(
        &self,
        ctx: &mut RequestContext,
        req: Request<Body>,
        terminal: F,
    ) -> Result<Response, SecurityError>
    where
        F: FnOnce(Request<Body>) -> Fut + Send + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let rule = self.rule.load_full();
        let exchange = Exchange {
            rule: &rule,
            applies: rule.evaluate(req.uri().path()),
            services: &self.collaborators,
        };

        tracing::trace!(
            request_id = %ctx.request_id(),
            path = %req.uri().path(),
            applies = ?exchange.applies,
            "Security applicability"
        );

        let chain = Chain::new(
            &self.filters,
            exchange,
            Box::new(move |req| -> BoxFuture<'static, Response> { Box::pin(terminal(req)) }),
        );
        chain.proceed(ctx, req).await
    }

    /// Run the chain and turn any rejection into a response.
    pub async fn handle<F, Fut>(&self, req: Request<Body>, terminal: F) -> Response
    where
        F: FnOnce(Request<Body>) -> Fut + Send + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let start = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let request_id = request_id_of(req.headers()).unwrap_or("unknown").to_string();
        let mut ctx = RequestContext::new(request_id);

        let response = match self.run(&mut ctx, req, terminal).await {
            Ok(response) => response,
            Err(err) => {
                metrics::record_rejection(err.kind());
                if err.status().is_server_error() {
                    tracing::error!(
                        request_id = %ctx.request_id(),
                        method = %method,
                        path = %path,
                        error = %err,
                        "Request failed in security pipeline"
                    );
                } else {
                    tracing::warn!(
                        request_id = %ctx.request_id(),
                        method = %method,
                        path = %path,
                        kind = err.kind(),
                        status = err.status().as_u16(),
                        "Request rejected"
                    );
                }
                err.into_response()
            }
        };

        metrics::record_request(method.as_str(), response.status().as_u16(), start);
        response
    }
}

/// Axum middleware running every request through the pipeline.
pub async fn security_middleware(
    State(pipeline): State<Arc<SecurityPipeline>>,
    req: Request,
    next: Next,
) -> Response {
    pipeline.handle(req, move |req| next.run(req)).await
}
