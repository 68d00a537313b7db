//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the forwarding handler
//! - Wire up middleware (trace, request ID, timeout, security pipeline)
//! - Apply security configuration updates while serving
//! - Serve until the shutdown signal fires, then drain

use std::sync::Arc;
use std::time::Duration;

use axum::{http::Uri, middleware, routing::any, Router};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::filter::{security_middleware, Collaborators, SecurityPipeline};
use crate::http::forward::{forward_handler, ForwardState};
use crate::http::request_id::{request_id_header, MakeRequestUuidV4};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid upstream address '{0}'")]
    InvalidUpstream(String),
}

/// HTTP server for the security gateway.
pub struct GatewayServer {
    router: Router,
    pipeline: Arc<SecurityPipeline>,
    config: GatewayConfig,
}

impl GatewayServer {
    /// Create a new server with the given configuration and collaborators.
    pub fn new(config: GatewayConfig, collaborators: Collaborators) -> Result<Self, ServerError> {
        let upstream: Uri = config
            .upstream
            .address
            .parse()
            .map_err(|_| ServerError::InvalidUpstream(config.upstream.address.clone()))?;

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let pipeline = Arc::new(SecurityPipeline::new(config.security.clone(), collaborators));

        let state = ForwardState { client, upstream };
        let router = Self::build_router(&config, state, Arc::clone(&pipeline));

        Ok(Self {
            router,
            pipeline,
            config,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(
        config: &GatewayConfig,
        state: ForwardState,
        pipeline: Arc<SecurityPipeline>,
    ) -> Router {
        Router::new()
            .route("/", any(forward_handler))
            .route("/{*path}", any(forward_handler))
            .with_state(state)
            .layer(middleware::from_fn_with_state(pipeline, security_middleware))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::new(request_id_header()))
            .layer(SetRequestIdLayer::new(request_id_header(), MakeRequestUuidV4))
            .layer(TraceLayer::new_for_http())
    }

    /// The router, for serving it elsewhere or driving it in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn pipeline(&self) -> Arc<SecurityPipeline> {
        Arc::clone(&self.pipeline)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run the server on `listener`.
    ///
    /// Configuration updates rebuild the security rule; everything else needs
    /// a restart. A reload the pipeline refuses is logged and skipped.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.address,
            "HTTP server starting"
        );

        let pipeline = Arc::clone(&self.pipeline);
        let reloader = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                if let Err(e) = pipeline.reload(config.security) {
                    tracing::error!(error = %e, "Security reload rejected, keeping current rule");
                }
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining");
            })
            .await?;

        reloader.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
