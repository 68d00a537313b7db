//! Chain continuation handed to each filter.

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use futures_util::future::BoxFuture;

use crate::filter::SecurityFilter;
use crate::security::{Applicability, RequestContext, SecurityError, SecurityRule};
use crate::services::{CryptoService, LoggingService, ReplayProtectionService};

/// The routed handler invoked after the last filter.
pub type Terminal<'a> =
    Box<dyn FnOnce(Request<Body>) -> BoxFuture<'static, Response> + Send + 'a>;

/// The collaborators the filters call out to.
#[derive(Clone)]
pub struct Collaborators {
    pub crypto: Arc<dyn CryptoService>,
    pub replay: Arc<dyn ReplayProtectionService>,
    pub logging: Arc<dyn LoggingService>,
}

/// Immutable per-request view shared by every filter of one request.
#[derive(Clone, Copy)]
pub struct Exchange<'a> {
    pub rule: &'a SecurityRule,
    pub applies: Applicability,
    pub services: &'a Collaborators,
}

/// The remaining filters plus the terminal handler.
pub struct Chain<'a> {
    filters: &'a [SecurityFilter],
    exchange: Exchange<'a>,
    terminal: Terminal<'a>,
}

impl<'a> Chain<'a> {
    /// `filters` must already be sorted by order.
    pub fn new(filters: &'a [SecurityFilter], exchange: Exchange<'a>, terminal: Terminal<'a>) -> Self {
        Self {
            filters,
            exchange,
            terminal,
        }
    }

    pub fn exchange(&self) -> Exchange<'a> {
        self.exchange
    }

    /// Run the next filter, or the terminal handler when none remain.
    pub fn proceed<'c>(
        self,
        ctx: &'c mut RequestContext,
        req: Request<Body>,
    ) -> BoxFuture<'c, Result<Response, SecurityError>>
    where
        'a: 'c,
    {
        match self.filters.split_first() {
            Some((filter, rest)) => {
                let next = Chain {
                    filters: rest,
                    exchange: self.exchange,
                    terminal: self.terminal,
                };
                filter.run(ctx, req, next)
            }
            None => {
                let terminal = self.terminal;
                Box::pin(async move { Ok(terminal(req).await) })
            }
        }
    }
}
