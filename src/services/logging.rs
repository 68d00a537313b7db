//! Audit logging boundary.
//!
//! # Data Flow
//! ```text
//! filter captures RequestLog / ResponseLog
//!     → LoggingService::log_*_async (returns immediately)
//!     → spawned task → LogPublisher::publish
//!     → failure logged at error, never returned to the request
//! ```

use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::security::model::{payload_preview, RequestLog, ResponseLog};

/// Publisher names accepted by `security.logging.publisher`.
pub const KNOWN_PUBLISHERS: &[&str] = &["tracing", "json"];

const REDACTED: &str = "[REDACTED]";

/// One audit event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    Request(RequestLog),
    Response(ResponseLog),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to serialize audit event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write audit event: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit sink lock poisoned")]
    Poisoned,

    #[error("audit write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Fire-and-forget audit logging used by the filter chain.
///
/// Implementations must return immediately and must not surface failures.
pub trait LoggingService: Send + Sync {
    fn log_request_async(&self, log: RequestLog);
    fn log_response_async(&self, log: ResponseLog);
}

/// Destination for audit events.
#[async_trait]
pub trait LogPublisher: Send + Sync {
    fn name(&self) -> &'static str;
    async fn publish(&self, event: AuditEvent) -> Result<(), PublishError>;
}

/// `LoggingService` that hands each event to a publisher on its own task.
#[derive(Clone)]
pub struct PublishingLogger {
    publisher: Arc<dyn LogPublisher>,
}

impl PublishingLogger {
    pub fn new(publisher: Arc<dyn LogPublisher>) -> Self {
        Self { publisher }
    }

    fn dispatch(&self, event: AuditEvent) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!("No async runtime, dropping audit event");
                return;
            }
        };

        let publisher = Arc::clone(&self.publisher);
        handle.spawn(async move {
            if let Err(e) = publisher.publish(event).await {
                tracing::error!(publisher = publisher.name(), error = %e, "Audit publish failed");
            }
        });
    }
}

impl LoggingService for PublishingLogger {
    fn log_request_async(&self, log: RequestLog) {
        self.dispatch(AuditEvent::Request(log));
    }

    fn log_response_async(&self, log: ResponseLog) {
        self.dispatch(AuditEvent::Response(log));
    }
}

/// Emits structured `gateway_audit` tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogPublisher;

#[async_trait]
impl LogPublisher for TracingLogPublisher {
    fn name(&self) -> &'static str {
        "tracing"
    }

    async fn publish(&self, event: AuditEvent) -> Result<(), PublishError> {
        match event {
            AuditEvent::Request(log) => {
                let payload = log.body.as_deref().map(payload_preview);
                tracing::info!(
                    target: "gateway_audit",
                    request_id = %log.request_id,
                    method = %log.method,
                    path = %log.path,
                    headers = ?log.headers,
                    body_len = log.body_len,
                    body_sha256 = %log.body_sha256,
                    payload = payload.as_deref().unwrap_or(REDACTED),
                    "request"
                );
            }
            AuditEvent::Response(log) => {
                let payload = log.body.as_deref().map(payload_preview);
                tracing::info!(
                    target: "gateway_audit",
                    request_id = %log.request_id,
                    method = %log.method,
                    path = %log.path,
                    status = log.status,
                    duration_ms = ?log.duration_ms,
                    body_len = log.body_len,
                    body_sha256 = %log.body_sha256,
                    payload = payload.as_deref().unwrap_or(REDACTED),
                    "response"
                );
            }
        }
        Ok(())
    }
}

/// Writes one JSON document per line to a sink (stdout by default).
///
/// Writes run on the blocking pool.
#[derive(Clone)]
pub struct JsonLogPublisher {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl JsonLogPublisher {
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(sink))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

#[async_trait]
impl LogPublisher for JsonLogPublisher {
    fn name(&self) -> &'static str {
        "json"
    }

    async fn publish(&self, event: AuditEvent) -> Result<(), PublishError> {
        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');
        let sink = Arc::clone(&self.sink);
        tokio::task::spawn_blocking(move || -> Result<(), PublishError> {
            let mut sink = sink.lock().map_err(|_| PublishError::Poisoned)?;
            sink.write_all(&line)?;
            sink.flush()?;
            Ok(())
        })
        .await?
    }
}

/// Resolve a publisher by configured name (case-insensitive).
pub fn publisher_for(name: &str) -> Option<Arc<dyn LogPublisher>> {
    match name.to_ascii_lowercase().as_str() {
        "tracing" => Some(Arc::new(TracingLogPublisher)),
        "json" => Some(Arc::new(JsonLogPublisher::stdout())),
        _ => None,
    }
}
