//! Security gateway library.
//!
//! An HTTP gateway that runs every request through an ordered security
//! filter chain (pre-checks, replay protection, request decryption,
//! response encryption and audit logging) before forwarding it upstream.

pub mod config;
pub mod filter;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;
pub mod services;

pub use config::schema::GatewayConfig;
pub use filter::{Collaborators, SecurityPipeline};
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
