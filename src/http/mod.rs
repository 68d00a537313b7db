//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers)
//!     → request_id.rs (assign / propagate X-Request-Id)
//!     → [security pipeline: filter chain]
//!     → forward.rs (rewrite URI, send to upstream)
//!     → [security pipeline: response encryption]
//!     → Send to client
//! ```

pub mod forward;
pub mod request_id;
pub mod server;

pub use request_id::{MakeRequestUuidV4, X_REQUEST_ID};
pub use server::{GatewayServer, ServerError};
