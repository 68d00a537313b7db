//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → sent to the server loop
//!     → SecurityRule rebuilt wholesale and swapped in
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{
    CryptoConfig, EncryptFailurePolicy, GatewayConfig, GlobalConfig, KeyEntry, ListenerConfig,
    LoggingConfig, ObservabilityConfig, ReplayConfig, SecurityConfig, TimeoutConfig,
    UpstreamConfig,
};
