//! External collaborators of the security pipeline.
//!
//! The filter chain only sees the three traits below; the concrete types are
//! the implementations the gateway ships with.
//!
//! # Data Flow
//! ```text
//! PreCheck / Replay filter  → ReplayProtectionService::perform_pre_checks
//! Decryption filter         → CryptoService::decrypt_from_transport
//!                           → LoggingService::log_request_async
//! Response filter           → LoggingService::log_response_async
//!                           → CryptoService::encrypt_for_transport
//! ```

pub mod crypto;
pub mod logging;
pub mod replay;

pub use crypto::{
    CryptoEngine, CryptoService, DecryptError, EncryptError, EncryptionResult,
    EngineCryptoService, KeyRing, UnconfiguredCrypto, KEY_VERSION_HEADER,
};
pub use logging::{
    publisher_for, JsonLogPublisher, LogPublisher, LoggingService, PublishingLogger,
    TracingLogPublisher,
};
pub use replay::{
    MemoryReplayCache, NonceReplayProtection, ReplayCache, ReplayProtectionService,
    ReplayRejection,
};
