//! Transport crypto boundary.
//!
//! # Responsibilities
//! - `CryptoService`: decrypt inbound transport bytes, encrypt outbound ones
//! - `EngineCryptoService`: base64 transport encoding over a pluggable
//!   `CryptoEngine` and a versioned `KeyRing`
//!
//! # Design Decisions
//! - Engines are synchronous and run on the blocking pool, never on an I/O worker
//! - Encryption always uses the primary key and reports its version
//! - Decryption tries the requested version, then falls back to the primary key once
//! - No cipher ships with the gateway; embedders provide a `CryptoEngine`

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use bytes::Bytes;
use thiserror::Error;

use crate::config::schema::KeyEntry;

/// Header carrying the key version on requests and encrypted responses.
pub const KEY_VERSION_HEADER: &str = "x-key-version";

/// Output of one encryption call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionResult {
    pub cipher_bytes: Bytes,
    pub key_version: String,
}

#[derive(Debug, Error)]
pub enum DecryptError {
    #[error("transport payload is not valid base64")]
    Encoding,

    #[error("decryption failed with requested and primary keys: {0}")]
    Cipher(#[source] CipherError),

    #[error("crypto task failed: {0}")]
    Task(String),

    #[error("no crypto engine configured")]
    Unconfigured,
}

#[derive(Debug, Error)]
pub enum EncryptError {
    #[error("encryption failed: {0}")]
    Cipher(#[source] CipherError),

    #[error("key version '{0}' is not a valid header value")]
    InvalidKeyVersion(String),

    #[error("crypto task failed: {0}")]
    Task(String),

    #[error("no crypto engine configured")]
    Unconfigured,
}

/// Error raised by a `CryptoEngine`.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct CipherError(pub String);

/// Transport crypto collaborator used by the filter chain.
#[async_trait]
pub trait CryptoService: Send + Sync {
    /// Decrypt transport bytes, selecting the key by `key_version` when given.
    async fn decrypt_from_transport(
        &self,
        bytes: Bytes,
        key_version: Option<&str>,
    ) -> Result<Bytes, DecryptError>;

    /// Encrypt plaintext for transport with the current primary key.
    async fn encrypt_for_transport(&self, bytes: Bytes) -> Result<EncryptionResult, EncryptError>;

    /// Whether a cipher backs this service.
    fn is_configured(&self) -> bool {
        true
    }
}

/// A symmetric cipher. Calls may be CPU heavy; they run via `spawn_blocking`.
pub trait CryptoEngine: Send + Sync + 'static {
    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CipherError>;
    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CipherError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyRingError {
    #[error("key ring needs exactly one primary key, found {0}")]
    PrimaryCount(usize),

    #[error("key version '{0}' is defined twice")]
    DuplicateVersion(String),

    #[error("key version '{0}' has an invalid base64 secret")]
    InvalidSecret(String),
}

/// Versioned key material with one primary key.
#[derive(Debug, Clone)]
pub struct KeyRing {
    keys: HashMap<String, Bytes>,
    primary: String,
}

impl KeyRing {
    pub fn from_entries(entries: &[KeyEntry]) -> Result<Self, KeyRingError> {
        let primaries: Vec<&KeyEntry> = entries.iter().filter(|k| k.primary).collect();
        if primaries.len() != 1 {
            return Err(KeyRingError::PrimaryCount(primaries.len()));
        }
        let primary = primaries[0].version.clone();

        let mut keys = HashMap::with_capacity(entries.len());
        for entry in entries {
            let secret = B64
                .decode(entry.secret.as_bytes())
                .map_err(|_| KeyRingError::InvalidSecret(entry.version.clone()))?;
            if keys.insert(entry.version.clone(), Bytes::from(secret)).is_some() {
                return Err(KeyRingError::DuplicateVersion(entry.version.clone()));
            }
        }

        Ok(Self { keys, primary })
    }

    pub fn primary_version(&self) -> &str {
        &self.primary
    }

    pub fn primary(&self) -> (&str, &Bytes) {
        // from_entries guarantees the primary version is present
        let key = &self.keys[&self.primary];
        (&self.primary, key)
    }

    pub fn get(&self, version: &str) -> Option<&Bytes> {
        self.keys.get(version)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// `CryptoService` over a `CryptoEngine` and a `KeyRing`.
pub struct EngineCryptoService<E> {
    engine: Arc<E>,
    keys: KeyRing,
}

impl<E: CryptoEngine> EngineCryptoService<E> {
    pub fn new(engine: E, keys: KeyRing) -> Self {
        Self {
            engine: Arc::new(engine),
            keys,
        }
    }

    async fn decrypt_with(&self, key: Bytes, ciphertext: Bytes) -> Result<Vec<u8>, DecryptError> {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || engine.decrypt(&key, &ciphertext))
            .await
            .map_err(|e| DecryptError::Task(e.to_string()))?
            .map_err(DecryptError::Cipher)
    }
}

#[async_trait]
impl<E: CryptoEngine> CryptoService for EngineCryptoService<E> {
    async fn decrypt_from_transport(
        &self,
        bytes: Bytes,
        key_version: Option<&str>,
    ) -> Result<Bytes, DecryptError> {
        let ciphertext = B64
            .decode(bytes.trim_ascii())
            .map(Bytes::from)
            .map_err(|_| DecryptError::Encoding)?;

        let (primary_version, primary_key) = self.keys.primary();

        if let Some(version) = key_version {
            match self.keys.get(version) {
                Some(key) => match self.decrypt_with(key.clone(), ciphertext.clone()).await {
                    Ok(plain) => return Ok(Bytes::from(plain)),
                    Err(DecryptError::Cipher(e)) if version != primary_version => {
                        tracing::debug!(
                            key_version = %version,
                            error = %e,
                            "Decrypt with requested key failed, retrying with primary"
                        );
                    }
                    Err(e) => return Err(e),
                },
                None => {
                    tracing::debug!(key_version = %version, "Unknown key version, using primary");
                }
            }
        }

        self.decrypt_with(primary_key.clone(), ciphertext)
            .await
            .map(Bytes::from)
    }

    async fn encrypt_for_transport(&self, bytes: Bytes) -> Result<EncryptionResult, EncryptError> {
        let (version, key) = self.keys.primary();
        let key = key.clone();
        let engine = Arc::clone(&self.engine);

        let cipher = tokio::task::spawn_blocking(move || engine.encrypt(&key, &bytes))
            .await
            .map_err(|e| EncryptError::Task(e.to_string()))?
            .map_err(EncryptError::Cipher)?;

        Ok(EncryptionResult {
            cipher_bytes: Bytes::from(B64.encode(cipher)),
            key_version: version.to_string(),
        })
    }
}

/// Placeholder used when no engine is linked. Every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredCrypto;

#[async_trait]
impl CryptoService for UnconfiguredCrypto {
    async fn decrypt_from_transport(
        &self,
        _bytes: Bytes,
        _key_version: Option<&str>,
    ) -> Result<Bytes, DecryptError> {
        Err(DecryptError::Unconfigured)
    }

    async fn encrypt_for_transport(&self, _bytes: Bytes) -> Result<EncryptionResult, EncryptError> {
        Err(EncryptError::Unconfigured)
    }

    fn is_configured(&self) -> bool {
        false
    }
}
