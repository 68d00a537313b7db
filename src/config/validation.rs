//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Every exclusion pattern must compile
//! - Value ranges (body ceiling, replay window)
//! - Key material consistency for the config-file key source
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use axum::http::Uri;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use thiserror::Error;

use crate::config::schema::{CryptoConfig, GatewayConfig};
use crate::security::exclusion::compile_pattern;
use crate::services::logging::KNOWN_PUBLISHERS;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{section}: invalid exclude pattern '{pattern}': {reason}")]
    InvalidPattern {
        section: &'static str,
        pattern: String,
        reason: String,
    },

    #[error("upstream.address '{0}' must be an absolute http URI")]
    InvalidUpstream(String),

    #[error("security.crypto.max_body_bytes must be greater than zero")]
    ZeroBodyLimit,

    #[error("security.replay.ttl_secs must be greater than zero")]
    ZeroReplayTtl,

    #[error("security.logging.publisher '{0}' is not a known publisher")]
    UnknownPublisher(String),

    #[error("security.crypto.keys must contain exactly one primary key, found {0}")]
    PrimaryKeyCount(usize),

    #[error("security.crypto.keys has duplicate version '{0}'")]
    DuplicateKeyVersion(String),

    #[error("security.crypto.keys version '{0}' has a secret that is not valid base64")]
    InvalidKeySecret(String),
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let security = &config.security;

    check_patterns("security.global", &security.global.exclude_paths, &mut errors);
    check_patterns("security.replay", &security.replay.exclude_paths, &mut errors);
    check_patterns("security.logging", &security.logging.exclude_paths, &mut errors);
    check_patterns("security.crypto", &security.crypto.exclude_paths, &mut errors);

    match config.upstream.address.parse::<Uri>() {
        Ok(uri)
            if uri.scheme_str() == Some("http") && uri.authority().is_some() => {}
        _ => errors.push(ValidationError::InvalidUpstream(
            config.upstream.address.clone(),
        )),
    }

    if security.crypto.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    if security.replay.enabled && security.replay.ttl_secs == 0 {
        errors.push(ValidationError::ZeroReplayTtl);
    }

    let publisher = security.logging.publisher.to_ascii_lowercase();
    if !KNOWN_PUBLISHERS.contains(&publisher.as_str()) {
        errors.push(ValidationError::UnknownPublisher(
            security.logging.publisher.clone(),
        ));
    }

    if security.crypto.enabled && security.crypto.key_source_strategy == "config_file" {
        check_keys(&security.crypto, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_patterns(section: &'static str, patterns: &[String], errors: &mut Vec<ValidationError>) {
    for pattern in patterns.iter().filter(|p| !p.trim().is_empty()) {
        if let Err(e) = compile_pattern(pattern) {
            errors.push(ValidationError::InvalidPattern {
                section,
                pattern: pattern.clone(),
                reason: e.to_string(),
            });
        }
    }
}

fn check_keys(crypto: &CryptoConfig, errors: &mut Vec<ValidationError>) {
    let primaries = crypto.keys.iter().filter(|k| k.primary).count();
    if primaries != 1 {
        errors.push(ValidationError::PrimaryKeyCount(primaries));
    }

    let mut seen = HashSet::new();
    for key in &crypto.keys {
        if !seen.insert(key.version.as_str()) {
            errors.push(ValidationError::DuplicateKeyVersion(key.version.clone()));
        }
        if B64.decode(key.secret.as_bytes()).is_err() {
            errors.push(ValidationError::InvalidKeySecret(key.version.clone()));
        }
    }
}
