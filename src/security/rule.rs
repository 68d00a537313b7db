//! Security rule facade.
//!
//! Answers "should module X apply to this request" from one immutable
//! configuration snapshot. A module applies iff the global switch is on, the
//! path is not globally excluded, the module switch is on and the path is not
//! excluded for that module.

use std::sync::Arc;

use crate::config::schema::{EncryptFailurePolicy, SecurityConfig};
use crate::security::exclusion::ExclusionCache;

/// Modules gated by the rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Module {
    Replay,
    Logging,
    Crypto,
}

impl Module {
    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Replay => "replay",
            Module::Logging => "logging",
            Module::Crypto => "crypto",
        }
    }
}

/// Per-request applicability, evaluated once from a rule snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Applicability {
    pub global: bool,
    pub replay: bool,
    pub logging: bool,
    pub crypto: bool,
}

impl Applicability {
    pub fn module(&self, module: Module) -> bool {
        match module {
            Module::Replay => self.replay,
            Module::Logging => self.logging,
            Module::Crypto => self.crypto,
        }
    }
}

/// Immutable security decision snapshot. Rebuilt wholesale on reload.
#[derive(Debug)]
pub struct SecurityRule {
    config: SecurityConfig,
    exclusions: Arc<ExclusionCache>,
}

impl SecurityRule {
    pub fn new(config: SecurityConfig, exclusions: Arc<ExclusionCache>) -> Self {
        Self { config, exclusions }
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Strip the configured application base path.
    pub fn path_within_application<'p>(&self, path: &'p str) -> &'p str {
        let base = self.config.global.base_path.trim_end_matches('/');
        if base.is_empty() {
            return path;
        }
        match path.strip_prefix(base) {
            Some("") => "/",
            Some(rest) if rest.starts_with('/') => rest,
            _ => path,
        }
    }

    /// Returns true if the path matches any pattern of the list.
    pub fn excluded(&self, path: &str, patterns: &[String]) -> bool {
        self.exclusions
            .is_excluded(self.path_within_application(path), patterns)
    }

    /// Global switch on and path not globally excluded.
    pub fn globally_applies(&self, path: &str) -> bool {
        let global = &self.config.global;
        global.enabled && !self.excluded(path, &global.exclude_paths)
    }

    /// Whether `module` applies to a request for `path`.
    pub fn applies(&self, module: Module, path: &str) -> bool {
        self.globally_applies(path) && self.module_applies(module, path)
    }

    fn module_applies(&self, module: Module, path: &str) -> bool {
        let (enabled, patterns) = match module {
            Module::Replay => (self.config.replay.enabled, &self.config.replay.exclude_paths),
            Module::Logging => (self.config.logging.enabled, &self.config.logging.exclude_paths),
            Module::Crypto => (self.config.crypto.enabled, &self.config.crypto.exclude_paths),
        };
        enabled && !self.excluded(path, patterns)
    }

    /// Evaluate every module for one path.
    pub fn evaluate(&self, path: &str) -> Applicability {
        if !self.globally_applies(path) {
            return Applicability::default();
        }
        Applicability {
            global: true,
            replay: self.module_applies(Module::Replay, path),
            logging: self.module_applies(Module::Logging, path),
            crypto: self.module_applies(Module::Crypto, path),
        }
    }

    pub fn max_body_bytes(&self) -> usize {
        self.config.crypto.max_body_bytes
    }

    pub fn on_encrypt_failure(&self) -> EncryptFailurePolicy {
        self.config.crypto.on_encrypt_failure
    }

    pub fn include_payload(&self) -> bool {
        self.config.logging.include_payload
    }
}
