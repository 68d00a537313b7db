//! Security subsystem: the decision model and buffers the filter chain uses.
//!
//! # Data Flow
//! ```text
//! request path
//!     → rule.rs (global switch/exclusions, then per-module switch/exclusions)
//!     → exclusion.rs (compiled glob sets, memoized per list value)
//!     → Applicability { global, replay, logging, crypto }
//!
//! request/response body
//!     → body.rs (bounded join, every chunk released exactly once)
//!     → context.rs (start time, decrypted body)
//!     → model.rs (audit snapshots)
//! ```
//!
//! # Design Decisions
//! - Rule snapshots are immutable and replaced wholesale on reload
//! - Absent or empty exclusion lists exclude nothing; they are never an error
//! - Fail closed: any check failure rejects the request

pub mod body;
pub mod context;
pub mod error;
pub mod exclusion;
pub mod model;
pub mod rule;

pub use body::{BoundedBodyJoiner, JoinError};
pub use context::RequestContext;
pub use error::SecurityError;
pub use exclusion::{ExclusionCache, PatternSet};
pub use model::{RequestLog, ResponseLog};
pub use rule::{Applicability, Module, SecurityRule};
