//! Unified error types for the pakbox workspace.
//!
//! Every fatal condition of the sandbox construction sequence maps onto one
//! variant here. Non-fatal conditions (absent host paths, best-effort binds
//! that fail) are not errors; they are reported as skipped outcomes by the
//! runtime.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A single syntax problem found while linting an override policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Policy field the offending entry belongs to (e.g. `fsExtra`).
    pub field: &'static str,
    /// The offending entry, verbatim.
    pub value: String,
    /// Human-readable reason.
    pub reason: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?} {}", self.field, self.value, self.reason)
    }
}

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum PakboxError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A flag, mount spec, or link spec is malformed.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A mount, bind, overlay, or pivot operation failed.
    #[error("mount failed at {target}: {message}")]
    Mount {
        /// Mount point the operation targeted.
        target: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// One or more policy entries are syntactically invalid.
    #[error("policy validation failed with {} violation(s): {}", violations.len(), join_violations(violations))]
    Validation {
        /// Every violation found, in field then declaration order.
        violations: Vec<Violation>,
    },

    /// The control socket did not appear before the deadline.
    #[error("timed out after {waited:?} waiting for socket {path}")]
    SocketTimeout {
        /// Socket path that was polled.
        path: PathBuf,
        /// Total time spent waiting.
        waited: Duration,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl PakboxError {
    /// Builds an [`PakboxError::Io`] from a path and an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Builds a [`PakboxError::Mount`] for the given target.
    pub fn mount(target: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self::Mount {
            target: target.into(),
            message: message.to_string(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, PakboxError>;
