//! Error types for datapipe.
//!
//! Library crates use [`DataPipeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

use crate::change::ProposedChange;
use crate::types::{NodeId, Payload};

/// Boxed error raised by a node's `pipe` implementation.
pub type NodeError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for all datapipe operations.
#[derive(Debug, thiserror::Error)]
pub enum DataPipeError {
    /// The dependency graph contains a cycle. `path` starts and ends with the
    /// same node.
    #[error("circular dependency found: {}", format_path(.path))]
    CircularDependency { path: Vec<NodeId> },

    /// A node depends on an identity that was never connected to the graph.
    #[error("dependency '{dependency}' not found, required by '{required_by}'")]
    DependencyNotFound {
        dependency: NodeId,
        required_by: NodeId,
    },

    /// A node's `pipe` failed and no listener asked to continue.
    ///
    /// `payload` and `pending` hold the run's context as it was before the
    /// failing node was invoked.
    #[error("node '{node}' failed after {elapsed:?}: {source}")]
    NodeExecution {
        node: NodeId,
        elapsed: Duration,
        payload: Box<Payload>,
        pending: Vec<ProposedChange>,
        source: NodeError,
    },

    /// An API was used in a way its contract forbids (programming error).
    #[error("contract violation: {message}")]
    ContractViolation { message: String },

    /// The payload does not know the attribute.
    #[error("unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (malformed payload, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DataPipeError>;

fn format_path(path: &[NodeId]) -> String {
    path.iter()
        .map(NodeId::as_str)
        .collect::<Vec<_>>()
        .join(" → ")
}

impl DataPipeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a contract violation from any displayable message.
    pub fn contract(msg: impl Into<String>) -> Self {
        Self::ContractViolation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Pre-failure payload and pending changes, if a node failed.
    pub fn failure_state(&self) -> Option<(&Payload, &[ProposedChange])> {
        match self {
            Self::NodeExecution {
                payload, pending, ..
            } => Some((&**payload, pending.as_slice())),
            _ => None,
        }
    }

    /// Nodes forming the cycle, if this is a circular dependency error.
    pub fn cycle(&self) -> Option<&[NodeId]> {
        match self {
            Self::CircularDependency { path } => Some(path),
            _ => None,
        }
    }
}
