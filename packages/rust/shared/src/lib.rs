//! Shared types, error model, and configuration for datapipe.
//!
//! This crate is the foundation depended on by all other datapipe crates.
//! It provides:
//! - [`DataPipeError`], the unified error type
//! - Domain types ([`Payload`], [`ProposedChange`], [`NodeId`], [`RunId`])
//! - Configuration ([`AppConfig`], [`NodeConfig`], config loading)

pub mod change;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CopyRule, DefaultsConfig, NodeConfig, NodeKindConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use change::ProposedChange;
pub use error::{DataPipeError, NodeError, Result};
pub use types::{AttributeMap, NodeId, Payload, RunId, Value};
