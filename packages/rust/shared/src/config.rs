//! Application configuration for datapipe.
//!
//! User config lives at `~/.datapipe/datapipe.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DataPipeError, Result};
use crate::types::AttributeMap;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "datapipe.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".datapipe";

// ---------------------------------------------------------------------------
// Config structs (matching datapipe.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Run defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Declaratively configured nodes.
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Per-node cost ceiling. Collectors above it are skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_cost: Option<u32>,

    /// Continue past failing nodes instead of aborting the run.
    #[serde(default)]
    pub keep_going: bool,

    /// Run collectors above the cost ceiling anyway.
    #[serde(default)]
    pub allow_expensive: bool,
}

/// Kind of a configured node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKindConfig {
    Collector,
    Transformer,
}

/// `[[nodes]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Stable node identity, referenced by `depends_on`.
    pub id: String,

    /// Display name (defaults to the id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub kind: NodeKindConfig,

    /// Acquisition cost (collectors only).
    #[serde(default)]
    pub cost: u32,

    /// Ids of nodes that must run first.
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Confidence attached to every proposal this node makes.
    #[serde(default)]
    pub confidence: i64,

    /// Fixed attribute values a collector proposes.
    #[serde(default, skip_serializing_if = "AttributeMap::is_empty")]
    pub values: AttributeMap,

    /// Copy rules a transformer applies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub copy: Vec<CopyRule>,
}

/// `[[nodes.copy]]` entry: propose the value of `from` for `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyRule {
    pub from: String,
    pub to: String,
}

impl NodeConfig {
    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

impl AppConfig {
    /// Check node declarations for obvious mistakes before building nodes.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();

        for node in &self.nodes {
            if node.id.trim().is_empty() {
                return Err(DataPipeError::config("node id must not be empty"));
            }
            if !seen.insert(node.id.as_str()) {
                return Err(DataPipeError::config(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }

            match node.kind {
                NodeKindConfig::Collector if !node.copy.is_empty() => {
                    return Err(DataPipeError::config(format!(
                        "collector '{}' cannot declare copy rules",
                        node.id
                    )));
                }
                NodeKindConfig::Transformer if !node.values.is_empty() => {
                    return Err(DataPipeError::config(format!(
                        "transformer '{}' cannot declare fixed values",
                        node.id
                    )));
                }
                NodeKindConfig::Transformer if node.cost > 0 => {
                    return Err(DataPipeError::config(format!(
                        "transformer '{}' cannot have a cost",
                        node.id
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.datapipe/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DataPipeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.datapipe/datapipe.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DataPipeError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        DataPipeError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    config.validate()?;
    tracing::debug!(?path, nodes = config.nodes.len(), "config loaded");
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DataPipeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DataPipeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DataPipeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
