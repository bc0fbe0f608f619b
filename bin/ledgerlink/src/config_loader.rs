use anyhow::Result;
use ledgerlink_common::utils::config::load_config;
use ledgerlink_common::utils::logging::LoggingConfig;
use ledgerlink_core::ConsensusConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level node configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub consensus: ConsensusConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            consensus: ConsensusConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

/// Loads `path`, or defaults when the file does not exist. Returns whether
/// the file was found.
pub fn load_node_config<P: AsRef<Path>>(path: P, data_dir_override: Option<PathBuf>) -> Result<(NodeConfig, bool)> {
    let found = path.as_ref().exists();
    let mut config: NodeConfig = if found { load_config(path)? } else { NodeConfig::default() };

    if let Some(dd) = data_dir_override {
        config.data_dir = dd;
    }

    Ok((config, found))
}
