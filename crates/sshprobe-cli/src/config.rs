//! Configuration file loading

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sshprobe::ssh::Endpoint;
use sshprobe::{ProbeSettings, SshProbeConfig};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Path used when none is given on the command line
pub const DEFAULT_CONFIG_PATH: &str = "sshprobe.json";

/// Top-level configuration
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global probe settings
    #[serde(default)]
    pub settings: ProbeSettings,

    /// Bastion hosts by identifier
    #[serde(default)]
    pub bastion: HashMap<String, Endpoint>,

    /// Probes to run
    #[serde(default)]
    pub servers: Vec<SshProbeConfig>,
}

impl AppConfig {
    /// Read and parse a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("Failed to parse configuration file {}", path.display()))
    }

    /// Parse configuration text
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
