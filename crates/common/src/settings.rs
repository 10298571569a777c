//! Scan settings loaded from an optional YAML file.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Standard location of the AppDynamics .NET agent configuration.
pub const DEFAULT_AGENT_CONFIG_PATH: &str =
    "C:\\ProgramData\\AppDynamics\\DotNetAgent\\Config\\config.xml";

/// Default per-host bound on enumeration + correlation.
pub const DEFAULT_HOST_TIMEOUT_SECONDS: u64 = 300;

/// Settings shared by every subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Drop standalone (non-web) applications from correlation and output.
    pub exclude_standalone_applications: bool,
    /// Candidate locations of the agent configuration, tried in order.
    pub agent_config_paths: Vec<String>,
    /// Hard bound on a single host run.
    pub host_timeout_seconds: u64,
    /// Overrides the host name reported by the target.
    pub host_label: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            exclude_standalone_applications: false,
            agent_config_paths: vec![DEFAULT_AGENT_CONFIG_PATH.to_string()],
            host_timeout_seconds: DEFAULT_HOST_TIMEOUT_SECONDS,
            host_label: None,
        }
    }
}

impl Settings {
    /// Parse settings from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from `path`, or return defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                debug!("Loading settings from {:?}", path);
                let content = std::fs::read_to_string(path)?;
                Self::from_yaml(&content)
            }
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.host_timeout_seconds == 0 {
            return Err(Error::Config(
                "host_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if self.agent_config_paths.iter().any(|p| p.trim().is_empty()) {
            return Err(Error::Config(
                "agent_config_paths must not contain empty entries".to_string(),
            ));
        }
        Ok(())
    }
}
