//! Per-host scan driver.

use crate::enumerator::{fetch_agent_config, fetch_hostname, IisEnumerator};
use crate::executor::{Executor, LocalExecutor, WinRmConfig, WinRmExecutor};
use anyhow::Result;
use iisrecon_common::{Settings, Timestamp};
use iisrecon_correlator::{
    enumerate_with_timeout, DescriptorError, HostInput, Topology, TopologyError,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Collection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionMode {
    /// Remote collection over WinRM.
    Remote,
    /// Collection on the machine running the tool.
    Local,
}

impl FromStr for CollectionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "remote" | "winrm" => Ok(CollectionMode::Remote),
            "local" => Ok(CollectionMode::Local),
            _ => Err(anyhow::anyhow!("Invalid collection mode: {}", s)),
        }
    }
}

/// Collector configuration.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub target: String,
    pub mode: CollectionMode,
    pub winrm_port: u16,
    pub winrm_user: Option<String>,
    pub winrm_password: Option<String>,
    pub winrm_https: bool,
    pub winrm_insecure: bool,
    pub settings: Settings,
}

/// Everything gathered from one host, ready for the correlation engine.
#[derive(Debug)]
pub struct HostScan {
    pub host: String,
    /// Agent configuration bytes, or why none could be read.
    pub agent_config: Result<Vec<u8>, DescriptorError>,
    pub agent_config_path: Option<String>,
    pub topology: Result<Topology, TopologyError>,
    pub started_at: Timestamp,
}

impl HostScan {
    pub fn host_input(&self) -> HostInput<'_> {
        HostInput {
            host: self.host.clone(),
            descriptor: self.agent_config.as_deref().map_err(Clone::clone),
            topology: self.topology.clone(),
            started_at: self.started_at,
        }
    }
}

/// Scans one IIS host.
pub struct Collector {
    config: CollectorConfig,
}

impl Collector {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// Connect to the target and scan it.
    ///
    /// A connection failure is not an error: the scan comes back with no
    /// agent configuration and an unavailable topology.
    pub async fn collect(&self) -> Result<HostScan> {
        let started_at = Timestamp::now();
        match self.create_executor().await {
            Ok(executor) => self.scan(executor, started_at).await,
            Err(e) => {
                warn!("Cannot reach {}: {:#}", self.config.target, e);
                Ok(HostScan {
                    host: self.label_or(&self.config.target),
                    agent_config: Err(DescriptorError::Unreadable(format!(
                        "{} unreachable",
                        self.config.target
                    ))),
                    agent_config_path: None,
                    topology: Err(TopologyError::EnumerationUnavailable(format!(
                        "connection to {} failed: {:#}",
                        self.config.target, e
                    ))),
                    started_at,
                })
            }
        }
    }

    /// Scan through an already connected executor.
    pub async fn collect_with(&self, executor: Arc<dyn Executor>) -> Result<HostScan> {
        self.scan(executor, Timestamp::now()).await
    }

    async fn create_executor(&self) -> Result<Arc<dyn Executor>> {
        match self.config.mode {
            CollectionMode::Local => Ok(Arc::new(LocalExecutor::new())),
            CollectionMode::Remote => {
                let username = self
                    .config
                    .winrm_user
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("WinRM user is required"))?;
                let password = self.config.winrm_password.clone().unwrap_or_default();
                let executor = WinRmExecutor::connect(&WinRmConfig {
                    host: self.config.target.clone(),
                    port: self.config.winrm_port,
                    https: self.config.winrm_https,
                    username,
                    password,
                    accept_invalid_certs: self.config.winrm_insecure,
                })
                .await?;
                Ok(Arc::new(executor))
            }
        }
    }

    async fn scan(&self, executor: Arc<dyn Executor>, started_at: Timestamp) -> Result<HostScan> {
        let settings = &self.config.settings;
        let deadline = Instant::now() + Duration::from_secs(settings.host_timeout_seconds);

        let host = match &settings.host_label {
            Some(label) => label.clone(),
            None => self.resolve_hostname(executor.as_ref(), deadline).await,
        };
        info!("Scanning {} ({})", host, executor.target());

        let fetched = tokio::time::timeout_at(
            deadline,
            fetch_agent_config(executor.as_ref(), &settings.agent_config_paths),
        )
        .await;
        let (agent_config_path, agent_config) = match fetched {
            Ok(Ok(Some((path, bytes)))) => (Some(path), Ok(bytes)),
            Ok(Ok(None)) => {
                warn!("No agent configuration found on {}", host);
                (None, Err(DescriptorError::NotFound))
            }
            Ok(Err(e)) => {
                warn!("Agent configuration unreadable on {}: {:#}", host, e);
                (None, Err(DescriptorError::Unreadable(format!("{:#}", e))))
            }
            Err(_) => {
                warn!("Agent configuration read on {} timed out", host);
                let reason = format!("read timed out after {}s", settings.host_timeout_seconds);
                (None, Err(DescriptorError::Unreadable(reason)))
            }
        };

        let enumerator = IisEnumerator::new(executor);
        let remaining = deadline.saturating_duration_since(Instant::now());
        let topology = enumerate_with_timeout(&enumerator, remaining).await;

        Ok(HostScan {
            host,
            agent_config,
            agent_config_path,
            topology,
            started_at,
        })
    }

    /// Host name reported by the target, or the target itself when the query
    /// fails or runs past `deadline`.
    async fn resolve_hostname(&self, executor: &dyn Executor, deadline: Instant) -> String {
        match tokio::time::timeout_at(deadline, fetch_hostname(executor)).await {
            Ok(Ok(name)) => name,
            Ok(Err(e)) => {
                warn!("Hostname of {} unknown: {:#}", self.config.target, e);
                self.config.target.clone()
            }
            Err(_) => {
                warn!("Hostname query on {} timed out", self.config.target);
                self.config.target.clone()
            }
        }
    }

    fn label_or(&self, fallback: &str) -> String {
        self.config
            .settings
            .host_label
            .clone()
            .unwrap_or_else(|| fallback.to_string())
    }
}
