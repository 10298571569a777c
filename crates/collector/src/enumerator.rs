//! IIS topology enumeration and agent configuration retrieval.

use crate::commands::IisCommands;
use crate::executor::Executor;
use crate::parsers;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use iisrecon_correlator::{Topology, TopologyEnumerator, TopologyError};
use iisrecon_report_schema::ProfilerMarker;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Enumerates sites and application pools of one IIS host.
pub struct IisEnumerator {
    executor: Arc<dyn Executor>,
    commands: IisCommands,
}

impl IisEnumerator {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            commands: IisCommands::new(),
        }
    }

    /// Run a listing script; any failure makes the topology unavailable.
    async fn listing(&self, script: &str, what: &str) -> Result<String, TopologyError> {
        match self.executor.execute(script).await {
            Ok(output) if output.success() => Ok(output.stdout),
            Ok(output) => Err(TopologyError::EnumerationUnavailable(format!(
                "{} failed on {} (exit code {:?}): {}",
                what,
                self.executor.target(),
                output.exit_code,
                output.stderr.trim()
            ))),
            Err(e) => Err(TopologyError::EnumerationUnavailable(format!(
                "{} failed on {}: {:#}",
                what,
                self.executor.target(),
                e
            ))),
        }
    }

    /// Profiler configured for every worker process through the W3SVC/WAS
    /// service environment.
    async fn host_profiler(&self) -> ProfilerMarker {
        match self.executor.execute(self.commands.service_environment_cmd()).await {
            Ok(output) if output.success() => {
                let env = parsers::parse_service_environment(&output.stdout);
                parsers::profiler_marker(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            }
            Ok(output) => {
                warn!("Service environment unreadable: {}", output.stderr.trim());
                ProfilerMarker::None
            }
            Err(e) => {
                warn!("Service environment unreadable: {:#}", e);
                ProfilerMarker::None
            }
        }
    }
}

#[async_trait]
impl TopologyEnumerator for IisEnumerator {
    async fn enumerate(&self) -> Result<Topology, TopologyError> {
        let output = self.listing(self.commands.sites_cmd(), "site listing").await?;
        let (sites, errors) = parsers::parse_sites(&output).map_err(|e| {
            TopologyError::EnumerationUnavailable(format!("site listing unreadable: {:#}", e))
        })?;

        let host_profiler = self.host_profiler().await;
        debug!("Host-wide profiler marker: {:?}", host_profiler);

        let output = self.listing(self.commands.pools_cmd(), "pool listing").await?;
        let pools = parsers::parse_pools(&output, host_profiler).map_err(|e| {
            TopologyError::EnumerationUnavailable(format!("pool listing unreadable: {:#}", e))
        })?;

        info!(
            "Enumerated {} site(s) and {} pool(s) on {} ({} error(s))",
            sites.len(),
            pools.len(),
            self.executor.target(),
            errors.len()
        );
        Ok(Topology::new(sites, pools).with_errors(errors))
    }
}

/// Resolve the host name reported by the target.
pub async fn fetch_hostname(executor: &dyn Executor) -> Result<String> {
    let output = executor.execute(IisCommands::new().hostname_cmd()).await?;
    let name = output.stdout.trim();
    if !output.success() || name.is_empty() {
        anyhow::bail!("hostname query failed: {}", output.stderr.trim());
    }
    Ok(name.to_string())
}

/// Read the first agent configuration found among `paths`.
///
/// Returns the path and raw bytes, or `None` when no candidate exists.
/// Disallowed paths are skipped.
pub async fn fetch_agent_config(
    executor: &dyn Executor,
    paths: &[String],
) -> Result<Option<(String, Vec<u8>)>> {
    let commands = IisCommands::new();

    for path in paths {
        let Some(script) = commands.read_file_cmd(path) else {
            warn!("Skipping disallowed agent configuration path {}", path);
            continue;
        };

        let output = executor
            .execute(&script)
            .await
            .with_context(|| format!("Failed to read {}", path))?;
        if !output.success() {
            anyhow::bail!("Reading {} failed: {}", path, output.stderr.trim());
        }

        let encoded: String = output.stdout.split_whitespace().collect();
        if encoded.is_empty() {
            debug!("No agent configuration at {}", path);
            continue;
        }
        let bytes = STANDARD
            .decode(encoded)
            .with_context(|| format!("Content of {} is not valid base64", path))?;
        info!("Read agent configuration {} ({} bytes)", path, bytes.len());
        return Ok(Some((path.clone(), bytes)));
    }

    Ok(None)
}
