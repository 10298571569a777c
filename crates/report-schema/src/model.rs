//! Agent-configuration and web-server topology types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection details of the monitoring controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub host: String,
    pub port: u16,
    pub tls_enabled: bool,
    pub account_name: String,
}

/// How the agent decides which web applications to instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentationMode {
    /// Every site on the host is instrumented implicitly.
    Automatic,
    /// Only the enumerated application list is instrumented.
    Manual,
    NotConfigured,
}

impl fmt::Display for InstrumentationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentationMode::Automatic => write!(f, "automatic"),
            InstrumentationMode::Manual => write!(f, "manual"),
            InstrumentationMode::NotConfigured => write!(f, "not_configured"),
        }
    }
}

/// A web application the agent is (or would be) instrumenting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredApplication {
    /// Application name as reported to the controller.
    pub controller_application: String,
    pub site: String,
    /// Normalized virtual path, `/` for the site root.
    pub path: String,
    pub tier: String,
    /// Synthesized from a topology site rather than declared in the document.
    pub inferred_from_automatic_mode: bool,
}

impl DeclaredApplication {
    /// Build an entry from either a parsed `<application>` element or a
    /// synthesized automatic-mode site. The path is normalized here so both
    /// origins share one representation.
    pub fn new(
        controller_application: impl Into<String>,
        site: impl Into<String>,
        path: &str,
        tier: impl Into<String>,
        inferred_from_automatic_mode: bool,
    ) -> Self {
        Self {
            controller_application: controller_application.into(),
            site: site.into(),
            path: normalize_application_path(path),
            tier: tier.into(),
            inferred_from_automatic_mode,
        }
    }

    /// Whether this entry targets the site root.
    pub fn is_root(&self) -> bool {
        self.path == "/"
    }
}

/// A non-web process instrumented by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandaloneApplication {
    pub executable: String,
    pub tier: String,
    pub node: Option<String>,
}

/// A site binding (protocol + binding information such as `*:80:`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyBinding {
    pub protocol: String,
    pub binding_information: String,
}

/// A non-root application hosted under a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyApplication {
    pub path: String,
    pub pool: Option<String>,
    pub physical_path: Option<String>,
}

/// A web-server site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySite {
    pub name: String,
    pub id: u64,
    pub state: String,
    pub default_pool: Option<String>,
    pub physical_path: Option<String>,
    pub bindings: Vec<TopologyBinding>,
    pub applications: Vec<TopologyApplication>,
}

/// Profiler already attached to an application pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProfilerMarker {
    #[default]
    None,
    ThisAgent,
    OtherAgent,
    Unknown,
}

/// An application pool and its runtime attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyApplicationPool {
    pub name: String,
    pub state: String,
    /// Managed runtime version; `None` for "No Managed Code".
    pub runtime_version: Option<String>,
    pub pipeline_mode: String,
    pub identity: String,
    pub auto_start: bool,
    pub profiler: ProfilerMarker,
}

/// A topology entity that could not be enumerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumerationError {
    /// Site (or pool) the error belongs to, `None` for listing-wide failures.
    pub entity: Option<String>,
    pub message: String,
}

impl EnumerationError {
    pub fn new(entity: Option<String>, message: impl Into<String>) -> Self {
        Self {
            entity,
            message: message.into(),
        }
    }
}

impl fmt::Display for EnumerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entity {
            Some(entity) => write!(f, "{}: {}", entity, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Normalize a virtual path: leading `/`, forward slashes, no trailing `/`.
/// Empty input is the site root.
pub fn normalize_application_path(path: &str) -> String {
    let trimmed = path.trim().replace('\\', "/");
    let inner = trimmed.trim_matches('/');
    if inner.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", inner)
    }
}
