//! Registry types - per-identifier deployment instructions derived from a
//! host report.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Deployment registry for one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    pub host: String,
    pub source_run_id: String,
    pub entries: Vec<RegistryEntry>,
    /// Applications that carry no identifier and need manual assignment.
    pub unassigned: Vec<RegistryApplication>,
}

/// Deployment instructions for one identifier code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub code: String,
    /// Distinct identifier remainders, usable as service names.
    pub service_names: BTreeSet<String>,
    pub applications: Vec<RegistryApplication>,
    pub pools: BTreeSet<String>,
    pub runtime_versions: BTreeSet<String>,
    pub pipeline_modes: BTreeSet<String>,
    /// A pool of this entry is shared with another identifier.
    pub blocked: bool,
}

/// A single web application to instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryApplication {
    pub site: String,
    pub path: String,
    pub tier: String,
    pub controller_application: String,
    pub pool: Option<String>,
}
