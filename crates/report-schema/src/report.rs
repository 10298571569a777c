//! Host report - terminal output of one host run.

use crate::correlation::{ConflictRecord, IdentifierGroup};
use crate::model::{ControllerConfig, EnumerationError, InstrumentationMode, StandaloneApplication};
use iisrecon_common::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current report schema version.
pub const REPORT_SCHEMA_VERSION: &str = "1.0.0";

/// Overall outcome of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Success,
    PartialSuccess,
    Failed,
}

/// Whether the host can move on to the next migration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationReadiness {
    Ready,
    ReadyWithWarnings,
    RequiresManualIntervention,
    NotReady,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallStatus::Success => write!(f, "success"),
            OverallStatus::PartialSuccess => write!(f, "partial_success"),
            OverallStatus::Failed => write!(f, "failed"),
        }
    }
}

impl fmt::Display for MigrationReadiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationReadiness::Ready => write!(f, "ready"),
            MigrationReadiness::ReadyWithWarnings => write!(f, "ready_with_warnings"),
            MigrationReadiness::RequiresManualIntervention => {
                write!(f, "requires_manual_intervention")
            }
            MigrationReadiness::NotReady => write!(f, "not_ready"),
        }
    }
}

/// Readiness verdict with one note per distinct problem kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub overall_status: OverallStatus,
    pub migration_readiness: MigrationReadiness,
    pub notes: Vec<String>,
}

/// Run metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub schema_version: String,
    /// Unique identifier for this run.
    pub run_id: String,
    pub host: String,
    pub started_at: Timestamp,
    pub completed_at: Timestamp,
    pub duration_ms: u64,
    pub tool_version: String,
}

impl ReportMetadata {
    /// Metadata for a run on `host` that started at `started_at` and ends now.
    pub fn finish(host: impl Into<String>, started_at: Timestamp) -> Self {
        let completed_at = Timestamp::now();
        Self {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            run_id: uuid::Uuid::new_v4().to_string(),
            host: host.into(),
            started_at,
            completed_at,
            duration_ms: started_at.millis_until(completed_at),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// The complete per-host report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostReport {
    pub metadata: ReportMetadata,
    pub controller: Option<ControllerConfig>,
    pub instrumentation_mode: InstrumentationMode,
    pub standalone_applications: Vec<StandaloneApplication>,
    /// Groups in ascending code order, UNKNOWN last.
    pub groups: Vec<IdentifierGroup>,
    pub conflicts: Vec<ConflictRecord>,
    /// Run-level warnings that are not tied to a single entity.
    pub warnings: Vec<String>,
    pub enumeration_errors: Vec<EnumerationError>,
    pub verdict: Verdict,
}

impl HostReport {
    /// Total number of correlated entries across all groups.
    pub fn entry_count(&self) -> usize {
        self.groups.iter().map(|g| g.entries.len()).sum()
    }
}
