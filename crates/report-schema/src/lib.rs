//! Report schema definitions for iisrecon.
//!
//! This crate defines the agent-configuration and web-server topology model,
//! the correlation output grouped by identifier, the host report, and the
//! diagnostics log written next to it.

pub mod correlation;
pub mod diagnostics;
pub mod model;
pub mod registry;
pub mod report;
pub mod schema;
pub mod validation;

pub use correlation::{
    ConflictKind, ConflictRecord, CorrelatedEntry, Delimiter, GroupKey, IdentifierGroup,
    IdentifierMatch, IdentifierSource, Severity,
};
pub use diagnostics::{DiagnosticEntry, DiagnosticLog, Level, Phase};
pub use model::{
    normalize_application_path, ControllerConfig, DeclaredApplication, EnumerationError,
    InstrumentationMode, ProfilerMarker, StandaloneApplication, TopologyApplication,
    TopologyApplicationPool, TopologyBinding, TopologySite,
};
pub use registry::{Registry, RegistryApplication, RegistryEntry};
pub use report::{HostReport, MigrationReadiness, OverallStatus, ReportMetadata, Verdict};
pub use validation::validate_report;
