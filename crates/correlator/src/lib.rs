//! Per-host correlation engine.
//!
//! Parses the agent configuration, joins it with the web-server topology,
//! groups the result by identifier code and classifies readiness. The engine
//! is synchronous; topology enumeration happens before [`run_host`] is
//! called.

pub mod correlate;
pub mod descriptor;
pub mod identifier;
pub mod readiness;
pub mod registry;
pub mod topology;

pub use correlate::{correlate, Correlation, CorrelationOptions};
pub use descriptor::{parse_descriptor, AgentDescriptor, DescriptorError, MissingRequiredField};
pub use readiness::{classify, EnumerationErrors, ParseErrors};
pub use registry::assemble_registry;
pub use topology::{
    enumerate_with_timeout, StaticTopology, Topology, TopologyEnumerator, TopologyError,
    TopologyQuery,
};

use iisrecon_common::Timestamp;
use iisrecon_report_schema::{
    DiagnosticLog, EnumerationError, HostReport, Phase, ReportMetadata,
};
use tracing::{info, warn};

/// Inputs of one host run.
#[derive(Debug)]
pub struct HostInput<'a> {
    pub host: String,
    /// Raw agent configuration, or why it could not be obtained
    /// (`NotFound` or `Unreadable`).
    pub descriptor: Result<&'a [u8], DescriptorError>,
    pub topology: Result<Topology, TopologyError>,
    pub started_at: Timestamp,
}

/// Output of one host run.
#[derive(Debug)]
pub struct HostRun {
    pub report: HostReport,
    pub diagnostics: DiagnosticLog,
}

/// Run the engine for one host. Never fails: every problem ends up in the
/// report's conflicts, warnings or verdict.
pub fn run_host(input: HostInput<'_>, options: &CorrelationOptions) -> HostRun {
    let mut diagnostics = DiagnosticLog::new();

    let parsed = input
        .descriptor
        .and_then(|bytes| parse_descriptor(bytes, &mut diagnostics));
    let descriptor = match &parsed {
        Ok(descriptor) => descriptor.clone(),
        Err(e) => {
            warn!("{}: {}", input.host, e);
            diagnostics.error(Phase::Parse, e.to_string());
            AgentDescriptor::default()
        }
    };

    let topology = input.topology;
    let enumeration_errors = match &topology {
        Ok(topology) => {
            for error in &topology.errors {
                diagnostics.warn(Phase::Topology, error.to_string());
            }
            diagnostics.info(
                Phase::Topology,
                format!(
                    "{} site(s), {} pool(s), {} error(s)",
                    topology.sites.len(),
                    topology.pools.len(),
                    topology.errors.len()
                ),
            );
            topology.errors.clone()
        }
        Err(e) => {
            warn!("{}: {}", input.host, e);
            diagnostics.error(Phase::Topology, e.to_string());
            vec![EnumerationError::new(None, e.to_string())]
        }
    };

    let correlation = correlate(
        &descriptor.applications,
        &descriptor.standalone,
        descriptor.mode,
        topology.as_ref().ok().map(|t| t as &dyn TopologyQuery),
        options,
        &mut diagnostics,
    );

    let parse_errors = ParseErrors {
        fatal: parsed.as_ref().err(),
        skipped: &descriptor.skipped,
    };
    let enumeration = match &topology {
        Ok(topology) => EnumerationErrors::Partial(&topology.errors),
        Err(e) => EnumerationErrors::Unavailable(e),
    };
    let verdict = classify(&correlation.conflicts, &parse_errors, &enumeration);

    info!(
        "{}: {} / {} ({} group(s), {} conflict(s))",
        input.host,
        verdict.overall_status,
        verdict.migration_readiness,
        correlation.groups.len(),
        correlation.conflicts.len()
    );
    diagnostics.info(
        Phase::Classify,
        format!("{} / {}", verdict.overall_status, verdict.migration_readiness),
    );

    let report = HostReport {
        metadata: ReportMetadata::finish(input.host, input.started_at),
        controller: descriptor.controller,
        instrumentation_mode: descriptor.mode,
        standalone_applications: correlation.standalone,
        groups: correlation.groups,
        conflicts: correlation.conflicts,
        warnings: correlation.warnings,
        enumeration_errors,
        verdict,
    };

    HostRun {
        report,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::fixtures::{pool, site};
    use iisrecon_report_schema::{
        ConflictKind, Level, MigrationReadiness, OverallStatus, Severity,
    };
    use pretty_assertions::assert_eq;

    fn host_run(xml: Option<&str>, topology: Result<Topology, TopologyError>) -> HostRun {
        run_host(
            HostInput {
                host: "web-01".to_string(),
                descriptor: xml.map(str::as_bytes).ok_or(DescriptorError::NotFound),
                topology,
                started_at: Timestamp::now(),
            },
            &CorrelationOptions::default(),
        )
    }

    fn manual(applications: &[(&str, &str, &str)]) -> String {
        let entries: String = applications
            .iter()
            .map(|(name, site, tier)| {
                format!(
                    r#"<application controller-application="{}" path="/" site="{}"><tier name="{}" /></application>"#,
                    name, site, tier
                )
            })
            .collect();
        format!(
            r#"<appdynamics-agent>
                 <controller host="ctrl.example.com" port="443" ssl="true" account="acme" />
                 <app-agents><IIS><applications>{}</applications></IIS></app-agents>
               </appdynamics-agent>"#,
            entries
        )
    }

    const AUTOMATIC: &str = r#"<appdynamics-agent>
        <controller host="ctrl.example.com" port="443" ssl="true" account="acme" />
        <app-agents><IIS><automatic /></IIS></app-agents>
    </appdynamics-agent>"#;

    fn group_keys(run: &HostRun) -> Vec<&str> {
        run.report.groups.iter().map(|g| g.key.as_str()).collect()
    }

    #[test]
    fn test_scenario_single_identifier() {
        let topology = Topology::new(
            vec![site("Default Web Site", 1, "DefaultAppPool")],
            vec![pool("DefaultAppPool")],
        );
        let run = host_run(
            Some(&manual(&[("1234-Portal", "Default Web Site", "Web")])),
            Ok(topology),
        );

        assert_eq!(group_keys(&run), vec!["1234"]);
        assert_eq!(run.report.groups[0].entries.len(), 1);
        assert!(run.report.conflicts.is_empty());
        assert_eq!(run.report.verdict.overall_status, OverallStatus::Success);
        assert_eq!(run.report.verdict.migration_readiness, MigrationReadiness::Ready);
        assert_eq!(run.report.controller.as_ref().unwrap().account_name, "acme");
    }

    #[test]
    fn test_scenario_multiple_identifiers() {
        let topology = Topology::new(
            vec![site("Portal", 1, "PortalPool"), site("Orders", 2, "OrdersPool")],
            vec![pool("PortalPool"), pool("OrdersPool")],
        );
        let run = host_run(
            Some(&manual(&[
                ("5678-Orders", "Orders", "Orders"),
                ("1234-Portal", "Portal", "Web"),
            ])),
            Ok(topology),
        );

        assert_eq!(group_keys(&run), vec!["1234", "5678"]);
        assert!(run.report.conflicts.is_empty());
        assert_eq!(run.report.verdict.migration_readiness, MigrationReadiness::Ready);
    }

    #[test]
    fn test_scenario_automatic_mode() {
        let topology = Topology::new(
            vec![
                site("1234-Web", 1, "WebPool"),
                site("5678-API", 2, "ApiPool"),
                site("NoCodeSite", 3, "NoCodePool"),
            ],
            vec![pool("WebPool"), pool("ApiPool"), pool("NoCodePool")],
        );
        let run = host_run(Some(AUTOMATIC), Ok(topology));

        assert_eq!(run.report.entry_count(), 3);
        assert_eq!(group_keys(&run), vec!["1234", "5678", "UNKNOWN"]);
        assert_eq!(
            run.report.groups[2].entries[0].application.controller_application,
            "NoCodeSite"
        );
        assert_eq!(run.report.conflicts.len(), 1);
        assert_eq!(run.report.conflicts[0].kind, ConflictKind::NoIdentifier);
        assert_eq!(run.report.conflicts[0].severity, Severity::Medium);
        assert_eq!(
            run.report.verdict.migration_readiness,
            MigrationReadiness::ReadyWithWarnings
        );
    }

    #[test]
    fn test_scenario_shared_pool() {
        let topology = Topology::new(
            vec![site("SiteA", 1, "SharedPool"), site("SiteB", 2, "SharedPool")],
            vec![pool("SharedPool")],
        );
        let run = host_run(
            Some(&manual(&[("1234-A", "SiteA", "A"), ("5678-B", "SiteB", "B")])),
            Ok(topology),
        );

        let critical: Vec<_> = run
            .report
            .conflicts
            .iter()
            .filter(|c| c.severity == Severity::Critical)
            .collect();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].kind, ConflictKind::PoolInMultipleGroups);
        assert_eq!(
            run.report.verdict.migration_readiness,
            MigrationReadiness::RequiresManualIntervention
        );
        assert_eq!(run.report.verdict.overall_status, OverallStatus::PartialSuccess);
    }

    #[test]
    fn test_scenario_stale_declaration() {
        let topology = Topology::new(
            vec![site("Default Web Site", 1, "DefaultAppPool")],
            vec![pool("DefaultAppPool")],
        );
        let run = host_run(
            Some(&manual(&[
                ("1234-Portal", "Default Web Site", "Web"),
                ("5678-Ghost", "GhostSite", "Ghost"),
            ])),
            Ok(topology),
        );

        let ghost = &run.report.groups[1].entries[0];
        assert!(!ghost.site_exists_in_topology);
        assert_eq!(run.report.conflicts.len(), 1);
        assert_eq!(run.report.conflicts[0].kind, ConflictKind::DeclaredButAbsent);
        assert_eq!(run.report.conflicts[0].severity, Severity::Medium);
        assert_eq!(run.report.verdict.overall_status, OverallStatus::PartialSuccess);
    }

    #[test]
    fn test_missing_document_still_produces_verdict() {
        let topology = Topology::new(vec![site("S", 1, "P")], vec![pool("P")]);
        let run = host_run(None, Ok(topology));

        assert_eq!(run.report.verdict.overall_status, OverallStatus::Failed);
        assert_eq!(run.report.verdict.migration_readiness, MigrationReadiness::NotReady);
        assert_eq!(run.diagnostics.problems(Phase::Parse), vec!["Agent configuration not found"]);
    }

    #[test]
    fn test_unreadable_document_is_reported_as_unreadable() {
        let topology = Topology::new(vec![site("S", 1, "P")], vec![pool("P")]);
        let run = run_host(
            HostInput {
                host: "web-01".to_string(),
                descriptor: Err(DescriptorError::Unreadable("read timed out".to_string())),
                topology: Ok(topology),
                started_at: Timestamp::now(),
            },
            &CorrelationOptions::default(),
        );

        assert_eq!(run.report.verdict.migration_readiness, MigrationReadiness::NotReady);
        assert_eq!(
            run.diagnostics.problems(Phase::Parse),
            vec!["Agent configuration unreadable: read timed out"]
        );
        assert!(run.report.verdict.notes[0].contains("unreadable: read timed out"));
        assert!(!run.report.verdict.notes[0].contains("not found"));
    }

    #[test]
    fn test_malformed_document_continues_with_empty_data() {
        let topology = Topology::new(vec![site("S", 1, "P")], vec![pool("P")]);
        let run = host_run(Some("<appdynamics-agent><controller"), Ok(topology));

        assert!(run.report.groups.is_empty());
        assert!(run.report.controller.is_none());
        assert_eq!(run.report.verdict.overall_status, OverallStatus::Failed);
        assert!(run.report.verdict.notes[0].starts_with("agent configuration unusable"));
    }

    #[test]
    fn test_unavailable_topology_degrades_to_declared_only() {
        let run = host_run(
            Some(&manual(&[("1234-A", "SiteA", "A"), ("Legacy", "SiteB", "B")])),
            Err(TopologyError::EnumerationUnavailable("WinRM refused".to_string())),
        );

        assert_eq!(run.report.entry_count(), 2);
        assert!(run
            .report
            .groups
            .iter()
            .flat_map(|g| &g.entries)
            .all(|e| !e.site_exists_in_topology));
        assert_eq!(run.report.warnings.len(), 1);
        assert_eq!(run.report.enumeration_errors.len(), 1);
        assert!(!run
            .report
            .conflicts
            .iter()
            .any(|c| c.kind == ConflictKind::DeclaredButAbsent));
        assert_eq!(run.report.verdict.migration_readiness, MigrationReadiness::NotReady);
    }

    #[test]
    fn test_partial_enumeration_is_reported() {
        let topology = Topology::new(
            vec![site("Default Web Site", 1, "DefaultAppPool")],
            vec![pool("DefaultAppPool")],
        )
        .with_errors(vec![EnumerationError::new(
            Some("Broken Site".to_string()),
            "Access is denied",
        )]);
        let run = host_run(
            Some(&manual(&[("1234-Portal", "Default Web Site", "Web")])),
            Ok(topology),
        );

        assert_eq!(run.report.enumeration_errors.len(), 1);
        assert_eq!(run.report.verdict.overall_status, OverallStatus::PartialSuccess);
        assert_eq!(
            run.report.verdict.migration_readiness,
            MigrationReadiness::ReadyWithWarnings
        );
        assert_eq!(
            run.diagnostics.problems(Phase::Topology),
            vec!["Broken Site: Access is denied"]
        );
    }

    #[test]
    fn test_not_configured_host() {
        let topology = Topology::new(vec![site("S", 1, "P")], vec![pool("P")]);
        let run = host_run(
            Some("<appdynamics-agent><app-agents><IIS /></app-agents></appdynamics-agent>"),
            Ok(topology),
        );

        assert_eq!(run.report.entry_count(), 0);
        assert_eq!(run.report.warnings, vec!["no instrumentation configuration found"]);
        assert_eq!(run.report.verdict.migration_readiness, MigrationReadiness::Ready);
    }

    #[test]
    fn test_report_passes_schema_validation() {
        let topology = Topology::new(
            vec![
                site("SiteA", 1, "SharedPool"),
                site("SiteB", 2, "SharedPool"),
                site("SiteC", 3, "Other"),
            ],
            vec![pool("SharedPool"), pool("Other"), pool("Idle")],
        );
        let run = host_run(
            Some(&manual(&[
                ("1234-A", "SiteA", "A"),
                ("5678_B", "SiteB", "B"),
                ("NoCode", "SiteC", "C"),
                ("9999-Ghost", "GhostSite", "G"),
            ])),
            Ok(topology),
        );

        let value = serde_json::to_value(&run.report).unwrap();
        let result = iisrecon_report_schema::validate_report(&value).unwrap();
        assert!(result.valid, "Errors: {:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_diagnostics_cover_every_phase() {
        let topology = Topology::new(
            vec![site("Default Web Site", 1, "DefaultAppPool")],
            vec![pool("DefaultAppPool")],
        );
        let run = host_run(
            Some(&manual(&[("1234-Portal", "Default Web Site", "Web")])),
            Ok(topology),
        );

        for phase in [Phase::Parse, Phase::Topology, Phase::Correlate, Phase::Classify] {
            assert!(
                run.diagnostics.entries().iter().any(|e| e.phase == phase),
                "no entry for {}",
                phase
            );
        }
        assert!(run.diagnostics.entries().iter().all(|e| e.level == Level::Info));
    }
}
