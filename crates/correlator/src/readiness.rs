//! Readiness classification.
//!
//! Rules are evaluated most severe first and the first applicable one wins:
//! fatal input problems, critical conflicts, degrading conflicts or partial
//! enumeration, then a clean run.

use crate::descriptor::{DescriptorError, MissingRequiredField};
use crate::topology::TopologyError;
use iisrecon_report_schema::{
    ConflictKind, ConflictRecord, EnumerationError, MigrationReadiness, OverallStatus, Severity,
    Verdict,
};
use std::collections::BTreeMap;

/// Problems met while parsing the agent configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseErrors<'a> {
    pub fatal: Option<&'a DescriptorError>,
    pub skipped: &'a [MissingRequiredField],
}

/// Problems met while enumerating the topology.
#[derive(Debug, Clone, Copy)]
pub enum EnumerationErrors<'a> {
    /// No topology at all.
    Unavailable(&'a TopologyError),
    /// Per-entity failures next to a usable partial topology.
    Partial(&'a [EnumerationError]),
}

impl Default for EnumerationErrors<'_> {
    fn default() -> Self {
        EnumerationErrors::Partial(&[])
    }
}

/// Reduce conflicts and errors into one verdict for the host.
pub fn classify(
    conflicts: &[ConflictRecord],
    parse: &ParseErrors,
    enumeration: &EnumerationErrors,
) -> Verdict {
    let notes = notes(conflicts, parse, enumeration);

    let unavailable = matches!(enumeration, EnumerationErrors::Unavailable(_));
    let partial_enumeration = match enumeration {
        EnumerationErrors::Partial(errors) => !errors.is_empty(),
        EnumerationErrors::Unavailable(_) => false,
    };
    let worst = conflicts.iter().map(|c| c.severity).max();

    let (overall_status, migration_readiness) = if parse.fatal.is_some() || unavailable {
        (OverallStatus::Failed, MigrationReadiness::NotReady)
    } else if worst == Some(Severity::Critical) {
        // Both inputs were usable at this point, so the run produced output.
        (
            OverallStatus::PartialSuccess,
            MigrationReadiness::RequiresManualIntervention,
        )
    } else if worst >= Some(Severity::Medium) || partial_enumeration || !parse.skipped.is_empty() {
        (
            OverallStatus::PartialSuccess,
            MigrationReadiness::ReadyWithWarnings,
        )
    } else {
        (OverallStatus::Success, MigrationReadiness::Ready)
    };

    Verdict {
        overall_status,
        migration_readiness,
        notes,
    }
}

/// One line per input problem, then one line per distinct conflict kind.
fn notes(
    conflicts: &[ConflictRecord],
    parse: &ParseErrors,
    enumeration: &EnumerationErrors,
) -> Vec<String> {
    let mut notes = Vec::new();

    if let Some(error) = parse.fatal {
        notes.push(format!("agent configuration unusable: {}", error));
    }
    if !parse.skipped.is_empty() {
        notes.push(format!(
            "{} configuration entr{} skipped for missing required attributes",
            parse.skipped.len(),
            if parse.skipped.len() == 1 { "y" } else { "ies" }
        ));
    }
    match enumeration {
        EnumerationErrors::Unavailable(error) => notes.push(error.to_string()),
        EnumerationErrors::Partial(errors) if !errors.is_empty() => notes.push(format!(
            "{} topology entit{} failed to enumerate",
            errors.len(),
            if errors.len() == 1 { "y" } else { "ies" }
        )),
        EnumerationErrors::Partial(_) => {}
    }

    let mut by_kind: BTreeMap<ConflictKind, (usize, Severity)> = BTreeMap::new();
    for conflict in conflicts {
        let slot = by_kind
            .entry(conflict.kind)
            .or_insert((0, conflict.severity));
        slot.0 += 1;
        slot.1 = slot.1.max(conflict.severity);
    }
    for (kind, (count, severity)) in by_kind {
        notes.push(format!("{} ({} {}): {}", kind, count, severity, kind.summary()));
    }

    notes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict(kind: ConflictKind, severity: Severity) -> ConflictRecord {
        ConflictRecord::new(kind, severity, vec!["x".to_string()], "r")
    }

    fn clean() -> (ParseErrors<'static>, EnumerationErrors<'static>) {
        (ParseErrors::default(), EnumerationErrors::default())
    }

    #[test]
    fn test_clean_run_is_ready() {
        let (parse, enumeration) = clean();
        let verdict = classify(&[], &parse, &enumeration);
        assert_eq!(verdict.overall_status, OverallStatus::Success);
        assert_eq!(verdict.migration_readiness, MigrationReadiness::Ready);
        assert!(verdict.notes.is_empty());
    }

    #[test]
    fn test_low_conflicts_stay_ready() {
        let (parse, enumeration) = clean();
        let conflicts = [
            conflict(ConflictKind::PresentButUndeclared, Severity::Low),
            conflict(ConflictKind::DelimiterInconsistency, Severity::Low),
        ];
        let verdict = classify(&conflicts, &parse, &enumeration);
        assert_eq!(verdict.migration_readiness, MigrationReadiness::Ready);
        assert_eq!(verdict.notes.len(), 2);
    }

    #[test]
    fn test_medium_and_high_degrade_to_warnings() {
        let (parse, enumeration) = clean();
        for severity in [Severity::Medium, Severity::High] {
            let verdict = classify(
                &[conflict(ConflictKind::ForeignProfiler, severity)],
                &parse,
                &enumeration,
            );
            assert_eq!(verdict.overall_status, OverallStatus::PartialSuccess);
            assert_eq!(verdict.migration_readiness, MigrationReadiness::ReadyWithWarnings);
        }
    }

    #[test]
    fn test_critical_requires_intervention() {
        let (parse, enumeration) = clean();
        let conflicts = [
            conflict(ConflictKind::NoIdentifier, Severity::Medium),
            conflict(ConflictKind::PoolInMultipleGroups, Severity::Critical),
        ];
        let verdict = classify(&conflicts, &parse, &enumeration);
        assert_eq!(verdict.overall_status, OverallStatus::PartialSuccess);
        assert_eq!(
            verdict.migration_readiness,
            MigrationReadiness::RequiresManualIntervention
        );
    }

    #[test]
    fn test_fatal_parse_wins_over_conflicts() {
        let error = DescriptorError::MalformedDocument("unexpected end".to_string());
        let parse = ParseErrors {
            fatal: Some(&error),
            skipped: &[],
        };
        let verdict = classify(
            &[conflict(ConflictKind::PoolInMultipleGroups, Severity::Critical)],
            &parse,
            &EnumerationErrors::default(),
        );
        assert_eq!(verdict.overall_status, OverallStatus::Failed);
        assert_eq!(verdict.migration_readiness, MigrationReadiness::NotReady);
        assert!(verdict.notes[0].contains("unexpected end"));
    }

    #[test]
    fn test_unavailable_topology_is_not_ready() {
        let error = TopologyError::EnumerationUnavailable("WinRM refused".to_string());
        let verdict = classify(
            &[],
            &ParseErrors::default(),
            &EnumerationErrors::Unavailable(&error),
        );
        assert_eq!(verdict.overall_status, OverallStatus::Failed);
        assert_eq!(verdict.migration_readiness, MigrationReadiness::NotReady);
        assert_eq!(verdict.notes, vec![error.to_string()]);
    }

    #[test]
    fn test_partial_enumeration_degrades() {
        let errors = [EnumerationError::new(Some("Broken Site".to_string()), "access denied")];
        let verdict = classify(
            &[],
            &ParseErrors::default(),
            &EnumerationErrors::Partial(&errors),
        );
        assert_eq!(verdict.overall_status, OverallStatus::PartialSuccess);
        assert_eq!(verdict.migration_readiness, MigrationReadiness::ReadyWithWarnings);
        assert_eq!(verdict.notes, vec!["1 topology entity failed to enumerate"]);
    }

    #[test]
    fn test_skipped_entries_degrade() {
        let skipped = [MissingRequiredField {
            element: "application".to_string(),
            position: 2,
            field: "site",
        }];
        let parse = ParseErrors {
            fatal: None,
            skipped: &skipped,
        };
        let verdict = classify(&[], &parse, &EnumerationErrors::default());
        assert_eq!(verdict.migration_readiness, MigrationReadiness::ReadyWithWarnings);
    }

    #[test]
    fn test_notes_deduplicated_by_kind() {
        let (parse, enumeration) = clean();
        let conflicts: Vec<ConflictRecord> = (0..50)
            .map(|_| conflict(ConflictKind::DeclaredButAbsent, Severity::Medium))
            .chain([
                conflict(ConflictKind::PoolInMultipleGroups, Severity::Critical),
                conflict(ConflictKind::ForeignProfiler, Severity::Medium),
                conflict(ConflictKind::ForeignProfiler, Severity::High),
            ])
            .collect();
        let verdict = classify(&conflicts, &parse, &enumeration);
        assert_eq!(
            verdict.notes,
            vec![
                format!(
                    "pool-in-multiple-groups (1 critical): {}",
                    ConflictKind::PoolInMultipleGroups.summary()
                ),
                format!(
                    "foreign-profiler (2 high): {}",
                    ConflictKind::ForeignProfiler.summary()
                ),
                format!(
                    "declared-but-absent (50 medium): {}",
                    ConflictKind::DeclaredButAbsent.summary()
                ),
            ]
        );
    }
}
