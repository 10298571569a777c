//! Registry assembly: per-identifier deployment instructions from a report.

use iisrecon_report_schema::{
    ConflictKind, CorrelatedEntry, HostReport, Registry, RegistryApplication, RegistryEntry,
    Severity,
};
use std::collections::BTreeSet;
use tracing::debug;

/// Build the deployment registry for one host report.
///
/// Every non-UNKNOWN group becomes one entry, in group order. An entry is
/// blocked when one of its pools is the subject of a critical conflict.
pub fn assemble_registry(report: &HostReport) -> Registry {
    let critical_pools: BTreeSet<String> = report
        .conflicts
        .iter()
        .filter(|c| c.kind == ConflictKind::PoolInMultipleGroups && c.severity == Severity::Critical)
        .filter_map(|c| c.entities.first().map(|p| p.to_ascii_lowercase()))
        .collect();

    let mut entries = Vec::new();
    let mut unassigned = Vec::new();

    for group in &report.groups {
        if group.key.is_unknown() {
            unassigned.extend(group.entries.iter().map(registry_application));
            continue;
        }

        let mut entry = RegistryEntry {
            code: group.key.to_string(),
            service_names: BTreeSet::new(),
            applications: Vec::new(),
            pools: group.pools.clone(),
            runtime_versions: BTreeSet::new(),
            pipeline_modes: BTreeSet::new(),
            blocked: group
                .pools
                .iter()
                .any(|p| critical_pools.contains(&p.to_ascii_lowercase())),
        };

        for correlated in &group.entries {
            entry.service_names.insert(correlated.identifier.remainder.clone());
            if let Some(pool) = &correlated.pool {
                if let Some(version) = &pool.runtime_version {
                    entry.runtime_versions.insert(version.clone());
                }
                entry.pipeline_modes.insert(pool.pipeline_mode.clone());
            }
            entry.applications.push(registry_application(correlated));
        }

        debug!(
            "Registry entry {}: {} application(s){}",
            entry.code,
            entry.applications.len(),
            if entry.blocked { ", blocked" } else { "" }
        );
        entries.push(entry);
    }

    Registry {
        host: report.metadata.host.clone(),
        source_run_id: report.metadata.run_id.clone(),
        entries,
        unassigned,
    }
}

fn registry_application(entry: &CorrelatedEntry) -> RegistryApplication {
    let app = &entry.application;
    RegistryApplication {
        site: app.site.clone(),
        path: app.path.clone(),
        tier: app.tier.clone(),
        controller_application: app.controller_application.clone(),
        pool: entry.pool_name.clone(),
    }
}
