//! Correlation of declared applications with the live topology.
//!
//! Steps:
//! 1. resolve the instrumentation mode into one list of declared applications
//! 2. resolve each application against the topology and extract its code
//! 3. group entries by code (UNKNOWN for entries without one)
//! 4. detect conflicts over the full entry set
//!
//! Every collection used for output is ordered, so identical inputs produce
//! identical groups and conflicts.

use crate::identifier;
use crate::topology::TopologyQuery;
use iisrecon_report_schema::{
    ConflictKind, ConflictRecord, CorrelatedEntry, DeclaredApplication, DiagnosticLog, GroupKey,
    IdentifierGroup, IdentifierMatch, IdentifierSource, InstrumentationMode, Level, Phase,
    ProfilerMarker, Severity, StandaloneApplication, TopologySite,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub const NO_CONFIGURATION_WARNING: &str = "no instrumentation configuration found";
pub const TOPOLOGY_UNAVAILABLE_WARNING: &str =
    "web-server topology unavailable; correlation limited to declared applications";

/// Correlation switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelationOptions {
    pub exclude_standalone_applications: bool,
}

/// Output of one correlation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation {
    /// Entries in declaration (or enumeration) order.
    pub entries: Vec<CorrelatedEntry>,
    /// Groups in ascending code order, UNKNOWN last.
    pub groups: Vec<IdentifierGroup>,
    pub conflicts: Vec<ConflictRecord>,
    pub warnings: Vec<String>,
    pub standalone: Vec<StandaloneApplication>,
}

/// Correlate declared applications with the topology.
///
/// `topology` is `None` when enumeration was unavailable; every entry is then
/// reported as absent and a single warning is attached instead of one
/// conflict per entry.
pub fn correlate(
    declared: &[DeclaredApplication],
    standalone: &[StandaloneApplication],
    mode: InstrumentationMode,
    topology: Option<&dyn TopologyQuery>,
    options: &CorrelationOptions,
    diagnostics: &mut DiagnosticLog,
) -> Correlation {
    let mut warnings = Vec::new();

    if topology.is_none() {
        diagnostics.warn(Phase::Correlate, TOPOLOGY_UNAVAILABLE_WARNING);
        warnings.push(TOPOLOGY_UNAVAILABLE_WARNING.to_string());
    }

    // Step 1: mode resolution
    let applications: Vec<DeclaredApplication> = match mode {
        InstrumentationMode::Automatic => topology
            .map(|t| t.sites().iter().map(synthesize_from_site).collect())
            .unwrap_or_default(),
        InstrumentationMode::Manual => declared.to_vec(),
        InstrumentationMode::NotConfigured => {
            diagnostics.warn(Phase::Correlate, NO_CONFIGURATION_WARNING);
            warnings.push(NO_CONFIGURATION_WARNING.to_string());
            Vec::new()
        }
    };
    debug!("Correlating {} application(s) in {} mode", applications.len(), mode);

    // Step 2: per-entry resolution
    let entries: Vec<CorrelatedEntry> = applications
        .into_iter()
        .map(|app| resolve_entry(app, topology))
        .collect();

    // Step 3: grouping
    let mut groups = group_entries(&entries);

    // Step 4: conflict detection
    let mut conflicts = Vec::new();
    detect_shared_pools(&mut groups, &mut conflicts);
    if topology.is_some() {
        detect_absent(&entries, &mut conflicts);
    }
    detect_missing_identifiers(&entries, &mut conflicts);
    detect_foreign_profilers(&entries, &mut conflicts);
    if let Some(topology) = topology.filter(|_| mode != InstrumentationMode::Automatic) {
        detect_undeclared_pools(&entries, topology, &mut conflicts);
    }
    detect_delimiter_inconsistency(&groups, &mut conflicts);

    for conflict in &conflicts {
        diagnostics.record(
            Phase::Correlate,
            if conflict.severity >= Severity::Medium {
                Level::Warning
            } else {
                Level::Info
            },
            format!(
                "{} ({}): {}",
                conflict.kind,
                conflict.severity,
                conflict.entities.join(", ")
            ),
        );
    }
    diagnostics.info(
        Phase::Correlate,
        format!(
            "{} entries in {} group(s), {} conflict(s)",
            entries.len(),
            groups.len(),
            conflicts.len()
        ),
    );

    let standalone = if options.exclude_standalone_applications {
        Vec::new()
    } else {
        standalone.to_vec()
    };

    Correlation {
        entries,
        groups: groups.into_values().collect(),
        conflicts,
        warnings,
        standalone,
    }
}

/// Automatic mode instruments every site at its root under the site's name.
fn synthesize_from_site(site: &TopologySite) -> DeclaredApplication {
    DeclaredApplication::new(site.name.as_str(), site.name.as_str(), "/", site.name.as_str(), true)
}

fn identify(app: &DeclaredApplication) -> (IdentifierMatch, IdentifierSource) {
    let primary = identifier::extract(&app.controller_application);
    if primary.matched {
        return (primary, IdentifierSource::ControllerApplication);
    }

    if !app.tier.is_empty() {
        let fallback = identifier::extract(&app.tier);
        if fallback.matched {
            return (fallback, IdentifierSource::Tier);
        }
    }

    (primary, IdentifierSource::None)
}

fn resolve_entry(app: DeclaredApplication, topology: Option<&dyn TopologyQuery>) -> CorrelatedEntry {
    let (identifier, identifier_source) = identify(&app);

    let Some(topology) = topology else {
        return CorrelatedEntry {
            application: app,
            identifier,
            identifier_source,
            site_exists_in_topology: false,
            application_exists_in_topology: false,
            site_id: None,
            pool_name: None,
            pool: None,
        };
    };

    let site = topology.find_site(&app.site);
    let pool_name = topology.resolve_pool(&app.site, &app.path);
    let pool = pool_name
        .as_deref()
        .and_then(|name| topology.find_pool(name))
        .cloned();

    CorrelatedEntry {
        site_exists_in_topology: site.is_some(),
        application_exists_in_topology: topology.has_application(&app.site, &app.path),
        site_id: site.map(|s| s.id),
        identifier,
        identifier_source,
        pool_name,
        pool,
        application: app,
    }
}

fn group_entries(entries: &[CorrelatedEntry]) -> BTreeMap<GroupKey, IdentifierGroup> {
    let mut groups: BTreeMap<GroupKey, IdentifierGroup> = BTreeMap::new();

    for entry in entries {
        let key = entry.identifier.group_key();
        let group = groups
            .entry(key.clone())
            .or_insert_with(|| IdentifierGroup::new(key));

        if let Some(pool) = canonical_pool(entry) {
            group.pools.insert(pool.to_string());
        }
        if let Some(delimiter) = entry.identifier.delimiter {
            group.delimiters.insert(delimiter);
        }
        group.entries.push(entry.clone());
    }

    groups
}

/// Pool name as enumerated, or as the site configuration spells it when the
/// pool itself was not enumerated.
fn canonical_pool(entry: &CorrelatedEntry) -> Option<&str> {
    entry
        .pool
        .as_ref()
        .map(|p| p.name.as_str())
        .or(entry.pool_name.as_deref())
}

/// A pool referenced from more than one non-UNKNOWN group. Pool names match
/// case-insensitively; the conflict names the first spelling seen.
fn detect_shared_pools(
    groups: &mut BTreeMap<GroupKey, IdentifierGroup>,
    conflicts: &mut Vec<ConflictRecord>,
) {
    // lowercase name -> (first spelling, group -> spelling in that group)
    let mut pool_groups: BTreeMap<String, (String, BTreeMap<GroupKey, String>)> =
        BTreeMap::new();
    for (key, group) in groups.iter() {
        if key.is_unknown() {
            continue;
        }
        for pool in &group.pools {
            let (_, members) = pool_groups
                .entry(pool.to_ascii_lowercase())
                .or_insert_with(|| (pool.clone(), BTreeMap::new()));
            members.entry(key.clone()).or_insert_with(|| pool.clone());
        }
    }

    for (_, (pool, members)) in pool_groups {
        if members.len() < 2 {
            continue;
        }
        for (key, spelling) in &members {
            if let Some(group) = groups.get_mut(key) {
                group.shared_pools.insert(spelling.clone());
            }
        }

        let codes: Vec<String> = members.keys().map(|k| k.to_string()).collect();
        let recommendation = format!(
            "Manual resolution required: pool '{}' serves identifiers {}; split the pool or assign it to one identifier",
            pool,
            codes.join(", ")
        );
        let mut entities = vec![pool];
        entities.extend(codes);
        conflicts.push(ConflictRecord::new(
            ConflictKind::PoolInMultipleGroups,
            Severity::Critical,
            entities,
            recommendation,
        ));
    }
}

fn detect_absent(entries: &[CorrelatedEntry], conflicts: &mut Vec<ConflictRecord>) {
    for entry in entries {
        let app = &entry.application;
        if !entry.site_exists_in_topology {
            conflicts.push(ConflictRecord::new(
                ConflictKind::DeclaredButAbsent,
                Severity::Medium,
                vec![app.controller_application.clone(), app.site.clone()],
                format!(
                    "Remove the stale declaration or confirm site '{}' was decommissioned",
                    app.site
                ),
            ));
        } else if !entry.application_exists_in_topology {
            conflicts.push(ConflictRecord::new(
                ConflictKind::ApplicationAbsent,
                Severity::Medium,
                vec![
                    app.controller_application.clone(),
                    app.site.clone(),
                    app.path.clone(),
                ],
                format!(
                    "Remove the stale declaration or confirm path '{}' was removed from site '{}'",
                    app.path, app.site
                ),
            ));
        }
    }
}

fn detect_missing_identifiers(entries: &[CorrelatedEntry], conflicts: &mut Vec<ConflictRecord>) {
    for entry in entries.iter().filter(|e| !e.identifier.matched) {
        let app = &entry.application;
        let recommendation = if app.inferred_from_automatic_mode {
            format!(
                "Manual identifier assignment required for site '{}' (instrumented by automatic mode)",
                app.site
            )
        } else {
            format!(
                "Manual identifier assignment required for '{}'",
                app.controller_application
            )
        };
        conflicts.push(ConflictRecord::new(
            ConflictKind::NoIdentifier,
            Severity::Medium,
            vec![app.controller_application.clone()],
            recommendation,
        ));
    }
}

/// One conflict per pool carrying another vendor's profiler. Pools reached only
/// through automatic-mode entries are reported at medium severity.
fn detect_foreign_profilers(entries: &[CorrelatedEntry], conflicts: &mut Vec<ConflictRecord>) {
    let mut order: Vec<&str> = Vec::new();
    let mut declared_explicitly: BTreeMap<&str, bool> = BTreeMap::new();

    for entry in entries {
        let Some(pool) = &entry.pool else { continue };
        if pool.profiler != ProfilerMarker::OtherAgent {
            continue;
        }
        let explicit = declared_explicitly.entry(pool.name.as_str()).or_insert_with(|| {
            order.push(pool.name.as_str());
            false
        });
        *explicit |= !entry.application.inferred_from_automatic_mode;
    }

    for pool in order {
        let severity = if declared_explicitly[pool] {
            Severity::High
        } else {
            Severity::Medium
        };
        conflicts.push(ConflictRecord::new(
            ConflictKind::ForeignProfiler,
            severity,
            vec![pool.to_string()],
            format!(
                "Pool '{}' already loads another profiler; remove it before instrumenting",
                pool
            ),
        ));
    }
}

fn detect_undeclared_pools(
    entries: &[CorrelatedEntry],
    topology: &dyn TopologyQuery,
    conflicts: &mut Vec<ConflictRecord>,
) {
    let referenced: BTreeSet<String> = entries
        .iter()
        .filter_map(|e| e.pool_name.as_deref())
        .map(str::to_ascii_lowercase)
        .collect();

    for pool in topology.pools() {
        if referenced.contains(&pool.name.to_ascii_lowercase()) {
            continue;
        }
        conflicts.push(ConflictRecord::new(
            ConflictKind::PresentButUndeclared,
            Severity::Low,
            vec![pool.name.clone()],
            format!("Confirm whether pool '{}' requires instrumentation", pool.name),
        ));
    }
}

fn detect_delimiter_inconsistency(
    groups: &BTreeMap<GroupKey, IdentifierGroup>,
    conflicts: &mut Vec<ConflictRecord>,
) {
    for (key, group) in groups {
        if key.is_unknown() || group.delimiters.len() < 2 {
            continue;
        }
        let delimiters: Vec<String> = group.delimiters.iter().map(|d| d.to_string()).collect();
        conflicts.push(ConflictRecord::new(
            ConflictKind::DelimiterInconsistency,
            Severity::Low,
            vec![key.to_string()],
            format!(
                "Identifier {} is written with delimiters {}; consider normalizing names",
                key,
                delimiters.join(" and ")
            ),
        ));
    }
}
