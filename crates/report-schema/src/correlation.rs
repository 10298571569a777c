//! Correlation output types: identifier matches, correlated entries,
//! identifier groups and conflict records.

use crate::model::{DeclaredApplication, TopologyApplicationPool};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

/// Reserved key for entries without an identifier.
pub const UNKNOWN_GROUP: &str = "UNKNOWN";

/// Separator between an identifier code and the rest of a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Delimiter {
    #[serde(rename = "-")]
    Hyphen,
    #[serde(rename = "_")]
    Underscore,
}

impl Delimiter {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '-' => Some(Delimiter::Hyphen),
            '_' => Some(Delimiter::Underscore),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Delimiter::Hyphen => '-',
            Delimiter::Underscore => '_',
        }
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Result of looking for an identifier code in a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierMatch {
    pub code: Option<String>,
    pub delimiter: Option<Delimiter>,
    pub remainder: String,
    pub matched: bool,
}

impl IdentifierMatch {
    pub fn found(code: impl Into<String>, delimiter: Delimiter, remainder: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            delimiter: Some(delimiter),
            remainder: remainder.into(),
            matched: true,
        }
    }

    /// No identifier; the remainder is the original name.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self {
            code: None,
            delimiter: None,
            remainder: name.into(),
            matched: false,
        }
    }

    /// Group this match belongs to.
    pub fn group_key(&self) -> GroupKey {
        match (&self.code, self.matched) {
            (Some(code), true) => GroupKey::Code(code.clone()),
            _ => GroupKey::Unknown,
        }
    }
}

/// Which field of a declared application yielded the identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierSource {
    ControllerApplication,
    Tier,
    None,
}

/// One declared application joined with the live topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelatedEntry {
    pub application: DeclaredApplication,
    pub identifier: IdentifierMatch,
    pub identifier_source: IdentifierSource,
    pub site_exists_in_topology: bool,
    pub application_exists_in_topology: bool,
    pub site_id: Option<u64>,
    /// Pool the site/path resolves to, if any.
    pub pool_name: Option<String>,
    /// Runtime attributes of the resolved pool when it was enumerated.
    pub pool: Option<TopologyApplicationPool>,
}

/// Key of an identifier group: a numeric code, or the reserved UNKNOWN bucket.
///
/// Codes order by numeric value (ties broken by text, so `01234` and `1234`
/// stay distinct); UNKNOWN always sorts last.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GroupKey {
    Code(String),
    Unknown,
}

impl GroupKey {
    pub fn is_unknown(&self) -> bool {
        matches!(self, GroupKey::Unknown)
    }

    pub fn as_str(&self) -> &str {
        match self {
            GroupKey::Code(code) => code,
            GroupKey::Unknown => UNKNOWN_GROUP,
        }
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (GroupKey::Code(a), GroupKey::Code(b)) => {
                let numeric = |s: &str| s.parse::<u64>().unwrap_or(u64::MAX);
                numeric(a).cmp(&numeric(b)).then_with(|| a.cmp(b))
            }
            (GroupKey::Code(_), GroupKey::Unknown) => Ordering::Less,
            (GroupKey::Unknown, GroupKey::Code(_)) => Ordering::Greater,
            (GroupKey::Unknown, GroupKey::Unknown) => Ordering::Equal,
        }
    }
}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<String> for GroupKey {
    fn from(s: String) -> Self {
        if s == UNKNOWN_GROUP {
            GroupKey::Unknown
        } else {
            GroupKey::Code(s)
        }
    }
}

impl From<GroupKey> for String {
    fn from(key: GroupKey) -> Self {
        key.as_str().to_string()
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Correlated entries sharing one identifier code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierGroup {
    pub key: GroupKey,
    /// Entries in declaration (or enumeration) order.
    pub entries: Vec<CorrelatedEntry>,
    /// Distinct pools referenced by the entries.
    pub pools: BTreeSet<String>,
    /// Distinct delimiters observed across the entries.
    pub delimiters: BTreeSet<Delimiter>,
    /// Pools of this group that also appear in another identifier group.
    pub shared_pools: BTreeSet<String>,
}

impl IdentifierGroup {
    pub fn new(key: GroupKey) -> Self {
        Self {
            key,
            entries: Vec::new(),
            pools: BTreeSet::new(),
            delimiters: BTreeSet::new(),
            shared_pools: BTreeSet::new(),
        }
    }
}

/// How serious a conflict is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Kind of inconsistency between the agent configuration and the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    /// One pool is referenced from more than one identifier group.
    PoolInMultipleGroups,
    /// A pool already carries another vendor's profiler.
    ForeignProfiler,
    /// Declared site does not exist on the host.
    DeclaredButAbsent,
    /// Declared site exists but the declared path does not.
    ApplicationAbsent,
    /// No identifier could be extracted.
    NoIdentifier,
    /// A pool exists that no entry references.
    PresentButUndeclared,
    /// One group mixes `-` and `_` delimiters.
    DelimiterInconsistency,
}

impl ConflictKind {
    /// One-line description used for readiness notes.
    pub fn summary(&self) -> &'static str {
        match self {
            ConflictKind::PoolInMultipleGroups => {
                "application pools shared across identifier groups"
            }
            ConflictKind::ForeignProfiler => "application pools already instrumented by another profiler",
            ConflictKind::DeclaredButAbsent => "declared applications reference sites missing from the host",
            ConflictKind::ApplicationAbsent => {
                "declared application paths missing under their site"
            }
            ConflictKind::NoIdentifier => "applications without an identifier code",
            ConflictKind::PresentButUndeclared => "application pools not referenced by any declaration",
            ConflictKind::DelimiterInconsistency => "identifier groups mixing delimiters",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConflictKind::PoolInMultipleGroups => "pool-in-multiple-groups",
            ConflictKind::ForeignProfiler => "foreign-profiler",
            ConflictKind::DeclaredButAbsent => "declared-but-absent",
            ConflictKind::ApplicationAbsent => "application-absent",
            ConflictKind::NoIdentifier => "no-identifier",
            ConflictKind::PresentButUndeclared => "present-but-undeclared",
            ConflictKind::DelimiterInconsistency => "delimiter-inconsistency",
        };
        write!(f, "{}", s)
    }
}

/// A detected conflict with the entities it implicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub kind: ConflictKind,
    pub severity: Severity,
    pub entities: Vec<String>,
    pub recommendation: String,
}

impl ConflictRecord {
    pub fn new(
        kind: ConflictKind,
        severity: Severity,
        entities: Vec<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            entities,
            recommendation: recommendation.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_key_ordering() {
        let mut keys = vec![
            GroupKey::Unknown,
            GroupKey::Code("12345".to_string()),
            GroupKey::Code("5678".to_string()),
            GroupKey::Code("1234".to_string()),
        ];
        keys.sort();
        let ordered: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
        assert_eq!(ordered, vec!["1234", "5678", "12345", "UNKNOWN"]);
    }

    #[test]
    fn test_group_key_leading_zero_distinct() {
        let a = GroupKey::Code("01234".to_string());
        let b = GroupKey::Code("1234".to_string());
        assert_ne!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn test_group_key_serializes_as_string() {
        let json = serde_json::to_string(&GroupKey::Unknown).unwrap();
        assert_eq!(json, "\"UNKNOWN\"");
        let key: GroupKey = serde_json::from_str("\"1234\"").unwrap();
        assert_eq!(key, GroupKey::Code("1234".to_string()));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_delimiter_serialization() {
        assert_eq!(serde_json::to_string(&Delimiter::Underscore).unwrap(), "\"_\"");
        assert_eq!(Delimiter::from_char('-'), Some(Delimiter::Hyphen));
        assert_eq!(Delimiter::from_char('.'), None);
    }

    #[test]
    fn test_unmatched_identifier_goes_to_unknown() {
        assert_eq!(IdentifierMatch::not_found("Portal").group_key(), GroupKey::Unknown);
        let found = IdentifierMatch::found("1234", Delimiter::Hyphen, "Portal");
        assert_eq!(found.group_key(), GroupKey::Code("1234".to_string()));
    }
}
