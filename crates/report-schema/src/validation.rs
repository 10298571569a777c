//! Report validation utilities.

use crate::schema;
use jsonschema::JSONSchema;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Validation error type.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Schema validation failed: {0}")]
    SchemaError(String),

    #[error("Groups out of order: {0} listed after {1}")]
    GroupOrder(String, String),

    #[error("Duplicate group key: {0}")]
    DuplicateGroup(String),

    #[error("Pool {0} appears in several identifier groups without a critical conflict")]
    UnflaggedSharedPool(String),

    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result of report validation.
#[derive(Debug)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate a report against the JSON schema and the grouping invariants.
pub fn validate_report(report: &Value) -> Result<ValidationResult, ValidationError> {
    let mut result = ValidationResult::new();

    let schema_value = schema::report_schema();
    let compiled = JSONSchema::compile(&schema_value)
        .map_err(|e| ValidationError::SchemaError(e.to_string()))?;

    let validation = compiled.validate(report);
    if let Err(errors) = validation {
        for error in errors {
            result.add_error(ValidationError::SchemaError(format!(
                "{} at {}",
                error, error.instance_path
            )));
        }
    }

    if !result.valid {
        return Ok(result);
    }

    let groups = report["groups"].as_array().cloned().unwrap_or_default();
    check_group_order(&groups, &mut result)?;
    check_shared_pools(report, &groups, &mut result);

    if report["verdict"]["notes"]
        .as_array()
        .map(|n| n.is_empty())
        .unwrap_or(true)
        && !report["conflicts"]
            .as_array()
            .map(|c| c.is_empty())
            .unwrap_or(true)
    {
        result.add_warning("Report has conflicts but the verdict carries no notes".to_string());
    }

    Ok(result)
}

fn check_group_order(groups: &[Value], result: &mut ValidationResult) -> Result<(), ValidationError> {
    let mut seen = BTreeSet::new();
    let mut previous: Option<crate::GroupKey> = None;

    for group in groups {
        let key: crate::GroupKey = serde_json::from_value(group["key"].clone())?;
        if !seen.insert(key.clone()) {
            result.add_error(ValidationError::DuplicateGroup(key.to_string()));
            continue;
        }
        if let Some(prev) = &previous {
            if key < *prev {
                result.add_error(ValidationError::GroupOrder(key.to_string(), prev.to_string()));
            }
        }
        previous = Some(key);
    }

    Ok(())
}

fn check_shared_pools(report: &Value, groups: &[Value], result: &mut ValidationResult) {
    let mut pool_groups: BTreeMap<String, usize> = BTreeMap::new();
    for group in groups {
        if group["key"] == "UNKNOWN" {
            continue;
        }
        for pool in group["pools"].as_array().into_iter().flatten() {
            if let Some(pool) = pool.as_str() {
                *pool_groups.entry(pool.to_ascii_lowercase()).or_default() += 1;
            }
        }
    }

    let flagged: BTreeSet<String> = report["conflicts"]
        .as_array()
        .into_iter()
        .flatten()
        .filter(|c| c["kind"] == "pool-in-multiple-groups" && c["severity"] == "critical")
        .filter_map(|c| c["entities"].get(0).and_then(|e| e.as_str()))
        .map(str::to_ascii_lowercase)
        .collect();

    for (pool, count) in pool_groups {
        if count > 1 && !flagged.contains(&pool) {
            result.add_error(ValidationError::UnflaggedSharedPool(pool));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_report() -> Value {
        serde_json::json!({
            "metadata": {
                "schema_version": "1.0.0",
                "run_id": "550e8400-e29b-41d4-a716-446655440000",
                "host": "web-01",
                "started_at": "2024-01-01T00:00:00Z",
                "completed_at": "2024-01-01T00:00:01Z",
                "duration_ms": 1000
            },
            "controller": null,
            "instrumentation_mode": "manual",
            "standalone_applications": [],
            "groups": [],
            "conflicts": [],
            "warnings": [],
            "enumeration_errors": [],
            "verdict": {
                "overall_status": "success",
                "migration_readiness": "ready",
                "notes": []
            }
        })
    }

    fn group(key: &str, pools: &[&str]) -> Value {
        serde_json::json!({
            "key": key,
            "entries": [],
            "pools": pools,
            "delimiters": [],
            "shared_pools": []
        })
    }

    #[test]
    fn test_validate_minimal_report() {
        let result = validate_report(&minimal_report()).unwrap();
        assert!(result.valid, "Errors: {:?}", result.errors);
    }

    #[test]
    fn test_validate_missing_verdict() {
        let mut report = minimal_report();
        report.as_object_mut().unwrap().remove("verdict");
        let result = validate_report(&report).unwrap();
        assert!(!result.valid);
    }

    #[test]
    fn test_validate_group_order() {
        let mut report = minimal_report();
        report["groups"] = serde_json::json!([group("UNKNOWN", &[]), group("1234", &[])]);
        let result = validate_report(&report).unwrap();
        assert!(!result.valid);
        assert!(matches!(result.errors[0], ValidationError::GroupOrder(_, _)));
    }

    #[test]
    fn test_validate_shared_pool_requires_conflict() {
        let mut report = minimal_report();
        report["groups"] = serde_json::json!([
            group("1234", &["SharedPool"]),
            group("5678", &["SharedPool"])
        ]);
        let result = validate_report(&report).unwrap();
        assert!(!result.valid);

        report["conflicts"] = serde_json::json!([{
            "kind": "pool-in-multiple-groups",
            "severity": "critical",
            "entities": ["SharedPool", "1234", "5678"],
            "recommendation": "manual resolution required"
        }]);
        report["verdict"]["notes"] = serde_json::json!(["shared pools"]);
        let result = validate_report(&report).unwrap();
        assert!(result.valid, "Errors: {:?}", result.errors);
    }

    #[test]
    fn test_validate_shared_pool_ignores_case() {
        let mut report = minimal_report();
        report["groups"] = serde_json::json!([
            group("1234", &["SharedPool"]),
            group("5678", &["sharedpool"])
        ]);
        let result = validate_report(&report).unwrap();
        assert!(!result.valid);

        report["conflicts"] = serde_json::json!([{
            "kind": "pool-in-multiple-groups",
            "severity": "critical",
            "entities": ["SharedPool", "1234", "5678"],
            "recommendation": "manual resolution required"
        }]);
        report["verdict"]["notes"] = serde_json::json!(["shared pools"]);
        let result = validate_report(&report).unwrap();
        assert!(result.valid, "Errors: {:?}", result.errors);
    }

    #[test]
    fn test_validate_rejects_bad_group_key() {
        let mut report = minimal_report();
        report["groups"] = serde_json::json!([group("123", &[])]);
        let result = validate_report(&report).unwrap();
        assert!(!result.valid);
    }
}
