//! Report output directory: writing, reading and validation.

use anyhow::{Context, Result};
use iisrecon_common::hash::sha256_bytes;
use iisrecon_common::Error;
use iisrecon_correlator::HostRun;
use iisrecon_report_schema::validation::{ValidationError, ValidationResult};
use iisrecon_report_schema::{validate_report, HostReport, Registry};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const REPORT_FILE: &str = "report.json";
pub const DIAGNOSTICS_FILE: &str = "diagnostics.jsonl";
pub const CHECKSUMS_FILE: &str = "checksums.json";

/// Write `report.json`, `diagnostics.jsonl` and `checksums.json` into `dir`.
pub fn write_run(run: &HostRun, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {:?}", dir))?;

    let report = serde_json::to_string_pretty(&run.report)?;
    let diagnostics = run.diagnostics.to_jsonl();

    let mut checksums = BTreeMap::new();
    for (name, content) in [
        (REPORT_FILE, report.as_bytes()),
        (DIAGNOSTICS_FILE, diagnostics.as_bytes()),
    ] {
        let path = dir.join(name);
        std::fs::write(&path, content).with_context(|| format!("Failed to write {:?}", path))?;
        checksums.insert(name.to_string(), sha256_bytes(content));
        debug!("Wrote {:?} ({} bytes)", path, content.len());
    }

    let checksums_path = dir.join(CHECKSUMS_FILE);
    std::fs::write(&checksums_path, serde_json::to_string_pretty(&checksums)?)
        .with_context(|| format!("Failed to write {:?}", checksums_path))?;

    info!("Report written to {:?}", dir);
    Ok(dir.join(REPORT_FILE))
}

/// Read a report file.
pub fn read_report(path: &Path) -> Result<HostReport> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let report =
        serde_json::from_str(&content).map_err(|e| Error::InvalidReport(e.to_string()))?;
    Ok(report)
}

/// Write a registry as pretty JSON.
pub fn write_registry(registry: &Registry, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(registry)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

/// Validate a report file against the schema. When `verify_checksums` is
/// set, the sibling `checksums.json` must match the files on disk.
pub fn validate_report_file(path: &Path, verify_checksums: bool) -> Result<ValidationResult> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let value: serde_json::Value = serde_json::from_str(&content)?;
    let mut result = validate_report(&value)?;

    if verify_checksums {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        verify_directory_checksums(dir, &mut result)?;
    }

    Ok(result)
}

fn verify_directory_checksums(dir: &Path, result: &mut ValidationResult) -> Result<()> {
    let checksums_path = dir.join(CHECKSUMS_FILE);
    let content = std::fs::read_to_string(&checksums_path)
        .with_context(|| format!("Failed to read {:?}", checksums_path))?;
    let expected: BTreeMap<String, String> = serde_json::from_str(&content)?;

    for (name, hash) in &expected {
        let bytes = std::fs::read(dir.join(name))
            .with_context(|| format!("{} listed in {} is unreadable", name, CHECKSUMS_FILE))?;
        let actual = sha256_bytes(&bytes);
        if actual != *hash {
            result.add_error(ValidationError::ChecksumMismatch {
                file: name.clone(),
                expected: hash.clone(),
                actual,
            });
        }
    }
    Ok(())
}
