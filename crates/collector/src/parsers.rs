//! Parsers for the JSON printed by the enumeration scripts.

use anyhow::{Context, Result};
use iisrecon_report_schema::{
    EnumerationError, ProfilerMarker, TopologyApplication, TopologyApplicationPool,
    TopologyBinding, TopologySite,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// CLSID of the AppDynamics .NET profiler.
pub const APPDYNAMICS_PROFILER_CLSID: &str = "39AEABC1-56A5-405F-B8E7-C3668490DB4A";

/// `ConvertTo-Json` prints a bare object for one item and an array for
/// several; normalize both (and empty output) into a list.
fn json_items(output: &str) -> Result<Vec<Value>> {
    let trimmed = output.trim().trim_start_matches('\u{feff}');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_str(trimmed).context("Invalid JSON from PowerShell")?;
    Ok(match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    })
}

fn string_field(item: &Value, key: &str) -> Option<String> {
    match &item[key] {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Enum fields may arrive as names or as their numeric values.
fn enum_field(item: &Value, key: &str, names: &[&str]) -> String {
    match &item[key] {
        Value::Number(n) => n
            .as_u64()
            .and_then(|i| names.get(i as usize))
            .map(|s| s.to_string())
            .unwrap_or_else(|| n.to_string()),
        Value::String(s) => s.clone(),
        _ => "Unknown".to_string(),
    }
}

const OBJECT_STATES: [&str; 5] = ["Starting", "Started", "Stopping", "Stopped", "Unknown"];
const PIPELINE_MODES: [&str; 2] = ["Integrated", "Classic"];
const IDENTITY_TYPES: [&str; 5] = [
    "LocalSystem",
    "LocalService",
    "NetworkService",
    "SpecificUser",
    "ApplicationPoolIdentity",
];

/// Parse the site listing. Records carrying an `Error` field become per-site
/// enumeration errors instead of sites.
pub fn parse_sites(output: &str) -> Result<(Vec<TopologySite>, Vec<EnumerationError>)> {
    let mut sites = Vec::new();
    let mut errors = Vec::new();

    for item in json_items(output)? {
        let name = string_field(&item, "Name");

        if let Some(message) = string_field(&item, "Error") {
            errors.push(EnumerationError::new(name, message));
            continue;
        }
        let Some(name) = name else {
            errors.push(EnumerationError::new(None, "site record without a name"));
            continue;
        };

        let bindings = item["Bindings"]
            .as_array()
            .into_iter()
            .flatten()
            .map(|b| TopologyBinding {
                protocol: string_field(b, "Protocol").unwrap_or_default(),
                binding_information: string_field(b, "BindingInformation").unwrap_or_default(),
            })
            .collect();

        let applications = item["Applications"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|a| {
                Some(TopologyApplication {
                    path: string_field(a, "Path")?,
                    pool: string_field(a, "ApplicationPool"),
                    physical_path: string_field(a, "PhysicalPath"),
                })
            })
            .collect();

        sites.push(TopologySite {
            id: item["Id"].as_u64().unwrap_or_default(),
            state: enum_field(&item, "State", &OBJECT_STATES),
            default_pool: string_field(&item, "ApplicationPool"),
            physical_path: string_field(&item, "PhysicalPath"),
            bindings,
            applications,
            name,
        });
    }

    Ok((sites, errors))
}

/// Parse the pool listing. `host_profiler` is the marker found in the worker
/// services' environment, used for pools that set no profiler themselves.
pub fn parse_pools(
    output: &str,
    host_profiler: ProfilerMarker,
) -> Result<Vec<TopologyApplicationPool>> {
    let mut pools = Vec::new();

    for item in json_items(output)? {
        let Some(name) = string_field(&item, "Name") else {
            continue;
        };

        let identity_type = enum_field(&item, "IdentityType", &IDENTITY_TYPES);
        let identity = if identity_type == "SpecificUser" {
            string_field(&item, "UserName").unwrap_or(identity_type)
        } else {
            identity_type
        };

        let profiler = match &item["EnvironmentVariables"] {
            Value::Object(vars) => match pool_profiler(vars) {
                ProfilerMarker::None => host_profiler,
                marker => marker,
            },
            Value::Null => ProfilerMarker::Unknown,
            _ => host_profiler,
        };

        pools.push(TopologyApplicationPool {
            name,
            state: enum_field(&item, "State", &OBJECT_STATES),
            runtime_version: string_field(&item, "ManagedRuntimeVersion"),
            pipeline_mode: enum_field(&item, "ManagedPipelineMode", &PIPELINE_MODES),
            identity,
            auto_start: item["AutoStart"].as_bool().unwrap_or(false),
            profiler,
        });
    }

    Ok(pools)
}

fn pool_profiler(vars: &Map<String, Value>) -> ProfilerMarker {
    profiler_marker(
        vars.iter()
            .filter_map(|(k, v)| v.as_str().map(|v| (k.as_str(), v))),
    )
}

/// Parse `NAME=value` lines of the worker services' environment.
pub fn parse_service_environment(output: &str) -> BTreeMap<String, String> {
    output
        .lines()
        .filter_map(|line| line.trim().split_once('='))
        .map(|(k, v)| (k.trim().to_ascii_uppercase(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// Classify the profiler selected by a set of environment variables.
///
/// A foreign profiler wins over this agent's when both runtimes are
/// configured; `*_ENABLE_PROFILING=0` turns the matching runtime off.
pub fn profiler_marker<'a>(vars: impl IntoIterator<Item = (&'a str, &'a str)>) -> ProfilerMarker {
    let vars: BTreeMap<String, &str> = vars
        .into_iter()
        .map(|(k, v)| (k.to_ascii_uppercase(), v.trim()))
        .collect();

    let mut marker = ProfilerMarker::None;
    for (clsid_var, enable_var) in [
        ("COR_PROFILER", "COR_ENABLE_PROFILING"),
        ("CORECLR_PROFILER", "CORECLR_ENABLE_PROFILING"),
    ] {
        let Some(clsid) = vars.get(clsid_var).filter(|v| !v.is_empty()) else {
            continue;
        };
        if vars.get(enable_var) == Some(&"0") {
            continue;
        }
        let clsid = clsid.trim_matches(|c: char| c == '{' || c == '}');
        if clsid.eq_ignore_ascii_case(APPDYNAMICS_PROFILER_CLSID) {
            if marker == ProfilerMarker::None {
                marker = ProfilerMarker::ThisAgent;
            }
        } else {
            marker = ProfilerMarker::OtherAgent;
        }
    }
    marker
}
