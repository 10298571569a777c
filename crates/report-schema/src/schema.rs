//! JSON schema definitions for report validation.

/// JSON Schema for report.json.
pub const REPORT_SCHEMA: &str = r##"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "$id": "https://iisrecon.dev/schemas/report.json",
  "title": "IISRecon Host Report",
  "type": "object",
  "required": ["metadata", "instrumentation_mode", "groups", "conflicts", "verdict"],
  "definitions": {
    "pool": {
      "type": "object",
      "required": ["name", "state", "pipeline_mode", "identity", "auto_start", "profiler"],
      "properties": {
        "name": { "type": "string" },
        "state": { "type": "string" },
        "runtime_version": { "type": ["string", "null"] },
        "pipeline_mode": { "type": "string" },
        "identity": { "type": "string" },
        "auto_start": { "type": "boolean" },
        "profiler": { "type": "string", "enum": ["none", "this-agent", "other-agent", "unknown"] }
      }
    },
    "entry": {
      "type": "object",
      "required": [
        "application",
        "identifier",
        "identifier_source",
        "site_exists_in_topology",
        "application_exists_in_topology"
      ],
      "properties": {
        "application": {
          "type": "object",
          "required": ["controller_application", "site", "path", "tier", "inferred_from_automatic_mode"],
          "properties": {
            "controller_application": { "type": "string", "minLength": 1 },
            "site": { "type": "string" },
            "path": { "type": "string", "pattern": "^/" },
            "tier": { "type": "string" },
            "inferred_from_automatic_mode": { "type": "boolean" }
          }
        },
        "identifier": {
          "type": "object",
          "required": ["remainder", "matched"],
          "properties": {
            "code": { "type": ["string", "null"], "pattern": "^[0-9]{4,5}$" },
            "delimiter": { "type": ["string", "null"], "enum": ["-", "_", null] },
            "remainder": { "type": "string" },
            "matched": { "type": "boolean" }
          }
        },
        "identifier_source": { "type": "string", "enum": ["controller_application", "tier", "none"] },
        "site_exists_in_topology": { "type": "boolean" },
        "application_exists_in_topology": { "type": "boolean" },
        "site_id": { "type": ["integer", "null"] },
        "pool_name": { "type": ["string", "null"] },
        "pool": {
          "oneOf": [
            { "type": "null" },
            { "$ref": "#/definitions/pool" }
          ]
        }
      }
    }
  },
  "properties": {
    "metadata": {
      "type": "object",
      "required": ["schema_version", "run_id", "host", "started_at", "completed_at", "duration_ms"],
      "properties": {
        "schema_version": { "type": "string", "pattern": "^\\d+\\.\\d+\\.\\d+$" },
        "run_id": { "type": "string", "format": "uuid" },
        "host": { "type": "string" },
        "started_at": { "type": "string", "format": "date-time" },
        "completed_at": { "type": "string", "format": "date-time" },
        "duration_ms": { "type": "integer", "minimum": 0 },
        "tool_version": { "type": "string" }
      }
    },
    "controller": {
      "type": ["object", "null"],
      "required": ["host", "port", "tls_enabled", "account_name"],
      "properties": {
        "host": { "type": "string" },
        "port": { "type": "integer", "minimum": 0, "maximum": 65535 },
        "tls_enabled": { "type": "boolean" },
        "account_name": { "type": "string" }
      }
    },
    "instrumentation_mode": {
      "type": "string",
      "enum": ["automatic", "manual", "not_configured"]
    },
    "standalone_applications": {
      "type": "array",
      "items": {
        "type": "object",
        "required": ["executable", "tier"],
        "properties": {
          "executable": { "type": "string" },
          "tier": { "type": "string" },
          "node": { "type": ["string", "null"] }
        }
      }
    },
    "groups": {
      "type": "array",
      "items": {
        "type": "object",
        "required": ["key", "entries", "pools", "delimiters", "shared_pools"],
        "properties": {
          "key": { "type": "string", "pattern": "^([0-9]{4,5}|UNKNOWN)$" },
          "entries": { "type": "array", "items": { "$ref": "#/definitions/entry" } },
          "pools": { "type": "array", "items": { "type": "string" }, "uniqueItems": true },
          "delimiters": {
            "type": "array",
            "items": { "type": "string", "enum": ["-", "_"] },
            "uniqueItems": true
          },
          "shared_pools": { "type": "array", "items": { "type": "string" }, "uniqueItems": true }
        }
      }
    },
    "conflicts": {
      "type": "array",
      "items": {
        "type": "object",
        "required": ["kind", "severity", "entities", "recommendation"],
        "properties": {
          "kind": {
            "type": "string",
            "enum": [
              "pool-in-multiple-groups",
              "foreign-profiler",
              "declared-but-absent",
              "application-absent",
              "no-identifier",
              "present-but-undeclared",
              "delimiter-inconsistency"
            ]
          },
          "severity": { "type": "string", "enum": ["critical", "high", "medium", "low"] },
          "entities": { "type": "array", "items": { "type": "string" } },
          "recommendation": { "type": "string" }
        }
      }
    },
    "warnings": { "type": "array", "items": { "type": "string" } },
    "enumeration_errors": {
      "type": "array",
      "items": {
        "type": "object",
        "required": ["message"],
        "properties": {
          "entity": { "type": ["string", "null"] },
          "message": { "type": "string" }
        }
      }
    },
    "verdict": {
      "type": "object",
      "required": ["overall_status", "migration_readiness", "notes"],
      "properties": {
        "overall_status": { "type": "string", "enum": ["success", "partial_success", "failed"] },
        "migration_readiness": {
          "type": "string",
          "enum": ["ready", "ready_with_warnings", "requires_manual_intervention", "not_ready"]
        },
        "notes": { "type": "array", "items": { "type": "string" } }
      }
    }
  }
}"##;

/// Get the report schema as a parsed JSON value.
pub fn report_schema() -> serde_json::Value {
    serde_json::from_str(REPORT_SCHEMA).expect("Invalid report schema")
}
