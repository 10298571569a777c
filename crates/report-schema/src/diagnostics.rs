//! Diagnostics log recording what each stage of a host run observed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of the host run that produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Parse,
    Topology,
    Correlate,
    Classify,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Parse => write!(f, "parse"),
            Phase::Topology => write!(f, "topology"),
            Phase::Correlate => write!(f, "correlate"),
            Phase::Classify => write!(f, "classify"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warning,
    Error,
}

/// A single diagnostics entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticEntry {
    /// Unique sequence number.
    pub seq: u64,
    pub recorded_at: DateTime<Utc>,
    pub phase: Phase,
    pub level: Level,
    pub message: String,
}

/// Append-only diagnostics for one host run (written as JSONL).
#[derive(Debug, Clone, Default)]
pub struct DiagnosticLog {
    entries: Vec<DiagnosticEntry>,
    next_seq: u64,
}

impl DiagnosticLog {
    /// Create a new empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn record(&mut self, phase: Phase, level: Level, message: impl Into<String>) {
        self.entries.push(DiagnosticEntry {
            seq: self.next_seq,
            recorded_at: Utc::now(),
            phase,
            level,
            message: message.into(),
        });
        self.next_seq += 1;
    }

    pub fn info(&mut self, phase: Phase, message: impl Into<String>) {
        self.record(phase, Level::Info, message);
    }

    pub fn warn(&mut self, phase: Phase, message: impl Into<String>) {
        self.record(phase, Level::Warning, message);
    }

    pub fn error(&mut self, phase: Phase, message: impl Into<String>) {
        self.record(phase, Level::Error, message);
    }

    /// Get all entries.
    pub fn entries(&self) -> &[DiagnosticEntry] {
        &self.entries
    }

    /// Messages at warning level or above for one phase.
    pub fn problems(&self, phase: Phase) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.phase == phase && e.level >= Level::Warning)
            .map(|e| e.message.as_str())
            .collect()
    }

    /// Convert to JSONL format.
    pub fn to_jsonl(&self) -> String {
        self.entries
            .iter()
            .filter_map(|e| serde_json::to_string(e).ok())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parse from JSONL format.
    pub fn from_jsonl(content: &str) -> Result<Self, serde_json::Error> {
        let mut log = Self::new();
        for line in content.lines() {
            if !line.trim().is_empty() {
                let entry: DiagnosticEntry = serde_json::from_str(line)?;
                log.entries.push(entry);
            }
        }
        if let Some(last) = log.entries.last() {
            log.next_seq = last.seq + 1;
        }
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_numbers_increase() {
        let mut log = DiagnosticLog::new();
        log.info(Phase::Parse, "document parsed");
        log.warn(Phase::Parse, "entry skipped");
        let seqs: Vec<u64> = log.entries().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1]);
    }

    #[test]
    fn test_problems_filters_phase_and_level() {
        let mut log = DiagnosticLog::new();
        log.info(Phase::Parse, "document parsed");
        log.warn(Phase::Parse, "entry skipped");
        log.error(Phase::Topology, "site failed");
        assert_eq!(log.problems(Phase::Parse), vec!["entry skipped"]);
        assert_eq!(log.problems(Phase::Topology), vec!["site failed"]);
        assert!(log.problems(Phase::Correlate).is_empty());
    }

    #[test]
    fn test_jsonl_resumes_sequence() {
        let mut log = DiagnosticLog::new();
        log.info(Phase::Correlate, "3 entries");
        log.warn(Phase::Correlate, "no identifier");

        let mut parsed = DiagnosticLog::from_jsonl(&log.to_jsonl()).unwrap();
        assert_eq!(parsed.entries().len(), 2);
        parsed.info(Phase::Classify, "ready");
        assert_eq!(parsed.entries()[2].seq, 2);
    }
}
