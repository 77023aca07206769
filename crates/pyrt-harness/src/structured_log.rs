//! Structured JSONL logging for harness runs.
//!
//! Provides:
//! - [`LogEntry`]: one JSONL record with required and optional fields.
//! - [`LogEmitter`]: writes records to a file or an in-memory buffer.
//! - [`validate_log_line`]: checks a single line against the schema.
//!
//! Membrane lifecycle records convert into entries via
//! [`LogEntry::from_lifecycle`].

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use pyrt_membrane::LifecycleRecord;
use pyrt_membrane::lifecycle::LogLevel as MembraneLevel;
use serde::{Deserialize, Serialize};

use crate::verify::VerificationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<MembraneLevel> for LogLevel {
    fn from(level: MembraneLevel) -> Self {
        match level {
            MembraneLevel::Trace => Self::Trace,
            MembraneLevel::Debug => Self::Debug,
            MembraneLevel::Info => Self::Info,
            MembraneLevel::Warn => Self::Warn,
            MembraneLevel::Error => Self::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Ok,
    Failed,
}

/// Canonical structured log entry.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ptr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    #[must_use]
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            component: None,
            case_name: None,
            function: None,
            outcome: None,
            decision_id: None,
            ptr: None,
            size: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    #[must_use]
    pub fn with_case(mut self, case_name: impl Into<String>, function: impl Into<String>) -> Self {
        self.case_name = Some(case_name.into());
        self.function = Some(function.into());
        self
    }

    #[must_use]
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Entry for one verified fixture case.
    #[must_use]
    pub fn from_result(trace_id: impl Into<String>, result: &VerificationResult) -> Self {
        let (level, outcome) = if result.passed {
            (LogLevel::Info, Outcome::Pass)
        } else {
            (LogLevel::Error, Outcome::Fail)
        };
        Self::new(trace_id, level, "case_result")
            .with_component(result.family.clone())
            .with_case(result.case_name.clone(), result.function.clone())
            .with_outcome(outcome)
            .with_details(serde_json::json!({
                "expected": result.expected,
                "actual": result.actual,
            }))
    }

    /// Entry for a drained membrane lifecycle record; keeps its trace id.
    #[must_use]
    pub fn from_lifecycle(record: &LifecycleRecord) -> Self {
        let outcome = if record.outcome == "ok" {
            Outcome::Ok
        } else {
            Outcome::Failed
        };
        let mut entry = Self::new(record.trace_id.clone(), record.level.into(), record.event)
            .with_component(record.component)
            .with_outcome(outcome);
        entry.decision_id = Some(record.decision_id);
        entry.ptr = record.ptr.map(|p| format!("{p:#x}"));
        entry.size = record.size;
        if !record.details.is_empty() {
            entry.details = Some(serde_json::Value::String(record.details.clone()));
        }
        entry
    }

    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// JSONL writer with sequential trace ids `<run_id>::<seq>`.
pub struct LogEmitter<W: Write> {
    writer: W,
    seq: u64,
    run_id: String,
}

impl LogEmitter<BufWriter<File>> {
    pub fn to_file(path: &Path, run_id: &str) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file), run_id))
    }
}

impl LogEmitter<Vec<u8>> {
    #[must_use]
    pub fn to_buffer(run_id: &str) -> Self {
        Self::new(Vec::new(), run_id)
    }
}

impl<W: Write> LogEmitter<W> {
    pub fn new(writer: W, run_id: &str) -> Self {
        Self {
            writer,
            seq: 0,
            run_id: run_id.to_owned(),
        }
    }

    /// Next trace id for this run.
    pub fn next_trace_id(&mut self) -> String {
        self.seq += 1;
        format!("{}::{:04}", self.run_id, self.seq)
    }

    /// Emit a bare event with a fresh trace id.
    pub fn emit(&mut self, level: LogLevel, event: &str) -> std::io::Result<LogEntry> {
        let trace_id = self.next_trace_id();
        let entry = LogEntry::new(trace_id, level, event);
        self.write_line(&entry)?;
        Ok(entry)
    }

    /// Emit a populated entry; an empty trace id is filled in.
    pub fn emit_entry(&mut self, mut entry: LogEntry) -> std::io::Result<()> {
        if entry.trace_id.is_empty() {
            entry.trace_id = self.next_trace_id();
        }
        self.write_line(&entry)
    }

    fn write_line(&mut self, entry: &LogEntry) -> std::io::Result<()> {
        let line = entry.to_jsonl().map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }

    /// The underlying writer (for buffers: the bytes written so far).
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Validation error for a log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for LogValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "field '{}': {}", self.field, self.message)
    }
}

impl std::error::Error for LogValidationError {}

/// Check that `line` is a JSON object with the required fields and a known
/// level.
pub fn validate_log_line(line: &str) -> Result<LogEntry, LogValidationError> {
    let value: serde_json::Value = serde_json::from_str(line).map_err(|e| LogValidationError {
        field: String::from("<line>"),
        message: e.to_string(),
    })?;
    for field in ["timestamp", "trace_id", "level", "event"] {
        match value.get(field) {
            Some(serde_json::Value::String(s)) if !s.is_empty() => {}
            _ => {
                return Err(LogValidationError {
                    field: field.to_owned(),
                    message: String::from("missing or empty"),
                });
            }
        }
    }
    serde_json::from_value(value).map_err(|e| LogValidationError {
        field: String::from("level"),
        message: e.to_string(),
    })
}

/// Current UTC time as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
#[must_use]
pub fn now_utc() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format_utc(duration.as_secs(), duration.subsec_millis())
}

fn format_utc(secs: u64, millis: u32) -> String {
    let days = secs / 86_400;
    let rem = secs % 86_400;
    let (year, month, day) = civil_from_days(days);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{millis:03}Z",
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60,
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian date.
fn civil_from_days(days: u64) -> (u64, u64, u64) {
    let z = days + 719_468;
    let era = z / 146_097;
    let doe = z % 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + u64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_calendar_correct() {
        assert_eq!(format_utc(0, 0), "1970-01-01T00:00:00.000Z");
        assert_eq!(format_utc(951_782_400, 5), "2000-02-29T00:00:00.005Z");
        assert_eq!(format_utc(1_767_225_599, 999), "2025-12-31T23:59:59.999Z");
    }

    #[test]
    fn entry_serializes_required_fields_only() {
        let entry = LogEntry::new("run::0001", LogLevel::Info, "start");
        let json: serde_json::Value = serde_json::from_str(&entry.to_jsonl().unwrap()).unwrap();
        assert_eq!(json["trace_id"], "run::0001");
        assert_eq!(json["level"], "info");
        assert!(json.get("component").is_none());
        assert!(json.get("outcome").is_none());
    }

    #[test]
    fn emitter_numbers_and_validates_lines() {
        let mut emitter = LogEmitter::to_buffer("selftest");
        emitter.emit(LogLevel::Info, "run_start").unwrap();
        emitter
            .emit_entry(
                LogEntry::new("", LogLevel::Warn, "custom").with_outcome(Outcome::Fail),
            )
            .unwrap();
        let text = String::from_utf8(emitter.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let second = validate_log_line(lines[1]).unwrap();
        assert_eq!(second.trace_id, "selftest::0002");
        assert_eq!(second.outcome, Some(Outcome::Fail));
    }

    #[test]
    fn validation_rejects_bad_lines() {
        assert_eq!(validate_log_line("not json").unwrap_err().field, "<line>");
        let missing = r#"{"timestamp":"t","trace_id":"x","level":"info"}"#;
        assert_eq!(validate_log_line(missing).unwrap_err().field, "event");
        let bad_level = r#"{"timestamp":"t","trace_id":"x","level":"loud","event":"e"}"#;
        assert_eq!(validate_log_line(bad_level).unwrap_err().field, "level");
    }

    #[test]
    fn lifecycle_records_keep_trace_ids() {
        let record = LifecycleRecord {
            decision_id: 7,
            trace_id: String::from("membrane::pool::grow::0000000000000007"),
            level: MembraneLevel::Debug,
            component: "pool",
            event: "grow",
            ptr: Some(0x1000),
            size: Some(128),
            outcome: "ok",
            details: String::from("growths=1"),
        };
        let entry = LogEntry::from_lifecycle(&record);
        assert_eq!(entry.trace_id, record.trace_id);
        assert_eq!(entry.component.as_deref(), Some("pool"));
        assert_eq!(entry.ptr.as_deref(), Some("0x1000"));
        assert_eq!(entry.decision_id, Some(7));
        assert_eq!(entry.outcome, Some(Outcome::Ok));
    }
}
