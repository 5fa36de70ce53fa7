//! Append-only execution report.
//!
//! When a report path is configured, every completed tool call appends one
//! entry and the whole `{"entries": [...]}` document is rewritten: simple,
//! not incremental. Appends serialize on a lock. Without a path the sink is
//! a no-op. Failed calls are recorded with their error text; the sink never
//! swallows an error.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::error;

/// One recorded tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    /// RFC3339 timestamp
    pub timestamp: String,
    /// Upstream name
    pub server: String,
    /// Bare tool name
    pub tool: String,
    /// Arguments as forwarded
    pub arguments: Value,
    /// Result text for successful calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Error text for failed calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The report sink.
pub struct ReportSink {
    path: Option<PathBuf>,
    entries: Mutex<Vec<ReportEntry>>,
}

impl ReportSink {
    /// Sink writing to `path`, or a no-op sink when `path` is `None`.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Recording sink without a backing file, for tests.
    pub fn in_memory() -> Self {
        Self {
            path: Some(PathBuf::new()),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Whether appends record anything at all.
    pub fn enabled(&self) -> bool {
        self.path.is_some()
    }

    /// Record one completed call.
    pub fn append(&self, server: &str, tool: &str, arguments: &Value, outcome: Result<&str, &str>) {
        let Some(path) = &self.path else {
            return;
        };
        let entry = ReportEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            server: server.to_owned(),
            tool: tool.to_owned(),
            arguments: arguments.clone(),
            result: outcome.ok().map(str::to_owned),
            error: outcome.err().map(str::to_owned),
        };
        let entries = {
            let mut entries = self.entries.lock();
            entries.push(entry);
            entries.clone()
        };
        if path.as_os_str().is_empty() {
            return;
        }
        let doc = json!({ "entries": entries });
        if let Err(e) = std::fs::write(path, format!("{doc:#}")) {
            error!("failed to write report {}: {e}", path.display());
        }
    }

    /// Copy of the recorded entries.
    pub fn entries_snapshot(&self) -> Vec<ReportEntry> {
        self.entries.lock().clone()
    }
}
