//! JSONL log sink: appends one JSON object per line to per-category,
//! per-UTC-day files under a logs directory. Disabled state is gated on a
//! shared flag so the `/api/settings/server-logs` endpoint can toggle it at
//! runtime without touching the hub.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogSinkError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write log file {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One JSONL line written to a session log file.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry<'a> {
    pub timestamp: String,
    pub level: &'a str,
    pub category: &'a str,
    pub event: &'a str,
    pub data: &'a serde_json::Value,
}

/// Implemented by anything that accepts decoded log entries. The hub holds
/// an `Arc<dyn LogSink>` so the HTTP settings endpoint and the capture
/// orchestrator can share one sink without lifetime coupling.
pub trait LogSink: Send + Sync {
    fn write_logs(&self, logs: &[serde_json::Value]);
    fn set_enabled(&self, enabled: bool);
    fn is_enabled(&self) -> bool;
}

/// Appends to `<logs_dir>/sessions/session_<date>.jsonl`,
/// `<logs_dir>/errors/errors_<date>.jsonl`, and
/// `<logs_dir>/debug/debug_<date>.jsonl`, one file per UTC calendar day.
pub struct JsonlLogSink {
    logs_dir: PathBuf,
    enabled: AtomicBool,
}

impl JsonlLogSink {
    /// Creates the three category subdirectories up front.
    pub fn new(logs_dir: impl Into<PathBuf>) -> Result<Arc<Self>, LogSinkError> {
        let logs_dir = logs_dir.into();
        for category in ["sessions", "errors", "debug"] {
            let dir = logs_dir.join(category);
            std::fs::create_dir_all(&dir)
                .map_err(|source| LogSinkError::CreateDir { path: dir, source })?;
        }
        Ok(Arc::new(JsonlLogSink {
            logs_dir,
            enabled: AtomicBool::new(true),
        }))
    }

    fn category_file(&self, category: &str) -> PathBuf {
        let date = Utc::now().format("%Y-%m-%d");
        self.logs_dir
            .join(category)
            .join(format!("{category}_{date}.jsonl"))
    }

    fn append_line(&self, path: &Path, line: &str) -> Result<(), LogSinkError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| LogSinkError::WriteFile {
                path: path.to_path_buf(),
                source,
            })?;
        writeln!(file, "{line}").map_err(|source| LogSinkError::WriteFile {
            path: path.to_path_buf(),
            source,
        })
    }

    fn append(&self, category: &str, value: &serde_json::Value) {
        let path = self.category_file(category);
        let Ok(line) = serde_json::to_string(value) else {
            return;
        };
        if let Err(err) = self.append_line(&path, &line) {
            tracing::warn!(%err, "failed to append log line");
        }
    }
}

impl LogSink for JsonlLogSink {
    /// Inbound `{"type":"logs","logs":[...]}` payload, forwarded verbatim
    /// into the session log (each entry is opaque client-side state, not
    /// reinterpreted here).
    fn write_logs(&self, logs: &[serde_json::Value]) {
        if !self.is_enabled() {
            return;
        }
        for entry in logs {
            self.append("sessions", entry);
        }
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        if enabled {
            tracing::info!("server-side logging enabled");
        } else {
            tracing::warn!("server-side logging disabled");
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl JsonlLogSink {
    /// Writes a structured server-side log line, independent of the
    /// enable/disable flag that gates client-forwarded logs.
    pub fn log(&self, level: &str, category: &str, event: &str, data: &serde_json::Value) {
        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            level,
            category,
            event,
            data,
        };
        let Ok(value) = serde_json::to_value(&entry) else {
            return;
        };
        self.append("sessions", &value);
        if level == "ERROR" || level == "CRITICAL" {
            self.append("errors", &value);
        }
        if level == "DEBUG" {
            self.append("debug", &value);
        }
    }
}
