//! Per-run event log: a human-readable text file and a JSON-lines file,
//! both append-only and flushed per record.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::PrivacyMode;
use crate::error::StorageError;
use crate::sanitize::redact_path;

/// Context keys whose string values are file system paths.
const PATH_KEYS: [&str; 6] = ["file", "source", "destination", "archive", "entry", "path"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub ts: String,
    pub run_id: String,
    pub level: LogLevel,
    pub event: String,
    pub message: String,
    pub context: Value,
}

impl LogRecord {
    /// `[ts] LEVEL event: message | k=v, k=v` with keys sorted.
    pub fn to_text_line(&self) -> String {
        let mut line = format!(
            "[{}] {} {}: {}",
            self.ts,
            self.level.as_str(),
            self.event,
            self.message
        );
        if let Value::Object(map) = &self.context {
            if !map.is_empty() {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let pairs: Vec<String> = keys
                    .into_iter()
                    .map(|k| format!("{}={}", k, display_value(&map[k])))
                    .collect();
                line.push_str(" | ");
                line.push_str(&pairs.join(", "));
            }
        }
        line
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

struct Sinks {
    text: BufWriter<File>,
    jsonl: BufWriter<File>,
}

pub struct RunLog {
    run_id: String,
    text_path: PathBuf,
    jsonl_path: PathBuf,
    privacy: PrivacyMode,
    sinks: Option<Sinks>,
}

fn open_append(path: &Path) -> Result<BufWriter<File>, StorageError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(BufWriter::new)
        .map_err(|e| StorageError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
}

impl RunLog {
    /// Opens `run_<id>.log` and `run_<id>.jsonl` under `logs_dir`. With
    /// `enabled = false` the paths are still computed but nothing is written.
    pub fn open(
        logs_dir: &Path,
        run_id: &str,
        enabled: bool,
        privacy: PrivacyMode,
    ) -> Result<Self, StorageError> {
        let text_path = logs_dir.join(format!("run_{}.log", run_id));
        let jsonl_path = logs_dir.join(format!("run_{}.jsonl", run_id));

        let sinks = if enabled {
            std::fs::create_dir_all(logs_dir).map_err(|e| StorageError::CreateDirectory {
                path: logs_dir.to_path_buf(),
                source: e,
            })?;
            Some(Sinks {
                text: open_append(&text_path)?,
                jsonl: open_append(&jsonl_path)?,
            })
        } else {
            None
        };

        Ok(Self {
            run_id: run_id.to_string(),
            text_path,
            jsonl_path,
            privacy,
            sinks,
        })
    }

    pub fn text_path(&self) -> &Path {
        &self.text_path
    }

    pub fn jsonl_path(&self) -> &Path {
        &self.jsonl_path
    }

    #[cfg(test)]
    fn is_enabled(&self) -> bool {
        self.sinks.is_some()
    }

    pub fn log(&mut self, level: LogLevel, event: &str, message: &str, context: Value) -> LogRecord {
        let record = LogRecord {
            ts: Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            run_id: self.run_id.clone(),
            level,
            event: event.to_string(),
            message: message.to_string(),
            context: self.redact(context),
        };

        mirror_to_tracing(&record);
        self.write(&record);
        record
    }

    /// Flushes and closes both files. Later records are only mirrored to
    /// tracing.
    pub fn close(&mut self) {
        if let Some(mut sinks) = self.sinks.take() {
            let _ = sinks.text.flush();
            let _ = sinks.jsonl.flush();
        }
    }

    fn redact(&self, context: Value) -> Value {
        let Value::Object(mut map) = context else {
            return Value::Object(serde_json::Map::new());
        };
        if self.privacy == PrivacyMode::Redacted {
            for key in PATH_KEYS {
                if let Some(Value::String(s)) = map.get_mut(key) {
                    *s = redact_path(Path::new(s.as_str()));
                }
            }
        }
        Value::Object(map)
    }

    fn write(&mut self, record: &LogRecord) {
        let Some(sinks) = self.sinks.as_mut() else {
            return;
        };

        let json = serde_json::to_string(record).unwrap_or_default();
        let result = writeln!(sinks.text, "{}", record.to_text_line())
            .and_then(|_| sinks.text.flush())
            .and_then(|_| writeln!(sinks.jsonl, "{}", json))
            .and_then(|_| sinks.jsonl.flush());

        if let Err(e) = result {
            tracing::warn!(error = %e, "Run log write failed; disabling file sinks");
            self.sinks = None;
        }
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        self.close();
    }
}

fn mirror_to_tracing(record: &LogRecord) {
    let event = record.event.as_str();
    let context = record.context.to_string();
    match record.level {
        LogLevel::Info => tracing::info!(event, %context, "{}", record.message),
        LogLevel::Warning => tracing::warn!(event, %context, "{}", record.message),
        LogLevel::Error => tracing::error!(event, %context, "{}", record.message),
    }
}
