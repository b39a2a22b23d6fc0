//! Append-only failure sink.
//!
//! Every failure is kept in memory for the end-of-run summary, emitted as a tracing
//! event, and appended to the log file as `<timestamp> - <LEVEL> - <message>`.
//! Reporting never fails: if the log file cannot be written, the line goes to stderr.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// One record dropped
    RecordLocal,
    /// One batch lost
    WriteLocal,
    /// Extraction halted
    StreamFatal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub context: String,
    pub message: String,
}

pub struct FailureLog {
    entries: Mutex<Vec<Failure>>,
    sink: Mutex<Option<File>>,
}

impl FailureLog {
    /// Appends to the log file at `path`, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            entries: Mutex::new(Vec::new()),
            sink: Mutex::new(Some(file)),
        })
    }

    /// Keeps failures in memory and in tracing only.
    pub fn in_memory() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            sink: Mutex::new(None),
        }
    }

    pub fn record_local(&self, title: &str, err: &dyn Display) {
        let message = format!("Error cleaning text for title '{}': {}", title, err);
        error!(title = title, error = %err, "Record dropped");
        self.push(FailureKind::RecordLocal, title, message);
    }

    pub fn write_local(&self, batch: u64, err: &dyn Display) {
        let message = format!("Error writing batch {}: {}", batch, err);
        warn!(batch = batch, error = %err, "Batch write failed");
        self.push(FailureKind::WriteLocal, &format!("batch {}", batch), message);
    }

    pub fn stream_fatal(&self, context: &str, err: &dyn Display) {
        let message = format!("Error parsing the file {}: {}", context, err);
        error!(input = context, error = %err, "Extraction halted");
        self.push(FailureKind::StreamFatal, context, message);
    }

    /// Terminal summary line: INFO when the run completed, ERROR when it stopped early.
    pub fn summary(&self, message: &str, completed: bool) {
        if completed {
            info!("{}", message);
            self.write_line("INFO", message);
        } else {
            error!("{}", message);
            self.write_line("ERROR", message);
        }
    }

    pub fn entries(&self) -> Vec<Failure> {
        lock(&self.entries).clone()
    }

    pub fn count(&self, kind: FailureKind) -> usize {
        lock(&self.entries).iter().filter(|f| f.kind == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// Flushes and releases the log file. Later failures are still kept in memory.
    pub fn close(&self) {
        if let Some(mut file) = lock(&self.sink).take() {
            if let Err(e) = file.flush() {
                eprintln!("failed to flush failure log: {}", e);
            }
        }
    }

    fn push(&self, kind: FailureKind, context: &str, message: String) {
        let level = match kind {
            FailureKind::WriteLocal => "WARNING",
            FailureKind::RecordLocal | FailureKind::StreamFatal => "ERROR",
        };
        self.write_line(level, &message);
        lock(&self.entries).push(Failure {
            kind,
            context: context.to_string(),
            message,
        });
    }

    fn write_line(&self, level: &str, message: &str) {
        let line = format_line(&Local::now(), level, message);
        if let Some(file) = lock(&self.sink).as_mut() {
            if let Err(e) = file.write_all(line.as_bytes()) {
                eprintln!("failed to write failure log: {}", e);
                eprint!("{}", line);
            }
        }
    }
}

impl Drop for FailureLog {
    fn drop(&mut self) {
        self.close();
    }
}

/// Formats one log line, e.g. `2024-01-15 10:30:00,123 - ERROR - message`.
pub fn format_line(at: &DateTime<Local>, level: &str, message: &str) -> String {
    format!("{} - {} - {}\n", at.format("%Y-%m-%d %H:%M:%S,%3f"), level, message)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
