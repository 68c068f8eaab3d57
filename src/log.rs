//! Operator-facing run log.
//!
//! Every pipeline component receives a [`RunLogger`] handle explicitly. The
//! handle forwards timestamped, leveled entries to a [`LogSink`] and mirrors
//! them to `tracing` so `RUST_LOG` diagnostics see the same events.

use chrono::{DateTime, Local};
use console::style;
use std::sync::{Arc, Mutex};

/// Severity of a run log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    /// Run-aborting condition. The controller stops after logging one.
    Critical,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARNING"),
            LogLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A single run log entry.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] [{}] {}",
            self.timestamp.format("%H:%M:%S"),
            self.level,
            self.message
        )
    }
}

/// Destination for run log entries.
pub trait LogSink: Send + Sync {
    fn record(&self, entry: &LogEntry);
}

/// Cloneable logger handle passed into every pipeline component.
#[derive(Clone)]
pub struct RunLogger {
    sink: Arc<dyn LogSink>,
}

impl RunLogger {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// Logger that prints to the terminal.
    pub fn console() -> Self {
        Self::new(Arc::new(ConsoleSink))
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry {
            timestamp: Local::now(),
            level,
            message: message.into(),
        };

        match level {
            LogLevel::Info => tracing::info!("{}", entry.message),
            LogLevel::Warning => tracing::warn!("{}", entry.message),
            LogLevel::Critical => tracing::error!("{}", entry.message),
        }

        self.sink.record(&entry);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    pub fn critical(&self, message: impl Into<String>) {
        self.log(LogLevel::Critical, message);
    }
}

impl std::fmt::Debug for RunLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLogger").finish_non_exhaustive()
    }
}

/// Prints entries to stderr with a colored level tag.
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn record(&self, entry: &LogEntry) {
        let level = match entry.level {
            LogLevel::Info => style(entry.level.to_string()).cyan(),
            LogLevel::Warning => style(entry.level.to_string()).yellow(),
            LogLevel::Critical => style(entry.level.to_string()).red().bold(),
        };
        eprintln!(
            "{} [{}] {}",
            style(format!("[{}]", entry.timestamp.format("%H:%M:%S"))).dim(),
            level,
            entry.message
        );
    }
}

/// Keeps entries in memory. Useful for tests and for rendering the log later.
#[derive(Default, Clone)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Messages logged at the given level, in order.
    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.level == level)
            .map(|e| e.message)
            .collect()
    }
}

impl LogSink for MemorySink {
    fn record(&self, entry: &LogEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.clone());
        }
    }
}
