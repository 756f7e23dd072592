//! Diagnostics attached to resources and the sinks that report them

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Message severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// A diagnostic produced while processing a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub line: u32,
    pub column: u32,
    pub text: String,
    pub severity: Severity,
    /// Rendered cause, if the message originated from an error.
    pub cause: Option<String>,
}

impl Message {
    pub fn new(line: u32, column: u32, text: impl Into<String>, severity: Severity) -> Self {
        Self {
            line,
            column,
            text: text.into(),
            severity,
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}] {}", self.line, self.column, self.text)?;
        if let Some(cause) = &self.cause {
            write!(f, " ({})", cause)?;
        }
        Ok(())
    }
}

/// Receives every message held by the build state at commit.
pub trait MessageSink: Send {
    fn message(&mut self, resource: &Path, message: &Message);
}

/// Reports messages as `tracing` events at the matching level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl MessageSink for TracingSink {
    fn message(&mut self, resource: &Path, message: &Message) {
        let resource = resource.display().to_string();
        match message.severity {
            Severity::Info => info!(
                resource = %resource,
                line = message.line,
                column = message.column,
                cause = message.cause.as_deref(),
                "{}",
                message.text
            ),
            Severity::Warning => warn!(
                resource = %resource,
                line = message.line,
                column = message.column,
                cause = message.cause.as_deref(),
                "{}",
                message.text
            ),
            Severity::Error => error!(
                resource = %resource,
                line = message.line,
                column = message.column,
                cause = message.cause.as_deref(),
                "{}",
                message.text
            ),
        }
    }
}

/// Collects reported messages; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    records: Arc<Mutex<Vec<(PathBuf, Message)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(PathBuf, Message)> {
        self.records.lock().clone()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl MessageSink for RecordingSink {
    fn message(&mut self, resource: &Path, message: &Message) {
        self.records
            .lock()
            .push((resource.to_path_buf(), message.clone()));
    }
}
