//! Injected logging. Replaces the original's module-level `logging.getLogger`
//! with a trait object the endpoint/dispatcher hold a handle to, so tests can
//! supply a capturing implementation instead of scraping a global logger
//! (see the protocol spec's design notes, §9).
//!
//! [`TracingLogger`] forwards to the `tracing` crate the way this crate's
//! teacher binaries (`jetsocat`, `mcp-proxy`) set up logging.

use std::sync::{Arc, Mutex};

/// Debug/info/warn sink. Implementations receive a fully formatted line;
/// the core never builds a `tracing::Value` or format-args directly so it
/// stays agnostic of which concrete logger is in play.
pub trait Logger: Send + Sync {
    fn debug(&self, line: &str);
    fn info(&self, line: &str);
    fn warn(&self, line: &str);
}

/// Forwards to the `tracing` crate's global dispatcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, line: &str) {
        tracing::debug!("{line}");
    }

    fn info(&self, line: &str) {
        tracing::info!("{line}");
    }

    fn warn(&self, line: &str) {
        tracing::warn!("{line}");
    }
}

/// Captures every logged line in order, tagged with its level. Intended for
/// assertions in dispatcher/endpoint tests, mirroring the original test
/// suite's `TestHandler.get_messages()`.
#[derive(Debug, Default, Clone)]
pub struct RecordingLogger {
    lines: Arc<Mutex<Vec<(&'static str, String)>>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured lines, in order, as `"LEVEL: message"`.
    pub fn messages(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .map(|(level, line)| format!("{level}: {line}"))
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().unwrap().iter().any(|(_, line)| line.contains(needle))
    }
}

impl Logger for RecordingLogger {
    fn debug(&self, line: &str) {
        self.lines.lock().unwrap().push(("DEBUG", line.to_owned()));
    }

    fn info(&self, line: &str) {
        self.lines.lock().unwrap().push(("INFO", line.to_owned()));
    }

    fn warn(&self, line: &str) {
        self.lines.lock().unwrap().push(("WARN", line.to_owned()));
    }
}
