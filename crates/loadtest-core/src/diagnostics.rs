//! Diagnostics sink injected into every pipeline stage.
//!
//! Stages report warnings, failures and synthesized defaults through a
//! [`Diagnostics`] trait object instead of a process-wide logger. The binary
//! passes a [`TracingSink`]; tests pass a [`MemorySink`] and inspect what was
//! recorded.

use std::cell::RefCell;
use std::fmt;

// ── Event types ───────────────────────────────────────────────────────────────

/// Pipeline stage that emitted an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Loader,
    Normalizer,
    Aggregator,
    Plots,
    Report,
    Pipeline,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Loader => "loader",
            Stage::Normalizer => "normalizer",
            Stage::Aggregator => "aggregator",
            Stage::Plots => "plots",
            Stage::Report => "report",
            Stage::Pipeline => "pipeline",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

/// One recorded diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticEvent {
    pub stage: Stage,
    pub severity: Severity,
    pub message: String,
    /// Set only for events announcing a synthesized default value.
    pub synthesized_default: bool,
}

// ── Diagnostics trait ─────────────────────────────────────────────────────────

/// Destination for stage diagnostics.
pub trait Diagnostics {
    /// Record a single event.
    fn record(&self, event: DiagnosticEvent);

    fn debug(&self, stage: Stage, message: &str) {
        self.emit(stage, Severity::Debug, message);
    }

    fn info(&self, stage: Stage, message: &str) {
        self.emit(stage, Severity::Info, message);
    }

    fn warn(&self, stage: Stage, message: &str) {
        self.emit(stage, Severity::Warning, message);
    }

    fn error(&self, stage: Stage, message: &str) {
        self.emit(stage, Severity::Error, message);
    }

    /// Announce that `field` of `table` had no source column and every row
    /// received the documented default `value`.
    fn synthesized_default(&self, stage: Stage, table: &str, field: &str, value: &str) {
        self.record(DiagnosticEvent {
            stage,
            severity: Severity::Warning,
            message: format!(
                "Column {} not found in {}; using synthesized default {}",
                field, table, value
            ),
            synthesized_default: true,
        });
    }

    fn emit(&self, stage: Stage, severity: Severity, message: &str) {
        self.record(DiagnosticEvent {
            stage,
            severity,
            message: message.to_string(),
            synthesized_default: false,
        });
    }
}

// ── TracingSink ───────────────────────────────────────────────────────────────

/// Forwards every event to `tracing` with a structured `stage` field.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl Diagnostics for TracingSink {
    fn record(&self, event: DiagnosticEvent) {
        let stage = event.stage.as_str();
        let synthesized = event.synthesized_default;
        match event.severity {
            Severity::Debug => tracing::debug!(stage, "{}", event.message),
            Severity::Info => tracing::info!(stage, "{}", event.message),
            Severity::Warning => {
                tracing::warn!(stage, synthesized_default = synthesized, "{}", event.message)
            }
            Severity::Error => tracing::error!(stage, "{}", event.message),
        }
    }
}

// ── MemorySink ────────────────────────────────────────────────────────────────

/// Keeps every event in memory so tests can assert on them.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: RefCell<Vec<DiagnosticEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events recorded so far.
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.borrow().clone()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| e.severity == severity)
            .count()
    }

    /// Events that announced a synthesized default.
    pub fn synthesized_defaults(&self) -> Vec<DiagnosticEvent> {
        self.events
            .borrow()
            .iter()
            .filter(|e| e.synthesized_default)
            .cloned()
            .collect()
    }

    /// `true` when any recorded message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.events
            .borrow()
            .iter()
            .any(|e| e.message.contains(needle))
    }
}

impl Diagnostics for MemorySink {
    fn record(&self, event: DiagnosticEvent) {
        self.events.borrow_mut().push(event);
    }
}
