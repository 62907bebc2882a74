//! Diagnostics infrastructure for tracking issues during a power-flow run.
//!
//! Every warning or error raised by the kernel goes two places:
//!
//! - a caller-supplied [`DiagnosticSink`] (the live logger), and
//! - an accumulating [`Diagnostics`] list that batch callers can inspect after
//!   the run without scraping console output.
//!
//! [`Logger`] bundles both and is what the solver components receive. Islands
//! solved in parallel each get a [`Logger::child`] that shares the sink but owns
//! its own list; the driver merges the lists back in island order.
//!
//! # Example
//!
//! ```
//! use gflow_core::diagnostics::{Logger, MemorySink, Severity};
//! use std::sync::Arc;
//!
//! let sink = Arc::new(MemorySink::default());
//! let mut logger = Logger::with_sink(sink.clone());
//!
//! logger.warn("classifier", "There are no slack nodes selected");
//! logger.error_with_entity("retry", "Did not converge, even after retry", "island 2");
//!
//! assert_eq!(logger.diagnostics().warning_count(), 1);
//! assert_eq!(logger.diagnostics().error_count(), 1);
//! assert_eq!(sink.issues().len(), 2);
//! ```

use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Severity level for diagnostic issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Unusual but the run continued (e.g., promoted slack, clamped tap)
    Warning,
    /// Could not complete an island or method (e.g., retries exhausted)
    Error,
}

/// A single diagnostic issue encountered during a run
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    /// Severity of the issue
    pub severity: Severity,
    /// Category for grouping (e.g., "classifier", "taps", "solver", "retry")
    pub category: String,
    /// Human-readable description of the issue
    pub message: String,
    /// Optional entity reference (e.g., "bus 14", "branch 3", "island 1")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl DiagnosticIssue {
    pub fn new(
        severity: Severity,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            entity: None,
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };

        write!(f, "[{}:{}] {}", severity, self.category, self.message)?;

        if let Some(entity) = &self.entity {
            write!(f, " ({})", entity)?;
        }

        Ok(())
    }
}

/// Collection of diagnostic issues for a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    /// All collected issues
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a raw issue directly
    pub fn add(&mut self, issue: DiagnosticIssue) {
        self.issues.push(issue);
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    /// Get issues filtered by category
    pub fn issues_by_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a DiagnosticIssue> {
        self.issues.iter().filter(move |i| i.category == category)
    }

    /// Merge another diagnostics list into this one, preserving order
    pub fn merge(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
    }

    pub fn summary(&self) -> String {
        let warnings = self.warning_count();
        let errors = self.error_count();

        match (warnings, errors) {
            (0, 0) => "No issues".to_string(),
            (w, 0) => format!("{} warning{}", w, if w == 1 { "" } else { "s" }),
            (0, e) => format!("{} error{}", e, if e == 1 { "" } else { "s" }),
            (w, e) => format!(
                "{} warning{}, {} error{}",
                w,
                if w == 1 { "" } else { "s" },
                e,
                if e == 1 { "" } else { "s" }
            ),
        }
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Diagnostics: {}", self.summary())?;
        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }
        Ok(())
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Live destination for diagnostic issues.
///
/// Implementations must tolerate concurrent calls: islands solved on a worker
/// pool share one sink.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, issue: &DiagnosticIssue);
}

/// Forwards issues to `tracing` at the matching level.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, issue: &DiagnosticIssue) {
        let entity = issue.entity.as_deref().unwrap_or("-");
        match issue.severity {
            Severity::Warning => tracing::warn!(
                category = %issue.category,
                entity = %entity,
                "{}",
                issue.message
            ),
            Severity::Error => tracing::error!(
                category = %issue.category,
                entity = %entity,
                "{}",
                issue.message
            ),
        }
    }
}

/// Keeps a copy of every issue in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    issues: Mutex<Vec<DiagnosticIssue>>,
}

impl MemorySink {
    /// Snapshot of everything recorded so far
    pub fn issues(&self) -> Vec<DiagnosticIssue> {
        match self.issues.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&self, issue: &DiagnosticIssue) {
        let mut guard = match self.issues.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(issue.clone());
    }
}

// ============================================================================
// Logger
// ============================================================================

/// Sink plus accumulated list, handed to every solver component.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn DiagnosticSink>,
    diagnostics: Diagnostics,
    verbose: bool,
}

impl Default for Logger {
    fn default() -> Self {
        Self::with_sink(Arc::new(TracingSink))
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("diagnostics", &self.diagnostics)
            .field("verbose", &self.verbose)
            .finish()
    }
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            sink,
            diagnostics: Diagnostics::new(),
            verbose: false,
        }
    }

    /// Promote per-iteration progress messages from `debug` to `info`
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Fresh logger sharing the sink, with an empty issue list
    pub fn child(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            diagnostics: Diagnostics::new(),
            verbose: self.verbose,
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }

    /// Append issues collected elsewhere (they were already sent to the sink)
    pub fn absorb(&mut self, other: Diagnostics) {
        self.diagnostics.merge(other);
    }

    pub fn report(&mut self, issue: DiagnosticIssue) {
        self.sink.record(&issue);
        self.diagnostics.add(issue);
    }

    pub fn warn(&mut self, category: &str, message: impl Into<String>) {
        self.report(DiagnosticIssue::new(Severity::Warning, category, message));
    }

    pub fn warn_with_entity(
        &mut self,
        category: &str,
        message: impl Into<String>,
        entity: impl Into<String>,
    ) {
        self.report(DiagnosticIssue::new(Severity::Warning, category, message).with_entity(entity));
    }

    pub fn error(&mut self, category: &str, message: impl Into<String>) {
        self.report(DiagnosticIssue::new(Severity::Error, category, message));
    }

    pub fn error_with_entity(
        &mut self,
        category: &str,
        message: impl Into<String>,
        entity: impl Into<String>,
    ) {
        self.report(DiagnosticIssue::new(Severity::Error, category, message).with_entity(entity));
    }

    /// Progress message; not recorded as an issue
    pub fn progress(&self, message: impl AsRef<str>) {
        if self.verbose {
            tracing::info!("{}", message.as_ref());
        } else {
            tracing::debug!("{}", message.as_ref());
        }
    }
}
