//! Non-fatal diagnostics.
//!
//! Fatal problems are `Err` values. Everything advisory (unknown config
//! keys, closed feature gates, skipped imports) is emitted through
//! `tracing` and recorded here so embedders can inspect it afterwards.

use std::fmt;

use crate::token::Span;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Purely advisory.
    Info,
    /// The triggering construct was degraded to a no-op.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => f.write_str("info"),
            Self::Warning => f.write_str("warning"),
        }
    }
}

/// A single recorded diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} at {}", self.severity, self.message, self.span)
    }
}

/// Collecting diagnostic sink.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, message: impl Into<String>, span: Span) {
        let message = message.into();
        tracing::info!(
            file = span.file.as_deref().unwrap_or_default(),
            row = span.row,
            col = span.col,
            "{message}"
        );
        self.entries.push(Diagnostic {
            severity: Severity::Info,
            message,
            span,
        });
    }

    pub fn warn(&mut self, message: impl Into<String>, span: Span) {
        let message = message.into();
        tracing::warn!(
            file = span.file.as_deref().unwrap_or_default(),
            row = span.row,
            col = span.col,
            "{message}"
        );
        self.entries.push(Diagnostic {
            severity: Severity::Warning,
            message,
            span,
        });
    }

    #[must_use]
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Iterate over warnings only.
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
