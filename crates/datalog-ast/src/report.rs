//! Append-only diagnostic sink shared by all checks.
//!
//! Every check reports here and carries on; nothing in the middle-end
//! unwinds on a semantic error. The overall run fails iff at least one
//! error-severity diagnostic was recorded.

use crate::Span;
use ariadne::{Color, Label, Report, ReportKind};
use std::fmt;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Severity {
    Error,
    Warning,
}

/// A message with an optional source location.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DiagnosticMessage {
    pub message: String,
    pub location: Option<Span>,
}

impl DiagnosticMessage {
    pub fn new(message: impl Into<String>, location: Span) -> Self {
        DiagnosticMessage {
            message: message.into(),
            location: Some(location),
        }
    }

    /// A free-floating message without a source location.
    pub fn text(message: impl Into<String>) -> Self {
        DiagnosticMessage {
            message: message.into(),
            location: None,
        }
    }
}

/// A diagnostic: severity, primary message, and any number of
/// secondary notes pointing at related locations.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub primary: DiagnosticMessage,
    pub secondary: Vec<DiagnosticMessage>,
}

impl Diagnostic {
    pub fn error(primary: DiagnosticMessage) -> Self {
        Diagnostic {
            severity: Severity::Error,
            primary,
            secondary: Vec::new(),
        }
    }

    pub fn warning(primary: DiagnosticMessage) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            primary,
            secondary: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: DiagnosticMessage) -> Self {
        self.secondary.push(note);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.severity {
            Severity::Error => "Error",
            Severity::Warning => "Warning",
        };
        write!(f, "{}: {}", kind, self.primary.message)?;
        if let Some(span) = &self.primary.location {
            if span.points_at_source() {
                write!(f, " in {}:{}", span.src(), span.start())?;
            }
        }
        for note in &self.secondary {
            write!(f, "\n  note: {}", note.message)?;
            if let Some(span) = &note.location {
                if span.points_at_source() {
                    write!(f, " in {}:{}", span.src(), span.start())?;
                }
            }
        }
        Ok(())
    }
}

/// The accumulated diagnostics of a compilation.
#[derive(Clone, Debug, Default)]
pub struct ErrorReport {
    diagnostics: Vec<Diagnostic>,
}

impl ErrorReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: impl Into<String>, location: Span) {
        self.diagnostics
            .push(Diagnostic::error(DiagnosticMessage::new(message, location)));
    }

    pub fn add_warning(&mut self, message: impl Into<String>, location: Span) {
        self.diagnostics
            .push(Diagnostic::warning(DiagnosticMessage::new(message, location)));
    }

    pub fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// Errors whose primary message contains `needle`; test convenience.
    pub fn errors_matching(&self, needle: &str) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error && d.primary.message.contains(needle))
            .count()
    }

    /// Render located diagnostics as ariadne reports. Diagnostics
    /// without a location — or anchored on pass-generated nodes, which
    /// have no user code to show — fall back to their `Display` form.
    pub fn write<W: std::io::Write>(
        &self,
        cache: impl ariadne::Cache<crate::SrcId> + Clone,
        mut out: W,
    ) -> std::io::Result<()> {
        for diagnostic in &self.diagnostics {
            match &diagnostic.primary.location {
                Some(span) if span.points_at_source() => {
                    let kind = match diagnostic.severity {
                        Severity::Error => ReportKind::Error,
                        Severity::Warning => ReportKind::Warning,
                    };
                    let color = match diagnostic.severity {
                        Severity::Error => Color::Red,
                        Severity::Warning => Color::Yellow,
                    };
                    let mut report = Report::build(kind, span.src(), span.start())
                        .with_message(&diagnostic.primary.message)
                        .with_label(
                            Label::new(*span)
                                .with_message(&diagnostic.primary.message)
                                .with_color(color),
                        );
                    for note in &diagnostic.secondary {
                        match &note.location {
                            Some(note_span) if note_span.src() == span.src() => {
                                report = report
                                    .with_label(Label::new(*note_span).with_message(&note.message));
                            }
                            _ => {
                                report = report.with_note(&note.message);
                            }
                        }
                    }
                    report.finish().write(cache.clone(), &mut out)?;
                }
                _ => writeln!(out, "{}", diagnostic)?,
            }
        }
        Ok(())
    }
}
