use std::collections::HashSet;

use crate::span::Span;

/// A lifter diagnostic (fatal error or warning).
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Diagnostic {
    pub fn error(message: String, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn warning(message: String, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    /// An internal-consistency failure: always a bug in the engine, never
    /// in the input program.
    pub fn ice(message: String, span: Span) -> Self {
        Self::error(format!("internal error: {message}"), span)
            .with_note("this is a bug in the lifter, not in the input program".to_string())
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    /// Render the diagnostic to stderr using ariadne.
    pub fn render(&self, filename: &str, source: &str) {
        use ariadne::{Color, Label, Report, ReportKind, Source};

        let kind = match self.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
        };

        let color = match self.severity {
            Severity::Error => Color::Red,
            Severity::Warning => Color::Yellow,
        };

        let mut report = Report::build(kind, filename, self.span.start as usize)
            .with_message(&self.message)
            .with_label(
                Label::new((filename, self.span.start as usize..self.span.end as usize))
                    .with_message(&self.message)
                    .with_color(color),
            );

        for note in &self.notes {
            report = report.with_note(note);
        }

        if let Some(help) = &self.help {
            report = report.with_help(help);
        }

        report
            .finish()
            .eprint((filename, Source::from(source)))
            .unwrap();
    }
}

/// Render a list of diagnostics.
pub fn render_diagnostics(diagnostics: &[Diagnostic], filename: &str, source: &str) {
    for diag in diagnostics {
        diag.render(filename, source);
    }
}

/// Accumulates non-fatal diagnostics during parsing and lifting.
///
/// Carries the warn-once key set so repeated conditions (an unknown opcode
/// appearing on every line, say) report a single diagnostic.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Diagnostic>,
    seen_once: HashSet<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, diagnostic: Diagnostic) {
        debug_assert_eq!(diagnostic.severity, Severity::Warning);
        self.warnings.push(diagnostic);
    }

    /// Report a warning at most once per `key`. Returns whether the
    /// diagnostic was recorded.
    pub fn warn_once(&mut self, key: &str, diagnostic: Diagnostic) -> bool {
        if !self.seen_once.insert(key.to_string()) {
            return false;
        }
        self.warn(diagnostic);
        true
    }

    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<Diagnostic> {
        self.warnings
    }
}
