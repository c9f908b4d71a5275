//! Diagnostics collected while loading and validating assignment inputs.
//!
//! Data-quality problems in a traffic dataset are rarely fatal: a path that
//! references a missing link is dropped, a trip left without paths sends its
//! demand into the shortfall. This module records those events so that callers
//! can report them after a run instead of losing them in a log stream.
//!
//! # Example
//!
//! ```
//! use iterflow_core::diagnostics::Diagnostics;
//!
//! let mut diag = Diagnostics::new();
//! diag.add_warning_with_entity("demand", "Trip has no usable paths", "trip 7");
//! diag.add_error_with_entity("reference", "Path references unknown link", "trip 7 path 2");
//!
//! assert_eq!(diag.warning_count(), 1);
//! assert!(diag.has_errors());
//! ```

use serde::Serialize;

/// Severity level for diagnostic issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Unusual but the run continues (e.g., defaulted preference tag)
    Warning,
    /// Element could not be used (e.g., malformed row)
    Error,
}

/// A single diagnostic issue
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    /// Category for grouping (e.g., "parse", "reference", "demand")
    pub category: String,
    pub message: String,
    /// 1-based row of the input file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// e.g. "link 3->4", "trip 12"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
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
        if let Some(line) = self.line {
            write!(f, " at line {}", line)?;
        }
        Ok(())
    }
}

/// Issues raised while loading one dataset.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(
        &mut self,
        severity: Severity,
        category: &str,
        message: &str,
        line: Option<usize>,
        entity: Option<&str>,
    ) {
        self.issues.push(DiagnosticIssue {
            severity,
            category: category.to_string(),
            message: message.to_string(),
            line,
            entity: entity.map(str::to_string),
        });
    }

    pub fn add_warning_at_line(&mut self, category: &str, message: &str, line: usize) {
        self.push(Severity::Warning, category, message, Some(line), None);
    }

    pub fn add_warning_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        self.push(Severity::Warning, category, message, None, Some(entity));
    }

    pub fn add_error(&mut self, category: &str, message: &str) {
        self.push(Severity::Error, category, message, None, None);
    }

    pub fn add_error_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        self.push(Severity::Error, category, message, None, Some(entity));
    }

    fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn issues_by_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a DiagnosticIssue> {
        self.issues.iter().filter(move |i| i.category == category)
    }

    /// e.g. "2 warnings, 1 error"
    pub fn summary(&self) -> String {
        fn plural(n: usize, noun: &str) -> String {
            format!("{n} {noun}{}", if n == 1 { "" } else { "s" })
        }
        match (self.warning_count(), self.error_count()) {
            (0, 0) => "No issues".to_string(),
            (w, 0) => plural(w, "warning"),
            (0, e) => plural(e, "error"),
            (w, e) => format!("{}, {}", plural(w, "warning"), plural(e, "error")),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_summary() {
        let mut diag = Diagnostics::new();
        assert_eq!(diag.summary(), "No issues");

        diag.add_warning_with_entity("demand", "trip without paths", "trip 4");
        diag.add_warning_at_line("parse", "empty departure list", 42);
        diag.add_error("parse", "bad row");
        assert_eq!(diag.warning_count(), 2);
        assert_eq!(diag.error_count(), 1);
        assert!(diag.has_errors());
        assert_eq!(diag.summary(), "2 warnings, 1 error");
        assert_eq!(diag.issues_by_category("parse").count(), 2);
    }

    #[test]
    fn serialized_issues_omit_missing_fields() {
        let mut diag = Diagnostics::new();
        diag.add_warning_at_line("parse", "unknown preference tag", 7);
        diag.add_error_with_entity("reference", "unknown link", "trip 3 path 1");

        let json = serde_json::to_string_pretty(&diag).unwrap();
        assert!(json.contains("\"warning\""));
        assert!(json.contains("\"line\": 7"));
        assert!(json.contains("\"entity\": \"trip 3 path 1\""));
        assert_eq!(json.matches("\"line\"").count(), 1);
    }

    #[test]
    fn rendered_report_lists_every_issue() {
        let mut diag = Diagnostics::new();
        diag.add_error_with_entity("reference", "unknown link", "link 4->9");
        diag.add_warning_at_line("parse", "bad token", 12);

        let text = diag.to_string();
        assert!(text.starts_with("Diagnostics: 1 warning, 1 error"));
        assert!(text.contains("[error:reference] unknown link (link 4->9)"));
        assert!(text.contains("[warning:parse] bad token at line 12"));
    }
}
