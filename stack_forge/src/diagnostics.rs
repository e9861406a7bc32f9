// Copyright 2026 the Stack Forge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Severity-coded diagnostics.
//!
//! Every error type in the crate can be rendered as a [`Diagnostic`]. Codes are grouped by
//! [`DiagnosticCategory`]: `1xxx` binding, `2xxx` verification, `3xxx` encoding, `4xxx` linking,
//! `5xxx` type table.

use core::fmt;

/// How serious a diagnostic is.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Not shown by default.
    Hidden,
    /// Informational.
    Info,
    /// Suspicious but accepted.
    Warning,
    /// Fatal for the affected function or module.
    Error,
}

/// The pipeline stage that produced a diagnostic.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticCategory {
    /// Symbol resolution.
    Binding,
    /// Abstract interpretation.
    Verification,
    /// Opcode selection and layout.
    Encoding,
    /// Module linking.
    Linking,
    /// Type table construction.
    Types,
}

impl DiagnosticCategory {
    const fn label(self) -> &'static str {
        match self {
            Self::Binding => "binding",
            Self::Verification => "verification",
            Self::Encoding => "encoding",
            Self::Linking => "linking",
            Self::Types => "types",
        }
    }
}

/// A coded message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity.
    pub severity: Severity,
    /// Stable numeric code.
    pub code: u16,
    /// Producing stage.
    pub category: DiagnosticCategory,
    /// Human-readable message.
    pub message: String,
}

impl Diagnostic {
    /// Creates an [`Severity::Error`] diagnostic.
    pub fn error(category: DiagnosticCategory, code: u16, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            category,
            message: message.into(),
        }
    }

    /// Creates a [`Severity::Warning`] diagnostic.
    pub fn warning(category: DiagnosticCategory, code: u16, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            category,
            message: message.into(),
        }
    }

    /// Returns `true` for [`Severity::Error`].
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Hidden => "hidden",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(
            f,
            "{severity}[SF{:04}] {}: {}",
            self.code,
            self.category.label(),
            self.message
        )
    }
}
