//! Error handling for the link core
//!
//! Every error kind here is session-fatal: a compilation session that hits
//! one of them produces no linked module. The `ErrorReporter` keeps every
//! diagnostic observed along the way, including errors discovered by other
//! traversal workers after the session was already cancelled.

use crate::source_loc::{SourceLocation, SourceSpan};
use crate::types::AddressSpace;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type shared by the graph builder, loader, verifier and linker
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodegenError {
    #[error("unresolved symbol `{missing}` referenced from `{referencing}`")]
    UnresolvedSymbol {
        referencing: String,
        missing: String,
    },

    #[error("failed to load module `{module}`: {reason}")]
    ModuleLoadFailure {
        module: String,
        reason: String,
    },

    #[error("invalid address space cast at {location} in `{function}`: {from} to {to}")]
    InvalidAddressSpaceCast {
        location: SourceLocation,
        function: String,
        from: AddressSpace,
        to: AddressSpace,
    },

    #[error("shared global `{name}` cannot have an initializer")]
    InvalidSharedInitializer { name: String },

    #[error("external symbol `{name}` is defined in both `{first}` and `{second}`")]
    DuplicateExternalSymbol {
        name: String,
        first: String,
        second: String,
    },

    #[error("IO error: {message}")]
    IoError { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl CodegenError {
    pub fn unresolved(referencing: &str, missing: &str) -> Self {
        CodegenError::UnresolvedSymbol {
            referencing: referencing.to_string(),
            missing: missing.to_string(),
        }
    }

    pub fn module_load(module: &str, reason: impl Into<String>) -> Self {
        CodegenError::ModuleLoadFailure {
            module: module.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_cast(
        location: SourceLocation,
        function: &str,
        from: AddressSpace,
        to: AddressSpace,
    ) -> Self {
        CodegenError::InvalidAddressSpaceCast {
            location,
            function: function.to_string(),
            from,
            to,
        }
    }

    pub fn duplicate_external(name: &str, first: &str, second: &str) -> Self {
        CodegenError::DuplicateExternalSymbol {
            name: name.to_string(),
            first: first.to_string(),
            second: second.to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CodegenError::InternalError {
            message: message.into(),
        }
    }

    /// Short stable name of the error kind, used in reports
    pub fn kind_name(&self) -> &'static str {
        match self {
            CodegenError::UnresolvedSymbol { .. } => "UnresolvedSymbol",
            CodegenError::ModuleLoadFailure { .. } => "ModuleLoadFailure",
            CodegenError::InvalidAddressSpaceCast { .. } => "InvalidAddressSpaceCast",
            CodegenError::InvalidSharedInitializer { .. } => "InvalidSharedInitializer",
            CodegenError::DuplicateExternalSymbol { .. } => "DuplicateExternalSymbol",
            CodegenError::IoError { .. } => "IoError",
            CodegenError::InternalError { .. } => "InternalError",
        }
    }

    /// Source span the error points at, if it has one
    pub fn span(&self) -> SourceSpan {
        match self {
            CodegenError::InvalidAddressSpaceCast { location, .. } => {
                SourceSpan::from_location(location.clone())
            }
            _ => SourceSpan::dummy(),
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(self.to_string(), self.span());
        match self {
            CodegenError::InvalidAddressSpaceCast { .. } => diag.with_note(
                "convert through the generic space with an explicit address space conversion".to_string(),
            ),
            CodegenError::DuplicateExternalSymbol { .. } => diag.with_note(
                "external names form the kernel ABI and must be unique across all crates".to_string(),
            ),
            _ => diag,
        }
    }
}

/// Convert from std::io::Error
impl From<std::io::Error> for CodegenError {
    fn from(err: std::io::Error) -> Self {
        CodegenError::IoError {
            message: err.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// A diagnostic message with location and severity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: SourceSpan,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn error(message: String, span: SourceSpan) -> Self {
        Self {
            severity: Severity::Error,
            message,
            span,
            notes: Vec::new(),
        }
    }

    pub fn warning(message: String, span: SourceSpan) -> Self {
        Self {
            severity: Severity::Warning,
            message,
            span,
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        for note in &self.notes {
            write!(f, "\n  note: {}", note)?;
        }
        Ok(())
    }
}

/// Collects the diagnostics of one compilation session
#[derive(Debug, Default)]
pub struct ErrorReporter {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a session error
    pub fn report(&mut self, error: &CodegenError) {
        self.push(error.to_diagnostic());
    }

    pub fn warning(&mut self, message: String, span: SourceSpan) {
        self.push(Diagnostic::warning(message, span));
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.error_count += 1,
            Severity::Warning => self.warning_count += 1,
            Severity::Note => {}
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn clear(&mut self) {
        self.diagnostics.clear();
        self.error_count = 0;
        self.warning_count = 0;
    }

    /// Print all diagnostics to stderr
    pub fn print_diagnostics(&self) {
        for diagnostic in &self.diagnostics {
            eprintln!("{}", diagnostic);
        }
    }

    pub fn summary(&self) -> String {
        let plural = |n: usize| if n == 1 { "" } else { "s" };
        match (self.error_count, self.warning_count) {
            (0, 0) => "No errors or warnings".to_string(),
            (0, w) => format!("{} warning{}", w, plural(w)),
            (e, 0) => format!("{} error{}", e, plural(e)),
            (e, w) => format!("{} error{} and {} warning{}", e, plural(e), w, plural(w)),
        }
    }
}
