//! Diagnostics and the crate error type.
//!
//! Every problem found while compiling or rendering becomes a [`Diagnostic`].
//! Compile problems are fatal and surface as [`Error::Syntax`]; render
//! problems are warnings, collected in order and returned with the output.

use crate::span::{LineIndex, Location, Span};
use thiserror::Error;

/// Kind of a diagnostic.
///
/// Using an enum instead of free-form strings lets callers match on the
/// failure class (e.g. to fail only on `UndefinedReference`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Tag, expression, comment or string literal still open at end of input
    UnexpectedEof,
    /// Character that cannot start any token inside a tag
    UnexpectedCharacter,
    /// Structurally invalid template (unbalanced blocks, bad expression)
    SyntaxError,
    /// `{% name %}` where `name` is not a known tag
    UnknownTag,
    /// `| name` where `name` is not a built-in filter
    UnknownFilter,
    /// Path lookup through a missing key, non-container or bad index
    UndefinedReference,
    /// Sequence or mapping written directly into the output
    NonScalarInterpolation,
    /// `for` over a value that is neither a sequence nor a mapping
    NotIterable,
    /// Operator or filter applied to operands of the wrong type
    TypeMismatch,
    /// `include` of a template that is not registered
    UndefinedTemplate,
    /// `include` nesting exceeded the configured depth
    IncludeDepth,
    /// Context data could not be decoded
    InvalidContext,
}

impl DiagnosticKind {
    /// Fatal kinds abort compilation; everything else is a render warning.
    pub fn severity(self) -> Severity {
        match self {
            Self::UnexpectedEof
            | Self::UnexpectedCharacter
            | Self::SyntaxError
            | Self::UnknownTag
            | Self::UnknownFilter
            | Self::InvalidContext => Severity::Error,
            Self::UndefinedReference
            | Self::NonScalarInterpolation
            | Self::NotIterable
            | Self::TypeMismatch
            | Self::UndefinedTemplate
            | Self::IncludeDepth => Severity::Warning,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::UnexpectedEof => "unexpected end of input",
            Self::UnexpectedCharacter => "unexpected character",
            Self::SyntaxError => "syntax error",
            Self::UnknownTag => "unknown tag",
            Self::UnknownFilter => "unknown filter",
            Self::UndefinedReference => "undefined reference",
            Self::NonScalarInterpolation => "non-scalar interpolation",
            Self::NotIterable => "not iterable",
            Self::TypeMismatch => "type mismatch",
            Self::UndefinedTemplate => "undefined template",
            Self::IncludeDepth => "include depth exceeded",
            Self::InvalidContext => "invalid context",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Error,
}

/// A positioned error or warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Span,
    /// Filled in by [`Diagnostic::locate`]; `1:1` until then.
    pub location: Location,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
            location: Location::default(),
        }
    }

    #[inline]
    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    #[inline]
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Error
    }

    pub fn line(&self) -> u32 {
        self.location.line
    }

    pub fn column(&self) -> u32 {
        self.location.column
    }

    /// Resolve the span start into a line/column location.
    pub fn locate(mut self, source: &str, index: &LineIndex) -> Self {
        self.location = index.location(source, self.span.start);
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}: {}", self.location, self.kind.name(), self.message)
    }
}

/// Errors returned by the public API.
#[derive(Debug, Error)]
pub enum Error {
    /// Lex or parse failure; no template was produced.
    #[error("{0}")]
    Syntax(Diagnostic),

    /// Context input could not be decoded.
    #[error("invalid {format} context: {message}")]
    InvalidContext {
        format: &'static str,
        message: String,
    },

    /// The output sink refused a write.
    #[error("failed to write rendered output")]
    Output(#[from] std::fmt::Error),

    /// Strict mode: rendering produced warnings.
    #[error("rendering produced {} warning(s){}", .0.len(), first_warning(.0))]
    Warnings(Vec<Diagnostic>),

    /// No template registered under this name.
    #[error("template not found: {0}")]
    TemplateNotFound(String),
}

impl Error {
    /// The diagnostic behind a syntax error, if this is one.
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            Error::Syntax(d) => Some(d),
            _ => None,
        }
    }
}

fn first_warning(warnings: &[Diagnostic]) -> String {
    warnings.first().map(|d| format!("; first: {}", d)).unwrap_or_default()
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
