//! Errors produced during semantic analysis.
//!
//! `SemaError` is the transport between the analysis routines and the
//! diagnostics sink: routines return `Result<_, SemaError>` and the
//! caller decides whether to report it (poisoning the enclosing decl)
//! or to silence it (SFINAE contexts).

use ferrule_ast::Span;
use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::diag::{Diag, DiagCode, Severity};

/// Errors that can occur during name resolution, type checking,
/// overload resolution and template instantiation.
#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
pub enum SemaError {
    #[error("name not found: could not find `{name}` in this scope")]
    #[diagnostic(code(ferrule_sema::name_not_found))]
    NameNotFound {
        name: String,
        #[label("referenced here")]
        span: SourceSpan,
    },

    #[error("ambiguous reference: `{name}` could refer to multiple declarations")]
    #[diagnostic(code(ferrule_sema::name_ambiguous))]
    NameAmbiguous {
        name: String,
        #[label("referenced here")]
        span: SourceSpan,
        /// Qualified names of the conflicting candidates.
        candidates: Vec<String>,
    },

    #[error("cannot access {what}: `{name}` is not accessible from this context")]
    #[diagnostic(code(ferrule_sema::access_violation))]
    AccessViolation {
        name: String,
        what: &'static str,
        #[label("accessed here")]
        span: SourceSpan,
    },

    #[error("type mismatch: expected `{expected}`, found `{found}`")]
    #[diagnostic(code(ferrule_sema::type_mismatch))]
    TypeMismatch {
        expected: String,
        found: String,
        #[label("this has type `{found}`")]
        span: SourceSpan,
    },

    #[error("incomplete type `{name}` used where a complete type is required")]
    #[diagnostic(code(ferrule_sema::incomplete_type))]
    IncompleteType {
        name: String,
        #[label("used here")]
        span: SourceSpan,
    },

    #[error("no implicit conversion from `{from}` to `{to}`")]
    #[diagnostic(code(ferrule_sema::invalid_conversion))]
    InvalidConversion {
        from: String,
        to: String,
        #[label("conversion required here")]
        span: SourceSpan,
    },

    #[error("invalid pointer arithmetic on `{ty}`")]
    #[diagnostic(code(ferrule_sema::invalid_pointer_arithmetic))]
    InvalidPointerArithmetic {
        ty: String,
        #[label("in this expression")]
        span: SourceSpan,
    },

    #[error("no matching function for call to `{name}`")]
    #[diagnostic(code(ferrule_sema::no_matching_function))]
    NoMatchingFunction {
        name: String,
        #[label("call site")]
        span: SourceSpan,
        /// Why each candidate was rejected, for notes.
        rejected: Vec<String>,
    },

    #[error("call to `{name}` is ambiguous")]
    #[diagnostic(code(ferrule_sema::ambiguous_overload))]
    AmbiguousOverload {
        name: String,
        #[label("call site")]
        span: SourceSpan,
        candidates: Vec<String>,
    },

    #[error("template argument deduction failed for `{name}`: {reason}")]
    #[diagnostic(code(ferrule_sema::deduction_failure))]
    DeductionFailure {
        name: String,
        reason: String,
        #[label("deduced from this call")]
        span: SourceSpan,
    },

    #[error("constraint not satisfied: `{constraint}` is false for the given arguments")]
    #[diagnostic(code(ferrule_sema::constraint_not_satisfied))]
    ConstraintNotSatisfied {
        constraint: String,
        #[label("required here")]
        span: SourceSpan,
    },

    #[error("recursive template instantiation exceeded depth limit while instantiating `{name}`")]
    #[diagnostic(code(ferrule_sema::recursive_instantiation))]
    RecursiveInstantiation {
        name: String,
        #[label("instantiated here")]
        span: SourceSpan,
    },

    #[error("substitution failure in `{name}`: {reason}")]
    #[diagnostic(code(ferrule_sema::substitution_failure))]
    SubstitutionFailure {
        name: String,
        reason: String,
        #[label("substituted here")]
        span: SourceSpan,
    },

    #[error("circular base class chain involving `{name}`")]
    #[diagnostic(code(ferrule_sema::circular_base))]
    CircularBase {
        name: String,
        #[label("in this hierarchy")]
        span: SourceSpan,
    },

    #[error("invalid virtual base `{name}`")]
    #[diagnostic(code(ferrule_sema::invalid_virtual_base))]
    InvalidVirtualBase {
        name: String,
        #[label("declared here")]
        span: SourceSpan,
    },

    #[error("unsupported construct: {what}")]
    #[diagnostic(code(ferrule_sema::unsupported_construct))]
    UnsupportedConstruct {
        what: String,
        #[label("not supported")]
        span: SourceSpan,
    },

    #[error("internal invariant violated: {message}")]
    #[diagnostic(code(ferrule_sema::internal_invariant))]
    Internal {
        message: String,
        span: Option<SourceSpan>,
    },
}

impl SemaError {
    /// The stable diagnostic code this error maps to.
    pub fn code(&self) -> DiagCode {
        match self {
            SemaError::NameNotFound { .. } => DiagCode::NameNotFound,
            SemaError::NameAmbiguous { .. } => DiagCode::NameAmbiguous,
            SemaError::AccessViolation { .. } => DiagCode::AccessViolation,
            SemaError::TypeMismatch { .. } => DiagCode::TypeMismatch,
            SemaError::IncompleteType { .. } => DiagCode::IncompleteType,
            SemaError::InvalidConversion { .. } => DiagCode::InvalidConversion,
            SemaError::InvalidPointerArithmetic { .. } => DiagCode::InvalidPointerArithmetic,
            SemaError::NoMatchingFunction { .. } => DiagCode::NoMatchingFunction,
            SemaError::AmbiguousOverload { .. } => DiagCode::AmbiguousOverload,
            SemaError::DeductionFailure { .. } => DiagCode::DeductionFailure,
            SemaError::ConstraintNotSatisfied { .. } => DiagCode::ConstraintNotSatisfied,
            SemaError::RecursiveInstantiation { .. } => DiagCode::RecursiveInstantiation,
            SemaError::SubstitutionFailure { .. } => DiagCode::SubstitutionFailure,
            SemaError::CircularBase { .. } => DiagCode::CircularBase,
            SemaError::InvalidVirtualBase { .. } => DiagCode::InvalidVirtualBase,
            SemaError::UnsupportedConstruct { .. } => DiagCode::UnsupportedConstruct,
            SemaError::Internal { .. } => DiagCode::InternalInvariantViolation,
        }
    }

    /// The severity this error is reported at.
    pub fn severity(&self) -> Severity {
        match self {
            SemaError::UnsupportedConstruct { .. } => Severity::Fatal,
            SemaError::Internal { .. } => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    fn label_span(&self) -> Option<Span> {
        let ss: &SourceSpan = match self {
            SemaError::NameNotFound { span, .. }
            | SemaError::NameAmbiguous { span, .. }
            | SemaError::AccessViolation { span, .. }
            | SemaError::TypeMismatch { span, .. }
            | SemaError::IncompleteType { span, .. }
            | SemaError::InvalidConversion { span, .. }
            | SemaError::InvalidPointerArithmetic { span, .. }
            | SemaError::NoMatchingFunction { span, .. }
            | SemaError::AmbiguousOverload { span, .. }
            | SemaError::DeductionFailure { span, .. }
            | SemaError::ConstraintNotSatisfied { span, .. }
            | SemaError::RecursiveInstantiation { span, .. }
            | SemaError::SubstitutionFailure { span, .. }
            | SemaError::CircularBase { span, .. }
            | SemaError::InvalidVirtualBase { span, .. }
            | SemaError::UnsupportedConstruct { span, .. } => span,
            SemaError::Internal { span, .. } => return span.as_ref().map(from_source_span),
        };
        Some(from_source_span(ss))
    }

    /// Convert into the structured diagnostic form, attaching per-variant
    /// notes (rejected candidates, ambiguity lists).
    pub fn into_diag(self) -> Diag {
        let span = self.label_span();
        let mut diag = Diag::new(self.severity(), self.code(), span, self.to_string());
        match self {
            SemaError::NameAmbiguous { candidates, .. }
            | SemaError::AmbiguousOverload { candidates, .. } => {
                for c in candidates {
                    diag.notes.push(format!("candidate: {c}"));
                }
            }
            SemaError::NoMatchingFunction { rejected, .. } => {
                for r in rejected {
                    diag.notes.push(r);
                }
            }
            _ => {}
        }
        diag
    }
}

fn from_source_span(ss: &SourceSpan) -> Span {
    Span::new(ss.offset(), ss.offset() + ss.len())
}

/// Result alias used throughout the crate.
pub type SemaResult<T> = Result<T, SemaError>;
