//! Structured diagnostics.
//!
//! The core never aborts on an error: it records a [`Diag`] in the
//! per-translation-unit [`DiagSink`], poisons the enclosing declaration
//! and keeps going. Diagnostic order is stable and matches lowering
//! order, so identical inputs produce identical diagnostic lists.

use ferrule_ast::Span;

/// Diagnostic severities, in increasing order of badness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Note,
    Warning,
    Error,
    /// Halts lowering of the current function, not the translation unit.
    Fatal,
}

/// Stable diagnostic codes, one per error in the taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagCode {
    // Lookup
    NameNotFound,
    NameAmbiguous,
    AccessViolation,
    // Typing
    TypeMismatch,
    IncompleteType,
    InvalidConversion,
    InvalidPointerArithmetic,
    // Overload
    NoMatchingFunction,
    AmbiguousOverload,
    // Template
    DeductionFailure,
    ConstraintNotSatisfied,
    RecursiveInstantiation,
    SubstitutionFailure,
    // Layout
    CircularBase,
    InvalidVirtualBase,
    // Lowering
    UnsupportedConstruct,
    InternalInvariantViolation,
}

impl DiagCode {
    /// The canonical string form, used in rendered output.
    pub fn as_str(self) -> &'static str {
        match self {
            DiagCode::NameNotFound => "name-not-found",
            DiagCode::NameAmbiguous => "name-ambiguous",
            DiagCode::AccessViolation => "access-violation",
            DiagCode::TypeMismatch => "type-mismatch",
            DiagCode::IncompleteType => "incomplete-type",
            DiagCode::InvalidConversion => "invalid-conversion",
            DiagCode::InvalidPointerArithmetic => "invalid-pointer-arithmetic",
            DiagCode::NoMatchingFunction => "no-matching-function",
            DiagCode::AmbiguousOverload => "ambiguous-overload",
            DiagCode::DeductionFailure => "deduction-failure",
            DiagCode::ConstraintNotSatisfied => "constraint-not-satisfied",
            DiagCode::RecursiveInstantiation => "recursive-instantiation",
            DiagCode::SubstitutionFailure => "substitution-failure",
            DiagCode::CircularBase => "circular-base",
            DiagCode::InvalidVirtualBase => "invalid-virtual-base",
            DiagCode::UnsupportedConstruct => "unsupported-construct",
            DiagCode::InternalInvariantViolation => "internal-invariant-violation",
        }
    }
}

/// One structured diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diag {
    pub severity: Severity,
    pub code: DiagCode,
    pub span: Option<Span>,
    pub message: String,
    pub notes: Vec<String>,
}

impl Diag {
    pub fn new(severity: Severity, code: DiagCode, span: Option<Span>, message: String) -> Self {
        Self {
            severity,
            code,
            span,
            message,
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

/// Collects diagnostics for one translation unit.
#[derive(Debug, Default)]
pub struct DiagSink {
    diags: Vec<Diag>,
    /// Set once an `InternalInvariantViolation` is reported; the caller
    /// must abandon the translation unit.
    tu_fatal: bool,
}

impl DiagSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, diag: Diag) {
        if diag.code == DiagCode::InternalInvariantViolation {
            self.tu_fatal = true;
        }
        log::debug!("diag [{:?}/{}]: {}", diag.severity, diag.code.as_str(), diag.message);
        self.diags.push(diag);
    }

    pub fn error(&mut self, code: DiagCode, span: Option<Span>, message: impl Into<String>) {
        self.report(Diag::new(Severity::Error, code, span, message.into()));
    }

    pub fn fatal(&mut self, code: DiagCode, span: Option<Span>, message: impl Into<String>) {
        self.report(Diag::new(Severity::Fatal, code, span, message.into()));
    }

    pub fn warning(&mut self, code: DiagCode, span: Option<Span>, message: impl Into<String>) {
        self.report(Diag::new(Severity::Warning, code, span, message.into()));
    }

    /// True iff the list contains an Error- or Fatal-severity entry.
    /// A caller considers translation successful iff this is false.
    pub fn has_errors(&self) -> bool {
        self.diags.iter().any(|d| d.severity >= Severity::Error)
    }

    /// True once the whole translation unit must be abandoned.
    pub fn is_tu_fatal(&self) -> bool {
        self.tu_fatal
    }

    pub fn diags(&self) -> &[Diag] {
        &self.diags
    }

    pub fn len(&self) -> usize {
        self.diags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diags.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diag> {
        self.diags
    }
}
