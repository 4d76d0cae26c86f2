//! Type syntax as spelled in the source.
//!
//! These nodes describe how a type was written, not what it means; the
//! semantic core resolves them to canonical types. Alias chains,
//! qualifier placement and template-ids are all still visible here.

use crate::common::Span;

/// A type as written in the source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeExprKind {
    /// A builtin scalar type (`int`, `double`, ...).
    Builtin(BuiltinType),
    /// A (possibly qualified) named type, with optional template
    /// arguments: `Foo`, `ns::Bar`, `Box<int>`.
    Named {
        path: Vec<String>,
        template_args: Vec<TypeExpr>,
    },
    /// `T*`, optionally pointing at const.
    Pointer {
        pointee: Box<TypeExpr>,
        is_const: bool,
    },
    /// `T&` or `T&&`, optionally referring to const.
    Reference {
        referent: Box<TypeExpr>,
        is_const: bool,
        is_rvalue: bool,
    },
    /// `T[N]`; `None` for an unsized array declarator.
    Array {
        element: Box<TypeExpr>,
        size: Option<u64>,
    },
    /// A function type `R(P0, P1, ...)`.
    Function {
        params: Vec<TypeExpr>,
        ret: Box<TypeExpr>,
        variadic: bool,
    },
}

impl TypeExpr {
    pub fn new(kind: TypeExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn builtin(builtin: BuiltinType) -> Self {
        Self {
            kind: TypeExprKind::Builtin(builtin),
            span: Span::default(),
        }
    }

    /// An unqualified named type with no template arguments.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            kind: TypeExprKind::Named {
                path: vec![name.into()],
                template_args: Vec::new(),
            },
            span: Span::default(),
        }
    }

    /// A qualified named type (`a::b::C`).
    pub fn named_path(path: Vec<String>) -> Self {
        Self {
            kind: TypeExprKind::Named {
                path,
                template_args: Vec::new(),
            },
            span: Span::default(),
        }
    }

    pub fn ptr(self) -> Self {
        Self {
            span: self.span,
            kind: TypeExprKind::Pointer {
                pointee: Box::new(self),
                is_const: false,
            },
        }
    }

    pub fn const_ptr(self) -> Self {
        Self {
            span: self.span,
            kind: TypeExprKind::Pointer {
                pointee: Box::new(self),
                is_const: true,
            },
        }
    }

    pub fn reference(self) -> Self {
        Self {
            span: self.span,
            kind: TypeExprKind::Reference {
                referent: Box::new(self),
                is_const: false,
                is_rvalue: false,
            },
        }
    }

    pub fn const_reference(self) -> Self {
        Self {
            span: self.span,
            kind: TypeExprKind::Reference {
                referent: Box::new(self),
                is_const: true,
                is_rvalue: false,
            },
        }
    }

    pub fn array(self, size: Option<u64>) -> Self {
        Self {
            span: self.span,
            kind: TypeExprKind::Array {
                element: Box::new(self),
                size,
            },
        }
    }
}

/// Builtin scalar types, spelled the way C++ spells them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    Void,
    Bool,
    Char { signed: bool },
    Short { signed: bool },
    Int { signed: bool },
    Long { signed: bool },
    LongLong { signed: bool },
    Float,
    Double,
}

impl BuiltinType {
    pub fn int() -> Self {
        BuiltinType::Int { signed: true }
    }

    pub fn uint() -> Self {
        BuiltinType::Int { signed: false }
    }
}
