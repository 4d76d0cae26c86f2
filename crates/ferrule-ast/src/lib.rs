//! AST node definitions for the ferrule C++ front end.
//!
//! This crate is the narrow interface between the external AST producer
//! (a Clang-driven parser) and the semantic core. The producer hands the
//! core one [`TranslationUnit`] per input file; the core never talks to
//! the parser directly and never sees preprocessor state.
//!
//! The node set intentionally covers only the subset of C++ exercised by
//! the test corpus: namespaces, classes with (virtual) inheritance,
//! functions and methods, templates with type parameters and requires
//! clauses, concepts, and the usual statement/expression kinds. Every
//! node carries its source [`Span`].

pub mod common;
pub mod expr;
pub mod items;
pub mod stmt;
pub mod types;

pub use common::{Ident, Span};
pub use expr::{BinaryOp, Expr, ExprKind, UnaryOp};
pub use items::{
    AccessSpecifier, BaseSpecifier, ClassDef, ConceptDef, ConstraintExpr, EnumDef, FunctionDef,
    GlobalVarDef, Item, ItemKind, Member, MemberInit, MethodQualifiers, NamespaceDef, Param,
    SpecialKind, TemplateDef, TemplateParam, TraitFn, TypeAliasDef, UsingDecl, UsingDirective,
};
pub use stmt::{Block, Stmt, StmtKind, SwitchCase};
pub use types::{BuiltinType, TypeExpr, TypeExprKind};

/// The root of a parsed C++ translation unit.
#[derive(Debug, Clone, Default)]
pub struct TranslationUnit {
    /// Top-level items in declaration order.
    pub items: Vec<Item>,
}

impl TranslationUnit {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }
}
