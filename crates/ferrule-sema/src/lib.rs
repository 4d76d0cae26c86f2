//! Semantic analysis for the ferrule C++ front end.
//!
//! This crate turns the AST of one translation unit into a resolved,
//! type-annotated model: a decl arena and scope tree (populated by the
//! declaration passes), a hash-consed type table, overload resolution
//! with argument-dependent lookup, and a template engine with concept
//! checking. Everything hangs off a per-translation-unit [`Context`];
//! there is no process-wide state, so separate translation units can be
//! analysed in parallel by the driver.
//!
//! Errors never abort analysis: they are recorded as structured
//! diagnostics and the offending decl is poisoned, which the MIR
//! lowering turns into a well-formed `Unreachable` stub.

pub mod concepts;
pub mod context;
pub mod convert;
pub mod decl;
pub mod declare;
pub mod diag;
pub mod error;
pub mod lookup;
pub mod overload;
pub mod scope;
pub mod template;
pub mod types;

pub use context::Context;
pub use decl::{
    Access, BaseSpecifier, ClassDecl, Decl, DeclId, DeclKind, FunctionDecl, FunctionKind,
    FunctionSig, InstantiationOf, Linkage, ParamInfo, VarKind, VariableDecl,
};
pub use diag::{Diag, DiagCode, DiagSink, Severity};
pub use error::{SemaError, SemaResult};
pub use scope::{Scope, ScopeId, ScopeKind};
pub use types::{FloatWidth, IntWidth, Qualifiers, RefKind, Type, TypeId, TypeInterner};
