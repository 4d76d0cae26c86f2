//! Statement nodes.

use crate::common::Span;
use crate::expr::Expr;
use crate::types::TypeExpr;

/// A brace-enclosed statement list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self {
            stmts,
            span: Span::default(),
        }
    }
}

/// A statement with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn synth(kind: StmtKind) -> Self {
        Self {
            kind,
            span: Span::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Compound(Block),
    Expr(Expr),
    /// A local variable declaration. Constructor initialisation is
    /// represented by a `Construct` initialiser expression.
    Decl {
        name: String,
        ty: TypeExpr,
        init: Option<Expr>,
    },
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        incr: Option<Expr>,
        body: Box<Stmt>,
    },
    Switch {
        scrutinee: Expr,
        cases: Vec<SwitchCase>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    /// `try { .. } catch (..) { .. }`; rejected by the lowering.
    Try {
        body: Block,
        handlers: Vec<Block>,
    },
}

/// One `case`/`default` arm of a switch. Fall-through between arms is
/// the source-level default; an arm ending in `break` leaves the switch.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// `None` for the `default` arm.
    pub value: Option<i64>,
    pub body: Vec<Stmt>,
}
