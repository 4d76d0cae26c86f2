//! MIR statements, rvalues, operands and constants.

use std::fmt;

use ferrule_sema::{DeclId, TypeId};

use super::function::LocalId;
use super::place::Place;

/// A statement; control flow lives only in terminators.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assign { place: Place, rvalue: Rvalue },
    /// The local's storage becomes live.
    StorageLive(LocalId),
    /// The local's storage is dead; reads are invalid.
    StorageDead(LocalId),
    Nop,
}

/// Right-hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Rvalue {
    Use(Operand),
    BinaryOp { op: BinOp, lhs: Operand, rhs: Operand },
    UnaryOp { op: UnOp, operand: Operand },
    /// A reference to a place; references stay distinct from pointers
    /// in the type system but behave identically here.
    Ref { place: Place, kind: BorrowKind },
    /// A raw address of a place (`&expr`, array decay).
    AddressOf(Place),
    Cast { kind: CastKind, operand: Operand, ty: TypeId },
    /// Aggregate construction, operands in field order.
    Aggregate { ty: TypeId, operands: Vec<Operand> },
}

/// Reference flavour for [`Rvalue::Ref`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorrowKind {
    Shared,
    Mutable,
}

/// Cast kinds; pointer arithmetic is expressed as explicit
/// pointer-integer round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    IntToInt,
    IntToFloat,
    FloatToInt,
    FloatToFloat,
    PtrToInt,
    IntToPtr,
    PtrToPtr,
    /// Array-to-pointer decay, applied at call sites.
    ArrayToPtr,
}

/// An operand: something readable as a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Copy(Place),
    Move(Place),
    Constant(Constant),
}

/// A literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int { value: i128, ty: TypeId },
    Float { value: f64, ty: TypeId },
    Bool(bool),
    Unit,
    /// A function address by symbol.
    Fn(String),
    /// The address of `class`'s vtable group `group`; written into
    /// vtable-pointer cells by constructors.
    VTable { class: DeclId, group: usize },
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(self, BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Assign { place, rvalue } => write!(f, "{place} = {rvalue};"),
            Statement::StorageLive(local) => write!(f, "StorageLive(_{local});"),
            Statement::StorageDead(local) => write!(f, "StorageDead(_{local});"),
            Statement::Nop => write!(f, "nop;"),
        }
    }
}

impl fmt::Display for Rvalue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rvalue::Use(op) => write!(f, "{op}"),
            Rvalue::BinaryOp { op, lhs, rhs } => write!(f, "{op:?}({lhs}, {rhs})"),
            Rvalue::UnaryOp { op, operand } => write!(f, "{op:?}({operand})"),
            Rvalue::Ref { place, kind } => match kind {
                BorrowKind::Shared => write!(f, "&{place}"),
                BorrowKind::Mutable => write!(f, "&mut {place}"),
            },
            Rvalue::AddressOf(place) => write!(f, "&raw {place}"),
            Rvalue::Cast { kind, operand, .. } => write!(f, "{operand} as {kind:?}"),
            Rvalue::Aggregate { operands, .. } => {
                write!(f, "{{")?;
                for (i, op) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{op}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Copy(place) => write!(f, "copy {place}"),
            Operand::Move(place) => write!(f, "move {place}"),
            Operand::Constant(c) => write!(f, "const {c}"),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int { value, .. } => write!(f, "{value}"),
            Constant::Float { value, .. } => write!(f, "{value}"),
            Constant::Bool(b) => write!(f, "{b}"),
            Constant::Unit => write!(f, "()"),
            Constant::Fn(symbol) => write!(f, "{symbol}"),
            Constant::VTable { class, group } => write!(f, "vtable({class:?}, {group})"),
        }
    }
}
