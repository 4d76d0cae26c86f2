//! MIR data structures.
//!
//! The MIR is a typed control-flow graph: a function is a list of
//! locals and basic blocks, each block a statement list closed by
//! exactly one terminator. Types are the canonical [`TypeId`]s of the
//! semantic model, so MIR carries no type syntax of its own.

pub mod function;
pub mod place;
pub mod statement;
pub mod terminator;
pub mod visit;

pub use function::{BasicBlock, BlockId, CallConv, LocalDecl, LocalId, MirFunction, MirSignature};
pub use place::{Place, ProjectionElem};
pub use statement::{BinOp, BorrowKind, CastKind, Constant, Operand, Rvalue, Statement, UnOp};
pub use terminator::Terminator;
pub use visit::validate_function;
