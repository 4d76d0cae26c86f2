//! MIR function and basic-block definitions.

use std::fmt;

use ferrule_ast::Span;
use ferrule_sema::TypeId;

use super::statement::Statement;
use super::terminator::Terminator;

/// Index of a basic block within its function; block 0 is the entry.
pub type BlockId = u32;
/// Index of a local within its function. Parameters occupy
/// `0..arg_count`.
pub type LocalId = u32;

/// Calling convention tag carried in the emitted signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallConv {
    /// Ordinary C++ functions, including the implicit `this` argument.
    Cxx,
    /// Extern-C style, used for `main`.
    C,
}

/// The emitted signature of a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirSignature {
    pub params: Vec<TypeId>,
    pub ret: TypeId,
    pub call_conv: CallConv,
}

/// A local variable slot.
///
/// Reference-typed locals keep their `Reference` canonical type, which
/// downstream verifiers read as the must-not-be-null, must-not-rebind
/// marker; at this level they behave like pointers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDecl {
    pub ty: TypeId,
    /// Debug name, `None` for compiler temporaries.
    pub name: Option<String>,
    pub span: Option<Span>,
}

/// A basic block: straight-line statements plus one terminator.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub statements: Vec<Statement>,
    pub terminator: Terminator,
}

/// A lowered function.
#[derive(Debug, Clone, PartialEq)]
pub struct MirFunction {
    /// Mangled symbol, stable across runs.
    pub symbol: String,
    /// Human-readable qualified name for debugging.
    pub name: String,
    pub sig: MirSignature,
    /// Locals, parameters first (`0..arg_count`).
    pub locals: Vec<LocalDecl>,
    pub arg_count: usize,
    /// The local holding the return value at `Return`, when the return
    /// type is non-void.
    pub ret_local: Option<LocalId>,
    /// Blocks in emission order; block 0 is the entry.
    pub blocks: Vec<BasicBlock>,
    pub span: Span,
}

impl MirFunction {
    pub const ENTRY: BlockId = 0;

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id as usize]
    }

    pub fn local(&self, id: LocalId) -> &LocalDecl {
        &self.locals[id as usize]
    }
}

impl fmt::Display for MirFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "fn {} ({} args) {{", self.symbol, self.arg_count)?;
        for (i, local) in self.locals.iter().enumerate() {
            match &local.name {
                Some(name) => writeln!(f, "    let _{i}: {:?}; // {name}", local.ty)?,
                None => writeln!(f, "    let _{i}: {:?};", local.ty)?,
            }
        }
        for (i, block) in self.blocks.iter().enumerate() {
            writeln!(f, "  bb{i}: {{")?;
            for stmt in &block.statements {
                writeln!(f, "      {stmt}")?;
            }
            writeln!(f, "      {}", block.terminator)?;
            writeln!(f, "  }}")?;
        }
        write!(f, "}}")
    }
}
