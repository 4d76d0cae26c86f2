//! MIR for the ferrule C++ front end: the typed, CFG-structured
//! representation every defined function lowers to, plus the lowering
//! itself.
//!
//! [`lower_translation_unit`] is the crate's entry point: it runs the
//! declaration passes, lowers every defined function in declaration
//! order (template instantiations depth-first as they are reached), and
//! emits one [`VTableBlob`] per polymorphic class. Emission is
//! deterministic: identical inputs produce byte-identical MIR, vtables,
//! mangled symbols and diagnostics.

pub mod ir;
mod lower;

use ferrule_mangle::MangledIndex;
use ferrule_sema::{Diag, DeclId};

pub use ir::{
    BasicBlock, BinOp, BlockId, BorrowKind, CallConv, CastKind, Constant, LocalDecl, LocalId,
    MirFunction, MirSignature, Operand, Place, ProjectionElem, Rvalue, Statement, Terminator,
    UnOp,
};
pub use ir::visit::ValidationError;
pub use ir::validate_function;

/// One entry of an emitted vtable group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobEntry {
    /// Dispatchable slot: `(target_symbol, adjustor)`.
    Fn { symbol: String, adjustor: i32 },
    /// Pure-virtual sentinel.
    Pure,
    /// Type-information slot for the dynamic type.
    Rtti { symbol: String },
}

/// One vtable group: the slots serving one base interface of the
/// object, installed at the subobject's vtable-pointer cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobGroup {
    pub base: DeclId,
    /// Offset of the served subobject within the complete object.
    pub offset: u64,
    pub entries: Vec<BlobEntry>,
}

/// The emitted vtable of one polymorphic class, groups in layout
/// order (primary first), with the virtual-base offset table alongside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VTableBlob {
    pub class: DeclId,
    pub symbol: String,
    pub groups: Vec<BlobGroup>,
    /// `(virtual base, offset in the complete object)`, sorted by decl
    /// for deterministic output.
    pub vbase_offsets: Vec<(DeclId, u64)>,
}

/// Everything the core emits for one translation unit.
#[derive(Debug)]
pub struct LoweredUnit {
    /// Lowered functions in emission order.
    pub functions: Vec<MirFunction>,
    /// Vtable blobs for polymorphic classes, in declaration order.
    pub vtables: Vec<VTableBlob>,
    /// Mangled-symbol index for lookups by name.
    pub symbols: MangledIndex,
    /// Structured diagnostics in stable order.
    pub diagnostics: Vec<Diag>,
}

impl LoweredUnit {
    /// A caller considers translation successful iff no Error- or
    /// Fatal-severity diagnostics are present.
    pub fn is_success(&self) -> bool {
        use ferrule_sema::Severity;
        self.diagnostics.iter().all(|d| d.severity < Severity::Error)
    }

    pub fn function(&self, symbol: &str) -> Option<&MirFunction> {
        self.functions.iter().find(|f| f.symbol == symbol)
    }
}

/// Lower one parsed translation unit to MIR.
pub fn lower_translation_unit(tu: &ferrule_ast::TranslationUnit) -> LoweredUnit {
    lower::lower_unit(tu)
}
