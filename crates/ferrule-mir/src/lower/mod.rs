//! Lowering of a resolved translation unit to MIR.
//!
//! Functions are lowered in declaration order. Template instantiations
//! and implicit special members triggered while lowering a body are
//! lowered depth-first, before the next declared function, so emission
//! order (and therefore output bytes) is deterministic for identical
//! inputs.
//!
//! A function whose analysis failed is poisoned and emitted as a stub
//! with a single `Unreachable` block, keeping the output well-formed
//! for partial-failure tooling.

mod call;
mod context;
mod ctor;
mod expr;
mod stmt;

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use ferrule_ast as ast;
use ferrule_layout::{LayoutEngine, LayoutError, VTableEntry};
use ferrule_mangle::{
    mangle_function_variant, mangle_typeinfo, mangle_vtable, MangledIndex, StructorVariant,
};
use ferrule_sema::decl::{DeclKind, FunctionKind};
use ferrule_sema::declare;
use ferrule_sema::diag::DiagCode;
use ferrule_sema::{Context, DeclId, SemaError, SemaResult};

use crate::ir::{BasicBlock, CallConv, MirFunction, MirSignature, Terminator};
use crate::{BlobEntry, BlobGroup, LoweredUnit, VTableBlob};

pub(crate) use context::FunctionLowering;

/// Mutable state shared by every function lowering in one unit.
pub(crate) struct ModuleState {
    pub ctx: Context,
    pub layouts: LayoutEngine,
    pub functions: Vec<MirFunction>,
    pub symbols: MangledIndex,
    /// Symbols already lowered or in progress; makes recursion and
    /// repeated call sites idempotent.
    emitted: FxHashSet<String>,
    /// Synthesised default constructors, one per class.
    implicit_ctors: FxHashMap<DeclId, DeclId>,
}

impl ModuleState {
    fn new(ctx: Context) -> Self {
        Self {
            ctx,
            layouts: LayoutEngine::new(),
            functions: Vec::new(),
            symbols: MangledIndex::new(),
            emitted: FxHashSet::default(),
            implicit_ctors: FxHashMap::default(),
        }
    }

    /// Lower a function (in the given constructor/destructor variant)
    /// unless already done, and return its symbol. Instantiations
    /// reached from the body lower recursively first.
    pub fn ensure_lowered(&mut self, decl: DeclId, variant: StructorVariant) -> String {
        let symbol = mangle_function_variant(&self.ctx, decl, variant);
        if !self.emitted.insert(symbol.clone()) {
            return symbol;
        }
        self.symbols.insert(symbol.clone(), decl);

        let (kind, is_defined) = match &self.ctx.decl(decl).kind {
            DeclKind::Function(f) => (f.kind, f.is_defined),
            _ => return symbol,
        };
        if !is_defined {
            // Extern declaration: callers reference the symbol, there
            // is nothing to lower.
            return symbol;
        }
        if self.ctx.is_poisoned(decl) {
            let stub = poisoned_stub(&self.ctx, decl, &symbol);
            self.functions.push(stub);
            return symbol;
        }

        log::debug!("lowering `{symbol}`");
        let result = match kind {
            FunctionKind::Constructor { class } => ctor::lower_ctor(self, decl, class, variant),
            FunctionKind::Destructor { class, .. } => ctor::lower_dtor(self, decl, class, variant),
            _ => lower_plain_function(self, decl, &symbol),
        };
        match result {
            Ok(func) => {
                debug_assert!(crate::ir::validate_function(&func).is_ok());
                self.functions.push(func);
            }
            Err(err) => {
                self.ctx.report_and_poison(decl, err);
                let stub = poisoned_stub(&self.ctx, decl, &symbol);
                self.functions.push(stub);
            }
        }
        symbol
    }

    /// The synthesised default constructor of a class without one.
    pub fn implicit_default_ctor(&mut self, class: DeclId) -> DeclId {
        if let Some(&done) = self.implicit_ctors.get(&class) {
            return done;
        }
        let name = self.ctx.decl(class).name.clone();
        let class_scope = match &self.ctx.decl(class).kind {
            DeclKind::Class(c) => c.scope,
            _ => self.ctx.global_scope,
        };
        let mut def = ast::FunctionDef::new(name, Vec::new(), ast::TypeExpr::builtin(ast::BuiltinType::Void));
        def.special = ast::SpecialKind::Constructor;
        def.body = Some(ast::Block::default());
        let decl = declare::declare_function(
            &mut self.ctx,
            Arc::new(def),
            class_scope,
            FunctionKind::Constructor { class },
            ferrule_sema::Access::Public,
            ferrule_sema::Linkage::External,
            None,
        );
        if let Err(err) = declare::resolve_function_signature(&mut self.ctx, decl) {
            self.ctx.report_and_poison(decl, err);
        }
        if let DeclKind::Class(c) = &mut self.ctx.decl_mut(class).kind {
            c.ctors.push(decl);
        }
        self.implicit_ctors.insert(class, decl);
        decl
    }
}

/// Lower one translation unit end to end.
pub fn lower_unit(tu: &ast::TranslationUnit) -> LoweredUnit {
    let mut ctx = Context::new();
    declare::declare_translation_unit(&mut ctx, tu);
    let mut state = ModuleState::new(ctx);

    // Defined functions in declaration order. Constructors and
    // destructors get both their complete and base variants.
    let declared = state.ctx.decls.len();
    for index in 0..declared {
        let id = DeclId(index as u32);
        if state.ctx.diags.is_tu_fatal() {
            break;
        }
        let kind = match &state.ctx.decl(id).kind {
            DeclKind::Function(f)
                if f.is_defined && f.origin.is_none() && f.sig.is_some() =>
            {
                f.kind
            }
            _ => continue,
        };
        match kind {
            FunctionKind::Constructor { .. } | FunctionKind::Destructor { .. } => {
                state.ensure_lowered(id, StructorVariant::Complete);
                state.ensure_lowered(id, StructorVariant::Base);
            }
            _ => {
                state.ensure_lowered(id, StructorVariant::Complete);
            }
        }
    }

    let vtables = emit_vtables(&mut state);

    LoweredUnit {
        functions: state.functions,
        vtables,
        symbols: state.symbols,
        diagnostics: state.ctx.diags.into_vec(),
    }
}

fn lower_plain_function(
    state: &mut ModuleState,
    decl: DeclId,
    symbol: &str,
) -> SemaResult<MirFunction> {
    let body = match &state.ctx.decl(decl).kind {
        DeclKind::Function(f) => f.def.body.clone(),
        _ => None,
    };
    let Some(body) = body else {
        return Err(SemaError::Internal {
            message: format!("`{symbol}` has no body to lower"),
            span: None,
        });
    };
    let mut lowering = FunctionLowering::new(state, decl, symbol.to_string())?;
    lowering.lower_body(&body)?;
    Ok(lowering.finish())
}

/// A single-`Unreachable`-block stand-in for a failed function.
fn poisoned_stub(ctx: &Context, decl: DeclId, symbol: &str) -> MirFunction {
    let sig = ctx
        .function_sig(decl)
        .map(|s| MirSignature {
            params: s.params.clone(),
            ret: s.ret,
            call_conv: CallConv::Cxx,
        })
        .unwrap_or(MirSignature {
            params: Vec::new(),
            ret: ctx.types.common.void,
            call_conv: CallConv::Cxx,
        });
    MirFunction {
        symbol: symbol.to_string(),
        name: ctx.qualified_name(decl),
        sig,
        locals: Vec::new(),
        arg_count: 0,
        ret_local: None,
        blocks: vec![BasicBlock { statements: Vec::new(), terminator: Terminator::Unreachable }],
        span: ctx.decl(decl).span,
    }
}

/// Emit the vtable blob of every polymorphic class, in declaration
/// order. Entries carry mangled target symbols and i32 adjustors; the
/// virtual-base offset table rides alongside the groups.
fn emit_vtables(state: &mut ModuleState) -> Vec<VTableBlob> {
    let mut out = Vec::new();
    let declared = state.ctx.decls.len();
    for index in 0..declared {
        let id = DeclId(index as u32);
        let eligible = match &state.ctx.decl(id).kind {
            DeclKind::Class(c) => c.is_complete && c.sigs_resolved,
            _ => false,
        };
        if !eligible {
            continue;
        }
        let layout = match state.layouts.class_layout(&state.ctx, id) {
            Ok(layout) => layout,
            Err(err) => {
                report_layout_error(&mut state.ctx, err);
                continue;
            }
        };
        let Some(vtable) = &layout.vtable else { continue };

        let mut groups = Vec::with_capacity(vtable.groups.len());
        for group in &vtable.groups {
            let mut entries = Vec::with_capacity(group.entries.len());
            for entry in &group.entries {
                entries.push(match entry {
                    VTableEntry::Method { target, adjustor } => BlobEntry::Fn {
                        symbol: mangle_function_variant(
                            &state.ctx,
                            *target,
                            StructorVariant::Complete,
                        ),
                        adjustor: *adjustor as i32,
                    },
                    VTableEntry::Pure { .. } => BlobEntry::Pure,
                    VTableEntry::Rtti => BlobEntry::Rtti {
                        symbol: mangle_typeinfo(&state.ctx, id),
                    },
                });
            }
            groups.push(BlobGroup { base: group.base, offset: group.offset, entries });
        }

        let mut vbase_offsets: Vec<(DeclId, u64)> =
            layout.vbase_offsets.iter().map(|(&k, &v)| (k, v)).collect();
        vbase_offsets.sort_by_key(|(decl, _)| *decl);

        out.push(VTableBlob {
            class: id,
            symbol: mangle_vtable(&state.ctx, id),
            groups,
            vbase_offsets,
        });
    }
    out
}

pub(crate) fn report_layout_error(ctx: &mut Context, err: LayoutError) {
    let code = match err {
        LayoutError::CircularBase(_) => DiagCode::CircularBase,
        LayoutError::InvalidVirtualBase(_) => DiagCode::InvalidVirtualBase,
        LayoutError::IncompleteType(_) => DiagCode::IncompleteType,
        LayoutError::NoLayout(_) | LayoutError::NotABase { .. } => DiagCode::TypeMismatch,
    };
    ctx.diags.error(code, None, err.to_string());
}
