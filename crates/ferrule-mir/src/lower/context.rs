//! Per-function lowering state.
//!
//! Owns the locals and blocks of the function under construction, the
//! stack of lexical variable scopes, and the loop context stack used by
//! `break`/`continue`. Blocks are built in place; a block that never
//! receives a terminator (unreachable continuations) closes with
//! `Unreachable`, keeping every block well-formed.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use ferrule_ast::Span;
use ferrule_layout::{BasePath, ClassLayout};
use ferrule_sema::decl::DeclKind;
use ferrule_sema::{DeclId, ScopeId, SemaError, SemaResult, Type, TypeId};

use super::{report_layout_error, ModuleState};
use crate::ir::{
    BasicBlock, BlockId, CallConv, LocalDecl, LocalId, MirFunction, MirSignature, Operand, Place,
    Statement, Terminator,
};
use ferrule_mangle::StructorVariant;

/// A block under construction.
#[derive(Debug, Default)]
pub(crate) struct BlockBuilder {
    pub statements: Vec<Statement>,
    pub terminator: Option<Terminator>,
}

/// Break/continue targets of an enclosing loop or switch. A switch
/// pushes a context with no continue target, so `continue` inside it
/// still reaches the innermost loop.
pub(crate) struct LoopCtx {
    pub continue_target: Option<BlockId>,
    pub break_target: BlockId,
}

/// One lexical scope of named locals, plus the class-typed locals that
/// need their destructor run on scope exit, in declaration order.
#[derive(Default)]
struct ScopeVars {
    names: FxHashMap<String, LocalId>,
    to_destroy: Vec<(LocalId, DeclId)>,
}

pub(crate) struct FunctionLowering<'a> {
    pub state: &'a mut ModuleState,
    pub symbol: String,
    /// The sema scope of the function; body lookups start here.
    pub fn_scope: ScopeId,
    /// Enclosing class for members, constructors and destructors.
    pub class: Option<DeclId>,
    pub locals: Vec<LocalDecl>,
    blocks: Vec<BlockBuilder>,
    pub current: BlockId,
    var_scopes: Vec<ScopeVars>,
    pub loop_stack: Vec<LoopCtx>,
    pub this_local: Option<LocalId>,
    pub ret_local: Option<LocalId>,
    arg_count: usize,
    sig: MirSignature,
    name: String,
    span: Span,
}

impl<'a> FunctionLowering<'a> {
    pub fn new(state: &'a mut ModuleState, decl: DeclId, symbol: String) -> SemaResult<Self> {
        let (kind, sig, params, fn_scope) = match &state.ctx.decl(decl).kind {
            DeclKind::Function(f) => {
                let Some(sig) = f.sig.clone() else {
                    return Err(SemaError::Internal {
                        message: format!("lowering `{symbol}` before signature resolution"),
                        span: None,
                    });
                };
                (f.kind, sig, f.params.clone(), f.scope)
            }
            _ => {
                return Err(SemaError::Internal {
                    message: format!("`{symbol}` is not a function"),
                    span: None,
                })
            }
        };

        let span = state.ctx.decl(decl).span;
        let name = state.ctx.qualified_name(decl);
        let class = kind.class();

        let mut locals = Vec::new();
        let mut mir_params = Vec::new();
        let mut base_scope = ScopeVars::default();
        let mut this_local = None;

        if kind.has_this() {
            let class_decl = class.ok_or_else(|| SemaError::Internal {
                message: format!("method `{symbol}` without a class"),
                span: None,
            })?;
            let class_ty = state.ctx.types.intern(Type::Class(class_decl));
            let this_ty = state.ctx.types.pointer_to(class_ty);
            this_local = Some(locals.len() as LocalId);
            locals.push(LocalDecl { ty: this_ty, name: Some("this".into()), span: Some(span) });
            mir_params.push(this_ty);
        }
        for p in &params {
            let id = locals.len() as LocalId;
            locals.push(LocalDecl { ty: p.ty, name: Some(p.name.clone()), span: Some(p.span) });
            if !p.name.is_empty() {
                base_scope.names.insert(p.name.clone(), id);
            }
            mir_params.push(p.ty);
        }
        let arg_count = locals.len();

        let ret_local = if state.ctx.types.get(sig.ret).is_void() {
            None
        } else {
            let id = locals.len() as LocalId;
            locals.push(LocalDecl { ty: sig.ret, name: None, span: None });
            Some(id)
        };

        let call_conv = if symbol == "main" { CallConv::C } else { CallConv::Cxx };
        Ok(Self {
            state,
            symbol,
            fn_scope,
            class,
            locals,
            blocks: vec![BlockBuilder::default()],
            current: 0,
            var_scopes: vec![base_scope],
            loop_stack: Vec::new(),
            this_local,
            ret_local,
            arg_count,
            sig: MirSignature { params: mir_params, ret: sig.ret, call_conv },
            name,
            span,
        })
    }

    // ---- block management ------------------------------------------------

    pub fn new_block(&mut self) -> BlockId {
        let id = self.blocks.len() as BlockId;
        self.blocks.push(BlockBuilder::default());
        id
    }

    pub fn emit(&mut self, stmt: Statement) {
        self.blocks[self.current as usize].statements.push(stmt);
    }

    /// Close the current block. A second terminator for the same block
    /// is dropped; the block keeps its first one.
    pub fn terminate(&mut self, terminator: Terminator) {
        let block = &mut self.blocks[self.current as usize];
        if block.terminator.is_none() {
            block.terminator = Some(terminator);
        }
    }

    pub fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    /// Terminate with a goto and continue lowering in `target`.
    pub fn goto(&mut self, target: BlockId) {
        self.terminate(Terminator::Goto { target });
        self.switch_to(target);
    }

    /// Emit a call terminator and continue in a fresh block.
    pub fn emit_call(&mut self, callee: String, args: Vec<Operand>, destination: Place) {
        let cont = self.new_block();
        self.terminate(Terminator::Call {
            callee,
            args,
            destination,
            target: Some(cont),
            unwind: None,
        });
        self.switch_to(cont);
    }

    // ---- locals ----------------------------------------------------------

    pub fn temp(&mut self, ty: TypeId) -> LocalId {
        let id = self.locals.len() as LocalId;
        self.locals.push(LocalDecl { ty, name: None, span: None });
        id
    }

    /// A throwaway destination for calls whose result is unused.
    pub fn scratch_dest(&mut self, ty: TypeId) -> Place {
        Place::from_local(self.temp(ty))
    }

    pub fn declare_named(&mut self, name: &str, ty: TypeId, span: Span) -> LocalId {
        let id = self.locals.len() as LocalId;
        self.locals.push(LocalDecl { ty, name: Some(name.to_string()), span: Some(span) });
        if let Some(scope) = self.var_scopes.last_mut() {
            scope.names.insert(name.to_string(), id);
        }
        id
    }

    pub fn find_local(&self, name: &str) -> Option<LocalId> {
        self.var_scopes
            .iter()
            .rev()
            .find_map(|scope| scope.names.get(name).copied())
    }

    pub fn local_type(&self, local: LocalId) -> TypeId {
        self.locals[local as usize].ty
    }

    // ---- lexical scopes --------------------------------------------------

    pub fn push_var_scope(&mut self) {
        self.var_scopes.push(ScopeVars::default());
    }

    /// Record a class-typed local for destruction at scope exit.
    pub fn track_destructible(&mut self, local: LocalId, class: DeclId) {
        if let Some(scope) = self.var_scopes.last_mut() {
            scope.to_destroy.push((local, class));
        }
    }

    /// Close the innermost scope: run destructors in reverse
    /// construction order, then kill the storage.
    pub fn pop_var_scope(&mut self) {
        let Some(scope) = self.var_scopes.pop() else { return };
        for &(local, class) in scope.to_destroy.iter().rev() {
            let dtor = match &self.state.ctx.decl(class).kind {
                DeclKind::Class(c) => c.dtor,
                _ => None,
            };
            if let Some(dtor) = dtor {
                let symbol = self.state.ensure_lowered(dtor, StructorVariant::Complete);
                let this_ty = self.local_type(local);
                let class_ptr = self.state.ctx.types.pointer_to(this_ty);
                let addr = self.temp(class_ptr);
                self.emit(Statement::Assign {
                    place: Place::from_local(addr),
                    rvalue: crate::ir::Rvalue::AddressOf(Place::from_local(local)),
                });
                let dest = self.scratch_dest(self.state.ctx.types.common.void);
                self.emit_call(symbol, vec![Operand::Copy(Place::from_local(addr))], dest);
            }
        }
        let mut named: Vec<LocalId> = scope.names.values().copied().collect();
        named.sort_unstable();
        for local in named.into_iter().rev() {
            if (local as usize) >= self.arg_count {
                self.emit(Statement::StorageDead(local));
            }
        }
    }

    /// Destructor calls for every tracked local in every open scope,
    /// innermost first, without closing the scopes. Used before
    /// `return`.
    pub fn emit_all_drops(&mut self) {
        let to_destroy: Vec<(LocalId, DeclId)> = self
            .var_scopes
            .iter()
            .rev()
            .flat_map(|s| s.to_destroy.iter().rev().copied())
            .collect();
        for (local, class) in to_destroy {
            let dtor = match &self.state.ctx.decl(class).kind {
                DeclKind::Class(c) => c.dtor,
                _ => None,
            };
            if let Some(dtor) = dtor {
                let symbol = self.state.ensure_lowered(dtor, StructorVariant::Complete);
                let class_ty = self.local_type(local);
                let ptr_ty = self.state.ctx.types.pointer_to(class_ty);
                let addr = self.temp(ptr_ty);
                self.emit(Statement::Assign {
                    place: Place::from_local(addr),
                    rvalue: crate::ir::Rvalue::AddressOf(Place::from_local(local)),
                });
                let dest = self.scratch_dest(self.state.ctx.types.common.void);
                self.emit_call(symbol, vec![Operand::Copy(Place::from_local(addr))], dest);
            }
        }
    }

    // ---- layout access ---------------------------------------------------

    pub fn class_layout(&mut self, class: DeclId, span: Span) -> SemaResult<Arc<ClassLayout>> {
        match self.state.layouts.class_layout(&self.state.ctx, class) {
            Ok(layout) => Ok(layout),
            Err(err) => {
                report_layout_error(&mut self.state.ctx, err);
                Err(SemaError::IncompleteType {
                    name: self.state.ctx.qualified_name(class),
                    span: span.into(),
                })
            }
        }
    }

    pub fn size_of(&mut self, ty: TypeId, span: Span) -> SemaResult<u64> {
        match self.state.layouts.size_of(&self.state.ctx, ty) {
            Ok(size) => Ok(size),
            Err(err) => {
                report_layout_error(&mut self.state.ctx, err);
                Err(SemaError::IncompleteType {
                    name: self.state.ctx.type_name(ty),
                    span: span.into(),
                })
            }
        }
    }

    /// How a pointer of static class `from` reaches the `to` base
    /// subobject; see [`ferrule_layout::LayoutEngine::base_path`].
    pub fn base_path(&mut self, from: DeclId, to: DeclId, span: Span) -> SemaResult<BasePath> {
        match self.state.layouts.base_path(&self.state.ctx, from, to) {
            Ok(path) => Ok(path),
            Err(err) => {
                report_layout_error(&mut self.state.ctx, err);
                Err(SemaError::IncompleteType {
                    name: self.state.ctx.qualified_name(to),
                    span: span.into(),
                })
            }
        }
    }

    // ---- finish ----------------------------------------------------------

    pub fn finish(self) -> MirFunction {
        let blocks = self
            .blocks
            .into_iter()
            .map(|b| BasicBlock {
                statements: b.statements,
                terminator: b.terminator.unwrap_or(Terminator::Unreachable),
            })
            .collect();
        MirFunction {
            symbol: self.symbol,
            name: self.name,
            sig: self.sig,
            locals: self.locals,
            arg_count: self.arg_count,
            ret_local: self.ret_local,
            blocks,
            span: self.span,
        }
    }
}
