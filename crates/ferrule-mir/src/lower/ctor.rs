//! Constructor and destructor lowering.
//!
//! Both are ordinary functions over a pointer to (un)initialised
//! storage. Two variants are emitted per special member, following the
//! Itanium scheme: the complete-object variant (`C1`/`D1`) constructs
//! or destroys virtual bases, the base-subobject variant (`C2`/`D2`)
//! leaves them to the most-derived object.
//!
//! Construction order: the virtual-base offset cells of every
//! subobject (complete variant only, consulted from the layout's
//! vtable-adjacent offset table), then virtual bases (complete variant
//! only), then direct non-virtual bases, then the vtable pointers of
//! this class, then member initialisers in declaration order (not
//! initialiser-list order), then the body. The cells go first so base
//! constructors can already navigate to virtual bases; rewriting the
//! vtable pointer after the base constructors return gives
//! during-construction virtual dispatch its C++ semantics: each
//! constructor sees its own class's vtable, and the most-derived
//! constructor leaves the final one in place.

use ferrule_ast::{self as ast, Span};
use ferrule_mangle::{mangle_function_variant, StructorVariant};
use ferrule_sema::decl::DeclKind;
use ferrule_sema::{DeclId, SemaError, SemaResult, Type};

use crate::ir::{Constant, MirFunction, Operand, Place, Rvalue, Statement};

use super::{FunctionLowering, ModuleState};

pub(crate) fn lower_ctor(
    state: &mut ModuleState,
    decl: DeclId,
    class: DeclId,
    variant: StructorVariant,
) -> SemaResult<MirFunction> {
    let symbol = mangle_function_variant(&state.ctx, decl, variant);
    let (member_inits, body) = match &state.ctx.decl(decl).kind {
        DeclKind::Function(f) => (f.def.member_inits.clone(), f.def.body.clone()),
        _ => {
            return Err(SemaError::Internal {
                message: "lower_ctor on non-function".into(),
                span: None,
            })
        }
    };
    let span = state.ctx.decl(decl).span;

    let mut lowering = FunctionLowering::new(state, decl, symbol)?;
    let this = lowering.this_local.ok_or_else(|| SemaError::Internal {
        message: "constructor without `this`".into(),
        span: Some(span.into()),
    })?;
    let object = Place::from_local(this).deref();

    let layout = lowering.class_layout(class, span)?;
    let bases = match &lowering.state.ctx.decl(class).kind {
        DeclKind::Class(c) => c.bases.clone(),
        _ => Vec::new(),
    };

    // The complete-object constructor knows every actual offset: embed
    // the virtual-base offsets into each subobject's cells, then
    // construct the virtual bases, once each.
    if variant == StructorVariant::Complete {
        lowering.embed_vbase_offsets(this, layout.as_ref(), span)?;
        let vbases: Vec<(DeclId, u64)> = layout
            .bases
            .iter()
            .filter(|b| b.is_virtual)
            .map(|b| (b.class, b.offset))
            .collect();
        for (vbase, offset) in vbases {
            lowering.construct_base(
                &object, class, vbase, offset, &member_inits, StructorVariant::Base, span,
            )?;
        }
    }

    // Direct non-virtual bases, in base-specifier order.
    for base in bases.iter().filter(|b| !b.is_virtual) {
        let offset = layout.offset_of_base(base.class).unwrap_or(0);
        lowering.construct_base(
            &object, class, base.class, offset, &member_inits, StructorVariant::Base, span,
        )?;
    }

    // Install this class's vtable pointers; the base constructors left
    // their own tables in place.
    if let Some(vtable) = &layout.vtable {
        let writes: Vec<(DeclId, u64, usize)> = match variant {
            StructorVariant::Complete => vtable
                .groups
                .iter()
                .enumerate()
                .map(|(g, group)| (group.base, group.offset, g))
                .collect(),
            StructorVariant::Base => vec![(vtable.groups[0].base, 0, 0)],
        };
        for (base, offset, group) in writes {
            let mut place = object.clone();
            if offset != 0 {
                place = place.downcast_base(base, offset);
            }
            place = place.vtable_slot(0);
            lowering.emit(Statement::Assign {
                place,
                rvalue: Rvalue::Use(Operand::Constant(Constant::VTable { class, group })),
            });
        }
    }

    // Member initialisers run in field declaration order.
    let fields = match &lowering.state.ctx.decl(class).kind {
        DeclKind::Class(c) => c.fields.clone(),
        _ => Vec::new(),
    };
    for (index, &field) in fields.iter().enumerate() {
        let field_name = lowering.state.ctx.decl(field).name.clone();
        let field_ty = lowering.state.ctx.var_type(field);
        let offset = layout
            .field(field)
            .map(|slot| slot.offset)
            .ok_or_else(|| SemaError::Internal {
                message: format!("no layout slot for field `{field_name}`"),
                span: Some(span.into()),
            })?;
        let place = object.clone().field(index, offset);
        let init = member_inits.iter().find(|mi| mi.member.name == field_name);

        match lowering.state.ctx.types.get(field_ty).clone() {
            Type::Class(field_class) => {
                let mut lowered = Vec::new();
                if let Some(init) = init {
                    for arg in &init.args {
                        lowered.push(lowering.lower_expr(arg)?);
                    }
                }
                lowering.emit_construct_into(place, field_class, lowered, span)?;
            }
            _ => {
                if let Some(init) = init {
                    if let Some(arg) = init.args.first() {
                        let (op, from) = lowering.lower_expr(arg)?;
                        let value = lowering.coerce(op, from, field_ty, span)?;
                        lowering.emit(Statement::Assign { place, rvalue: Rvalue::Use(value) });
                    }
                }
            }
        }
    }

    // The body, if any, with the implicit return.
    let body = body.unwrap_or_default();
    lowering.lower_body(&body)?;
    Ok(lowering.finish())
}

pub(crate) fn lower_dtor(
    state: &mut ModuleState,
    decl: DeclId,
    class: DeclId,
    variant: StructorVariant,
) -> SemaResult<MirFunction> {
    let symbol = mangle_function_variant(&state.ctx, decl, variant);
    let body = match &state.ctx.decl(decl).kind {
        DeclKind::Function(f) => f.def.body.clone(),
        _ => None,
    };
    let span = state.ctx.decl(decl).span;

    let mut lowering = FunctionLowering::new(state, decl, symbol)?;
    let this = lowering.this_local.ok_or_else(|| SemaError::Internal {
        message: "destructor without `this`".into(),
        span: Some(span.into()),
    })?;
    let object = Place::from_local(this).deref();
    let layout = lowering.class_layout(class, span)?;

    // The body runs before any member or base destruction.
    if let Some(body) = &body {
        lowering.push_var_scope();
        for stmt in &body.stmts {
            lowering.lower_stmt(stmt)?;
        }
        lowering.pop_var_scope();
    }

    // Members with destructors, in reverse declaration order.
    let fields = match &lowering.state.ctx.decl(class).kind {
        DeclKind::Class(c) => c.fields.clone(),
        _ => Vec::new(),
    };
    for (index, &field) in fields.iter().enumerate().rev() {
        let field_ty = lowering.state.ctx.var_type(field);
        let Type::Class(field_class) = lowering.state.ctx.types.get(field_ty) else {
            continue;
        };
        let field_class = *field_class;
        let dtor = match &lowering.state.ctx.decl(field_class).kind {
            DeclKind::Class(c) => c.dtor,
            _ => None,
        };
        let Some(dtor) = dtor else { continue };
        let offset = layout.field(field).map(|slot| slot.offset).unwrap_or(0);
        let field_place = object.clone().field(index, offset);
        lowering.call_structor(dtor, field_place, field_ty, StructorVariant::Complete, span)?;
    }

    // Base destructors in reverse base order; virtual bases only in
    // the complete-object variant.
    let bases = match &lowering.state.ctx.decl(class).kind {
        DeclKind::Class(c) => c.bases.clone(),
        _ => Vec::new(),
    };
    for base in bases.iter().filter(|b| !b.is_virtual).rev() {
        lowering.destroy_base(&object, layout.as_ref(), base.class, span)?;
    }
    if variant == StructorVariant::Complete {
        let vbases: Vec<DeclId> = layout
            .bases
            .iter()
            .filter(|b| b.is_virtual)
            .map(|b| b.class)
            .collect();
        for vbase in vbases.into_iter().rev() {
            lowering.destroy_base(&object, layout.as_ref(), vbase, span)?;
        }
    }

    lowering.terminate(crate::ir::Terminator::Return);
    Ok(lowering.finish())
}

impl<'a> FunctionLowering<'a> {
    /// Write the virtual-base offset cells of every subobject, values
    /// taken from the most-derived layout's offset table. Each cell
    /// holds the distance from its owning subobject to the virtual
    /// base within the complete object.
    fn embed_vbase_offsets(
        &mut self,
        this: crate::ir::LocalId,
        layout: &ferrule_layout::ClassLayout,
        span: Span,
    ) -> SemaResult<()> {
        let mut subobjects = vec![(layout.class, 0u64)];
        subobjects.extend(layout.bases.iter().map(|b| (b.class, b.offset)));
        for (sub, sub_offset) in subobjects {
            let slots = self.class_layout(sub, span)?.vbase_slots.clone();
            for (vbase, slot_offset) in slots {
                let target = layout.vbase_offsets.get(&vbase).copied().ok_or_else(|| {
                    SemaError::Internal {
                        message: format!(
                            "virtual base `{}` missing from the offset table",
                            self.state.ctx.qualified_name(vbase)
                        ),
                        span: Some(span.into()),
                    }
                })?;
                let value = target as i128 - sub_offset as i128;
                self.store_long_at(this, sub_offset + slot_offset, value);
            }
        }
        Ok(())
    }

    /// Store a 64-bit integer at a byte offset from `this`.
    fn store_long_at(&mut self, this: crate::ir::LocalId, byte_offset: u64, value: i128) {
        let long = self.state.ctx.types.common.long;
        let long_ptr = self.state.ctx.types.pointer_to(long);
        let addr = self.cast_to_local(
            Operand::Copy(Place::from_local(this)),
            crate::ir::CastKind::PtrToInt,
            long,
        );
        let cell_addr = self.rvalue_to_local(
            Rvalue::BinaryOp {
                op: crate::ir::BinOp::Add,
                lhs: Operand::Copy(Place::from_local(addr)),
                rhs: Operand::Constant(Constant::Int { value: byte_offset as i128, ty: long }),
            },
            long,
        );
        let cell = self.cast_to_local(
            Operand::Copy(Place::from_local(cell_addr)),
            crate::ir::CastKind::IntToPtr,
            long_ptr,
        );
        self.emit(Statement::Assign {
            place: Place::from_local(cell).deref(),
            rvalue: Rvalue::Use(Operand::Constant(Constant::Int { value, ty: long })),
        });
    }

    /// Call a base-class constructor on the subobject at `offset`,
    /// passing the matching initialiser-list arguments if any.
    #[allow(clippy::too_many_arguments)]
    fn construct_base(
        &mut self,
        object: &Place,
        _class: DeclId,
        base: DeclId,
        offset: u64,
        member_inits: &[ast::MemberInit],
        variant: StructorVariant,
        span: Span,
    ) -> SemaResult<()> {
        let base_name = self.state.ctx.decl(base).name.clone();
        let init = member_inits.iter().find(|mi| mi.member.name == base_name);
        let mut lowered = Vec::new();
        if let Some(init) = init {
            for arg in &init.args {
                lowered.push(self.lower_expr(arg)?);
            }
        }

        let (ctors, trivial) = match &self.state.ctx.decl(base).kind {
            DeclKind::Class(c) => {
                (c.ctors.clone(), c.ctors.is_empty() && !c.is_polymorphic && c.bases.is_empty())
            }
            _ => (Vec::new(), true),
        };
        if trivial && lowered.is_empty() {
            return Ok(());
        }
        let ctors = if ctors.is_empty() {
            vec![self.state.implicit_default_ctor(base)]
        } else {
            ctors
        };
        let arg_tys: Vec<_> = lowered.iter().map(|(_, ty)| *ty).collect();
        let target = ferrule_sema::overload::resolve_call(
            &mut self.state.ctx,
            &base_name,
            &ctors,
            &[],
            &arg_tys,
            span,
        )?;

        let mut place = object.clone();
        if offset != 0 {
            place = place.downcast_base(base, offset);
        }
        let base_ty = self.state.ctx.types.intern(Type::Class(base));
        self.call_structor_with_args(target, place, base_ty, lowered, variant, span)
    }

    fn destroy_base(
        &mut self,
        object: &Place,
        layout: &ferrule_layout::ClassLayout,
        base: DeclId,
        span: Span,
    ) -> SemaResult<()> {
        let dtor = match &self.state.ctx.decl(base).kind {
            DeclKind::Class(c) => c.dtor,
            _ => None,
        };
        let Some(dtor) = dtor else { return Ok(()) };
        let offset = layout.offset_of_base(base).unwrap_or(0);
        let mut place = object.clone();
        if offset != 0 {
            place = place.downcast_base(base, offset);
        }
        let base_ty = self.state.ctx.types.intern(Type::Class(base));
        self.call_structor(dtor, place, base_ty, StructorVariant::Base, span)
    }

    /// Call a constructor or destructor on a subobject place.
    fn call_structor(
        &mut self,
        target: DeclId,
        place: Place,
        object_ty: ferrule_sema::TypeId,
        variant: StructorVariant,
        span: Span,
    ) -> SemaResult<()> {
        self.call_structor_with_args(target, place, object_ty, Vec::new(), variant, span)
    }

    fn call_structor_with_args(
        &mut self,
        target: DeclId,
        place: Place,
        object_ty: ferrule_sema::TypeId,
        args: Vec<(Operand, ferrule_sema::TypeId)>,
        variant: StructorVariant,
        span: Span,
    ) -> SemaResult<()> {
        let sig = self.state.ctx.function_sig(target).ok_or_else(|| SemaError::Internal {
            message: "special member has no signature".into(),
            span: Some(span.into()),
        })?;
        let ptr_ty = self.state.ctx.types.pointer_to(object_ty);
        let this = self.rvalue_to_local(Rvalue::AddressOf(place), ptr_ty);
        let mut call_args = vec![Operand::Copy(Place::from_local(this))];
        for ((op, from), &param) in args.into_iter().zip(sig.params.iter()) {
            call_args.push(self.coerce(op, from, param, span)?);
        }
        let symbol = self.state.ensure_lowered(target, variant);
        let void = self.state.ctx.types.common.void;
        let dest = self.scratch_dest(void);
        self.emit_call(symbol, call_args, dest);
        Ok(())
    }
}
