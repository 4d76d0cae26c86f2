//! Call lowering.
//!
//! Static targets become `Call` terminators; virtual dispatch through
//! a pointer or reference becomes `VirtualCall` with the slot index and
//! static adjustor resolved at compile time from the receiver's class
//! layout. Candidate sets come from name lookup plus ADL, template
//! candidates included; the winner is instantiated and lowered
//! depth-first before the caller's lowering resumes.

use ferrule_ast::{self as ast, ExprKind, Span};
use ferrule_mangle::StructorVariant;
use ferrule_sema::decl::{DeclKind, FunctionKind};
use ferrule_sema::{lookup, overload, DeclId, SemaError, SemaResult, Type, TypeId};

use crate::ir::{Operand, Place, Rvalue, Statement, Terminator};

use super::FunctionLowering;

impl<'a> FunctionLowering<'a> {
    pub(crate) fn lower_call(
        &mut self,
        callee: &ast::Expr,
        args: &[ast::Expr],
        span: Span,
    ) -> SemaResult<(Operand, TypeId)> {
        // Arguments are evaluated left to right, before dispatch.
        let mut lowered_args = Vec::with_capacity(args.len());
        for arg in args {
            lowered_args.push(self.lower_expr(arg)?);
        }

        match &callee.kind {
            ExprKind::Member { base, field, arrow } => {
                let (object, class) = self.lower_receiver(base, *arrow, span)?;
                // Dynamic dispatch applies when the receiver is reached
                // through a pointer or reference; a direct object has a
                // statically known dynamic type.
                let indirect = *arrow
                    || object
                        .projection
                        .iter()
                        .any(|p| matches!(p, crate::ir::ProjectionElem::Deref));
                self.lower_method_call(object, class, field, lowered_args, indirect, span)
            }
            ExprKind::Name { path, template_args } => {
                let mut explicit = Vec::with_capacity(template_args.len());
                for ta in template_args {
                    explicit.push(self.resolve_type(ta, span)?);
                }
                self.lower_named_call(path, &explicit, lowered_args, span)
            }
            _ => Err(SemaError::UnsupportedConstruct {
                what: "call through a computed function value".into(),
                span: span.into(),
            }),
        }
    }

    /// Lower the receiver expression of a member access to an object
    /// place and its class.
    pub(crate) fn lower_receiver(
        &mut self,
        base: &ast::Expr,
        arrow: bool,
        span: Span,
    ) -> SemaResult<(Place, DeclId)> {
        if arrow {
            let (op, ty) = self.lower_expr(base)?;
            let pointee = match self.state.ctx.types.get(ty) {
                Type::Pointer { pointee, .. } => *pointee,
                _ => {
                    return Err(SemaError::TypeMismatch {
                        expected: "a pointer to class".into(),
                        found: self.state.ctx.type_name(ty),
                        span: span.into(),
                    })
                }
            };
            let class = match self.state.ctx.types.get(pointee) {
                Type::Class(d) => *d,
                _ => {
                    return Err(SemaError::TypeMismatch {
                        expected: "a pointer to class".into(),
                        found: self.state.ctx.type_name(ty),
                        span: span.into(),
                    })
                }
            };
            let tmp = self.operand_to_local(op, ty);
            Ok((Place::from_local(tmp).deref(), class))
        } else {
            let (place, ty) = self.lower_place(base)?;
            let class = match self.state.ctx.types.get(ty) {
                Type::Class(d) => *d,
                _ => {
                    return Err(SemaError::TypeMismatch {
                        expected: "a class object".into(),
                        found: self.state.ctx.type_name(ty),
                        span: span.into(),
                    })
                }
            };
            Ok((place, class))
        }
    }

    fn lower_method_call(
        &mut self,
        object: Place,
        class: DeclId,
        method: &str,
        args: Vec<(Operand, TypeId)>,
        indirect: bool,
        span: Span,
    ) -> SemaResult<(Operand, TypeId)> {
        let found = lookup::class_member(&self.state.ctx, class, method, span)?;
        let candidates: Vec<DeclId> = found
            .into_iter()
            .filter(|&d| {
                matches!(
                    self.state.ctx.decl(d).kind,
                    DeclKind::Function(_) | DeclKind::Template(_)
                )
            })
            .collect();
        if candidates.is_empty() {
            return Err(SemaError::NameNotFound {
                name: format!("{}::{method}", self.state.ctx.qualified_name(class)),
                span: span.into(),
            });
        }
        let arg_tys: Vec<TypeId> = args.iter().map(|(_, ty)| *ty).collect();
        let target =
            overload::resolve_call(&mut self.state.ctx, method, &candidates, &[], &arg_tys, span)?;
        lookup::check_member_access(&self.state.ctx, target, self.class, span)?;
        self.emit_method_invocation(object, class, target, args, indirect, span)
    }

    /// Emit either a `VirtualCall` or a direct `Call` for a resolved
    /// method target. `object_class` is the static class of the object
    /// place; the receiver is converted to the declaring class (direct
    /// calls) or the dispatching interface (virtual calls), reading the
    /// embedded virtual-base offset cell when the path crosses a
    /// virtual edge.
    pub(crate) fn emit_method_invocation(
        &mut self,
        object: Place,
        object_class: DeclId,
        target: DeclId,
        args: Vec<(Operand, TypeId)>,
        indirect: bool,
        span: Span,
    ) -> SemaResult<(Operand, TypeId)> {
        let kind = match &self.state.ctx.decl(target).kind {
            DeclKind::Function(f) => f.kind,
            _ => {
                return Err(SemaError::Internal {
                    message: "method target is not a function".into(),
                    span: Some(span.into()),
                })
            }
        };
        let sig = self.state.ctx.function_sig(target).ok_or_else(|| SemaError::Internal {
            message: "method target has no signature".into(),
            span: Some(span.into()),
        })?;

        let mut converted = Vec::with_capacity(args.len());
        for ((op, from), &param) in args.into_iter().zip(sig.params.iter()) {
            converted.push(self.coerce(op, from, param, span)?);
        }

        let is_static = matches!(kind, FunctionKind::Method { is_static: true, .. });
        let dest = self.scratch_dest(sig.ret);
        if kind.is_virtual() && indirect && !is_static {
            // The slot comes from the static class's vtable; the group
            // tells us which interface subobject the runtime reads its
            // vtable pointer from.
            let layout = self.class_layout(object_class, span)?;
            let (slot, group_base, group_offset) = {
                let vtable = layout.vtable.as_ref().ok_or_else(|| SemaError::Internal {
                    message: format!(
                        "virtual call on `{}` without a vtable",
                        self.state.ctx.qualified_name(object_class)
                    ),
                    span: Some(span.into()),
                })?;
                let (group, slot) =
                    vtable.dispatch(target).ok_or_else(|| SemaError::Internal {
                        message: format!(
                            "no vtable slot for `{}`",
                            self.state.ctx.qualified_name(target)
                        ),
                        span: Some(span.into()),
                    })?;
                (slot, vtable.groups[group].base, vtable.groups[group].offset)
            };
            let is_vbase_group = layout.vbase_offsets.contains_key(&group_base);

            let object_ptr = self.object_pointer(object, object_class);
            let (receiver, adjustor) = if is_vbase_group {
                // A virtual base's position depends on the dynamic
                // type: locate the interface through the embedded
                // offset cell, then dispatch with no further static
                // adjustment.
                let path = self.base_path(object_class, group_base, span)?;
                let group_ty = self.state.ctx.types.intern(Type::Class(group_base));
                let group_ptr_ty = self.state.ctx.types.pointer_to(group_ty);
                (self.upcast_pointer_operand(object_ptr, path, group_ptr_ty, span)?, 0)
            } else {
                (object_ptr, group_offset)
            };
            // Make sure the target is available to the backend even
            // though the call is indirect.
            self.state.ensure_lowered(target, StructorVariant::Complete);
            let cont = self.new_block();
            self.terminate(Terminator::VirtualCall {
                receiver,
                slot,
                adjustor,
                args: converted,
                destination: dest.clone(),
                target: Some(cont),
                unwind: None,
            });
            self.switch_to(cont);
        } else {
            let mut call_args = Vec::with_capacity(converted.len() + 1);
            if !is_static {
                // The callee expects a pointer to its declaring class's
                // subobject.
                let declaring = kind.class().ok_or_else(|| SemaError::Internal {
                    message: "member function without a class".into(),
                    span: Some(span.into()),
                })?;
                let object_ptr = self.object_pointer(object, object_class);
                let this_op = if declaring == object_class {
                    object_ptr
                } else {
                    let path = self.base_path(object_class, declaring, span)?;
                    let declaring_ty = self.state.ctx.types.intern(Type::Class(declaring));
                    let declaring_ptr_ty = self.state.ctx.types.pointer_to(declaring_ty);
                    self.upcast_pointer_operand(object_ptr, path, declaring_ptr_ty, span)?
                };
                call_args.push(this_op);
            }
            call_args.extend(converted);
            let symbol = self.state.ensure_lowered(target, StructorVariant::Complete);
            self.emit_call(symbol, call_args, dest.clone());
        }
        Ok((Operand::Copy(dest), sig.ret))
    }

    fn lower_named_call(
        &mut self,
        path: &[String],
        explicit_targs: &[TypeId],
        args: Vec<(Operand, TypeId)>,
        span: Span,
    ) -> SemaResult<(Operand, TypeId)> {
        let arg_tys: Vec<TypeId> = args.iter().map(|(_, ty)| *ty).collect();
        let name = path.join("::");

        let mut candidates = if let [single] = path {
            let mut found = lookup::unqualified(&self.state.ctx, self.fn_scope, single, span)?;
            // ADL: free functions from the arguments' associated
            // namespaces join the set for unqualified calls.
            for extra in lookup::adl_candidates(&self.state.ctx, single, &arg_tys) {
                if !found.contains(&extra) {
                    found.push(extra);
                }
            }
            found
        } else {
            lookup::qualified(&self.state.ctx, self.fn_scope, path, span)?
        };
        candidates.retain(|&d| {
            matches!(
                self.state.ctx.decl(d).kind,
                DeclKind::Function(_) | DeclKind::Template(_)
            )
        });
        if candidates.is_empty() {
            return Err(SemaError::NameNotFound { name, span: span.into() });
        }

        let target = overload::resolve_call(
            &mut self.state.ctx,
            &name,
            &candidates,
            explicit_targs,
            &arg_tys,
            span,
        )?;

        // A method found by (possibly qualified) lookup from inside a
        // member function call binds the implicit `this`; the receiver
        // keeps the enclosing class as its static type.
        let kind = match &self.state.ctx.decl(target).kind {
            DeclKind::Function(f) => f.kind,
            _ => FunctionKind::Free,
        };
        if let FunctionKind::Method { is_static: false, .. } = kind {
            let this = self.this_local.ok_or_else(|| SemaError::UnsupportedConstruct {
                what: format!("call to member `{name}` outside a member function"),
                span: span.into(),
            })?;
            let enclosing = self.class.ok_or_else(|| SemaError::Internal {
                message: format!("implicit `this` for `{name}` without an enclosing class"),
                span: Some(span.into()),
            })?;
            let object = Place::from_local(this).deref();
            // A qualified call (`B::f()`) suppresses virtual dispatch.
            let indirect = path.len() == 1;
            return self.emit_method_invocation(object, enclosing, target, args, indirect, span);
        }

        let sig = self.state.ctx.function_sig(target).ok_or_else(|| SemaError::Internal {
            message: format!("`{name}` has no signature"),
            span: Some(span.into()),
        })?;
        let mut converted = Vec::with_capacity(args.len());
        for (i, (op, from)) in args.into_iter().enumerate() {
            match sig.params.get(i) {
                Some(&param) => converted.push(self.coerce(op, from, param, span)?),
                // Ellipsis arguments pass through unchanged.
                None => converted.push(op),
            }
        }
        let symbol = self.state.ensure_lowered(target, StructorVariant::Complete);
        let dest = self.scratch_dest(sig.ret);
        self.emit_call(symbol, converted, dest.clone());
        Ok((Operand::Copy(dest), sig.ret))
    }

    /// Construct an object of class type into `dest` by resolving and
    /// calling the right constructor.
    pub(crate) fn emit_construct_into(
        &mut self,
        dest: Place,
        class: DeclId,
        args: Vec<(Operand, TypeId)>,
        span: Span,
    ) -> SemaResult<()> {
        let ctors = match &self.state.ctx.decl(class).kind {
            DeclKind::Class(c) => c.ctors.clone(),
            _ => {
                return Err(SemaError::TypeMismatch {
                    expected: "a class type".into(),
                    found: self.state.ctx.qualified_name(class),
                    span: span.into(),
                })
            }
        };
        let needs_ctor = !ctors.is_empty() || !args.is_empty() || class_needs_ctor(self, class);
        if !needs_ctor {
            // Trivial type with no initialiser: storage only.
            return Ok(());
        }
        let ctors = if ctors.is_empty() {
            vec![self.state.implicit_default_ctor(class)]
        } else {
            ctors
        };
        let arg_tys: Vec<TypeId> = args.iter().map(|(_, ty)| *ty).collect();
        let name = self.state.ctx.decl(class).name.clone();
        let target =
            overload::resolve_call(&mut self.state.ctx, &name, &ctors, &[], &arg_tys, span)?;
        lookup::check_member_access(&self.state.ctx, target, self.class, span)?;

        let sig = self.state.ctx.function_sig(target).ok_or_else(|| SemaError::Internal {
            message: format!("constructor of `{name}` has no signature"),
            span: Some(span.into()),
        })?;
        let class_ty = self.state.ctx.types.intern(Type::Class(class));
        let ptr_ty = self.state.ctx.types.pointer_to(class_ty);
        let this = self.rvalue_to_local(Rvalue::AddressOf(dest), ptr_ty);
        let mut call_args = vec![Operand::Copy(Place::from_local(this))];
        for ((op, from), &param) in args.into_iter().zip(sig.params.iter()) {
            call_args.push(self.coerce(op, from, param, span)?);
        }
        let symbol = self.state.ensure_lowered(target, StructorVariant::Complete);
        let void = self.state.ctx.types.common.void;
        let dest = self.scratch_dest(void);
        self.emit_call(symbol, call_args, dest);
        Ok(())
    }

    /// Materialise a constructed temporary and return its place.
    pub(crate) fn construct_temporary(
        &mut self,
        class_ty: TypeId,
        args: &[ast::Expr],
        span: Span,
    ) -> SemaResult<Place> {
        let class = match self.state.ctx.types.get(class_ty) {
            Type::Class(d) => *d,
            _ => {
                return Err(SemaError::TypeMismatch {
                    expected: "a class type".into(),
                    found: self.state.ctx.type_name(class_ty),
                    span: span.into(),
                })
            }
        };
        let mut lowered = Vec::with_capacity(args.len());
        for arg in args {
            lowered.push(self.lower_expr(arg)?);
        }
        let tmp = self.temp(class_ty);
        self.emit(Statement::StorageLive(tmp));
        let place = Place::from_local(tmp);
        self.emit_construct_into(place.clone(), class, lowered, span)?;
        Ok(place)
    }
}

/// Whether default-constructing this class does real work: it is
/// polymorphic, has bases, or has class-typed fields.
pub(crate) fn class_needs_ctor(lowering: &FunctionLowering<'_>, class: DeclId) -> bool {
    let DeclKind::Class(c) = &lowering.state.ctx.decl(class).kind else {
        return false;
    };
    if c.is_polymorphic || !c.bases.is_empty() {
        return true;
    }
    c.fields.iter().any(|&f| {
        matches!(
            lowering.state.ctx.types.get(lowering.state.ctx.var_type(f)),
            Type::Class(_)
        )
    })
}
