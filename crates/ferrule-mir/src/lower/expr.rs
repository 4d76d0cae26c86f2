//! Expression lowering.
//!
//! Every function here appends statements (and possibly blocks) to the
//! current function and returns the operand producing the expression's
//! value, together with its canonical type. Lvalues are lowered through
//! [`FunctionLowering::lower_place`], which returns a [`Place`];
//! rvalue contexts wrap places in `Copy`.
//!
//! Arguments are evaluated left to right. Short-circuit `&&`/`||` and
//! the conditional operator become CFG diamonds writing a result
//! temporary. Pointer arithmetic scales by the pointee size through an
//! explicit cast to a 64-bit offset, and `*p++` reads through the
//! original pointer before the increment lands.

use ferrule_ast::{self as ast, BinaryOp, ExprKind, Span, UnaryOp};
use ferrule_layout::BasePath;
use ferrule_sema::convert::common_type;
use ferrule_sema::decl::{DeclKind, FunctionKind, VarKind};
use ferrule_sema::{lookup, overload, DeclId, SemaError, SemaResult, Type, TypeId};

use crate::ir::{
    BinOp, BorrowKind, CastKind, Constant, Operand, Place, Rvalue, Statement, Terminator, UnOp,
};

use super::FunctionLowering;

impl<'a> FunctionLowering<'a> {
    /// Lower an expression to an operand and its type.
    pub(crate) fn lower_expr(&mut self, e: &ast::Expr) -> SemaResult<(Operand, TypeId)> {
        match &e.kind {
            ExprKind::IntLit { value, is_long } => {
                let ty = if *is_long {
                    self.state.ctx.types.common.long
                } else {
                    self.state.ctx.types.common.int
                };
                Ok((Operand::Constant(Constant::Int { value: *value as i128, ty }), ty))
            }
            ExprKind::FloatLit { value, is_single } => {
                let ty = if *is_single {
                    self.state.ctx.types.common.float
                } else {
                    self.state.ctx.types.common.double
                };
                Ok((Operand::Constant(Constant::Float { value: *value, ty }), ty))
            }
            ExprKind::BoolLit(b) => {
                Ok((Operand::Constant(Constant::Bool(*b)), self.state.ctx.types.common.bool_))
            }
            ExprKind::CharLit(c) => {
                let ty = self.state.ctx.types.common.char_;
                Ok((Operand::Constant(Constant::Int { value: (*c as u32) as i128, ty }), ty))
            }
            ExprKind::This => {
                let this = self.this_local.ok_or_else(|| SemaError::UnsupportedConstruct {
                    what: "`this` outside a member function".into(),
                    span: e.span.into(),
                })?;
                Ok((Operand::Copy(Place::from_local(this)), self.local_type(this)))
            }
            ExprKind::Name { path, .. } => {
                // Enumerators and other constants first; everything
                // else is a place.
                if let Some(result) = self.lower_constant_name(path, e.span)? {
                    return Ok(result);
                }
                let (place, ty) = self.lower_place(e)?;
                Ok((Operand::Copy(place), ty))
            }
            ExprKind::Member { .. } | ExprKind::Subscript { .. } => {
                let (place, ty) = self.lower_place(e)?;
                Ok((Operand::Copy(place), ty))
            }
            ExprKind::Unary { op, operand } => self.lower_unary(*op, operand, e.span),
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs, e.span),
            ExprKind::Ternary { cond, then, otherwise } => {
                self.lower_ternary(cond, then, otherwise, e.span)
            }
            ExprKind::Call { callee, args } => self.lower_call(callee, args, e.span),
            ExprKind::Construct { ty, args } => {
                let class_ty = self.resolve_type(ty, e.span)?;
                let place = self.construct_temporary(class_ty, args, e.span)?;
                Ok((Operand::Move(place), class_ty))
            }
            ExprKind::Cast { ty, operand } => {
                let to = self.resolve_type(ty, e.span)?;
                let (op, from) = self.lower_expr(operand)?;
                let converted = self.coerce(op, from, to, e.span)?;
                Ok((converted, to))
            }
            ExprKind::SizeOfType(ty) => {
                let ty = self.resolve_type(ty, e.span)?;
                let size = self.size_of(ty, e.span)?;
                let ulong = self.state.ctx.types.common.ulong;
                Ok((Operand::Constant(Constant::Int { value: size as i128, ty: ulong }), ulong))
            }
            ExprKind::SizeOfExpr(inner) => {
                let (_, ty) = self.lower_expr(inner)?;
                let size = self.size_of(ty, e.span)?;
                let ulong = self.state.ctx.types.common.ulong;
                Ok((Operand::Constant(Constant::Int { value: size as i128, ty: ulong }), ulong))
            }
            ExprKind::New { .. } => Err(SemaError::UnsupportedConstruct {
                what: "operator new".into(),
                span: e.span.into(),
            }),
            ExprKind::Delete { .. } => Err(SemaError::UnsupportedConstruct {
                what: "operator delete".into(),
                span: e.span.into(),
            }),
            ExprKind::Throw(_) => Err(SemaError::UnsupportedConstruct {
                what: "exceptions (throw)".into(),
                span: e.span.into(),
            }),
        }
    }

    /// Lower an lvalue expression to a place.
    pub(crate) fn lower_place(&mut self, e: &ast::Expr) -> SemaResult<(Place, TypeId)> {
        match &e.kind {
            ExprKind::Name { path, .. } => self.lower_name_place(path, e.span),
            ExprKind::Member { base, field, arrow } => {
                let (place, class) = self.lower_receiver(base, *arrow, e.span)?;
                self.member_place(place, class, field, e.span)
            }
            ExprKind::Subscript { base, index } => {
                let (index_op, index_ty) = self.lower_expr(index)?;
                let long = self.state.ctx.types.common.long;
                let index_op = self.coerce(index_op, index_ty, long, e.span)?;
                let index_local = self.operand_to_local(index_op, long);

                let (base_place, base_ty) = self.lower_place(base)?;
                match self.state.ctx.types.get(base_ty).clone() {
                    Type::Array { element, .. } => {
                        let stride = self.stride_of(element, e.span)?;
                        Ok((base_place.index(index_local, stride), element))
                    }
                    Type::Pointer { pointee, .. } => {
                        // p[i] is *(p + i).
                        let ptr_op = Operand::Copy(base_place);
                        let (sum, _) = self.pointer_offset(
                            ptr_op,
                            base_ty,
                            Operand::Copy(Place::from_local(index_local)),
                            false,
                            e.span,
                        )?;
                        let tmp = self.operand_to_local(sum, base_ty);
                        Ok((Place::from_local(tmp).deref(), pointee))
                    }
                    _ => Err(SemaError::TypeMismatch {
                        expected: "an array or pointer".into(),
                        found: self.state.ctx.type_name(base_ty),
                        span: e.span.into(),
                    }),
                }
            }
            ExprKind::Unary { op: UnaryOp::Deref, operand } => {
                let (op, ty) = self.lower_expr(operand)?;
                let pointee = match self.state.ctx.types.get(ty) {
                    Type::Pointer { pointee, .. } => *pointee,
                    _ => {
                        return Err(SemaError::InvalidPointerArithmetic {
                            ty: self.state.ctx.type_name(ty),
                            span: e.span.into(),
                        })
                    }
                };
                let tmp = self.operand_to_local(op, ty);
                Ok((Place::from_local(tmp).deref(), pointee))
            }
            ExprKind::This => {
                let this = self.this_local.ok_or_else(|| SemaError::UnsupportedConstruct {
                    what: "`this` outside a member function".into(),
                    span: e.span.into(),
                })?;
                Ok((Place::from_local(this), self.local_type(this)))
            }
            // Anything else is materialised into a temporary.
            _ => {
                let (op, ty) = self.lower_expr(e)?;
                let tmp = self.operand_to_local(op, ty);
                Ok((Place::from_local(tmp), ty))
            }
        }
    }

    /// Names that evaluate to constants: enumerators.
    fn lower_constant_name(
        &mut self,
        path: &[String],
        span: Span,
    ) -> SemaResult<Option<(Operand, TypeId)>> {
        if let [single] = path {
            if self.find_local(single).is_some() {
                return Ok(None);
            }
        }
        let found = match lookup::lookup_path(&self.state.ctx, self.fn_scope, path, span) {
            Ok(found) => found,
            Err(_) => return Ok(None),
        };
        for decl in found {
            if let DeclKind::Variable(v) = &self.state.ctx.decl(decl).kind {
                if let VarKind::Enumerator { value } = v.kind {
                    let ty = v.ty.unwrap_or(self.state.ctx.types.common.int);
                    return Ok(Some((
                        Operand::Constant(Constant::Int { value: value as i128, ty }),
                        ty,
                    )));
                }
            }
        }
        Ok(None)
    }

    fn lower_name_place(&mut self, path: &[String], span: Span) -> SemaResult<(Place, TypeId)> {
        if let [single] = path {
            if let Some(local) = self.find_local(single) {
                let ty = self.local_type(local);
                // A reference variable transparently denotes its
                // referent.
                if let Type::Reference { referent, .. } = self.state.ctx.types.get(ty) {
                    return Ok((Place::from_local(local).deref(), *referent));
                }
                return Ok((Place::from_local(local), ty));
            }
        }
        let found = lookup::lookup_path(&self.state.ctx, self.fn_scope, path, span)?;
        for decl in found {
            if let DeclKind::Variable(v) = &self.state.ctx.decl(decl).kind {
                match v.kind {
                    VarKind::Field { .. } => {
                        let field_name = self.state.ctx.decl(decl).name.clone();
                        let this = self.this_local.ok_or_else(|| {
                            SemaError::UnsupportedConstruct {
                                what: format!("member `{field_name}` outside a member function"),
                                span: span.into(),
                            }
                        })?;
                        let class = self.class.ok_or_else(|| SemaError::Internal {
                            message: "member access without enclosing class".into(),
                            span: Some(span.into()),
                        })?;
                        let object = Place::from_local(this).deref();
                        return self.member_place(object, class, &field_name, span);
                    }
                    VarKind::Global | VarKind::Local | VarKind::Param => {
                        return Err(SemaError::UnsupportedConstruct {
                            what: format!(
                                "access to namespace-scope variable `{}`",
                                self.state.ctx.qualified_name(decl)
                            ),
                            span: span.into(),
                        });
                    }
                    VarKind::Enumerator { .. } => {}
                }
            }
        }
        Err(SemaError::NameNotFound { name: path.join("::"), span: span.into() })
    }

    /// Project a field out of an object place, stepping into the base
    /// subobject that declares it when needed.
    fn member_place(
        &mut self,
        object: Place,
        class: DeclId,
        field: &str,
        span: Span,
    ) -> SemaResult<(Place, TypeId)> {
        let found = lookup::class_member(&self.state.ctx, class, field, span)?;
        let field_decl = found
            .iter()
            .copied()
            .find(|&d| {
                matches!(
                    &self.state.ctx.decl(d).kind,
                    DeclKind::Variable(v) if matches!(v.kind, VarKind::Field { .. })
                )
            })
            .ok_or_else(|| SemaError::NameNotFound {
                name: field.to_string(),
                span: span.into(),
            })?;
        lookup::check_member_access(&self.state.ctx, field_decl, self.class, span)?;

        let (index, ty) = match &self.state.ctx.decl(field_decl).kind {
            DeclKind::Variable(v) => match v.kind {
                VarKind::Field { index } => (index, v.ty.unwrap_or(self.state.ctx.types.common.error)),
                _ => {
                    return Err(SemaError::Internal {
                        message: "field lookup returned a non-field".into(),
                        span: Some(span.into()),
                    })
                }
            },
            _ => {
                return Err(SemaError::Internal {
                    message: "field lookup returned a non-variable".into(),
                    span: Some(span.into()),
                })
            }
        };

        // The declaring class may be a base; step into its subobject.
        // Non-virtual chains have fixed offsets; a virtual base's
        // position depends on the dynamic type, so the embedded offset
        // cell is read instead of baking in this class's own layout.
        let declaring = self.state.ctx.scope(self.state.ctx.decl(field_decl).parent).owner;
        let mut place = object;
        let mut search_class = class;
        if let Some(declaring) = declaring {
            if declaring != class {
                match self.base_path(class, declaring, span)? {
                    BasePath::Identity => {}
                    BasePath::NonVirtual(offset) => {
                        place = place.downcast_base(declaring, offset);
                    }
                    path @ BasePath::Virtual { .. } => {
                        place = self.virtual_base_place(place, class, declaring, path, span)?;
                    }
                }
                search_class = declaring;
            }
        }
        let layout = self.class_layout(search_class, span)?;
        let slot = layout.field(field_decl).ok_or_else(|| SemaError::Internal {
            message: format!("no layout slot for field `{field}`"),
            span: Some(span.into()),
        })?;
        Ok((place.field(index, slot.offset), ty))
    }

    // ---- operators -------------------------------------------------------

    fn lower_unary(
        &mut self,
        op: UnaryOp,
        operand: &ast::Expr,
        span: Span,
    ) -> SemaResult<(Operand, TypeId)> {
        match op {
            UnaryOp::Deref => {
                let (ptr_op, ptr_ty) = self.lower_expr(operand)?;
                let pointee = match self.state.ctx.types.get(ptr_ty) {
                    Type::Pointer { pointee, .. } => *pointee,
                    _ => {
                        return Err(SemaError::InvalidPointerArithmetic {
                            ty: self.state.ctx.type_name(ptr_ty),
                            span: span.into(),
                        })
                    }
                };
                let tmp = self.operand_to_local(ptr_op, ptr_ty);
                Ok((Operand::Copy(Place::from_local(tmp).deref()), pointee))
            }
            UnaryOp::AddrOf => {
                let (place, ty) = self.lower_place(operand)?;
                let ptr_ty = self.state.ctx.types.pointer_to(ty);
                let tmp = self.rvalue_to_local(Rvalue::AddressOf(place), ptr_ty);
                Ok((Operand::Copy(Place::from_local(tmp)), ptr_ty))
            }
            UnaryOp::Neg => {
                let (op, ty) = self.lower_expr(operand)?;
                let tmp = self.rvalue_to_local(Rvalue::UnaryOp { op: UnOp::Neg, operand: op }, ty);
                Ok((Operand::Copy(Place::from_local(tmp)), ty))
            }
            UnaryOp::BitNot => {
                let (op, ty) = self.lower_expr(operand)?;
                let tmp = self.rvalue_to_local(Rvalue::UnaryOp { op: UnOp::Not, operand: op }, ty);
                Ok((Operand::Copy(Place::from_local(tmp)), ty))
            }
            UnaryOp::Not => {
                // `!e` lowers to `e == 0`.
                let (op, ty) = self.lower_expr(operand)?;
                let bool_ty = self.state.ctx.types.common.bool_;
                let zero = Operand::Constant(Constant::Int { value: 0, ty });
                let tmp = self.rvalue_to_local(
                    Rvalue::BinaryOp { op: BinOp::Eq, lhs: op, rhs: zero },
                    bool_ty,
                );
                Ok((Operand::Copy(Place::from_local(tmp)), bool_ty))
            }
            UnaryOp::PreInc | UnaryOp::PreDec => {
                let (place, ty) = self.lower_place(operand)?;
                self.emit_step(place.clone(), ty, op == UnaryOp::PreInc, span)?;
                Ok((Operand::Copy(place), ty))
            }
            UnaryOp::PostInc | UnaryOp::PostDec => {
                // Save the old value, step the stored one; the result
                // is the pre-step value.
                let (place, ty) = self.lower_place(operand)?;
                let old = self.rvalue_to_local(Rvalue::Use(Operand::Copy(place.clone())), ty);
                self.emit_step(place, ty, op == UnaryOp::PostInc, span)?;
                Ok((Operand::Copy(Place::from_local(old)), ty))
            }
        }
    }

    /// `place += 1` / `place -= 1`, scaled for pointers.
    fn emit_step(&mut self, place: Place, ty: TypeId, up: bool, span: Span) -> SemaResult<()> {
        if self.state.ctx.types.get(ty).is_pointer() {
            let one = Operand::Constant(Constant::Int {
                value: 1,
                ty: self.state.ctx.types.common.long,
            });
            let (stepped, _) = self.pointer_offset(Operand::Copy(place.clone()), ty, one, !up, span)?;
            self.emit(Statement::Assign { place, rvalue: Rvalue::Use(stepped) });
            return Ok(());
        }
        let op = if up { BinOp::Add } else { BinOp::Sub };
        let one = Operand::Constant(Constant::Int { value: 1, ty });
        self.emit(Statement::Assign {
            place: place.clone(),
            rvalue: Rvalue::BinaryOp { op, lhs: Operand::Copy(place), rhs: one },
        });
        Ok(())
    }

    fn lower_binary(
        &mut self,
        op: BinaryOp,
        lhs: &ast::Expr,
        rhs: &ast::Expr,
        span: Span,
    ) -> SemaResult<(Operand, TypeId)> {
        match op {
            BinaryOp::Assign => {
                let (place, lhs_ty) = self.lower_place(lhs)?;
                let (value, rhs_ty) = self.lower_expr(rhs)?;
                let value = self.coerce(value, rhs_ty, lhs_ty, span)?;
                self.emit(Statement::Assign { place: place.clone(), rvalue: Rvalue::Use(value) });
                Ok((Operand::Copy(place), lhs_ty))
            }
            BinaryOp::AddAssign
            | BinaryOp::SubAssign
            | BinaryOp::MulAssign
            | BinaryOp::DivAssign
            | BinaryOp::RemAssign => {
                let base = op.compound_base().ok_or_else(|| SemaError::Internal {
                    message: "compound assignment without base operator".into(),
                    span: Some(span.into()),
                })?;
                let (place, lhs_ty) = self.lower_place(lhs)?;
                let (value, rhs_ty) = self.lower_expr(rhs)?;
                if self.state.ctx.types.get(lhs_ty).is_pointer()
                    && matches!(base, BinaryOp::Add | BinaryOp::Sub)
                {
                    let (stepped, _) = self.pointer_offset(
                        Operand::Copy(place.clone()),
                        lhs_ty,
                        value,
                        base == BinaryOp::Sub,
                        span,
                    )?;
                    self.emit(Statement::Assign {
                        place: place.clone(),
                        rvalue: Rvalue::Use(stepped),
                    });
                    return Ok((Operand::Copy(place), lhs_ty));
                }
                let value = self.coerce(value, rhs_ty, lhs_ty, span)?;
                let mir_op = arith_op(base);
                self.emit(Statement::Assign {
                    place: place.clone(),
                    rvalue: Rvalue::BinaryOp {
                        op: mir_op,
                        lhs: Operand::Copy(place.clone()),
                        rhs: value,
                    },
                });
                Ok((Operand::Copy(place), lhs_ty))
            }
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
                self.lower_short_circuit(op == BinaryOp::LogicalAnd, lhs, rhs, span)
            }
            _ => {
                let (lhs_op, lhs_ty) = self.lower_expr(lhs)?;
                let (rhs_op, rhs_ty) = self.lower_expr(rhs)?;
                self.lower_arith_or_cmp(op, lhs_op, lhs_ty, rhs_op, rhs_ty, span)
            }
        }
    }

    fn lower_arith_or_cmp(
        &mut self,
        op: BinaryOp,
        lhs_op: Operand,
        lhs_ty: TypeId,
        rhs_op: Operand,
        rhs_ty: TypeId,
        span: Span,
    ) -> SemaResult<(Operand, TypeId)> {
        let lhs_is_ptr = self.state.ctx.types.get(lhs_ty).is_pointer();
        let rhs_is_ptr = self.state.ctx.types.get(rhs_ty).is_pointer();

        // Pointer +/- integer, integer + pointer.
        if matches!(op, BinaryOp::Add | BinaryOp::Sub) && (lhs_is_ptr ^ rhs_is_ptr) {
            let (ptr, ptr_ty, offset) = if lhs_is_ptr {
                (lhs_op, lhs_ty, rhs_op)
            } else {
                if op == BinaryOp::Sub {
                    return Err(SemaError::InvalidPointerArithmetic {
                        ty: self.state.ctx.type_name(rhs_ty),
                        span: span.into(),
                    });
                }
                (rhs_op, rhs_ty, lhs_op)
            };
            return self.pointer_offset(ptr, ptr_ty, offset, op == BinaryOp::Sub, span);
        }

        // Pointer difference.
        if op == BinaryOp::Sub && lhs_is_ptr && rhs_is_ptr {
            let long = self.state.ctx.types.common.long;
            let pointee = match self.state.ctx.types.get(lhs_ty) {
                Type::Pointer { pointee, .. } => *pointee,
                _ => self.state.ctx.types.common.error,
            };
            let stride = self.stride_of(pointee, span)?;
            let a = self.cast_to_local(lhs_op, CastKind::PtrToInt, long);
            let b = self.cast_to_local(rhs_op, CastKind::PtrToInt, long);
            let diff = self.rvalue_to_local(
                Rvalue::BinaryOp {
                    op: BinOp::Sub,
                    lhs: Operand::Copy(Place::from_local(a)),
                    rhs: Operand::Copy(Place::from_local(b)),
                },
                long,
            );
            let result = self.rvalue_to_local(
                Rvalue::BinaryOp {
                    op: BinOp::Div,
                    lhs: Operand::Copy(Place::from_local(diff)),
                    rhs: Operand::Constant(Constant::Int { value: stride as i128, ty: long }),
                },
                long,
            );
            return Ok((Operand::Copy(Place::from_local(result)), long));
        }

        // Pointer comparisons.
        if op.is_comparison() && lhs_is_ptr && rhs_is_ptr {
            let bool_ty = self.state.ctx.types.common.bool_;
            let tmp = self.rvalue_to_local(
                Rvalue::BinaryOp { op: cmp_op(op), lhs: lhs_op, rhs: rhs_op },
                bool_ty,
            );
            return Ok((Operand::Copy(Place::from_local(tmp)), bool_ty));
        }

        // Operator overloading on class operands.
        if self.state.ctx.types.get(lhs_ty).is_class() {
            return self.lower_operator_call(op, lhs_op, lhs_ty, rhs_op, rhs_ty, span);
        }

        // The usual arithmetic conversions.
        let common = common_type(&self.state.ctx, lhs_ty, rhs_ty).ok_or_else(|| {
            SemaError::InvalidConversion {
                from: self.state.ctx.type_name(rhs_ty),
                to: self.state.ctx.type_name(lhs_ty),
                span: span.into(),
            }
        })?;
        let lhs_op = self.coerce(lhs_op, lhs_ty, common, span)?;
        let rhs_op = self.coerce(rhs_op, rhs_ty, common, span)?;

        let (mir_op, result_ty) = if op.is_comparison() {
            (cmp_op(op), self.state.ctx.types.common.bool_)
        } else {
            (arith_op(op), common)
        };
        let tmp = self.rvalue_to_local(
            Rvalue::BinaryOp { op: mir_op, lhs: lhs_op, rhs: rhs_op },
            result_ty,
        );
        Ok((Operand::Copy(Place::from_local(tmp)), result_ty))
    }

    /// An overloaded operator on a class-typed left operand lowers to
    /// a method call on `operatorX`.
    fn lower_operator_call(
        &mut self,
        op: BinaryOp,
        lhs_op: Operand,
        lhs_ty: TypeId,
        rhs_op: Operand,
        rhs_ty: TypeId,
        span: Span,
    ) -> SemaResult<(Operand, TypeId)> {
        let spelled = operator_name(op).ok_or_else(|| SemaError::UnsupportedConstruct {
            what: format!("operator {op:?} on class operands"),
            span: span.into(),
        })?;
        let class = match self.state.ctx.types.get(lhs_ty) {
            Type::Class(d) => *d,
            _ => {
                return Err(SemaError::Internal {
                    message: "operator call on non-class".into(),
                    span: Some(span.into()),
                })
            }
        };
        let candidates = lookup::class_member(&self.state.ctx, class, spelled, span)?;
        if candidates.is_empty() {
            return Err(SemaError::NoMatchingFunction {
                name: spelled.to_string(),
                span: span.into(),
                rejected: Vec::new(),
            });
        }
        let target =
            overload::resolve_call(&mut self.state.ctx, spelled, &candidates, &[], &[rhs_ty], span)?;
        let lhs_place = match lhs_op {
            Operand::Copy(place) | Operand::Move(place) => place,
            Operand::Constant(_) => {
                let tmp = self.rvalue_to_local(Rvalue::Use(lhs_op), lhs_ty);
                Place::from_local(tmp)
            }
        };
        self.emit_method_invocation(lhs_place, class, target, vec![(rhs_op, rhs_ty)], false, span)
    }

    /// Short-circuit `&&`/`||` as a CFG diamond writing a boolean
    /// temporary; the right-hand side is evaluated only on the live
    /// arm.
    fn lower_short_circuit(
        &mut self,
        is_and: bool,
        lhs: &ast::Expr,
        rhs: &ast::Expr,
        span: Span,
    ) -> SemaResult<(Operand, TypeId)> {
        let bool_ty = self.state.ctx.types.common.bool_;
        let result = self.temp(bool_ty);

        let (lhs_op, lhs_ty) = self.lower_expr(lhs)?;
        let lhs_bool = self.to_bool(lhs_op, lhs_ty, span)?;

        let rhs_block = self.new_block();
        let short_block = self.new_block();
        let join = self.new_block();

        if is_and {
            self.terminate(Terminator::If {
                cond: lhs_bool,
                then_block: rhs_block,
                else_block: short_block,
            });
        } else {
            self.terminate(Terminator::If {
                cond: lhs_bool,
                then_block: short_block,
                else_block: rhs_block,
            });
        }

        // Short arm: the result is the known constant.
        self.switch_to(short_block);
        self.emit(Statement::Assign {
            place: Place::from_local(result),
            rvalue: Rvalue::Use(Operand::Constant(Constant::Bool(!is_and))),
        });
        self.terminate(Terminator::Goto { target: join });

        // Live arm: evaluate the right-hand side.
        self.switch_to(rhs_block);
        let (rhs_op, rhs_ty) = self.lower_expr(rhs)?;
        let rhs_bool = self.to_bool(rhs_op, rhs_ty, span)?;
        self.emit(Statement::Assign {
            place: Place::from_local(result),
            rvalue: Rvalue::Use(rhs_bool),
        });
        self.terminate(Terminator::Goto { target: join });

        self.switch_to(join);
        Ok((Operand::Copy(Place::from_local(result)), bool_ty))
    }

    fn lower_ternary(
        &mut self,
        cond: &ast::Expr,
        then: &ast::Expr,
        otherwise: &ast::Expr,
        span: Span,
    ) -> SemaResult<(Operand, TypeId)> {
        let (cond_op, cond_ty) = self.lower_expr(cond)?;
        let cond_bool = self.to_bool(cond_op, cond_ty, span)?;

        let then_block = self.new_block();
        let else_block = self.new_block();
        let join = self.new_block();
        self.terminate(Terminator::If { cond: cond_bool, then_block, else_block });

        // Lowering an arm may itself produce blocks; remember where
        // each arm's value lands.
        self.switch_to(then_block);
        let (then_op, then_ty) = self.lower_expr(then)?;
        let then_end = self.current;

        self.switch_to(else_block);
        let (else_op, else_ty) = self.lower_expr(otherwise)?;
        let else_end = self.current;

        // The result type unifies both arms.
        let result_ty = common_type(&self.state.ctx, then_ty, else_ty).unwrap_or(then_ty);
        let result = self.temp(result_ty);

        let else_val = self.coerce(else_op, else_ty, result_ty, span)?;
        self.emit(Statement::Assign {
            place: Place::from_local(result),
            rvalue: Rvalue::Use(else_val),
        });
        self.terminate(Terminator::Goto { target: join });

        self.switch_to(then_end);
        let then_val = self.coerce(then_op, then_ty, result_ty, span)?;
        self.emit(Statement::Assign {
            place: Place::from_local(result),
            rvalue: Rvalue::Use(then_val),
        });
        self.terminate(Terminator::Goto { target: join });

        self.switch_to(join);
        Ok((Operand::Copy(Place::from_local(result)), result_ty))
    }

    /// Truthiness test: scalars compare unequal to zero.
    pub(crate) fn to_bool(
        &mut self,
        op: Operand,
        ty: TypeId,
        span: Span,
    ) -> SemaResult<Operand> {
        let bool_ty = self.state.ctx.types.common.bool_;
        if ty == bool_ty {
            return Ok(op);
        }
        let t = self.state.ctx.types.get(ty).clone();
        if !t.is_scalar() {
            return Err(SemaError::InvalidConversion {
                from: self.state.ctx.type_name(ty),
                to: "bool".into(),
                span: span.into(),
            });
        }
        let zero = if t.is_floating() {
            Operand::Constant(Constant::Float { value: 0.0, ty })
        } else {
            Operand::Constant(Constant::Int { value: 0, ty })
        };
        let tmp = self.rvalue_to_local(
            Rvalue::BinaryOp { op: BinOp::Ne, lhs: op, rhs: zero },
            bool_ty,
        );
        Ok(Operand::Copy(Place::from_local(tmp)))
    }

    // ---- pointer arithmetic ----------------------------------------------

    /// `ptr ± k`, scaled by `sizeof(*ptr)` through explicit casts to a
    /// 64-bit offset.
    fn pointer_offset(
        &mut self,
        ptr: Operand,
        ptr_ty: TypeId,
        offset: Operand,
        negate: bool,
        span: Span,
    ) -> SemaResult<(Operand, TypeId)> {
        let pointee = match self.state.ctx.types.get(ptr_ty) {
            Type::Pointer { pointee, .. } => *pointee,
            _ => {
                return Err(SemaError::InvalidPointerArithmetic {
                    ty: self.state.ctx.type_name(ptr_ty),
                    span: span.into(),
                })
            }
        };
        let stride = self.stride_of(pointee, span)?;
        let long = self.state.ctx.types.common.long;

        let index = self.cast_to_local(offset, CastKind::IntToInt, long);
        let scaled = self.rvalue_to_local(
            Rvalue::BinaryOp {
                op: BinOp::Mul,
                lhs: Operand::Copy(Place::from_local(index)),
                rhs: Operand::Constant(Constant::Int { value: stride as i128, ty: long }),
            },
            long,
        );
        let addr = self.cast_to_local(ptr, CastKind::PtrToInt, long);
        let sum = self.rvalue_to_local(
            Rvalue::BinaryOp {
                op: if negate { BinOp::Sub } else { BinOp::Add },
                lhs: Operand::Copy(Place::from_local(addr)),
                rhs: Operand::Copy(Place::from_local(scaled)),
            },
            long,
        );
        let back = self.cast_to_local(
            Operand::Copy(Place::from_local(sum)),
            CastKind::IntToPtr,
            ptr_ty,
        );
        Ok((Operand::Copy(Place::from_local(back)), ptr_ty))
    }

    /// Element stride: size rounded up to alignment.
    fn stride_of(&mut self, ty: TypeId, span: Span) -> SemaResult<u64> {
        let size = self.size_of(ty, span)?;
        Ok(size.max(1))
    }

    // ---- conversions -----------------------------------------------------

    /// Insert the implicit conversion from `from` to `to`, if any code
    /// is needed; returns the converted operand.
    pub(crate) fn coerce(
        &mut self,
        op: Operand,
        from: TypeId,
        to: TypeId,
        span: Span,
    ) -> SemaResult<Operand> {
        if from == to {
            return Ok(op);
        }
        let from_ty = self.state.ctx.types.get(from).clone();
        let to_ty = self.state.ctx.types.get(to).clone();
        match (&from_ty, &to_ty) {
            (Type::Error, _) | (_, Type::Error) => Ok(op),

            // Reference binding: take the address of the source place,
            // materialising a temporary for rvalues.
            (_, Type::Reference { referent, quals, .. }) => {
                let place = match &op {
                    Operand::Copy(place) | Operand::Move(place)
                        if from == *referent || self.state.ctx.types.get(from).is_class() =>
                    {
                        place.clone()
                    }
                    _ => {
                        let converted = self.coerce(op, from, *referent, span)?;
                        let tmp = self.operand_to_local(converted, *referent);
                        Place::from_local(tmp)
                    }
                };
                let kind = if quals.is_const { BorrowKind::Shared } else { BorrowKind::Mutable };
                let tmp = self.rvalue_to_local(Rvalue::Ref { place, kind }, to);
                Ok(Operand::Copy(Place::from_local(tmp)))
            }

            // Array-to-pointer decay, at the use site.
            (Type::Array { element, .. }, Type::Pointer { .. }) => {
                let place = match op {
                    Operand::Copy(place) | Operand::Move(place) => place,
                    Operand::Constant(_) => {
                        return Err(SemaError::InvalidConversion {
                            from: self.state.ctx.type_name(from),
                            to: self.state.ctx.type_name(to),
                            span: span.into(),
                        })
                    }
                };
                let elem_ptr = self.state.ctx.types.pointer_to(*element);
                let tmp = self.rvalue_to_local(Rvalue::AddressOf(place), elem_ptr);
                let out = self.cast_to_local(
                    Operand::Copy(Place::from_local(tmp)),
                    CastKind::ArrayToPtr,
                    to,
                );
                Ok(Operand::Copy(Place::from_local(out)))
            }

            // Pointer conversions: derived-to-base follows the base
            // path — a fixed offset for non-virtual chains, the
            // embedded offset cell across a virtual edge.
            (Type::Pointer { pointee: fp, .. }, Type::Pointer { pointee: tp, .. }) => {
                let from_class = match self.state.ctx.types.get(*fp) {
                    Type::Class(d) => Some(*d),
                    _ => None,
                };
                let to_class = match self.state.ctx.types.get(*tp) {
                    Type::Class(d) => Some(*d),
                    _ => None,
                };
                if let (Some(derived), Some(base)) = (from_class, to_class) {
                    if derived != base {
                        let path = self.base_path(derived, base, span)?;
                        return self.upcast_pointer_operand(op, path, to, span);
                    }
                }
                let tmp = self.cast_to_local(op, CastKind::PtrToPtr, to);
                Ok(Operand::Copy(Place::from_local(tmp)))
            }

            _ if from_ty.is_arithmetic() && to_ty.is_arithmetic() => {
                let kind = match (from_ty.is_floating(), to_ty.is_floating()) {
                    (false, false) => CastKind::IntToInt,
                    (false, true) => CastKind::IntToFloat,
                    (true, false) => CastKind::FloatToInt,
                    (true, true) => CastKind::FloatToFloat,
                };
                let tmp = self.cast_to_local(op, kind, to);
                Ok(Operand::Copy(Place::from_local(tmp)))
            }

            _ => Err(SemaError::InvalidConversion {
                from: self.state.ctx.type_name(from),
                to: self.state.ctx.type_name(to),
                span: span.into(),
            }),
        }
    }

    // ---- small emission helpers ------------------------------------------

    pub(crate) fn rvalue_to_local(&mut self, rvalue: Rvalue, ty: TypeId) -> crate::ir::LocalId {
        let tmp = self.temp(ty);
        self.emit(Statement::Assign { place: Place::from_local(tmp), rvalue });
        tmp
    }

    pub(crate) fn operand_to_local(&mut self, op: Operand, ty: TypeId) -> crate::ir::LocalId {
        if let Operand::Copy(place) = &op {
            if place.is_local() {
                return place.local;
            }
        }
        self.rvalue_to_local(Rvalue::Use(op), ty)
    }

    pub(crate) fn cast_to_local(&mut self, op: Operand, kind: CastKind, ty: TypeId) -> crate::ir::LocalId {
        self.rvalue_to_local(Rvalue::Cast { kind, operand: op, ty }, ty)
    }

    /// The address of an object place, as a `Class*` value.
    pub(crate) fn object_pointer(&mut self, object: Place, class: DeclId) -> Operand {
        let class_ty = self.state.ctx.types.intern(Type::Class(class));
        let ptr_ty = self.state.ctx.types.pointer_to(class_ty);
        let tmp = self.rvalue_to_local(Rvalue::AddressOf(object), ptr_ty);
        Operand::Copy(Place::from_local(tmp))
    }

    /// Convert a pointer value along a base path. Non-virtual steps are
    /// fixed offsets; a virtual step loads the offset embedded in the
    /// object at construction time, so the result is correct whatever
    /// the dynamic type behind the pointer.
    pub(crate) fn upcast_pointer_operand(
        &mut self,
        op: Operand,
        path: BasePath,
        to_ptr_ty: TypeId,
        _span: Span,
    ) -> SemaResult<Operand> {
        let long = self.state.ctx.types.common.long;
        match path {
            BasePath::Identity => Ok(op),
            BasePath::NonVirtual(0) => {
                let tmp = self.cast_to_local(op, CastKind::PtrToPtr, to_ptr_ty);
                Ok(Operand::Copy(Place::from_local(tmp)))
            }
            BasePath::NonVirtual(offset) => {
                let addr = self.cast_to_local(op, CastKind::PtrToInt, long);
                let sum = self.rvalue_to_local(
                    Rvalue::BinaryOp {
                        op: BinOp::Add,
                        lhs: Operand::Copy(Place::from_local(addr)),
                        rhs: Operand::Constant(Constant::Int { value: offset as i128, ty: long }),
                    },
                    long,
                );
                let back = self.cast_to_local(
                    Operand::Copy(Place::from_local(sum)),
                    CastKind::IntToPtr,
                    to_ptr_ty,
                );
                Ok(Operand::Copy(Place::from_local(back)))
            }
            BasePath::Virtual { slot_offset, rest, .. } => {
                let long_ptr = self.state.ctx.types.pointer_to(long);
                let addr = self.cast_to_local(op, CastKind::PtrToInt, long);
                let cell_addr = self.rvalue_to_local(
                    Rvalue::BinaryOp {
                        op: BinOp::Add,
                        lhs: Operand::Copy(Place::from_local(addr)),
                        rhs: Operand::Constant(Constant::Int {
                            value: slot_offset as i128,
                            ty: long,
                        }),
                    },
                    long,
                );
                let cell = self.cast_to_local(
                    Operand::Copy(Place::from_local(cell_addr)),
                    CastKind::IntToPtr,
                    long_ptr,
                );
                let loaded = self.rvalue_to_local(
                    Rvalue::Use(Operand::Copy(Place::from_local(cell).deref())),
                    long,
                );
                let mut sum = self.rvalue_to_local(
                    Rvalue::BinaryOp {
                        op: BinOp::Add,
                        lhs: Operand::Copy(Place::from_local(addr)),
                        rhs: Operand::Copy(Place::from_local(loaded)),
                    },
                    long,
                );
                if rest != 0 {
                    sum = self.rvalue_to_local(
                        Rvalue::BinaryOp {
                            op: BinOp::Add,
                            lhs: Operand::Copy(Place::from_local(sum)),
                            rhs: Operand::Constant(Constant::Int { value: rest as i128, ty: long }),
                        },
                        long,
                    );
                }
                let back = self.cast_to_local(
                    Operand::Copy(Place::from_local(sum)),
                    CastKind::IntToPtr,
                    to_ptr_ty,
                );
                Ok(Operand::Copy(Place::from_local(back)))
            }
        }
    }

    /// The place of a virtual-base subobject of `object`, located
    /// through the embedded offset cell.
    fn virtual_base_place(
        &mut self,
        object: Place,
        from: DeclId,
        to: DeclId,
        path: BasePath,
        span: Span,
    ) -> SemaResult<Place> {
        let object_ptr = self.object_pointer(object, from);
        let to_ty = self.state.ctx.types.intern(Type::Class(to));
        let to_ptr_ty = self.state.ctx.types.pointer_to(to_ty);
        let converted = self.upcast_pointer_operand(object_ptr, path, to_ptr_ty, span)?;
        let tmp = self.operand_to_local(converted, to_ptr_ty);
        Ok(Place::from_local(tmp).deref())
    }

    pub(crate) fn resolve_type(&mut self, te: &ast::TypeExpr, _span: Span) -> SemaResult<TypeId> {
        self.state.ctx.try_resolve_type_expr(self.fn_scope, te)
    }
}

fn arith_op(op: BinaryOp) -> BinOp {
    match op {
        BinaryOp::Add => BinOp::Add,
        BinaryOp::Sub => BinOp::Sub,
        BinaryOp::Mul => BinOp::Mul,
        BinaryOp::Div => BinOp::Div,
        BinaryOp::Rem => BinOp::Rem,
        BinaryOp::BitAnd => BinOp::BitAnd,
        BinaryOp::BitOr => BinOp::BitOr,
        BinaryOp::BitXor => BinOp::BitXor,
        BinaryOp::Shl => BinOp::Shl,
        BinaryOp::Shr => BinOp::Shr,
        other => cmp_op(other),
    }
}

fn cmp_op(op: BinaryOp) -> BinOp {
    match op {
        BinaryOp::Eq => BinOp::Eq,
        BinaryOp::Ne => BinOp::Ne,
        BinaryOp::Lt => BinOp::Lt,
        BinaryOp::Le => BinOp::Le,
        BinaryOp::Gt => BinOp::Gt,
        BinaryOp::Ge => BinOp::Ge,
        // Callers only reach this for arithmetic/comparison operators.
        _ => BinOp::Eq,
    }
}

/// The member name an overloaded binary operator resolves to.
fn operator_name(op: BinaryOp) -> Option<&'static str> {
    Some(match op {
        BinaryOp::Add => "operator+",
        BinaryOp::Sub => "operator-",
        BinaryOp::Mul => "operator*",
        BinaryOp::Div => "operator/",
        BinaryOp::Eq => "operator==",
        BinaryOp::Ne => "operator!=",
        BinaryOp::Lt => "operator<",
        BinaryOp::Le => "operator<=",
        BinaryOp::Gt => "operator>",
        BinaryOp::Ge => "operator>=",
        _ => return None,
    })
}
