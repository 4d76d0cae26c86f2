//! Statement and control-flow lowering.
//!
//! Loops lower to a header (condition test), body, continue target and
//! exit block; for a `for` loop the continue target is the increment
//! block, so `continue` re-runs the increment. `break` and `continue`
//! resolve against a stack of loop contexts, which keeps them targeting
//! the innermost enclosing loop in nested loops; a `switch` contributes
//! a break-only context.

use ferrule_ast::{self as ast, ExprKind, StmtKind};
use ferrule_sema::{SemaError, SemaResult, Type};

use crate::ir::{Place, Rvalue, Statement, Terminator};

use super::call::class_needs_ctor;
use super::context::LoopCtx;
use super::FunctionLowering;

impl<'a> FunctionLowering<'a> {
    /// Lower a function body: the outermost lexical scope plus an
    /// implicit `return` at the end for control that falls off.
    pub(crate) fn lower_body(&mut self, body: &ast::Block) -> SemaResult<()> {
        self.push_var_scope();
        for stmt in &body.stmts {
            self.lower_stmt(stmt)?;
        }
        self.pop_var_scope();
        self.terminate(Terminator::Return);
        Ok(())
    }

    pub(crate) fn lower_stmt(&mut self, stmt: &ast::Stmt) -> SemaResult<()> {
        match &stmt.kind {
            StmtKind::Compound(block) => {
                self.push_var_scope();
                for s in &block.stmts {
                    self.lower_stmt(s)?;
                }
                self.pop_var_scope();
                Ok(())
            }
            StmtKind::Expr(e) => {
                self.lower_expr(e)?;
                Ok(())
            }
            StmtKind::Decl { name, ty, init } => self.lower_local_decl(name, ty, init.as_ref(), stmt.span),
            StmtKind::If { cond, then_branch, else_branch } => {
                let (cond_op, cond_ty) = self.lower_expr(cond)?;
                let cond_bool = self.to_bool(cond_op, cond_ty, stmt.span)?;

                let then_block = self.new_block();
                let join = self.new_block();
                let else_block = if else_branch.is_some() { self.new_block() } else { join };
                self.terminate(Terminator::If { cond: cond_bool, then_block, else_block });

                self.switch_to(then_block);
                self.lower_stmt(then_branch)?;
                self.terminate(Terminator::Goto { target: join });

                if let Some(else_branch) = else_branch {
                    self.switch_to(else_block);
                    self.lower_stmt(else_branch)?;
                    self.terminate(Terminator::Goto { target: join });
                }

                self.switch_to(join);
                Ok(())
            }
            StmtKind::While { cond, body } => {
                let header = self.new_block();
                self.goto(header);
                let (cond_op, cond_ty) = self.lower_expr(cond)?;
                let cond_bool = self.to_bool(cond_op, cond_ty, stmt.span)?;

                let body_block = self.new_block();
                let exit = self.new_block();
                self.terminate(Terminator::If {
                    cond: cond_bool,
                    then_block: body_block,
                    else_block: exit,
                });

                self.loop_stack.push(LoopCtx {
                    continue_target: Some(header),
                    break_target: exit,
                });
                self.switch_to(body_block);
                self.push_var_scope();
                self.lower_stmt(body)?;
                self.pop_var_scope();
                self.terminate(Terminator::Goto { target: header });
                self.loop_stack.pop();

                self.switch_to(exit);
                Ok(())
            }
            StmtKind::DoWhile { body, cond } => {
                let body_block = self.new_block();
                let cond_block = self.new_block();
                let exit = self.new_block();
                self.goto(body_block);

                self.loop_stack.push(LoopCtx {
                    continue_target: Some(cond_block),
                    break_target: exit,
                });
                self.push_var_scope();
                self.lower_stmt(body)?;
                self.pop_var_scope();
                self.terminate(Terminator::Goto { target: cond_block });
                self.loop_stack.pop();

                self.switch_to(cond_block);
                let (cond_op, cond_ty) = self.lower_expr(cond)?;
                let cond_bool = self.to_bool(cond_op, cond_ty, stmt.span)?;
                self.terminate(Terminator::If {
                    cond: cond_bool,
                    then_block: body_block,
                    else_block: exit,
                });

                self.switch_to(exit);
                Ok(())
            }
            StmtKind::For { init, cond, incr, body } => {
                // The init variable's scope covers the whole loop.
                self.push_var_scope();
                if let Some(init) = init {
                    self.lower_stmt(init)?;
                }

                let header = self.new_block();
                self.goto(header);
                let body_block = self.new_block();
                let incr_block = self.new_block();
                let exit = self.new_block();

                match cond {
                    Some(cond) => {
                        let (cond_op, cond_ty) = self.lower_expr(cond)?;
                        let cond_bool = self.to_bool(cond_op, cond_ty, stmt.span)?;
                        self.terminate(Terminator::If {
                            cond: cond_bool,
                            then_block: body_block,
                            else_block: exit,
                        });
                    }
                    None => self.terminate(Terminator::Goto { target: body_block }),
                }

                // `continue` inside a for loop runs the increment.
                self.loop_stack.push(LoopCtx {
                    continue_target: Some(incr_block),
                    break_target: exit,
                });
                self.switch_to(body_block);
                self.push_var_scope();
                self.lower_stmt(body)?;
                self.pop_var_scope();
                self.terminate(Terminator::Goto { target: incr_block });

                self.switch_to(incr_block);
                if let Some(incr) = incr {
                    self.lower_expr(incr)?;
                }
                self.terminate(Terminator::Goto { target: header });
                self.loop_stack.pop();

                self.switch_to(exit);
                self.pop_var_scope();
                Ok(())
            }
            StmtKind::Switch { scrutinee, cases } => {
                let (discr, discr_ty) = self.lower_expr(scrutinee)?;
                if !self.state.ctx.types.get(discr_ty).is_integral() {
                    return Err(SemaError::TypeMismatch {
                        expected: "an integral scrutinee".into(),
                        found: self.state.ctx.type_name(discr_ty),
                        span: stmt.span.into(),
                    });
                }
                let exit = self.new_block();
                let case_blocks: Vec<_> = cases.iter().map(|_| self.new_block()).collect();
                let mut targets = Vec::new();
                let mut otherwise = exit;
                for (case, &block) in cases.iter().zip(&case_blocks) {
                    match case.value {
                        Some(value) => targets.push((value as i128, block)),
                        None => otherwise = block,
                    }
                }
                self.terminate(Terminator::Switch { discr, targets, otherwise });

                // Fall-through is a goto into the next case's block;
                // `break` leaves the switch.
                self.loop_stack.push(LoopCtx { continue_target: None, break_target: exit });
                for (i, case) in cases.iter().enumerate() {
                    self.switch_to(case_blocks[i]);
                    self.push_var_scope();
                    for s in &case.body {
                        self.lower_stmt(s)?;
                    }
                    self.pop_var_scope();
                    let next = case_blocks.get(i + 1).copied().unwrap_or(exit);
                    self.terminate(Terminator::Goto { target: next });
                }
                self.loop_stack.pop();

                self.switch_to(exit);
                Ok(())
            }
            StmtKind::Break => {
                let target = self.loop_stack.last().map(|l| l.break_target).ok_or_else(|| {
                    SemaError::UnsupportedConstruct {
                        what: "`break` outside a loop or switch".into(),
                        span: stmt.span.into(),
                    }
                })?;
                self.terminate(Terminator::Goto { target });
                let dead = self.new_block();
                self.switch_to(dead);
                Ok(())
            }
            StmtKind::Continue => {
                let target = self
                    .loop_stack
                    .iter()
                    .rev()
                    .find_map(|l| l.continue_target)
                    .ok_or_else(|| SemaError::UnsupportedConstruct {
                        what: "`continue` outside a loop".into(),
                        span: stmt.span.into(),
                    })?;
                self.terminate(Terminator::Goto { target });
                let dead = self.new_block();
                self.switch_to(dead);
                Ok(())
            }
            StmtKind::Return(expr) => {
                if let Some(e) = expr {
                    let (op, ty) = self.lower_expr(e)?;
                    if let Some(ret_local) = self.ret_local {
                        let ret_ty = self.local_type(ret_local);
                        let value = self.coerce(op, ty, ret_ty, stmt.span)?;
                        self.emit(Statement::Assign {
                            place: Place::from_local(ret_local),
                            rvalue: Rvalue::Use(value),
                        });
                    }
                }
                self.emit_all_drops();
                self.terminate(Terminator::Return);
                let dead = self.new_block();
                self.switch_to(dead);
                Ok(())
            }
            StmtKind::Try { .. } => Err(SemaError::UnsupportedConstruct {
                what: "exceptions (try/catch)".into(),
                span: stmt.span.into(),
            }),
        }
    }

    fn lower_local_decl(
        &mut self,
        name: &str,
        ty: &ast::TypeExpr,
        init: Option<&ast::Expr>,
        span: ferrule_ast::Span,
    ) -> SemaResult<()> {
        let ty = self.resolve_type(ty, span)?;
        let local = self.declare_named(name, ty, span);
        self.emit(Statement::StorageLive(local));
        let place = Place::from_local(local);

        match self.state.ctx.types.get(ty).clone() {
            Type::Reference { .. } => {
                let Some(init) = init else {
                    return Err(SemaError::TypeMismatch {
                        expected: "an initialiser for a reference".into(),
                        found: "none".into(),
                        span: span.into(),
                    });
                };
                let (op, from) = self.lower_expr(init)?;
                let bound = self.coerce(op, from, ty, span)?;
                self.emit(Statement::Assign { place, rvalue: Rvalue::Use(bound) });
            }
            Type::Class(class) => {
                let has_dtor = matches!(
                    &self.state.ctx.decl(class).kind,
                    ferrule_sema::decl::DeclKind::Class(c) if c.dtor.is_some()
                );
                if has_dtor {
                    self.track_destructible(local, class);
                }
                match init {
                    Some(ast::Expr { kind: ExprKind::Construct { args, .. }, .. }) => {
                        let mut lowered = Vec::with_capacity(args.len());
                        for arg in args {
                            lowered.push(self.lower_expr(arg)?);
                        }
                        self.emit_construct_into(place, class, lowered, span)?;
                    }
                    Some(other) => {
                        // Copy initialisation from another object.
                        let (op, from) = self.lower_expr(other)?;
                        let value = self.coerce(op, from, ty, span)?;
                        self.emit(Statement::Assign { place, rvalue: Rvalue::Use(value) });
                    }
                    None => {
                        if class_needs_ctor(self, class)
                            || !matches!(
                                &self.state.ctx.decl(class).kind,
                                ferrule_sema::decl::DeclKind::Class(c) if c.ctors.is_empty()
                            )
                        {
                            self.emit_construct_into(place, class, Vec::new(), span)?;
                        }
                    }
                }
            }
            Type::Array { .. } => {
                // Storage only; the corpus writes elements explicitly.
            }
            _ => {
                if let Some(init) = init {
                    let (op, from) = self.lower_expr(init)?;
                    let value = self.coerce(op, from, ty, span)?;
                    self.emit(Statement::Assign { place, rvalue: Rvalue::Use(value) });
                }
            }
        }
        Ok(())
    }
}
