//! Concept evaluation.
//!
//! A concept is a named boolean predicate over type parameters. Its
//! body is built from builtin type traits, references to other
//! concepts, and `&&`/`||`/`!`. Evaluation substitutes the bound
//! arguments and reduces to a constant; `requires` clauses on function
//! templates reuse the same evaluator.

use rustc_hash::FxHashMap;

use ferrule_ast as ast;
use ferrule_ast::Span;

use crate::context::Context;
use crate::decl::DeclKind;
use crate::error::{SemaError, SemaResult};
use crate::lookup;
use crate::scope::ScopeId;
use crate::types::{Type, TypeId};

/// Guards against mutually recursive concept definitions.
const MAX_CONCEPT_DEPTH: u32 = 16;

/// Evaluate a constraint with `binding` mapping template parameter
/// names to concrete types. Concept references resolve from `scope`.
pub fn evaluate(
    ctx: &Context,
    scope: ScopeId,
    expr: &ast::ConstraintExpr,
    binding: &FxHashMap<String, TypeId>,
    span: Span,
) -> SemaResult<bool> {
    evaluate_at(ctx, scope, expr, binding, span, 0)
}

fn evaluate_at(
    ctx: &Context,
    scope: ScopeId,
    expr: &ast::ConstraintExpr,
    binding: &FxHashMap<String, TypeId>,
    span: Span,
    depth: u32,
) -> SemaResult<bool> {
    if depth > MAX_CONCEPT_DEPTH {
        return Err(SemaError::RecursiveInstantiation {
            name: "<concept>".into(),
            span: span.into(),
        });
    }
    match expr {
        ast::ConstraintExpr::Bool(b) => Ok(*b),
        ast::ConstraintExpr::Not(inner) => {
            Ok(!evaluate_at(ctx, scope, inner, binding, span, depth + 1)?)
        }
        ast::ConstraintExpr::And(a, b) => Ok(evaluate_at(ctx, scope, a, binding, span, depth + 1)?
            && evaluate_at(ctx, scope, b, binding, span, depth + 1)?),
        ast::ConstraintExpr::Or(a, b) => Ok(evaluate_at(ctx, scope, a, binding, span, depth + 1)?
            || evaluate_at(ctx, scope, b, binding, span, depth + 1)?),
        ast::ConstraintExpr::Trait { func, arg } => {
            let ty = resolve_constraint_arg(ctx, arg, binding, span)?;
            Ok(evaluate_trait(ctx, *func, ty))
        }
        ast::ConstraintExpr::ConceptRef { name, args } => {
            let found = lookup::unqualified(ctx, scope, name, span)?;
            let def = found.into_iter().find_map(|d| match &ctx.decl(d).kind {
                DeclKind::Concept(def) => Some(def),
                _ => None,
            });
            let Some(def) = def else {
                return Err(SemaError::NameNotFound {
                    name: name.clone(),
                    span: span.into(),
                });
            };
            if def.params.len() != args.len() {
                return Err(SemaError::ConstraintNotSatisfied {
                    constraint: format!("{name} (expects {} arguments)", def.params.len()),
                    span: span.into(),
                });
            }
            let mut inner_binding = FxHashMap::default();
            for (param, arg) in def.params.iter().zip(args) {
                let ty = resolve_constraint_arg(ctx, arg, binding, span)?;
                inner_binding.insert(param.clone(), ty);
            }
            let body = def.body.clone();
            evaluate_at(ctx, scope, body.as_ref(), &inner_binding, span, depth + 1)
        }
    }
}

/// Resolve a type argument inside a constraint: either a bound template
/// parameter name or a builtin type.
fn resolve_constraint_arg(
    ctx: &Context,
    arg: &ast::TypeExpr,
    binding: &FxHashMap<String, TypeId>,
    span: Span,
) -> SemaResult<TypeId> {
    match &arg.kind {
        ast::TypeExprKind::Builtin(b) => Ok(ctx.builtin_type(*b)),
        ast::TypeExprKind::Named { path, template_args } if template_args.is_empty() => {
            if let [name] = path.as_slice() {
                if let Some(&ty) = binding.get(name) {
                    return Ok(ty);
                }
            }
            Err(SemaError::ConstraintNotSatisfied {
                constraint: format!("unbound type `{}` in constraint", path.join("::")),
                span: span.into(),
            })
        }
        _ => Err(SemaError::ConstraintNotSatisfied {
            constraint: "unsupported type form in constraint".into(),
            span: span.into(),
        }),
    }
}

/// The builtin trait predicates, mirroring `<type_traits>`.
fn evaluate_trait(ctx: &Context, func: ast::TraitFn, ty: TypeId) -> bool {
    let t = ctx.types.get(ty);
    match func {
        // is_integral excludes enums, unlike Type::is_integral.
        ast::TraitFn::IsIntegral => matches!(t, Type::Bool | Type::Int { .. }),
        ast::TraitFn::IsSigned => t.is_signed(),
        ast::TraitFn::IsFloatingPoint => t.is_floating(),
        ast::TraitFn::IsPointer => t.is_pointer(),
        ast::TraitFn::IsClass => t.is_class(),
    }
}
