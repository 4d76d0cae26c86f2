//! Template deduction, substitution and instantiation.
//!
//! A template is immutable once declared; `instantiate_*` produces a
//! fresh decl by structural substitution and memoises it under the
//! canonical `(template, binding)` key, so identical instantiations
//! share one decl. Dependent names inside the pattern are re-resolved
//! in the instantiation scope, where every template parameter is bound.
//!
//! Deduction failures and substitution failures are returned to the
//! caller, which silences them in SFINAE contexts (overload resolution)
//! and reports them otherwise.

use rustc_hash::FxHashMap;

use ferrule_ast as ast;
use ferrule_ast::Span;

use crate::context::{Context, MAX_INSTANTIATION_DEPTH};
use crate::concepts;
use crate::convert::{implicit_conversion, Rank};
use crate::declare;
use crate::decl::{
    Access, DeclId, DeclKind, FunctionKind, InstantiationOf, Linkage, TemplatePattern,
    TemplateTypeParamDecl,
};
use crate::error::{SemaError, SemaResult};
use crate::scope::{ScopeId, ScopeKind};
use crate::types::{Type, TypeId};

/// Why deduction failed; callers in SFINAE contexts discard this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeduceFailure {
    pub reason: String,
}

impl DeduceFailure {
    fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Deduce a full binding for a function template from explicit
/// arguments plus the call's argument types.
///
/// Explicit arguments are authoritative and fill the parameter list
/// from the front; remaining parameters are unified against the call
/// arguments. Conflicting deductions fail.
pub fn deduce(
    ctx: &Context,
    param_count: usize,
    pattern_params: &[TypeId],
    explicit_args: &[TypeId],
    arg_types: &[TypeId],
) -> Result<Vec<TypeId>, DeduceFailure> {
    if explicit_args.len() > param_count {
        return Err(DeduceFailure::new("too many explicit template arguments"));
    }
    let mut binding: Vec<Option<TypeId>> = vec![None; param_count];
    let mut explicit = vec![false; param_count];
    for (i, &arg) in explicit_args.iter().enumerate() {
        binding[i] = Some(arg);
        explicit[i] = true;
    }

    for (i, &param_ty) in pattern_params.iter().enumerate() {
        if let Some(&arg_ty) = arg_types.get(i) {
            unify(ctx, param_ty, arg_ty, &mut binding, &explicit)?;
        }
    }

    let mut out = Vec::with_capacity(param_count);
    for (i, slot) in binding.into_iter().enumerate() {
        match slot {
            Some(ty) => out.push(ty),
            None => {
                return Err(DeduceFailure::new(format!(
                    "could not deduce template parameter {i}"
                )))
            }
        }
    }
    Ok(out)
}

/// Match one parameter type against one argument type, accumulating
/// deductions.
fn unify(
    ctx: &Context,
    param: TypeId,
    arg: TypeId,
    binding: &mut [Option<TypeId>],
    explicit: &[bool],
) -> Result<(), DeduceFailure> {
    let param_ty = ctx.types.get(param).clone();
    match param_ty {
        Type::TemplateParam { index, .. } => {
            let deduced = ctx.types.strip_reference(arg);
            record(ctx, index as usize, deduced, binding, explicit)
        }
        Type::Reference { referent, .. } => {
            // For T&, const T& and T&& the deduction looks through the
            // argument's reference-ness.
            let stripped = ctx.types.strip_reference(arg);
            unify(ctx, referent, stripped, binding, explicit)
        }
        Type::Pointer { pointee, .. } => match ctx.types.get(arg) {
            Type::Pointer { pointee: arg_pointee, .. } => {
                let arg_pointee = *arg_pointee;
                unify(ctx, pointee, arg_pointee, binding, explicit)
            }
            _ => Err(DeduceFailure::new("argument is not a pointer")),
        },
        Type::Array { element, .. } => match ctx.types.get(arg) {
            Type::Array { element: arg_elem, .. } => {
                let arg_elem = *arg_elem;
                unify(ctx, element, arg_elem, binding, explicit)
            }
            _ => Err(DeduceFailure::new("argument is not an array")),
        },
        _ if !ctx.types.get(param).is_dependent(&ctx.types) => {
            // Non-dependent parameter: the argument must be compatible.
            match implicit_conversion(ctx, arg, param) {
                Some(ics) if ics.rank <= Rank::Conversion => Ok(()),
                _ => Err(DeduceFailure::new(format!(
                    "cannot convert `{}` to `{}`",
                    ctx.type_name(arg),
                    ctx.type_name(param)
                ))),
            }
        }
        // Other dependent shapes are outside the corpus; be permissive.
        _ => Ok(()),
    }
}

fn record(
    ctx: &Context,
    index: usize,
    deduced: TypeId,
    binding: &mut [Option<TypeId>],
    explicit: &[bool],
) -> Result<(), DeduceFailure> {
    if index >= binding.len() {
        return Err(DeduceFailure::new("template parameter index out of range"));
    }
    // Explicit arguments win over deduction.
    if explicit[index] {
        return Ok(());
    }
    match binding[index] {
        Some(existing) if existing != deduced => Err(DeduceFailure::new(format!(
            "conflicting deductions `{}` vs `{}`",
            ctx.type_name(existing),
            ctx.type_name(deduced)
        ))),
        _ => {
            binding[index] = Some(deduced);
            Ok(())
        }
    }
}

/// Rewrite a type, replacing template parameters by their bound
/// arguments. Used for signature previews before instantiation.
pub fn substitute_type(ctx: &mut Context, ty: TypeId, binding: &[TypeId]) -> TypeId {
    let t = ctx.types.get(ty).clone();
    match t {
        Type::TemplateParam { index, .. } => binding
            .get(index as usize)
            .copied()
            .unwrap_or(ctx.types.common.error),
        Type::Pointer { pointee, quals } => {
            let inner = substitute_type(ctx, pointee, binding);
            ctx.types.intern(Type::Pointer { pointee: inner, quals })
        }
        Type::Reference { referent, kind, quals } => {
            let inner = substitute_type(ctx, referent, binding);
            ctx.types.intern(Type::Reference { referent: inner, kind, quals })
        }
        Type::Array { element, len } => {
            let inner = substitute_type(ctx, element, binding);
            ctx.types.intern(Type::Array { element: inner, len })
        }
        Type::Function { params, ret, variadic } => {
            let params: Vec<TypeId> = params
                .iter()
                .map(|p| substitute_type(ctx, *p, binding))
                .collect();
            let ret = substitute_type(ctx, ret, binding);
            ctx.types.intern(Type::Function { params, ret, variadic })
        }
        _ => ty,
    }
}

/// Evaluate a function template's `requires` clause under a binding.
/// `Ok(false)` means the constraint is unsatisfied (SFINAE removal).
pub fn check_requires(
    ctx: &Context,
    template: DeclId,
    binding: &[TypeId],
    span: Span,
) -> SemaResult<bool> {
    let DeclKind::Template(t) = &ctx.decl(template).kind else {
        return Ok(true);
    };
    let Some(clause) = &t.requires_clause else {
        return Ok(true);
    };
    let mut names = FxHashMap::default();
    for (param, &arg) in t.params.iter().zip(binding) {
        names.insert(param.name.clone(), arg);
    }
    let scope = ctx.decl(template).parent;
    let clause = clause.clone();
    concepts::evaluate(ctx, scope, clause.as_ref(), &names, span)
}

/// Instantiate a function template for a concrete binding.
///
/// The result is memoised: the same `(template, binding)` always yields
/// the same decl handle.
pub fn instantiate_function(
    ctx: &mut Context,
    template: DeclId,
    binding: Vec<TypeId>,
    span: Span,
) -> SemaResult<DeclId> {
    if let Some(&done) = ctx.instantiations.get(&(template, binding.clone())) {
        return Ok(done);
    }
    let name = ctx.decl(template).name.clone();
    if ctx.instantiation_depth >= MAX_INSTANTIATION_DEPTH {
        return Err(SemaError::RecursiveInstantiation { name, span: span.into() });
    }

    let (params, pattern) = match &ctx.decl(template).kind {
        DeclKind::Template(t) => (t.params.clone(), t.pattern.clone()),
        _ => {
            return Err(SemaError::Internal {
                message: format!("`{name}` is not a template"),
                span: Some(span.into()),
            })
        }
    };
    let TemplatePattern::Function(def) = pattern else {
        return Err(SemaError::Internal {
            message: format!("`{name}` is not a function template"),
            span: Some(span.into()),
        });
    };
    if params.len() != binding.len() {
        return Err(SemaError::DeductionFailure {
            name,
            reason: "wrong number of template arguments".into(),
            span: span.into(),
        });
    }

    log::debug!("instantiating function template `{name}` with {} argument(s)", binding.len());
    ctx.instantiation_depth += 1;
    let result = instantiate_function_inner(ctx, template, &name, &params, def, &binding, span);
    ctx.instantiation_depth -= 1;

    match result {
        Ok(decl) => {
            ctx.instantiations.insert((template, binding), decl);
            Ok(decl)
        }
        Err(err) => Err(err),
    }
}

fn instantiate_function_inner(
    ctx: &mut Context,
    template: DeclId,
    name: &str,
    params: &[crate::decl::TemplateParamInfo],
    def: std::sync::Arc<ast::FunctionDef>,
    binding: &[TypeId],
    span: Span,
) -> SemaResult<DeclId> {
    let inst_scope = make_instantiation_scope(ctx, template, params, binding, span);

    let origin = InstantiationOf { template, binding: binding.to_vec() };
    let fn_decl = declare::declare_function(
        ctx,
        def,
        inst_scope,
        FunctionKind::Free,
        Access::Public,
        Linkage::External,
        Some(origin),
    );
    declare::resolve_function_signature(ctx, fn_decl).map_err(|err| {
        SemaError::SubstitutionFailure {
            name: name.to_string(),
            reason: err.to_string(),
            span: span.into(),
        }
    })?;
    Ok(fn_decl)
}

/// Instantiate a class template for a concrete binding, declaring the
/// instantiated members as the declaration passes would.
pub fn instantiate_class(
    ctx: &mut Context,
    template: DeclId,
    binding: Vec<TypeId>,
    span: Span,
) -> SemaResult<DeclId> {
    if let Some(&done) = ctx.instantiations.get(&(template, binding.clone())) {
        return Ok(done);
    }
    let name = ctx.decl(template).name.clone();
    if ctx.instantiation_depth >= MAX_INSTANTIATION_DEPTH {
        return Err(SemaError::RecursiveInstantiation { name, span: span.into() });
    }
    let (params, pattern) = match &ctx.decl(template).kind {
        DeclKind::Template(t) => (t.params.clone(), t.pattern.clone()),
        _ => {
            return Err(SemaError::Internal {
                message: format!("`{name}` is not a template"),
                span: Some(span.into()),
            })
        }
    };
    let TemplatePattern::Class(def) = pattern else {
        return Err(SemaError::Internal {
            message: format!("`{name}` is not a class template"),
            span: Some(span.into()),
        });
    };
    if params.len() != binding.len() {
        return Err(SemaError::DeductionFailure {
            name,
            reason: "wrong number of template arguments".into(),
            span: span.into(),
        });
    }

    log::debug!("instantiating class template `{name}` with {} argument(s)", binding.len());
    ctx.instantiation_depth += 1;
    let inst_scope = make_instantiation_scope(ctx, template, &params, &binding, span);
    let origin = InstantiationOf { template, binding: binding.clone() };
    let class = declare::declare_class(ctx, def, inst_scope, Access::Public, Some(origin));
    // Memoise before resolving members so self-referential patterns
    // (a method returning the class itself) find the instantiation.
    ctx.instantiations.insert((template, binding), class);
    let result = declare::resolve_class_signatures(ctx, class);
    ctx.instantiation_depth -= 1;
    result.map_err(|err| SemaError::SubstitutionFailure {
        name: ctx.decl(class).name.clone(),
        reason: err.to_string(),
        span: span.into(),
    })?;
    Ok(class)
}

/// Build the scope every name inside an instantiation resolves against:
/// a template-parameter scope where each parameter is bound to its
/// argument.
fn make_instantiation_scope(
    ctx: &mut Context,
    template: DeclId,
    params: &[crate::decl::TemplateParamInfo],
    binding: &[TypeId],
    span: Span,
) -> ScopeId {
    let parent = ctx.decl(template).parent;
    let inst_scope = ctx.add_scope(ScopeKind::TemplateParams, parent, Some(template));
    for (index, (param, &arg)) in params.iter().zip(binding).enumerate() {
        let decl = ctx.add_decl(
            param.name.clone(),
            DeclKind::TemplateTypeParam(TemplateTypeParamDecl {
                depth: 0,
                index: index as u32,
                bound: Some(arg),
            }),
            inst_scope,
            span,
            Access::Public,
            Linkage::None,
        );
        ctx.bind(inst_scope, param.name.clone(), decl);
    }
    inst_scope
}
