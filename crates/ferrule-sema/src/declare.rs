//! Declaration collection.
//!
//! Pass 1 walks the translation unit and populates the decl arena and
//! scope tree: namespaces (including reopened and anonymous ones),
//! classes and their members, functions, templates, concepts, aliases
//! and `using` declarations/directives. Pass 2 resolves every spelled
//! type against the finished scope tree, so forward references between
//! classes work without special cases.
//!
//! Template instantiation reuses the same helpers against an
//! instantiation scope, which is why the member declaration and
//! signature resolution steps are free functions.

use std::sync::Arc;

use ferrule_ast as ast;
use ferrule_ast::Span;

use crate::context::Context;
use crate::decl::{
    Access, BaseSpecifier, ClassDecl, ConceptDecl, DeclId, DeclKind, EnumDecl, FunctionDecl,
    FunctionKind, FunctionSig, InstantiationOf, Linkage, NamespaceDecl, ParamInfo,
    TemplateDecl, TemplateParamInfo, TemplatePattern, TemplateTypeParamDecl, TypeAliasDecl,
    VarKind, VariableDecl,
};
use crate::error::{SemaError, SemaResult};
use crate::lookup;
use crate::scope::{ScopeId, ScopeKind};
use crate::types::{Type, TypeId};

/// Run both declaration passes over a translation unit.
pub fn declare_translation_unit(ctx: &mut Context, tu: &ast::TranslationUnit) {
    let global = ctx.global_scope;
    declare_items(ctx, &tu.items, global, Linkage::External);
    resolve_signatures(ctx);
}

// ---------------------------------------------------------------------------
// Pass 1: collect declarations.
// ---------------------------------------------------------------------------

fn declare_items(ctx: &mut Context, items: &[ast::Item], scope: ScopeId, linkage: Linkage) {
    for item in items {
        declare_item(ctx, item, scope, linkage);
    }
}

fn declare_item(ctx: &mut Context, item: &ast::Item, scope: ScopeId, linkage: Linkage) {
    match &item.kind {
        ast::ItemKind::Namespace(ns) => declare_namespace(ctx, ns, item.span, scope, linkage),
        ast::ItemKind::Class(def) => {
            let class = declare_class(ctx, Arc::new(def.clone()), scope, Access::Public, None);
            let name = ctx.decl(class).name.clone();
            ctx.bind(scope, name, class);
        }
        ast::ItemKind::Enum(def) => declare_enum(ctx, def, item.span, scope),
        ast::ItemKind::Function(def) => {
            declare_or_merge_function(ctx, def, item.span, scope, linkage);
        }
        ast::ItemKind::Variable(def) => {
            let decl = ctx.add_decl(
                def.name.name.clone(),
                DeclKind::Variable(VariableDecl {
                    kind: VarKind::Global,
                    ty: None,
                    ast_ty: Some(Arc::new(def.ty.clone())),
                }),
                scope,
                item.span,
                Access::Public,
                linkage,
            );
            ctx.bind(scope, def.name.name.clone(), decl);
        }
        ast::ItemKind::Template(def) => declare_template(ctx, def, item.span, scope),
        ast::ItemKind::Concept(def) => {
            let decl = ctx.add_decl(
                def.name.name.clone(),
                DeclKind::Concept(ConceptDecl {
                    params: def.params.clone(),
                    body: Arc::new(def.body.clone()),
                }),
                scope,
                item.span,
                Access::Public,
                Linkage::None,
            );
            ctx.bind(scope, def.name.name.clone(), decl);
        }
        ast::ItemKind::TypeAlias(def) => {
            let decl = ctx.add_decl(
                def.name.name.clone(),
                DeclKind::TypeAlias(TypeAliasDecl {
                    target: None,
                    ast_target: Arc::new(def.target.clone()),
                }),
                scope,
                item.span,
                Access::Public,
                Linkage::None,
            );
            ctx.bind(scope, def.name.name.clone(), decl);
        }
        ast::ItemKind::UsingDecl(u) => declare_using_decl(ctx, u, scope),
        ast::ItemKind::UsingDirective(u) => declare_using_directive(ctx, u, scope),
    }
}

/// Declare (or reopen) a namespace and recurse into its items.
fn declare_namespace(
    ctx: &mut Context,
    ns: &ast::NamespaceDef,
    span: Span,
    scope: ScopeId,
    linkage: Linkage,
) {
    // Anonymous namespaces get internal linkage and are transparently
    // visible from the enclosing scope via an implicit directive.
    let is_anonymous = ns.name.is_empty();

    // Reopening: `namespace foo` twice extends the same scope.
    let existing = ctx
        .scope(scope)
        .get(&ns.name)
        .iter()
        .copied()
        .find(|d| matches!(ctx.decl(*d).kind, DeclKind::Namespace(_)));

    let ns_scope = match existing {
        Some(decl) => match &ctx.decl(decl).kind {
            DeclKind::Namespace(n) => n.scope,
            _ => return,
        },
        None => {
            let ns_scope = ctx.add_scope(ScopeKind::Namespace, scope, None);
            let decl = ctx.add_decl(
                ns.name.clone(),
                DeclKind::Namespace(NamespaceDecl { scope: ns_scope }),
                scope,
                span,
                Access::Public,
                Linkage::None,
            );
            ctx.scope_mut(ns_scope).owner = Some(decl);
            if is_anonymous {
                ctx.scope_mut(scope).add_using_directive(ns_scope);
            } else {
                ctx.bind(scope, ns.name.clone(), decl);
            }
            ns_scope
        }
    };

    let member_linkage = if is_anonymous { Linkage::Internal } else { linkage };
    declare_items(ctx, &ns.items, ns_scope, member_linkage);
}

fn declare_enum(ctx: &mut Context, def: &ast::EnumDef, span: Span, scope: ScopeId) {
    let underlying = ctx.types.common.int;
    let enum_decl = ctx.add_decl(
        def.name.name.clone(),
        DeclKind::Enum(EnumDecl {
            underlying,
            is_scoped: def.is_scoped,
            enumerators: Vec::new(),
        }),
        scope,
        span,
        Access::Public,
        Linkage::None,
    );
    ctx.bind(scope, def.name.name.clone(), enum_decl);

    let enum_ty = ctx.types.intern(Type::Enum(enum_decl));
    let mut enumerators = Vec::with_capacity(def.enumerators.len());
    for (ident, value) in &def.enumerators {
        let e = ctx.add_decl(
            ident.name.clone(),
            DeclKind::Variable(VariableDecl {
                kind: VarKind::Enumerator { value: *value },
                ty: Some(enum_ty),
                ast_ty: None,
            }),
            scope,
            ident.span,
            Access::Public,
            Linkage::None,
        );
        // Unscoped enumerations are transparent: enumerators land in
        // the enclosing scope.
        if !def.is_scoped {
            ctx.bind(scope, ident.name.clone(), e);
        }
        enumerators.push(e);
    }
    if let DeclKind::Enum(e) = &mut ctx.decl_mut(enum_decl).kind {
        e.enumerators = enumerators;
    }
}

/// Declare a function, or merge a definition into a matching earlier
/// declaration (`int f();` followed by `int f() { ... }`).
fn declare_or_merge_function(
    ctx: &mut Context,
    def: &ast::FunctionDef,
    span: Span,
    scope: ScopeId,
    linkage: Linkage,
) -> DeclId {
    let existing: Vec<DeclId> = ctx.scope(scope).get(&def.name.name).to_vec();
    for candidate in existing {
        let matches_sig = match &ctx.decl(candidate).kind {
            DeclKind::Function(f) => {
                f.kind == FunctionKind::Free && same_param_type_syntax(&f.def.params, &def.params)
            }
            _ => false,
        };
        if matches_sig {
            if def.body.is_some() {
                let arc = Arc::new(def.clone());
                if let Err(err) = ctx.attach_body(candidate, arc) {
                    ctx.report_and_poison(candidate, err);
                }
            }
            return candidate;
        }
    }
    let decl = declare_function(
        ctx,
        Arc::new(def.clone()),
        scope,
        FunctionKind::Free,
        Access::Public,
        linkage,
        None,
    );
    ctx.bind(scope, def.name.name.clone(), decl);
    decl
}

fn same_param_type_syntax(a: &[ast::Param], b: &[ast::Param]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same_type_syntax(&x.ty, &y.ty))
}

/// Structural equality of spelled types, ignoring source spans, so a
/// definition merges with its earlier declaration.
fn same_type_syntax(a: &ast::TypeExpr, b: &ast::TypeExpr) -> bool {
    use ast::TypeExprKind as K;
    match (&a.kind, &b.kind) {
        (K::Builtin(x), K::Builtin(y)) => x == y,
        (
            K::Named { path: pa, template_args: ta },
            K::Named { path: pb, template_args: tb },
        ) => {
            pa == pb
                && ta.len() == tb.len()
                && ta.iter().zip(tb).all(|(x, y)| same_type_syntax(x, y))
        }
        (
            K::Pointer { pointee: xa, is_const: ca },
            K::Pointer { pointee: xb, is_const: cb },
        ) => ca == cb && same_type_syntax(xa, xb),
        (
            K::Reference { referent: xa, is_const: ca, is_rvalue: ra },
            K::Reference { referent: xb, is_const: cb, is_rvalue: rb },
        ) => ca == cb && ra == rb && same_type_syntax(xa, xb),
        (K::Array { element: xa, size: sa }, K::Array { element: xb, size: sb }) => {
            sa == sb && same_type_syntax(xa, xb)
        }
        (
            K::Function { params: pa, ret: ra, variadic: va },
            K::Function { params: pb, ret: rb, variadic: vb },
        ) => {
            va == vb
                && pa.len() == pb.len()
                && pa.iter().zip(pb).all(|(x, y)| same_type_syntax(x, y))
                && same_type_syntax(ra, rb)
        }
        _ => false,
    }
}

/// Create a function decl with its parameter scope. The caller binds
/// the name (or records the decl in a class's member lists).
pub fn declare_function(
    ctx: &mut Context,
    def: Arc<ast::FunctionDef>,
    parent_scope: ScopeId,
    kind: FunctionKind,
    access: Access,
    linkage: Linkage,
    origin: Option<InstantiationOf>,
) -> DeclId {
    let fn_scope = ctx.add_scope(ScopeKind::Function, parent_scope, None);
    let is_defined = def.body.is_some();
    let name = def.name.name.clone();
    let span = def.name.span;
    let decl = ctx.add_decl(
        name,
        DeclKind::Function(FunctionDecl {
            kind,
            def,
            sig: None,
            params: Vec::new(),
            scope: fn_scope,
            origin,
            is_defined,
        }),
        parent_scope,
        span,
        access,
        linkage,
    );
    ctx.scope_mut(fn_scope).owner = Some(decl);
    decl
}

/// Create a class decl and declare its members. Signatures stay
/// unresolved until [`resolve_class_signatures`].
pub fn declare_class(
    ctx: &mut Context,
    def: Arc<ast::ClassDef>,
    parent_scope: ScopeId,
    access: Access,
    origin: Option<InstantiationOf>,
) -> DeclId {
    let class_scope = ctx.add_scope(ScopeKind::Class, parent_scope, None);
    let class = ctx.add_decl(
        def.name.name.clone(),
        DeclKind::Class(ClassDecl {
            scope: class_scope,
            is_class: def.is_class,
            bases: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            ctors: Vec::new(),
            dtor: None,
            is_polymorphic: false,
            is_complete: true,
            sigs_resolved: false,
            def: Some(def.clone()),
            origin,
        }),
        parent_scope,
        def.name.span,
        access,
        Linkage::External,
    );
    ctx.scope_mut(class_scope).owner = Some(class);

    let mut fields = Vec::new();
    let mut methods = Vec::new();
    let mut ctors = Vec::new();
    let mut dtor = None;
    let mut polymorphic = false;

    let mut field_index = 0usize;
    for member in &def.members {
        match member {
            ast::Member::Field { name, ty, access, is_static } => {
                let kind = if *is_static {
                    VarKind::Global
                } else {
                    VarKind::Field { index: field_index }
                };
                let decl = ctx.add_decl(
                    name.name.clone(),
                    DeclKind::Variable(VariableDecl {
                        kind,
                        ty: None,
                        ast_ty: Some(Arc::new(ty.clone())),
                    }),
                    class_scope,
                    name.span,
                    (*access).into(),
                    Linkage::None,
                );
                ctx.bind(class_scope, name.name.clone(), decl);
                if !*is_static {
                    fields.push(decl);
                    field_index += 1;
                }
            }
            ast::Member::Method { def: m, access, quals } => {
                let kind = match m.special {
                    ast::SpecialKind::Constructor => FunctionKind::Constructor { class },
                    ast::SpecialKind::Destructor => FunctionKind::Destructor {
                        class,
                        is_virtual: quals.is_virtual,
                    },
                    ast::SpecialKind::None => FunctionKind::Method {
                        class,
                        is_virtual: quals.is_virtual,
                        is_pure: quals.is_pure_virtual,
                        is_static: quals.is_static,
                    },
                };
                if quals.is_virtual {
                    polymorphic = true;
                }
                let decl = declare_function(
                    ctx,
                    Arc::new(m.clone()),
                    class_scope,
                    kind,
                    (*access).into(),
                    Linkage::External,
                    None,
                );
                match m.special {
                    ast::SpecialKind::Constructor => ctors.push(decl),
                    ast::SpecialKind::Destructor => dtor = Some(decl),
                    ast::SpecialKind::None => {
                        ctx.bind(class_scope, m.name.name.clone(), decl);
                        methods.push(decl);
                    }
                }
            }
            ast::Member::Class { def: nested, access } => {
                let nested_decl =
                    declare_class(ctx, Arc::new(nested.clone()), class_scope, (*access).into(), None);
                let name = ctx.decl(nested_decl).name.clone();
                ctx.bind(class_scope, name, nested_decl);
            }
        }
    }

    if let DeclKind::Class(c) = &mut ctx.decl_mut(class).kind {
        c.fields = fields;
        c.methods = methods;
        c.ctors = ctors;
        c.dtor = dtor;
        c.is_polymorphic = polymorphic;
    }
    class
}

fn declare_template(ctx: &mut Context, def: &ast::TemplateDef, span: Span, scope: ScopeId) {
    let template_scope = ctx.add_scope(ScopeKind::TemplateParams, scope, None);
    let mut params = Vec::new();
    let mut param_decls = Vec::new();
    for (index, p) in def.params.iter().enumerate() {
        let is_type = matches!(p, ast::TemplateParam::Type { .. });
        params.push(TemplateParamInfo { name: p.name().to_string(), is_type });
        if is_type {
            let decl = ctx.add_decl(
                p.name().to_string(),
                DeclKind::TemplateTypeParam(TemplateTypeParamDecl {
                    depth: 0,
                    index: index as u32,
                    bound: None,
                }),
                template_scope,
                span,
                Access::Public,
                Linkage::None,
            );
            ctx.bind(template_scope, p.name().to_string(), decl);
            param_decls.push(decl);
        }
    }

    let (name, pattern, requires_clause) = match &def.entity.kind {
        ast::ItemKind::Function(f) => (
            f.name.name.clone(),
            TemplatePattern::Function(Arc::new(f.clone())),
            f.requires_clause.clone().map(Arc::new),
        ),
        ast::ItemKind::Class(c) => (
            c.name.name.clone(),
            TemplatePattern::Class(Arc::new(c.clone())),
            None,
        ),
        _ => {
            ctx.report(SemaError::UnsupportedConstruct {
                what: "template of this entity kind".into(),
                span: span.into(),
            });
            return;
        }
    };

    let decl = ctx.add_decl(
        name.clone(),
        DeclKind::Template(TemplateDecl {
            params,
            pattern,
            scope: template_scope,
            param_decls,
            pattern_sig: None,
            requires_clause,
        }),
        scope,
        span,
        Access::Public,
        Linkage::None,
    );
    ctx.scope_mut(template_scope).owner = Some(decl);
    ctx.bind(scope, name, decl);
}

fn declare_using_decl(ctx: &mut Context, u: &ast::UsingDecl, scope: ScopeId) {
    match lookup::lookup_path(ctx, scope, &u.path, u.span) {
        Ok(found) => {
            let Some(last) = u.path.last() else { return };
            for decl in found {
                ctx.bind(scope, last.clone(), decl);
            }
        }
        Err(err) => ctx.report(err),
    }
}

fn declare_using_directive(ctx: &mut Context, u: &ast::UsingDirective, scope: ScopeId) {
    match lookup::lookup_path(ctx, scope, &u.path, u.span) {
        Ok(found) => {
            let target = found.iter().copied().find_map(|d| match &ctx.decl(d).kind {
                DeclKind::Namespace(ns) => Some(ns.scope),
                _ => None,
            });
            match target {
                Some(target) => ctx.scope_mut(scope).add_using_directive(target),
                None => ctx.report(SemaError::NameNotFound {
                    name: u.path.join("::"),
                    span: u.span.into(),
                }),
            }
        }
        Err(err) => ctx.report(err),
    }
}

// ---------------------------------------------------------------------------
// Pass 2: resolve signatures.
// ---------------------------------------------------------------------------

/// Resolve every declared signature against the completed scope tree.
/// Decls created later (template instantiations) resolve on creation.
pub fn resolve_signatures(ctx: &mut Context) {
    enum Pending {
        Class,
        Function,
        Variable(Arc<ast::TypeExpr>),
        TemplateFn,
    }

    let declared = ctx.decls.len();
    for index in 0..declared {
        let id = DeclId(index as u32);
        let pending = match &ctx.decl(id).kind {
            DeclKind::Class(c) => {
                if c.origin.is_none() && in_template_scope(ctx, id) {
                    // Members of class templates resolve at instantiation.
                    continue;
                }
                Some(Pending::Class)
            }
            DeclKind::Function(f)
                if f.sig.is_none() && f.kind == FunctionKind::Free && f.origin.is_none() =>
            {
                if in_template_scope(ctx, id) {
                    continue;
                }
                Some(Pending::Function)
            }
            DeclKind::Variable(v) if matches!(v.kind, VarKind::Global) && v.ty.is_none() => {
                v.ast_ty.clone().map(Pending::Variable)
            }
            DeclKind::Template(t)
                if matches!(t.pattern, TemplatePattern::Function(_))
                    && t.pattern_sig.is_none() =>
            {
                Some(Pending::TemplateFn)
            }
            _ => None,
        };
        match pending {
            Some(Pending::Class) => {
                if let Err(err) = resolve_class_signatures(ctx, id) {
                    ctx.report_and_poison(id, err);
                }
            }
            Some(Pending::Function) => {
                if let Err(err) = resolve_function_signature(ctx, id) {
                    ctx.report_and_poison(id, err);
                }
            }
            Some(Pending::Variable(ast_ty)) => {
                let scope = ctx.decl(id).parent;
                let ty = ctx.resolve_type_expr(scope, &ast_ty);
                if let DeclKind::Variable(v) = &mut ctx.decl_mut(id).kind {
                    v.ty = Some(ty);
                }
            }
            Some(Pending::TemplateFn) => {
                if let Err(err) = resolve_template_pattern_sig(ctx, id) {
                    ctx.report_and_poison(id, err);
                }
            }
            None => {}
        }
    }
}

/// True when a decl sits under an (uninstantiated) template-parameter
/// scope; its types stay dependent until instantiation.
fn in_template_scope(ctx: &Context, decl: DeclId) -> bool {
    let mut scope = Some(ctx.decl(decl).parent);
    while let Some(id) = scope {
        let s = ctx.scope(id);
        if s.kind == ScopeKind::TemplateParams {
            return true;
        }
        scope = s.parent;
    }
    false
}

/// Resolve one function's signature: parameter types, return type, and
/// the parameter variable decls in the function scope.
pub fn resolve_function_signature(ctx: &mut Context, decl: DeclId) -> SemaResult<()> {
    let (def, fn_scope, already) = match &ctx.decl(decl).kind {
        DeclKind::Function(f) => (f.def.clone(), f.scope, f.sig.is_some()),
        _ => {
            return Err(SemaError::Internal {
                message: "resolve_function_signature on non-function".into(),
                span: None,
            })
        }
    };
    if already {
        return Ok(());
    }

    let mut param_types = Vec::with_capacity(def.params.len());
    let mut params = Vec::with_capacity(def.params.len());
    for p in &def.params {
        let ty = ctx.try_resolve_type_expr(fn_scope, &p.ty)?;
        param_types.push(ty);
        params.push(ParamInfo {
            name: p.name.clone(),
            ty,
            span: p.span,
        });
        let var = ctx.add_decl(
            p.name.clone(),
            DeclKind::Variable(VariableDecl {
                kind: VarKind::Param,
                ty: Some(ty),
                ast_ty: Some(Arc::new(p.ty.clone())),
            }),
            fn_scope,
            p.span,
            Access::Public,
            Linkage::None,
        );
        if !p.name.is_empty() {
            ctx.bind(fn_scope, p.name.clone(), var);
        }
    }
    let fn_kind = match &ctx.decl(decl).kind {
        DeclKind::Function(f) => Some(f.kind),
        _ => None,
    };
    let ret = match fn_kind {
        Some(FunctionKind::Constructor { .. }) | Some(FunctionKind::Destructor { .. }) | None => {
            ctx.types.common.void
        }
        Some(_) => ctx.try_resolve_type_expr(fn_scope, &def.ret)?,
    };

    let variadic = def.variadic;
    if let DeclKind::Function(f) = &mut ctx.decl_mut(decl).kind {
        f.sig = Some(FunctionSig { params: param_types, ret, variadic });
        f.params = params;
    }
    Ok(())
}

/// Resolve a class's bases, field types and member signatures, then
/// propagate polymorphism and implicit virtual overrides.
pub fn resolve_class_signatures(ctx: &mut Context, class: DeclId) -> SemaResult<()> {
    let (def, class_scope, already) = match &ctx.decl(class).kind {
        DeclKind::Class(c) => {
            let Some(def) = c.def.clone() else {
                return Ok(());
            };
            (def, c.scope, c.sigs_resolved)
        }
        _ => {
            return Err(SemaError::Internal {
                message: "resolve_class_signatures on non-class".into(),
                span: None,
            })
        }
    };
    if already {
        return Ok(());
    }
    if let DeclKind::Class(c) = &mut ctx.decl_mut(class).kind {
        c.sigs_resolved = true;
    }

    // Bases resolve in the scope enclosing the class.
    let outer_scope = ctx.decl(class).parent;
    let mut bases = Vec::with_capacity(def.bases.len());
    let mut polymorphic_base = false;
    for b in &def.bases {
        let ty = ctx.try_resolve_type_expr(outer_scope, &b.ty)?;
        let Type::Class(base_decl) = ctx.types.get(ty) else {
            return Err(SemaError::TypeMismatch {
                expected: "a class type".into(),
                found: ctx.type_name(ty),
                span: b.ty.span.into(),
            });
        };
        let base_decl = *base_decl;
        if base_decl == class || lookup::derives_from(ctx, base_decl, class) {
            return Err(SemaError::CircularBase {
                name: ctx.qualified_name(class),
                span: b.ty.span.into(),
            });
        }
        if let DeclKind::Class(bc) = &ctx.decl(base_decl).kind {
            if bc.is_polymorphic {
                polymorphic_base = true;
            }
        }
        bases.push(BaseSpecifier {
            class: base_decl,
            access: b.access.into(),
            is_virtual: b.is_virtual,
        });
    }

    let (fields, methods, ctors, dtor) = match &ctx.decl(class).kind {
        DeclKind::Class(c) => (c.fields.clone(), c.methods.clone(), c.ctors.clone(), c.dtor),
        _ => (Vec::new(), Vec::new(), Vec::new(), None),
    };

    if let DeclKind::Class(c) = &mut ctx.decl_mut(class).kind {
        c.bases = bases;
        if polymorphic_base {
            c.is_polymorphic = true;
        }
    }

    // Field types resolve in the class scope.
    for field in &fields {
        let ast_ty = match &ctx.decl(*field).kind {
            DeclKind::Variable(v) => v.ast_ty.clone(),
            _ => None,
        };
        if let Some(ast_ty) = ast_ty {
            let ty = ctx.try_resolve_type_expr(class_scope, &ast_ty)?;
            if let DeclKind::Variable(v) = &mut ctx.decl_mut(*field).kind {
                v.ty = Some(ty);
            }
        }
    }

    for method in methods.iter().chain(ctors.iter()).chain(dtor.iter()) {
        resolve_function_signature(ctx, *method)?;
    }

    mark_implicit_virtual(ctx, class, &methods);
    Ok(())
}

/// A method that matches a virtual method in a base class is virtual
/// even without the keyword.
fn mark_implicit_virtual(ctx: &mut Context, class: DeclId, methods: &[DeclId]) {
    for &method in methods {
        let (name, sig, kind) = match &ctx.decl(method).kind {
            DeclKind::Function(f) => (ctx.decl(method).name.clone(), f.sig.clone(), f.kind),
            _ => continue,
        };
        let FunctionKind::Method { class: owner, is_virtual, is_pure, is_static } = kind else {
            continue;
        };
        if is_virtual || is_static {
            continue;
        }
        let Some(sig) = sig else { continue };
        if find_virtual_in_bases(ctx, class, &name, &sig.params) {
            if let DeclKind::Function(f) = &mut ctx.decl_mut(method).kind {
                f.kind = FunctionKind::Method {
                    class: owner,
                    is_virtual: true,
                    is_pure,
                    is_static,
                };
            }
            if let DeclKind::Class(c) = &mut ctx.decl_mut(class).kind {
                c.is_polymorphic = true;
            }
        }
    }
}

/// Whether some base of `class` declares a virtual method with the
/// given name and parameter types.
pub fn find_virtual_in_bases(
    ctx: &Context,
    class: DeclId,
    name: &str,
    params: &[TypeId],
) -> bool {
    let DeclKind::Class(c) = &ctx.decl(class).kind else {
        return false;
    };
    for base in &c.bases {
        let DeclKind::Class(bc) = &ctx.decl(base.class).kind else {
            continue;
        };
        for &m in &bc.methods {
            let DeclKind::Function(f) = &ctx.decl(m).kind else {
                continue;
            };
            if ctx.decl(m).name == name
                && f.kind.is_virtual()
                && f.sig.as_ref().map(|s| s.params.as_slice()) == Some(params)
            {
                return true;
            }
        }
        if find_virtual_in_bases(ctx, base.class, name, params) {
            return true;
        }
    }
    false
}

/// Resolve a function template's pattern signature against its own
/// template-parameter scope; parameter references stay as
/// `TemplateParam` types for deduction.
fn resolve_template_pattern_sig(ctx: &mut Context, template: DeclId) -> SemaResult<()> {
    let (pattern, scope) = match &ctx.decl(template).kind {
        DeclKind::Template(t) => (t.pattern.clone(), t.scope),
        _ => return Ok(()),
    };
    let TemplatePattern::Function(def) = pattern else {
        return Ok(());
    };
    let mut params = Vec::with_capacity(def.params.len());
    for p in &def.params {
        params.push(ctx.try_resolve_type_expr(scope, &p.ty)?);
    }
    let ret = ctx.try_resolve_type_expr(scope, &def.ret)?;
    let variadic = def.variadic;
    if let DeclKind::Template(t) = &mut ctx.decl_mut(template).kind {
        t.pattern_sig = Some(FunctionSig { params, ret, variadic });
    }
    Ok(())
}
