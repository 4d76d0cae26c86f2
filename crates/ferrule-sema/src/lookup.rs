//! Name lookup.
//!
//! Implements the C++ lookup rules the corpus exercises:
//!
//! 1. Unqualified lookup walks from the innermost scope outward and
//!    stops at the first scope with a non-empty result. At each scope
//!    the scope's own bindings are merged with the bindings of every
//!    namespace transitively nominated by `using namespace` directives
//!    written in that scope.
//! 2. Qualified lookup (`a::b::x`) resolves the qualifier to a scope
//!    and restricts lookup to it, including base classes for class
//!    scopes.
//! 3. Base-class lookup flattens virtual bases so a name in a shared
//!    virtual base is found once; a name reachable through two distinct
//!    non-virtual subobjects is ambiguous.
//! 4. ADL adds free functions from the associated namespaces of each
//!    argument type to a call's candidate set.

use rustc_hash::FxHashSet;

use ferrule_ast::Span;

use crate::context::Context;
use crate::decl::{Access, DeclId, DeclKind, FunctionKind};
use crate::error::{SemaError, SemaResult};
use crate::scope::{ScopeId, ScopeKind};
use crate::types::{Type, TypeId};

/// Unqualified lookup from `from`, walking outward. Returns an empty
/// vector when the name is nowhere in scope; ambiguity across base
/// subobjects is an error.
pub fn unqualified(ctx: &Context, from: ScopeId, name: &str, span: Span) -> SemaResult<Vec<DeclId>> {
    let mut scope = Some(from);
    while let Some(id) = scope {
        let found = in_scope(ctx, id, name, span)?;
        if !found.is_empty() {
            return Ok(found);
        }
        scope = ctx.scope(id).parent;
    }
    Ok(Vec::new())
}

/// Lookup restricted to one scope: its own bindings, the closure of its
/// `using` directives, and base classes when it is a class scope.
///
/// A scope's own bindings shadow directive-imported ones: the imports
/// are only consulted when the scope itself has nothing under the name.
pub fn in_scope(ctx: &Context, scope: ScopeId, name: &str, span: Span) -> SemaResult<Vec<DeclId>> {
    let s = ctx.scope(scope);

    // Class scopes search their bases as well.
    if s.kind == ScopeKind::Class {
        if let Some(owner) = s.owner {
            return class_member(ctx, owner, name, span);
        }
    }

    let own: Vec<DeclId> = s.get(name).to_vec();
    if !own.is_empty() {
        return Ok(own);
    }

    // Transparent imports from using directives, transitively.
    let mut found = Vec::new();
    for target in directive_closure(ctx, scope) {
        for &d in ctx.scope(target).get(name) {
            if !found.contains(&d) {
                found.push(d);
            }
        }
    }
    Ok(found)
}

/// All namespace scopes reachable through `using namespace` directives
/// registered in `scope`, transitively.
fn directive_closure(ctx: &Context, scope: ScopeId) -> Vec<ScopeId> {
    let mut out = Vec::new();
    let mut seen = FxHashSet::default();
    let mut work: Vec<ScopeId> = ctx.scope(scope).using_directives.clone();
    while let Some(target) = work.pop() {
        if !seen.insert(target) {
            continue;
        }
        out.push(target);
        work.extend(ctx.scope(target).using_directives.iter().copied());
    }
    out
}

/// One base subobject in which a name was found.
struct SubobjectHit {
    decls: Vec<DeclId>,
    origin: DeclId,
}

/// Lookup inside a class scope, searching base classes depth-first.
///
/// Virtual bases are visited once no matter how many paths reach them;
/// a name found in two distinct non-virtual subobjects is ambiguous.
pub fn class_member(ctx: &Context, class: DeclId, name: &str, span: Span) -> SemaResult<Vec<DeclId>> {
    let mut visited_virtual = FxHashSet::default();
    let mut hits = Vec::new();
    collect_member_hits(ctx, class, name, &mut visited_virtual, &mut hits);
    match hits.len() {
        0 => Ok(Vec::new()),
        1 => Ok(hits.remove(0).decls),
        _ => {
            // A name found in one virtual base is unambiguous even when
            // several paths lead to it; collect_member_hits already
            // deduplicates those, so several hits mean several
            // subobjects.
            let candidates = hits
                .iter()
                .map(|h| format!("{}::{}", ctx.qualified_name(h.origin), name))
                .collect();
            Err(SemaError::NameAmbiguous {
                name: name.to_string(),
                span: span.into(),
                candidates,
            })
        }
    }
}

fn collect_member_hits(
    ctx: &Context,
    class: DeclId,
    name: &str,
    visited_virtual: &mut FxHashSet<DeclId>,
    hits: &mut Vec<SubobjectHit>,
) {
    let DeclKind::Class(c) = &ctx.decl(class).kind else {
        return;
    };
    let own: Vec<DeclId> = ctx.scope(c.scope).get(name).to_vec();
    if !own.is_empty() {
        // A declaration here hides anything in the bases of this
        // subobject.
        hits.push(SubobjectHit { decls: own, origin: class });
        return;
    }
    for base in &c.bases {
        if base.is_virtual {
            if !visited_virtual.insert(base.class) {
                continue;
            }
        }
        collect_member_hits(ctx, base.class, name, visited_virtual, hits);
    }
}

/// Resolve a full (possibly qualified) name path.
pub fn lookup_path(
    ctx: &Context,
    from: ScopeId,
    path: &[String],
    span: Span,
) -> SemaResult<Vec<DeclId>> {
    match path {
        [] => Ok(Vec::new()),
        [single] => {
            let found = unqualified(ctx, from, single, span)?;
            if found.is_empty() {
                return Err(SemaError::NameNotFound {
                    name: single.clone(),
                    span: span.into(),
                });
            }
            Ok(found)
        }
        _ => qualified(ctx, from, path, span),
    }
}

/// Qualified lookup: evaluate the qualifier to a scope, then look up
/// the final component inside it.
pub fn qualified(
    ctx: &Context,
    from: ScopeId,
    path: &[String],
    span: Span,
) -> SemaResult<Vec<DeclId>> {
    let (last, qualifier) = path.split_last().ok_or_else(|| SemaError::Internal {
        message: "empty qualified path".into(),
        span: Some(span.into()),
    })?;

    let mut scope = resolve_qualifier_head(ctx, from, &qualifier[0], span)?;
    for segment in &qualifier[1..] {
        let found = scope_member_scope(ctx, scope, segment, span)?;
        scope = found;
    }

    let found = in_scope(ctx, scope, last, span)?;
    if found.is_empty() {
        return Err(SemaError::NameNotFound {
            name: path.join("::"),
            span: span.into(),
        });
    }
    Ok(found)
}

/// Resolve the first qualifier segment via unqualified lookup to a
/// namespace or class scope.
fn resolve_qualifier_head(
    ctx: &Context,
    from: ScopeId,
    name: &str,
    span: Span,
) -> SemaResult<ScopeId> {
    let found = unqualified(ctx, from, name, span)?;
    for decl in found {
        if let Some(scope) = scope_of_type_or_namespace(ctx, decl) {
            return Ok(scope);
        }
    }
    Err(SemaError::NameNotFound {
        name: name.to_string(),
        span: span.into(),
    })
}

/// Resolve a middle qualifier segment inside `scope`.
fn scope_member_scope(
    ctx: &Context,
    scope: ScopeId,
    name: &str,
    span: Span,
) -> SemaResult<ScopeId> {
    let found = in_scope(ctx, scope, name, span)?;
    for decl in found {
        if let Some(s) = scope_of_type_or_namespace(ctx, decl) {
            return Ok(s);
        }
    }
    Err(SemaError::NameNotFound {
        name: name.to_string(),
        span: span.into(),
    })
}

fn scope_of_type_or_namespace(ctx: &Context, decl: DeclId) -> Option<ScopeId> {
    match &ctx.decl(decl).kind {
        DeclKind::Namespace(ns) => Some(ns.scope),
        DeclKind::Class(c) => Some(c.scope),
        _ => None,
    }
}

/// The associated namespace scopes of a list of argument types: for a
/// class or enum argument, the namespace its declaration lives in and
/// every enclosing namespace.
pub fn adl_namespaces(ctx: &Context, arg_types: &[TypeId]) -> Vec<ScopeId> {
    let mut out = Vec::new();
    let mut seen = FxHashSet::default();
    for &arg in arg_types {
        let mut decl = None;
        let mut ty = arg;
        // Look through references, pointers and arrays.
        loop {
            match ctx.types.get(ty) {
                Type::Reference { referent, .. } => ty = *referent,
                Type::Pointer { pointee, .. } => ty = *pointee,
                Type::Array { element, .. } => ty = *element,
                Type::Class(d) | Type::Enum(d) => {
                    decl = Some(*d);
                    break;
                }
                _ => break,
            }
        }
        let Some(d) = decl else { continue };
        let mut scope = Some(ctx.decl(d).parent);
        while let Some(id) = scope {
            let s = ctx.scope(id);
            if s.kind == ScopeKind::Namespace && seen.insert(id) {
                out.push(id);
            }
            scope = s.parent;
        }
    }
    out
}

/// Free functions named `name` found in the associated namespaces of
/// the argument types.
pub fn adl_candidates(ctx: &Context, name: &str, arg_types: &[TypeId]) -> Vec<DeclId> {
    let mut out = Vec::new();
    for ns in adl_namespaces(ctx, arg_types) {
        for &d in ctx.scope(ns).get(name) {
            let is_function = matches!(
                &ctx.decl(d).kind,
                DeclKind::Function(f) if f.kind == FunctionKind::Free
            ) || matches!(&ctx.decl(d).kind, DeclKind::Template(_));
            if is_function && !out.contains(&d) {
                out.push(d);
            }
        }
    }
    out
}

/// Check that `member` may be named from a context inside `from_class`
/// (or from no class at all).
pub fn check_member_access(
    ctx: &Context,
    member: DeclId,
    from_class: Option<DeclId>,
    span: Span,
) -> SemaResult<()> {
    let decl = ctx.decl(member);
    let owner = owner_class(ctx, member);
    let accessible = match (decl.access, owner) {
        (Access::Public, _) | (_, None) => true,
        (Access::Private, Some(owner)) => from_class == Some(owner),
        (Access::Protected, Some(owner)) => match from_class {
            Some(from) => from == owner || derives_from(ctx, from, owner),
            None => false,
        },
    };
    if accessible {
        Ok(())
    } else {
        Err(SemaError::AccessViolation {
            name: ctx.qualified_name(member),
            what: decl.kind.describe(),
            span: span.into(),
        })
    }
}

/// The class a member decl belongs to, if it is a member.
fn owner_class(ctx: &Context, decl: DeclId) -> Option<DeclId> {
    let parent = ctx.decl(decl).parent;
    let s = ctx.scope(parent);
    if s.kind == ScopeKind::Class {
        s.owner
    } else {
        None
    }
}

/// Whether `derived` transitively derives from `base`.
pub fn derives_from(ctx: &Context, derived: DeclId, base: DeclId) -> bool {
    if derived == base {
        return false;
    }
    let DeclKind::Class(c) = &ctx.decl(derived).kind else {
        return false;
    };
    c.bases
        .iter()
        .any(|b| b.class == base || derives_from(ctx, b.class, base))
}
