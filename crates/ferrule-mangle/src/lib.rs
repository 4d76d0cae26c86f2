//! Symbol mangling.
//!
//! Produces deterministic, Itanium-flavoured names for externally
//! visible declarations: namespaces become length-prefixed components,
//! overloads are disambiguated by parameter type codes, and template
//! instantiations embed their canonical binding. The scheme is a
//! simplified subset of the Itanium ABI (no substitution compression),
//! which keeps names stable across runs for identical inputs.

use rustc_hash::FxHashMap;

use ferrule_sema::decl::{DeclKind, FunctionKind};
use ferrule_sema::types::FloatWidth;
use ferrule_sema::{Context, DeclId, IntWidth, RefKind, Type, TypeId};

/// Which constructor/destructor variant a symbol names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructorVariant {
    /// Complete-object variant; constructs virtual bases.
    Complete,
    /// Base-subobject variant; skips virtual bases.
    Base,
}

/// Mangle a function declaration.
pub fn mangle_function(ctx: &Context, decl: DeclId) -> String {
    mangle_function_variant(ctx, decl, StructorVariant::Complete)
}

/// Mangle a function declaration, selecting the constructor/destructor
/// variant for special members (ignored for ordinary functions).
pub fn mangle_function_variant(ctx: &Context, decl: DeclId, variant: StructorVariant) -> String {
    let d = ctx.decl(decl);
    let DeclKind::Function(f) = &d.kind else {
        return mangle_variable(ctx, decl);
    };

    let qualifier = qualifier_components(ctx, decl);

    // `main` keeps its unmangled C name.
    if qualifier.is_empty() && d.name == "main" && f.kind == FunctionKind::Free {
        return "main".to_string();
    }

    let last = match f.kind {
        FunctionKind::Constructor { .. } => match variant {
            StructorVariant::Complete => "C1".to_string(),
            StructorVariant::Base => "C2".to_string(),
        },
        FunctionKind::Destructor { .. } => match variant {
            StructorVariant::Complete => "D1".to_string(),
            StructorVariant::Base => "D2".to_string(),
        },
        _ => {
            let mut component = source_name(&d.name);
            if let Some(origin) = &f.origin {
                component.push('I');
                for &arg in &origin.binding {
                    component.push_str(&type_code(ctx, arg));
                }
                component.push('E');
            }
            component
        }
    };

    let mut out = String::from("_Z");
    if qualifier.is_empty() {
        out.push_str(&last);
    } else {
        out.push('N');
        for part in &qualifier {
            out.push_str(part);
        }
        out.push_str(&last);
        out.push('E');
    }

    match &f.sig {
        Some(sig) if !sig.params.is_empty() => {
            for &p in &sig.params {
                out.push_str(&type_code(ctx, p));
            }
            if sig.variadic {
                out.push('z');
            }
        }
        _ => out.push('v'),
    }
    out
}

/// Mangle a namespace-scope variable. Unqualified globals keep their
/// source name for C compatibility.
pub fn mangle_variable(ctx: &Context, decl: DeclId) -> String {
    let qualifier = qualifier_components(ctx, decl);
    let name = ctx.name(decl);
    if qualifier.is_empty() {
        return name.to_string();
    }
    let mut out = String::from("_ZN");
    for part in &qualifier {
        out.push_str(part);
    }
    out.push_str(&source_name(name));
    out.push('E');
    out
}

/// The enclosing namespace/class components of a decl as mangled name
/// pieces, outermost first. Class components embed their template
/// binding so members of distinct instantiations never collide.
fn qualifier_components(ctx: &Context, decl: DeclId) -> Vec<String> {
    let mut parts = Vec::new();
    let mut scope = ctx.decl(decl).parent;
    loop {
        let s = ctx.scope(scope);
        if let Some(owner) = s.owner {
            let owner_decl = ctx.decl(owner);
            match &owner_decl.kind {
                DeclKind::Class(_) => parts.push(class_component(ctx, owner)),
                // Template-parameter scopes are transparent.
                DeclKind::Template(_) => {}
                _ if !owner_decl.name.is_empty() => parts.push(source_name(&owner_decl.name)),
                _ => {}
            }
        }
        match s.parent {
            Some(p) => scope = p,
            None => break,
        }
    }
    parts.reverse();
    parts
}

/// The vtable symbol of a polymorphic class.
pub fn mangle_vtable(ctx: &Context, class: DeclId) -> String {
    format!("_ZTV{}", nested_name(ctx, class))
}

/// The type-info symbol of a class.
pub fn mangle_typeinfo(ctx: &Context, class: DeclId) -> String {
    format!("_ZTI{}", nested_name(ctx, class))
}

fn nested_name(ctx: &Context, decl: DeclId) -> String {
    let qualifier = qualifier_components(ctx, decl);
    let last = class_component(ctx, decl);
    if qualifier.is_empty() {
        last
    } else {
        let mut out = String::from("N");
        for part in &qualifier {
            out.push_str(part);
        }
        out.push_str(&last);
        out.push('E');
        out
    }
}

/// The name component of a class, with template arguments when the
/// class is an instantiation.
fn class_component(ctx: &Context, decl: DeclId) -> String {
    let mut component = source_name(ctx.name(decl));
    if let DeclKind::Class(c) = &ctx.decl(decl).kind {
        if let Some(origin) = &c.origin {
            component.push('I');
            for &arg in &origin.binding {
                component.push_str(&type_code(ctx, arg));
            }
            component.push('E');
        }
    }
    component
}

fn source_name(name: &str) -> String {
    format!("{}{}", name.len(), name)
}

/// Itanium type codes for the supported type set.
fn type_code(ctx: &Context, ty: TypeId) -> String {
    match ctx.types.get(ty) {
        Type::Void => "v".into(),
        Type::Bool => "b".into(),
        Type::Int { signed, width } => match (width, signed) {
            (IntWidth::W8, true) => "c".into(),
            (IntWidth::W8, false) => "h".into(),
            (IntWidth::W16, true) => "s".into(),
            (IntWidth::W16, false) => "t".into(),
            (IntWidth::W32, true) => "i".into(),
            (IntWidth::W32, false) => "j".into(),
            (IntWidth::W64, true) => "x".into(),
            (IntWidth::W64, false) => "y".into(),
        },
        Type::Float { width: FloatWidth::W32 } => "f".into(),
        Type::Float { width: FloatWidth::W64 } => "d".into(),
        Type::Pointer { pointee, quals } => {
            if quals.is_const {
                format!("PK{}", type_code(ctx, *pointee))
            } else {
                format!("P{}", type_code(ctx, *pointee))
            }
        }
        Type::Reference { referent, kind, quals } => {
            let prefix = match kind {
                RefKind::LValue => "R",
                RefKind::RValue => "O",
            };
            if quals.is_const {
                format!("{prefix}K{}", type_code(ctx, *referent))
            } else {
                format!("{prefix}{}", type_code(ctx, *referent))
            }
        }
        Type::Array { element, len } => match len {
            Some(n) => format!("A{n}_{}", type_code(ctx, *element)),
            None => format!("P{}", type_code(ctx, *element)),
        },
        Type::Function { params, ret, .. } => {
            let mut out = String::from("F");
            out.push_str(&type_code(ctx, *ret));
            if params.is_empty() {
                out.push('v');
            } else {
                for &p in params {
                    out.push_str(&type_code(ctx, p));
                }
            }
            out.push('E');
            out
        }
        Type::Class(decl) | Type::Enum(decl) => nested_name(ctx, *decl),
        Type::TemplateParam { name, .. } | Type::DependentName(name) => source_name(name),
        Type::OverloadSet(_) | Type::Error => "u5error".into(),
    }
}

/// Reverse index from mangled symbol to declaration, built during
/// emission so callers can look decls up by symbol.
#[derive(Debug, Default, Clone)]
pub struct MangledIndex {
    map: FxHashMap<String, DeclId>,
}

impl MangledIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: impl Into<String>, decl: DeclId) {
        self.map.insert(symbol.into(), decl);
    }

    pub fn lookup(&self, symbol: &str) -> Option<DeclId> {
        self.map.get(symbol).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
