//! The per-translation-unit semantic context.
//!
//! One [`Context`] owns every canonical table: the decl arena, the
//! scope tree, the type interner, the template instantiation cache and
//! the diagnostics sink. Contexts are independent of one another, so a
//! driver may process translation units in parallel; nothing in this
//! crate is process-wide.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use ferrule_ast as ast;
use ferrule_ast::Span;

use crate::decl::{
    Access, Decl, DeclId, DeclKind, FunctionSig, Linkage, TypeAliasDecl, VariableDecl,
};
use crate::diag::DiagSink;
use crate::error::{SemaError, SemaResult};
use crate::lookup;
use crate::scope::{Scope, ScopeId, ScopeKind};
use crate::template;
use crate::types::{Type, TypeId, TypeInterner};

/// Hard ceiling on template instantiation nesting.
pub const MAX_INSTANTIATION_DEPTH: u32 = 64;

/// The mutable state for analysing one translation unit.
pub struct Context {
    pub decls: Vec<Decl>,
    pub scopes: Vec<Scope>,
    pub types: TypeInterner,
    /// The global namespace scope; root of the scope tree.
    pub global_scope: ScopeId,
    /// Memoised template instantiations:
    /// `(template, canonical binding) -> instantiated decl`.
    pub instantiations: FxHashMap<(DeclId, Vec<TypeId>), DeclId>,
    pub diags: DiagSink,
    /// Decls whose analysis failed; they lower to `Unreachable` stubs.
    poisoned: FxHashSet<DeclId>,
    /// Current instantiation nesting, for the recursion cut-off.
    pub instantiation_depth: u32,
    /// Guards against typedef cycles while collapsing alias chains.
    alias_in_progress: FxHashSet<DeclId>,
}

impl Context {
    pub fn new() -> Self {
        let mut scopes = Vec::new();
        let global_scope = ScopeId(0);
        scopes.push(Scope::new(global_scope, ScopeKind::Namespace, None, None));
        Context {
            decls: Vec::new(),
            scopes,
            types: TypeInterner::new(),
            global_scope,
            instantiations: FxHashMap::default(),
            diags: DiagSink::new(),
            poisoned: FxHashSet::default(),
            instantiation_depth: 0,
            alias_in_progress: FxHashSet::default(),
        }
    }

    // ---- arena access ----------------------------------------------------

    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id.index()]
    }

    pub fn decl_mut(&mut self, id: DeclId) -> &mut Decl {
        &mut self.decls[id.index()]
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.index()]
    }

    /// Allocate a new decl and return its handle. The caller is
    /// responsible for binding the name into a scope.
    pub fn add_decl(
        &mut self,
        name: impl Into<String>,
        kind: DeclKind,
        parent: ScopeId,
        span: Span,
        access: Access,
        linkage: Linkage,
    ) -> DeclId {
        let id = DeclId(self.decls.len() as u32);
        self.decls.push(Decl {
            id,
            name: name.into(),
            kind,
            parent,
            span,
            access,
            linkage,
        });
        id
    }

    pub fn add_scope(
        &mut self,
        kind: ScopeKind,
        parent: ScopeId,
        owner: Option<DeclId>,
    ) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::new(id, kind, Some(parent), owner));
        id
    }

    /// Bind `name -> decl` in `scope`.
    pub fn bind(&mut self, scope: ScopeId, name: impl Into<String>, decl: DeclId) {
        self.scope_mut(scope).bind(name, decl);
    }

    // ---- decl-model operations ------------------------------------------

    /// The scope a decl is declared in.
    pub fn parent(&self, decl: DeclId) -> ScopeId {
        self.decl(decl).parent
    }

    pub fn name(&self, decl: DeclId) -> &str {
        &self.decl(decl).name
    }

    pub fn kind(&self, decl: DeclId) -> &DeclKind {
        &self.decl(decl).kind
    }

    /// The scope a decl owns (namespace members, class members,
    /// function parameters), if it owns one.
    pub fn owned_scope(&self, decl: DeclId) -> Option<ScopeId> {
        match &self.decl(decl).kind {
            DeclKind::Namespace(ns) => Some(ns.scope),
            DeclKind::Class(c) => Some(c.scope),
            DeclKind::Function(f) => Some(f.scope),
            DeclKind::Template(t) => Some(t.scope),
            _ => None,
        }
    }

    /// All decls bound in the scope a decl owns, in id order.
    pub fn children(&self, decl: DeclId) -> Vec<DeclId> {
        let Some(scope) = self.owned_scope(decl) else {
            return Vec::new();
        };
        let mut out: Vec<DeclId> = self
            .scope(scope)
            .bindings()
            .flat_map(|(_, decls)| decls.iter().copied())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Attach a body to a previously body-less function declaration.
    /// The slot transitions from unset to set exactly once.
    pub fn attach_body(&mut self, decl: DeclId, def: Arc<ast::FunctionDef>) -> SemaResult<()> {
        let d = self.decl_mut(decl);
        if let DeclKind::Function(f) = &mut d.kind {
            if f.is_defined {
                return Err(SemaError::Internal {
                    message: format!("function `{}` defined twice", d.name),
                    span: Some(d.span.into()),
                });
            }
            f.def = def;
            f.is_defined = true;
            Ok(())
        } else {
            Err(SemaError::Internal {
                message: format!("attach_body on non-function `{}`", d.name),
                span: None,
            })
        }
    }

    // ---- poisoning -------------------------------------------------------

    /// Record a failed decl. Poisoned functions lower to a single
    /// `Unreachable` block so downstream consumers still see a
    /// well-formed artifact.
    pub fn poison(&mut self, decl: DeclId) {
        self.poisoned.insert(decl);
    }

    pub fn is_poisoned(&self, decl: DeclId) -> bool {
        self.poisoned.contains(&decl)
    }

    /// Report an error through the sink and poison `decl`.
    pub fn report_and_poison(&mut self, decl: DeclId, err: SemaError) {
        self.diags.report(err.into_diag());
        self.poison(decl);
    }

    pub fn report(&mut self, err: SemaError) {
        self.diags.report(err.into_diag());
    }

    // ---- names -----------------------------------------------------------

    /// The enclosing namespace/class component names of a decl,
    /// outermost first, excluding the decl's own name.
    pub fn qualifier_path(&self, decl: DeclId) -> Vec<String> {
        let mut parts = Vec::new();
        let mut scope = self.decl(decl).parent;
        loop {
            let s = self.scope(scope);
            if let Some(owner) = s.owner {
                let owner_decl = self.decl(owner);
                // Instantiation and template-parameter scopes are
                // transparent for naming purposes.
                if !matches!(owner_decl.kind, DeclKind::Template(_)) && !owner_decl.name.is_empty()
                {
                    parts.push(owner_decl.name.clone());
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

    /// Fully qualified display name, `a::b::f`.
    pub fn qualified_name(&self, decl: DeclId) -> String {
        let mut parts = self.qualifier_path(decl);
        parts.push(self.decl(decl).name.clone());
        parts.join("::")
    }

    /// Render a type for diagnostics, C++ spelling.
    pub fn type_name(&self, id: TypeId) -> String {
        use crate::types::{FloatWidth, IntWidth, RefKind};
        match self.types.get(id) {
            Type::Void => "void".into(),
            Type::Bool => "bool".into(),
            Type::Int { signed, width } => {
                let base = match width {
                    IntWidth::W8 => "char",
                    IntWidth::W16 => "short",
                    IntWidth::W32 => "int",
                    IntWidth::W64 => "long long",
                };
                if *signed {
                    base.to_string()
                } else {
                    format!("unsigned {base}")
                }
            }
            Type::Float { width: FloatWidth::W32 } => "float".into(),
            Type::Float { width: FloatWidth::W64 } => "double".into(),
            Type::Pointer { pointee, quals } => {
                let inner = self.type_name(*pointee);
                if quals.is_const {
                    format!("const {inner}*")
                } else {
                    format!("{inner}*")
                }
            }
            Type::Reference { referent, kind, quals } => {
                let inner = self.type_name(*referent);
                let amp = match kind {
                    RefKind::LValue => "&",
                    RefKind::RValue => "&&",
                };
                if quals.is_const {
                    format!("const {inner}{amp}")
                } else {
                    format!("{inner}{amp}")
                }
            }
            Type::Array { element, len } => match len {
                Some(n) => format!("{}[{n}]", self.type_name(*element)),
                None => format!("{}[]", self.type_name(*element)),
            },
            Type::Function { params, ret, variadic } => {
                let mut ps: Vec<String> = params.iter().map(|p| self.type_name(*p)).collect();
                if *variadic {
                    ps.push("...".into());
                }
                format!("{}({})", self.type_name(*ret), ps.join(", "))
            }
            Type::Class(decl) | Type::Enum(decl) => self.qualified_name(*decl),
            Type::TemplateParam { name, .. } => name.clone(),
            Type::DependentName(name) => name.clone(),
            Type::OverloadSet(_) => "<overload set>".into(),
            Type::Error => "<error>".into(),
        }
    }

    // ---- variable/function helpers --------------------------------------

    /// The resolved type of a variable-like decl, `Error` if unresolved.
    pub fn var_type(&self, decl: DeclId) -> TypeId {
        match &self.decl(decl).kind {
            DeclKind::Variable(v) => v.ty.unwrap_or(self.types.common.error),
            _ => self.types.common.error,
        }
    }

    /// The resolved signature of a function decl, if available.
    pub fn function_sig(&self, decl: DeclId) -> Option<FunctionSig> {
        match &self.decl(decl).kind {
            DeclKind::Function(f) => f.sig.clone(),
            _ => None,
        }
    }

    // ---- type resolution -------------------------------------------------

    /// Resolve a spelled type to its canonical id, reporting failures
    /// through the sink and returning the error type.
    pub fn resolve_type_expr(&mut self, scope: ScopeId, te: &ast::TypeExpr) -> TypeId {
        match self.try_resolve_type_expr(scope, te) {
            Ok(id) => id,
            Err(err) => {
                self.report(err);
                self.types.common.error
            }
        }
    }

    /// Resolve a spelled type to its canonical id. Errors are returned
    /// to the caller so SFINAE contexts can silence them.
    pub fn try_resolve_type_expr(
        &mut self,
        scope: ScopeId,
        te: &ast::TypeExpr,
    ) -> SemaResult<TypeId> {
        use ast::TypeExprKind;
        match &te.kind {
            TypeExprKind::Builtin(b) => Ok(self.builtin_type(*b)),
            TypeExprKind::Pointer { pointee, is_const } => {
                let inner = self.try_resolve_type_expr(scope, pointee)?;
                Ok(self.intern_pointer(inner, *is_const))
            }
            TypeExprKind::Reference { referent, is_const, is_rvalue } => {
                let inner = self.try_resolve_type_expr(scope, referent)?;
                let kind = if *is_rvalue {
                    crate::types::RefKind::RValue
                } else {
                    crate::types::RefKind::LValue
                };
                let quals = if *is_const {
                    crate::types::Qualifiers::CONST
                } else {
                    crate::types::Qualifiers::NONE
                };
                Ok(self.types.intern(Type::Reference { referent: inner, kind, quals }))
            }
            TypeExprKind::Array { element, size } => {
                let inner = self.try_resolve_type_expr(scope, element)?;
                Ok(self.types.array_of(inner, *size))
            }
            TypeExprKind::Function { params, ret, variadic } => {
                let mut ps = Vec::with_capacity(params.len());
                for p in params {
                    ps.push(self.try_resolve_type_expr(scope, p)?);
                }
                let r = self.try_resolve_type_expr(scope, ret)?;
                Ok(self.types.intern(Type::Function { params: ps, ret: r, variadic: *variadic }))
            }
            TypeExprKind::Named { path, template_args } => {
                self.resolve_named_type(scope, path, template_args, te.span)
            }
        }
    }

    fn resolve_named_type(
        &mut self,
        scope: ScopeId,
        path: &[String],
        template_args: &[ast::TypeExpr],
        span: Span,
    ) -> SemaResult<TypeId> {
        let found = lookup::lookup_path(self, scope, path, span)?;
        // Prefer type-like decls when the name is also bound to others.
        let type_decl = found.iter().copied().find(|d| {
            matches!(
                self.decl(*d).kind,
                DeclKind::Class(_)
                    | DeclKind::Enum(_)
                    | DeclKind::TypeAlias(_)
                    | DeclKind::TemplateTypeParam(_)
                    | DeclKind::Template(_)
            )
        });
        let Some(decl) = type_decl else {
            return Err(SemaError::NameNotFound {
                name: path.join("::"),
                span: span.into(),
            });
        };
        // Pull the discriminating data out before interning; the type
        // table needs the context mutably.
        enum Named {
            Class,
            Enum,
            Alias,
            Param { bound: Option<TypeId>, depth: u32, index: u32, name: String },
            Template,
            Other,
        }
        let named = match &self.decl(decl).kind {
            DeclKind::Class(_) => Named::Class,
            DeclKind::Enum(_) => Named::Enum,
            DeclKind::TypeAlias(_) => Named::Alias,
            DeclKind::TemplateTypeParam(p) => Named::Param {
                bound: p.bound,
                depth: p.depth,
                index: p.index,
                name: self.decl(decl).name.clone(),
            },
            DeclKind::Template(_) => Named::Template,
            _ => Named::Other,
        };
        match named {
            Named::Class => Ok(self.types.intern(Type::Class(decl))),
            Named::Enum => Ok(self.types.intern(Type::Enum(decl))),
            Named::Alias => self.alias_target(decl, span),
            Named::Param { bound: Some(bound), .. } => Ok(bound),
            Named::Param { depth, index, name, .. } => {
                Ok(self.types.intern(Type::TemplateParam { depth, index, name }))
            }
            Named::Template => {
                if template_args.is_empty() {
                    return Err(SemaError::NameNotFound {
                        name: format!("{} (template used without arguments)", path.join("::")),
                        span: span.into(),
                    });
                }
                let mut args = Vec::with_capacity(template_args.len());
                for a in template_args {
                    args.push(self.try_resolve_type_expr(scope, a)?);
                }
                let inst = template::instantiate_class(self, decl, args, span)?;
                Ok(self.types.intern(Type::Class(inst)))
            }
            Named::Other => Err(SemaError::NameNotFound {
                name: path.join("::"),
                span: span.into(),
            }),
        }
    }

    /// Collapse an alias chain to its ultimate canonical target.
    fn alias_target(&mut self, decl: DeclId, span: Span) -> SemaResult<TypeId> {
        if let DeclKind::TypeAlias(TypeAliasDecl { target: Some(t), .. }) = &self.decl(decl).kind {
            return Ok(*t);
        }
        if !self.alias_in_progress.insert(decl) {
            return Err(SemaError::Internal {
                message: format!("cyclic type alias `{}`", self.decl(decl).name),
                span: Some(span.into()),
            });
        }
        let (ast_target, parent) = match &self.decl(decl).kind {
            DeclKind::TypeAlias(a) => (a.ast_target.clone(), self.decl(decl).parent),
            _ => {
                self.alias_in_progress.remove(&decl);
                return Err(SemaError::Internal {
                    message: "alias_target on non-alias decl".into(),
                    span: None,
                });
            }
        };
        let resolved = self.try_resolve_type_expr(parent, &ast_target);
        self.alias_in_progress.remove(&decl);
        let target = resolved?;
        if let DeclKind::TypeAlias(a) = &mut self.decl_mut(decl).kind {
            a.target = Some(target);
        }
        Ok(target)
    }

    pub fn builtin_type(&self, b: ast::BuiltinType) -> TypeId {
        use ast::BuiltinType as B;
        let c = &self.types.common;
        match b {
            B::Void => c.void,
            B::Bool => c.bool_,
            B::Char { signed: true } => c.char_,
            B::Char { signed: false } => c.uchar,
            B::Short { signed: true } => c.short,
            B::Short { signed: false } => c.ushort,
            B::Int { signed: true } => c.int,
            B::Int { signed: false } => c.uint,
            B::Long { signed } | B::LongLong { signed } => {
                if signed {
                    c.long
                } else {
                    c.ulong
                }
            }
            B::Float => c.float,
            B::Double => c.double,
        }
    }

    fn intern_pointer(&mut self, pointee: TypeId, is_const: bool) -> TypeId {
        if is_const {
            self.types.pointer_to_const(pointee)
        } else {
            self.types.pointer_to(pointee)
        }
    }

    /// The variable decl for a global, looked up for initialisers.
    pub fn global_variables(&self) -> Vec<DeclId> {
        self.decls
            .iter()
            .filter(|d| {
                matches!(
                    d.kind,
                    DeclKind::Variable(VariableDecl { kind: crate::decl::VarKind::Global, .. })
                )
            })
            .map(|d| d.id)
            .collect()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
