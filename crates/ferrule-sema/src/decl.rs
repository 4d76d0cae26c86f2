//! The declaration model.
//!
//! Every program entity is a [`Decl`] in an arena owned by the context;
//! cross references (a class referring to a method whose body refers
//! back to the class) are [`DeclId`] indices, never owning pointers.
//! Structural fields are set at creation; late-bound data (bodies,
//! resolved signatures, instantiation results) occupies dedicated
//! `Option` slots that go from unset to set exactly once.

use std::sync::Arc;

use ferrule_ast as ast;
use ferrule_ast::Span;

use crate::scope::ScopeId;
use crate::types::TypeId;

/// Stable handle for a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclId(pub u32);

impl DeclId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Linkage of an entity, as far as the backend cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    External,
    /// Anonymous-namespace members.
    Internal,
    /// Entities that never become symbols (locals, parameters).
    None,
}

/// Member access, also used for base specifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Protected,
    Private,
}

impl From<ast::AccessSpecifier> for Access {
    fn from(a: ast::AccessSpecifier) -> Self {
        match a {
            ast::AccessSpecifier::Public => Access::Public,
            ast::AccessSpecifier::Protected => Access::Protected,
            ast::AccessSpecifier::Private => Access::Private,
        }
    }
}

/// One declaration.
#[derive(Debug, Clone)]
pub struct Decl {
    pub id: DeclId,
    pub name: String,
    pub kind: DeclKind,
    /// The scope this declaration lives in. Every decl has exactly one
    /// parent scope; the root namespace's parent is itself.
    pub parent: ScopeId,
    pub span: Span,
    pub access: Access,
    pub linkage: Linkage,
}

#[derive(Debug, Clone)]
pub enum DeclKind {
    Namespace(NamespaceDecl),
    Class(ClassDecl),
    Enum(EnumDecl),
    TypeAlias(TypeAliasDecl),
    Function(FunctionDecl),
    Variable(VariableDecl),
    Template(TemplateDecl),
    TemplateTypeParam(TemplateTypeParamDecl),
    Concept(ConceptDecl),
}

impl DeclKind {
    /// Short noun for diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            DeclKind::Namespace(_) => "namespace",
            DeclKind::Class(_) => "class",
            DeclKind::Enum(_) => "enum",
            DeclKind::TypeAlias(_) => "type alias",
            DeclKind::Function(_) => "function",
            DeclKind::Variable(_) => "variable",
            DeclKind::Template(_) => "template",
            DeclKind::TemplateTypeParam(_) => "template parameter",
            DeclKind::Concept(_) => "concept",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NamespaceDecl {
    /// The scope holding the namespace members.
    pub scope: ScopeId,
}

/// A base class entry in a class definition, resolved to a decl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseSpecifier {
    pub class: DeclId,
    pub access: Access,
    pub is_virtual: bool,
}

#[derive(Debug, Clone)]
pub struct ClassDecl {
    /// The member scope.
    pub scope: ScopeId,
    /// `class` vs `struct` spelling; affects default access only.
    pub is_class: bool,
    /// Direct bases in base-specifier order. Resolved in the signature
    /// pass; empty until then.
    pub bases: Vec<BaseSpecifier>,
    /// Non-static data members in declaration order.
    pub fields: Vec<DeclId>,
    /// Methods in declaration order (including operators).
    pub methods: Vec<DeclId>,
    pub ctors: Vec<DeclId>,
    pub dtor: Option<DeclId>,
    /// True once a virtual function (own or inherited) is seen.
    pub is_polymorphic: bool,
    /// False while only forward-declared.
    pub is_complete: bool,
    /// Set once the signature pass has processed this class.
    pub sigs_resolved: bool,
    /// The AST definition, kept for the signature pass.
    pub def: Option<Arc<ast::ClassDef>>,
    /// Set when this class is the result of a template instantiation.
    pub origin: Option<InstantiationOf>,
}

#[derive(Debug, Clone)]
pub struct EnumDecl {
    pub underlying: TypeId,
    pub is_scoped: bool,
    /// Enumerator variable decls, in declaration order.
    pub enumerators: Vec<DeclId>,
}

#[derive(Debug, Clone)]
pub struct TypeAliasDecl {
    /// Canonical target; alias chains collapse on resolution, so this
    /// never names another alias.
    pub target: Option<TypeId>,
    /// The spelled target, resolved in the signature pass.
    pub ast_target: Arc<ast::TypeExpr>,
}

/// How a function relates to a class, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Free,
    Method {
        class: DeclId,
        is_virtual: bool,
        is_pure: bool,
        is_static: bool,
    },
    Constructor {
        class: DeclId,
    },
    Destructor {
        class: DeclId,
        is_virtual: bool,
    },
}

impl FunctionKind {
    pub fn class(self) -> Option<DeclId> {
        match self {
            FunctionKind::Free => None,
            FunctionKind::Method { class, .. }
            | FunctionKind::Constructor { class }
            | FunctionKind::Destructor { class, .. } => Some(class),
        }
    }

    pub fn is_virtual(self) -> bool {
        matches!(
            self,
            FunctionKind::Method { is_virtual: true, .. }
                | FunctionKind::Destructor { is_virtual: true, .. }
        )
    }

    /// True if calls pass an implicit `this` argument.
    pub fn has_this(self) -> bool {
        match self {
            FunctionKind::Free => false,
            FunctionKind::Method { is_static, .. } => !is_static,
            FunctionKind::Constructor { .. } | FunctionKind::Destructor { .. } => true,
        }
    }
}

/// A resolved parameter.
#[derive(Debug, Clone)]
pub struct ParamInfo {
    pub name: String,
    pub ty: TypeId,
    pub span: Span,
}

/// A resolved function signature. `this` is not listed in `params`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSig {
    pub params: Vec<TypeId>,
    pub ret: TypeId,
    pub variadic: bool,
}

/// Which template instantiation produced a decl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstantiationOf {
    pub template: DeclId,
    pub binding: Vec<TypeId>,
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub kind: FunctionKind,
    /// The AST node; carries parameters, return type and body.
    pub def: Arc<ast::FunctionDef>,
    /// Resolved in the signature pass (or at instantiation).
    pub sig: Option<FunctionSig>,
    /// Resolved parameter names/types for body lowering.
    pub params: Vec<ParamInfo>,
    /// The scope template-parameter aliases and parameters live in; the
    /// body lowering opens block scopes under it.
    pub scope: ScopeId,
    /// Set when this decl is the result of a template instantiation.
    pub origin: Option<InstantiationOf>,
    pub is_defined: bool,
}

impl FunctionDecl {
    /// The resolved signature. Errors during the signature pass leave
    /// an all-`Error` signature rather than `None`.
    pub fn signature(&self) -> Option<&FunctionSig> {
        self.sig.as_ref()
    }
}

/// Discriminates the flavours of variable-like entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Global,
    /// Non-static data member, with its index in declaration order.
    Field { index: usize },
    Param,
    Local,
    /// An enumerator with its constant value.
    Enumerator { value: i64 },
}

#[derive(Debug, Clone)]
pub struct VariableDecl {
    pub kind: VarKind,
    /// Resolved in the signature pass.
    pub ty: Option<TypeId>,
    /// The spelled type, if this came from source.
    pub ast_ty: Option<Arc<ast::TypeExpr>>,
}

/// A template parameter declaration inside a template's scope.
#[derive(Debug, Clone)]
pub struct TemplateTypeParamDecl {
    pub depth: u32,
    pub index: u32,
    /// Bound argument once an instantiation scope is built; `None` in
    /// the template's own scope.
    pub bound: Option<TypeId>,
}

/// What a template declares.
#[derive(Debug, Clone)]
pub enum TemplatePattern {
    Function(Arc<ast::FunctionDef>),
    Class(Arc<ast::ClassDef>),
}

#[derive(Debug, Clone)]
pub struct TemplateParamInfo {
    pub name: String,
    /// Type parameters participate in deduction; value parameters are
    /// accepted but unevaluated.
    pub is_type: bool,
}

#[derive(Debug, Clone)]
pub struct TemplateDecl {
    pub params: Vec<TemplateParamInfo>,
    pub pattern: TemplatePattern,
    /// The scope the template parameter decls live in.
    pub scope: ScopeId,
    /// Parameter decls, in order.
    pub param_decls: Vec<DeclId>,
    /// For function templates: the pattern signature resolved against
    /// the template parameter scope (contains `TemplateParam` types).
    pub pattern_sig: Option<FunctionSig>,
    pub requires_clause: Option<Arc<ast::ConstraintExpr>>,
}

#[derive(Debug, Clone)]
pub struct ConceptDecl {
    pub params: Vec<String>,
    pub body: Arc<ast::ConstraintExpr>,
}
