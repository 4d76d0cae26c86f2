//! The scope tree.
//!
//! Scopes form a tree rooted at the global namespace. Each scope maps
//! names to sets of declarations (C++ names are multi-valued because of
//! overloading) and records the `using` directives active inside it.

use rustc_hash::FxHashMap;

use crate::decl::DeclId;

/// Handle for a scope in the context's scope arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

impl ScopeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Namespace,
    Class,
    Function,
    Block,
    /// Holds template parameters (and their instantiation aliases).
    TemplateParams,
}

/// A layered name → decl-set container.
#[derive(Debug, Clone)]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    /// The decl owning this scope (namespace, class, function), if any.
    pub owner: Option<DeclId>,
    bindings: FxHashMap<String, Vec<DeclId>>,
    /// Target scopes of `using namespace` directives written here.
    pub using_directives: Vec<ScopeId>,
}

impl Scope {
    pub fn new(id: ScopeId, kind: ScopeKind, parent: Option<ScopeId>, owner: Option<DeclId>) -> Self {
        Self {
            id,
            kind,
            parent,
            owner,
            bindings: FxHashMap::default(),
            using_directives: Vec::new(),
        }
    }

    /// Add a binding. Multiple decls may share a name (overload sets);
    /// duplicates of the same decl are dropped.
    pub fn bind(&mut self, name: impl Into<String>, decl: DeclId) {
        let set = self.bindings.entry(name.into()).or_default();
        if !set.contains(&decl) {
            set.push(decl);
        }
    }

    /// The decls bound directly in this scope under `name`.
    pub fn get(&self, name: &str) -> &[DeclId] {
        self.bindings.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn add_using_directive(&mut self, target: ScopeId) {
        if !self.using_directives.contains(&target) {
            self.using_directives.push(target);
        }
    }

    /// Iterate all bindings, for exhaustive walks (mangled-name index).
    pub fn bindings(&self) -> impl Iterator<Item = (&String, &Vec<DeclId>)> {
        self.bindings.iter()
    }
}
