//! Canonical, hash-consed types.
//!
//! All types live in the per-translation-unit [`TypeInterner`]; a
//! [`TypeId`] is the canonical handle. Two types are semantically equal
//! iff their ids are equal. Canonicalisation collapses reference-to-
//! reference spellings and strips top-level cv qualification; alias
//! chains are collapsed when the syntactic type is resolved, so an
//! alias never reaches the interner.

use rustc_hash::FxHashMap;

use crate::decl::DeclId;

/// Canonical handle for a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Width of an integral type in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

impl IntWidth {
    pub fn bits(self) -> u32 {
        match self {
            IntWidth::W8 => 8,
            IntWidth::W16 => 16,
            IntWidth::W32 => 32,
            IntWidth::W64 => 64,
        }
    }

    pub fn bytes(self) -> u64 {
        (self.bits() / 8) as u64
    }
}

/// Width of a floating-point type in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FloatWidth {
    W32,
    W64,
}

/// cv-qualification attached at a pointer or reference boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Qualifiers {
    pub is_const: bool,
    pub is_volatile: bool,
}

impl Qualifiers {
    pub const NONE: Qualifiers = Qualifiers {
        is_const: false,
        is_volatile: false,
    };

    pub const CONST: Qualifiers = Qualifiers {
        is_const: true,
        is_volatile: false,
    };

    /// True if `self` is at least as qualified as `other`
    /// (a `const T*` can hold a `T*`, not vice versa).
    pub fn is_superset_of(self, other: Qualifiers) -> bool {
        (self.is_const || !other.is_const) && (self.is_volatile || !other.is_volatile)
    }
}

/// Lvalue vs rvalue reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    LValue,
    RValue,
}

/// A canonical type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Bool,
    Int {
        signed: bool,
        width: IntWidth,
    },
    Float {
        width: FloatWidth,
    },
    Pointer {
        pointee: TypeId,
        quals: Qualifiers,
    },
    Reference {
        referent: TypeId,
        kind: RefKind,
        quals: Qualifiers,
    },
    Array {
        element: TypeId,
        len: Option<u64>,
    },
    Function {
        params: Vec<TypeId>,
        ret: TypeId,
        variadic: bool,
    },
    Class(DeclId),
    Enum(DeclId),
    /// A not-yet-substituted template type parameter.
    TemplateParam {
        depth: u32,
        index: u32,
        name: String,
    },
    /// A name whose meaning depends on template parameters.
    DependentName(String),
    /// The type of an overloaded function name before resolution.
    OverloadSet(Vec<DeclId>),
    /// Stand-in after an error, to stop cascades.
    Error,
}

impl Type {
    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    /// bool, char, short, int, long long — signed or unsigned.
    pub fn is_integral(&self) -> bool {
        matches!(self, Type::Bool | Type::Int { .. } | Type::Enum(_))
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, Type::Float { .. })
    }

    pub fn is_arithmetic(&self) -> bool {
        self.is_integral() || self.is_floating()
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer { .. })
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Reference { .. })
    }

    pub fn is_class(&self) -> bool {
        matches!(self, Type::Class(_))
    }

    /// Arithmetic types, enums and pointers.
    pub fn is_scalar(&self) -> bool {
        self.is_arithmetic() || self.is_pointer()
    }

    pub fn is_signed(&self) -> bool {
        match self {
            Type::Int { signed, .. } => *signed,
            Type::Float { .. } => true,
            _ => false,
        }
    }

    /// True if the type mentions a template parameter or dependent name.
    pub fn is_dependent(&self, interner: &TypeInterner) -> bool {
        match self {
            Type::TemplateParam { .. } | Type::DependentName(_) => true,
            Type::Pointer { pointee, .. } => interner.get(*pointee).is_dependent(interner),
            Type::Reference { referent, .. } => interner.get(*referent).is_dependent(interner),
            Type::Array { element, .. } => interner.get(*element).is_dependent(interner),
            Type::Function { params, ret, .. } => {
                params.iter().any(|p| interner.get(*p).is_dependent(interner))
                    || interner.get(*ret).is_dependent(interner)
            }
            _ => false,
        }
    }

    /// Size and alignment of a non-class, non-array type in bytes.
    /// Class and array layout is the layout engine's business.
    pub fn scalar_size_align(&self) -> Option<(u64, u64)> {
        match self {
            Type::Bool => Some((1, 1)),
            Type::Int { width, .. } => Some((width.bytes(), width.bytes())),
            Type::Float { width: FloatWidth::W32 } => Some((4, 4)),
            Type::Float { width: FloatWidth::W64 } => Some((8, 8)),
            Type::Pointer { .. } | Type::Reference { .. } => Some((8, 8)),
            Type::Enum(_) => Some((4, 4)),
            _ => None,
        }
    }

    /// Conversion rank of an integral type for the usual arithmetic
    /// conversions. Bool ranks below char.
    pub fn integer_rank(&self) -> Option<u32> {
        match self {
            Type::Bool => Some(0),
            Type::Enum(_) => Some(3),
            Type::Int { width, .. } => Some(match width {
                IntWidth::W8 => 1,
                IntWidth::W16 => 2,
                IntWidth::W32 => 3,
                IntWidth::W64 => 4,
            }),
            _ => None,
        }
    }
}

/// Ids of the frequently needed primitives, interned once at startup.
#[derive(Debug, Clone, Copy)]
pub struct CommonTypes {
    pub void: TypeId,
    pub bool_: TypeId,
    pub char_: TypeId,
    pub uchar: TypeId,
    pub short: TypeId,
    pub ushort: TypeId,
    pub int: TypeId,
    pub uint: TypeId,
    pub long: TypeId,
    pub ulong: TypeId,
    pub float: TypeId,
    pub double: TypeId,
    pub error: TypeId,
}

/// The hash-consing type table for one translation unit.
#[derive(Debug)]
pub struct TypeInterner {
    list: Vec<Type>,
    map: FxHashMap<Type, TypeId>,
    pub common: CommonTypes,
}

impl TypeInterner {
    pub fn new() -> Self {
        let mut interner = TypeInterner {
            list: Vec::new(),
            map: FxHashMap::default(),
            // Placeholder, replaced below once the primitives exist.
            common: CommonTypes {
                void: TypeId(0),
                bool_: TypeId(0),
                char_: TypeId(0),
                uchar: TypeId(0),
                short: TypeId(0),
                ushort: TypeId(0),
                int: TypeId(0),
                uint: TypeId(0),
                long: TypeId(0),
                ulong: TypeId(0),
                float: TypeId(0),
                double: TypeId(0),
                error: TypeId(0),
            },
        };
        let int_ty = |signed, width| Type::Int { signed, width };
        interner.common = CommonTypes {
            void: interner.intern(Type::Void),
            bool_: interner.intern(Type::Bool),
            char_: interner.intern(int_ty(true, IntWidth::W8)),
            uchar: interner.intern(int_ty(false, IntWidth::W8)),
            short: interner.intern(int_ty(true, IntWidth::W16)),
            ushort: interner.intern(int_ty(false, IntWidth::W16)),
            int: interner.intern(int_ty(true, IntWidth::W32)),
            uint: interner.intern(int_ty(false, IntWidth::W32)),
            long: interner.intern(int_ty(true, IntWidth::W64)),
            ulong: interner.intern(int_ty(false, IntWidth::W64)),
            float: interner.intern(Type::Float { width: FloatWidth::W32 }),
            double: interner.intern(Type::Float { width: FloatWidth::W64 }),
            error: interner.intern(Type::Error),
        };
        interner
    }

    /// Intern a type, canonicalising as needed, and return its handle.
    pub fn intern(&mut self, ty: Type) -> TypeId {
        let ty = self.canonicalise(ty);
        if let Some(&id) = self.map.get(&ty) {
            return id;
        }
        let id = TypeId(self.list.len() as u32);
        self.list.push(ty.clone());
        self.map.insert(ty, id);
        id
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.list[id.index()]
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Normalise spellings that denote the same type.
    fn canonicalise(&self, ty: Type) -> Type {
        match ty {
            // Reference collapsing: && applied to & yields &.
            Type::Reference { referent, kind, quals } => {
                if let Type::Reference {
                    referent: inner,
                    kind: inner_kind,
                    quals: inner_quals,
                } = self.get(referent)
                {
                    let collapsed = if *inner_kind == RefKind::LValue || kind == RefKind::LValue {
                        RefKind::LValue
                    } else {
                        RefKind::RValue
                    };
                    Type::Reference {
                        referent: *inner,
                        kind: collapsed,
                        quals: Qualifiers {
                            is_const: quals.is_const || inner_quals.is_const,
                            is_volatile: quals.is_volatile || inner_quals.is_volatile,
                        },
                    }
                } else {
                    Type::Reference { referent, kind, quals }
                }
            }
            other => other,
        }
    }

    // Convenience constructors for composite types.

    pub fn pointer_to(&mut self, pointee: TypeId) -> TypeId {
        self.intern(Type::Pointer {
            pointee,
            quals: Qualifiers::NONE,
        })
    }

    pub fn pointer_to_const(&mut self, pointee: TypeId) -> TypeId {
        self.intern(Type::Pointer {
            pointee,
            quals: Qualifiers::CONST,
        })
    }

    pub fn lvalue_ref(&mut self, referent: TypeId) -> TypeId {
        self.intern(Type::Reference {
            referent,
            kind: RefKind::LValue,
            quals: Qualifiers::NONE,
        })
    }

    pub fn const_lvalue_ref(&mut self, referent: TypeId) -> TypeId {
        self.intern(Type::Reference {
            referent,
            kind: RefKind::LValue,
            quals: Qualifiers::CONST,
        })
    }

    pub fn rvalue_ref(&mut self, referent: TypeId) -> TypeId {
        self.intern(Type::Reference {
            referent,
            kind: RefKind::RValue,
            quals: Qualifiers::NONE,
        })
    }

    pub fn array_of(&mut self, element: TypeId, len: Option<u64>) -> TypeId {
        self.intern(Type::Array { element, len })
    }

    pub fn class(&mut self, decl: DeclId) -> TypeId {
        self.intern(Type::Class(decl))
    }

    /// Strip one level of reference, returning the referent.
    pub fn strip_reference(&self, id: TypeId) -> TypeId {
        match self.get(id) {
            Type::Reference { referent, .. } => *referent,
            _ => id,
        }
    }

    /// The class declaration behind a class type, looking through one
    /// level of reference or pointer.
    pub fn class_decl_of(&self, id: TypeId) -> Option<DeclId> {
        match self.get(id) {
            Type::Class(decl) => Some(*decl),
            Type::Reference { referent, .. } => self.class_decl_of(*referent),
            Type::Pointer { pointee, .. } => self.class_decl_of(*pointee),
            _ => None,
        }
    }
}

impl Default for TypeInterner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut interner = TypeInterner::new();
        let a = interner.intern(Type::Int {
            signed: true,
            width: IntWidth::W32,
        });
        let b = interner.intern(Type::Int {
            signed: true,
            width: IntWidth::W32,
        });
        assert_eq!(a, b);
        assert_eq!(a, interner.common.int);
    }

    #[test]
    fn distinct_types_get_distinct_ids() {
        let interner = TypeInterner::new();
        assert_ne!(interner.common.int, interner.common.uint);
        assert_ne!(interner.common.int, interner.common.long);
        assert_ne!(interner.common.float, interner.common.double);
    }

    #[test]
    fn composite_types_are_shared() {
        let mut interner = TypeInterner::new();
        let int = interner.common.int;
        let p1 = interner.pointer_to(int);
        let p2 = interner.pointer_to(int);
        assert_eq!(p1, p2);
        let pc = interner.pointer_to_const(int);
        assert_ne!(p1, pc);
    }

    #[test]
    fn reference_collapsing() {
        let mut interner = TypeInterner::new();
        let int = interner.common.int;
        let lref = interner.lvalue_ref(int);
        // && applied to & collapses to &.
        let rref_of_lref = interner.intern(Type::Reference {
            referent: lref,
            kind: RefKind::RValue,
            quals: Qualifiers::NONE,
        });
        assert_eq!(rref_of_lref, lref);
    }

    #[test]
    fn integer_ranks_order_widths() {
        let bool_ty = Type::Bool;
        let char_ty = Type::Int { signed: true, width: IntWidth::W8 };
        let int_ty = Type::Int { signed: true, width: IntWidth::W32 };
        let long_ty = Type::Int { signed: true, width: IntWidth::W64 };
        assert!(bool_ty.integer_rank() < char_ty.integer_rank());
        assert!(char_ty.integer_rank() < int_ty.integer_rank());
        assert!(int_ty.integer_rank() < long_ty.integer_rank());
    }
}
