//! Memory layout of C++ classes, including virtual-base placement and
//! vtable construction.
//!
//! The [`LayoutEngine`] memoises one [`ClassLayout`] per class: the
//! layout is computed at most once, on first materialisation, and
//! subsequent queries return the shared result. An in-progress set
//! turns base-class cycles into [`LayoutError::CircularBase`] instead
//! of infinite recursion.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use ferrule_sema::decl::DeclKind;
use ferrule_sema::{Context, DeclId, Type, TypeId};

mod class;
mod vtable;

pub use vtable::{VTable, VTableEntry, VTableGroup};

/// Pointer size and alignment of the target, in bytes.
pub const POINTER_SIZE: u64 = 8;

/// Errors during layout computation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("circular base class chain involving `{0}`")]
    CircularBase(String),

    #[error("invalid virtual base `{0}`")]
    InvalidVirtualBase(String),

    #[error("incomplete type `{0}` has no layout")]
    IncompleteType(String),

    #[error("type `{0}` has no object layout")]
    NoLayout(String),

    #[error("`{base}` is not a base subobject of `{derived}`")]
    NotABase { derived: String, base: String },
}

/// Size and alignment of a complete object, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub size: u64,
    pub align: u64,
}

/// A non-static data member with its resolved offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSlot {
    pub decl: DeclId,
    pub ty: TypeId,
    pub offset: u64,
}

/// One base-class subobject within a most-derived object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseSubobject {
    pub class: DeclId,
    /// Offset of the subobject in the most-derived object.
    pub offset: u64,
    pub is_virtual: bool,
    pub is_direct: bool,
}

/// The complete layout of one class, computed lazily and shared.
#[derive(Debug, Clone)]
pub struct ClassLayout {
    pub class: DeclId,
    /// Complete-object size (virtual bases included), at least 1.
    pub size: u64,
    /// Size excluding virtual bases; base subobjects occupy this much.
    pub nvsize: u64,
    pub align: u64,
    pub fields: Vec<FieldSlot>,
    /// Every base subobject, direct and indirect, with its offset.
    pub bases: Vec<BaseSubobject>,
    /// Offsets of virtual bases within this most-derived type. The
    /// complete-object constructor consults this table and embeds the
    /// offsets into the object's [`ClassLayout::vbase_slots`] cells.
    pub vbase_offsets: FxHashMap<DeclId, u64>,
    /// Hidden per-object cells, one per virtual base in first-appearance
    /// order: `(virtual base, cell offset within this class's
    /// non-virtual region)`. Each cell holds the byte distance from the
    /// subobject owning the cell to the virtual base in the actual
    /// complete object, written at construction time.
    pub vbase_slots: Vec<(DeclId, u64)>,
    /// True when objects carry a vtable pointer at offset 0.
    pub has_vptr: bool,
    pub vtable: Option<VTable>,
}

impl ClassLayout {
    /// Offset of the unique subobject of `class` within this layout,
    /// `0` for the class itself. Only valid when this layout's class is
    /// the most-derived type of the object; use
    /// [`LayoutEngine::base_path`] everywhere else.
    pub fn offset_of_base(&self, class: DeclId) -> Option<u64> {
        if class == self.class {
            return Some(0);
        }
        self.bases.iter().find(|b| b.class == class).map(|b| b.offset)
    }

    /// The field slot for a member decl.
    pub fn field(&self, decl: DeclId) -> Option<&FieldSlot> {
        self.fields.iter().find(|f| f.decl == decl)
    }

    /// The embedded offset cell for a virtual base, if this class has
    /// one.
    pub fn vbase_slot(&self, vbase: DeclId) -> Option<u64> {
        self.vbase_slots
            .iter()
            .find(|(v, _)| *v == vbase)
            .map(|(_, offset)| *offset)
    }
}

/// How a base subobject is reached from a pointer of a given static
/// class, independent of the object's dynamic type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasePath {
    /// The classes are the same.
    Identity,
    /// Reached through non-virtual inheritance only; the offset is the
    /// same in every embedding context.
    NonVirtual(u64),
    /// Crosses a virtual inheritance edge: read the embedded offset
    /// cell at `slot_offset`, add the loaded value, then the fixed
    /// `rest` within the virtual base's non-virtual region.
    Virtual {
        vbase: DeclId,
        slot_offset: u64,
        rest: u64,
    },
}

/// Computes and memoises class layouts for one translation unit.
#[derive(Debug, Default)]
pub struct LayoutEngine {
    cache: FxHashMap<DeclId, Arc<ClassLayout>>,
    in_progress: FxHashSet<DeclId>,
}

impl LayoutEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size and alignment of any object type. Class layout is computed
    /// (and cached) on demand; scalar types answer directly.
    pub fn layout_of(&mut self, ctx: &Context, ty: TypeId) -> Result<Layout, LayoutError> {
        match ctx.types.get(ty).clone() {
            Type::Class(decl) => {
                let l = self.class_layout(ctx, decl)?;
                Ok(Layout { size: l.size, align: l.align })
            }
            Type::Array { element, len } => {
                let elem = self.layout_of(ctx, element)?;
                let stride = align_up(elem.size, elem.align);
                let count = len.unwrap_or(0);
                Ok(Layout { size: stride * count, align: elem.align })
            }
            // Stop error cascades: a poisoned type is zero-sized.
            Type::Error => Ok(Layout { size: 0, align: 1 }),
            other => match other.scalar_size_align() {
                Some((size, align)) => Ok(Layout { size, align }),
                None => Err(LayoutError::NoLayout(ctx.type_name(ty))),
            },
        }
    }

    /// The memoised layout of a class. Computed at most once; repeated
    /// queries return the identical shared result.
    pub fn class_layout(
        &mut self,
        ctx: &Context,
        class: DeclId,
    ) -> Result<Arc<ClassLayout>, LayoutError> {
        if let Some(found) = self.cache.get(&class) {
            return Ok(found.clone());
        }
        if !self.in_progress.insert(class) {
            return Err(LayoutError::CircularBase(ctx.qualified_name(class)));
        }
        let result = class::compute_class_layout(self, ctx, class);
        self.in_progress.remove(&class);
        let layout = Arc::new(result?);
        log::debug!(
            "layout `{}`: size {} align {} ({} field(s), {} base(s))",
            ctx.qualified_name(class),
            layout.size,
            layout.align,
            layout.fields.len(),
            layout.bases.len()
        );
        self.cache.insert(class, layout.clone());
        Ok(layout)
    }

    /// `sizeof` for expression lowering; same as [`layout_of`] size.
    pub fn size_of(&mut self, ctx: &Context, ty: TypeId) -> Result<u64, LayoutError> {
        Ok(self.layout_of(ctx, ty)?.size)
    }

    /// How a pointer of static class `from` reaches the `to` base
    /// subobject. Non-virtual chains have context-independent offsets;
    /// a path crossing a virtual edge must go through the object's
    /// embedded offset cell, because the virtual base's position
    /// depends on the dynamic type.
    pub fn base_path(
        &mut self,
        ctx: &Context,
        from: DeclId,
        to: DeclId,
    ) -> Result<BasePath, LayoutError> {
        if from == to {
            return Ok(BasePath::Identity);
        }
        let from_layout = self.class_layout(ctx, from)?;
        if let Some(b) = from_layout.bases.iter().find(|b| !b.is_virtual && b.class == to) {
            return Ok(BasePath::NonVirtual(b.offset));
        }
        let slots = from_layout.vbase_slots.clone();
        for (vbase, slot_offset) in slots {
            if vbase == to {
                return Ok(BasePath::Virtual { vbase, slot_offset, rest: 0 });
            }
            let vbase_layout = self.class_layout(ctx, vbase)?;
            if let Some(b) = vbase_layout.bases.iter().find(|b| !b.is_virtual && b.class == to) {
                return Ok(BasePath::Virtual { vbase, slot_offset, rest: b.offset });
            }
        }
        Err(LayoutError::NotABase {
            derived: ctx.qualified_name(from),
            base: ctx.qualified_name(to),
        })
    }
}

/// Round `offset` up to `align` (a power of two or 1).
pub(crate) fn align_up(offset: u64, align: u64) -> u64 {
    if align <= 1 {
        return offset;
    }
    (offset + align - 1) / align * align
}

/// Whether a class (or one of its bases/fields) declares a destructor,
/// making destruction non-trivial.
pub(crate) fn has_nontrivial_dtor(ctx: &Context, class: DeclId) -> bool {
    let DeclKind::Class(c) = &ctx.decl(class).kind else {
        return false;
    };
    if c.dtor.is_some() {
        return true;
    }
    if c.bases.iter().any(|b| has_nontrivial_dtor(ctx, b.class)) {
        return true;
    }
    c.fields.iter().any(|&f| match ctx.types.get(ctx.var_type(f)) {
        Type::Class(d) => has_nontrivial_dtor(ctx, *d),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_alignment() {
        assert_eq!(align_up(0, 4), 0);
        assert_eq!(align_up(1, 4), 4);
        assert_eq!(align_up(4, 4), 4);
        assert_eq!(align_up(5, 8), 8);
        assert_eq!(align_up(7, 1), 7);
    }

    #[test]
    fn scalar_layouts() {
        let mut engine = LayoutEngine::new();
        let ctx = Context::new();
        let c = ctx.types.common;
        assert_eq!(engine.layout_of(&ctx, c.int), Ok(Layout { size: 4, align: 4 }));
        assert_eq!(engine.layout_of(&ctx, c.char_), Ok(Layout { size: 1, align: 1 }));
        assert_eq!(engine.layout_of(&ctx, c.double), Ok(Layout { size: 8, align: 8 }));
        assert!(engine.layout_of(&ctx, c.void).is_err());
    }

    #[test]
    fn array_layout_scales_by_stride() {
        let mut engine = LayoutEngine::new();
        let mut ctx = Context::new();
        let int = ctx.types.common.int;
        let arr = ctx.types.array_of(int, Some(5));
        assert_eq!(engine.layout_of(&ctx, arr), Ok(Layout { size: 20, align: 4 }));
    }
}
