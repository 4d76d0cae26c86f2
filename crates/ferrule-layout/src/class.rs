//! The class layout algorithm.
//!
//! A class is laid out in one pass, in declaration order: non-virtual
//! base subobjects first (the primary polymorphic base at offset 0,
//! sharing its vtable pointer), then fields rounded up to their
//! alignment, then virtual bases placed once per most-derived type in
//! order of first appearance in a depth-first walk of the base
//! specifiers.

use rustc_hash::{FxHashMap, FxHashSet};

use ferrule_sema::decl::DeclKind;
use ferrule_sema::{Context, DeclId};

use crate::vtable::build_vtable;
use crate::{align_up, BaseSubobject, ClassLayout, FieldSlot, LayoutEngine, LayoutError, POINTER_SIZE};

pub(crate) fn compute_class_layout(
    engine: &mut LayoutEngine,
    ctx: &Context,
    class: DeclId,
) -> Result<ClassLayout, LayoutError> {
    let (bases, fields, is_polymorphic, is_complete) = match &ctx.decl(class).kind {
        DeclKind::Class(c) => (c.bases.clone(), c.fields.clone(), c.is_polymorphic, c.is_complete),
        _ => return Err(LayoutError::NoLayout(ctx.qualified_name(class))),
    };
    if !is_complete {
        return Err(LayoutError::IncompleteType(ctx.qualified_name(class)));
    }

    // Virtual bases, once each, in order of first appearance.
    let vbases = collect_virtual_bases(ctx, class)?;
    let has_vptr = is_polymorphic || !vbases.is_empty();

    // The primary base is the first direct non-virtual base that
    // carries a vtable pointer; it sits at offset 0 and shares ours.
    let mut primary = None;
    for b in bases.iter().filter(|b| !b.is_virtual) {
        let bl = engine.class_layout(ctx, b.class)?;
        if bl.has_vptr {
            primary = Some(b.class);
            break;
        }
    }

    let mut size = 0u64;
    let mut align = 1u64;
    if has_vptr && primary.is_none() {
        size = POINTER_SIZE;
        align = POINTER_SIZE;
    }

    // Non-virtual bases, the primary one first at offset 0.
    let mut base_subobjects: Vec<BaseSubobject> = Vec::new();
    for b in bases.iter().filter(|b| !b.is_virtual) {
        let bl = engine.class_layout(ctx, b.class)?;
        let offset = if Some(b.class) == primary {
            size = size.max(bl.nvsize);
            0
        } else {
            let at = align_up(size, bl.align);
            size = at + bl.nvsize;
            at
        };
        align = align.max(bl.align);
        base_subobjects.push(BaseSubobject {
            class: b.class,
            offset,
            is_virtual: false,
            is_direct: true,
        });
        // Indirect non-virtual bases keep their relative offsets.
        for sub in bl.bases.iter().filter(|s| !s.is_virtual) {
            base_subobjects.push(BaseSubobject {
                class: sub.class,
                offset: offset + sub.offset,
                is_virtual: false,
                is_direct: false,
            });
        }
    }

    // Embedded virtual-base offset cells, one per virtual base in
    // first-appearance order. The complete-object constructor fills
    // them with the actual offsets, so code with a less-derived static
    // type can reach a virtual base without knowing the dynamic type.
    let mut vbase_slots = Vec::with_capacity(vbases.len());
    for &vb in &vbases {
        let at = align_up(size, POINTER_SIZE);
        size = at + POINTER_SIZE;
        align = align.max(POINTER_SIZE);
        vbase_slots.push((vb, at));
    }

    // Fields, in declaration order.
    let mut field_slots = Vec::with_capacity(fields.len());
    for &field in &fields {
        let ty = ctx.var_type(field);
        let fl = engine.layout_of(ctx, ty)?;
        let offset = align_up(size, fl.align);
        size = offset + fl.size;
        align = align.max(fl.align);
        field_slots.push(FieldSlot { decl: field, ty, offset });
    }

    let nvsize = align_up(size, align);

    // Virtual bases, after non-virtual content, once per most-derived
    // type.
    let mut vbase_offsets = FxHashMap::default();
    let direct_virtual: FxHashSet<DeclId> =
        bases.iter().filter(|b| b.is_virtual).map(|b| b.class).collect();
    let mut vsize = nvsize;
    for &vb in &vbases {
        let bl = engine.class_layout(ctx, vb)?;
        let offset = align_up(vsize, bl.align);
        vsize = offset + bl.nvsize;
        align = align.max(bl.align);
        base_subobjects.push(BaseSubobject {
            class: vb,
            offset,
            is_virtual: true,
            is_direct: direct_virtual.contains(&vb),
        });
        vbase_offsets.insert(vb, offset);
    }

    let size = align_up(vsize, align).max(1);

    let mut layout = ClassLayout {
        class,
        size,
        nvsize: nvsize.max(if has_vptr { POINTER_SIZE } else { 1 }),
        align,
        fields: field_slots,
        bases: base_subobjects,
        vbase_offsets,
        vbase_slots,
        has_vptr,
        vtable: None,
    };
    if has_vptr {
        layout.vtable = Some(build_vtable(engine, ctx, class, primary, &layout)?);
    }
    Ok(layout)
}

/// Transitive virtual bases in order of first appearance in a
/// depth-first, left-to-right walk of the base specifiers.
fn collect_virtual_bases(ctx: &Context, class: DeclId) -> Result<Vec<DeclId>, LayoutError> {
    let mut out = Vec::new();
    let mut seen = FxHashSet::default();
    walk_virtual_bases(ctx, class, &mut seen, &mut out)?;
    Ok(out)
}

fn walk_virtual_bases(
    ctx: &Context,
    class: DeclId,
    seen: &mut FxHashSet<DeclId>,
    out: &mut Vec<DeclId>,
) -> Result<(), LayoutError> {
    let DeclKind::Class(c) = &ctx.decl(class).kind else {
        return Err(LayoutError::InvalidVirtualBase(ctx.qualified_name(class)));
    };
    for base in &c.bases {
        if !matches!(ctx.decl(base.class).kind, DeclKind::Class(_)) {
            return Err(LayoutError::InvalidVirtualBase(ctx.qualified_name(base.class)));
        }
        walk_virtual_bases(ctx, base.class, seen, out)?;
        if base.is_virtual && seen.insert(base.class) {
            out.push(base.class);
        }
    }
    Ok(())
}
