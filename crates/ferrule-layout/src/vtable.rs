//! Vtable construction.
//!
//! Every polymorphic class gets one vtable made of one or more groups:
//! the primary group (shared with the primary base chain, slot-ordered
//! by first declaration in that hierarchy), one secondary group per
//! non-primary polymorphic base subobject, and one group per
//! polymorphic virtual base. Entry 0 of each group is the RTTI entry;
//! method slots follow in declaration order.
//!
//! A method entry's adjustor is the byte offset subtracted from the
//! interface `this` pointer to recover the object pointer the target
//! implementation expects. Within the primary group the adjustor is 0;
//! in secondary and virtual-base groups an override by the most-derived
//! class carries that group's subobject offset.

use rustc_hash::FxHashMap;

use ferrule_sema::decl::{DeclKind, FunctionKind};
use ferrule_sema::lookup;
use ferrule_sema::{Context, DeclId, Type};

use crate::{has_nontrivial_dtor, ClassLayout, LayoutEngine, LayoutError};

/// One vtable entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VTableEntry {
    /// Dispatch to `target`, after subtracting `adjustor` from `this`.
    Method { target: DeclId, adjustor: u64 },
    /// A pure virtual slot; `decl` identifies the declaration so
    /// overrides can replace it.
    Pure { decl: DeclId },
    /// Type information for the dynamic type.
    Rtti,
}

/// One group of slots, serving one base interface of the object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VTableGroup {
    /// The interface class this group serves; the class itself for the
    /// primary group.
    pub base: DeclId,
    /// Offset of the served subobject in the most-derived object.
    pub offset: u64,
    pub entries: Vec<VTableEntry>,
}

/// The vtable of one polymorphic class.
#[derive(Debug, Clone)]
pub struct VTable {
    pub class: DeclId,
    pub groups: Vec<VTableGroup>,
    /// Method decl (any declaration level) to its `(group, slot)`.
    /// The primary group wins when a method appears in several groups.
    pub slot_map: FxHashMap<DeclId, (usize, usize)>,
}

impl VTable {
    /// Dispatch info for a call site whose receiver's static type is
    /// this vtable's class: the `(group, slot)` serving the method. The
    /// caller derives the receiver adjustment from the group — a fixed
    /// offset for non-virtual interfaces, the embedded offset cell for
    /// virtual-base interfaces.
    pub fn dispatch(&self, method: DeclId) -> Option<(usize, usize)> {
        self.slot_map.get(&method).copied()
    }
}

pub(crate) fn build_vtable(
    engine: &mut LayoutEngine,
    ctx: &Context,
    class: DeclId,
    primary: Option<DeclId>,
    layout: &ClassLayout,
) -> Result<VTable, LayoutError> {
    let (methods, dtor) = match &ctx.decl(class).kind {
        DeclKind::Class(c) => (c.methods.clone(), c.dtor),
        _ => return Err(LayoutError::NoLayout(ctx.qualified_name(class))),
    };

    let mut groups = Vec::new();

    // Primary group: inherit the primary base's slots, override, then
    // append new virtuals in declaration order.
    let mut entries = match primary {
        Some(p) => {
            let bl = engine.class_layout(ctx, p)?;
            primary_entries(&bl)
        }
        None => vec![VTableEntry::Rtti],
    };
    apply_own_overrides(ctx, class, &mut entries);
    for &m in &methods {
        if is_virtual_method(ctx, m) && !contains_slot_for(&entries, m) {
            entries.push(new_entry(ctx, m));
        }
    }
    if let Some(dt) = dtor {
        let inherited_slot = contains_slot_for(&entries, dt);
        let needs_slot = is_virtual_method(ctx, dt) || bases_or_fields_nontrivial(ctx, class);
        if !inherited_slot && needs_slot {
            entries.push(VTableEntry::Method { target: dt, adjustor: 0 });
        }
    }
    groups.push(VTableGroup { base: class, offset: 0, entries });

    // Secondary groups for non-primary polymorphic direct bases, and
    // one group per polymorphic virtual base.
    for sub in &layout.bases {
        if !sub.is_direct && !sub.is_virtual {
            continue;
        }
        if !sub.is_virtual && Some(sub.class) == primary {
            continue;
        }
        let bl = engine.class_layout(ctx, sub.class)?;
        if !bl.has_vptr {
            continue;
        }
        let mut entries = primary_entries(&bl);
        retarget_for_most_derived(ctx, class, layout, sub.offset, &mut entries);
        groups.push(VTableGroup { base: sub.class, offset: sub.offset, entries });
    }

    // Slot map, primary group first so it wins shared methods.
    let mut slot_map = FxHashMap::default();
    for (g, group) in groups.iter().enumerate() {
        for (s, entry) in group.entries.iter().enumerate() {
            let decl = match entry {
                VTableEntry::Method { target, .. } => *target,
                VTableEntry::Pure { decl } => *decl,
                VTableEntry::Rtti => continue,
            };
            slot_map.entry(decl).or_insert((g, s));
        }
    }

    Ok(VTable { class, groups, slot_map })
}

/// A copy of a class's primary group, with a fresh RTTI slot.
fn primary_entries(layout: &ClassLayout) -> Vec<VTableEntry> {
    layout
        .vtable
        .as_ref()
        .map(|vt| vt.groups[0].entries.clone())
        .unwrap_or_else(|| vec![VTableEntry::Rtti])
}

/// Replace inherited slots whose signature the class overrides.
fn apply_own_overrides(ctx: &Context, class: DeclId, entries: &mut [VTableEntry]) {
    for entry in entries.iter_mut() {
        let inherited = match entry {
            VTableEntry::Method { target, .. } => *target,
            VTableEntry::Pure { decl } => *decl,
            VTableEntry::Rtti => continue,
        };
        if let Some(own) = own_override_of(ctx, class, inherited) {
            *entry = new_entry_with_adjustor(ctx, own, 0);
        }
    }
}

/// Retarget an interface group's entries at the most-derived class's
/// final overriders, computing their adjustors from the subobject
/// offset.
fn retarget_for_most_derived(
    ctx: &Context,
    class: DeclId,
    layout: &ClassLayout,
    group_offset: u64,
    entries: &mut [VTableEntry],
) {
    for entry in entries.iter_mut() {
        let inherited = match entry {
            VTableEntry::Method { target, .. } => *target,
            VTableEntry::Pure { decl } => *decl,
            VTableEntry::Rtti => continue,
        };
        let Some(overrider) = final_overrider(ctx, class, inherited) else {
            continue;
        };
        if overrider == inherited {
            continue;
        }
        let overrider_class = declaring_class(ctx, overrider);
        let overrider_offset = overrider_class
            .and_then(|c| layout.offset_of_base(c))
            .unwrap_or(0);
        let adjustor = group_offset.saturating_sub(overrider_offset);
        *entry = new_entry_with_adjustor(ctx, overrider, adjustor);
    }
}

fn new_entry(ctx: &Context, method: DeclId) -> VTableEntry {
    new_entry_with_adjustor(ctx, method, 0)
}

fn new_entry_with_adjustor(ctx: &Context, method: DeclId, adjustor: u64) -> VTableEntry {
    if let DeclKind::Function(f) = &ctx.decl(method).kind {
        if let FunctionKind::Method { is_pure: true, .. } = f.kind {
            return VTableEntry::Pure { decl: method };
        }
    }
    VTableEntry::Method { target: method, adjustor }
}

fn is_virtual_method(ctx: &Context, decl: DeclId) -> bool {
    match &ctx.decl(decl).kind {
        DeclKind::Function(f) => f.kind.is_virtual(),
        _ => false,
    }
}

fn contains_slot_for(entries: &[VTableEntry], method: DeclId) -> bool {
    entries.iter().any(|e| match e {
        VTableEntry::Method { target, .. } => *target == method,
        VTableEntry::Pure { decl } => *decl == method,
        VTableEntry::Rtti => false,
    })
}

/// The class a method is declared in.
fn declaring_class(ctx: &Context, method: DeclId) -> Option<DeclId> {
    match &ctx.decl(method).kind {
        DeclKind::Function(f) => f.kind.class(),
        _ => None,
    }
}

/// Search the class's own members for an override of `inherited`.
fn own_override_of(ctx: &Context, class: DeclId, inherited: DeclId) -> Option<DeclId> {
    let DeclKind::Class(c) = &ctx.decl(class).kind else {
        return None;
    };
    if is_destructor(ctx, inherited) {
        return c.dtor;
    }
    c.methods
        .iter()
        .copied()
        .find(|&m| overrides(ctx, inherited, m))
}

/// The most-derived override of `inherited` visible from `class`:
/// the class's own match, else the first match found in a depth-first
/// walk of the direct bases.
fn final_overrider(ctx: &Context, class: DeclId, inherited: DeclId) -> Option<DeclId> {
    if let Some(own) = own_override_of(ctx, class, inherited) {
        return Some(own);
    }
    let DeclKind::Class(c) = &ctx.decl(class).kind else {
        return None;
    };
    for base in &c.bases {
        if let Some(found) = final_overrider(ctx, base.class, inherited) {
            return Some(found);
        }
    }
    None
}

/// Whether any base or (by-value) field brings a non-trivial
/// destructor, forcing a destructor slot in the vtable.
fn bases_or_fields_nontrivial(ctx: &Context, class: DeclId) -> bool {
    let DeclKind::Class(c) = &ctx.decl(class).kind else {
        return false;
    };
    if c.bases.iter().any(|b| has_nontrivial_dtor(ctx, b.class)) {
        return true;
    }
    c.fields.iter().any(|&f| match ctx.types.get(ctx.var_type(f)) {
        Type::Class(d) => has_nontrivial_dtor(ctx, *d),
        _ => false,
    })
}

fn is_destructor(ctx: &Context, decl: DeclId) -> bool {
    matches!(
        &ctx.decl(decl).kind,
        DeclKind::Function(f) if matches!(f.kind, FunctionKind::Destructor { .. })
    )
}

/// Whether `derived_m` overrides `base_m`: same name, same parameter
/// types, covariant return type.
fn overrides(ctx: &Context, base_m: DeclId, derived_m: DeclId) -> bool {
    if is_destructor(ctx, base_m) || is_destructor(ctx, derived_m) {
        return is_destructor(ctx, base_m) && is_destructor(ctx, derived_m);
    }
    if ctx.decl(base_m).name != ctx.decl(derived_m).name {
        return false;
    }
    let (Some(base_sig), Some(derived_sig)) =
        (ctx.function_sig(base_m), ctx.function_sig(derived_m))
    else {
        return false;
    };
    if base_sig.params != derived_sig.params {
        return false;
    }
    covariant_return_ok(ctx, base_sig.ret, derived_sig.ret)
}

/// Return types must match, or both be pointers/references to classes
/// where the derived return type derives from the base's.
fn covariant_return_ok(
    ctx: &Context,
    base_ret: ferrule_sema::TypeId,
    derived_ret: ferrule_sema::TypeId,
) -> bool {
    if base_ret == derived_ret {
        return true;
    }
    let class_of = |ty| match ctx.types.get(ty) {
        Type::Pointer { pointee, .. } => match ctx.types.get(*pointee) {
            Type::Class(d) => Some(*d),
            _ => None,
        },
        Type::Reference { referent, .. } => match ctx.types.get(*referent) {
            Type::Class(d) => Some(*d),
            _ => None,
        },
        _ => None,
    };
    match (class_of(base_ret), class_of(derived_ret)) {
        (Some(base_class), Some(derived_class)) => {
            base_class == derived_class || lookup::derives_from(ctx, derived_class, base_class)
        }
        _ => false,
    }
}
