//! Implicit conversion sequences and the usual arithmetic conversions.
//!
//! Conversion ranks form a total order; a smaller rank is a better
//! conversion. Overload resolution compares per-argument sequences by
//! this order.

use crate::context::Context;
use crate::decl::{DeclKind, FunctionKind};
use crate::lookup;
use crate::types::{IntWidth, RefKind, Type, TypeId};

/// Rank of an implicit conversion sequence, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rank {
    Identity,
    /// Lvalue transformations: lvalue-to-rvalue, array-to-pointer decay.
    LValueToRValue,
    /// Qualification adjustment, `T*` to `const T*`.
    Qualification,
    /// Integral and floating promotions.
    Promotion,
    /// Remaining standard conversions (integral, floating, pointer).
    Conversion,
    /// Via a converting constructor.
    UserDefined,
    /// Matched a variadic ellipsis parameter.
    Ellipsis,
}

/// A computed implicit conversion sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ics {
    pub rank: Rank,
}

impl Ics {
    pub fn new(rank: Rank) -> Self {
        Self { rank }
    }
}

/// Compute the implicit conversion sequence from `from` to `to`, if one
/// exists.
pub fn implicit_conversion(ctx: &Context, from: TypeId, to: TypeId) -> Option<Ics> {
    if from == to {
        return Some(Ics::new(Rank::Identity));
    }
    let from_ty = ctx.types.get(from).clone();
    let to_ty = ctx.types.get(to).clone();

    match (&from_ty, &to_ty) {
        // Error types convert to anything; the error was already
        // reported, avoid cascades.
        (Type::Error, _) | (_, Type::Error) => Some(Ics::new(Rank::Identity)),

        // Reference binding.
        (_, Type::Reference { referent, kind, quals }) => {
            let stripped = ctx.types.strip_reference(from);
            if stripped == *referent {
                // T& / const T& from a T lvalue; adding const is a
                // qualification adjustment.
                let from_const = match ctx.types.get(from) {
                    Type::Reference { quals: fq, .. } => fq.is_const,
                    _ => false,
                };
                if from_const && !quals.is_const {
                    return None;
                }
                let rank = if quals.is_const && !from_const {
                    Rank::Qualification
                } else {
                    Rank::Identity
                };
                return Some(Ics::new(rank));
            }
            // A const lvalue reference binds to a convertible rvalue,
            // materialising a temporary.
            if *kind == RefKind::LValue && quals.is_const {
                return implicit_conversion(ctx, stripped, *referent)
                    .map(|inner| Ics::new(inner.rank.max(Rank::Conversion)));
            }
            // Derived& -> Base& binding.
            if let (Type::Class(fd), Type::Class(td)) =
                (ctx.types.get(stripped), ctx.types.get(*referent))
            {
                if lookup::derives_from(ctx, *fd, *td) {
                    return Some(Ics::new(Rank::Conversion));
                }
            }
            None
        }

        // Reading through a reference: T& -> T.
        (Type::Reference { referent, .. }, _) => {
            if *referent == to {
                return Some(Ics::new(Rank::LValueToRValue));
            }
            implicit_conversion(ctx, *referent, to)
                .map(|inner| Ics::new(inner.rank.max(Rank::LValueToRValue)))
        }

        // Array-to-pointer decay, applied at the call site.
        (Type::Array { element, .. }, Type::Pointer { pointee, quals }) => {
            if element == pointee || (quals.is_const && same_unqualified(ctx, *element, *pointee)) {
                Some(Ics::new(Rank::LValueToRValue))
            } else {
                None
            }
        }

        // Pointer conversions.
        (
            Type::Pointer { pointee: fp, quals: fq },
            Type::Pointer { pointee: tp, quals: tq },
        ) => {
            if fp == tp {
                // Qualification conversion only ever adds qualifiers.
                return tq.is_superset_of(*fq).then(|| Ics::new(Rank::Qualification));
            }
            // Derived* -> Base*.
            if let (Type::Class(fd), Type::Class(td)) = (ctx.types.get(*fp), ctx.types.get(*tp)) {
                if lookup::derives_from(ctx, *fd, *td) && tq.is_superset_of(*fq) {
                    return Some(Ics::new(Rank::Conversion));
                }
            }
            // T* -> void*.
            if matches!(ctx.types.get(*tp), Type::Void) && tq.is_superset_of(*fq) {
                return Some(Ics::new(Rank::Conversion));
            }
            None
        }

        // Arithmetic conversions.
        _ if from_ty.is_arithmetic() && to_ty.is_arithmetic() => {
            if is_promotion(&from_ty, &to_ty) {
                Some(Ics::new(Rank::Promotion))
            } else {
                Some(Ics::new(Rank::Conversion))
            }
        }

        // A converting constructor: class `to` with a single-parameter
        // constructor accepting `from`.
        (_, Type::Class(class)) => {
            let DeclKind::Class(c) = &ctx.decl(*class).kind else {
                return None;
            };
            for &ctor in &c.ctors {
                let DeclKind::Function(f) = &ctx.decl(ctor).kind else {
                    continue;
                };
                if f.kind != (FunctionKind::Constructor { class: *class }) {
                    continue;
                }
                let Some(sig) = &f.sig else { continue };
                if sig.params.len() != 1 {
                    continue;
                }
                let param = sig.params[0];
                if let Some(inner) = implicit_conversion(ctx, from, param) {
                    if inner.rank < Rank::UserDefined {
                        return Some(Ics::new(Rank::UserDefined));
                    }
                }
            }
            None
        }

        _ => None,
    }
}

fn same_unqualified(ctx: &Context, a: TypeId, b: TypeId) -> bool {
    a == b || ctx.types.strip_reference(a) == ctx.types.strip_reference(b)
}

/// Whether `from -> to` is an integral or floating promotion.
fn is_promotion(from: &Type, to: &Type) -> bool {
    match (from, to) {
        // bool/char/short (either signedness) promote to int.
        (Type::Bool, Type::Int { signed: true, width: IntWidth::W32 }) => true,
        (Type::Int { width, .. }, Type::Int { signed: true, width: IntWidth::W32 }) => {
            matches!(width, IntWidth::W8 | IntWidth::W16)
        }
        // Unscoped enums promote to int.
        (Type::Enum(_), Type::Int { signed: true, width: IntWidth::W32 }) => true,
        // float promotes to double.
        (
            Type::Float { width: crate::types::FloatWidth::W32 },
            Type::Float { width: crate::types::FloatWidth::W64 },
        ) => true,
        _ => false,
    }
}

/// Integral promotion: types below `int` rank promote to `int`.
pub fn promote(ctx: &Context, ty: TypeId) -> TypeId {
    let t = ctx.types.get(ty);
    match t {
        Type::Bool | Type::Enum(_) => ctx.types.common.int,
        Type::Int { width, .. } if matches!(width, IntWidth::W8 | IntWidth::W16) => {
            ctx.types.common.int
        }
        _ => ty,
    }
}

/// The usual arithmetic conversions: the common type two arithmetic
/// operands are brought to before a binary operation.
pub fn common_type(ctx: &Context, a: TypeId, b: TypeId) -> Option<TypeId> {
    let ta = ctx.types.get(a);
    let tb = ctx.types.get(b);
    if !ta.is_arithmetic() || !tb.is_arithmetic() {
        return None;
    }

    // Floating beats integral; wider floating beats narrower.
    let c = &ctx.types.common;
    if a == c.double || b == c.double {
        return Some(c.double);
    }
    if a == c.float || b == c.float {
        return Some(c.float);
    }

    // Integral: promote both, then unify by rank and signedness.
    let pa = promote(ctx, a);
    let pb = promote(ctx, b);
    if pa == pb {
        return Some(pa);
    }
    let (ra, sa) = rank_and_sign(ctx, pa)?;
    let (rb, sb) = rank_and_sign(ctx, pb)?;
    if sa == sb {
        return Some(if ra >= rb { pa } else { pb });
    }
    // Mixed signedness: the unsigned operand wins at equal or greater
    // rank, otherwise the (wider) signed operand represents both.
    let (unsigned_id, ru, signed_id, rs) = if sa { (pb, rb, pa, ra) } else { (pa, ra, pb, rb) };
    if ru >= rs {
        Some(unsigned_id)
    } else {
        Some(signed_id)
    }
}

fn rank_and_sign(ctx: &Context, ty: TypeId) -> Option<(u32, bool)> {
    let t = ctx.types.get(ty);
    Some((t.integer_rank()?, t.is_signed()))
}
