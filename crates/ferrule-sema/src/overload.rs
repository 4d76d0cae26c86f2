//! Overload resolution.
//!
//! Candidates come from name lookup plus ADL. Function templates enter
//! the set through deduction: a candidate whose deduction fails, or
//! whose `requires` clause is unsatisfied, is removed silently (SFINAE).
//! The survivors are compared by their per-argument implicit conversion
//! sequences; ties break non-template over template, more-specialised
//! template over less, non-variadic over variadic.

use ferrule_ast::Span;

use crate::context::Context;
use crate::convert::{implicit_conversion, Rank};
use crate::decl::{DeclId, DeclKind, TemplatePattern};
use crate::error::{SemaError, SemaResult};
use crate::template;
use crate::types::{Type, TypeId};

/// Where a viable candidate came from.
#[derive(Debug, Clone)]
enum CandidateSource {
    Plain(DeclId),
    Template { template: DeclId, binding: Vec<TypeId> },
}

/// One viable candidate with its conversion sequence vector.
#[derive(Debug, Clone)]
struct Candidate {
    source: CandidateSource,
    ics: Vec<Rank>,
    is_template: bool,
    variadic: bool,
    /// Lower is more specialised; used for template tie-breaks.
    genericity: usize,
}

/// Resolve a call against a candidate set.
///
/// `arg_types` lists the argument types left to right (excluding any
/// implicit object argument; method signatures do not list `this`).
/// The winning template candidate is instantiated before returning, so
/// the result is always a concrete function decl.
pub fn resolve_call(
    ctx: &mut Context,
    name: &str,
    candidates: &[DeclId],
    explicit_targs: &[TypeId],
    arg_types: &[TypeId],
    span: Span,
) -> SemaResult<DeclId> {
    let mut viable: Vec<Candidate> = Vec::new();
    let mut rejected: Vec<String> = Vec::new();

    for &decl in candidates {
        // Pull what we need out of the decl arena up front; template
        // substitution below needs the context mutably.
        enum Raw {
            Function { sig: crate::decl::FunctionSig },
            FnTemplate { pattern_sig: crate::decl::FunctionSig, param_count: usize },
            Skip,
        }
        let raw = match &ctx.decl(decl).kind {
            DeclKind::Function(f) => match f.sig.clone() {
                Some(sig) => Raw::Function { sig },
                None => {
                    rejected.push(format!("candidate `{}` has no resolved signature", name));
                    Raw::Skip
                }
            },
            DeclKind::Template(t) if matches!(t.pattern, TemplatePattern::Function(_)) => {
                match t.pattern_sig.clone() {
                    Some(pattern_sig) => Raw::FnTemplate {
                        pattern_sig,
                        param_count: t.params.len(),
                    },
                    None => Raw::Skip,
                }
            }
            _ => Raw::Skip,
        };

        match raw {
            Raw::Skip => {}
            Raw::Function { sig } => {
                // Explicit template arguments rule out plain functions.
                if !explicit_targs.is_empty() {
                    continue;
                }
                match conversion_vector(ctx, &sig.params, sig.variadic, arg_types) {
                    Some(ics) => viable.push(Candidate {
                        source: CandidateSource::Plain(decl),
                        ics,
                        is_template: false,
                        variadic: sig.variadic,
                        genericity: 0,
                    }),
                    None => rejected.push(format!(
                        "candidate `{}` not viable for the given arguments",
                        ctx.qualified_name(decl)
                    )),
                }
            }
            Raw::FnTemplate { pattern_sig, param_count } => {
                let variadic = pattern_sig.variadic;

                // Deduction; a failure removes the candidate silently.
                let binding = match template::deduce(
                    ctx,
                    param_count,
                    &pattern_sig.params,
                    explicit_targs,
                    arg_types,
                ) {
                    Ok(b) => b,
                    Err(fail) => {
                        log::trace!("SFINAE: `{name}` removed ({})", fail.reason);
                        continue;
                    }
                };

                // Requires clause, evaluated after deduction and before
                // the candidate joins the viable set.
                match template::check_requires(ctx, decl, &binding, span) {
                    Ok(true) => {}
                    Ok(false) | Err(_) => {
                        log::trace!("SFINAE: `{name}` removed (constraint unsatisfied)");
                        continue;
                    }
                }

                let params: Vec<TypeId> = pattern_sig
                    .params
                    .iter()
                    .map(|&p| template::substitute_type(ctx, p, &binding))
                    .collect();
                match conversion_vector(ctx, &params, variadic, arg_types) {
                    Some(ics) => {
                        let genericity = genericity_of(ctx, &pattern_sig.params);
                        viable.push(Candidate {
                            source: CandidateSource::Template { template: decl, binding },
                            ics,
                            is_template: true,
                            variadic,
                            genericity,
                        });
                    }
                    None => rejected.push(format!(
                        "template candidate `{}` not viable after substitution",
                        ctx.qualified_name(decl)
                    )),
                }
            }
        }
    }

    if viable.is_empty() {
        return Err(SemaError::NoMatchingFunction {
            name: name.to_string(),
            span: span.into(),
            rejected,
        });
    }

    // Find the unique best candidate.
    let mut best = 0usize;
    for i in 1..viable.len() {
        if better(&viable[i], &viable[best]) {
            best = i;
        }
    }
    for (i, other) in viable.iter().enumerate() {
        if i != best && !better(&viable[best], other) {
            let candidates = viable
                .iter()
                .map(|c| describe_candidate(ctx, c))
                .collect();
            return Err(SemaError::AmbiguousOverload {
                name: name.to_string(),
                span: span.into(),
                candidates,
            });
        }
    }

    match viable.swap_remove(best).source {
        CandidateSource::Plain(decl) => Ok(decl),
        CandidateSource::Template { template, binding } => {
            template::instantiate_function(ctx, template, binding, span)
        }
    }
}

/// Compute the per-argument conversion vector, or `None` when some
/// argument has no implicit conversion to its parameter.
fn conversion_vector(
    ctx: &Context,
    params: &[TypeId],
    variadic: bool,
    args: &[TypeId],
) -> Option<Vec<Rank>> {
    if variadic {
        if args.len() < params.len() {
            return None;
        }
    } else if args.len() != params.len() {
        return None;
    }
    let mut ics = Vec::with_capacity(args.len());
    for (i, &arg) in args.iter().enumerate() {
        match params.get(i) {
            Some(&param) => ics.push(implicit_conversion(ctx, arg, param)?.rank),
            // Arguments matched against the ellipsis.
            None => ics.push(Rank::Ellipsis),
        }
    }
    Some(ics)
}

/// `a` is better than `b`: every argument conversion no worse and at
/// least one strictly better, with the standard tie-breaks after that.
fn better(a: &Candidate, b: &Candidate) -> bool {
    let mut a_not_worse = true;
    let mut a_strictly = false;
    let mut b_strictly = false;
    for (ra, rb) in a.ics.iter().zip(&b.ics) {
        if ra > rb {
            a_not_worse = false;
            b_strictly = true;
        } else if ra < rb {
            a_strictly = true;
        }
    }
    if a_not_worse && a_strictly {
        return true;
    }
    if b_strictly {
        return false;
    }
    // Conversion sequences are indistinguishable: tie-breaks.
    if a.is_template != b.is_template {
        return !a.is_template;
    }
    if a.is_template && a.genericity != b.genericity {
        return a.genericity < b.genericity;
    }
    if a.variadic != b.variadic {
        return !a.variadic;
    }
    false
}

/// How generic a template signature is: the number of template
/// parameter occurrences in its parameter list. A lower count means a
/// more specialised pattern.
fn genericity_of(ctx: &Context, pattern_params: &[TypeId]) -> usize {
    fn count(ctx: &Context, ty: TypeId) -> usize {
        match ctx.types.get(ty) {
            Type::TemplateParam { .. } => 1,
            Type::Pointer { pointee, .. } => count(ctx, *pointee),
            Type::Reference { referent, .. } => count(ctx, *referent),
            Type::Array { element, .. } => count(ctx, *element),
            Type::Function { params, ret, .. } => {
                params.iter().map(|&p| count(ctx, p)).sum::<usize>() + count(ctx, *ret)
            }
            _ => 0,
        }
    }
    pattern_params.iter().map(|&p| count(ctx, p)).sum()
}

fn describe_candidate(ctx: &Context, c: &Candidate) -> String {
    match &c.source {
        CandidateSource::Plain(decl) => ctx.qualified_name(*decl),
        CandidateSource::Template { template, binding } => {
            let args: Vec<String> = binding.iter().map(|&t| ctx.type_name(t)).collect();
            format!("{}<{}>", ctx.qualified_name(*template), args.join(", "))
        }
    }
}
