//! Template deduction, constraint checking, instantiation sharing and
//! overload interaction.

use ferrule_ast::{
    BuiltinType, ConceptDef, ConstraintExpr, FunctionDef, Ident, Item, ItemKind, Param, Span,
    TemplateDef, TemplateParam, TraitFn, TranslationUnit, TypeExpr,
};
use ferrule_sema::declare::declare_translation_unit;
use ferrule_sema::{lookup, overload, template, Context, DeclId, DeclKind, SemaError, TypeId};

fn int_expr() -> TypeExpr {
    TypeExpr::builtin(BuiltinType::int())
}

fn twice_items() -> Vec<Item> {
    // concept Integral = __is_integral(T);
    // template<typename T> requires Integral<T> T twice(T x);
    let concept = Item::synth(ItemKind::Concept(ConceptDef {
        name: Ident::new("Integral", Span::default()),
        params: vec!["T".to_string()],
        body: ConstraintExpr::Trait {
            func: TraitFn::IsIntegral,
            arg: TypeExpr::named("T"),
        },
    }));
    let mut def = FunctionDef::new(
        "twice",
        vec![Param::new("x", TypeExpr::named("T"))],
        TypeExpr::named("T"),
    );
    def.requires_clause = Some(ConstraintExpr::ConceptRef {
        name: "Integral".to_string(),
        args: vec![TypeExpr::named("T")],
    });
    let template = Item::synth(ItemKind::Template(TemplateDef {
        params: vec![TemplateParam::Type { name: "T".to_string() }],
        entity: Box::new(Item::synth(ItemKind::Function(def))),
    }));
    vec![concept, template]
}

fn analyse(items: Vec<Item>) -> Context {
    let mut ctx = Context::new();
    declare_translation_unit(&mut ctx, &TranslationUnit::new(items));
    assert!(!ctx.diags.has_errors(), "unexpected diagnostics: {:?}", ctx.diags.diags());
    ctx
}

fn template_decl(ctx: &Context, name: &str) -> DeclId {
    let found = lookup::unqualified(ctx, ctx.global_scope, name, Span::default()).unwrap();
    found
        .into_iter()
        .find(|&d| matches!(ctx.decl(d).kind, DeclKind::Template(_)))
        .unwrap_or_else(|| panic!("no template `{name}`"))
}

#[test]
fn deduction_binds_the_parameter_from_the_argument() {
    let mut ctx = analyse(twice_items());
    let tmpl = template_decl(&ctx, "twice");
    let int = ctx.types.common.int;
    let winner =
        overload::resolve_call(&mut ctx, "twice", &[tmpl], &[], &[int], Span::default()).unwrap();
    let sig = ctx.function_sig(winner).expect("instantiated signature");
    assert_eq!(sig.params, vec![int]);
    assert_eq!(sig.ret, int);
}

#[test]
fn failed_constraint_removes_the_candidate() {
    let mut ctx = analyse(twice_items());
    let tmpl = template_decl(&ctx, "twice");
    let double = ctx.types.common.double;
    let result =
        overload::resolve_call(&mut ctx, "twice", &[tmpl], &[], &[double], Span::default());
    assert!(matches!(result, Err(SemaError::NoMatchingFunction { .. })));
}

#[test]
fn instantiation_is_memoised() {
    let mut ctx = analyse(twice_items());
    let tmpl = template_decl(&ctx, "twice");
    let int = ctx.types.common.int;
    let first = template::instantiate_function(&mut ctx, tmpl, vec![int], Span::default()).unwrap();
    let second =
        template::instantiate_function(&mut ctx, tmpl, vec![int], Span::default()).unwrap();
    assert_eq!(first, second, "identical (template, binding) share one decl");

    let long = ctx.types.common.long;
    let other = template::instantiate_function(&mut ctx, tmpl, vec![long], Span::default()).unwrap();
    assert_ne!(first, other);
}

#[test]
fn explicit_arguments_override_deduction() {
    let mut ctx = analyse(twice_items());
    let tmpl = template_decl(&ctx, "twice");
    let (int, long) = (ctx.types.common.int, ctx.types.common.long);
    // twice<long>(3): T is long despite the int argument.
    let winner = overload::resolve_call(&mut ctx, "twice", &[tmpl], &[long], &[int], Span::default())
        .unwrap();
    let sig = ctx.function_sig(winner).expect("instantiated signature");
    assert_eq!(sig.params, vec![long]);
}

#[test]
fn deduction_conflict_fails() {
    // template<typename T> T pick(T a, T b);  pick(1, 2.0) conflicts.
    let def = FunctionDef::new(
        "pick",
        vec![
            Param::new("a", TypeExpr::named("T")),
            Param::new("b", TypeExpr::named("T")),
        ],
        TypeExpr::named("T"),
    );
    let template = Item::synth(ItemKind::Template(TemplateDef {
        params: vec![TemplateParam::Type { name: "T".to_string() }],
        entity: Box::new(Item::synth(ItemKind::Function(def))),
    }));
    let mut ctx = analyse(vec![template]);
    let tmpl = template_decl(&ctx, "pick");
    let (int, double) = (ctx.types.common.int, ctx.types.common.double);
    let result =
        overload::resolve_call(&mut ctx, "pick", &[tmpl], &[], &[int, double], Span::default());
    assert!(matches!(result, Err(SemaError::NoMatchingFunction { .. })));
    let ok = overload::resolve_call(&mut ctx, "pick", &[tmpl], &[], &[int, int], Span::default());
    assert!(ok.is_ok());
}

#[test]
fn pointer_parameters_deduce_the_pointee() {
    // template<typename T> int process(T* p);
    let def = FunctionDef::new(
        "process",
        vec![Param::new("p", TypeExpr::named("T").ptr())],
        int_expr(),
    );
    let template = Item::synth(ItemKind::Template(TemplateDef {
        params: vec![TemplateParam::Type { name: "T".to_string() }],
        entity: Box::new(Item::synth(ItemKind::Function(def))),
    }));
    let mut ctx = analyse(vec![template]);
    let tmpl = template_decl(&ctx, "process");
    let int = ctx.types.common.int;
    let int_ptr = ctx.types.pointer_to(int);
    let winner =
        overload::resolve_call(&mut ctx, "process", &[tmpl], &[], &[int_ptr], Span::default())
            .unwrap();
    let sig = ctx.function_sig(winner).expect("instantiated signature");
    assert_eq!(sig.params, vec![int_ptr]);

    // A non-pointer argument fails deduction silently.
    let result =
        overload::resolve_call(&mut ctx, "process", &[tmpl], &[], &[int], Span::default());
    assert!(matches!(result, Err(SemaError::NoMatchingFunction { .. })));
}

#[test]
fn const_reference_parameters_deduce_the_referent() {
    // template<typename T> T identity(const T& x);
    let def = FunctionDef::new(
        "identity",
        vec![Param::new("x", TypeExpr::named("T").const_reference())],
        TypeExpr::named("T"),
    );
    let template = Item::synth(ItemKind::Template(TemplateDef {
        params: vec![TemplateParam::Type { name: "T".to_string() }],
        entity: Box::new(Item::synth(ItemKind::Function(def))),
    }));
    let mut ctx = analyse(vec![template]);
    let tmpl = template_decl(&ctx, "identity");
    let int = ctx.types.common.int;
    let winner =
        overload::resolve_call(&mut ctx, "identity", &[tmpl], &[], &[int], Span::default())
            .unwrap();
    let sig = ctx.function_sig(winner).expect("instantiated signature");
    assert_eq!(sig.ret, int);
}

#[test]
fn non_template_beats_template_on_equal_conversions() {
    // int f(int); template<typename T> T f(T);
    // f(1) picks the plain function.
    let plain = Item::synth(ItemKind::Function(FunctionDef::new(
        "f",
        vec![Param::new("x", int_expr())],
        int_expr(),
    )));
    let def = FunctionDef::new("f", vec![Param::new("x", TypeExpr::named("T"))], TypeExpr::named("T"));
    let template = Item::synth(ItemKind::Template(TemplateDef {
        params: vec![TemplateParam::Type { name: "T".to_string() }],
        entity: Box::new(Item::synth(ItemKind::Function(def))),
    }));
    let mut ctx = analyse(vec![plain, template]);
    let candidates: Vec<DeclId> =
        lookup::unqualified(&ctx, ctx.global_scope, "f", Span::default()).unwrap();
    assert_eq!(candidates.len(), 2);
    let int = ctx.types.common.int;
    let winner =
        overload::resolve_call(&mut ctx, "f", &candidates, &[], &[int], Span::default()).unwrap();
    let is_plain = matches!(
        &ctx.decl(winner).kind,
        DeclKind::Function(f) if f.origin.is_none()
    );
    assert!(is_plain, "the non-template candidate wins the tie");
}

#[test]
fn resolution_is_stable_across_repeated_queries() {
    let mut ctx = analyse(twice_items());
    let tmpl = template_decl(&ctx, "twice");
    let int = ctx.types.common.int;
    let first: Result<DeclId, SemaError> =
        overload::resolve_call(&mut ctx, "twice", &[tmpl], &[], &[int], Span::default());
    let second = overload::resolve_call(&mut ctx, "twice", &[tmpl], &[], &[int], Span::default());
    assert_eq!(first.unwrap(), second.unwrap());
}

#[test]
fn canonical_types_are_shared_across_instantiations() {
    let mut ctx = analyse(twice_items());
    let tmpl = template_decl(&ctx, "twice");
    let int = ctx.types.common.int;
    let inst = template::instantiate_function(&mut ctx, tmpl, vec![int], Span::default()).unwrap();
    let sig = ctx.function_sig(inst).expect("signature");
    // The instantiated parameter type is the canonical int id itself.
    assert_eq!(sig.params[0], int);
    let _unused: TypeId = sig.ret;
}
