//! Mangling determinism and round-tripping through the symbol index.

use ferrule_ast::{
    BuiltinType, FunctionDef, Item, ItemKind, NamespaceDef, Param, TranslationUnit, TypeExpr,
};
use ferrule_mangle::{mangle_function, mangle_typeinfo, mangle_vtable, MangledIndex};
use ferrule_sema::declare::declare_translation_unit;
use ferrule_sema::{lookup, Context, DeclId, DeclKind};
use ferrule_ast::Span;

fn int_ty() -> TypeExpr {
    TypeExpr::builtin(BuiltinType::int())
}

fn items() -> Vec<Item> {
    let helper = FunctionDef::new("helper", vec![Param::new("x", int_ty())], int_ty());
    let helper_dbl = FunctionDef::new(
        "helper",
        vec![Param::new("x", TypeExpr::builtin(BuiltinType::Double))],
        int_ty(),
    );
    let plain = FunctionDef::new("plain", vec![], int_ty());
    vec![
        Item::synth(ItemKind::Namespace(NamespaceDef {
            name: "foo".into(),
            items: vec![
                Item::synth(ItemKind::Function(helper)),
                Item::synth(ItemKind::Function(helper_dbl)),
            ],
        })),
        Item::synth(ItemKind::Function(plain)),
    ]
}

fn analyse() -> Context {
    let mut ctx = Context::new();
    declare_translation_unit(&mut ctx, &TranslationUnit::new(items()));
    ctx
}

fn functions_named(ctx: &Context, scope: ferrule_sema::ScopeId, name: &str) -> Vec<DeclId> {
    lookup::unqualified(ctx, scope, name, Span::default())
        .unwrap()
        .into_iter()
        .filter(|&d| matches!(ctx.decl(d).kind, DeclKind::Function(_)))
        .collect()
}

#[test]
fn namespaces_are_length_prefixed() {
    let ctx = analyse();
    let foo_scope = {
        let found = lookup::unqualified(&ctx, ctx.global_scope, "foo", Span::default()).unwrap();
        match &ctx.decl(found[0]).kind {
            DeclKind::Namespace(n) => n.scope,
            _ => panic!("foo is a namespace"),
        }
    };
    let helpers = functions_named(&ctx, foo_scope, "helper");
    let symbols: Vec<String> = helpers.iter().map(|&d| mangle_function(&ctx, d)).collect();
    assert!(symbols.contains(&"_ZN3foo6helperEi".to_string()), "got {symbols:?}");
    assert!(symbols.contains(&"_ZN3foo6helperEd".to_string()), "got {symbols:?}");
}

#[test]
fn overloads_differ_only_in_parameter_codes() {
    let ctx = analyse();
    let foo_scope = {
        let found = lookup::unqualified(&ctx, ctx.global_scope, "foo", Span::default()).unwrap();
        match &ctx.decl(found[0]).kind {
            DeclKind::Namespace(n) => n.scope,
            _ => panic!("foo is a namespace"),
        }
    };
    let helpers = functions_named(&ctx, foo_scope, "helper");
    assert_eq!(helpers.len(), 2);
    let a = mangle_function(&ctx, helpers[0]);
    let b = mangle_function(&ctx, helpers[1]);
    assert_ne!(a, b, "overloads must get distinct symbols");
    assert!(a.starts_with("_ZN3foo6helperE"));
    assert!(b.starts_with("_ZN3foo6helperE"));
}

#[test]
fn unqualified_functions_use_the_short_form() {
    let ctx = analyse();
    let plain = functions_named(&ctx, ctx.global_scope, "plain");
    assert_eq!(mangle_function(&ctx, plain[0]), "_Z5plainv");
}

#[test]
fn mangling_is_deterministic_across_contexts() {
    let first = analyse();
    let second = analyse();
    let collect = |ctx: &Context| -> Vec<String> {
        (0..ctx.decls.len() as u32)
            .map(DeclId)
            .filter(|&d| matches!(ctx.decl(d).kind, DeclKind::Function(_)))
            .map(|d| mangle_function(ctx, d))
            .collect()
    };
    assert_eq!(collect(&first), collect(&second));
}

#[test]
fn index_round_trips_symbols_to_decls() {
    let ctx = analyse();
    let mut index = MangledIndex::new();
    let mut decls = Vec::new();
    for i in 0..ctx.decls.len() as u32 {
        let d = DeclId(i);
        if matches!(ctx.decl(d).kind, DeclKind::Function(_)) {
            index.insert(mangle_function(&ctx, d), d);
            decls.push(d);
        }
    }
    for d in decls {
        let symbol = mangle_function(&ctx, d);
        assert_eq!(index.lookup(&symbol), Some(d), "mangle then lookup returns the same decl");
    }
    assert!(index.lookup("_Z7missingv").is_none());
}

#[test]
fn vtable_and_typeinfo_symbols() {
    use ferrule_ast::{AccessSpecifier, ClassDef, Ident, Member, MethodQualifiers};
    let class = Item::synth(ItemKind::Class(ClassDef {
        name: Ident::new("Animal", Span::default()),
        is_class: false,
        bases: vec![],
        members: vec![Member::Method {
            def: FunctionDef::new("legs", vec![], int_ty()),
            access: AccessSpecifier::Public,
            quals: MethodQualifiers { is_virtual: true, ..MethodQualifiers::default() },
        }],
    }));
    let mut ctx = Context::new();
    declare_translation_unit(&mut ctx, &TranslationUnit::new(vec![class]));
    let animal = lookup::unqualified(&ctx, ctx.global_scope, "Animal", Span::default())
        .unwrap()[0];
    assert_eq!(mangle_vtable(&ctx, animal), "_ZTV6Animal");
    assert_eq!(mangle_typeinfo(&ctx, animal), "_ZTI6Animal");
}
