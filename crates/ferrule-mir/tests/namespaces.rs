//! Namespace resolution through the full pipeline: unqualified and
//! qualified lookup, `using namespace`, and argument-dependent lookup.

mod common;

use common::build::*;
use common::{lower_ok, run};

#[test]
fn unqualified_lookup_finds_the_same_namespace() {
    // namespace foo {
    //     int helper() { return 42; }
    //     int test_same_namespace() { return helper(); }
    // }
    let items = vec![namespace(
        "foo",
        vec![
            func("helper", vec![], int_ty(), vec![ret(lit(42))]),
            func(
                "test_same_namespace",
                vec![],
                int_ty(),
                vec![ret(call("helper", vec![]))],
            ),
        ],
    )];
    let unit = lower_ok(&tu(items));
    assert_eq!(run(&unit, "foo::test_same_namespace", &[]), 42);
}

#[test]
fn using_directive_imports_a_namespace() {
    // namespace bar { int bar_helper() { return 100; } }
    // using namespace bar;
    // int call_bar() { return bar_helper(); }
    let items = vec![
        namespace(
            "bar",
            vec![func("bar_helper", vec![], int_ty(), vec![ret(lit(100))])],
        ),
        using_namespace(&["bar"]),
        func("call_bar", vec![], int_ty(), vec![ret(call("bar_helper", vec![]))]),
    ];
    let unit = lower_ok(&tu(items));
    assert_eq!(run(&unit, "call_bar", &[]), 100);
}

#[test]
fn using_declaration_imports_one_name() {
    // namespace maths { int triple(int x) { return x * 3; } }
    // using maths::triple;
    // int call_triple(int x) { return triple(x); }
    let items = vec![
        namespace(
            "maths",
            vec![func(
                "triple",
                vec![param("x", int_ty())],
                int_ty(),
                vec![ret(bin(ferrule_ast::BinaryOp::Mul, var("x"), lit(3)))],
            )],
        ),
        using_decl(&["maths", "triple"]),
        func(
            "call_triple",
            vec![param("x", int_ty())],
            int_ty(),
            vec![ret(call("triple", vec![var("x")]))],
        ),
    ];
    let unit = lower_ok(&tu(items));
    assert_eq!(run(&unit, "call_triple", &[7]), 21);
}

#[test]
fn qualified_lookup_reaches_nested_namespaces() {
    // namespace outer { namespace inner { int f() { return 9; } } }
    // int call_nested() { return outer::inner::f(); }
    let items = vec![
        namespace(
            "outer",
            vec![namespace(
                "inner",
                vec![func("f", vec![], int_ty(), vec![ret(lit(9))])],
            )],
        ),
        func(
            "call_nested",
            vec![],
            int_ty(),
            vec![ret(call_path(&["outer", "inner", "f"], vec![]))],
        ),
    ];
    let unit = lower_ok(&tu(items));
    assert_eq!(run(&unit, "call_nested", &[]), 9);
}

#[test]
fn local_function_shadows_directive_import() {
    // namespace lib { int pick() { return 1; } }
    // namespace app {
    //     using namespace lib;
    //     int pick() { return 2; }
    //     int choose() { return pick(); }   // app::pick shadows lib::pick
    // }
    let items = vec![
        namespace("lib", vec![func("pick", vec![], int_ty(), vec![ret(lit(1))])]),
        namespace(
            "app",
            vec![
                using_namespace(&["lib"]),
                func("pick", vec![], int_ty(), vec![ret(lit(2))]),
                func("choose", vec![], int_ty(), vec![ret(call("pick", vec![]))]),
            ],
        ),
    ];
    let unit = lower_ok(&tu(items));
    assert_eq!(run(&unit, "app::choose", &[]), 2);
}

#[test]
fn adl_finds_functions_in_the_arguments_namespace() {
    // namespace zoo {
    //     struct Cage { int size; };
    //     int measure(Cage* c) { return c->size; }
    // }
    // int use_adl() { zoo::Cage c; c.size = 7; return measure(&c); }
    let items = vec![
        namespace(
            "zoo",
            vec![
                class("Cage", vec![], vec![field("size", int_ty())]),
                func(
                    "measure",
                    vec![param("c", named_ty("Cage").ptr())],
                    int_ty(),
                    vec![ret(arrow_member(var("c"), "size"))],
                ),
            ],
        ),
        func(
            "use_adl",
            vec![],
            int_ty(),
            vec![
                decl_stmt(
                    "c",
                    ferrule_ast::TypeExpr::named_path(vec!["zoo".into(), "Cage".into()]),
                    None,
                ),
                expr_stmt(assign(member(var("c"), "size"), lit(7))),
                ret(call("measure", vec![addr_of(var("c"))])),
            ],
        ),
    ];
    let unit = lower_ok(&tu(items));
    assert_eq!(run(&unit, "use_adl", &[]), 7);
}
