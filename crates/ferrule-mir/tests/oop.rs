//! Classes, virtual dispatch, constructors/destructors and the virtual
//! diamond.

mod common;

use common::build::*;
use common::{find_fn, lower_ok, run};
use ferrule_ast::BinaryOp;
use ferrule_mir::{Statement, Terminator};

fn animal_hierarchy() -> Vec<ferrule_ast::Item> {
    // struct Animal {
    //     int tag;
    //     virtual int speak() { return 1; }
    //     virtual int legs() { return 2; }
    // };
    // struct Dog : Animal {
    //     int speak() override { return 2; }
    //     int legs() override { return 4; }
    // };
    vec![
        class(
            "Animal",
            vec![],
            vec![
                field("tag", int_ty()),
                virtual_method(func_def("speak", vec![], int_ty(), vec![ret(lit(1))])),
                virtual_method(func_def("legs", vec![], int_ty(), vec![ret(lit(2))])),
            ],
        ),
        class(
            "Dog",
            vec![base("Animal", false)],
            vec![
                override_method(func_def("speak", vec![], int_ty(), vec![ret(lit(2))])),
                override_method(func_def("legs", vec![], int_ty(), vec![ret(lit(4))])),
            ],
        ),
    ]
}

#[test]
fn virtual_call_through_base_pointer_dispatches_to_override() {
    // int use_dog() { Dog d; Animal* a = &d; return a->legs(); }
    let mut items = animal_hierarchy();
    items.push(func(
        "use_dog",
        vec![],
        int_ty(),
        vec![
            decl_stmt("d", named_ty("Dog"), None),
            decl_stmt("a", named_ty("Animal").ptr(), Some(addr_of(var("d")))),
            ret(arrow_call(var("a"), "legs", vec![])),
        ],
    ));
    let unit = lower_ok(&tu(items));
    assert_eq!(run(&unit, "use_dog", &[]), 4);

    // The call site carries the compile-time slot of `legs` in the
    // Animal interface (RTTI at 0, speak at 1, legs at 2) and a zero
    // adjustor.
    let mir = find_fn(&unit, "use_dog");
    let vcall = mir
        .blocks
        .iter()
        .find_map(|b| match &b.terminator {
            Terminator::VirtualCall { slot, adjustor, .. } => Some((*slot, *adjustor)),
            _ => None,
        })
        .expect("use_dog emits a VirtualCall");
    assert_eq!(vcall, (2, 0));
}

#[test]
fn direct_object_call_is_static() {
    // int use_dog_direct() { Dog d; return d.speak(); }
    let mut items = animal_hierarchy();
    items.push(func(
        "use_dog_direct",
        vec![],
        int_ty(),
        vec![
            decl_stmt("d", named_ty("Dog"), None),
            ret(method_call(var("d"), "speak", vec![])),
        ],
    ));
    let unit = lower_ok(&tu(items));
    assert_eq!(run(&unit, "use_dog_direct", &[]), 2);

    let mir = find_fn(&unit, "use_dog_direct");
    assert!(
        !mir.blocks
            .iter()
            .any(|b| matches!(b.terminator, Terminator::VirtualCall { .. })),
        "a call on a direct object devirtualises"
    );
}

fn diamond_hierarchy() -> Vec<ferrule_ast::Item> {
    // class A { int a; A(int v) : a(v) {}
    //           int getA() { return a; }
    //           virtual int val() { return a; } };
    // class B : virtual A { int b; B(int v) : A(v), b(v + 1) {}
    //                       int getAFromB() { return a; }
    //                       int val() override { return b; } };
    // class C : virtual A { int c; C(int v) : A(v), c(v + 2) {}
    //                       int getAFromC() { return a; }
    //                       int val() override { return c; } };
    // class D : B, C {
    //     int d;
    //     D(int v) : A(v), B(v), C(v), d(v + 3) {}
    //     int val() override { return d; }
    //     int sum() { return a + b + c + d; }
    //     int sumViaBases() { return B::getAFromB() + C::getAFromC() + d; }
    // };
    vec![
        class(
            "A",
            vec![],
            vec![
                field("a", int_ty()),
                ctor("A", vec![param("v", int_ty())], vec![("a", vec![var("v")])], vec![]),
                method(func_def("getA", vec![], int_ty(), vec![ret(var("a"))])),
                virtual_method(func_def("val", vec![], int_ty(), vec![ret(var("a"))])),
            ],
        ),
        class(
            "B",
            vec![base("A", true)],
            vec![
                field("b", int_ty()),
                ctor(
                    "B",
                    vec![param("v", int_ty())],
                    vec![("A", vec![var("v")]), ("b", vec![bin(BinaryOp::Add, var("v"), lit(1))])],
                    vec![],
                ),
                method(func_def("getAFromB", vec![], int_ty(), vec![ret(var("a"))])),
                override_method(func_def("val", vec![], int_ty(), vec![ret(var("b"))])),
            ],
        ),
        class(
            "C",
            vec![base("A", true)],
            vec![
                field("c", int_ty()),
                ctor(
                    "C",
                    vec![param("v", int_ty())],
                    vec![("A", vec![var("v")]), ("c", vec![bin(BinaryOp::Add, var("v"), lit(2))])],
                    vec![],
                ),
                method(func_def("getAFromC", vec![], int_ty(), vec![ret(var("a"))])),
                override_method(func_def("val", vec![], int_ty(), vec![ret(var("c"))])),
            ],
        ),
        class(
            "D",
            vec![base("B", false), base("C", false)],
            vec![
                field("d", int_ty()),
                ctor(
                    "D",
                    vec![param("v", int_ty())],
                    vec![
                        ("A", vec![var("v")]),
                        ("B", vec![var("v")]),
                        ("C", vec![var("v")]),
                        ("d", vec![bin(BinaryOp::Add, var("v"), lit(3))]),
                    ],
                    vec![],
                ),
                override_method(func_def("val", vec![], int_ty(), vec![ret(var("d"))])),
                method(func_def(
                    "sum",
                    vec![],
                    int_ty(),
                    vec![ret(bin(
                        BinaryOp::Add,
                        bin(BinaryOp::Add, bin(BinaryOp::Add, var("a"), var("b")), var("c")),
                        var("d"),
                    ))],
                )),
                method(func_def(
                    "sumViaBases",
                    vec![],
                    int_ty(),
                    vec![ret(bin(
                        BinaryOp::Add,
                        bin(
                            BinaryOp::Add,
                            call_path(&["B", "getAFromB"], vec![]),
                            call_path(&["C", "getAFromC"], vec![]),
                        ),
                        var("d"),
                    ))],
                )),
            ],
        ),
    ]
}

#[test]
fn diamond_shares_one_virtual_base() {
    // diamond_sum(1): fields are 1, 2, 3, 4 — one shared A subobject.
    let mut items = diamond_hierarchy();
    items.push(func(
        "diamond_sum",
        vec![param("v", int_ty())],
        int_ty(),
        vec![
            decl_stmt("x", named_ty("D"), Some(construct(named_ty("D"), vec![var("v")]))),
            ret(method_call(var("x"), "sum", vec![])),
        ],
    ));
    let unit = lower_ok(&tu(items));
    assert_eq!(run(&unit, "diamond_sum", &[1]), 10);
    assert_eq!(run(&unit, "diamond_sum", &[2]), 14);
}

#[test]
fn diamond_sum_via_bases_reads_the_shared_base() {
    // The hard case: B::getAFromB and C::getAFromC are defined once,
    // on the intermediate classes, yet must find the shared A wherever
    // the dynamic type put it. Inside a D the A subobject sits at a
    // different offset than in a standalone B, so the accessors read
    // the offset cell embedded at construction time instead of baking
    // in their own class's layout.
    //
    // int diamond_sum_via_bases(int v) { D x(v); return x.sumViaBases(); }
    let mut items = diamond_hierarchy();
    items.push(func(
        "diamond_sum_via_bases",
        vec![param("v", int_ty())],
        int_ty(),
        vec![
            decl_stmt("x", named_ty("D"), Some(construct(named_ty("D"), vec![var("v")]))),
            ret(method_call(var("x"), "sumViaBases", vec![])),
        ],
    ));
    // The same accessor on a standalone B, whose A lives at B's own
    // virtual-base offset.
    items.push(func(
        "b_reads_a",
        vec![param("v", int_ty())],
        int_ty(),
        vec![
            decl_stmt("y", named_ty("B"), Some(construct(named_ty("B"), vec![var("v")]))),
            ret(method_call(var("y"), "getAFromB", vec![])),
        ],
    ));
    let unit = lower_ok(&tu(items));
    // a + a + d = v + v + (v + 3).
    assert_eq!(run(&unit, "diamond_sum_via_bases", &[1]), 6);
    assert_eq!(run(&unit, "diamond_sum_via_bases", &[2]), 9);
    assert_eq!(run(&unit, "b_reads_a", &[2]), 2);
}

#[test]
fn virtual_dispatch_through_each_base_interface() {
    // Virtual calls through A*, B* and C* views of a D all land in
    // D::val with an adjustor-corrected `this`.
    let mut items = diamond_hierarchy();
    items.push(func(
        "dispatch_via_bases",
        vec![param("v", int_ty())],
        int_ty(),
        vec![
            decl_stmt("x", named_ty("D"), Some(construct(named_ty("D"), vec![var("v")]))),
            decl_stmt("pa", named_ty("A").ptr(), Some(addr_of(var("x")))),
            decl_stmt("pb", named_ty("B").ptr(), Some(addr_of(var("x")))),
            decl_stmt("pc", named_ty("C").ptr(), Some(addr_of(var("x")))),
            ret(bin(
                BinaryOp::Add,
                bin(
                    BinaryOp::Add,
                    arrow_call(var("pa"), "val", vec![]),
                    arrow_call(var("pb"), "val", vec![]),
                ),
                arrow_call(var("pc"), "val", vec![]),
            )),
        ],
    ));
    let unit = lower_ok(&tu(items));
    // All three calls reach D::val, which returns v + 3.
    assert_eq!(run(&unit, "dispatch_via_bases", &[1]), 12);

    // The emitted vtable of D has a group per interface: the primary
    // (B) chain, the C subobject, and the shared virtual A.
    let d_blob = unit
        .vtables
        .iter()
        .find(|b| b.symbol.contains("1D"))
        .expect("vtable blob for D");
    assert_eq!(d_blob.groups.len(), 3);
    assert_eq!(d_blob.groups[0].offset, 0);
    assert!(d_blob.groups[1].offset > 0);
    assert!(d_blob.groups[2].offset > d_blob.groups[1].offset);
    assert_eq!(d_blob.vbase_offsets.len(), 1, "one shared virtual base");

    // Non-primary groups adjust `this` back to the most-derived
    // object when D overrides.
    for group in &d_blob.groups[1..] {
        let has_adjusted = group.entries.iter().any(|e| {
            matches!(e, ferrule_mir::BlobEntry::Fn { adjustor, .. } if *adjustor == group.offset as i32)
        });
        assert!(has_adjusted, "group at offset {} carries its adjustor", group.offset);
    }
}

#[test]
fn member_initialisers_run_in_declaration_order() {
    // struct Point { int x; int y; Point(int ax, int ay) : y(ay), x(ax) {} };
    // The initialiser list is written y-first, but x (declared first)
    // is assigned first.
    let point = class(
        "Point",
        vec![],
        vec![
            field("x", int_ty()),
            field("y", int_ty()),
            ctor(
                "Point",
                vec![param("ax", int_ty()), param("ay", int_ty())],
                vec![("y", vec![var("ay")]), ("x", vec![var("ax")])],
                vec![],
            ),
        ],
    );
    let use_point = func(
        "use_point",
        vec![],
        int_ty(),
        vec![
            decl_stmt(
                "p",
                named_ty("Point"),
                Some(construct(named_ty("Point"), vec![lit(3), lit(4)])),
            ),
            ret(bin(
                BinaryOp::Add,
                bin(BinaryOp::Mul, member(var("p"), "x"), lit(10)),
                member(var("p"), "y"),
            )),
        ],
    );
    let unit = lower_ok(&tu(vec![point, use_point]));
    assert_eq!(run(&unit, "use_point", &[]), 34);

    // Structural check on the complete-object constructor: the field
    // at offset 0 is written before the field at offset 4.
    let ctor_fn = unit
        .functions
        .iter()
        .find(|f| f.symbol.starts_with("_ZN5PointC1"))
        .expect("Point constructor lowered");
    let mut field_writes = Vec::new();
    for block in &ctor_fn.blocks {
        for stmt in &block.statements {
            if let Statement::Assign { place, .. } = stmt {
                for proj in &place.projection {
                    if let ferrule_mir::ProjectionElem::Field { offset, .. } = proj {
                        field_writes.push(*offset);
                    }
                }
            }
        }
    }
    assert_eq!(field_writes, vec![0, 4], "declaration order, not list order");
}

#[test]
fn destructor_runs_at_scope_exit() {
    // struct Counted { int* slot; Counted(int* s) : slot(s) {}
    //                  ~Counted() { *slot = *slot + 1; } };
    // int use_counted() { int hits = 0; { Counted c(&hits); } return hits; }
    use ferrule_ast::{Member, MethodQualifiers, SpecialKind};
    let mut dtor_def = func_def("~Counted", vec![], void_ty(), vec![expr_stmt(assign(
        deref(var("slot")),
        bin(BinaryOp::Add, deref(var("slot")), lit(1)),
    ))]);
    dtor_def.special = SpecialKind::Destructor;
    let counted = class(
        "Counted",
        vec![],
        vec![
            field("slot", int_ty().ptr()),
            ctor(
                "Counted",
                vec![param("s", int_ty().ptr())],
                vec![("slot", vec![var("s")])],
                vec![],
            ),
            Member::Method {
                def: dtor_def,
                access: ferrule_ast::AccessSpecifier::Public,
                quals: MethodQualifiers::default(),
            },
        ],
    );
    let driver = func(
        "use_counted",
        vec![],
        int_ty(),
        vec![
            decl_stmt("hits", int_ty(), Some(lit(0))),
            compound(vec![decl_stmt(
                "c",
                named_ty("Counted"),
                Some(construct(named_ty("Counted"), vec![addr_of(var("hits"))])),
            )]),
            ret(var("hits")),
        ],
    );
    let unit = lower_ok(&tu(vec![counted, driver]));
    assert_eq!(run(&unit, "use_counted", &[]), 1);
}

#[test]
fn base_fields_are_reachable_through_the_derived_object() {
    // struct Base2 { int x; };
    // struct Der : Base2 { int y; };
    // int use_der() { Der d; d.x = 5; d.y = 6; return d.x * 10 + d.y; }
    let items = vec![
        class("Base2", vec![], vec![field("x", int_ty())]),
        class("Der", vec![base("Base2", false)], vec![field("y", int_ty())]),
        func(
            "use_der",
            vec![],
            int_ty(),
            vec![
                decl_stmt("d", named_ty("Der"), None),
                expr_stmt(assign(member(var("d"), "x"), lit(5))),
                expr_stmt(assign(member(var("d"), "y"), lit(6))),
                ret(bin(
                    BinaryOp::Add,
                    bin(BinaryOp::Mul, member(var("d"), "x"), lit(10)),
                    member(var("d"), "y"),
                )),
            ],
        ),
    ];
    let unit = lower_ok(&tu(items));
    assert_eq!(run(&unit, "use_der", &[]), 56);
}
