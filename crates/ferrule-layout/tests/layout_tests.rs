//! Class layout and vtable construction, including the virtual
//! diamond.

use ferrule_ast::{
    AccessSpecifier, BaseSpecifier, BuiltinType, ClassDef, FunctionDef, Ident, Item, ItemKind,
    Member, MethodQualifiers, Span, TranslationUnit, TypeExpr,
};
use ferrule_layout::{LayoutEngine, VTableEntry, POINTER_SIZE};
use ferrule_sema::declare::declare_translation_unit;
use ferrule_sema::{lookup, Context, DeclId, DeclKind};

fn field(name: &str, ty: TypeExpr) -> Member {
    Member::Field {
        name: Ident::new(name, Span::default()),
        ty,
        access: AccessSpecifier::Public,
        is_static: false,
    }
}

fn virtual_method(name: &str) -> Member {
    Member::Method {
        def: FunctionDef::new(name, Vec::new(), TypeExpr::builtin(BuiltinType::int())),
        access: AccessSpecifier::Public,
        quals: MethodQualifiers { is_virtual: true, ..MethodQualifiers::default() },
    }
}

fn override_method(name: &str) -> Member {
    Member::Method {
        def: FunctionDef::new(name, Vec::new(), TypeExpr::builtin(BuiltinType::int())),
        access: AccessSpecifier::Public,
        quals: MethodQualifiers {
            is_virtual: true,
            is_override: true,
            ..MethodQualifiers::default()
        },
    }
}

fn class(name: &str, bases: Vec<(&str, bool)>, members: Vec<Member>) -> Item {
    Item::synth(ItemKind::Class(ClassDef {
        name: Ident::new(name, Span::default()),
        is_class: false,
        bases: bases
            .into_iter()
            .map(|(base, is_virtual)| BaseSpecifier {
                ty: TypeExpr::named(base),
                access: AccessSpecifier::Public,
                is_virtual,
            })
            .collect(),
        members,
    }))
}

fn analyse(items: Vec<Item>) -> Context {
    let mut ctx = Context::new();
    declare_translation_unit(&mut ctx, &TranslationUnit::new(items));
    assert!(!ctx.diags.has_errors(), "unexpected diagnostics: {:?}", ctx.diags.diags());
    ctx
}

fn class_decl(ctx: &Context, name: &str) -> DeclId {
    let found = lookup::unqualified(ctx, ctx.global_scope, name, Span::default()).unwrap();
    found
        .into_iter()
        .find(|&d| matches!(ctx.decl(d).kind, DeclKind::Class(_)))
        .unwrap_or_else(|| panic!("no class `{name}`"))
}

fn int_ty() -> TypeExpr {
    TypeExpr::builtin(BuiltinType::int())
}

fn double_ty() -> TypeExpr {
    TypeExpr::builtin(BuiltinType::Double)
}

#[test]
fn fields_are_offset_by_alignment() {
    // struct S { int a; double b; int c; };
    let ctx = analyse(vec![class(
        "S",
        vec![],
        vec![field("a", int_ty()), field("b", double_ty()), field("c", int_ty())],
    )]);
    let mut engine = LayoutEngine::new();
    let layout = engine.class_layout(&ctx, class_decl(&ctx, "S")).unwrap();
    assert_eq!(layout.fields[0].offset, 0);
    assert_eq!(layout.fields[1].offset, 8, "double is rounded up to its alignment");
    assert_eq!(layout.fields[2].offset, 16);
    assert_eq!(layout.align, 8);
    assert_eq!(layout.size, 24);
    assert!(!layout.has_vptr);
}

#[test]
fn non_virtual_base_precedes_fields() {
    // struct Base { int x; }; struct Der : Base { int y; };
    let ctx = analyse(vec![
        class("Base", vec![], vec![field("x", int_ty())]),
        class("Der", vec![("Base", false)], vec![field("y", int_ty())]),
    ]);
    let mut engine = LayoutEngine::new();
    let layout = engine.class_layout(&ctx, class_decl(&ctx, "Der")).unwrap();
    assert_eq!(layout.offset_of_base(class_decl(&ctx, "Base")), Some(0));
    assert_eq!(layout.fields[0].offset, 4, "field follows the base subobject");
    assert_eq!(layout.size, 8);
}

#[test]
fn polymorphic_classes_reserve_the_vtable_pointer() {
    // struct Animal { int tag; virtual int speak(); virtual int legs(); };
    let ctx = analyse(vec![class(
        "Animal",
        vec![],
        vec![field("tag", int_ty()), virtual_method("speak"), virtual_method("legs")],
    )]);
    let mut engine = LayoutEngine::new();
    let layout = engine.class_layout(&ctx, class_decl(&ctx, "Animal")).unwrap();
    assert!(layout.has_vptr);
    assert_eq!(layout.fields[0].offset, POINTER_SIZE, "fields start after the vptr");
    assert_eq!(layout.align, POINTER_SIZE);

    // Slot order: RTTI, then virtuals in declaration order.
    let vtable = layout.vtable.as_ref().expect("polymorphic class has a vtable");
    assert_eq!(vtable.groups.len(), 1);
    let entries = &vtable.groups[0].entries;
    assert!(matches!(entries[0], VTableEntry::Rtti));
    assert_eq!(entries.len(), 3);
    let speak = lookup::class_member(&ctx, layout.class, "speak", Span::default()).unwrap()[0];
    let legs = lookup::class_member(&ctx, layout.class, "legs", Span::default()).unwrap()[0];
    assert_eq!(vtable.dispatch(speak), Some((0, 1)), "primary group, slot 1");
    assert_eq!(vtable.dispatch(legs), Some((0, 2)), "primary group, slot 2");
}

#[test]
fn derived_class_shares_the_primary_base_vtable() {
    // struct Animal { virtual int legs(); };
    // struct Dog : Animal { int legs() override; };
    let ctx = analyse(vec![
        class("Animal", vec![], vec![virtual_method("legs")]),
        class("Dog", vec![("Animal", false)], vec![override_method("legs")]),
    ]);
    let mut engine = LayoutEngine::new();
    let dog = class_decl(&ctx, "Dog");
    let layout = engine.class_layout(&ctx, dog).unwrap();
    // Dog shares Animal's vptr at offset 0; no second pointer.
    assert_eq!(layout.offset_of_base(class_decl(&ctx, "Animal")), Some(0));
    let vtable = layout.vtable.as_ref().unwrap();
    assert_eq!(vtable.groups.len(), 1);
    // The legs slot is overridden in place with a zero adjustor.
    let dog_legs = {
        let found = lookup::class_member(&ctx, dog, "legs", Span::default()).unwrap();
        found[0]
    };
    assert!(matches!(
        vtable.groups[0].entries[1],
        VTableEntry::Method { target, adjustor: 0 } if target == dog_legs
    ));
}

#[test]
fn virtual_diamond_places_one_shared_base() {
    // struct A { int a; virtual int val(); };
    // struct B : virtual A { int b; int val() override; };
    // struct C : virtual A { int c; int val() override; };
    // struct D : B, C { int d; int val() override; };
    let ctx = analyse(vec![
        class("A", vec![], vec![field("a", int_ty()), virtual_method("val")]),
        class("B", vec![("A", true)], vec![field("b", int_ty()), override_method("val")]),
        class("C", vec![("A", true)], vec![field("c", int_ty()), override_method("val")]),
        class("D", vec![("B", false), ("C", false)], vec![field("d", int_ty()), override_method("val")]),
    ]);
    let mut engine = LayoutEngine::new();
    let d = class_decl(&ctx, "D");
    let layout = engine.class_layout(&ctx, d).unwrap();

    let a = class_decl(&ctx, "A");
    let b = class_decl(&ctx, "B");
    let c = class_decl(&ctx, "C");

    // B is the primary base at 0; C follows; the single A subobject
    // comes after all non-virtual content.
    assert_eq!(layout.offset_of_base(b), Some(0));
    let c_off = layout.offset_of_base(c).expect("C subobject");
    assert!(c_off >= 16);
    let a_off = *layout.vbase_offsets.get(&a).expect("virtual base offset");
    assert!(a_off > c_off);
    // Exactly one A subobject despite two inheritance paths.
    let a_subobjects = layout.bases.iter().filter(|s| s.class == a).count();
    assert_eq!(a_subobjects, 1);

    // Every class with the virtual base carries an embedded offset
    // cell for it, written by the complete-object constructor.
    assert!(layout.vbase_slot(a).is_some(), "D embeds an offset cell for A");
    let b_layout = engine.class_layout(&ctx, b).unwrap();
    assert!(b_layout.vbase_slot(a).is_some(), "B embeds an offset cell for A");
    // B reaches A only through the cell; D's non-virtual bases keep
    // fixed offsets.
    assert!(matches!(
        engine.base_path(&ctx, b, a),
        Ok(ferrule_layout::BasePath::Virtual { .. })
    ));
    assert!(matches!(
        engine.base_path(&ctx, d, c),
        Ok(ferrule_layout::BasePath::NonVirtual(offset)) if offset == c_off
    ));

    // Three vtable groups: primary (B chain), C-in-D, A-in-D.
    let vtable = layout.vtable.as_ref().unwrap();
    assert_eq!(vtable.groups.len(), 3);
    assert_eq!(vtable.groups[1].offset, c_off);
    assert_eq!(vtable.groups[2].offset, a_off);

    // All interface groups dispatch `val` to D's override, adjusting
    // `this` by the subobject offset.
    let d_val = {
        let found = lookup::class_member(&ctx, d, "val", Span::default()).unwrap();
        found[0]
    };
    for group in &vtable.groups {
        let has_final = group.entries.iter().any(|e| {
            matches!(e, VTableEntry::Method { target, adjustor } if *target == d_val && *adjustor == group.offset)
        });
        assert!(has_final, "group at offset {} targets D::val", group.offset);
    }

    // D's own field sits between the C subobject and the virtual base.
    let d_field_offset = layout.fields[0].offset;
    assert!(d_field_offset > c_off && d_field_offset < a_off);
}

#[test]
fn layout_is_computed_once_and_shared() {
    let ctx = analyse(vec![class("S", vec![], vec![field("a", int_ty())])]);
    let mut engine = LayoutEngine::new();
    let decl = class_decl(&ctx, "S");
    let first = engine.class_layout(&ctx, decl).unwrap();
    let second = engine.class_layout(&ctx, decl).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second), "repeated queries share the result");
}

#[test]
fn pure_virtual_methods_get_pure_slots() {
    // struct Shape { virtual int area() = 0; };
    let shape = Item::synth(ItemKind::Class(ClassDef {
        name: Ident::new("Shape", Span::default()),
        is_class: false,
        bases: vec![],
        members: vec![Member::Method {
            def: FunctionDef::new("area", Vec::new(), TypeExpr::builtin(BuiltinType::int())),
            access: AccessSpecifier::Public,
            quals: MethodQualifiers {
                is_virtual: true,
                is_pure_virtual: true,
                ..MethodQualifiers::default()
            },
        }],
    }));
    let ctx = analyse(vec![shape]);
    let mut engine = LayoutEngine::new();
    let layout = engine.class_layout(&ctx, class_decl(&ctx, "Shape")).unwrap();
    let vtable = layout.vtable.as_ref().unwrap();
    assert!(matches!(vtable.groups[0].entries[1], VTableEntry::Pure { .. }));
}
