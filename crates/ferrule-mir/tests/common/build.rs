//! AST fixture builders. The producer normally hands us these trees;
//! tests assemble them by hand.

use ferrule_ast::*;

pub fn tu(items: Vec<Item>) -> TranslationUnit {
    TranslationUnit::new(items)
}

// ---- types ---------------------------------------------------------------

pub fn int_ty() -> TypeExpr {
    TypeExpr::builtin(BuiltinType::int())
}

pub fn void_ty() -> TypeExpr {
    TypeExpr::builtin(BuiltinType::Void)
}

pub fn double_ty() -> TypeExpr {
    TypeExpr::builtin(BuiltinType::Double)
}

pub fn named_ty(name: &str) -> TypeExpr {
    TypeExpr::named(name)
}

// ---- expressions ---------------------------------------------------------

pub fn lit(value: i64) -> Expr {
    Expr::synth(ExprKind::IntLit { value, is_long: false })
}

pub fn float_lit(value: f64) -> Expr {
    Expr::synth(ExprKind::FloatLit { value, is_single: false })
}

pub fn var(name: &str) -> Expr {
    Expr::synth(ExprKind::Name {
        path: vec![name.to_string()],
        template_args: Vec::new(),
    })
}

pub fn path_expr(parts: &[&str]) -> Expr {
    Expr::synth(ExprKind::Name {
        path: parts.iter().map(|s| s.to_string()).collect(),
        template_args: Vec::new(),
    })
}

pub fn bin(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::synth(ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
}

pub fn un(op: UnaryOp, operand: Expr) -> Expr {
    Expr::synth(ExprKind::Unary { op, operand: Box::new(operand) })
}

pub fn assign(lhs: Expr, rhs: Expr) -> Expr {
    bin(BinaryOp::Assign, lhs, rhs)
}

pub fn deref(e: Expr) -> Expr {
    un(UnaryOp::Deref, e)
}

pub fn addr_of(e: Expr) -> Expr {
    un(UnaryOp::AddrOf, e)
}

pub fn subscript(base: Expr, index: Expr) -> Expr {
    Expr::synth(ExprKind::Subscript { base: Box::new(base), index: Box::new(index) })
}

pub fn call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::synth(ExprKind::Call { callee: Box::new(var(name)), args })
}

pub fn call_path(parts: &[&str], args: Vec<Expr>) -> Expr {
    Expr::synth(ExprKind::Call { callee: Box::new(path_expr(parts)), args })
}

pub fn call_targs(name: &str, targs: Vec<TypeExpr>, args: Vec<Expr>) -> Expr {
    Expr::synth(ExprKind::Call {
        callee: Box::new(Expr::synth(ExprKind::Name {
            path: vec![name.to_string()],
            template_args: targs,
        })),
        args,
    })
}

pub fn member(base: Expr, field: &str) -> Expr {
    Expr::synth(ExprKind::Member {
        base: Box::new(base),
        field: field.to_string(),
        arrow: false,
    })
}

pub fn arrow_member(base: Expr, field: &str) -> Expr {
    Expr::synth(ExprKind::Member {
        base: Box::new(base),
        field: field.to_string(),
        arrow: true,
    })
}

pub fn method_call(base: Expr, name: &str, args: Vec<Expr>) -> Expr {
    Expr::synth(ExprKind::Call { callee: Box::new(member(base, name)), args })
}

pub fn arrow_call(base: Expr, name: &str, args: Vec<Expr>) -> Expr {
    Expr::synth(ExprKind::Call { callee: Box::new(arrow_member(base, name)), args })
}

pub fn construct(ty: TypeExpr, args: Vec<Expr>) -> Expr {
    Expr::synth(ExprKind::Construct { ty, args })
}

pub fn this_expr() -> Expr {
    Expr::synth(ExprKind::This)
}

// ---- statements ----------------------------------------------------------

pub fn ret(e: Expr) -> Stmt {
    Stmt::synth(StmtKind::Return(Some(e)))
}

pub fn ret_void() -> Stmt {
    Stmt::synth(StmtKind::Return(None))
}

pub fn expr_stmt(e: Expr) -> Stmt {
    Stmt::synth(StmtKind::Expr(e))
}

pub fn decl_stmt(name: &str, ty: TypeExpr, init: Option<Expr>) -> Stmt {
    Stmt::synth(StmtKind::Decl { name: name.to_string(), ty, init })
}

pub fn if_stmt(cond: Expr, then: Vec<Stmt>, otherwise: Option<Vec<Stmt>>) -> Stmt {
    Stmt::synth(StmtKind::If {
        cond,
        then_branch: Box::new(compound(then)),
        else_branch: otherwise.map(|stmts| Box::new(compound(stmts))),
    })
}

pub fn while_stmt(cond: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::synth(StmtKind::While { cond, body: Box::new(compound(body)) })
}

pub fn for_stmt(
    init: Option<Stmt>,
    cond: Option<Expr>,
    incr: Option<Expr>,
    body: Vec<Stmt>,
) -> Stmt {
    Stmt::synth(StmtKind::For {
        init: init.map(Box::new),
        cond,
        incr,
        body: Box::new(compound(body)),
    })
}

pub fn compound(stmts: Vec<Stmt>) -> Stmt {
    Stmt::synth(StmtKind::Compound(Block::new(stmts)))
}

pub fn break_stmt() -> Stmt {
    Stmt::synth(StmtKind::Break)
}

pub fn continue_stmt() -> Stmt {
    Stmt::synth(StmtKind::Continue)
}

// ---- items ---------------------------------------------------------------

pub fn param(name: &str, ty: TypeExpr) -> Param {
    Param::new(name, ty)
}

pub fn func_def(
    name: &str,
    params: Vec<Param>,
    ret_ty: TypeExpr,
    body: Vec<Stmt>,
) -> FunctionDef {
    FunctionDef::new(name, params, ret_ty).with_body(Block::new(body))
}

pub fn func(name: &str, params: Vec<Param>, ret_ty: TypeExpr, body: Vec<Stmt>) -> Item {
    Item::synth(ItemKind::Function(func_def(name, params, ret_ty, body)))
}

pub fn namespace(name: &str, items: Vec<Item>) -> Item {
    Item::synth(ItemKind::Namespace(NamespaceDef { name: name.to_string(), items }))
}

pub fn using_namespace(parts: &[&str]) -> Item {
    Item::synth(ItemKind::UsingDirective(UsingDirective {
        path: parts.iter().map(|s| s.to_string()).collect(),
        span: Span::default(),
    }))
}

pub fn using_decl(parts: &[&str]) -> Item {
    Item::synth(ItemKind::UsingDecl(UsingDecl {
        path: parts.iter().map(|s| s.to_string()).collect(),
        span: Span::default(),
    }))
}

// ---- classes -------------------------------------------------------------

pub fn base(name: &str, is_virtual: bool) -> BaseSpecifier {
    BaseSpecifier {
        ty: TypeExpr::named(name),
        access: AccessSpecifier::Public,
        is_virtual,
    }
}

pub fn field(name: &str, ty: TypeExpr) -> Member {
    Member::Field {
        name: Ident::new(name, Span::default()),
        ty,
        access: AccessSpecifier::Public,
        is_static: false,
    }
}

pub fn method(def: FunctionDef) -> Member {
    Member::Method {
        def,
        access: AccessSpecifier::Public,
        quals: MethodQualifiers::default(),
    }
}

pub fn virtual_method(def: FunctionDef) -> Member {
    Member::Method {
        def,
        access: AccessSpecifier::Public,
        quals: MethodQualifiers { is_virtual: true, ..MethodQualifiers::default() },
    }
}

pub fn override_method(def: FunctionDef) -> Member {
    Member::Method {
        def,
        access: AccessSpecifier::Public,
        quals: MethodQualifiers {
            is_virtual: true,
            is_override: true,
            ..MethodQualifiers::default()
        },
    }
}

/// A constructor with a member initialiser list.
pub fn ctor(class_name: &str, params: Vec<Param>, inits: Vec<(&str, Vec<Expr>)>, body: Vec<Stmt>) -> Member {
    let mut def = FunctionDef::new(class_name, params, void_ty());
    def.special = SpecialKind::Constructor;
    def.member_inits = inits
        .into_iter()
        .map(|(name, args)| MemberInit { member: Ident::new(name, Span::default()), args })
        .collect();
    def.body = Some(Block::new(body));
    Member::Method {
        def,
        access: AccessSpecifier::Public,
        quals: MethodQualifiers::default(),
    }
}

pub fn class_def(name: &str, bases: Vec<BaseSpecifier>, members: Vec<Member>) -> ClassDef {
    ClassDef {
        name: Ident::new(name, Span::default()),
        is_class: false,
        bases,
        members,
    }
}

pub fn class(name: &str, bases: Vec<BaseSpecifier>, members: Vec<Member>) -> Item {
    Item::synth(ItemKind::Class(class_def(name, bases, members)))
}

// ---- templates and concepts ---------------------------------------------

pub fn template_fn(params: &[&str], def: FunctionDef) -> Item {
    Item::synth(ItemKind::Template(TemplateDef {
        params: params
            .iter()
            .map(|p| TemplateParam::Type { name: p.to_string() })
            .collect(),
        entity: Box::new(Item::synth(ItemKind::Function(def))),
    }))
}

pub fn concept_item(name: &str, params: &[&str], body: ConstraintExpr) -> Item {
    Item::synth(ItemKind::Concept(ConceptDef {
        name: Ident::new(name, Span::default()),
        params: params.iter().map(|s| s.to_string()).collect(),
        body,
    }))
}

pub fn trait_constraint(func: TraitFn, arg: &str) -> ConstraintExpr {
    ConstraintExpr::Trait { func, arg: TypeExpr::named(arg) }
}

pub fn concept_ref(name: &str, arg: &str) -> ConstraintExpr {
    ConstraintExpr::ConceptRef {
        name: name.to_string(),
        args: vec![TypeExpr::named(arg)],
    }
}
