//! Tests for the lowering phase.

use jac_foundation::{ArchKind, BinaryOp, CmpOp, IncOp, JacType, LogicalOp, UnaryOp, Value};

use crate::build::*;
use crate::{
    lower, lower_block, lower_expr, AbilityBody, AbilityEvent, AssignOp, Builtin, Decl, Direction,
    ExprKind, GlobalRef, IrError, MethodFamily, RefStep, ReportField, SpawnExpr, StmtKind,
    SyntaxNode, TakeStyle, TestGraph, TestWalker, WalkerItem,
};

fn kind_of(node: SyntaxNode) -> ExprKind {
    lower_expr(&node).unwrap().kind
}

#[test]
fn test_lower_empty() {
    let program = lower(&program(Vec::new())).unwrap();
    assert!(program.decls.is_empty());
}

#[test]
fn test_root_must_be_start() {
    let err = lower(&name("x")).unwrap_err();
    assert!(matches!(err, IrError::Malformed { .. }));
}

#[test]
fn test_arithmetic_folds_left() {
    let kind = kind_of(sub(sub(int(10), int(3)), int(2)));
    let ExprKind::Binary { op, lhs, .. } = kind else {
        panic!("expected binary");
    };
    assert_eq!(op, BinaryOp::Sub);
    assert!(matches!(lhs.kind, ExprKind::Binary { op: BinaryOp::Sub, .. }));
}

#[test]
fn test_chained_operators_in_one_rule() {
    let node = SyntaxNode::rule(
        "arithmetic",
        vec![
            int(1),
            tok("PLUS", "+"),
            int(2),
            tok("MINUS", "-"),
            int(3),
        ],
    );
    let ExprKind::Binary { op, lhs, .. } = kind_of(node) else {
        panic!("expected binary");
    };
    assert_eq!(op, BinaryOp::Sub);
    assert!(matches!(lhs.kind, ExprKind::Binary { op: BinaryOp::Add, .. }));
}

#[test]
fn test_literals() {
    assert_eq!(kind_of(int(7)), ExprKind::Literal(Value::Int(7)));
    assert_eq!(kind_of(float(2.5)), ExprKind::Literal(Value::Float(2.5)));
    assert_eq!(kind_of(boolean(true)), ExprKind::Literal(Value::Bool(true)));
    assert_eq!(kind_of(null()), ExprKind::Literal(Value::Null));
    assert_eq!(kind_of(string("a\tb")), ExprKind::Literal(Value::str("a\tb")));
    assert_eq!(kind_of(type_tag("dict")), ExprKind::Type(JacType::Dict));
    assert!(matches!(
        kind_of(int(-3)),
        ExprKind::Unary { op: UnaryOp::Neg, .. }
    ));
}

#[test]
fn test_multistring_concatenates() {
    let node = SyntaxNode::rule(
        "multistring",
        vec![tok("STRING", "\"ab\""), tok("STRING", "'cd'")],
    );
    assert_eq!(kind_of(node), ExprKind::Literal(Value::str("abcd")));
}

#[test]
fn test_invalid_int_literal() {
    let err = lower_expr(&tok("INT", "12x")).unwrap_err();
    assert!(matches!(err, IrError::InvalidLiteral { .. }));
}

#[test]
fn test_assignment_forms() {
    let ExprKind::Assign { op, target, .. } = kind_of(assign(name("a"), int(1))) else {
        panic!("expected assign");
    };
    assert_eq!(op, AssignOp::Assign);
    assert_eq!(target.as_name(), Some("a"));

    let ExprKind::Assign { op, .. } = kind_of(inc_assign(name("a"), "*", int(2))) else {
        panic!("expected assign");
    };
    assert_eq!(op, AssignOp::Inc(IncOp::Mul));

    let ExprKind::Assign { op, .. } = kind_of(copy_assign(name("a"), name("b"))) else {
        panic!("expected assign");
    };
    assert_eq!(op, AssignOp::Copy);
}

#[test]
fn test_logic_and_comparison() {
    let node = or(cmp(name("x"), "not in", list(vec![int(1)])), not(name("y")));
    let ExprKind::Logical { op, lhs, rhs } = kind_of(node) else {
        panic!("expected logical");
    };
    assert_eq!(op, LogicalOp::Or);
    assert!(matches!(lhs.kind, ExprKind::Compare { op: CmpOp::NotIn, .. }));
    assert!(matches!(rhs.kind, ExprKind::Unary { op: UnaryOp::Not, .. }));
}

#[test]
fn test_action_call_keeps_dotted_callee() {
    let node = call_kw(
        field(name("std"), "log"),
        vec![string("hi")],
        vec![("sep", string(","))],
    );
    let ExprKind::Call { callee, args, kwargs } = kind_of(node) else {
        panic!("expected call");
    };
    assert!(matches!(callee.kind, ExprKind::Field { ref name, .. } if name == "log"));
    assert_eq!(args.len(), 1);
    assert_eq!(kwargs[0].0, "sep");
}

#[test]
fn test_builtins() {
    assert!(matches!(
        kind_of(context_of(name("here"))),
        ExprKind::Builtin { op: Builtin::Context, .. }
    ));
    assert!(matches!(
        kind_of(cast(name("x"), "int")),
        ExprKind::Builtin { op: Builtin::Cast(JacType::Int), .. }
    ));
    let ExprKind::Builtin { op, .. } = kind_of(method(name("l"), "list", "append", Some(vec![int(1)]))) else {
        panic!("expected builtin");
    };
    assert_eq!(
        op,
        Builtin::Method {
            family: MethodFamily::List,
            name: "append".into(),
            args: Some(vec![lower_expr(&int(1)).unwrap()]),
        }
    );
    let ExprKind::Builtin { op, .. } = kind_of(method(name("d"), "dict", "keys", None)) else {
        panic!("expected builtin");
    };
    assert!(matches!(op, Builtin::Method { args: None, .. }));
    let ExprKind::Builtin { op, .. } = kind_of(pluck(name("d"), &["a", "b"])) else {
        panic!("expected builtin");
    };
    assert_eq!(op, Builtin::Pluck(vec!["a".into(), "b".into()]));
}

#[test]
fn test_global_refs() {
    assert_eq!(kind_of(global("limit")), ExprKind::Global(GlobalRef::Var("limit".into())));
    assert_eq!(kind_of(global_context()), ExprKind::Global(GlobalRef::Context));
}

#[test]
fn test_edge_ref_chain() {
    let node = traverse(vec![
        vec![edge_to(Some("parent"), vec![filter("weight", ">", int(2))])],
        node_ref("year", vec![filter("year", "==", string("2020"))]),
    ]);
    let ExprKind::EdgeRef(steps) = kind_of(node) else {
        panic!("expected edge ref");
    };
    assert_eq!(steps.len(), 2);
    let RefStep::Edge { direction, arch, filters } = &steps[0] else {
        panic!("expected edge step");
    };
    assert_eq!(*direction, Direction::Out);
    assert_eq!(arch.as_deref(), Some("parent"));
    assert_eq!(filters[0].op, CmpOp::Gt);
    let RefStep::Node { arch, filters } = &steps[1] else {
        panic!("expected node step");
    };
    assert_eq!(arch.as_deref(), Some("year"));
    assert_eq!(filters[0].field, "year");
}

#[test]
fn test_untyped_edges() {
    let ExprKind::EdgeRef(steps) = kind_of(traverse(vec![vec![edge_any(None, Vec::new())]])) else {
        panic!("expected edge ref");
    };
    assert_eq!(
        steps,
        vec![RefStep::Edge {
            direction: Direction::Any,
            arch: None,
            filters: Vec::new()
        }]
    );
}

#[test]
fn test_connect_and_disconnect() {
    let node = connect(name("a"), connect_to(Some("likes"), vec![("w", int(3))]), name("b"));
    let ExprKind::Connect { op, .. } = kind_of(node) else {
        panic!("expected connect");
    };
    assert_eq!(op.direction, Direction::Out);
    assert_eq!(op.edge.as_deref(), Some("likes"));
    assert_eq!(op.ctx.len(), 1);

    let node = disconnect(name("a"), edge_from(None, Vec::new()), name("b"));
    assert!(matches!(
        kind_of(node),
        ExprKind::Disconnect { edge: RefStep::Edge { direction: Direction::In, .. }, .. }
    ));
}

#[test]
fn test_spawn_forms() {
    let node = spawn_node(
        Some((name("here"), connect_to(None, Vec::new()))),
        "person",
        vec![("name", string("ann"))],
    );
    let ExprKind::Spawn(spawn) = kind_of(node) else {
        panic!("expected spawn");
    };
    let SpawnExpr::Node { from, arch, ctx } = *spawn else {
        panic!("expected node spawn");
    };
    assert!(from.is_some());
    assert_eq!(arch, "person");
    assert_eq!(ctx[0].0, "name");

    let ExprKind::Spawn(spawn) = kind_of(spawn_walker(name("here"), "init", Vec::new())) else {
        panic!("expected spawn");
    };
    assert!(matches!(*spawn, SpawnExpr::Walker { ref name, .. } if name == "init"));

    let ExprKind::Spawn(spawn) = kind_of(spawn_graph(None, "dummy")) else {
        panic!("expected spawn");
    };
    assert!(matches!(*spawn, SpawnExpr::Graph { from: None, .. }));
}

#[test]
fn test_ability_calls() {
    let ExprKind::AbilityCall { target, name: ability_name, .. } =
        kind_of(ability(name("here"), "greet", Vec::new()))
    else {
        panic!("expected ability call");
    };
    assert!(target.is_some());
    assert_eq!(ability_name, "greet");
    assert!(matches!(
        kind_of(own_ability("greet")),
        ExprKind::AbilityCall { target: None, .. }
    ));
}

#[test]
fn test_bytecode_travels_with_outermost_node() {
    let mut inner = int(5);
    inner.bytecode = Some(vec![1, 2]);
    let mut outer = SyntaxNode::rule("expression", vec![inner]);
    assert_eq!(lower_expr(&outer).unwrap().bytecode, Some(vec![1, 2]));
    outer.bytecode = Some(vec![9]);
    assert_eq!(lower_expr(&outer).unwrap().bytecode, Some(vec![9]));
}

#[test]
fn test_unknown_rule() {
    let node = SyntaxNode::rule("mystery", vec![int(1)]);
    assert!(matches!(lower_expr(&node), Err(IrError::UnknownRule { .. })));
}

#[test]
fn test_statements() {
    let stmts = lower_block(&block(vec![
        if_stmt(
            name("a"),
            vec![report(int(1))],
            vec![(name("b"), vec![report(int(2))])],
            Some(vec![report(int(3))]),
        ),
        for_kv("k", "v", name("d"), vec![continue_stmt()]),
        for_in("x", name("l"), vec![break_stmt()]),
        for_to(assign(name("i"), int(0)), cmp(name("i"), "<", int(3)), inc_assign(name("i"), "+", int(1)), vec![]),
        while_stmt(boolean(false), vec![skip_stmt()]),
        try_stmt(vec![report(int(1))], Some("err"), Some(vec![report(name("err"))])),
        report_field("status", int(201)),
        take_with(Some("dfs"), out_nodes(), Some(vec![report(string("none"))])),
        yield_stmt(YieldWith::Disengage(Some(int(1)))),
        node_ctx(&["person"], vec![destroy(name("here"))]),
    ]))
    .unwrap();

    assert!(matches!(&stmts[0].kind, StmtKind::If { elifs, otherwise: Some(_), .. } if elifs.len() == 1));
    assert!(matches!(&stmts[1].kind, StmtKind::ForKeyValue { key, .. } if key == "k"));
    assert!(matches!(&stmts[2].kind, StmtKind::ForIn { var, .. } if var == "x"));
    assert!(matches!(&stmts[3].kind, StmtKind::ForTo { .. }));
    assert!(matches!(&stmts[4].kind, StmtKind::While { .. }));
    assert!(matches!(&stmts[5].kind, StmtKind::Try { binding: Some(b), .. } if b == "err"));
    assert!(matches!(&stmts[6].kind, StmtKind::ReportField { field: ReportField::Status, .. }));
    assert!(matches!(
        &stmts[7].kind,
        StmtKind::Take { style: TakeStyle::Dfs, otherwise: Some(_), .. }
    ));
    let StmtKind::Yield(Some(inner)) = &stmts[8].kind else {
        panic!("expected yield");
    };
    assert!(matches!(&inner.kind, StmtKind::Disengage(Some(_))));
    assert!(matches!(&stmts[9].kind, StmtKind::NodeContext { archs, .. } if archs == &["person"]));
}

#[test]
fn test_invalid_report_field() {
    let err = lower_block(&block(vec![report_field("colour", int(1))])).unwrap_err();
    assert!(matches!(err, IrError::Malformed { .. }));
}

#[test]
fn test_invalid_take_style() {
    let err = lower_block(&block(vec![take_with(Some("zigzag"), out_nodes(), None)])).unwrap_err();
    assert!(matches!(err, IrError::Malformed { .. }));
}

#[test]
fn test_architypes() {
    let tree = program(vec![
        global_var("limit", int(3)),
        node_arch(
            "person",
            &["animal"],
            vec![
                has(vec![
                    HasSpec::new("name"),
                    HasSpec::new("id").anchor(),
                    HasSpec::new("secret").private().default(string("x")),
                ]),
                can("greet", Some("entry"), &["visit"], vec![report(string("hi"))]),
                can_action(
                    "infer.year_from_date",
                    Some(PresetSpec {
                        args: vec![field(name("here"), "date")],
                        output: Some(field(name("here"), "year")),
                    }),
                    Some("exit"),
                    &[],
                ),
            ],
        ),
        walker_arch(
            "visit",
            vec![
                has_names(&["count"]),
                walk_entry(vec![report(int(0))]),
                take(out_nodes()),
                walk_exit(vec![report(name("count"))]),
            ],
        ),
        graph_arch("dummy", "root_node", vec![assign(name("root_node"), spawn_node(None, "person", Vec::new()))]
            .into_iter()
            .map(expr_stmt)
            .collect()),
    ]);
    let program = lower(&tree).unwrap();
    assert_eq!(program.globals().count(), 1);

    let archs: Vec<_> = program.architypes().collect();
    assert_eq!(archs.len(), 3);

    let person = archs[0];
    assert_eq!(person.kind, ArchKind::Node);
    assert_eq!(person.supers, vec!["animal".to_string()]);
    assert_eq!(person.body.anchor(), Some("id"));
    assert_eq!(person.body.private_vars().collect::<Vec<_>>(), vec!["secret"]);
    assert!(person.body.has[2].default.is_some());
    assert_eq!(person.body.abilities.len(), 2);
    assert_eq!(person.body.abilities[0].event, AbilityEvent::Entry);
    assert_eq!(person.body.abilities[0].access_list, vec!["visit".to_string()]);
    let AbilityBody::Action { action, preset: Some(preset) } = &person.body.abilities[1].body else {
        panic!("expected action ability");
    };
    assert_eq!(action, "infer.year_from_date");
    assert_eq!(preset.args.len(), 1);
    assert!(preset.output.is_some());
    assert_eq!(person.body.abilities[1].event, AbilityEvent::Exit);

    let visit = archs[1];
    assert_eq!(visit.kind, ArchKind::Walker);
    assert_eq!(visit.body.has.len(), 1);
    assert!(matches!(visit.body.walker[0], WalkerItem::Entry(_)));
    assert!(matches!(visit.body.walker[1], WalkerItem::Stmt(_)));
    assert!(matches!(visit.body.walker[2], WalkerItem::Exit(_)));

    let graph = archs[2].body.graph.as_ref().unwrap();
    assert_eq!(graph.anchor, "root_node");
    assert_eq!(graph.spawn.len(), 1);
}

#[test]
fn test_test_declarations() {
    let tree = program(vec![
        test_case(
            "named",
            TestGraphSpec::Named("dummy"),
            TestWalkerSpec::Named {
                walker: "visit",
                ctx: vec![("count", int(1))],
                asserts: Some(vec![assert_stmt(boolean(true))]),
            },
        ),
        test_case(
            "inline",
            TestGraphSpec::Inline {
                anchor: "r",
                spawn: vec![expr_stmt(assign(name("r"), spawn_node(None, "generic", Vec::new())))],
            },
            TestWalkerSpec::Inline(vec![report(int(1))]),
        ),
    ]);
    let program = lower(&tree).unwrap();
    let tests: Vec<_> = program.tests().collect();
    assert_eq!(tests[0].title, "named");
    assert_eq!(tests[0].graph, TestGraph::Ref("dummy".into()));
    assert!(matches!(&tests[0].walker, TestWalker::Ref { ctx, asserts: Some(_), .. } if ctx.len() == 1));
    assert!(matches!(&tests[1].graph, TestGraph::Inline(g) if g.anchor == "r"));
    assert!(matches!(&tests[1].walker, TestWalker::Inline(body) if body.walker.len() == 1));
}

#[test]
fn test_multiple_globals_in_one_statement() {
    let node = SyntaxNode::rule(
        "global_var",
        vec![
            tok("KW_GLOBAL", "global"),
            tok("NAME", "a"),
            tok("EQ", "="),
            int(1),
            tok("COMMA", ","),
            tok("NAME", "b"),
            tok("EQ", "="),
            int(2),
            tok("SEMI", ";"),
        ],
    );
    let program = lower(&program(vec![node])).unwrap();
    let names: Vec<_> = program
        .decls
        .iter()
        .map(|d| match d {
            Decl::Global(g) => g.name.clone(),
            _ => String::new(),
        })
        .collect();
    assert_eq!(names, vec!["a", "b"]);
}
