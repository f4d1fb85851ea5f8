//! Walker execution end to end: traversal order, take/else, yield and
//! resume, disengage, step limits and nested walkers.

use jac_foundation::Value;
use jac_ir::build::*;
use jac_ir::SyntaxNode;
use jac_runtime::RuntimeConfig;
use jac_tests::TestHarness;
use serde_json::json;

fn here_field(name_: &str) -> SyntaxNode {
    field(name("here"), name_)
}

fn spawn_item(from: SyntaxNode, n: i64) -> SyntaxNode {
    spawn_node(
        Some((from, connect_to(None, Vec::new()))),
        "item",
        vec![("n", int(n))],
    )
}

fn item_arch() -> SyntaxNode {
    node_arch("item", &[], vec![has(vec![HasSpec::new("n")])])
}

/// `root -> 0 -> 1 -> 2`
fn build_chain() -> SyntaxNode {
    walker_arch(
        "build_chain",
        vec![
            expr_stmt(assign(name("a"), spawn_item(name("here"), 0))),
            expr_stmt(assign(name("b"), spawn_item(name("a"), 1))),
            expr_stmt(spawn_item(name("b"), 2)),
        ],
    )
}

/// `root -> 1 -> 3` and `root -> 2`
fn build_tree() -> SyntaxNode {
    walker_arch(
        "build_tree",
        vec![
            expr_stmt(assign(name("a"), spawn_item(name("here"), 1))),
            expr_stmt(spawn_item(name("here"), 2)),
            expr_stmt(spawn_item(name("a"), 3)),
        ],
    )
}

fn reported_ints(report: &jac_runtime::RunReport) -> Vec<i64> {
    report.report.iter().filter_map(|v| v.as_i64()).collect()
}

#[test]
fn test_cyclic_walk_stops_at_step_limit() {
    let config = RuntimeConfig {
        step_limit: 50,
        ..RuntimeConfig::default()
    };
    let mut h = TestHarness::with_config(
        vec![
            walker_arch(
                "make_cycle",
                vec![
                    expr_stmt(assign(
                        name("a"),
                        spawn_node(Some((name("here"), connect_to(None, Vec::new()))), "generic", Vec::new()),
                    )),
                    expr_stmt(assign(
                        name("b"),
                        spawn_node(Some((name("a"), connect_to(None, Vec::new()))), "generic", Vec::new()),
                    )),
                    expr_stmt(connect(name("b"), connect_to(None, Vec::new()), name("a"))),
                ],
            ),
            walker_arch("spin", vec![take(out_nodes())]),
        ],
        config,
    );
    assert!(h.run("make_cycle").success);

    let report = h.run("spin");
    assert!(!report.success);
    assert!(report
        .errors
        .iter()
        .any(|e| e.contains("walked too many steps - 50")));
}

#[test]
fn test_take_else_runs_only_without_targets() {
    let mut h = TestHarness::new(vec![
        node_arch("person", &[], vec![]),
        walker_arch(
            "visit",
            vec![
                node_ctx(
                    &["root"],
                    vec![take_with(
                        None,
                        traverse(vec![vec![edge_to(None, Vec::new())], node_ref("person", Vec::new())]),
                        Some(vec![report(string("fallback"))]),
                    )],
                ),
                node_ctx(&["person"], vec![report(string("visited"))]),
            ],
        ),
        walker_arch(
            "add_person",
            vec![expr_stmt(spawn_node(
                Some((name("here"), connect_to(None, Vec::new()))),
                "person",
                Vec::new(),
            ))],
        ),
    ]);

    let report = h.run("visit");
    assert_eq!(report.report, vec![json!("fallback")]);

    h.run("add_person");
    let report = h.run("visit");
    assert_eq!(report.report, vec![json!("visited")]);
}

#[test]
fn test_bfs_and_dfs_visit_order() {
    let body = |style: Option<&str>| {
        vec![
            node_ctx(&["item"], vec![report(here_field("n"))]),
            take_with(style, out_nodes(), None),
        ]
    };
    let mut h = TestHarness::new(vec![
        item_arch(),
        build_tree(),
        walker_arch("bfs", body(None)),
        walker_arch("dfs", body(Some("dfs"))),
    ]);
    h.run("build_tree");

    assert_eq!(reported_ints(&h.run("bfs")), vec![1, 2, 3]);
    assert_eq!(reported_ints(&h.run("dfs")), vec![1, 3, 2]);
}

#[test]
fn test_smart_yield_resumes_without_leaking_objects() {
    let mut h = TestHarness::new(vec![
        item_arch(),
        build_chain(),
        walker_arch(
            "smart_yield",
            vec![
                node_ctx(&["item"], vec![report(dict(vec![("id", here_field("n"))]))]),
                take(out_nodes()),
                yield_stmt(YieldWith::Nothing),
            ],
        ),
    ]);
    h.run("build_chain");

    let first = h.run("smart_yield");
    assert!(first.yielded);
    assert!(first.report.is_empty());
    let before = h.distribution();

    let mut last = first;
    for _ in 0..3 {
        last = h.run("smart_yield");
    }
    assert_eq!(h.distribution(), before);
    assert_eq!(last.report, vec![json!({"id": 2})]);

    // queue drained: the next run starts over from the root
    let again = h.run("smart_yield");
    assert!(again.report.is_empty());
    assert_eq!(h.distribution(), before);
}

#[test]
fn test_yield_report_sequence() {
    let mut h = TestHarness::new(vec![
        item_arch(),
        build_chain(),
        walker_arch(
            "stepper",
            vec![
                walk_entry(vec![report(string("entry"))]),
                node_ctx(
                    &["item"],
                    vec![if_stmt(
                        cmp(here_field("n"), "<", int(2)),
                        vec![yield_stmt(YieldWith::Report(here_field("n")))],
                        Vec::new(),
                        Some(vec![report(here_field("n"))]),
                    )],
                ),
                take(out_nodes()),
                walk_exit(vec![report(string("exit"))]),
            ],
        ),
    ]);
    h.run("build_chain");

    let mut seen = Vec::new();
    for _ in 0..4 {
        let report = h.run("stepper");
        seen.extend(report.report);
        if !report.yielded {
            break;
        }
    }
    assert_eq!(
        seen,
        vec![json!("entry"), json!(0), json!(1), json!(2), json!("exit")]
    );
}

#[test]
fn test_disengage_ends_walk() {
    let mut h = TestHarness::new(vec![
        item_arch(),
        build_chain(),
        walker_arch(
            "until_one",
            vec![
                node_ctx(
                    &["item"],
                    vec![
                        report(here_field("n")),
                        if_stmt(cmp(here_field("n"), "==", int(1)), vec![disengage(None)], Vec::new(), None),
                    ],
                ),
                take(out_nodes()),
            ],
        ),
    ]);
    h.run("build_chain");

    let report = h.run("until_one");
    assert!(report.success, "{report:?}");
    assert_eq!(reported_ints(&report), vec![0, 1]);
}

#[test]
fn test_spawned_walker_returns_anchor_and_is_cleaned_up() {
    let mut h = TestHarness::new(vec![
        item_arch(),
        build_chain(),
        walker_arch(
            "summer",
            vec![
                has(vec![HasSpec::new("total").anchor().default(int(0))]),
                node_ctx(&["item"], vec![expr_stmt(inc_assign(name("total"), "+", here_field("n")))]),
                take(out_nodes()),
            ],
        ),
        walker_arch(
            "outer",
            vec![report(spawn_walker(name("here"), "summer", Vec::new()))],
        ),
    ]);
    h.run("build_chain");
    let before = h.distribution();

    let report = h.run("outer");
    assert!(report.success, "{report:?}");
    assert_eq!(report.report, vec![json!(3)]);
    assert_eq!(h.distribution(), before);
}

#[test]
fn test_walker_context_comes_from_run_ctx() {
    let mut h = TestHarness::new(vec![walker_arch(
        "echo",
        vec![has(vec![HasSpec::new("msg")]), report(name("msg"))],
    )]);
    let report = h.run_with("echo", vec![("msg", Value::str("hello"))]);
    assert_eq!(report.report, vec![json!("hello")]);
}

#[test]
fn test_runtime_errors_are_reported_and_run_continues() {
    let mut h = TestHarness::new(vec![walker_arch(
        "faulty",
        vec![
            expr_stmt(assign(name("x"), div(int(1), int(0)))),
            report(string("after")),
        ],
    )]);
    let report = h.run("faulty");
    assert!(!report.success);
    assert_eq!(report.report, vec![json!("after")]);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("faulty - line"));
}
