//! Program-level behavior: registration, the master API, sentinel test
//! cases, abilities, globals and bytecode/tree-walk agreement.

use indexmap::IndexMap;
use serde_json::json;

use jac_foundation::Value;
use jac_ir::build::*;
use jac_ir::SyntaxNode;
use jac_runtime::{Runtime, RuntimeConfig};
use jac_tests::{jid, TestHarness};
use jac_vm::{compile_tree, disassemble, seal};

fn here_field(name_: &str) -> SyntaxNode {
    field(name("here"), name_)
}

fn to_life() -> SyntaxNode {
    traverse(vec![vec![edge_to(None, Vec::new())], node_ref("life", Vec::new())])
}

fn life_program() -> Vec<SyntaxNode> {
    vec![
        node_arch("life", &[], vec![]),
        node_arch("day", &[], vec![has(vec![HasSpec::new("num")])]),
        walker_arch(
            "init",
            vec![node_ctx(
                &["root"],
                vec![take_with(
                    None,
                    to_life(),
                    Some(vec![expr_stmt(spawn_node(
                        Some((name("here"), connect_to(None, Vec::new()))),
                        "life",
                        Vec::new(),
                    ))]),
                )],
            )],
        ),
        walker_arch(
            "gen_rand_life",
            vec![
                node_ctx(&["root"], vec![take(to_life())]),
                node_ctx(
                    &["life"],
                    vec![
                        expr_stmt(assign(name("n"), action("rand.integer", vec![int(2), int(4)]))),
                        for_to(
                            assign(name("i"), int(0)),
                            cmp(name("i"), "<", name("n")),
                            inc_assign(name("i"), "+", int(1)),
                            vec![expr_stmt(spawn_node(
                                Some((name("here"), connect_to(None, Vec::new()))),
                                "day",
                                vec![("num", name("i"))],
                            ))],
                        ),
                    ],
                ),
            ],
        ),
        walker_arch(
            "get_gen_day",
            vec![
                node_ctx(&["root"], vec![take(to_life())]),
                node_ctx(
                    &["life"],
                    vec![report(index(
                        traverse(vec![vec![edge_to(None, Vec::new())], node_ref("day", Vec::new())]),
                        int(0),
                    ))],
                ),
            ],
        ),
    ]
}

#[test]
fn test_life_scenario_replays_identically() {
    let mut h = TestHarness::new(life_program());
    assert!(h.run("init").success);
    assert!(h.run("init").success);
    let report = h.run("gen_rand_life");
    assert!(report.success, "{report:?}");

    let first = h.run("get_gen_day");
    let second = h.run("get_gen_day");
    let third = h.run("get_gen_day");
    assert!(first.success);
    assert_eq!(second.report, third.report);
    assert_eq!(second.report[0]["name"], json!("day"));
    assert_eq!(second.report[0]["context"]["num"], json!(0));
    assert_eq!(jid(&first.report[0]), jid(&third.report[0]));

    h.runtime().commit();
    assert_eq!(h.runtime().pending_count(), 0);
}

#[test]
fn test_missing_architype_recovers_after_new_sentinel() {
    let person_program = || {
        program(vec![
            node_arch("person", &[], vec![has(vec![HasSpec::new("name")])]),
            walker_arch(
                "make",
                vec![report(spawn_node(
                    Some((name("here"), connect_to(None, Vec::new()))),
                    "person",
                    vec![("name", string("Ann"))],
                ))],
            ),
        ])
    };
    let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
    let alice = rt.create_master("alice");
    let first = rt.sentinel_register(alice, "v1", &person_program()).unwrap();
    rt.graph_create(alice, None).unwrap();
    let report = rt.walker_run(alice, "make", None, &IndexMap::new()).unwrap();
    let person = jid(&report.report[0]).unwrap();

    rt.sentinel_delete(alice, first).unwrap();
    rt.sentinel_register(
        alice,
        "unrelated",
        &program(vec![walker_arch("noop", vec![])]),
    )
    .unwrap();
    let ctx = IndexMap::from([("name".to_string(), Value::str("Bea"))]);
    let err = rt.set_node_context(alice, person, &ctx).unwrap_err();
    assert!(err.to_string().contains("has_var"), "{err}");

    let admin = rt.create_master("admin");
    rt.store_mut().grant_super(admin);
    let shared = rt.sentinel_register(admin, "global", &person_program()).unwrap();
    rt.global_sentinel_set(admin, shared).unwrap();
    rt.sentinel_active_global(alice).unwrap();
    rt.flush_arch_cache();

    let updated = rt.set_node_context(alice, person, &ctx).unwrap();
    assert_eq!(updated["name"], Value::str("Bea"));
    assert_eq!(rt.get_node_context(alice, person).unwrap()["name"], Value::str("Bea"));
}

#[test]
fn test_private_nodes_are_invisible_to_other_masters() {
    let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
    let alice = rt.create_master("alice");
    let bob = rt.create_master("bob");
    rt.sentinel_register(alice, "main", &program(vec![walker_arch("noop", vec![])]))
        .unwrap();
    let root = rt.graph_create(alice, None).unwrap();

    assert!(rt.get_node_context(alice, root).is_ok());
    let err = rt.get_node_context(bob, root).unwrap_err();
    assert!(matches!(err, jac_runtime::Error::ElementNotFound(_)));
}

fn fixture_program() -> Vec<SyntaxNode> {
    vec![
        node_arch("item", &[], vec![has(vec![HasSpec::new("n")])]),
        graph_arch(
            "tiny",
            "start",
            vec![
                expr_stmt(assign(name("start"), spawn_node(None, "item", vec![("n", int(5))]))),
                expr_stmt(spawn_node(
                    Some((name("start"), connect_to(None, Vec::new()))),
                    "item",
                    vec![("n", int(6))],
                )),
            ],
        ),
        walker_arch(
            "summer",
            vec![
                has(vec![HasSpec::new("total").anchor().default(int(0))]),
                node_ctx(&["item"], vec![expr_stmt(inc_assign(name("total"), "+", here_field("n")))]),
                take(out_nodes()),
            ],
        ),
        test_case(
            "sums the tiny graph",
            TestGraphSpec::Named("tiny"),
            TestWalkerSpec::Named {
                walker: "summer",
                ctx: Vec::new(),
                asserts: Some(vec![assert_stmt(cmp(name("total"), "==", int(11)))]),
            },
        ),
        test_case(
            "expects the wrong total",
            TestGraphSpec::Named("tiny"),
            TestWalkerSpec::Named {
                walker: "summer",
                ctx: Vec::new(),
                asserts: Some(vec![assert_stmt(cmp(name("total"), "==", int(0)))]),
            },
        ),
        test_case(
            "inline graph and walker",
            TestGraphSpec::Inline {
                anchor: "only",
                spawn: vec![expr_stmt(assign(name("only"), spawn_node(None, "item", vec![("n", int(1))])))],
            },
            TestWalkerSpec::Inline(vec![expr_stmt(action("std.out", vec![here_field("n")]))]),
        ),
    ]
}

#[test]
fn test_sentinel_tests_pass_fail_and_clean_up() {
    let mut h = TestHarness::new(fixture_program());
    let before = h.distribution();
    let master = h.master();

    let summary = h.runtime().run_tests(master, None).unwrap();
    assert_eq!((summary.tests, summary.passed, summary.failed), (3, 2, 1));
    assert!(!summary.success);
    let failed = &summary.details[1];
    assert!(!failed.passed);
    assert!(failed.errors[0].contains("total == 0"), "{:?}", failed.errors);
    assert_eq!(summary.details[2].stdout.trim(), "1");
    assert_eq!(h.distribution(), before);

    let only = h.runtime().run_tests(master, Some("sums")).unwrap();
    assert_eq!(only.tests, 1);
    assert!(only.success);
}

#[test]
fn test_abilities_respect_access_lists() {
    let mut h = TestHarness::new(vec![
        node_arch(
            "person",
            &[],
            vec![
                can("greet", Some("entry"), &["friend"], vec![report(string("hello"))]),
                can("shout", None, &[], vec![report(string("HEY"))]),
                can_action(
                    "std.out",
                    Some(PresetSpec {
                        args: vec![string("entered")],
                        output: None,
                    }),
                    Some("entry"),
                    &[],
                ),
            ],
        ),
        walker_arch(
            "seed",
            vec![report(spawn_node(
                Some((name("here"), connect_to(None, Vec::new()))),
                "person",
                Vec::new(),
            ))],
        ),
        walker_arch("friend", vec![take(out_nodes())]),
        walker_arch("stranger", vec![take(out_nodes())]),
        walker_arch(
            "caller",
            vec![
                node_ctx(&["person"], vec![expr_stmt(ability(name("here"), "shout", Vec::new()))]),
                take(out_nodes()),
            ],
        ),
    ]);
    let person = jid(&h.run("seed").report[0]).unwrap();

    // entry abilities fire on the node a walker starts from
    assert_eq!(h.run_from("friend", person, Vec::new()).report, vec![json!("hello")]);
    assert!(h.stdout().contains("entered"));
    assert!(h.run_from("stranger", person, Vec::new()).report.is_empty());
    assert_eq!(h.run("caller").report, vec![json!("HEY")]);
}

#[test]
fn test_global_writes_stay_local_to_a_run() {
    let mut h = TestHarness::new(vec![
        global_var("counter", int(0)),
        global_var("greeting", string("hey")),
        walker_arch(
            "bump",
            vec![
                expr_stmt(assign(global("counter"), add(global("counter"), int(1)))),
                report(global("counter")),
                report(global("greeting")),
            ],
        ),
    ]);
    assert_eq!(h.run("bump").report, vec![json!(1), json!("hey")]);
    assert_eq!(h.run("bump").report, vec![json!(1), json!("hey")]);
}

fn arithmetic_program() -> Vec<SyntaxNode> {
    vec![walker_arch(
        "calc",
        vec![
            report(neg(int(5))),
            report(sub(int(2), int(9))),
            report(neg(int(9_000_000_000))),
            report(pow(int(2), int(10))),
            report(modulo(int(17), int(5))),
            report(mul(float(1.5), int(2))),
            report(div(int(7), int(2))),
            report(string("tab\there \"quoted\"\nnext")),
            report(and(boolean(true), not(boolean(false)))),
            report(or(boolean(false), cmp(int(3), "<=", int(3)))),
            report(add(string("ab"), string("cd"))),
            report(list(vec![int(1), float(2.25), null()])),
            report(dict(vec![("k", neg(float(0.5)))])),
            report(or(null(), int(5))),
            report(cmp(or(null(), int(5)), "==", int(5))),
            report(and(int(0), string("x"))),
            report(or(string(""), list(vec![int(1)]))),
        ],
    )]
}

#[test]
fn test_bytecode_and_tree_walk_agree() {
    let run = |use_bytecode: bool| {
        let config = RuntimeConfig {
            use_bytecode,
            ..RuntimeConfig::default()
        };
        let mut h = TestHarness::with_config(arithmetic_program(), config);
        let report = h.run("calc");
        assert!(report.success, "{report:?}");
        report.report
    };
    let compiled = run(true);
    let walked = run(false);
    assert_eq!(compiled, walked);
    assert_eq!(compiled[0], json!(-5));
    assert_eq!(compiled[1], json!(-7));
    assert_eq!(compiled[2], json!(-9_000_000_000i64));
    assert_eq!(compiled[3], json!(1024));
    assert_eq!(compiled[7], json!("tab\there \"quoted\"\nnext"));
    assert_eq!(compiled[13], json!(5));
    assert_eq!(compiled[14], json!(true));
    assert_eq!(compiled[15], json!(0));
    assert_eq!(compiled[16], json!([1]));
}

#[test]
fn test_truncated_bytecode_never_decodes_to_other_instructions() {
    let mut tree = program(arithmetic_program());
    compile_tree(&mut tree, true);
    let mut blobs = Vec::new();
    tree.walk_post_mut(&mut |node| blobs.extend(node.bytecode.clone()));
    assert!(!blobs.is_empty());

    for code in blobs {
        let full = disassemble(&code).unwrap();
        for cut in 0..code.len() {
            // a cut either fails to decode or lands on an instruction boundary
            if let Ok(lines) = disassemble(&code[..cut]) {
                assert_eq!(lines[..], full[..lines.len()], "cut at {cut}");
            }
        }
    }
}

#[test]
fn test_hostile_bytecode_is_rejected() {
    let blobs = [
        seal(&[0x01, 0x03, 0x01, 0x05, b'a', b'b']),
        seal(&[0x01, 0x03, 0x08, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]),
        seal(&[0x01, 0x09, 0x00]),
        vec![0x00, 0x00, 0x01],
    ];
    for code in blobs {
        assert!(disassemble(&code).is_err(), "{code:?}");
    }
}
