//! Parse tree construction helpers.
//!
//! Builds [`SyntaxNode`] trees with the same shape the external parser
//! produces, so programs can be assembled in code (tests, tools) without a
//! parser. Expression helpers return the innermost rule that carries the
//! construct; [`lower_expr`](crate::lower_expr) and the bytecode compiler
//! accept any expression level rule in any expression position.

use jac_foundation::SourceLoc;

use crate::escape::escape;
use crate::SyntaxNode;

type Node = SyntaxNode;

fn r(name: &str, kid: Vec<Node>) -> Node {
    SyntaxNode::rule(name, kid)
}

pub fn tok(name: &str, text: &str) -> Node {
    SyntaxNode::token(name, text)
}

/// Attach a source location to a whole subtree that has none.
pub fn located(mut node: Node, line: u32, file: &str) -> Node {
    let loc = SourceLoc::new(line, 1, file);
    node.walk_post_mut(&mut |n| {
        if n.loc == SourceLoc::default() {
            n.loc = loc.clone();
        }
    });
    node
}

fn comma_separated(items: Vec<Node>) -> Vec<Node> {
    let mut out = Vec::new();
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            out.push(tok("COMMA", ","));
        }
        out.push(item);
    }
    out
}

fn atom_of(node: Node) -> Node {
    if node.is("atom") {
        node
    } else {
        paren(node)
    }
}

// ============================================================================
// Literals and names
// ============================================================================

pub fn name(text: &str) -> Node {
    r("atom", vec![tok("NAME", text)])
}

pub fn int(value: i64) -> Node {
    if value < 0 {
        return neg(r("atom", vec![tok("INT", &value.unsigned_abs().to_string())]));
    }
    r("atom", vec![tok("INT", &value.to_string())])
}

pub fn float(value: f64) -> Node {
    if value < 0.0 {
        return neg(r("atom", vec![tok("FLOAT", &format!("{:?}", -value))]));
    }
    r("atom", vec![tok("FLOAT", &format!("{value:?}"))])
}

pub fn string(text: &str) -> Node {
    r("atom", vec![r("multistring", vec![string_token(text)])])
}

fn string_token(text: &str) -> Node {
    let quoted = format!("\"{}\"", escape(text).replace('"', "\\\""));
    tok("STRING", &quoted)
}

pub fn boolean(value: bool) -> Node {
    r("atom", vec![tok("BOOL", if value { "true" } else { "false" })])
}

pub fn null() -> Node {
    r("atom", vec![tok("NULL", "null")])
}

/// A type tag: `int`, `float`, `str`, `list`, `dict`, `bool`, `node`, `edge`, `type`.
pub fn type_tag(ty: &str) -> Node {
    r("atom", vec![any_type(ty)])
}

fn any_type(ty: &str) -> Node {
    let token = match ty {
        "int" => "TYP_INT",
        "float" => "TYP_FLOAT",
        "str" => "TYP_STRING",
        "list" => "TYP_LIST",
        "dict" => "TYP_DICT",
        "bool" => "TYP_BOOL",
        "node" => "KW_NODE",
        "edge" => "KW_EDGE",
        _ => "KW_TYPE",
    };
    r("any_type", vec![tok(token, ty)])
}

pub fn list(items: Vec<Node>) -> Node {
    let mut kid = vec![tok("LSQUARE", "[")];
    if !items.is_empty() {
        kid.push(expr_list(items));
    }
    kid.push(tok("RSQUARE", "]"));
    r("atom", vec![r("list_val", kid)])
}

pub fn dict(pairs: Vec<(&str, Node)>) -> Node {
    let pairs = pairs
        .into_iter()
        .map(|(key, value)| r("kv_pair", vec![string_token(key), tok("COLON", ":"), value]))
        .collect();
    let mut kid = vec![tok("LBRACE", "{")];
    kid.extend(comma_separated(pairs));
    kid.push(tok("RBRACE", "}"));
    r("atom", vec![r("dict_val", kid)])
}

fn expr_list(items: Vec<Node>) -> Node {
    r("expr_list", comma_separated(items))
}

// ============================================================================
// Operators
// ============================================================================

pub fn paren(inner: Node) -> Node {
    r("atom", vec![tok("LPAREN", "("), expression(inner), tok("RPAREN", ")")])
}

/// Wrap in an `expression` rule unless it already is one.
pub fn expression(inner: Node) -> Node {
    if inner.is("expression") {
        inner
    } else {
        r("expression", vec![inner])
    }
}

fn binary(lhs: Node, token: &str, text: &str, rhs: Node) -> Node {
    let rule = match token {
        "PLUS" | "MINUS" => "arithmetic",
        "STAR_MUL" | "DIV" | "MOD" => "term",
        _ => "power",
    };
    r(rule, vec![lhs, tok(token, text), rhs])
}

pub fn add(lhs: Node, rhs: Node) -> Node {
    binary(lhs, "PLUS", "+", rhs)
}

pub fn sub(lhs: Node, rhs: Node) -> Node {
    binary(lhs, "MINUS", "-", rhs)
}

pub fn mul(lhs: Node, rhs: Node) -> Node {
    binary(lhs, "STAR_MUL", "*", rhs)
}

pub fn div(lhs: Node, rhs: Node) -> Node {
    binary(lhs, "DIV", "/", rhs)
}

pub fn modulo(lhs: Node, rhs: Node) -> Node {
    binary(lhs, "MOD", "%", rhs)
}

pub fn pow(lhs: Node, rhs: Node) -> Node {
    binary(lhs, "POW", "^", rhs)
}

pub fn neg(operand: Node) -> Node {
    r("factor", vec![tok("MINUS", "-"), operand])
}

pub fn not(operand: Node) -> Node {
    r("compare", vec![tok("NOT", "not"), operand])
}

pub fn and(lhs: Node, rhs: Node) -> Node {
    r("logical", vec![lhs, tok("KW_AND", "and"), rhs])
}

pub fn or(lhs: Node, rhs: Node) -> Node {
    r("logical", vec![lhs, tok("KW_OR", "or"), rhs])
}

fn cmp_op(op: &str) -> Node {
    let inner = match op {
        "==" => tok("EE", op),
        "!=" => tok("NE", op),
        "<" => tok("LT", op),
        ">" => tok("GT", op),
        "<=" => tok("LTE", op),
        ">=" => tok("GTE", op),
        "in" => tok("KW_IN", op),
        _ => r("nin", vec![tok("NOT", "not"), tok("KW_IN", "in")]),
    };
    r("cmp_op", vec![inner])
}

/// `lhs <op> rhs` for `==`, `!=`, `<`, `>`, `<=`, `>=`, `in`, `not in`.
pub fn cmp(lhs: Node, op: &str, rhs: Node) -> Node {
    r("compare", vec![lhs, cmp_op(op), rhs])
}

pub fn assign(target: Node, value: Node) -> Node {
    r(
        "expression",
        vec![target, r("assignment", vec![tok("EQ", "="), expression(value)])],
    )
}

pub fn copy_assign(target: Node, value: Node) -> Node {
    r(
        "expression",
        vec![target, r("copy_assign", vec![tok("CPY_EQ", ":="), expression(value)])],
    )
}

/// `target <op>= value` for `+`, `-`, `*`, `/`.
pub fn inc_assign(target: Node, op: &str, value: Node) -> Node {
    let token = match op {
        "+" => tok("PEQ", "+="),
        "-" => tok("MEQ", "-="),
        "*" => tok("TEQ", "*="),
        _ => tok("DEQ", "/="),
    };
    r(
        "expression",
        vec![target, r("inc_assign", vec![token, expression(value)])],
    )
}

// ============================================================================
// Trailers and built-ins
// ============================================================================

fn trailer(base: Node, parts: Vec<Node>) -> Node {
    let base = atom_of(base);
    let trailer = r("atom_trailer", parts);
    if base.kid.first().is_some_and(|k| k.is("atom")) {
        let mut chained = base;
        chained.kid.push(trailer);
        return chained;
    }
    r("atom", vec![base, trailer])
}

pub fn field(base: Node, member: &str) -> Node {
    trailer(base, vec![tok("DOT", "."), tok("NAME", member)])
}

pub fn index(base: Node, at: Node) -> Node {
    trailer(
        base,
        vec![r("index_slice", vec![tok("LSQUARE", "["), expression(at), tok("RSQUARE", "]")])],
    )
}

pub fn slice(base: Node, start: Node, end: Node) -> Node {
    trailer(
        base,
        vec![r(
            "index_slice",
            vec![
                tok("LSQUARE", "["),
                expression(start),
                tok("COLON", ":"),
                expression(end),
                tok("RSQUARE", "]"),
            ],
        )],
    )
}

fn param_list(args: Vec<Node>, kwargs: Vec<(&str, Node)>) -> Option<Node> {
    let mut kid = Vec::new();
    if !args.is_empty() {
        kid.push(expr_list(args));
    }
    if !kwargs.is_empty() {
        if !kid.is_empty() {
            kid.push(tok("COMMA", ","));
        }
        let items = kwargs
            .into_iter()
            .map(|(key, value)| vec![tok("NAME", key), tok("EQ", "="), value])
            .collect::<Vec<_>>();
        let mut flat = Vec::new();
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                flat.push(tok("COMMA", ","));
            }
            flat.extend(item);
        }
        kid.push(r("kw_expr_list", flat));
    }
    (!kid.is_empty()).then(|| r("param_list", kid))
}

/// `callee(args, key=value)`
pub fn call_kw(callee: Node, args: Vec<Node>, kwargs: Vec<(&str, Node)>) -> Node {
    let mut kid = vec![tok("LPAREN", "(")];
    kid.extend(param_list(args, kwargs));
    kid.push(tok("RPAREN", ")"));
    trailer(callee, vec![r("ability_call", kid)])
}

pub fn call(callee: Node, args: Vec<Node>) -> Node {
    call_kw(callee, args, Vec::new())
}

/// A dotted action call such as `std.log(x)`.
pub fn action(path: &str, args: Vec<Node>) -> Node {
    let mut parts = path.split('.');
    let mut callee = name(parts.next().unwrap_or_default());
    for part in parts {
        callee = field(callee, part);
    }
    call(callee, args)
}

fn ability_op(arch: Option<&str>) -> Node {
    match arch {
        Some(arch) => r(
            "ability_op",
            vec![tok("DBL_COLON", "::"), tok("NAME", arch), tok("COLON", ":")],
        ),
        None => r("ability_op", vec![tok("DBL_COLON", "::")]),
    }
}

/// `target::ability(ctx)`
pub fn ability(target: Node, ability: &str, ctx: Vec<(&str, Node)>) -> Node {
    let mut kid = vec![ability_op(None), tok("NAME", ability)];
    kid.extend(spawn_ctx(ctx));
    trailer(target, vec![r("ability_call", kid)])
}

/// `::ability`, on the current scope owner.
pub fn own_ability(ability: &str) -> Node {
    r("atom", vec![ability_op(None), tok("NAME", ability)])
}

fn built_in(base: Node, inner: Node) -> Node {
    trailer(base, vec![tok("DOT", "."), r("built_in", vec![inner])])
}

fn obj_built_in(base: Node, token: &str, text: &str) -> Node {
    built_in(base, r("obj_built_in", vec![tok(token, text)]))
}

pub fn context_of(base: Node) -> Node {
    obj_built_in(base, "KW_CONTEXT", "context")
}

pub fn info_of(base: Node) -> Node {
    obj_built_in(base, "KW_INFO", "info")
}

pub fn details_of(base: Node) -> Node {
    obj_built_in(base, "KW_DETAILS", "details")
}

pub fn keys_of(base: Node) -> Node {
    built_in(base, r("dict_built_in", vec![tok("KW_KEYS", "keys")]))
}

pub fn length_of(base: Node) -> Node {
    built_in(base, r("list_built_in", vec![tok("KW_LENGTH", "length")]))
}

/// `.int`, `.str`, `.edge`, `.node`, ...
pub fn cast(base: Node, ty: &str) -> Node {
    built_in(base, r("cast_built_in", vec![any_type(ty)]))
}

/// `.{a, b}`
pub fn pluck(base: Node, keys: &[&str]) -> Node {
    let names = comma_separated(keys.iter().map(|k| tok("NAME", k)).collect());
    built_in(
        base,
        r(
            "dict_built_in",
            vec![tok("LBRACE", "{"), r("name_list", names), tok("RBRACE", "}")],
        ),
    )
}

/// `.dict::name(args)`, `.list::name(args)` or `.str::name(args)`.
///
/// `family` is `dict`, `list` or `str`; `args` of `None` omits the parentheses.
pub fn method(base: Node, family: &str, method: &str, args: Option<Vec<Node>>) -> Node {
    let (rule, token) = match family {
        "dict" => ("dict_built_in", "DICT_DBL_COLON"),
        "list" => ("list_built_in", "LIST_DBL_COLON"),
        _ => ("string_built_in", "STR_DBL_COLON"),
    };
    let mut kid = vec![tok(token, &format!("{family}::")), tok("NAME", method)];
    if let Some(args) = args {
        kid.push(tok("LPAREN", "("));
        if !args.is_empty() {
            kid.push(expr_list(args));
        }
        kid.push(tok("RPAREN", ")"));
    }
    built_in(base, r(rule, kid))
}

pub fn global(var: &str) -> Node {
    r(
        "atom",
        vec![r(
            "global_ref",
            vec![tok("KW_GLOBAL", "global"), tok("DOT", "."), tok("NAME", var)],
        )],
    )
}

pub fn global_context() -> Node {
    r(
        "atom",
        vec![r(
            "global_ref",
            vec![
                tok("KW_GLOBAL", "global"),
                tok("DOT", "."),
                r("obj_built_in", vec![tok("KW_CONTEXT", "context")]),
            ],
        )],
    )
}

pub fn reference(target: Node) -> Node {
    r("atom", vec![r("ref", vec![tok("BAND", "&"), atom_of(target)])])
}

pub fn deref(target: Node) -> Node {
    r("atom", vec![r("deref", vec![tok("STAR_MUL", "*"), atom_of(target)])])
}

// ============================================================================
// Graph references
// ============================================================================

/// `field <op> value` inside `(...)` filters.
pub fn filter(field: &str, op: &str, value: Node) -> Node {
    r("filter_compare", vec![tok("NAME", field), cmp_op(op), expression(value)])
}

fn filter_ctx(filters: Vec<Node>) -> Node {
    let mut kid = vec![tok("LPAREN", "(")];
    kid.extend(comma_separated(filters));
    kid.push(tok("RPAREN", ")"));
    r("filter_ctx", kid)
}

fn edge(rule: &str, plain: &str, open: &str, close: &str, arch: Option<&str>, filters: Vec<Node>) -> Node {
    let inner = match arch {
        None => r(rule, vec![tok("ARROW", plain)]),
        Some(arch) => {
            let mut kid = vec![tok("MINUS", open), tok("LSQUARE", "["), tok("NAME", arch)];
            if !filters.is_empty() {
                kid.push(filter_ctx(filters));
            }
            kid.push(tok("RSQUARE", "]"));
            kid.push(tok("ARROW", close));
            r(rule, kid)
        }
    };
    r("edge_ref", vec![inner])
}

/// `-->` or `-[arch(filters)]->`
pub fn edge_to(arch: Option<&str>, filters: Vec<Node>) -> Node {
    edge("edge_to", "-->", "-", "->", arch, filters)
}

/// `<--` or `<-[arch(filters)]-`
pub fn edge_from(arch: Option<&str>, filters: Vec<Node>) -> Node {
    edge("edge_from", "<--", "<-", "-", arch, filters)
}

/// `<-->` or `<-[arch(filters)]->`
pub fn edge_any(arch: Option<&str>, filters: Vec<Node>) -> Node {
    edge("edge_any", "<-->", "<-", "->", arch, filters)
}

/// `node::arch`, optionally filtered.
pub fn node_ref(arch: &str, filters: Vec<Node>) -> Vec<Node> {
    let mut out = vec![r(
        "node_ref",
        vec![tok("NODE_DBL_COLON", "node::"), tok("NAME", arch)],
    )];
    if !filters.is_empty() {
        out.push(filter_ctx(filters));
    }
    out
}

/// Chain edge and node steps into a `node_edge_ref`.
///
/// Each step is an [`edge_to`]-style node or the output of [`node_ref`].
pub fn traverse(steps: Vec<Vec<Node>>) -> Node {
    let mut chain: Option<Node> = None;
    for mut step in steps.into_iter().rev() {
        step.extend(chain.take());
        chain = Some(r("node_edge_ref", step));
    }
    r("atom", chain.into_iter().collect())
}

/// `-->`
pub fn out_nodes() -> Node {
    traverse(vec![vec![edge_to(None, Vec::new())]])
}

fn connect_inner(rule: &str, plain: &str, open: &str, close: &str, edge: Option<&str>, ctx: Vec<(&str, Node)>) -> Node {
    let inner = match edge {
        None => r(rule, vec![tok("CONNECT", plain)]),
        Some(edge) => {
            let mut kid = vec![tok("PLUS", open), tok("LSQUARE", "["), tok("NAME", edge)];
            kid.extend(spawn_ctx(ctx));
            kid.push(tok("RSQUARE", "]"));
            kid.push(tok("CONNECT", close));
            r(rule, kid)
        }
    };
    r("connect_op", vec![inner])
}

/// `++>` or `+[edge(ctx)]+>`
pub fn connect_to(edge: Option<&str>, ctx: Vec<(&str, Node)>) -> Node {
    connect_inner("connect_to", "++>", "+", "+>", edge, ctx)
}

/// `<++` or `<+[edge(ctx)]+`
pub fn connect_from(edge: Option<&str>, ctx: Vec<(&str, Node)>) -> Node {
    connect_inner("connect_from", "<++", "<+", "+", edge, ctx)
}

/// `<++>` or `<+[edge(ctx)]+>`
pub fn connect_any(edge: Option<&str>, ctx: Vec<(&str, Node)>) -> Node {
    connect_inner("connect_any", "<++>", "<+", "+>", edge, ctx)
}

pub fn connect(lhs: Node, op: Node, rhs: Node) -> Node {
    r("connect", vec![lhs, op, expression(rhs)])
}

/// `lhs !<edge> rhs`
pub fn disconnect(lhs: Node, edge: Node, rhs: Node) -> Node {
    r("connect", vec![lhs, tok("NOT", "!"), edge, expression(rhs)])
}

// ============================================================================
// Spawning
// ============================================================================

fn spawn_ctx(assigns: Vec<(&str, Node)>) -> Option<Node> {
    if assigns.is_empty() {
        return None;
    }
    let assigns = assigns
        .into_iter()
        .map(|(key, value)| r("spawn_assign", vec![tok("NAME", key), tok("EQ", "="), expression(value)]))
        .collect();
    let mut kid = vec![tok("LPAREN", "(")];
    kid.extend(comma_separated(assigns));
    kid.push(tok("RPAREN", ")"));
    Some(r("spawn_ctx", kid))
}

fn spawn(object: Node) -> Node {
    r(
        "atom",
        vec![r("spawn", vec![tok("KW_SPAWN", "spawn"), r("spawn_object", vec![object])])],
    )
}

fn spawn_edge(from: Option<(Node, Node)>) -> Option<Node> {
    from.map(|(location, op)| r("spawn_edge", vec![expression(location), op]))
}

/// `spawn [from op] node::arch(ctx)`
pub fn spawn_node(from: Option<(Node, Node)>, arch: &str, ctx: Vec<(&str, Node)>) -> Node {
    let mut kid: Vec<Node> = spawn_edge(from).into_iter().collect();
    kid.extend(node_ref(arch, Vec::new()));
    kid.extend(spawn_ctx(ctx));
    spawn(r("node_spawn", kid))
}

/// `spawn location walker::name(ctx)`
pub fn spawn_walker(location: Node, walker: &str, ctx: Vec<(&str, Node)>) -> Node {
    let mut kid = vec![
        expression(location),
        r("walker_ref", vec![tok("WALKER_DBL_COLON", "walker::"), tok("NAME", walker)]),
    ];
    kid.extend(spawn_ctx(ctx));
    spawn(r("walker_spawn", kid))
}

/// `spawn [from op] graph::name`
pub fn spawn_graph(from: Option<(Node, Node)>, graph: &str) -> Node {
    let mut kid: Vec<Node> = spawn_edge(from).into_iter().collect();
    kid.push(r("graph_ref", vec![tok("GRAPH_DBL_COLON", "graph::"), tok("NAME", graph)]));
    spawn(r("graph_spawn", kid))
}

// ============================================================================
// Statements
// ============================================================================

fn semi() -> Node {
    tok("SEMI", ";")
}

fn statement(inner: Vec<Node>) -> Node {
    r("statement", inner)
}

pub fn block(stmts: Vec<Node>) -> Node {
    let mut kid = vec![tok("LBRACE", "{")];
    kid.extend(stmts);
    kid.push(tok("RBRACE", "}"));
    r("code_block", kid)
}

/// `expr;`
pub fn expr_stmt(expr: Node) -> Node {
    statement(vec![expression(expr), semi()])
}

pub fn block_stmt(stmts: Vec<Node>) -> Node {
    statement(vec![block(stmts)])
}

/// `arch1, arch2 { ... }`
pub fn node_ctx(archs: &[&str], stmts: Vec<Node>) -> Node {
    let names = comma_separated(archs.iter().map(|a| tok("NAME", a)).collect());
    statement(vec![r("node_ctx_block", vec![r("name_list", names), block(stmts)])])
}

pub fn if_stmt(cond: Node, then: Vec<Node>, elifs: Vec<(Node, Vec<Node>)>, otherwise: Option<Vec<Node>>) -> Node {
    let mut kid = vec![tok("KW_IF", "if"), expression(cond), block(then)];
    for (cond, body) in elifs {
        kid.push(r("elif_stmt", vec![tok("KW_ELIF", "elif"), expression(cond), block(body)]));
    }
    if let Some(body) = otherwise {
        kid.push(r("else_stmt", vec![tok("KW_ELSE", "else"), block(body)]));
    }
    statement(vec![r("if_stmt", kid)])
}

/// `try { ... } else with err { ... }`
pub fn try_stmt(body: Vec<Node>, binding: Option<&str>, otherwise: Option<Vec<Node>>) -> Node {
    let mut kid = vec![tok("KW_TRY", "try"), block(body)];
    if let Some(handler) = otherwise {
        let mut else_kid = vec![tok("KW_ELSE", "else")];
        if let Some(binding) = binding {
            else_kid.push(tok("KW_WITH", "with"));
            else_kid.push(tok("NAME", binding));
        }
        else_kid.push(block(handler));
        kid.push(r("else_from_try", else_kid));
    }
    statement(vec![r("try_stmt", kid)])
}

/// `for init to cond by step { ... }`
pub fn for_to(init: Node, cond: Node, step: Node, body: Vec<Node>) -> Node {
    statement(vec![r(
        "for_stmt",
        vec![
            tok("KW_FOR", "for"),
            expression(init),
            tok("KW_TO", "to"),
            expression(cond),
            tok("KW_BY", "by"),
            expression(step),
            block(body),
        ],
    )])
}

pub fn for_in(var: &str, iter: Node, body: Vec<Node>) -> Node {
    statement(vec![r(
        "for_stmt",
        vec![
            tok("KW_FOR", "for"),
            tok("NAME", var),
            tok("KW_IN", "in"),
            expression(iter),
            block(body),
        ],
    )])
}

pub fn for_kv(key: &str, value: &str, iter: Node, body: Vec<Node>) -> Node {
    statement(vec![r(
        "for_stmt",
        vec![
            tok("KW_FOR", "for"),
            tok("NAME", key),
            tok("COMMA", ","),
            tok("NAME", value),
            tok("KW_IN", "in"),
            expression(iter),
            block(body),
        ],
    )])
}

pub fn while_stmt(cond: Node, body: Vec<Node>) -> Node {
    statement(vec![r(
        "while_stmt",
        vec![tok("KW_WHILE", "while"), expression(cond), block(body)],
    )])
}

fn ctrl(token: &str, text: &str) -> Node {
    statement(vec![r("ctrl_stmt", vec![tok(token, text)]), semi()])
}

pub fn break_stmt() -> Node {
    ctrl("KW_BREAK", "break")
}

pub fn continue_stmt() -> Node {
    ctrl("KW_CONTINUE", "continue")
}

pub fn skip_stmt() -> Node {
    ctrl("KW_SKIP", "skip")
}

pub fn assert_stmt(cond: Node) -> Node {
    statement(vec![r("assert_stmt", vec![tok("KW_ASSERT", "assert"), expression(cond)]), semi()])
}

pub fn destroy(target: Node) -> Node {
    statement(vec![r(
        "destroy_action",
        vec![tok("KW_DESTROY", "destroy"), expression(target), semi()],
    )])
}

fn report_action(value: Node) -> Node {
    r("report_action", vec![tok("KW_REPORT", "report"), expression(value), semi()])
}

pub fn report(value: Node) -> Node {
    statement(vec![report_action(value)])
}

/// `report:field = value;`
pub fn report_field(field: &str, value: Node) -> Node {
    statement(vec![r(
        "report_action",
        vec![
            tok("KW_REPORT", "report"),
            tok("COLON", ":"),
            tok("NAME", field),
            tok("EQ", "="),
            expression(value),
            semi(),
        ],
    )])
}

fn walker_action(inner: Node) -> Node {
    statement(vec![r("walker_action", vec![inner])])
}

fn take_action(style: Option<&str>, target: Node, otherwise: Option<Vec<Node>>) -> Node {
    let mut kid = vec![tok("KW_TAKE", "take")];
    if let Some(style) = style {
        kid.push(tok("COLON", ":"));
        kid.push(tok("NAME", style));
    }
    kid.push(expression(target));
    match otherwise {
        Some(body) => kid.push(r("else_stmt", vec![tok("KW_ELSE", "else"), block(body)])),
        None => kid.push(semi()),
    }
    r("take_action", kid)
}

pub fn take(target: Node) -> Node {
    walker_action(take_action(None, target, None))
}

/// `take:style target else { ... }`
pub fn take_with(style: Option<&str>, target: Node, otherwise: Option<Vec<Node>>) -> Node {
    walker_action(take_action(style, target, otherwise))
}

pub fn ignore(target: Node) -> Node {
    walker_action(r(
        "ignore_action",
        vec![tok("KW_IGNORE", "ignore"), expression(target), semi()],
    ))
}

fn disengage_action(report: Option<Node>) -> Node {
    let tail = match report {
        Some(value) => report_action(value),
        None => semi(),
    };
    r("disengage_action", vec![tok("KW_DISENGAGE", "disengage"), tail])
}

pub fn disengage(report: Option<Node>) -> Node {
    walker_action(disengage_action(report))
}

/// What a `yield` carries out before suspending.
pub enum YieldWith {
    Nothing,
    Report(Node),
    Disengage(Option<Node>),
    Take(Node),
}

pub fn yield_stmt(with: YieldWith) -> Node {
    let tail = match with {
        YieldWith::Nothing => semi(),
        YieldWith::Report(value) => report_action(value),
        YieldWith::Disengage(report) => disengage_action(report),
        YieldWith::Take(target) => take_action(None, target, None),
    };
    walker_action(r("yield_action", vec![tok("KW_YIELD", "yield"), tail]))
}

// ============================================================================
// Declarations
// ============================================================================

/// A `start` rule over top-level elements.
pub fn program(elements: Vec<Node>) -> Node {
    r(
        "start",
        elements
            .into_iter()
            .map(|e| if e.is("element") { e } else { r("element", vec![e]) })
            .collect(),
    )
}

/// `global NAME = value;`
pub fn global_var(var: &str, value: Node) -> Node {
    r(
        "global_var",
        vec![
            tok("KW_GLOBAL", "global"),
            tok("NAME", var),
            tok("EQ", "="),
            expression(value),
            semi(),
        ],
    )
}

/// One `has` variable.
pub struct HasSpec<'a> {
    pub name: &'a str,
    pub default: Option<Node>,
    pub private: bool,
    pub anchor: bool,
}

impl<'a> HasSpec<'a> {
    pub fn new(name: &'a str) -> Self {
        Self {
            name,
            default: None,
            private: false,
            anchor: false,
        }
    }

    pub fn default(mut self, value: Node) -> Self {
        self.default = Some(value);
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    pub fn anchor(mut self) -> Self {
        self.anchor = true;
        self
    }
}

/// `has a, b = 1;`
pub fn has(vars: Vec<HasSpec<'_>>) -> Node {
    let assigns = vars
        .into_iter()
        .map(|spec| {
            let mut kid = Vec::new();
            if spec.private {
                kid.push(tok("KW_PRIVATE", "private"));
            }
            if spec.anchor {
                kid.push(tok("KW_ANCHOR", "anchor"));
            }
            kid.push(tok("NAME", spec.name));
            if let Some(value) = spec.default {
                kid.push(tok("EQ", "="));
                kid.push(expression(value));
            }
            r("has_assign", kid)
        })
        .collect();
    let mut kid = vec![tok("KW_HAS", "has")];
    kid.extend(comma_separated(assigns));
    kid.push(semi());
    r("attr_stmt", vec![r("has_stmt", kid)])
}

/// Shorthand for `has` with plain, default-less variables.
pub fn has_names(names: &[&str]) -> Node {
    has(names.iter().map(|n| HasSpec::new(n)).collect())
}

fn event_clause(event: &str, walkers: &[&str]) -> Node {
    let mut kid = vec![tok("KW_WITH", "with")];
    if !walkers.is_empty() {
        let names = comma_separated(walkers.iter().map(|w| tok("NAME", w)).collect());
        kid.push(r("name_list", names));
    }
    let token = match event {
        "entry" => "KW_ENTRY",
        "exit" => "KW_EXIT",
        _ => "KW_ACTIVITY",
    };
    kid.push(tok(token, event));
    r("event_clause", kid)
}

/// `can name with w1, w2 entry { ... }`. `event` is `entry`, `exit` or `activity`.
pub fn can(ability: &str, event: Option<&str>, walkers: &[&str], body: Vec<Node>) -> Node {
    let mut kid = vec![tok("KW_CAN", "can"), tok("NAME", ability)];
    if let Some(event) = event {
        kid.push(event_clause(event, walkers));
    }
    kid.push(block(body));
    r("attr_stmt", vec![r("can_stmt", kid)])
}

/// Preset arguments for an action ability: `::args::> output`.
pub struct PresetSpec {
    pub args: Vec<Node>,
    pub output: Option<Node>,
}

/// `can module.action::args::> output with event;`
pub fn can_action(
    action: &str,
    preset: Option<PresetSpec>,
    event: Option<&str>,
    walkers: &[&str],
) -> Node {
    let names = action
        .split('.')
        .enumerate()
        .flat_map(|(i, part)| {
            let mut out = Vec::new();
            if i > 0 {
                out.push(tok("DOT", "."));
            }
            out.push(tok("NAME", part));
            out
        })
        .collect();
    let mut kid = vec![tok("KW_CAN", "can"), r("dotted_name", names)];
    if let Some(preset) = preset {
        let mut preset_kid = vec![tok("DBL_COLON", "::")];
        preset_kid.extend(param_list(preset.args, Vec::new()));
        match preset.output {
            Some(output) => {
                preset_kid.push(tok("COLON_OUT", "::>"));
                preset_kid.push(expression(output));
            }
            None => preset_kid.push(tok("DBL_COLON", "::")),
        }
        kid.push(r("preset_in_out", preset_kid));
    }
    if let Some(event) = event {
        kid.push(event_clause(event, walkers));
    }
    kid.push(semi());
    r("attr_stmt", vec![r("can_stmt", kid)])
}

fn arch(keyword: &str, text: &str, arch: &str, supers: &[&str], body: Node) -> Node {
    let mut kid = vec![tok(keyword, text), tok("NAME", arch)];
    for sup in supers {
        kid.push(tok("COLON", ":"));
        kid.push(tok("NAME", sup));
    }
    kid.push(body);
    r("architype", kid)
}

fn attr_block(attrs: Vec<Node>) -> Node {
    let mut kid = vec![tok("LBRACE", "{")];
    kid.extend(attrs);
    kid.push(tok("RBRACE", "}"));
    r("attr_block", kid)
}

/// `node name: super { attrs }`
pub fn node_arch(node: &str, supers: &[&str], attrs: Vec<Node>) -> Node {
    arch("KW_NODE", "node", node, supers, attr_block(attrs))
}

/// `edge name: super { attrs }`
pub fn edge_arch(edge: &str, supers: &[&str], attrs: Vec<Node>) -> Node {
    arch("KW_EDGE", "edge", edge, supers, attr_block(attrs))
}

/// `with entry { ... }` inside a walker.
pub fn walk_entry(stmts: Vec<Node>) -> Node {
    r("walk_entry_block", vec![tok("KW_WITH", "with"), tok("KW_ENTRY", "entry"), block(stmts)])
}

/// `with exit { ... }` inside a walker.
pub fn walk_exit(stmts: Vec<Node>) -> Node {
    r("walk_exit_block", vec![tok("KW_WITH", "with"), tok("KW_EXIT", "exit"), block(stmts)])
}

/// `with activity { ... }` inside a walker.
pub fn walk_activity(stmts: Vec<Node>) -> Node {
    r(
        "walk_activity_block",
        vec![tok("KW_WITH", "with"), tok("KW_ACTIVITY", "activity"), block(stmts)],
    )
}

fn walker_block(items: Vec<Node>) -> Node {
    let mut kid = vec![tok("LBRACE", "{")];
    kid.extend(items);
    kid.push(tok("RBRACE", "}"));
    r("walker_block", kid)
}

/// `walker name { items }`; items are `has`/`can` attrs, statements and walk blocks.
pub fn walker_arch(walker: &str, items: Vec<Node>) -> Node {
    arch("KW_WALKER", "walker", walker, &[], walker_block(items))
}

fn graph_block(anchor: &str, spawn: Vec<Node>) -> Node {
    r(
        "graph_block",
        vec![r(
            "graph_block_spawn",
            vec![
                tok("LBRACE", "{"),
                r(
                    "has_root",
                    vec![tok("KW_HAS", "has"), tok("KW_ANCHOR", "anchor"), tok("NAME", anchor), semi()],
                ),
                tok("KW_SPAWN", "spawn"),
                block(spawn),
                tok("RBRACE", "}"),
            ],
        )],
    )
}

/// `graph name { has anchor root; spawn { ... } }`
pub fn graph_arch(graph: &str, anchor: &str, spawn: Vec<Node>) -> Node {
    arch("KW_GRAPH", "graph", graph, &[], graph_block(anchor, spawn))
}

/// Graph under test: a declared graph or an inline block.
pub enum TestGraphSpec<'a> {
    Named(&'a str),
    Inline { anchor: &'a str, spawn: Vec<Node> },
}

/// Walker under test: a declared walker or an inline walker body.
pub enum TestWalkerSpec<'a> {
    Named {
        walker: &'a str,
        ctx: Vec<(&'a str, Node)>,
        asserts: Option<Vec<Node>>,
    },
    Inline(Vec<Node>),
}

/// `test "title" with graph by walker`
pub fn test_case(title: &str, graph: TestGraphSpec<'_>, walker: TestWalkerSpec<'_>) -> Node {
    let mut kid = vec![tok("KW_TEST", "test"), string_token(title), tok("KW_WITH", "with")];
    match graph {
        TestGraphSpec::Named(graph) => kid.push(r(
            "graph_ref",
            vec![tok("GRAPH_DBL_COLON", "graph::"), tok("NAME", graph)],
        )),
        TestGraphSpec::Inline { anchor, spawn } => {
            kid.push(tok("KW_GRAPH", "graph"));
            kid.push(graph_block(anchor, spawn));
        }
    }
    kid.push(tok("KW_BY", "by"));
    match walker {
        TestWalkerSpec::Named {
            walker,
            ctx,
            asserts,
        } => {
            kid.push(r(
                "walker_ref",
                vec![tok("WALKER_DBL_COLON", "walker::"), tok("NAME", walker)],
            ));
            kid.extend(spawn_ctx(ctx));
            match asserts {
                Some(stmts) => kid.push(block(stmts)),
                None => kid.push(semi()),
            }
        }
        TestWalkerSpec::Inline(items) => {
            kid.push(tok("KW_WALKER", "walker"));
            kid.push(walker_block(items));
        }
    }
    r("test", kid)
}
