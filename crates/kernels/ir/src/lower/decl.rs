//! Declaration lowering: globals, architypes and tests.

use jac_foundation::ArchKind;

use super::expr::{lower_expr, param_list, spawn_ctx_opt};
use super::stmt::{lower_block, lower_stmt};
use super::{invalid_literal, kid, last_name, malformed, name_list, opt_block, required, unknown, Result};
use crate::escape::string_token;
use crate::{
    AbilityBody, AbilityDef, AbilityEvent, ArchBody, ArchDef, Decl, GlobalVar, GraphBlock, HasVar,
    Preset, SyntaxNode, TestCase, TestGraph, TestWalker, WalkerItem,
};

pub(crate) fn lower_element(node: &SyntaxNode) -> Result<Vec<Decl>> {
    match node.name.as_str() {
        "element" => {
            let mut decls = Vec::new();
            for kid in &node.kid {
                decls.extend(lower_element(kid)?);
            }
            Ok(decls)
        }
        "global_var" => global_var(node),
        "architype" => Ok(vec![Decl::Architype(architype(node)?)]),
        "test" => Ok(vec![Decl::Test(test(node)?)]),
        _ => Err(unknown(node)),
    }
}

/// `KW_GLOBAL NAME EQ expression (COMMA NAME EQ expression)* SEMI`
fn global_var(node: &SyntaxNode) -> Result<Vec<Decl>> {
    let mut decls = Vec::new();
    for (i, name) in node.kid.iter().enumerate() {
        if !name.is("NAME") {
            continue;
        }
        let value = node
            .kid
            .get(i + 2)
            .ok_or_else(|| malformed(node, format!("global '{}' has no value", name.text())))?;
        decls.push(Decl::Global(GlobalVar {
            name: name.text().to_string(),
            value: lower_expr(value)?,
            loc: name.loc.clone(),
        }));
    }
    Ok(decls)
}

fn arch_kind(token: &SyntaxNode) -> Result<ArchKind> {
    match token.name.as_str() {
        "KW_NODE" => Ok(ArchKind::Node),
        "KW_EDGE" => Ok(ArchKind::Edge),
        "KW_GRAPH" => Ok(ArchKind::Graph),
        "KW_WALKER" => Ok(ArchKind::Walker),
        _ => Err(malformed(token, "expected an architype keyword")),
    }
}

/// `KW_NODE NAME (COLON NAME)* attr_block | KW_GRAPH NAME graph_block | KW_WALKER NAME walker_block`
fn architype(node: &SyntaxNode) -> Result<ArchDef> {
    let kind = arch_kind(kid(node, 0)?)?;
    let name = kid(node, 1)?;
    if !name.is("NAME") {
        return Err(malformed(node, "missing architype name"));
    }
    let supers = node.kid[2..]
        .iter()
        .filter(|k| k.is("NAME"))
        .map(|k| k.text().to_string())
        .collect();
    let body = if let Some(block) = node.child("attr_block") {
        attr_block(block)?
    } else if let Some(block) = node.child("walker_block") {
        walker_block(block)?
    } else if let Some(block) = node.child("graph_block") {
        ArchBody {
            graph: Some(graph_block(block)?),
            ..Default::default()
        }
    } else {
        return Err(malformed(node, "missing architype body"));
    };
    Ok(ArchDef {
        kind,
        name: name.text().to_string(),
        supers,
        body,
        loc: node.loc.clone(),
    })
}

/// `LBRACE attr_stmt* RBRACE | COLON attr_stmt | SEMI`
fn attr_block(node: &SyntaxNode) -> Result<ArchBody> {
    let mut body = ArchBody::default();
    for stmt in &node.kid {
        attr_stmt(stmt, &mut body)?;
    }
    Ok(body)
}

fn attr_stmt(node: &SyntaxNode, body: &mut ArchBody) -> Result<()> {
    match node.name.as_str() {
        "attr_stmt" => {
            for inner in &node.kid {
                attr_stmt(inner, body)?;
            }
        }
        "has_stmt" => {
            for assign in node.children("has_assign") {
                body.has.push(has_assign(assign)?);
            }
        }
        "can_stmt" => body.abilities.extend(can_stmt(node)?),
        "LBRACE" | "RBRACE" | "COLON" | "SEMI" => {}
        _ => return Err(unknown(node)),
    }
    Ok(())
}

/// `KW_PRIVATE? KW_ANCHOR? (NAME | NAME EQ expression)`
fn has_assign(node: &SyntaxNode) -> Result<HasVar> {
    let name = required(node, "NAME")?;
    let default = match node.kid.iter().position(|k| k.is("EQ")) {
        Some(eq) => Some(lower_expr(kid(node, eq + 1)?)?),
        None => None,
    };
    Ok(HasVar {
        name: name.text().to_string(),
        private: node.has("KW_PRIVATE"),
        anchor: node.has("KW_ANCHOR"),
        default,
        loc: name.loc.clone(),
    })
}

fn dotted_name(node: &SyntaxNode) -> String {
    if node.is_terminal() {
        return node.text().to_string();
    }
    name_list(node).join(".")
}

/// `KW_CAN NAME event_clause? code_block`, or action bindings
/// `KW_CAN dotted_name (preset_in_out event_clause)? (COMMA ...)* SEMI`.
fn can_stmt(node: &SyntaxNode) -> Result<Vec<AbilityDef>> {
    if let Some(block) = node.child("code_block") {
        let (event, access_list) = match node.child("event_clause") {
            Some(clause) => event_clause(clause)?,
            None => (AbilityEvent::Activity, Vec::new()),
        };
        return Ok(vec![AbilityDef {
            name: last_name(node)?,
            event,
            access_list,
            body: AbilityBody::Code(lower_block(block)?),
            loc: node.loc.clone(),
        }]);
    }

    let mut abilities: Vec<AbilityDef> = Vec::new();
    for kid in &node.kid[1..] {
        match kid.name.as_str() {
            "dotted_name" | "NAME" => {
                let action = dotted_name(kid);
                abilities.push(AbilityDef {
                    name: action.clone(),
                    event: AbilityEvent::Activity,
                    access_list: Vec::new(),
                    body: AbilityBody::Action {
                        action,
                        preset: None,
                    },
                    loc: kid.loc.clone(),
                });
            }
            "preset_in_out" => {
                let current = abilities
                    .last_mut()
                    .ok_or_else(|| malformed(node, "preset without action"))?;
                if let AbilityBody::Action { preset, .. } = &mut current.body {
                    *preset = Some(preset_in_out(kid)?);
                }
            }
            "event_clause" => {
                let current = abilities
                    .last_mut()
                    .ok_or_else(|| malformed(node, "event clause without action"))?;
                (current.event, current.access_list) = event_clause(kid)?;
            }
            "COMMA" | "SEMI" => {}
            _ => return Err(unknown(kid)),
        }
    }
    Ok(abilities)
}

/// `KW_WITH name_list? (KW_ENTRY | KW_EXIT | KW_ACTIVITY)`
fn event_clause(node: &SyntaxNode) -> Result<(AbilityEvent, Vec<String>)> {
    let event = if node.has("KW_ENTRY") {
        AbilityEvent::Entry
    } else if node.has("KW_EXIT") {
        AbilityEvent::Exit
    } else if node.has("KW_ACTIVITY") {
        AbilityEvent::Activity
    } else {
        return Err(malformed(node, "missing entry, exit or activity"));
    };
    let access = node.child("name_list").map(name_list).unwrap_or_default();
    Ok((event, access))
}

/// `DBL_COLON param_list? (DBL_COLON | COLON_OUT expression)`
fn preset_in_out(node: &SyntaxNode) -> Result<Preset> {
    let (args, kwargs) = match node.child("param_list") {
        Some(params) => param_list(params)?,
        None => (Vec::new(), Vec::new()),
    };
    let output = node.child("expression").map(lower_expr).transpose()?;
    Ok(Preset {
        args,
        kwargs,
        output,
    })
}

/// `LBRACE attr_stmt* walk_entry_block? (statement | walk_activity_block)* walk_exit_block? RBRACE`
fn walker_block(node: &SyntaxNode) -> Result<ArchBody> {
    let mut body = ArchBody::default();
    for kid in &node.kid {
        match kid.name.as_str() {
            "attr_stmt" => attr_stmt(kid, &mut body)?,
            "walk_entry_block" => {
                body.walker
                    .push(WalkerItem::Entry(lower_block(required(kid, "code_block")?)?));
            }
            "walk_exit_block" => {
                body.walker
                    .push(WalkerItem::Exit(lower_block(required(kid, "code_block")?)?));
            }
            "walk_activity_block" => {
                body.walker
                    .push(WalkerItem::Activity(lower_block(required(kid, "code_block")?)?));
            }
            "statement" => body.walker.push(WalkerItem::Stmt(lower_stmt(kid)?)),
            "LBRACE" | "RBRACE" => {}
            _ => return Err(unknown(kid)),
        }
    }
    Ok(body)
}

/// `graph_block_spawn: LBRACE has_root can_block KW_SPAWN code_block RBRACE`
fn graph_block(node: &SyntaxNode) -> Result<GraphBlock> {
    let inner = match node.child("graph_block_spawn") {
        Some(inner) => inner,
        None if node.is("graph_block_spawn") || node.has("has_root") => node,
        None => return Err(malformed(node, "only spawn style graph blocks are supported")),
    };
    let mut abilities = Vec::new();
    if let Some(cans) = inner.child("can_block") {
        for can in cans.children("can_stmt") {
            abilities.extend(can_stmt(can)?);
        }
    }
    Ok(GraphBlock {
        anchor: last_name(required(inner, "has_root")?)?,
        abilities,
        spawn: lower_block(required(inner, "code_block")?)?,
        loc: node.loc.clone(),
    })
}

/// `KW_TEST NAME? STRING KW_WITH (graph_ref | KW_GRAPH graph_block) KW_BY
/// ((walker_ref spawn_ctx? (code_block | SEMI)) | KW_WALKER walker_block)`
fn test(node: &SyntaxNode) -> Result<TestCase> {
    let title_node = node
        .child("STRING")
        .or_else(|| node.child("multistring"))
        .ok_or_else(|| malformed(node, "missing test title"))?;
    let title = if title_node.is_terminal() {
        string_token(title_node.text()).map_err(|e| invalid_literal(title_node, e))?
    } else {
        let mut title = String::new();
        for token in &title_node.kid {
            title.push_str(&string_token(token.text()).map_err(|e| invalid_literal(token, e))?);
        }
        title
    };

    let graph = if let Some(graph_ref) = node.child("graph_ref") {
        TestGraph::Ref(last_name(graph_ref)?)
    } else {
        TestGraph::Inline(graph_block(required(node, "graph_block")?)?)
    };

    let walker = if let Some(walker_ref) = node.child("walker_ref") {
        TestWalker::Ref {
            name: last_name(walker_ref)?,
            ctx: spawn_ctx_opt(node)?,
            asserts: opt_block(node.child("code_block"))?,
        }
    } else {
        TestWalker::Inline(walker_block(required(node, "walker_block")?)?)
    };

    Ok(TestCase {
        title,
        graph,
        walker,
        loc: node.loc.clone(),
    })
}
