//! `std` action set: output, globals, permissions and small helpers.

use chrono::Utc;
use tracing::{info, warn};

use jac_foundation::{operators, Value};
use jac_store::AccessMode;

use super::{render, ActionArgs, ActionContext, ActionFn};
use crate::error::{Error, Result};

pub(super) fn actions() -> Vec<(&'static str, ActionFn)> {
    vec![
        ("log", log as ActionFn),
        ("out", out),
        ("err", err),
        ("round", round),
        ("sort_by_key", sort_by_key),
        ("time_now", time_now),
        ("set_global", set_global),
        ("get_global", get_global),
        ("destroy_global", destroy_global),
        ("set_perms", set_perms),
        ("get_perms", get_perms),
        ("grant_perms", grant_perms),
        ("revoke_perms", revoke_perms),
        ("actions", list_actions),
    ]
}

fn joined(args: &ActionArgs) -> String {
    args.args.iter().map(render).collect::<Vec<_>>().join(" ")
}

fn log(ctx: &mut ActionContext<'_>, args: &ActionArgs) -> Result<Value> {
    let line: String = args.args.iter().map(render).collect();
    info!(target: "jac_runtime::program", "{line}");
    ctx.output.out(&line);
    Ok(Value::Str(line))
}

fn out(ctx: &mut ActionContext<'_>, args: &ActionArgs) -> Result<Value> {
    ctx.output.out(&joined(args));
    Ok(Value::Null)
}

fn err(ctx: &mut ActionContext<'_>, args: &ActionArgs) -> Result<Value> {
    ctx.output.err(&joined(args));
    Ok(Value::Null)
}

fn round(_ctx: &mut ActionContext<'_>, args: &ActionArgs) -> Result<Value> {
    let num = args.float(0, "num", "std.round")?;
    let digits = args.get(1, "digits").and_then(Value::as_int).unwrap_or(0);
    if digits <= 0 {
        return Ok(Value::Int(num.round() as i64));
    }
    let scale = 10f64.powi(digits.min(15) as i32);
    Ok(Value::Float((num * scale).round() / scale))
}

/// Sort a list of dicts by a key, or a list of lists by a column index.
fn sort_by_key(_ctx: &mut ActionContext<'_>, args: &ActionArgs) -> Result<Value> {
    const NAME: &str = "std.sort_by_key";
    let list = args.list(0, "lst", NAME)?;
    let key = args.require(1, "key", NAME)?;
    let reverse = args.get(2, "reverse").is_some_and(Value::is_truthy);

    let pick = |item: &Value| -> Value {
        match (item, key) {
            (Value::Dict(map), Value::Str(k)) => map.get(k).cloned().unwrap_or_default(),
            (Value::List(row), Value::Int(i)) => usize::try_from(*i)
                .ok()
                .and_then(|i| row.get(i).cloned())
                .unwrap_or_default(),
            _ => Value::Null,
        }
    };
    let mut sorted = list.clone();
    sorted.sort_by(|a, b| {
        operators::order(&pick(a), &pick(b)).unwrap_or(std::cmp::Ordering::Equal)
    });
    if reverse {
        sorted.reverse();
    }
    Ok(Value::List(sorted))
}

fn time_now(_ctx: &mut ActionContext<'_>, _args: &ActionArgs) -> Result<Value> {
    Ok(Value::Str(Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()))
}

fn require_super(ctx: &ActionContext<'_>, action: &str) -> bool {
    if ctx.store.is_super(ctx.master) {
        return true;
    }
    warn!(action, master = %ctx.master, "only a super master may change globals");
    false
}

fn set_global(ctx: &mut ActionContext<'_>, args: &ActionArgs) -> Result<Value> {
    let name = args.str(0, "name", "std.set_global")?.to_string();
    let value = args.require(1, "value", "std.set_global")?;
    if !require_super(ctx, "std.set_global") {
        return Ok(Value::Bool(false));
    }
    ctx.store.save_glob(&name, value.to_json().to_string());
    Ok(value.clone())
}

fn get_global(ctx: &mut ActionContext<'_>, args: &ActionArgs) -> Result<Value> {
    let name = args.str(0, "name", "std.get_global")?;
    let Some(text) = ctx.store.get_glob(name) else {
        return Ok(Value::Null);
    };
    let json: serde_json::Value = serde_json::from_str(&text).map_err(|e| Error::Action {
        action: "std.get_global".to_string(),
        reason: e.to_string(),
    })?;
    Ok(Value::from_json(&json))
}

fn destroy_global(ctx: &mut ActionContext<'_>, args: &ActionArgs) -> Result<Value> {
    let name = args.str(0, "name", "std.destroy_global")?.to_string();
    if !require_super(ctx, "std.destroy_global") {
        return Ok(Value::Bool(false));
    }
    Ok(Value::Bool(ctx.store.destroy_glob(&name)))
}

fn element_arg(args: &ActionArgs, index: usize, key: &str, action: &str) -> Result<jac_foundation::ElementId> {
    let value = args.require(index, key, action)?;
    value.as_element().ok_or_else(|| Error::Action {
        action: action.to_string(),
        reason: format!("argument '{key}' must be an element, got {}", value.type_name()),
    })
}

fn set_perms(ctx: &mut ActionContext<'_>, args: &ActionArgs) -> Result<Value> {
    const NAME: &str = "std.set_perms";
    let id = element_arg(args, 0, "obj", NAME)?;
    let mode = match args.str(1, "mode", NAME)? {
        "private" => AccessMode::Private,
        "read_only" => AccessMode::ReadOnly,
        "public" => AccessMode::Public,
        other => {
            return Err(Error::Action {
                action: NAME.to_string(),
                reason: format!("unknown access mode '{other}'"),
            })
        }
    };
    let Some(mut element) = ctx.store.get(ctx.master, id) else {
        return Ok(Value::Bool(false));
    };
    element.set_access(mode);
    Ok(Value::Bool(ctx.store.save(ctx.master, element, true)))
}

fn get_perms(ctx: &mut ActionContext<'_>, args: &ActionArgs) -> Result<Value> {
    let id = element_arg(args, 0, "obj", "std.get_perms")?;
    Ok(ctx
        .store
        .get(ctx.master, id)
        .map(|e| Value::str(e.access.mode.as_str()))
        .unwrap_or_default())
}

fn grant_perms(ctx: &mut ActionContext<'_>, args: &ActionArgs) -> Result<Value> {
    const NAME: &str = "std.grant_perms";
    let id = element_arg(args, 0, "obj", NAME)?;
    let grantee = element_arg(args, 1, "mast", NAME)?;
    let read_only = args.get(2, "read_only").is_some_and(Value::is_truthy);
    let Some(mut element) = ctx.store.get(ctx.master, id) else {
        return Ok(Value::Bool(false));
    };
    element.access.give_access(grantee, !read_only);
    Ok(Value::Bool(ctx.store.save(ctx.master, element, true)))
}

fn revoke_perms(ctx: &mut ActionContext<'_>, args: &ActionArgs) -> Result<Value> {
    const NAME: &str = "std.revoke_perms";
    let id = element_arg(args, 0, "obj", NAME)?;
    let grantee = element_arg(args, 1, "mast", NAME)?;
    let Some(mut element) = ctx.store.get(ctx.master, id) else {
        return Ok(Value::Bool(false));
    };
    if !element.access.remove_access(grantee) {
        return Ok(Value::Bool(false));
    }
    Ok(Value::Bool(ctx.store.save(ctx.master, element, true)))
}

fn list_actions(ctx: &mut ActionContext<'_>, _args: &ActionArgs) -> Result<Value> {
    Ok(Value::List(
        ctx.registry.list_loaded().into_iter().map(Value::Str).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::super::tests::Fixture;
    use super::*;
    use indexmap::IndexMap;
    use jac_foundation::ElementId;
    use jac_store::{Element, GraphStore};

    #[test]
    fn test_output_goes_to_buffer() {
        let mut fx = Fixture::new();
        let logged = fx
            .call("std.log", vec![Value::str("n="), Value::Int(3)])
            .unwrap();
        assert_eq!(logged, Value::str("n=3"));
        fx.call("std.out", vec![Value::str("a"), Value::List(vec![Value::Int(1)])])
            .unwrap();
        fx.call("std.err", vec![Value::str("oops")]).unwrap();
        assert_eq!(fx.output.stdout(), "n=3\na [1]\n");
        assert_eq!(fx.output.stderr(), "oops\n");
    }

    #[test]
    fn test_sort_by_key_dicts_and_rows() {
        let mut fx = Fixture::new();
        let dict = |n: i64| {
            let mut map = IndexMap::new();
            map.insert("n".to_string(), Value::Int(n));
            Value::Dict(map)
        };
        let sorted = fx
            .call(
                "std.sort_by_key",
                vec![Value::List(vec![dict(3), dict(1), dict(2)]), Value::str("n")],
            )
            .unwrap();
        assert_eq!(sorted, Value::List(vec![dict(1), dict(2), dict(3)]));

        let rows = Value::List(vec![
            Value::List(vec![Value::str("b"), Value::Int(1)]),
            Value::List(vec![Value::str("a"), Value::Int(2)]),
        ]);
        let sorted = fx
            .call("std.sort_by_key", vec![rows, Value::Int(1), Value::Bool(true)])
            .unwrap();
        assert_eq!(sorted.as_list().unwrap()[0].as_list().unwrap()[0], Value::str("a"));
    }

    #[test]
    fn test_globals_need_super_master() {
        let mut fx = Fixture::new();
        let denied = fx
            .call("std.set_global", vec![Value::str("k"), Value::Int(5)])
            .unwrap();
        assert_eq!(denied, Value::Bool(false));
        assert_eq!(fx.call("std.get_global", vec![Value::str("k")]).unwrap(), Value::Null);

        fx.store.save_glob("k", "{\"a\": [1, 2]}".to_string());
        let value = fx.call("std.get_global", vec![Value::str("k")]).unwrap();
        assert_eq!(value.as_dict().unwrap()["a"], Value::List(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn test_round() {
        let mut fx = Fixture::new();
        assert_eq!(fx.call("std.round", vec![Value::Float(2.6)]).unwrap(), Value::Int(3));
        assert_eq!(
            fx.call("std.round", vec![Value::Float(2.345), Value::Int(1)]).unwrap(),
            Value::Float(2.3)
        );
    }

    #[test]
    fn test_perms_on_public_element() {
        let mut fx = Fixture::new();
        let node = Element::node("generic", ElementId::nil());
        let id = node.id();
        fx.store.save(ElementId::nil(), node, true);
        let set = fx
            .call("std.set_perms", vec![Value::Element(id), Value::str("read_only")])
            .unwrap();
        assert_eq!(set, Value::Bool(true));
        assert_eq!(
            fx.call("std.get_perms", vec![Value::Element(id)]).unwrap(),
            Value::str("read_only")
        );
        assert!(fx
            .call("std.set_perms", vec![Value::Element(id), Value::str("open")])
            .is_err());
    }

    #[test]
    fn test_lists_loaded_actions() {
        let mut fx = Fixture::new();
        let listed = fx.call("std.actions", vec![]).unwrap();
        assert!(listed.as_list().unwrap().contains(&Value::str("date.quantize_to_week")));
    }
}
