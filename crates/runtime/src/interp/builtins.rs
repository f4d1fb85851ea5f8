//! Built-in members: `.context`, casts, and the `list::`, `dict::` and
//! `str::` method families.

use std::cmp::Ordering;

use indexmap::IndexMap;

use jac_foundation::{operators, ElementId, JacType, Value, ValueError};
use jac_ir::{Builtin, Expr, MethodFamily};
use jac_store::{graph, EdgeDirection, Element};
use jac_vm::Operand;

use super::scope::list_index;
use super::Interp;
use crate::actions::render;
use crate::error::{Error, Result};

fn invalid(name: &str) -> Error {
    Error::rt(format!("Call to {name} is invalid."))
}

fn arg<'v>(args: &'v [Value], i: usize, name: &str) -> Result<&'v Value> {
    args.get(i).ok_or_else(|| invalid(name))
}

fn str_arg<'v>(args: &'v [Value], i: usize, name: &str) -> Result<&'v str> {
    arg(args, i, name)?.as_str().ok_or_else(|| invalid(name))
}

fn extreme(items: &[Value], want: Ordering, name: &str) -> Result<(usize, Value)> {
    let mut best: Option<(usize, &Value)> = None;
    for (i, item) in items.iter().enumerate() {
        best = match best {
            None => Some((i, item)),
            Some((j, current)) => {
                let ord = operators::order(item, current).ok_or(ValueError::TypeMismatch {
                    op: "<",
                    lhs: item.type_name(),
                    rhs: current.type_name(),
                })?;
                if ord == want {
                    Some((i, item))
                } else {
                    Some((j, current))
                }
            }
        };
    }
    best.map(|(i, v)| (i, v.clone()))
        .ok_or_else(|| Error::rt(format!("{name} of an empty list")))
}

/// Run a list method. Returns the result and whether `items` changed.
fn list_method(items: &mut Vec<Value>, name: &str, args: &[Value]) -> Result<(Value, bool)> {
    let out = match name {
        "reverse" => {
            items.reverse();
            return Ok((Value::Null, true));
        }
        "reversed" => Value::List(items.iter().rev().cloned().collect()),
        "copy" | "deepcopy" => Value::List(items.clone()),
        "sort" => {
            let mut failed = None;
            items.sort_by(|a, b| {
                operators::order(a, b).unwrap_or_else(|| {
                    failed = Some((a.type_name(), b.type_name()));
                    Ordering::Equal
                })
            });
            if let Some((lhs, rhs)) = failed {
                return Err(ValueError::TypeMismatch { op: "<", lhs, rhs }.into());
            }
            return Ok((Value::Null, true));
        }
        "clear" => {
            items.clear();
            return Ok((Value::Null, true));
        }
        "max" => extreme(items, Ordering::Greater, name)?.1,
        "min" => extreme(items, Ordering::Less, name)?.1,
        "idx_of_max" => Value::Int(extreme(items, Ordering::Greater, name)?.0 as i64),
        "idx_of_min" => Value::Int(extreme(items, Ordering::Less, name)?.0 as i64),
        "pairwise" => Value::List(
            items
                .windows(2)
                .map(|pair| Value::List(pair.to_vec()))
                .collect(),
        ),
        "unique" => {
            let mut seen: Vec<Value> = Vec::new();
            for item in items.iter() {
                if !seen.iter().any(|s| operators::values_equal(s, item)) {
                    seen.push(item.clone());
                }
            }
            Value::List(seen)
        }
        "pop" => {
            let at = match args.first() {
                Some(key) => list_index(items.len(), key)?,
                None if items.is_empty() => return Err(Error::rt("pop from empty list")),
                None => items.len() - 1,
            };
            return Ok((items.remove(at), true));
        }
        "index" => {
            let needle = arg(args, 0, name)?;
            let at = items
                .iter()
                .position(|v| operators::values_equal(v, needle))
                .ok_or_else(|| Error::rt(format!("{needle} is not in list")))?;
            Value::Int(at as i64)
        }
        "count" => {
            let needle = arg(args, 0, name)?;
            Value::Int(items.iter().filter(|v| operators::values_equal(v, needle)).count() as i64)
        }
        "append" => {
            items.push(arg(args, 0, name)?.clone());
            return Ok((Value::Null, true));
        }
        "extend" => {
            let more = arg(args, 0, name)?.as_list().ok_or_else(|| invalid(name))?;
            items.extend(more.iter().cloned());
            return Ok((Value::Null, true));
        }
        "insert" => {
            let at = arg(args, 0, name)?.as_int().ok_or_else(|| invalid(name))?;
            let len = items.len() as i64;
            let at = if at < 0 { (len + at).max(0) } else { at.min(len) };
            items.insert(at as usize, arg(args, 1, name)?.clone());
            return Ok((Value::Null, true));
        }
        "remove" => {
            let needle = arg(args, 0, name)?;
            let at = items
                .iter()
                .position(|v| operators::values_equal(v, needle))
                .ok_or_else(|| Error::rt(format!("{needle} is not in list")))?;
            items.remove(at);
            return Ok((Value::Null, true));
        }
        _ => return Err(invalid(name)),
    };
    Ok((out, false))
}

fn dict_method(
    map: &mut IndexMap<String, Value>,
    name: &str,
    args: &[Value],
) -> Result<(Value, bool)> {
    let out = match name {
        "items" => Value::List(
            map.iter()
                .map(|(k, v)| Value::List(vec![Value::str(k), v.clone()]))
                .collect(),
        ),
        "copy" | "deepcopy" => Value::Dict(map.clone()),
        "keys" => Value::List(map.keys().map(Value::str).collect()),
        "values" => Value::List(map.values().cloned().collect()),
        "clear" => {
            map.clear();
            return Ok((Value::Null, true));
        }
        "popitem" => {
            let (k, v) = map
                .pop()
                .ok_or_else(|| Error::rt("popitem(): dictionary is empty"))?;
            return Ok((Value::List(vec![Value::Str(k), v]), true));
        }
        "pop" => {
            let key = str_arg(args, 0, name)?;
            return match (map.shift_remove(key), args.get(1)) {
                (Some(v), _) => Ok((v, true)),
                (None, Some(default)) => Ok((default.clone(), false)),
                (None, None) => Err(Error::rt(format!("Key {key} not found"))),
            };
        }
        "update" => {
            let other = arg(args, 0, name)?.as_dict().ok_or_else(|| invalid(name))?;
            map.extend(other.iter().map(|(k, v)| (k.clone(), v.clone())));
            return Ok((Value::Null, true));
        }
        "get" => {
            let key = str_arg(args, 0, name)?;
            map.get(key)
                .cloned()
                .or_else(|| args.get(1).cloned())
                .unwrap_or_default()
        }
        _ => return Err(invalid(name)),
    };
    Ok((out, false))
}

fn has_cased(text: &str) -> bool {
    text.chars().any(|c| c.is_lowercase() || c.is_uppercase())
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut start = true;
    for c in text.chars() {
        if c.is_alphabetic() {
            if start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            start = false;
        } else {
            out.push(c);
            start = true;
        }
    }
    out
}

fn strip_set<'t>(text: &'t str, args: &[Value], left: bool, right: bool) -> &'t str {
    match args.first().and_then(Value::as_str) {
        Some(set) => {
            let pat = |c: char| set.contains(c);
            match (left, right) {
                (true, true) => text.trim_matches(pat),
                (true, false) => text.trim_start_matches(pat),
                _ => text.trim_end_matches(pat),
            }
        }
        None => match (left, right) {
            (true, true) => text.trim(),
            (true, false) => text.trim_start(),
            _ => text.trim_end(),
        },
    }
}

fn str_method(text: &str, name: &str, args: &[Value]) -> Result<Value> {
    let nonempty = !text.is_empty();
    Ok(match name {
        "upper" => Value::Str(text.to_uppercase()),
        "lower" => Value::Str(text.to_lowercase()),
        "title" => Value::Str(title_case(text)),
        "capitalize" => {
            let mut chars = text.chars();
            Value::Str(match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            })
        }
        "swap_case" => Value::Str(
            text.chars()
                .flat_map(|c| {
                    if c.is_uppercase() {
                        c.to_lowercase().collect::<Vec<_>>()
                    } else {
                        c.to_uppercase().collect::<Vec<_>>()
                    }
                })
                .collect(),
        ),
        "is_alnum" => Value::Bool(nonempty && text.chars().all(char::is_alphanumeric)),
        "is_alpha" => Value::Bool(nonempty && text.chars().all(char::is_alphabetic)),
        "is_digit" => Value::Bool(nonempty && text.chars().all(|c| c.is_ascii_digit())),
        "is_space" => Value::Bool(nonempty && text.chars().all(char::is_whitespace)),
        "is_upper" => Value::Bool(has_cased(text) && !text.chars().any(char::is_lowercase)),
        "is_lower" => Value::Bool(has_cased(text) && !text.chars().any(char::is_uppercase)),
        "is_title" => Value::Bool(has_cased(text) && title_case(text) == text),
        "load_json" => {
            let json: serde_json::Value =
                serde_json::from_str(text).map_err(|e| Error::rt(e.to_string()))?;
            Value::from_json(&json)
        }
        "split" => {
            let parts: Vec<Value> = match args.first().and_then(Value::as_str) {
                Some(sep) => text.split(sep).map(Value::str).collect(),
                None => text.split_whitespace().map(Value::str).collect(),
            };
            Value::List(parts)
        }
        "strip" => Value::str(strip_set(text, args, true, true)),
        "lstrip" => Value::str(strip_set(text, args, true, false)),
        "rstrip" => Value::str(strip_set(text, args, false, true)),
        "count" => Value::Int(text.matches(str_arg(args, 0, name)?).count() as i64),
        "find" => {
            let needle = str_arg(args, 0, name)?;
            Value::Int(
                text.find(needle)
                    .map(|byte| text[..byte].chars().count() as i64)
                    .unwrap_or(-1),
            )
        }
        "join" => {
            let items: &[Value] = match args {
                [Value::List(items)] => items,
                other => other,
            };
            Value::Str(items.iter().map(render).collect::<Vec<_>>().join(text))
        }
        "startswith" => Value::Bool(text.starts_with(str_arg(args, 0, name)?)),
        "endswith" => Value::Bool(text.ends_with(str_arg(args, 0, name)?)),
        "replace" => Value::Str(text.replace(str_arg(args, 0, name)?, str_arg(args, 1, name)?)),
        _ => return Err(invalid(name)),
    })
}

impl Interp<'_> {
    fn element_for(&mut self, value: &Value, name: &str) -> Result<Element> {
        match value {
            Value::Element(id) => self.element(*id),
            _ => Err(invalid(name)),
        }
    }

    pub(crate) fn apply_builtin(&mut self, base: Operand, op: &Builtin) -> Result<Operand> {
        let value = match op {
            Builtin::Context => {
                let element = self.element_for(&base.value, "context")?;
                Value::Dict(self.visible_context(&element))
            }
            Builtin::Info => Value::Dict(self.element_for(&base.value, "info")?.info()),
            Builtin::Details => {
                let element = self.element_for(&base.value, "details")?;
                let mut details = element.details();
                details.insert(
                    "context".to_string(),
                    Value::Dict(self.visible_context(&element)),
                );
                Value::Dict(details)
            }
            Builtin::Keys => match &base.value {
                Value::Dict(map) => Value::List(map.keys().map(Value::str).collect()),
                other => {
                    return Err(Error::rt(format!(
                        "Cannot get keys of {other}. Not Dictionary!"
                    )))
                }
            },
            Builtin::Length => match &base.value {
                Value::List(items) => Value::Int(items.len() as i64),
                Value::Str(text) => Value::Int(text.chars().count() as i64),
                Value::Dict(map) => Value::Int(map.len() as i64),
                other => {
                    return Err(Error::rt(format!("Cannot get length of {other}. Not List!")))
                }
            },
            Builtin::Cast(ty) => self.cast(&base.value, *ty)?,
            Builtin::Pluck(keys) => match &base.value {
                Value::Dict(map) => Value::Dict(
                    map.iter()
                        .filter(|(k, _)| keys.contains(k))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                ),
                other => {
                    return Err(Error::rt(format!(
                        "{} is not a dict, cannot filter its keys",
                        other.type_name()
                    )))
                }
            },
            Builtin::Method { family, name, args } => {
                return self.call_method(base, *family, name, args.as_deref())
            }
        };
        Ok(Operand::value(value))
    }

    fn call_method(
        &mut self,
        base: Operand,
        family: MethodFamily,
        name: &str,
        args: Option<&[Expr]>,
    ) -> Result<Operand> {
        let mut values = Vec::new();
        for arg in args.unwrap_or_default() {
            values.push(self.eval_value(arg)?);
        }
        let (result, changed) = match (family, base.value) {
            (MethodFamily::List, Value::List(items)) => {
                let mut items = items;
                let (result, changed) = list_method(&mut items, name, &values)?;
                (result, changed.then_some(Value::List(items)))
            }
            (MethodFamily::Dict, Value::Dict(map)) => {
                let mut map = map;
                let (result, changed) = dict_method(&mut map, name, &values)?;
                (result, changed.then_some(Value::Dict(map)))
            }
            (MethodFamily::Str, Value::Str(text)) => (str_method(&text, name, &values)?, None),
            (_, other) => {
                return Err(Error::rt(format!(
                    "Call to {name} is invalid on {}.",
                    other.type_name()
                )))
            }
        };
        if let (Some(updated), Some(place)) = (changed, &base.place) {
            self.write_place(place, updated)?;
        }
        Ok(Operand::value(result))
    }

    /// `.int`, `.str`, ... plus the graph casts `.node` and `.edge`.
    fn cast(&mut self, value: &Value, ty: JacType) -> Result<Value> {
        match ty {
            JacType::Node => {
                let mut nodes: Vec<ElementId> = Vec::new();
                for id in self.graph_ids(value, ty)? {
                    let element = self.element(id)?;
                    match element.as_edge() {
                        Some(edge) => {
                            for end in [edge.from, edge.to] {
                                if !nodes.contains(&end) {
                                    nodes.push(end);
                                }
                            }
                        }
                        None if element.as_node().is_some() => {
                            if !nodes.contains(&id) {
                                nodes.push(id);
                            }
                        }
                        None => return Err(cast_error(value, ty)),
                    }
                }
                Ok(collect_ids(value, nodes))
            }
            JacType::Edge => {
                let mut edges: Vec<ElementId> = Vec::new();
                for id in self.graph_ids(value, ty)? {
                    let element = self.element(id)?;
                    if element.as_edge().is_some() {
                        edges.push(id);
                    } else if element.as_node().is_some() {
                        edges.extend(self.edges_between(self.here()?, id));
                    } else {
                        return Err(cast_error(value, ty));
                    }
                }
                Ok(collect_ids(value, edges))
            }
            other => Ok(value.cast(other)?),
        }
    }

    fn graph_ids(&self, value: &Value, ty: JacType) -> Result<Vec<ElementId>> {
        value.element_ids().ok_or_else(|| cast_error(value, ty))
    }

    /// Edges joining `from` and `to`, in either direction.
    pub(crate) fn edges_between(&mut self, from: ElementId, to: ElementId) -> Vec<ElementId> {
        graph::edges(&mut *self.env.store, self.env.master, from, EdgeDirection::Any)
            .iter()
            .filter(|edge| graph::opposite(edge, from) == Some(to))
            .map(Element::id)
            .collect()
    }
}

fn cast_error(value: &Value, ty: JacType) -> Error {
    ValueError::InvalidCast {
        from: value.type_name(),
        to: ty,
        reason: "not a graph element".to_string(),
    }
    .into()
}

/// A single id for a single-element source, a list otherwise.
fn collect_ids(source: &Value, ids: Vec<ElementId>) -> Value {
    match (source, ids.as_slice()) {
        (Value::Element(_), [one]) => Value::Element(*one),
        _ => Value::List(ids.into_iter().map(Value::Element).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{expr, Harness};
    use super::*;
    use jac_ir::build::*;

    fn list_of(values: &[i64]) -> Value {
        Value::List(values.iter().copied().map(Value::Int).collect())
    }

    #[test]
    fn test_list_methods() {
        let mut items = vec![Value::Int(3), Value::Int(1), Value::Int(3)];
        assert_eq!(list_method(&mut items, "idx_of_max", &[]).unwrap().0, Value::Int(0));
        assert_eq!(list_method(&mut items, "unique", &[]).unwrap().0, list_of(&[3, 1]));
        assert_eq!(
            list_method(&mut items, "pairwise", &[]).unwrap().0,
            Value::List(vec![list_of(&[3, 1]), list_of(&[1, 3])])
        );
        let (_, changed) = list_method(&mut items, "sort", &[]).unwrap();
        assert!(changed);
        assert_eq!(Value::List(items.clone()), list_of(&[1, 3, 3]));
        assert_eq!(list_method(&mut items, "pop", &[]).unwrap().0, Value::Int(3));
        assert!(list_method(&mut items, "explode", &[]).is_err());
    }

    #[test]
    fn test_dict_methods() {
        let mut map = IndexMap::new();
        map.insert("a".to_string(), Value::Int(1));
        map.insert("b".to_string(), Value::Int(2));
        assert_eq!(
            dict_method(&mut map, "get", &[Value::str("z"), Value::Int(0)]).unwrap().0,
            Value::Int(0)
        );
        let (popped, changed) = dict_method(&mut map, "popitem", &[]).unwrap();
        assert!(changed);
        assert_eq!(popped, Value::List(vec![Value::str("b"), Value::Int(2)]));
        assert_eq!(dict_method(&mut map, "keys", &[]).unwrap().0, Value::List(vec![Value::str("a")]));
    }

    #[test]
    fn test_str_methods() {
        assert_eq!(str_method("hello world", "title", &[]).unwrap(), Value::str("Hello World"));
        assert_eq!(str_method("aBc", "swap_case", &[]).unwrap(), Value::str("AbC"));
        assert_eq!(str_method("--x--", "strip", &[Value::str("-")]).unwrap(), Value::str("x"));
        assert_eq!(
            str_method(",", "join", &[list_of(&[1, 2])]).unwrap(),
            Value::str("1,2")
        );
        assert_eq!(str_method("héllo", "find", &[Value::str("l")]).unwrap(), Value::Int(2));
        assert_eq!(str_method("", "is_digit", &[]).unwrap(), Value::Bool(false));
        assert!(str_method("x", "shout", &[]).is_err());
    }

    #[test]
    fn test_mutating_method_writes_back() {
        let mut h = Harness::new();
        let mut interp = h.interp();
        interp.scope_mut().locals.insert("l".into(), list_of(&[1]));
        let result = interp
            .eval_value(&expr(method(name("l"), "list", "append", Some(vec![int(2)]))))
            .unwrap();
        assert_eq!(result, Value::Null);
        assert_eq!(interp.scope().locals["l"], list_of(&[1, 2]));
        let len = interp.eval_value(&expr(length_of(name("l")))).unwrap();
        assert_eq!(len, Value::Int(2));
    }

    #[test]
    fn test_casts() {
        let mut h = Harness::new();
        let mut interp = h.interp();
        interp
            .scope_mut()
            .locals
            .insert("d".into(), Value::Dict(IndexMap::from([("a".to_string(), Value::Int(1))])));
        let text = interp.eval_value(&expr(cast(name("d"), "str"))).unwrap();
        assert_eq!(text, Value::str("{\"a\":1}"));
        let n = interp.eval_value(&expr(cast(string("12"), "int"))).unwrap();
        assert_eq!(n, Value::Int(12));
        assert!(interp.eval_value(&expr(cast(int(1), "node"))).is_err());
    }
}
