//! `rand` action set. Draws from the runtime's seedable generator.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use jac_foundation::Value;

use super::{ActionArgs, ActionContext, ActionFn};
use crate::error::{Error, Result};

const WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "do",
    "eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna", "aliqua", "enim",
    "ad", "minim", "veniam", "quis", "nostrud", "exercitation", "ullamco", "laboris", "nisi",
    "aliquip", "ex", "ea", "commodo", "consequat", "duis", "aute", "irure", "in", "voluptate",
    "velit", "esse", "cillum", "fugiat", "nulla", "pariatur", "excepteur", "sint", "occaecat",
];

pub(super) fn actions() -> Vec<(&'static str, ActionFn)> {
    vec![
        ("seed", seed as ActionFn),
        ("integer", integer),
        ("uniform", uniform),
        ("choice", choice),
        ("word", word),
        ("sentence", sentence),
    ]
}

fn invalid(action: &str, reason: impl Into<String>) -> Error {
    Error::Action {
        action: action.to_string(),
        reason: reason.into(),
    }
}

fn seed(ctx: &mut ActionContext<'_>, args: &ActionArgs) -> Result<Value> {
    let val = args.int(0, "val", "rand.seed")?;
    *ctx.rng = StdRng::seed_from_u64(val as u64);
    Ok(Value::Null)
}

/// Inclusive on both ends.
fn integer(ctx: &mut ActionContext<'_>, args: &ActionArgs) -> Result<Value> {
    let start = args.int(0, "start", "rand.integer")?;
    let end = args.int(1, "end", "rand.integer")?;
    if start > end {
        return Err(invalid("rand.integer", format!("empty range {start}..={end}")));
    }
    Ok(Value::Int(ctx.rng.gen_range(start..=end)))
}

fn uniform(ctx: &mut ActionContext<'_>, args: &ActionArgs) -> Result<Value> {
    let low = args.float(0, "low", "rand.uniform")?;
    let high = args.float(1, "high", "rand.uniform")?;
    if low >= high {
        return Ok(Value::Float(low));
    }
    Ok(Value::Float(ctx.rng.gen_range(low..high)))
}

fn choice(ctx: &mut ActionContext<'_>, args: &ActionArgs) -> Result<Value> {
    let list = args.list(0, "lst", "rand.choice")?;
    list.choose(&mut *ctx.rng)
        .cloned()
        .ok_or_else(|| invalid("rand.choice", "cannot choose from an empty list"))
}

fn word(ctx: &mut ActionContext<'_>, _args: &ActionArgs) -> Result<Value> {
    Ok(Value::str(pick_word(&mut *ctx.rng)))
}

fn pick_word(rng: &mut StdRng) -> &'static str {
    WORDS.choose(rng).copied().unwrap_or("lorem")
}

/// A capitalised sentence of `min_lenth..=max_lenth` words ending in a period.
fn sentence(ctx: &mut ActionContext<'_>, args: &ActionArgs) -> Result<Value> {
    let min = args.get(0, "min_lenth").and_then(Value::as_int).unwrap_or(4).max(1);
    let max = args.get(1, "max_lenth").and_then(Value::as_int).unwrap_or(10).max(min);
    let sep = args.get(2, "sep").and_then(Value::as_str).unwrap_or(" ").to_string();

    let count = ctx.rng.gen_range(min..=max);
    let words: Vec<&str> = (0..count).map(|_| pick_word(&mut *ctx.rng)).collect();
    let mut text = words.join(&sep);
    if let Some(first) = text.get(..1) {
        text = first.to_uppercase() + &text[1..];
    }
    text.push('.');
    Ok(Value::Str(text))
}
