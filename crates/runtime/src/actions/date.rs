//! `date` action set over ISO-8601 strings.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, Utc};

use jac_foundation::Value;

use super::{ActionArgs, ActionContext, ActionFn};
use crate::error::{Error, Result};

pub(super) fn actions() -> Vec<(&'static str, ActionFn)> {
    vec![
        ("quantize_to_year", quantize_to_year as ActionFn),
        ("quantize_to_month", quantize_to_month),
        ("quantize_to_week", quantize_to_week),
        ("quantize_to_day", quantize_to_day),
        ("datetime_now", datetime_now),
        ("date_now", date_now),
        ("timestamp_now", timestamp_now),
        ("date_day_diff", date_day_diff),
    ]
}

/// A parsed timestamp, keeping any explicit offset for formatting.
struct Stamp {
    local: NaiveDateTime,
    offset: Option<FixedOffset>,
}

impl Stamp {
    fn parse(text: &str, action: &str) -> Result<Self> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Ok(Self {
                local: dt.naive_local(),
                offset: Some(*dt.offset()),
            });
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
            if let Ok(local) = NaiveDateTime::parse_from_str(text, format) {
                return Ok(Self { local, offset: None });
            }
        }
        let day = NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|e| Error::Action {
            action: action.to_string(),
            reason: format!("invalid isoformat string '{text}': {e}"),
        })?;
        Ok(Self {
            local: day.and_hms_opt(0, 0, 0).unwrap_or_default(),
            offset: None,
        })
    }

    fn midnight(self, date: Option<NaiveDate>) -> Self {
        let day = date.unwrap_or(self.local.date());
        Self {
            local: day.and_hms_opt(0, 0, 0).unwrap_or_default(),
            offset: self.offset,
        }
    }

    fn iso(&self) -> Value {
        let mut text = self.local.format("%Y-%m-%dT%H:%M:%S").to_string();
        if let Some(offset) = self.offset {
            text.push_str(&offset.to_string());
        }
        Value::Str(text)
    }
}

fn stamp_arg(args: &ActionArgs, action: &str) -> Result<Stamp> {
    Stamp::parse(args.str(0, "date", action)?, action)
}

fn quantize_to_year(_ctx: &mut ActionContext<'_>, args: &ActionArgs) -> Result<Value> {
    let stamp = stamp_arg(args, "date.quantize_to_year")?;
    let day = NaiveDate::from_ymd_opt(stamp.local.year(), 1, 1);
    Ok(stamp.midnight(day).iso())
}

fn quantize_to_month(_ctx: &mut ActionContext<'_>, args: &ActionArgs) -> Result<Value> {
    let stamp = stamp_arg(args, "date.quantize_to_month")?;
    let day = stamp.local.date().with_day(1);
    Ok(stamp.midnight(day).iso())
}

/// Back to the Monday of the same week.
fn quantize_to_week(_ctx: &mut ActionContext<'_>, args: &ActionArgs) -> Result<Value> {
    let stamp = stamp_arg(args, "date.quantize_to_week")?;
    let date = stamp.local.date();
    let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
    Ok(stamp.midnight(Some(monday)).iso())
}

fn quantize_to_day(_ctx: &mut ActionContext<'_>, args: &ActionArgs) -> Result<Value> {
    let stamp = stamp_arg(args, "date.quantize_to_day")?;
    Ok(stamp.midnight(None).iso())
}

fn datetime_now(_ctx: &mut ActionContext<'_>, _args: &ActionArgs) -> Result<Value> {
    Ok(Value::Str(Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()))
}

fn date_now(_ctx: &mut ActionContext<'_>, _args: &ActionArgs) -> Result<Value> {
    Ok(Value::Str(Utc::now().date_naive().format("%Y-%m-%d").to_string()))
}

fn timestamp_now(_ctx: &mut ActionContext<'_>, _args: &ActionArgs) -> Result<Value> {
    Ok(Value::Int(Utc::now().timestamp()))
}

/// Whole days from `start_date` to `end_date` (now when omitted).
///
/// Only the date part before any `T` is compared.
fn date_day_diff(_ctx: &mut ActionContext<'_>, args: &ActionArgs) -> Result<Value> {
    const NAME: &str = "date.date_day_diff";
    let day_of = |text: &str| -> Result<NaiveDateTime> {
        let day = text.split('T').next().unwrap_or(text);
        Ok(Stamp::parse(day, NAME)?.local)
    };
    let start = day_of(args.str(0, "start_date", NAME)?)?;
    let end = match args.get(1, "end_date") {
        None | Some(Value::Null) => Utc::now().naive_utc(),
        Some(_) => day_of(args.str(1, "end_date", NAME)?)?,
    };
    Ok(Value::Int((end - start).num_days()))
}
