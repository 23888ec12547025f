//! Filter-string parsing.
//!
//! Grammar of one `q` parameter: comma-separated `field=expr` pairs, where
//! commas inside `[...]` do not split. `field` may be a dotted relation path
//! (`author.name`). `expr` is one of:
//!
//! | expr                  | predicate                              |
//! |-----------------------|----------------------------------------|
//! | `#NULL` / `not:#NULL` | `{equals: null}` / `{not: {equals: null}}` |
//! | `not:<expr>`          | `{not: <expr>}`, `not:[..]` is `notIn` |
//! | `gt:` `gte:` `lt:` `lte:` `eq:` | comparison                   |
//! | `between:a;b`         | `{gte: a, lte: b}`                     |
//! | `before:` `after:` `on:` | date comparisons, `on` is a day range |
//! | `[a,b]`               | `{in: [a, b]}`                         |
//! | `*x*` `x*` `*x`       | contains / startsWith / endsWith (`%` works too) |
//! | anything else         | `{equals: value}` coerced to the field type |

use crate::resolver::RelationshipResolver;
use chrono::{DateTime, Days, NaiveDate, SecondsFormat, Utc};
use serde_json::{Map, Number, Value, json};
use warden_core::{FieldDescriptor, Predicate, ScalarType, ValidationError};

const NULL_LITERAL: &str = "#NULL";
const NOT_PREFIX: &str = "not:";
const WILDCARDS: [char; 2] = ['*', '%'];

/// Parses filter strings for one model.
pub struct FilterParser<'a> {
    resolver: &'a RelationshipResolver,
    model: &'a str,
}

impl<'a> FilterParser<'a> {
    pub fn new(resolver: &'a RelationshipResolver, model: &'a str) -> Self {
        Self { resolver, model }
    }

    /// Parse `expr` into a where predicate. Repeated fields are AND-ed.
    pub fn parse(&self, expr: &str) -> Result<Predicate, ValidationError> {
        let mut predicate = Predicate::new();

        for segment in split_top_level(expr) {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let Some((key, raw)) = segment.split_once('=') else {
                return Err(ValidationError::invalid_filter(
                    segment,
                    "",
                    "expected 'field=value'",
                ));
            };
            let key = key.trim();
            let value = decode(key, raw)?;
            let value = value.trim();
            if value.is_empty() {
                continue;
            }

            if let Some((top, condition)) = self.path_condition(key, value)? {
                predicate.constrain(&top, condition);
            }
        }

        tracing::trace!(model = %self.model, filter = %expr, "Parsed filter");
        Ok(predicate)
    }

    /// Resolve a (possibly dotted) key and build its condition, wrapped in
    /// `is`/`some` for every relation hop.
    fn path_condition(&self, key: &str, value: &str) -> Result<Option<(String, Value)>, ValidationError> {
        let segments: Vec<&str> = key.split('.').map(str::trim).collect();
        let (hops, last) = segments.split_at(segments.len() - 1);
        let last = last[0];
        if last.is_empty() || hops.iter().any(|s| s.is_empty()) {
            return Err(ValidationError::invalid_filter(key, value, "malformed field path"));
        }

        let resolved = self.resolver.resolve_path(self.model, hops)?;
        let owner = resolved
            .last()
            .map(|h| h.target.as_str())
            .unwrap_or(self.model);
        let field = self
            .resolver
            .model(owner)?
            .field(last)
            .ok_or_else(|| ValidationError::unknown_field(owner, last))?;

        let condition = if field.is_relation() {
            relation_condition(field, value)?
        } else {
            scalar_condition(owner, field, value)?
        };
        let Some(mut condition) = condition else {
            return Ok(None);
        };

        let mut name = last.to_string();
        for hop in resolved.iter().rev() {
            let mut inner = Map::new();
            inner.insert(name, condition);
            let quantifier = if hop.is_list { "some" } else { "is" };
            condition = json!({ quantifier: Value::Object(inner) });
            name = hop.name.clone();
        }
        Ok(Some((name, condition)))
    }
}

/// Split on commas that are not inside `[...]`.
fn split_top_level(expr: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in expr.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&expr[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&expr[start..]);
    parts
}

/// Percent-decode a raw value. Leading and trailing wildcard markers (and a
/// `not:` prefix) are split off first so `%2024%` stays a wildcard pattern.
fn decode(key: &str, raw: &str) -> Result<String, ValidationError> {
    let raw = raw.trim();
    let (negation, body) = match raw.strip_prefix(NOT_PREFIX) {
        Some(rest) => (NOT_PREFIX, rest),
        None => ("", raw),
    };
    let after_lead = body.trim_start_matches(WILDCARDS);
    let lead = &body[..body.len() - after_lead.len()];
    let inner = after_lead.trim_end_matches(WILDCARDS);
    let trail = &after_lead[inner.len()..];

    let decoded = urlencoding::decode(inner)
        .map_err(|_| ValidationError::invalid_filter(key, raw, "value is not valid UTF-8 after decoding"))?;
    Ok(format!("{}{}{}{}", negation, lead, decoded, trail))
}

fn relation_condition(field: &FieldDescriptor, value: &str) -> Result<Option<Value>, ValidationError> {
    match value {
        NULL_LITERAL => Ok(Some(json!({ "is": null }))),
        v if v.strip_prefix(NOT_PREFIX) == Some(NULL_LITERAL) => Ok(Some(json!({ "isNot": null }))),
        _ => Err(ValidationError::invalid_filter(
            &field.name,
            value,
            "relation fields only accept #NULL and not:#NULL; filter on a nested field instead",
        )),
    }
}

fn scalar_condition(model: &str, field: &FieldDescriptor, value: &str) -> Result<Option<Value>, ValidationError> {
    let name = field.name.as_str();
    let scalar = field.scalar_type().unwrap_or_default();

    if value == NULL_LITERAL {
        if !field.is_nullable() {
            return Err(ValidationError::null_not_allowed(model, name));
        }
        return Ok(Some(json!({ "equals": null })));
    }

    if let Some(rest) = value.strip_prefix(NOT_PREFIX) {
        if rest == NULL_LITERAL {
            return Ok(field
                .is_nullable()
                .then(|| json!({ "not": { "equals": null } })));
        }
        if let Some(items) = bracketed(rest) {
            return Ok(Some(json!({ "notIn": list(name, scalar, items)? })));
        }
        return Ok(scalar_condition(model, field, rest)?.map(|inner| json!({ "not": inner })));
    }

    if let Some(items) = bracketed(value) {
        return Ok(Some(json!({ "in": list(name, scalar, items)? })));
    }

    if let Some((op, operand)) = value.split_once(':') {
        if let Some(condition) = operator_condition(name, scalar, op, operand)? {
            return Ok(Some(condition));
        }
    }

    if let Some(condition) = wildcard_condition(name, scalar, value)? {
        return Ok(Some(condition));
    }

    Ok(Some(json!({ "equals": coerce(name, scalar, value)? })))
}

fn operator_condition(
    field: &str,
    scalar: ScalarType,
    op: &str,
    operand: &str,
) -> Result<Option<Value>, ValidationError> {
    let condition = match op {
        "gte" | "lt" | "eq" => {
            let key = if op == "eq" { "equals" } else { op };
            json!({ key: bound(field, scalar, operand, DayBound::Start)? })
        }
        "gt" | "lte" => json!({ op: bound(field, scalar, operand, DayBound::End)? }),
        "between" => {
            let Some((low, high)) = operand.split_once(';') else {
                return Err(ValidationError::invalid_filter(
                    field,
                    operand,
                    "between expects two values separated by ';'",
                ));
            };
            json!({
                "gte": bound(field, scalar, low.trim(), DayBound::Start)?,
                "lte": bound(field, scalar, high.trim(), DayBound::End)?,
            })
        }
        "before" => json!({ "lt": date_value(field, scalar, operand, DayBound::Start)? }),
        "after" => json!({ "gt": date_value(field, scalar, operand, DayBound::End)? }),
        "on" => {
            let day = parse_day(operand)
                .ok_or_else(|| ValidationError::invalid_filter(field, operand, "expected a date"))?;
            require_date_field(field, scalar, operand)?;
            let next = day
                .checked_add_days(Days::new(1))
                .ok_or_else(|| ValidationError::invalid_filter(field, operand, "date out of range"))?;
            json!({ "gte": start_of_day(day), "lt": start_of_day(next) })
        }
        _ => return Ok(None),
    };
    Ok(Some(condition))
}

fn wildcard_condition(field: &str, scalar: ScalarType, value: &str) -> Result<Option<Value>, ValidationError> {
    let leading = value.starts_with(WILDCARDS);
    let trailing = value.len() > 1 && value.ends_with(WILDCARDS);
    if !leading && !trailing {
        return Ok(None);
    }
    if !scalar.is_textual() {
        return Err(ValidationError::invalid_filter(
            field,
            value,
            "wildcards are only supported on text fields",
        ));
    }

    let text = value.trim_start_matches(WILDCARDS).trim_end_matches(WILDCARDS);
    if text.is_empty() {
        return Err(ValidationError::invalid_filter(field, value, "empty wildcard pattern"));
    }
    let op = match (leading, trailing) {
        (true, true) => "contains",
        (false, true) => "startsWith",
        _ => "endsWith",
    };
    Ok(Some(json!({ op: text })))
}

fn bracketed(value: &str) -> Option<&str> {
    value.strip_prefix('[')?.strip_suffix(']')
}

fn list(field: &str, scalar: ScalarType, items: &str) -> Result<Vec<Value>, ValidationError> {
    items
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| coerce(field, scalar, s))
        .collect()
}

#[derive(Clone, Copy)]
enum DayBound {
    Start,
    End,
}

/// Coerce a comparison operand. Date-only values on date fields snap to the
/// start or end of that day.
fn bound(field: &str, scalar: ScalarType, raw: &str, day: DayBound) -> Result<Value, ValidationError> {
    if scalar == ScalarType::DateTime {
        return date_value(field, scalar, raw, day);
    }
    coerce(field, scalar, raw)
}

fn date_value(field: &str, scalar: ScalarType, raw: &str, day: DayBound) -> Result<Value, ValidationError> {
    require_date_field(field, scalar, raw)?;
    match (parse_day(raw), day) {
        (Some(d), DayBound::Start) => Ok(Value::String(start_of_day(d))),
        (Some(d), DayBound::End) => Ok(Value::String(end_of_day(d))),
        (None, _) => coerce(field, ScalarType::DateTime, raw),
    }
}

fn require_date_field(field: &str, scalar: ScalarType, raw: &str) -> Result<(), ValidationError> {
    if scalar == ScalarType::DateTime || scalar == ScalarType::Json {
        Ok(())
    } else {
        Err(ValidationError::invalid_filter(
            field,
            raw,
            "date operators are only supported on date fields",
        ))
    }
}

/// A bare `YYYY-MM-DD`.
fn parse_day(raw: &str) -> Option<NaiveDate> {
    if raw.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

fn start_of_day(day: NaiveDate) -> String {
    format!("{}T00:00:00.000Z", day.format("%Y-%m-%d"))
}

fn end_of_day(day: NaiveDate) -> String {
    format!("{}T23:59:59.999Z", day.format("%Y-%m-%d"))
}

/// Convert a raw string to the JSON value the store expects for `scalar`.
fn coerce(field: &str, scalar: ScalarType, raw: &str) -> Result<Value, ValidationError> {
    match scalar {
        ScalarType::String | ScalarType::Enum | ScalarType::Bytes => Ok(Value::String(raw.to_string())),
        ScalarType::Int | ScalarType::BigInt => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| ValidationError::invalid_filter(field, raw, "expected an integer")),
        ScalarType::Float | ScalarType::Decimal => number(raw)
            .ok_or_else(|| ValidationError::invalid_filter(field, raw, "expected a number")),
        ScalarType::Boolean => match raw.to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(ValidationError::invalid_filter(field, raw, "expected true or false")),
        },
        ScalarType::DateTime => {
            if let Some(day) = parse_day(raw) {
                return Ok(Value::String(start_of_day(day)));
            }
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| {
                    Value::String(
                        dt.with_timezone(&Utc)
                            .to_rfc3339_opts(SecondsFormat::Millis, true),
                    )
                })
                .map_err(|_| ValidationError::invalid_filter(field, raw, "expected an ISO 8601 date"))
        }
        ScalarType::Json => Ok(infer(raw)),
    }
}

fn number(raw: &str) -> Option<Value> {
    if let Ok(n) = raw.parse::<i64>() {
        return Some(Value::from(n));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn infer(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => number(raw).unwrap_or_else(|| Value::String(raw.to_string())),
    }
}
