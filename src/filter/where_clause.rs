//! `where` conditions: parsing from JSON and evaluation against record objects.

use crate::error::AppError;
use crate::model::timestamp;
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::cmp::Ordering;

/// Parsed `where` object. Sibling keys of one object are ANDed.
#[derive(Clone, Debug)]
pub enum Where {
    And(Vec<Where>),
    Or(Vec<Where>),
    Condition(Condition),
}

#[derive(Clone, Debug)]
pub struct Condition {
    pub property: String,
    pub op: Op,
}

#[derive(Clone, Debug)]
pub enum Op {
    Eq(Value),
    Neq(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    Inq(Vec<Value>),
    Nin(Vec<Value>),
    Between(Value, Value),
    Like(Pattern),
    Nlike(Pattern),
    Ilike(Pattern),
    Nilike(Pattern),
    Regexp(Pattern),
}

/// A text pattern kept in its source form (for SQL) and compiled (for in-memory matching).
#[derive(Clone, Debug)]
pub struct Pattern {
    pub source: String,
    pub case_insensitive: bool,
    regex: Regex,
}

impl Pattern {
    /// SQL LIKE pattern: `%` any run, `_` one character.
    fn like(source: &str, case_insensitive: bool) -> Result<Self, AppError> {
        let mut re = String::from("^");
        for ch in source.chars() {
            match ch {
                '%' => re.push_str(".*"),
                '_' => re.push('.'),
                c => re.push_str(&regex::escape(&c.to_string())),
            }
        }
        re.push('$');
        let regex = RegexBuilder::new(&re)
            .case_insensitive(case_insensitive)
            .dot_matches_new_line(true)
            .build()
            .map_err(|e| AppError::BadRequest(format!("invalid like pattern: {}", e)))?;
        Ok(Pattern {
            source: source.to_string(),
            case_insensitive,
            regex,
        })
    }

    /// `regexp` operand: either a bare pattern or `/pattern/flags` (flag `i` supported).
    fn regexp(raw: &str) -> Result<Self, AppError> {
        let (source, case_insensitive) = match raw.strip_prefix('/').and_then(|r| r.rfind('/').map(|i| (r, i))) {
            Some((rest, end)) => {
                let flags = &rest[end + 1..];
                if let Some(bad) = flags.chars().find(|c| !matches!(c, 'i' | 'g' | 'm')) {
                    return Err(AppError::BadRequest(format!("unsupported regexp flag: {}", bad)));
                }
                (&rest[..end], flags.contains('i'))
            }
            None => (raw, false),
        };
        let regex = RegexBuilder::new(source)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| AppError::BadRequest(format!("invalid regexp: {}", e)))?;
        Ok(Pattern {
            source: source.to_string(),
            case_insensitive,
            regex,
        })
    }

    pub fn is_match(&self, s: &str) -> bool {
        self.regex.is_match(s)
    }
}

impl Where {
    /// Parse a `where` query parameter (JSON text).
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let v: Value = serde_json::from_str(raw)
            .map_err(|e| AppError::BadRequest(format!("invalid where: {}", e)))?;
        Where::from_value(&v)
    }

    pub fn from_value(v: &Value) -> Result<Self, AppError> {
        let obj = v
            .as_object()
            .ok_or_else(|| AppError::BadRequest("where must be an object".into()))?;
        let mut clauses = Vec::with_capacity(obj.len());
        for (key, val) in obj {
            match key.as_str() {
                "and" | "or" => {
                    let items = val.as_array().ok_or_else(|| {
                        AppError::BadRequest(format!("where.{} must be an array", key))
                    })?;
                    let parts = items
                        .iter()
                        .map(Where::from_value)
                        .collect::<Result<Vec<_>, _>>()?;
                    clauses.push(if key == "and" {
                        Where::And(parts)
                    } else {
                        Where::Or(parts)
                    });
                }
                property => match val {
                    Value::Object(ops) => {
                        if ops.is_empty() {
                            return Err(AppError::BadRequest(format!(
                                "where.{} has no operator",
                                property
                            )));
                        }
                        for (op, operand) in ops {
                            clauses.push(Where::Condition(Condition {
                                property: property.to_string(),
                                op: parse_op(property, op, operand)?,
                            }));
                        }
                    }
                    other => clauses.push(Where::Condition(Condition {
                        property: property.to_string(),
                        op: Op::Eq(other.clone()),
                    })),
                },
            }
        }
        if clauses.len() == 1 {
            Ok(clauses.remove(0))
        } else {
            Ok(Where::And(clauses))
        }
    }

    /// Evaluate against a record in its JSON object form.
    pub fn matches(&self, record: &Value) -> bool {
        match self {
            Where::And(parts) => parts.iter().all(|w| w.matches(record)),
            Where::Or(parts) => parts.iter().any(|w| w.matches(record)),
            Where::Condition(c) => c.matches(record.get(&c.property)),
        }
    }
}

fn parse_op(property: &str, op: &str, operand: &Value) -> Result<Op, AppError> {
    let list = |operand: &Value| -> Result<Vec<Value>, AppError> {
        operand.as_array().cloned().ok_or_else(|| {
            AppError::BadRequest(format!("where.{}.{} must be an array", property, op))
        })
    };
    let text = |operand: &Value| -> Result<String, AppError> {
        operand.as_str().map(str::to_string).ok_or_else(|| {
            AppError::BadRequest(format!("where.{}.{} must be a string", property, op))
        })
    };
    Ok(match op {
        "eq" => Op::Eq(operand.clone()),
        "neq" => Op::Neq(operand.clone()),
        "gt" => Op::Gt(operand.clone()),
        "gte" => Op::Gte(operand.clone()),
        "lt" => Op::Lt(operand.clone()),
        "lte" => Op::Lte(operand.clone()),
        "inq" => Op::Inq(list(operand)?),
        "nin" => Op::Nin(list(operand)?),
        "between" => {
            let bounds = list(operand)?;
            match <[Value; 2]>::try_from(bounds) {
                Ok([lo, hi]) => Op::Between(lo, hi),
                Err(_) => {
                    return Err(AppError::BadRequest(format!(
                        "where.{}.between needs exactly two values",
                        property
                    )))
                }
            }
        }
        "like" => Op::Like(Pattern::like(&text(operand)?, false)?),
        "nlike" => Op::Nlike(Pattern::like(&text(operand)?, false)?),
        "ilike" => Op::Ilike(Pattern::like(&text(operand)?, true)?),
        "nilike" => Op::Nilike(Pattern::like(&text(operand)?, true)?),
        "regexp" => Op::Regexp(Pattern::regexp(&text(operand)?)?),
        unknown => {
            return Err(AppError::BadRequest(format!(
                "unknown operator '{}' in where.{}",
                unknown, property
            )));
        }
    })
}

impl Condition {
    /// `actual` is the record's property, `None` when absent.
    pub fn matches(&self, actual: Option<&Value>) -> bool {
        let present = actual.filter(|v| !v.is_null());
        match &self.op {
            Op::Eq(Value::Null) => present.is_none(),
            Op::Eq(x) => present.is_some_and(|a| values_equal(a, x)),
            Op::Neq(Value::Null) => present.is_some(),
            Op::Neq(x) => !present.is_some_and(|a| values_equal(a, x)),
            Op::Gt(x) => ordered(present, x, |o| o == Ordering::Greater),
            Op::Gte(x) => ordered(present, x, |o| o != Ordering::Less),
            Op::Lt(x) => ordered(present, x, |o| o == Ordering::Less),
            Op::Lte(x) => ordered(present, x, |o| o != Ordering::Greater),
            Op::Inq(xs) => present.is_some_and(|a| xs.iter().any(|x| values_equal(a, x))),
            Op::Nin(xs) => !present.is_some_and(|a| xs.iter().any(|x| values_equal(a, x))),
            Op::Between(lo, hi) => {
                ordered(present, lo, |o| o != Ordering::Less)
                    && ordered(present, hi, |o| o != Ordering::Greater)
            }
            Op::Like(p) | Op::Ilike(p) | Op::Regexp(p) => {
                text_of(present).is_some_and(|s| p.is_match(&s))
            }
            Op::Nlike(p) | Op::Nilike(p) => !text_of(present).is_some_and(|s| p.is_match(&s)),
        }
    }
}

fn ordered(actual: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    actual
        .and_then(|a| compare(a, operand))
        .is_some_and(accept)
}

/// Text form used by pattern operators; mirrors `->>` on jsonb.
fn text_of(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    compare(a, b) == Some(Ordering::Equal) || a == b
}

/// Compare two values of the same kind. Strings that are both date-times compare chronologically.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(s), Value::String(t)) => match (timestamp::parse(s), timestamp::parse(t)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => Some(s.cmp(t)),
        },
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn w(v: Value) -> Where {
        Where::from_value(&v).unwrap()
    }

    fn pikachu() -> Value {
        json!({
            "name": "pikachu",
            "modified": "2024-03-01T10:00:00.000Z",
            "type": "electric",
            "level": 25,
            "legendary": false
        })
    }

    #[test]
    fn shorthand_equality_and_implicit_and() {
        assert!(w(json!({"name": "pikachu"})).matches(&pikachu()));
        assert!(w(json!({"name": "pikachu", "type": "electric"})).matches(&pikachu()));
        assert!(!w(json!({"name": "pikachu", "type": "water"})).matches(&pikachu()));
    }

    #[test]
    fn numeric_comparisons() {
        let p = pikachu();
        assert!(w(json!({"level": {"gt": 20}})).matches(&p));
        assert!(w(json!({"level": {"gte": 25}})).matches(&p));
        assert!(!w(json!({"level": {"lt": 25}})).matches(&p));
        assert!(w(json!({"level": {"between": [10, 30]}})).matches(&p));
        assert!(!w(json!({"level": {"gt": "20"}})).matches(&p));
    }

    #[test]
    fn date_time_strings_compare_chronologically() {
        let p = pikachu();
        assert!(w(json!({"modified": {"gt": "2024-03-01T09:59:59Z"}})).matches(&p));
        assert!(w(json!({"modified": {"eq": "2024-03-01T11:00:00+01:00"}})).matches(&p));
    }

    #[test]
    fn or_and_nested() {
        let p = pikachu();
        let cond = w(json!({"or": [{"type": "water"}, {"and": [{"level": {"gte": 5}}, {"legendary": false}]}]}));
        assert!(cond.matches(&p));
        assert!(!w(json!({"or": [{"type": "water"}, {"type": "fire"}]})).matches(&p));
    }

    #[test]
    fn membership_and_null_semantics() {
        let p = pikachu();
        assert!(w(json!({"type": {"inq": ["fire", "electric"]}})).matches(&p));
        assert!(!w(json!({"type": {"nin": ["electric"]}})).matches(&p));
        assert!(w(json!({"nickname": null})).matches(&p));
        assert!(w(json!({"nickname": {"neq": "sparky"}})).matches(&p));
        assert!(!w(json!({"nickname": {"neq": null}})).matches(&p));
        assert!(!w(json!({"nickname": "sparky"})).matches(&p));
    }

    #[test]
    fn pattern_operators() {
        let p = pikachu();
        assert!(w(json!({"name": {"like": "pika%"}})).matches(&p));
        assert!(w(json!({"name": {"like": "p_kachu"}})).matches(&p));
        assert!(!w(json!({"name": {"like": "PIKA%"}})).matches(&p));
        assert!(w(json!({"name": {"ilike": "PIKA%"}})).matches(&p));
        assert!(w(json!({"name": {"nlike": "char%"}})).matches(&p));
        assert!(w(json!({"name": {"regexp": "^pi.*u$"}})).matches(&p));
        assert!(w(json!({"name": {"regexp": "/^PIKA/i"}})).matches(&p));
        assert!(w(json!({"level": {"like": "2%"}})).matches(&p));
    }

    #[test]
    fn like_escapes_regex_metacharacters() {
        let rec = json!({"name": "mr. mime"});
        assert!(w(json!({"name": {"like": "mr. %"}})).matches(&rec));
        assert!(!w(json!({"name": {"like": "mr. %"}})).matches(&json!({"name": "mrx mime"})));
    }

    #[test]
    fn like_backslash_is_not_an_escape() {
        let cond = w(json!({"code": {"like": "50\\%"}}));
        assert!(cond.matches(&json!({"code": "50\\abc"})));
        assert!(cond.matches(&json!({"code": "50\\%"})));
        assert!(!cond.matches(&json!({"code": "50%"})));
    }

    #[test]
    fn rejects_malformed_conditions() {
        assert!(Where::from_value(&json!(["name"])).is_err());
        assert!(Where::from_value(&json!({"name": {"near": 1}})).is_err());
        assert!(Where::from_value(&json!({"name": {}})).is_err());
        assert!(Where::from_value(&json!({"level": {"between": [1]}})).is_err());
        assert!(Where::from_value(&json!({"name": {"regexp": "("}})).is_err());
        assert!(Where::from_value(&json!({"or": {"name": "x"}})).is_err());
        assert!(Where::parse("{not json").is_err());
    }

    #[test]
    fn empty_where_matches_everything() {
        assert!(w(json!({})).matches(&pikachu()));
    }
}
