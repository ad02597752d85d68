//! `order` clause: `"prop ASC|DESC"` or an array of them.

use crate::error::AppError;
use crate::filter::where_clause::compare;
use crate::model::ID_PROPERTY;
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub property: String,
    pub descending: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Order(pub Vec<OrderBy>);

impl Order {
    pub fn from_value(v: &Value) -> Result<Self, AppError> {
        match v {
            Value::String(s) => Ok(Order(vec![parse_one(s)?])),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .ok_or_else(|| AppError::BadRequest("order entries must be strings".into()))
                        .and_then(parse_one)
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Order),
            _ => Err(AppError::BadRequest(
                "order must be a string or an array of strings".into(),
            )),
        }
    }

    /// Compare two records in JSON form. Ties fall back to the identity property.
    pub fn compare_records(&self, a: &Value, b: &Value) -> Ordering {
        for key in &self.0 {
            let ord = sort_compare(a.get(&key.property), b.get(&key.property));
            let ord = if key.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        sort_compare(a.get(ID_PROPERTY), b.get(ID_PROPERTY))
    }
}

fn parse_one(s: &str) -> Result<OrderBy, AppError> {
    let mut parts = s.split_whitespace();
    let property = parts
        .next()
        .ok_or_else(|| AppError::BadRequest("order entry is empty".into()))?;
    let descending = match parts.next() {
        None => false,
        Some(dir) if dir.eq_ignore_ascii_case("asc") => false,
        Some(dir) if dir.eq_ignore_ascii_case("desc") => true,
        Some(dir) => {
            return Err(AppError::BadRequest(format!(
                "invalid order direction '{}'",
                dir
            )))
        }
    };
    if parts.next().is_some() {
        return Err(AppError::BadRequest(format!("invalid order entry '{}'", s)));
    }
    Ok(OrderBy {
        property: property.to_string(),
        descending,
    })
}

/// Rank of a value's kind; missing sorts first, then null, matching jsonb ordering with NULLS FIRST.
fn kind_rank(v: Option<&Value>) -> u8 {
    match v {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Number(_)) => 3,
        Some(Value::Bool(_)) => 4,
        Some(Value::Array(_)) => 5,
        Some(Value::Object(_)) => 6,
    }
}

fn sort_compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let (ra, rb) = (kind_rank(a), kind_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_string_and_array_forms() {
        let o = Order::from_value(&json!("level DESC")).unwrap();
        assert_eq!(
            o.0,
            vec![OrderBy {
                property: "level".into(),
                descending: true
            }]
        );
        let o = Order::from_value(&json!(["type", "level desc"])).unwrap();
        assert_eq!(o.0.len(), 2);
        assert!(!o.0[0].descending);
        assert!(o.0[1].descending);
    }

    #[test]
    fn rejects_bad_direction() {
        assert!(Order::from_value(&json!("level UP")).is_err());
        assert!(Order::from_value(&json!("")).is_err());
        assert!(Order::from_value(&json!(5)).is_err());
    }

    #[test]
    fn sorts_missing_first_and_breaks_ties_by_name() {
        let o = Order::from_value(&json!("level ASC")).unwrap();
        let mut rows = vec![
            json!({"name": "b", "level": 3}),
            json!({"name": "c"}),
            json!({"name": "a", "level": 3}),
            json!({"name": "d", "level": 1}),
        ];
        rows.sort_by(|x, y| o.compare_records(x, y));
        let names: Vec<_> = rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["c", "d", "a", "b"]);
    }

    #[test]
    fn descending_reverses_only_the_key() {
        let o = Order::from_value(&json!("level DESC")).unwrap();
        let mut rows = vec![
            json!({"name": "b", "level": 3}),
            json!({"name": "a", "level": 3}),
            json!({"name": "d", "level": 9}),
        ];
        rows.sort_by(|x, y| o.compare_records(x, y));
        let names: Vec<_> = rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["d", "a", "b"]);
    }
}
