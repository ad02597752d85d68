//! Query grammar for `filter` and `where` query parameters.
//!
//! A filter is a JSON object with `where`, `fields`, `order`, `limit`, `skip` (or `offset`) and
//! `include`. Unknown keys are ignored.

mod fields;
mod order;
mod where_clause;

pub use fields::Fields;
pub use order::{Order, OrderBy};
pub use where_clause::{Condition, Op, Pattern, Where};

use crate::error::AppError;
use crate::model::{Pokemon, MODEL_NAME};
use serde_json::Value;

#[derive(Clone, Debug, Default)]
pub struct Filter {
    pub where_: Option<Where>,
    pub fields: Option<Fields>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    /// Relation names requested for inclusion.
    pub include: Vec<String>,
}

impl Filter {
    /// Parse a `filter` query parameter (JSON text).
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let v: Value = serde_json::from_str(raw)
            .map_err(|e| AppError::BadRequest(format!("invalid filter: {}", e)))?;
        Filter::from_value(&v)
    }

    /// Parse a filter for by-id lookups; any `where` is ignored.
    pub fn parse_excluding_where(raw: &str) -> Result<Self, AppError> {
        let mut filter = Filter::parse(raw)?;
        filter.where_ = None;
        Ok(filter)
    }

    pub fn from_value(v: &Value) -> Result<Self, AppError> {
        let obj = v
            .as_object()
            .ok_or_else(|| AppError::BadRequest("filter must be an object".into()))?;
        let mut filter = Filter::default();
        for (key, val) in obj {
            match key.as_str() {
                "where" => filter.where_ = Some(Where::from_value(val)?),
                "fields" => filter.fields = Some(Fields::from_value(val)?),
                "order" => filter.order = Some(Order::from_value(val)?),
                "limit" => filter.limit = parse_count("limit", val)?,
                "skip" | "offset" => filter.skip = parse_count(key, val)?,
                "include" => filter.include = parse_include(val)?,
                _ => {}
            }
        }
        Ok(filter)
    }

    /// Pokemon declares no relations, so any requested inclusion is rejected.
    pub fn check_include(&self) -> Result<(), AppError> {
        match self.include.first() {
            Some(relation) => Err(AppError::BadRequest(format!(
                "relation \"{}\" is not defined for {} model",
                relation, MODEL_NAME
            ))),
            None => Ok(()),
        }
    }

    /// Apply where, order, skip and limit to a set of records.
    pub fn select<'a, I>(&self, records: I) -> Vec<Pokemon>
    where
        I: IntoIterator<Item = &'a Pokemon>,
    {
        let order = self.order.clone().unwrap_or_default();
        let mut rows: Vec<(Value, &Pokemon)> = records
            .into_iter()
            .map(|p| (p.to_value(), p))
            .filter(|(v, _)| self.where_.as_ref().map_or(true, |w| w.matches(v)))
            .collect();
        rows.sort_by(|(a, _), (b, _)| order.compare_records(a, b));
        rows.into_iter()
            .skip(self.skip.unwrap_or(0))
            .take(self.limit.unwrap_or(usize::MAX))
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Record as returned to clients, with `fields` applied.
    pub fn project(&self, record: &Pokemon) -> Value {
        let value = record.to_value();
        match &self.fields {
            Some(fields) => fields.project(value),
            None => value,
        }
    }
}

fn parse_count(key: &str, v: &Value) -> Result<Option<usize>, AppError> {
    let n = match v {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    // PostgreSQL LIMIT and OFFSET are bigint.
    n.filter(|n| *n <= i64::MAX as u64)
        .and_then(|n| usize::try_from(n).ok())
        .map(Some)
        .ok_or_else(|| {
            AppError::BadRequest(format!(
                "{} must be an integer between 0 and {}",
                key,
                i64::MAX
            ))
        })
}

fn parse_include(v: &Value) -> Result<Vec<String>, AppError> {
    match v {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Object(obj) => obj
            .get("relation")
            .and_then(Value::as_str)
            .map(|s| vec![s.to_string()])
            .ok_or_else(|| AppError::BadRequest("include object needs a relation".into())),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.extend(parse_include(item)?);
            }
            Ok(out)
        }
        _ => Err(AppError::BadRequest("invalid include".into())),
    }
}
