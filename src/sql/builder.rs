//! Builds parameterized INSERT, SELECT, UPDATE, DELETE for the pokemon table.
//!
//! Identifiers come from configuration only and are quoted. Every value, including the keys
//! of free-form properties, is a bound parameter.

use crate::filter::{Condition, Filter, Op, Order, Pattern, Where};
use crate::model::{timestamp, Pokemon, PokemonPatch, ID_PROPERTY, MODIFIED_PROPERTY};
use crate::sql::PgBindValue;
use serde_json::Value;

/// Columns selected and returned by every statement, in decode order.
pub const RECORD_COLUMNS: &str = r#""name", "modified", "properties""#;

/// Quote identifier for PostgreSQL (safe: only from config).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Schema-qualified table the data source writes to.
#[derive(Clone, Debug)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        TableRef {
            schema: schema.into(),
            table: table.into(),
        }
    }

    pub fn qualified(&self) -> String {
        format!("{}.{}", quoted(&self.schema), quoted(&self.table))
    }
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Push a parameter and return its placeholder (`$n`).
    fn push_param(&mut self, v: PgBindValue) -> String {
        self.params.push(v);
        format!("${}", self.params.len())
    }
}

pub fn insert(table: &TableRef, record: &Pokemon) -> QueryBuf {
    let mut q = QueryBuf::new();
    let name = q.push_param(PgBindValue::Text(record.name.clone()));
    let modified = q.push_param(match record.modified {
        Some(t) => PgBindValue::Timestamp(t),
        None => PgBindValue::Null,
    });
    let props = q.push_param(PgBindValue::Json(properties_json(&record.properties)));
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}, {}::timestamptz, {}) RETURNING {}",
        table.qualified(),
        RECORD_COLUMNS,
        name,
        modified,
        props,
        RECORD_COLUMNS
    );
    q
}

/// SELECT by primary key. The name is the sole param.
pub fn select_by_id(table: &TableRef, name: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.push_param(PgBindValue::Text(name.to_string()));
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {}",
        RECORD_COLUMNS,
        table.qualified(),
        quoted(ID_PROPERTY),
        ph
    );
    q
}

/// SELECT with the filter's where, order (name as final tie-break), offset and limit.
pub fn select_list(table: &TableRef, filter: &Filter) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_clause = match &filter.where_ {
        Some(w) => format!(" WHERE {}", where_sql(&mut q, w)),
        None => String::new(),
    };
    let order_clause = order_sql(&mut q, filter.order.as_ref());
    let limit_clause = filter.limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_clause = filter.skip.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{} ORDER BY {}{}{}",
        RECORD_COLUMNS,
        table.qualified(),
        where_clause,
        order_clause,
        limit_clause,
        offset_clause
    );
    q
}

pub fn count(table: &TableRef, where_: Option<&Where>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_clause = match where_ {
        Some(w) => format!(" WHERE {}", where_sql(&mut q, w)),
        None => String::new(),
    };
    q.sql = format!("SELECT COUNT(*) FROM {}{}", table.qualified(), where_clause);
    q
}

/// Merge a patch into every matching row.
pub fn update_where(table: &TableRef, patch: &PokemonPatch, where_: Option<&Where>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::with_capacity(2);
    if let Some(t) = patch.modified {
        let ph = q.push_param(PgBindValue::Timestamp(t));
        sets.push(format!("{} = {}", quoted(MODIFIED_PROPERTY), ph));
    }
    let props = q.push_param(PgBindValue::Json(properties_json(&patch.properties)));
    sets.push(format!(
        "{col} = {col} || {}",
        props,
        col = quoted("properties")
    ));
    let where_clause = match where_ {
        Some(w) => format!(" WHERE {}", where_sql(&mut q, w)),
        None => String::new(),
    };
    q.sql = format!(
        "UPDATE {} SET {}{}",
        table.qualified(),
        sets.join(", "),
        where_clause
    );
    q
}

/// Merge a patch into the row with the given name.
pub fn update_by_id(table: &TableRef, name: &str, patch: &PokemonPatch) -> QueryBuf {
    update_where(table, patch, Some(&id_where(name)))
}

/// Overwrite every property of the row with the record's name.
pub fn replace(table: &TableRef, record: &Pokemon) -> QueryBuf {
    let mut q = QueryBuf::new();
    let name = q.push_param(PgBindValue::Text(record.name.clone()));
    let modified = q.push_param(match record.modified {
        Some(t) => PgBindValue::Timestamp(t),
        None => PgBindValue::Null,
    });
    let props = q.push_param(PgBindValue::Json(properties_json(&record.properties)));
    q.sql = format!(
        "UPDATE {} SET {} = {}::timestamptz, {} = {} WHERE {} = {}",
        table.qualified(),
        quoted(MODIFIED_PROPERTY),
        modified,
        quoted("properties"),
        props,
        quoted(ID_PROPERTY),
        name
    );
    q
}

pub fn delete_by_id(table: &TableRef, name: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.push_param(PgBindValue::Text(name.to_string()));
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {}",
        table.qualified(),
        quoted(ID_PROPERTY),
        ph
    );
    q
}

fn id_where(name: &str) -> Where {
    Where::Condition(Condition {
        property: ID_PROPERTY.to_string(),
        op: Op::Eq(Value::String(name.to_string())),
    })
}

fn properties_json(props: &std::collections::BTreeMap<String, Value>) -> Value {
    Value::Object(props.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

/// Where a property lives in the table.
enum Target {
    Name,
    Modified,
    Property(String),
}

impl Target {
    fn of(property: &str) -> Self {
        match property {
            ID_PROPERTY => Target::Name,
            MODIFIED_PROPERTY => Target::Modified,
            other => Target::Property(other.to_string()),
        }
    }

    /// Expression compared by value operators.
    fn value_expr(&self, q: &mut QueryBuf) -> String {
        match self {
            Target::Name => quoted(ID_PROPERTY),
            Target::Modified => quoted(MODIFIED_PROPERTY),
            Target::Property(key) => {
                let k = q.push_param(PgBindValue::Text(key.clone()));
                format!("({} -> {})", quoted("properties"), k)
            }
        }
    }

    /// Text form used by pattern operators; timestamps render as the API does.
    fn text_expr(&self, q: &mut QueryBuf) -> String {
        match self {
            Target::Name => quoted(ID_PROPERTY),
            Target::Modified => format!(
                "to_char({} AT TIME ZONE 'UTC', 'YYYY-MM-DD\"T\"HH24:MI:SS.MS\"Z\"')",
                quoted(MODIFIED_PROPERTY)
            ),
            Target::Property(key) => {
                let k = q.push_param(PgBindValue::Text(key.clone()));
                format!("({} ->> {})", quoted("properties"), k)
            }
        }
    }

    /// Bind an operand comparable with this target, or `None` when no stored value can match it.
    fn operand(&self, q: &mut QueryBuf, v: &Value) -> Option<String> {
        match (self, v) {
            (Target::Name, Value::String(s)) => Some(q.push_param(PgBindValue::Text(s.clone()))),
            (Target::Name, _) => None,
            (Target::Modified, Value::String(s)) => {
                let t = timestamp::parse(s)?;
                Some(format!("{}::timestamptz", q.push_param(PgBindValue::Timestamp(t))))
            }
            (Target::Modified, _) => None,
            (Target::Property(_), Value::Null) => None,
            (Target::Property(_), other) => {
                Some(format!("{}::jsonb", q.push_param(PgBindValue::Json(other.clone()))))
            }
        }
    }
}

/// jsonb type name of an operand, used to keep ordering comparisons within one kind.
fn jsonb_kind(v: &Value) -> Option<&'static str> {
    match v {
        Value::String(_) => Some("string"),
        Value::Number(_) => Some("number"),
        Value::Bool(_) => Some("boolean"),
        _ => None,
    }
}

pub fn where_sql(q: &mut QueryBuf, w: &Where) -> String {
    match w {
        Where::And(parts) if parts.is_empty() => "TRUE".into(),
        Where::Or(parts) if parts.is_empty() => "FALSE".into(),
        Where::And(parts) => format!(
            "({})",
            parts.iter().map(|p| where_sql(q, p)).collect::<Vec<_>>().join(" AND ")
        ),
        Where::Or(parts) => format!(
            "({})",
            parts.iter().map(|p| where_sql(q, p)).collect::<Vec<_>>().join(" OR ")
        ),
        Where::Condition(c) => condition_sql(q, c),
    }
}

fn condition_sql(q: &mut QueryBuf, c: &Condition) -> String {
    let target = Target::of(&c.property);
    match &c.op {
        Op::Eq(Value::Null) => is_missing(q, &target),
        Op::Neq(Value::Null) => format!("NOT {}", is_missing(q, &target)),
        Op::Eq(v) => {
            let e = target.value_expr(q);
            match target.operand(q, v) {
                Some(p) => format!("{} = {}", e, p),
                None => "FALSE".into(),
            }
        }
        Op::Neq(v) => {
            let e = target.value_expr(q);
            match target.operand(q, v) {
                Some(p) => format!("{} IS DISTINCT FROM {}", e, p),
                None => "TRUE".into(),
            }
        }
        Op::Gt(v) => ordered(q, &target, ">", v),
        Op::Gte(v) => ordered(q, &target, ">=", v),
        Op::Lt(v) => ordered(q, &target, "<", v),
        Op::Lte(v) => ordered(q, &target, "<=", v),
        Op::Between(lo, hi) => {
            let kinds_match = jsonb_kind(lo).is_some() && jsonb_kind(lo) == jsonb_kind(hi);
            if matches!(target, Target::Property(_)) && !kinds_match {
                return "FALSE".into();
            }
            let e = target.value_expr(q);
            match (target.operand(q, lo), target.operand(q, hi)) {
                (Some(a), Some(b)) => {
                    let guard = kind_guard(&target, &e, lo);
                    format!("({}{} BETWEEN {} AND {})", guard, e, a, b)
                }
                _ => "FALSE".into(),
            }
        }
        Op::Inq(values) => {
            let e = target.value_expr(q);
            let list: Vec<String> = values.iter().filter_map(|v| target.operand(q, v)).collect();
            if list.is_empty() {
                "FALSE".into()
            } else {
                format!("{} IN ({})", e, list.join(", "))
            }
        }
        Op::Nin(values) => {
            let e = target.value_expr(q);
            let list: Vec<String> = values.iter().filter_map(|v| target.operand(q, v)).collect();
            if list.is_empty() {
                "TRUE".into()
            } else {
                format!("({} IS NULL OR {} NOT IN ({}))", e, e, list.join(", "))
            }
        }
        Op::Like(p) => pattern(q, &target, "LIKE", p, false),
        Op::Ilike(p) => pattern(q, &target, "ILIKE", p, false),
        Op::Nlike(p) => pattern(q, &target, "LIKE", p, true),
        Op::Nilike(p) => pattern(q, &target, "ILIKE", p, true),
        Op::Regexp(p) => {
            let op = if p.case_insensitive { "~*" } else { "~" };
            pattern(q, &target, op, p, false)
        }
    }
}

fn is_missing(q: &mut QueryBuf, target: &Target) -> String {
    match target {
        Target::Name => "FALSE".into(),
        Target::Modified => format!("{} IS NULL", quoted(MODIFIED_PROPERTY)),
        Target::Property(_) => {
            let e = target.value_expr(q);
            format!("({} IS NULL OR {} = 'null'::jsonb)", e, e)
        }
    }
}

/// Type guard so free-form properties only compare against operands of the same JSON kind.
fn kind_guard(target: &Target, expr: &str, operand: &Value) -> String {
    match (target, jsonb_kind(operand)) {
        (Target::Property(_), Some(kind)) => format!("jsonb_typeof({}) = '{}' AND ", expr, kind),
        _ => String::new(),
    }
}

fn ordered(q: &mut QueryBuf, target: &Target, op: &str, v: &Value) -> String {
    if matches!(target, Target::Property(_)) && jsonb_kind(v).is_none() {
        return "FALSE".into();
    }
    let e = target.value_expr(q);
    match target.operand(q, v) {
        Some(p) => format!("({}{} {} {})", kind_guard(target, &e, v), e, op, p),
        None => "FALSE".into(),
    }
}

/// LIKE and ILIKE get `ESCAPE ''` so a backslash is an ordinary character, as in memory.
fn pattern(q: &mut QueryBuf, target: &Target, op: &str, p: &Pattern, negate: bool) -> String {
    let e = target.text_expr(q);
    let ph = q.push_param(PgBindValue::Text(p.source.clone()));
    let rhs = if op.ends_with("LIKE") {
        format!("{} ESCAPE ''", ph)
    } else {
        ph
    };
    if negate {
        format!("({} IS NULL OR {} NOT {} {})", e, e, op, rhs)
    } else {
        format!("{} {} {}", e, op, rhs)
    }
}

fn order_sql(q: &mut QueryBuf, order: Option<&Order>) -> String {
    let mut parts = Vec::new();
    for key in order.map(|o| o.0.as_slice()).unwrap_or(&[]) {
        let e = Target::of(&key.property).value_expr(q);
        parts.push(if key.descending {
            format!("{} DESC NULLS LAST", e)
        } else {
            format!("{} ASC NULLS FIRST", e)
        });
    }
    parts.push(format!("{} ASC", quoted(ID_PROPERTY)));
    parts.join(", ")
}
