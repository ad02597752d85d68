//! Response bodies and helpers shared by the Pokemon handlers.

use axum::{http::StatusCode, Json};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

/// Result of count and bulk update operations.
#[derive(Debug, Serialize, ToSchema)]
pub struct CountBody {
    pub count: u64,
}

pub fn count(count: u64) -> (StatusCode, Json<CountBody>) {
    (StatusCode::OK, Json(CountBody { count }))
}

pub fn one(record: Value) -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(record))
}

pub fn many(records: Vec<Value>) -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(Value::Array(records)))
}

pub fn no_content() -> StatusCode {
    StatusCode::NO_CONTENT
}
