//! `fields` projection.

use crate::error::AppError;
use serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fields {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl Fields {
    /// `{"prop": true|false}` or `["prop", ...]`.
    pub fn from_value(v: &Value) -> Result<Self, AppError> {
        let mut fields = Fields::default();
        match v {
            Value::Object(map) => {
                for (k, flag) in map {
                    match flag.as_bool() {
                        Some(true) => fields.include.push(k.clone()),
                        Some(false) => fields.exclude.push(k.clone()),
                        None => {
                            return Err(AppError::BadRequest(format!(
                                "fields.{} must be a boolean",
                                k
                            )))
                        }
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    let name = item.as_str().ok_or_else(|| {
                        AppError::BadRequest("fields entries must be strings".into())
                    })?;
                    fields.include.push(name.to_string());
                }
            }
            _ => {
                return Err(AppError::BadRequest(
                    "fields must be an object or an array".into(),
                ))
            }
        }
        Ok(fields)
    }

    /// Keep only the included properties if any are named, otherwise drop the excluded ones.
    pub fn project(&self, record: Value) -> Value {
        match record {
            Value::Object(mut map) => {
                if !self.include.is_empty() {
                    map.retain(|k, _| self.include.iter().any(|f| f == k));
                } else {
                    for k in &self.exclude {
                        map.remove(k);
                    }
                }
                Value::Object(map)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inclusion_wins_over_exclusion() {
        let f = Fields::from_value(&json!({"name": true, "level": false})).unwrap();
        let out = f.project(json!({"name": "mew", "level": 5, "type": "psychic"}));
        assert_eq!(out, json!({"name": "mew"}));
    }

    #[test]
    fn exclusion_only() {
        let f = Fields::from_value(&json!({"modified": false})).unwrap();
        let out = f.project(json!({"name": "mew", "modified": "2024-01-01T00:00:00.000Z"}));
        assert_eq!(out, json!({"name": "mew"}));
    }

    #[test]
    fn array_form() {
        let f = Fields::from_value(&json!(["name", "type"])).unwrap();
        let out = f.project(json!({"name": "mew", "level": 5, "type": "psychic"}));
        assert_eq!(out, json!({"name": "mew", "type": "psychic"}));
    }

    #[test]
    fn rejects_non_boolean_flags() {
        assert!(Fields::from_value(&json!({"name": 1})).is_err());
        assert!(Fields::from_value(&json!("name")).is_err());
    }
}
