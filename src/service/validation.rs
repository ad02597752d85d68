//! Request validation from model property rules.

use crate::error::AppError;
use crate::model::timestamp;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// JSON type a property value must have.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JsonKind {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl JsonKind {
    fn matches(self, v: &Value) -> bool {
        match self {
            JsonKind::String => v.is_string(),
            JsonKind::Number => v.is_number(),
            JsonKind::Boolean => v.is_boolean(),
            JsonKind::Object => v.is_object(),
            JsonKind::Array => v.is_array(),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            JsonKind::String => "string",
            JsonKind::Number => "number",
            JsonKind::Boolean => "boolean",
            JsonKind::Object => "object",
            JsonKind::Array => "array",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ValidationRule {
    pub required: bool,
    pub kind: Option<JsonKind>,
    /// Named format; `date-time` is supported.
    pub format: Option<&'static str>,
    pub min_length: Option<usize>,
    /// Whether an explicit JSON null is accepted.
    pub nullable: bool,
}

pub struct RequestValidator;

impl RequestValidator {
    /// Validate body against per-property rules. All required properties must be present.
    pub fn validate(
        body: &Map<String, Value>,
        rules: &HashMap<&'static str, ValidationRule>,
    ) -> Result<(), AppError> {
        for (prop, rule) in rules {
            let val = body.get(*prop);
            if rule.required && (val.is_none() || val == Some(&Value::Null)) {
                return Err(AppError::Validation(format!("{} is required", prop)));
            }
            if let Some(v) = val {
                validate_property(prop, v, rule)?;
            }
        }
        Ok(())
    }

    /// Validate only the properties present in body (for PATCH). Required is not enforced for missing properties.
    pub fn validate_partial(
        body: &Map<String, Value>,
        rules: &HashMap<&'static str, ValidationRule>,
    ) -> Result<(), AppError> {
        for (prop, v) in body {
            if let Some(rule) = rules.get(prop.as_str()) {
                validate_property(prop, v, rule)?;
            }
        }
        Ok(())
    }

    /// Unwrap a request body into a JSON object.
    pub fn object_body(value: Value) -> Result<Map<String, Value>, AppError> {
        match value {
            Value::Object(m) => Ok(m),
            _ => Err(AppError::BadRequest("body must be a JSON object".into())),
        }
    }
}

fn validate_property(prop: &str, v: &Value, rule: &ValidationRule) -> Result<(), AppError> {
    if v.is_null() {
        if rule.nullable || !rule.required {
            return Ok(());
        }
        return Err(AppError::Validation(format!("{} must not be null", prop)));
    }
    if let Some(kind) = rule.kind {
        if !kind.matches(v) {
            return Err(AppError::Validation(format!(
                "{} must be of type {}",
                prop,
                kind.as_str()
            )));
        }
    }
    if let Some(format) = rule.format {
        validate_format(prop, v, format)?;
    }
    if let Some(min) = rule.min_length {
        if let Some(s) = v.as_str() {
            if s.chars().count() < min {
                return Err(AppError::Validation(format!(
                    "{} must be at least {} characters",
                    prop, min
                )));
            }
        }
    }
    Ok(())
}

fn validate_format(prop: &str, v: &Value, format: &str) -> Result<(), AppError> {
    match format {
        "date-time" => {
            if let Some(s) = v.as_str() {
                if timestamp::parse(s).is_none() {
                    return Err(AppError::Validation(format!(
                        "{} must be a valid date-time",
                        prop
                    )));
                }
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Pokemon;
    use serde_json::json;

    fn body(v: Value) -> Map<String, Value> {
        RequestValidator::object_body(v).unwrap()
    }

    #[test]
    fn create_body_requires_name() {
        let rules = Pokemon::validation_rules();
        let err = RequestValidator::validate(&body(json!({"type": "water"})), &rules).unwrap_err();
        assert!(matches!(err, AppError::Validation(m) if m == "name is required"));
        assert!(RequestValidator::validate(&body(json!({"name": "squirtle"})), &rules).is_ok());
    }

    #[test]
    fn name_must_be_non_empty_string() {
        let rules = Pokemon::validation_rules();
        assert!(RequestValidator::validate(&body(json!({"name": 25})), &rules).is_err());
        assert!(RequestValidator::validate(&body(json!({"name": ""})), &rules).is_err());
    }

    #[test]
    fn modified_must_be_a_date_time_when_present() {
        let rules = Pokemon::validation_rules();
        assert!(RequestValidator::validate_partial(&body(json!({"modified": "yesterday"})), &rules).is_err());
        assert!(RequestValidator::validate_partial(&body(json!({"modified": 12})), &rules).is_err());
        assert!(RequestValidator::validate_partial(
            &body(json!({"modified": "2020-01-01T00:00:00Z"})),
            &rules
        )
        .is_ok());
        assert!(RequestValidator::validate_partial(&body(json!({"modified": null})), &rules).is_ok());
    }

    #[test]
    fn partial_does_not_require_name_but_rejects_null_name() {
        let rules = Pokemon::validation_rules();
        assert!(RequestValidator::validate_partial(&body(json!({"level": 3})), &rules).is_ok());
        assert!(RequestValidator::validate_partial(&body(json!({"name": null})), &rules).is_err());
    }

    #[test]
    fn free_form_properties_pass_through() {
        let rules = Pokemon::validation_rules();
        let b = body(json!({"name": "ditto", "moves": ["transform"], "stats": {"hp": 48}}));
        assert!(RequestValidator::validate(&b, &rules).is_ok());
    }

    #[test]
    fn non_object_body_is_bad_request() {
        assert!(matches!(
            RequestValidator::object_body(json!([1, 2])),
            Err(AppError::BadRequest(_))
        ));
    }
}
