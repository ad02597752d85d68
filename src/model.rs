//! Pokemon model: persisted record, partial (patch) form, and property rules for request bodies.
//!
//! The model is non-strict: any property other than `name` and `modified` is kept as a free-form
//! JSON value and returned at the top level of the record.

use crate::error::AppError;
use crate::service::{JsonKind, ValidationRule};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use utoipa::ToSchema;

pub const MODEL_NAME: &str = "Pokemon";
/// Identity property; also the primary key column.
pub const ID_PROPERTY: &str = "name";
/// Set by the persist hook on every write.
pub const MODIFIED_PROPERTY: &str = "modified";

/// A stored Pokemon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(title = "Pokemon")]
pub struct Pokemon {
    /// Unique name; identifies the record.
    pub name: String,
    /// Time of the last create/update, set by the server.
    #[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub properties: BTreeMap<String, Value>,
}

/// Body schema for PATCH routes; every property optional.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[schema(title = "PokemonPartial")]
pub struct PokemonPartial {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub properties: BTreeMap<String, Value>,
}

impl Pokemon {
    pub fn new(name: impl Into<String>) -> Self {
        Pokemon {
            name: name.into(),
            modified: None,
            properties: BTreeMap::new(),
        }
    }

    /// Build a full record from persist data (after hooks ran). `name` is required.
    pub fn from_data(mut data: Map<String, Value>) -> Result<Self, AppError> {
        let name = match data.remove(ID_PROPERTY) {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(_) => {
                return Err(AppError::Validation(format!(
                    "{} must be a non-empty string",
                    ID_PROPERTY
                )))
            }
            None => return Err(AppError::Validation(format!("{} is required", ID_PROPERTY))),
        };
        let modified = take_modified(&mut data)?;
        Ok(Pokemon {
            name,
            modified,
            properties: data.into_iter().collect(),
        })
    }

    /// JSON object form, as returned by the API and evaluated by `where` filters.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(ID_PROPERTY.into(), Value::String(self.name.clone()));
        if let Some(m) = &self.modified {
            map.insert(MODIFIED_PROPERTY.into(), Value::String(timestamp::format(m)));
        }
        for (k, v) in &self.properties {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }

    /// Property rules checked against request bodies.
    pub fn validation_rules() -> HashMap<&'static str, ValidationRule> {
        let mut rules = HashMap::new();
        rules.insert(
            ID_PROPERTY,
            ValidationRule {
                required: true,
                kind: Some(JsonKind::String),
                min_length: Some(1),
                ..ValidationRule::default()
            },
        );
        rules.insert(
            MODIFIED_PROPERTY,
            ValidationRule {
                kind: Some(JsonKind::String),
                format: Some("date-time"),
                nullable: true,
                ..ValidationRule::default()
            },
        );
        rules
    }
}

/// Changes for a partial update. Properties are merged into the stored record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PokemonPatch {
    pub modified: Option<DateTime<Utc>>,
    pub properties: BTreeMap<String, Value>,
}

impl PokemonPatch {
    /// Build from persist data. Identity is dropped; the repository has already checked it.
    pub fn from_data(mut data: Map<String, Value>) -> Result<Self, AppError> {
        data.remove(ID_PROPERTY);
        let modified = take_modified(&mut data)?;
        Ok(PokemonPatch {
            modified,
            properties: data.into_iter().collect(),
        })
    }

    pub fn apply_to(&self, record: &mut Pokemon) {
        if let Some(m) = self.modified {
            record.modified = Some(m);
        }
        for (k, v) in &self.properties {
            record.properties.insert(k.clone(), v.clone());
        }
    }
}

fn take_modified(data: &mut Map<String, Value>) -> Result<Option<DateTime<Utc>>, AppError> {
    match data.remove(MODIFIED_PROPERTY) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => timestamp::parse(&s).map(Some).ok_or_else(|| {
            AppError::Validation(format!("{} must be a date-time", MODIFIED_PROPERTY))
        }),
        Some(_) => Err(AppError::Validation(format!(
            "{} must be a date-time",
            MODIFIED_PROPERTY
        ))),
    }
}

/// RFC 3339 timestamps with millisecond precision in UTC (`2024-01-31T10:00:00.000Z`).
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn format(t: &DateTime<Utc>) -> String {
        t.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn parse(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(t) => serializer.serialize_str(&format(t)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| parse(&s).ok_or_else(|| D::Error::custom(format!("invalid date-time: {}", s))))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn from_data_splits_identity_and_properties() {
        let p = Pokemon::from_data(obj(json!({
            "name": "pikachu",
            "modified": "2024-05-01T12:00:00.250Z",
            "type": "electric",
            "level": 5
        })))
        .unwrap();
        assert_eq!(p.name, "pikachu");
        assert_eq!(
            p.modified.map(|m| timestamp::format(&m)).as_deref(),
            Some("2024-05-01T12:00:00.250Z")
        );
        assert_eq!(p.properties.get("type"), Some(&json!("electric")));
        assert!(!p.properties.contains_key("name"));
    }

    #[test]
    fn from_data_requires_name() {
        assert!(matches!(
            Pokemon::from_data(obj(json!({"type": "fire"}))),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            Pokemon::from_data(obj(json!({"name": ""}))),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn serialized_form_matches_to_value() {
        let mut p = Pokemon::new("eevee");
        p.modified = timestamp::parse("2024-05-01T12:00:00Z");
        p.properties.insert("type".into(), json!("normal"));
        let serialized = serde_json::to_value(&p).unwrap();
        assert_eq!(serialized, p.to_value());
        assert_eq!(serialized["modified"], json!("2024-05-01T12:00:00.000Z"));
        let back: Pokemon = serde_json::from_value(serialized).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn patch_merges_properties() {
        let mut p = Pokemon::new("onix");
        p.properties.insert("type".into(), json!("rock"));
        p.properties.insert("level".into(), json!(10));
        let patch = PokemonPatch::from_data(obj(json!({"name": "onix", "level": 12}))).unwrap();
        patch.apply_to(&mut p);
        assert_eq!(p.properties.get("type"), Some(&json!("rock")));
        assert_eq!(p.properties.get("level"), Some(&json!(12)));
        assert_eq!(p.name, "onix");
    }
}
