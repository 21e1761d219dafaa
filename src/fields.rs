//! Field maps and entity links.
//!
//! A [`FieldMap`] is the flat, ordered and case-preserving record the service
//! returns for an entity. Values stay as `serde_json::Value`; typed accessors
//! live on the entity wrappers.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Flat mapping of field name to value.
pub type FieldMap = IndexMap<String, Value>;

/// Build a [`FieldMap`] from a JSON object literal.
///
/// Non-object values yield an empty map.
pub fn field_map(value: Value) -> FieldMap {
    match value {
        Value::Object(obj) => obj.into_iter().collect(),
        _ => FieldMap::new(),
    }
}

/// Convert a [`FieldMap`] into a JSON object.
pub fn to_value(map: &FieldMap) -> Value {
    Value::Object(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

/// Whether a value counts as unset: null, false, zero, "", [] and {}.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Read a string field, treating null as absent.
pub fn str_field<'a>(map: &'a FieldMap, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

/// Read an integer field, treating null as absent.
pub fn int_field(map: &FieldMap, key: &str) -> Option<i64> {
    map.get(key).and_then(Value::as_i64)
}

/// A link to a remote entity: `{type, id}` plus an optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<String>, id: i64) -> Self {
        Self {
            entity_type: entity_type.into(),
            id,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Extract a link from a field map carrying `type` and `id`.
    pub fn from_map(map: &FieldMap) -> Option<Self> {
        let entity_type = str_field(map, "type")?;
        let id = int_field(map, "id")?;
        let name = str_field(map, "name")
            .or_else(|| str_field(map, "code"))
            .or_else(|| str_field(map, "content"))
            .map(str::to_string);
        Some(Self {
            entity_type: entity_type.to_string(),
            id,
            name,
        })
    }

    /// Extract a link from a JSON value (a link field in a response).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(obj) => {
                let entity_type = obj.get("type")?.as_str()?;
                let id = obj.get("id")?.as_i64()?;
                let name = obj.get("name").and_then(Value::as_str).map(str::to_string);
                Some(Self {
                    entity_type: entity_type.to_string(),
                    id,
                    name,
                })
            }
            _ => None,
        }
    }

    /// Wire representation used in filters and link fields.
    pub fn to_value(&self) -> Value {
        json!({ "type": self.entity_type, "id": self.id })
    }
}

impl From<EntityRef> for Value {
    fn from(r: EntityRef) -> Self {
        r.to_value()
    }
}

impl From<&EntityRef> for Value {
    fn from(r: &EntityRef) -> Self {
        r.to_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_empty_value() {
        assert!(is_empty_value(&Value::Null));
        assert!(is_empty_value(&json!("")));
        assert!(is_empty_value(&json!([])));
        assert!(is_empty_value(&json!({})));
        assert!(is_empty_value(&json!(0)));
        assert!(is_empty_value(&json!(false)));
        assert!(!is_empty_value(&json!("x")));
        assert!(!is_empty_value(&json!([1])));
        assert!(!is_empty_value(&json!(3)));
    }

    #[test]
    fn test_field_map_preserves_order_and_case() {
        let map = field_map(json!({"Code": "a", "id": 1, "sg_Status": "ip"}));
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Code", "id", "sg_Status"]);
    }

    #[test]
    fn test_entity_ref_from_map() {
        let map = field_map(json!({"type": "Shot", "id": 12, "code": "SH010"}));
        let r = EntityRef::from_map(&map).unwrap();
        assert_eq!(r.entity_type, "Shot");
        assert_eq!(r.id, 12);
        assert_eq!(r.name.as_deref(), Some("SH010"));
        assert_eq!(r.to_value(), json!({"type": "Shot", "id": 12}));

        let no_id = field_map(json!({"type": "Shot"}));
        assert!(EntityRef::from_map(&no_id).is_none());
    }
}
