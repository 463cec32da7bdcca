use std::collections::BTreeMap;

use crate::error::CoreError;
use crate::field_value::FieldValue;
use crate::ids::RecordId;

/// Coerced field values sent to the remote collection for one record.
pub type Patch = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: RecordId,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_fields<K, V>(id: RecordId, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        Self {
            id,
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: &str, value: FieldValue) {
        self.fields.insert(field.to_string(), value);
    }

    /// Merge a patch over the current fields.
    pub fn apply_patch(&mut self, patch: &Patch) {
        for (field, value) in patch {
            self.fields.insert(field.clone(), value.clone());
        }
    }

    /// Build a record from a JSON object. `id_key` names the identifier
    /// property, which may be a number or a numeric string; it is not
    /// repeated among the fields.
    pub fn from_json_object(id_key: &str, value: &serde_json::Value) -> Result<Self, CoreError> {
        let object = value
            .as_object()
            .ok_or_else(|| CoreError::InvalidData("record is not a JSON object".into()))?;
        let id = match object.get(id_key) {
            Some(serde_json::Value::Number(n)) => n
                .as_i64()
                .map(RecordId::new)
                .ok_or_else(|| CoreError::InvalidData(format!("non-integer {id_key}: {n}")))?,
            Some(serde_json::Value::String(s)) => s.parse()?,
            Some(other) => {
                return Err(CoreError::InvalidData(format!(
                    "unsupported {id_key} value: {other}"
                )));
            }
            None => return Err(CoreError::InvalidData(format!("record has no {id_key}"))),
        };
        let fields = object
            .iter()
            .filter(|(key, _)| key.as_str() != id_key)
            .map(|(key, v)| (key.clone(), FieldValue::from_json(v)))
            .collect();
        Ok(Self { id, fields })
    }

    pub fn to_json(&self, id_key: &str) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        object.insert(id_key.to_string(), serde_json::Value::from(self.id.get()));
        for (key, value) in &self.fields {
            object.insert(key.clone(), value.to_json());
        }
        serde_json::Value::Object(object)
    }
}

/// Render a patch as the JSON body a remote API expects.
pub fn patch_to_json(patch: &Patch) -> serde_json::Value {
    serde_json::Value::Object(
        patch
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect(),
    )
}
