//! Persisted resource state.

mod path;
mod reference;
mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::content_key;
use crate::resource::Attributes;

pub use path::{AttributePath, PathError, PathStep};
pub use reference::{AttributeReference, REFERENCE_KEY, ReferenceError, resolve_references};
pub use store::{FileStateStore, MemoryStateStore, StateStore, StoreError};

/// Observed attributes, or the explicit absence of any observation.
///
/// `Known` with an empty map is a real observation; only `Unknown` means
/// "nothing is known yet".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<Attributes>", into = "Option<Attributes>")]
pub enum StateValue {
    #[default]
    Unknown,
    Known(Attributes),
}

impl StateValue {
    pub fn is_known(&self) -> bool {
        matches!(self, StateValue::Known(_))
    }

    pub fn as_known(&self) -> Option<&Attributes> {
        match self {
            StateValue::Known(attributes) => Some(attributes),
            StateValue::Unknown => None,
        }
    }

    pub fn into_known(self) -> Option<Attributes> {
        self.into()
    }
}

impl From<Option<Attributes>> for StateValue {
    fn from(value: Option<Attributes>) -> Self {
        value.map_or(StateValue::Unknown, StateValue::Known)
    }
}

impl From<StateValue> for Option<Attributes> {
    fn from(value: StateValue) -> Self {
        match value {
            StateValue::Known(attributes) => Some(attributes),
            StateValue::Unknown => None,
        }
    }
}

/// Last observed state of one managed resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceStateRecord {
    pub resource_id: String,
    #[serde(default)]
    pub type_name: String,
    pub observed: StateValue,
    #[serde(default)]
    pub schema_version: i64,
    /// Hash of the desired config this state was produced from. Empty when unknown.
    #[serde(default)]
    pub config_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// On-disk envelope. Records written before generations existed are bare
/// attribute maps and carry no `generation` key.
#[derive(Serialize, Deserialize)]
#[serde(tag = "generation")]
enum Persisted {
    #[serde(rename = "v1")]
    V1(ResourceStateRecord),
}

impl ResourceStateRecord {
    pub fn new(
        resource_id: impl Into<String>,
        type_name: impl Into<String>,
        observed: Attributes,
        schema_version: i64,
        config_hash: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            resource_id: resource_id.into(),
            type_name: type_name.into(),
            observed: StateValue::Known(observed),
            schema_version,
            config_hash: config_hash.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Same record with a fresh observation. `created_at` is kept.
    pub fn with_observed(&self, observed: Attributes, config_hash: impl Into<String>) -> Self {
        Self {
            observed: StateValue::Known(observed),
            config_hash: config_hash.into(),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    pub fn is_known(&self) -> bool {
        self.observed.is_known()
    }

    /// Provider-side identifier, when the observed state has one.
    pub fn id(&self) -> Option<&str> {
        self.observed.as_known()?.get("id")?.as_str()
    }

    /// The observed state, but only if it was produced from `desired`.
    pub fn safe_state(&self, desired: &Attributes) -> Option<&Attributes> {
        if self.config_hash.is_empty() || self.config_hash != content_key(desired) {
            return None;
        }
        self.observed.as_known()
    }

    /// Value at `path` in the observed state.
    pub fn get(&self, path: &AttributePath) -> Result<&Value, PathError> {
        match &self.observed {
            StateValue::Known(attributes) => path.extract_from(attributes),
            StateValue::Unknown => Err(PathError::Unknown),
        }
    }

    pub fn to_persisted(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(Persisted::V1(self.clone()))
    }

    /// Reads a stored document, upgrading legacy records on the fly.
    ///
    /// `null` means no record. A legacy record has an empty config hash so
    /// that it never passes [`safe_state`](Self::safe_state).
    pub fn from_persisted(resource_id: &str, value: Value) -> Result<Option<Self>, StoreError> {
        let corrupt = |message: String| StoreError::Corrupt {
            resource_id: resource_id.to_string(),
            message,
        };

        match value {
            Value::Null => Ok(None),
            Value::Object(map) if map.contains_key("generation") => {
                let Persisted::V1(record) =
                    serde_json::from_value(Value::Object(map)).map_err(|e| corrupt(e.to_string()))?;
                Ok(Some(record))
            }
            Value::Object(map) => {
                tracing::debug!(resource_id, "upgrading legacy state record");
                Ok(Some(Self::new(resource_id, "", map, 0, "")))
            }
            other => Err(corrupt(format!("expected an object, found {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_state_value_serializes_as_option() {
        assert_eq!(serde_json::to_value(StateValue::Unknown).unwrap(), Value::Null);
        assert_eq!(
            serde_json::to_value(StateValue::Known(Attributes::new())).unwrap(),
            json!({})
        );
        let empty: StateValue = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty, StateValue::Known(Attributes::new()));
        let unknown: StateValue = serde_json::from_value(Value::Null).unwrap();
        assert_eq!(unknown, StateValue::Unknown);
    }

    #[test]
    fn test_persisted_round_trip_keeps_generation() {
        let record =
            ResourceStateRecord::new("r1", "local_file", attrs(json!({ "id": "x" })), 1, "abc");
        let persisted = record.to_persisted().unwrap();
        assert_eq!(persisted["generation"], json!("v1"));
        assert_eq!(persisted["observed"], json!({ "id": "x" }));

        let loaded = ResourceStateRecord::from_persisted("r1", persisted).unwrap().unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn test_legacy_record_is_upgraded() {
        let loaded = ResourceStateRecord::from_persisted("r1", json!({ "id": "x", "size": 3 }))
            .unwrap()
            .unwrap();
        assert_eq!(loaded.resource_id, "r1");
        assert_eq!(loaded.config_hash, "");
        assert_eq!(loaded.observed, StateValue::Known(attrs(json!({ "id": "x", "size": 3 }))));
        assert!(loaded.safe_state(&attrs(json!({ "size": 3 }))).is_none());
    }

    #[test]
    fn test_null_document_means_no_record() {
        assert!(ResourceStateRecord::from_persisted("r1", Value::Null).unwrap().is_none());
    }

    #[test]
    fn test_unknown_generation_is_corrupt() {
        let result = ResourceStateRecord::from_persisted("r1", json!({ "generation": "v9" }));
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
        let result = ResourceStateRecord::from_persisted("r1", json!([1, 2]));
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_safe_state_requires_matching_hash() {
        let desired = attrs(json!({ "filename": "a.txt" }));
        let record = ResourceStateRecord::new(
            "r1",
            "local_file",
            attrs(json!({ "id": "x" })),
            0,
            content_key(&desired),
        );
        assert_eq!(record.safe_state(&desired), record.observed.as_known());
        assert!(record.safe_state(&attrs(json!({ "filename": "b.txt" }))).is_none());
    }

    #[test]
    fn test_with_observed_keeps_created_at() {
        let record = ResourceStateRecord::new("r1", "t", Attributes::new(), 0, "");
        let next = record.with_observed(attrs(json!({ "id": "y" })), "h");
        assert_eq!(next.created_at, record.created_at);
        assert!(next.updated_at >= record.updated_at);
        assert_eq!(next.id(), Some("y"));
        assert_eq!(next.config_hash, "h");
    }
}
