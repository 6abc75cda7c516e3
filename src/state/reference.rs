use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use super::{AttributePath, PathError, StateStore, StoreError};
use crate::resource::Attributes;

/// Marker key of a value that points into another resource's stored state.
pub const REFERENCE_KEY: &str = "__tfsync_reference__";

/// `{"__tfsync_reference__": {"resource_id": "...", "path": "a.0.b"}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeReference {
    pub resource_id: String,
    pub path: String,
}

impl AttributeReference {
    pub fn new(resource_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            path: path.into(),
        }
    }

    pub fn to_value(&self) -> Value {
        json!({ REFERENCE_KEY: { "resource_id": self.resource_id, "path": self.path } })
    }
}

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("malformed attribute reference: {0}")]
    Malformed(String),

    #[error("state of '{0}' can not be found, its attributes can not be referenced")]
    UnknownResource(String),

    #[error("reference into '{resource_id}': {source}")]
    Path {
        resource_id: String,
        #[source]
        source: PathError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Copy of `config` with every attribute reference replaced by the value it
/// points to.
pub fn resolve_references(
    config: &Attributes,
    store: &dyn StateStore,
) -> Result<Attributes, ReferenceError> {
    config
        .iter()
        .map(|(key, value)| Ok((key.clone(), resolve_value(value, store)?)))
        .collect()
}

fn resolve_value(value: &Value, store: &dyn StateStore) -> Result<Value, ReferenceError> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, store))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => match map.get(REFERENCE_KEY) {
            Some(target) => {
                let reference: AttributeReference = serde_json::from_value(target.clone())
                    .map_err(|e| ReferenceError::Malformed(e.to_string()))?;
                lookup(&reference, store)
            }
            None => resolve_references(map, store).map(Value::Object),
        },
        other => Ok(other.clone()),
    }
}

fn lookup(reference: &AttributeReference, store: &dyn StateStore) -> Result<Value, ReferenceError> {
    let record = store
        .load(&reference.resource_id)?
        .filter(|record| record.is_known())
        .ok_or_else(|| ReferenceError::UnknownResource(reference.resource_id.clone()))?;

    let Ok(path) = reference.path.parse::<AttributePath>();
    let value = record.get(&path).map_err(|source| ReferenceError::Path {
        resource_id: reference.resource_id.clone(),
        source,
    })?;
    tracing::debug!(
        resource_id = %reference.resource_id,
        path = %reference.path,
        "resolved attribute reference"
    );
    Ok(value.clone())
}
