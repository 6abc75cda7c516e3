//! Provider schemas and schema-driven shaping of configs and states.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::resource::Attributes;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderSchema {
    #[serde(default)]
    pub provider: Schema,
    #[serde(default)]
    pub resource_schemas: BTreeMap<String, Schema>,
}

impl ProviderSchema {
    pub fn resource(&self, type_name: &str) -> Option<&Schema> {
        self.resource_schemas.get(type_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub block: SchemaBlock,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaBlock {
    #[serde(default)]
    pub attributes: Vec<SchemaAttribute>,
    #[serde(default)]
    pub block_types: Vec<NestedBlockType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaAttribute {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub computed: bool,
    #[serde(default)]
    pub deprecated: bool,
}

impl SchemaAttribute {
    /// Set by the provider only, never by a config.
    pub fn is_read_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockNesting {
    #[default]
    Single,
    List,
    Set,
    Map,
    Group,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedBlockType {
    pub type_name: String,
    #[serde(default)]
    pub nesting: BlockNesting,
    #[serde(default)]
    pub block: SchemaBlock,
    #[serde(default)]
    pub min_items: i64,
    #[serde(default)]
    pub max_items: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("'{path}' should be {expected} for {nesting:?} nesting")]
    ShapeMismatch {
        path: String,
        expected: &'static str,
        nesting: BlockNesting,
    },
}

/// Adds every attribute and nested block the schema declares but `state`
/// omits, as null. Providers expect a value for every declared attribute.
pub fn fill_partial_state(
    state: &Attributes,
    block: &SchemaBlock,
) -> Result<Attributes, SchemaError> {
    fill_at(state, block, "")
}

fn fill_at(state: &Attributes, block: &SchemaBlock, path: &str) -> Result<Attributes, SchemaError> {
    let mut filled: Attributes = block
        .attributes
        .iter()
        .map(|attribute| (attribute.name.clone(), Value::Null))
        .collect();
    filled.extend(state.iter().map(|(k, v)| (k.clone(), v.clone())));

    for nested in &block.block_types {
        let key = nested.type_name.as_str();
        let nested_path = if path.is_empty() {
            key.to_string()
        } else {
            format!("{path}.{key}")
        };
        let mismatch = |expected| SchemaError::ShapeMismatch {
            path: nested_path.clone(),
            expected,
            nesting: nested.nesting,
        };

        let value = match state.get(key) {
            None | Some(Value::Null) => Value::Null,
            Some(value) => match nested.nesting {
                BlockNesting::Single | BlockNesting::Group => {
                    let map = value.as_object().ok_or_else(|| mismatch("an object"))?;
                    Value::Object(fill_at(map, &nested.block, &nested_path)?)
                }
                BlockNesting::List | BlockNesting::Set => {
                    let items = value.as_array().ok_or_else(|| mismatch("a list"))?;
                    let filled = items
                        .iter()
                        .enumerate()
                        .map(|(i, item)| {
                            let item_path = format!("{nested_path}.{i}");
                            let map = item.as_object().ok_or_else(|| SchemaError::ShapeMismatch {
                                path: item_path.clone(),
                                expected: "an object",
                                nesting: nested.nesting,
                            })?;
                            fill_at(map, &nested.block, &item_path).map(Value::Object)
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    Value::Array(filled)
                }
                BlockNesting::Map => {
                    let entries = value.as_object().ok_or_else(|| mismatch("an object"))?;
                    let mut filled = Attributes::new();
                    for (entry_key, entry) in entries {
                        let entry_path = format!("{nested_path}.{entry_key}");
                        let map = entry.as_object().ok_or_else(|| SchemaError::ShapeMismatch {
                            path: entry_path.clone(),
                            expected: "an object",
                            nesting: nested.nesting,
                        })?;
                        let entry = fill_at(map, &nested.block, &entry_path)?;
                        filled.insert(entry_key.clone(), Value::Object(entry));
                    }
                    Value::Object(filled)
                }
            },
        };
        filled.insert(key.to_string(), value);
    }

    Ok(filled)
}

/// Drops nulls and provider-only attributes from an observed state, so what
/// remains is comparable with a desired config.
///
/// Values whose shape disagrees with the schema are kept as they are.
pub fn parse_resource_state(state: &Attributes, block: &SchemaBlock) -> Attributes {
    let mut parsed = Attributes::new();

    for attribute in &block.attributes {
        if attribute.is_read_only() {
            continue;
        }
        match state.get(&attribute.name) {
            None | Some(Value::Null) => {}
            Some(value) => {
                parsed.insert(attribute.name.clone(), value.clone());
            }
        }
    }

    for nested in &block.block_types {
        let key = &nested.type_name;
        let value = match state.get(key) {
            None | Some(Value::Null) => continue,
            Some(value) => value,
        };
        let shaped = match (nested.nesting, value) {
            (BlockNesting::Single | BlockNesting::Group, Value::Object(map)) => {
                Value::Object(parse_resource_state(map, &nested.block))
            }
            (BlockNesting::List | BlockNesting::Set, Value::Array(items)) => Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Object(map) => {
                            Value::Object(parse_resource_state(map, &nested.block))
                        }
                        other => other.clone(),
                    })
                    .collect(),
            ),
            (BlockNesting::Map, Value::Object(entries)) => Value::Object(
                entries
                    .iter()
                    .map(|(k, entry)| {
                        let entry = match entry {
                            Value::Object(map) => {
                                Value::Object(parse_resource_state(map, &nested.block))
                            }
                            other => other.clone(),
                        };
                        (k.clone(), entry)
                    })
                    .collect(),
            ),
            (_, other) => other.clone(),
        };
        parsed.insert(key.clone(), shaped);
    }

    parsed
}
