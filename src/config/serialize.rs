use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use super::{BlockPath, ConfigBlock, ConfigError, NestingMode};
use crate::resource::Attributes;

/// Serializes a block and all its descendants into one attribute map.
///
/// Children are serialized before they are inserted into the parent map, so a
/// set child's key can be derived from its own serialized content. Set members
/// are emitted as a list ordered by that key, which makes the output
/// independent of the order the members were supplied in. Members with
/// identical content share a key and collapse into one entry.
pub fn serialize(block: &ConfigBlock) -> Result<Attributes, ConfigError> {
    let path = if block.is_root() {
        BlockPath::root()
    } else {
        BlockPath::root().child(block)
    };
    serialize_at(block, &path)
}

fn serialize_at(block: &ConfigBlock, path: &BlockPath) -> Result<Attributes, ConfigError> {
    let mut map = block.attributes.clone();
    let mut modes: HashMap<&str, NestingMode> = HashMap::new();
    let mut sets: BTreeMap<&str, BTreeMap<String, Attributes>> = BTreeMap::new();

    for child in &block.children {
        let name = child.name.as_deref().ok_or_else(|| ConfigError::UnnamedChild {
            path: path.to_string(),
        })?;
        let child_path = path.child(child);

        match modes.get(name) {
            Some(mode) if *mode != child.nesting_mode => {
                return Err(ConfigError::NestingConflict {
                    path: path.to_string(),
                    name: name.to_string(),
                });
            }
            None if map.contains_key(name) => {
                // Already taken by a plain attribute.
                return Err(ConfigError::NestingConflict {
                    path: path.to_string(),
                    name: name.to_string(),
                });
            }
            _ => {
                modes.insert(name, child.nesting_mode);
            }
        }

        let child_map = serialize_at(child, &child_path)?;

        match child.nesting_mode {
            NestingMode::Single => {
                if map.contains_key(name) {
                    return Err(ConfigError::DuplicateBlock {
                        path: child_path.to_string(),
                    });
                }
                map.insert(name.to_string(), Value::Object(child_map));
            }
            NestingMode::List => {
                if child.key.is_none() {
                    return Err(ConfigError::MissingKey {
                        path: child_path.to_string(),
                        mode: NestingMode::List,
                    });
                }
                let entry = map
                    .entry(name.to_string())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Value::Array(items) = entry {
                    items.push(Value::Object(child_map));
                }
            }
            NestingMode::Dict => {
                let key = child.key.as_deref().ok_or_else(|| ConfigError::MissingKey {
                    path: child_path.to_string(),
                    mode: NestingMode::Dict,
                })?;
                let entry = map
                    .entry(name.to_string())
                    .or_insert_with(|| Value::Object(Attributes::new()));
                if let Value::Object(entries) = entry {
                    if entries.contains_key(key) {
                        return Err(ConfigError::DuplicateKey {
                            path: child_path.to_string(),
                            key: key.to_string(),
                        });
                    }
                    entries.insert(key.to_string(), Value::Object(child_map));
                }
            }
            NestingMode::Set => {
                let key = content_key(&child_map);
                sets.entry(name).or_default().insert(key, child_map);
            }
        }
    }

    for (name, members) in sets {
        let items = members.into_values().map(Value::Object).collect();
        map.insert(name.to_string(), Value::Array(items));
    }

    Ok(map)
}

/// Content hash of a serialized block, hex encoded.
///
/// The map is encoded with object keys sorted at every level before hashing,
/// so the key only depends on content and never on insertion order.
pub fn content_key(map: &Attributes) -> String {
    let mut canonical = String::new();
    write_canonical_object(map, &mut canonical);
    blake3::hash(canonical.as_bytes()).to_hex().to_string()
}

fn write_canonical_object(map: &Attributes, out: &mut String) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        if let Some(value) = map.get(key) {
            write_canonical(value, out);
        }
    }
    out.push('}');
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_canonical_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
