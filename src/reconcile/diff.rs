use serde_json::Value;

use crate::resource::Attributes;
use crate::schema::{BlockNesting, NestedBlockType, SchemaBlock, parse_resource_state};

/// Top-level attributes whose desired value differs from `observed`.
///
/// Only what the desired config sets to a non-null value is compared, and
/// provider-only attributes are never compared. Both sides are reduced with
/// [`parse_resource_state`] first, then compared for equality; members of
/// set-nested blocks are compared regardless of order. Attributes unknown to
/// the schema are compared against the raw observed state.
pub fn changed_attributes(
    desired: &Attributes,
    observed: &Attributes,
    block: &SchemaBlock,
) -> Vec<String> {
    let wanted = parse_resource_state(desired, block);
    let current = parse_resource_state(observed, block);

    desired
        .iter()
        .filter(|(key, value)| !value.is_null() && !is_read_only(block, key))
        .filter(|(key, value)| {
            let key = key.as_str();
            let same = if declares(block, key) {
                match (wanted.get(key), current.get(key)) {
                    (Some(expected), Some(actual)) => same_member(block, key, expected, actual),
                    (None, None) => true,
                    _ => false,
                }
            } else {
                observed.get(key) == Some(*value)
            };
            !same
        })
        .map(|(key, _)| key.clone())
        .collect()
}

fn is_read_only(block: &SchemaBlock, key: &str) -> bool {
    block
        .attributes
        .iter()
        .any(|attribute| attribute.name == key && attribute.is_read_only())
}

fn declares(block: &SchemaBlock, key: &str) -> bool {
    block.attributes.iter().any(|attribute| attribute.name == key) || nested(block, key).is_some()
}

fn nested<'a>(block: &'a SchemaBlock, key: &str) -> Option<&'a NestedBlockType> {
    block.block_types.iter().find(|nested| nested.type_name == key)
}

fn same_member(block: &SchemaBlock, key: &str, expected: &Value, actual: &Value) -> bool {
    match nested(block, key) {
        Some(nested) => same_nested(nested, expected, actual),
        None => expected == actual,
    }
}

fn same_nested(nested: &NestedBlockType, expected: &Value, actual: &Value) -> bool {
    let element = |e: &Value, a: &Value| same_element(&nested.block, e, a);

    match (nested.nesting, expected, actual) {
        (BlockNesting::Single | BlockNesting::Group, Value::Object(e), Value::Object(a)) => {
            same_block(&nested.block, e, a)
        }
        (BlockNesting::List, Value::Array(e), Value::Array(a)) => {
            e.len() == a.len() && e.iter().zip(a).all(|(e, a)| element(e, a))
        }
        (BlockNesting::Set, Value::Array(e), Value::Array(a)) => {
            if e.len() != a.len() {
                return false;
            }
            let mut unmatched: Vec<&Value> = a.iter().collect();
            e.iter().all(|e| match unmatched.iter().position(|a| element(e, *a)) {
                Some(i) => {
                    unmatched.swap_remove(i);
                    true
                }
                None => false,
            })
        }
        (BlockNesting::Map, Value::Object(e), Value::Object(a)) => {
            e.len() == a.len()
                && e
                    .iter()
                    .all(|(k, e)| a.get(k).is_some_and(|a| element(e, a)))
        }
        _ => expected == actual,
    }
}

fn same_element(block: &SchemaBlock, expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(e), Value::Object(a)) => same_block(block, e, a),
        _ => expected == actual,
    }
}

fn same_block(block: &SchemaBlock, expected: &Attributes, actual: &Attributes) -> bool {
    expected.len() == actual.len()
        && expected.iter().all(|(key, e)| {
            actual
                .get(key)
                .is_some_and(|a| same_member(block, key, e, a))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    fn block() -> SchemaBlock {
        serde_json::from_value(json!({
            "attributes": [
                { "name": "filename", "required": true },
                { "name": "content", "optional": true },
                { "name": "tags", "optional": true },
                { "name": "ports", "optional": true },
                { "name": "id", "computed": true }
            ],
            "block_types": [
                {
                    "type_name": "rule",
                    "nesting": "set",
                    "block": {
                        "attributes": [
                            { "name": "port", "required": true },
                            { "name": "rule_id", "computed": true }
                        ]
                    }
                },
                {
                    "type_name": "disk",
                    "nesting": "list",
                    "block": { "attributes": [{ "name": "size", "required": true }] }
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_no_change_when_desired_matches() {
        let desired = attrs(json!({ "filename": "a", "content": null }));
        let observed = attrs(json!({ "filename": "a", "content": "x", "id": "h" }));
        assert!(changed_attributes(&desired, &observed, &block()).is_empty());
    }

    #[test]
    fn test_changed_value_is_reported() {
        let desired = attrs(json!({ "filename": "a", "content": "y" }));
        let observed = attrs(json!({ "filename": "a", "content": "x", "id": "h" }));
        assert_eq!(changed_attributes(&desired, &observed, &block()), vec!["content"]);
    }

    #[test]
    fn test_read_only_attributes_are_ignored() {
        let desired = attrs(json!({ "filename": "a", "id": "forced" }));
        let observed = attrs(json!({ "filename": "a", "id": "h" }));
        assert!(changed_attributes(&desired, &observed, &block()).is_empty());
    }

    #[test]
    fn test_removed_map_entry_is_a_change() {
        let desired = attrs(json!({ "filename": "a", "tags": { "env": "dev" } }));
        let observed = attrs(json!({ "filename": "a", "tags": { "env": "dev", "owner": "ops" } }));
        assert_eq!(changed_attributes(&desired, &observed, &block()), vec!["tags"]);
    }

    #[test]
    fn test_list_attribute_compares_every_element() {
        let desired = attrs(json!({ "filename": "a", "ports": [80, 80] }));
        let observed = attrs(json!({ "filename": "a", "ports": [80, 443] }));
        assert_eq!(changed_attributes(&desired, &observed, &block()), vec!["ports"]);

        let observed = attrs(json!({ "filename": "a", "ports": [80, 80] }));
        assert!(changed_attributes(&desired, &observed, &block()).is_empty());
    }

    #[test]
    fn test_set_blocks_compare_as_multisets() {
        let desired = attrs(json!({ "rule": [{ "port": 80 }, { "port": 443 }] }));
        let observed = attrs(json!({
            "rule": [{ "port": 443, "rule_id": "r2" }, { "port": 80, "rule_id": "r1" }]
        }));
        assert!(changed_attributes(&desired, &observed, &block()).is_empty());

        let desired = attrs(json!({ "rule": [{ "port": 80 }, { "port": 80 }] }));
        assert_eq!(changed_attributes(&desired, &observed, &block()), vec!["rule"]);
    }

    #[test]
    fn test_list_blocks_keep_order() {
        let desired = attrs(json!({ "disk": [{ "size": 10 }, { "size": 20 }] }));
        let observed = attrs(json!({ "disk": [{ "size": 20 }, { "size": 10 }] }));
        assert_eq!(changed_attributes(&desired, &observed, &block()), vec!["disk"]);
    }

    #[test]
    fn test_attributes_outside_schema_use_raw_state() {
        let desired = attrs(json!({ "labels": { "env": "dev" } }));
        let observed = attrs(json!({ "labels": { "env": "dev" } }));
        assert!(changed_attributes(&desired, &observed, &SchemaBlock::default()).is_empty());

        let observed = attrs(json!({ "labels": { "env": "dev", "owner": "ops" } }));
        assert_eq!(
            changed_attributes(&desired, &observed, &SchemaBlock::default()),
            vec!["labels"]
        );
    }
}
