use serde_json::Value;

use super::{BlockPath, ConfigBlock, ConfigError, NestingMode, serialize};
use crate::state::StateValue;

/// Locates the sub-state of `block` inside its parent's observed state.
///
/// Unknown parent state always yields unknown, and so does a missing or
/// null entry: an attribute the provider never populated is not the same as
/// an empty object. List and set elements carry no key in raw state, so an
/// element is picked when it is the only one containing the block's own
/// serialized content.
pub fn extract_state(parent: &StateValue, block: &ConfigBlock) -> Result<StateValue, ConfigError> {
    let name = block.name.as_deref().ok_or_else(|| ConfigError::InvalidRoot {
        reason: "the root block state is owned by its resource".to_string(),
    })?;

    let parent = match parent {
        StateValue::Unknown => return Ok(StateValue::Unknown),
        StateValue::Known(parent) => parent,
    };

    let Some(value) = parent.get(name).filter(|v| !v.is_null()) else {
        return Ok(StateValue::Unknown);
    };

    let found = match block.nesting_mode {
        NestingMode::Single => value.as_object(),
        NestingMode::Dict => {
            let key = block.key.as_deref().ok_or_else(|| ConfigError::MissingKey {
                path: BlockPath::root().child(block).to_string(),
                mode: NestingMode::Dict,
            })?;
            value.get(key).and_then(Value::as_object)
        }
        NestingMode::List | NestingMode::Set => {
            let expected = Value::Object(serialize(block)?);
            let mut matches = value
                .as_array()
                .into_iter()
                .flatten()
                .filter(|item| value_contains(item, &expected));
            match (matches.next(), matches.next()) {
                (Some(item), None) => item.as_object(),
                (Some(_), Some(_)) => {
                    tracing::debug!(
                        block = name,
                        "several state elements match block, state is ambiguous"
                    );
                    None
                }
                _ => None,
            }
        }
    };

    Ok(found.cloned().map_or(StateValue::Unknown, StateValue::Known))
}

/// Observed state of one block and of its descendants.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockState {
    pub path: BlockPath,
    pub state: StateValue,
    pub children: Vec<BlockState>,
}

/// Extracts the states of a whole tree top-down, starting from the root state
/// supplied by the owning resource.
pub fn extract_tree(
    root: &ConfigBlock,
    root_state: &StateValue,
) -> Result<BlockState, ConfigError> {
    extract_children(root, BlockPath::root(), root_state.clone())
}

fn extract_children(
    block: &ConfigBlock,
    path: BlockPath,
    state: StateValue,
) -> Result<BlockState, ConfigError> {
    let children = block
        .children
        .iter()
        .map(|child| {
            let child_state = extract_state(&state, child)?;
            extract_children(child, path.child(child), child_state)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(BlockState {
        path,
        state,
        children,
    })
}

/// Whether `actual` holds everything `expected` declares.
///
/// Null in `expected` means "unspecified" and matches anything. Extra keys in
/// `actual` are ignored, which lets provider-computed attributes through.
/// Arrays must have the same length and every expected element must be held
/// by some actual element, since providers may reorder set members.
fn value_contains(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (_, Value::Null) => true,
        (Value::Object(actual), Value::Object(expected)) => expected
            .iter()
            .all(|(k, v)| value_contains(actual.get(k).unwrap_or(&Value::Null), v)),
        (Value::Array(actual), Value::Array(expected)) => {
            actual.len() == expected.len()
                && expected
                    .iter()
                    .all(|e| actual.iter().any(|a| value_contains(a, e)))
        }
        (actual, expected) => actual == expected,
    }
}
