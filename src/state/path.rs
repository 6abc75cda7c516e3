use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;

use crate::resource::Attributes;

static NULL: Value = Value::Null;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::Key(key) => f.write_str(key),
            PathStep::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Location of a value inside an observed state, e.g. `rules.0.port`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributePath(Vec<PathStep>);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("expected an object at '{at}' to look up '{key}'")]
    NotAnObject { at: String, key: String },

    #[error("expected a list at '{at}' to look up index {index}")]
    NotAList { at: String, index: usize },

    #[error("index {index} out of range at '{at}' (length {len})")]
    OutOfRange { at: String, index: usize, len: usize },

    #[error("attribute path is empty")]
    Empty,

    #[error("state is unknown")]
    Unknown,
}

impl AttributePath {
    pub fn new(steps: Vec<PathStep>) -> Self {
        Self(steps)
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.0
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.0.push(PathStep::Key(key.into()));
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.0.push(PathStep::Index(index));
        self
    }

    /// Follows the path from `root`. A missing key resolves to null, a value of
    /// the wrong shape or an index past the end is an error.
    pub fn extract<'a>(&self, root: &'a Value) -> Result<&'a Value, PathError> {
        self.walk(root, 0)
    }

    /// Same as [`extract`](Self::extract), starting from an attribute map.
    pub fn extract_from<'a>(&self, attributes: &'a Attributes) -> Result<&'a Value, PathError> {
        match self.0.first() {
            None => Err(PathError::Empty),
            Some(PathStep::Key(key)) => self.walk(attributes.get(key).unwrap_or(&NULL), 1),
            Some(PathStep::Index(index)) => Err(PathError::NotAList {
                at: String::new(),
                index: *index,
            }),
        }
    }

    fn walk<'a>(&self, start: &'a Value, from: usize) -> Result<&'a Value, PathError> {
        let mut current = start;
        for (depth, step) in self.0.iter().enumerate().skip(from) {
            let at = || self.prefix(depth);
            current = match (step, current) {
                (PathStep::Key(key), Value::Object(map)) => map.get(key).unwrap_or(&NULL),
                (PathStep::Key(key), _) => {
                    return Err(PathError::NotAnObject { at: at(), key: key.clone() });
                }
                (PathStep::Index(index), Value::Array(items)) => {
                    items.get(*index).ok_or_else(|| PathError::OutOfRange {
                        at: at(),
                        index: *index,
                        len: items.len(),
                    })?
                }
                (PathStep::Index(index), _) => {
                    return Err(PathError::NotAList { at: at(), index: *index });
                }
            };
        }
        Ok(current)
    }

    fn prefix(&self, depth: usize) -> String {
        AttributePath(self.0[..depth].to_vec()).to_string()
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join("."))
    }
}

/// Dotted syntax. Segments made only of digits are list indices.
impl FromStr for AttributePath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let steps = s
            .split('.')
            .filter(|segment| !segment.is_empty())
            .map(|segment| match segment.parse::<usize>() {
                Ok(index) => PathStep::Index(index),
                Err(_) => PathStep::Key(segment.to_string()),
            })
            .collect();
        Ok(Self(steps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> Value {
        json!({
            "id": "abc",
            "rules": [{ "port": 80 }, { "port": 443, "tags": { "env": "prod" } }]
        })
    }

    #[test]
    fn test_parse_dotted_path() {
        let path: AttributePath = "rules.1.port".parse().unwrap();
        assert_eq!(
            path.steps(),
            &[
                PathStep::Key("rules".to_string()),
                PathStep::Index(1),
                PathStep::Key("port".to_string())
            ]
        );
        assert_eq!(path.to_string(), "rules.1.port");
    }

    #[test]
    fn test_extract_nested_value() {
        let path = AttributePath::default().key("rules").index(1).key("tags").key("env");
        assert_eq!(path.extract(&state()).unwrap(), &json!("prod"));
    }

    #[test]
    fn test_missing_key_is_null() {
        let path: AttributePath = "rules.0.tags".parse().unwrap();
        assert_eq!(path.extract(&state()).unwrap(), &Value::Null);
    }

    #[test]
    fn test_index_out_of_range() {
        let path: AttributePath = "rules.5".parse().unwrap();
        assert_eq!(
            path.extract(&state()).unwrap_err(),
            PathError::OutOfRange {
                at: "rules".to_string(),
                index: 5,
                len: 2
            }
        );
    }

    #[test]
    fn test_type_mismatch() {
        let path: AttributePath = "id.name".parse().unwrap();
        assert!(matches!(
            path.extract(&state()),
            Err(PathError::NotAnObject { ref at, .. }) if at == "id"
        ));

        let path: AttributePath = "id.0".parse().unwrap();
        assert!(matches!(path.extract(&state()), Err(PathError::NotAList { index: 0, .. })));
    }

    #[test]
    fn test_extract_from_attributes_reports_full_location() {
        let attributes = state().as_object().cloned().unwrap();
        let path: AttributePath = "rules.1.port".parse().unwrap();
        assert_eq!(path.extract_from(&attributes).unwrap(), &json!(443));

        let path: AttributePath = "rules.1.port.x".parse().unwrap();
        assert!(matches!(
            path.extract_from(&attributes),
            Err(PathError::NotAnObject { ref at, ref key }) if at == "rules.1.port" && key == "x"
        ));
    }
}
