//! Nested configuration blocks.
//!
//! A [`ConfigBlock`] tree is the authoring-side view of a resource (or provider)
//! configuration. It is serialized into the attribute map a provider expects,
//! and the observed state returned by the provider can be split back into the
//! sub-states matching each block.

mod extract;
mod serialize;
mod validate;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resource::Attributes;

pub use extract::{BlockState, extract_state, extract_tree};
pub use serialize::{content_key, serialize};
pub use validate::{DeprecationWarning, Prepared, assign_set_keys, check_deprecations, prepare};

/// How a child block's serialized map is inserted into its parent's map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NestingMode {
    #[default]
    Single,
    List,
    Set,
    Dict,
}

impl fmt::Display for NestingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NestingMode::Single => "single",
            NestingMode::List => "list",
            NestingMode::Set => "set",
            NestingMode::Dict => "dict",
        };
        f.write_str(name)
    }
}

/// One configuration section. Children are owned by their parent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfigBlock {
    /// `None` only for the root of a tree.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub nesting_mode: NestingMode,
    /// Required for list and dict nesting, derived from content for set nesting.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub children: Vec<ConfigBlock>,
}

impl ConfigBlock {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new(name: impl Into<String>, nesting_mode: NestingMode) -> Self {
        Self {
            name: Some(name.into()),
            nesting_mode,
            ..Self::default()
        }
    }

    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes.extend(attributes);
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_child(mut self, child: ConfigBlock) -> Self {
        self.children.push(child);
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    pub fn is_root(&self) -> bool {
        self.name.is_none()
    }
}

/// Qualified location of a block: the chain of ancestor names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BlockPath(Vec<String>);

impl BlockPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Path of a child block. List and dict keys are part of the segment.
    pub fn child(&self, block: &ConfigBlock) -> Self {
        let name = block.name.as_deref().unwrap_or_default();
        let segment = match (block.nesting_mode, block.key.as_deref()) {
            (NestingMode::List | NestingMode::Dict, Some(key)) => format!("{name}[{key}]"),
            _ => name.to_string(),
        };
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for BlockPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Authoring errors in a block tree. Fatal for the current build pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{mode} block '{path}' requires an explicit key")]
    MissingKey { path: String, mode: NestingMode },

    #[error("block '{path}' is declared more than once")]
    DuplicateBlock { path: String },

    #[error("dict block '{path}' uses key '{key}' more than once")]
    DuplicateKey { path: String, key: String },

    #[error("'{name}' under '{path}' is used with conflicting nesting")]
    NestingConflict { path: String, name: String },

    #[error("child block under '{path}' has no name")]
    UnnamedChild { path: String },

    #[error("invalid root block: {reason}")]
    InvalidRoot { reason: String },
}
