use std::fmt;

use super::{BlockPath, ConfigBlock, ConfigError, NestingMode, content_key, serialize};
use crate::resource::Attributes;

/// Non-fatal notice for a block flagged as deprecated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeprecationWarning {
    pub path: BlockPath,
}

impl fmt::Display for DeprecationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "the usage of config '{}' is deprecated", self.path)
    }
}

/// A validated tree, serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct Prepared {
    pub config: Attributes,
    pub warnings: Vec<DeprecationWarning>,
}

/// Walks the whole tree and reports every deprecated block. Never fails.
pub fn check_deprecations(root: &ConfigBlock) -> Vec<DeprecationWarning> {
    let mut warnings = Vec::new();
    collect_deprecations(root, &BlockPath::root(), &mut warnings);
    for warning in &warnings {
        tracing::warn!(path = %warning.path, "{warning}");
    }
    warnings
}

fn collect_deprecations(block: &ConfigBlock, path: &BlockPath, out: &mut Vec<DeprecationWarning>) {
    if block.deprecated {
        out.push(DeprecationWarning { path: path.clone() });
    }
    for child in &block.children {
        collect_deprecations(child, &path.child(child), out);
    }
}

/// Derives the key of every set-nested block from its serialized content.
///
/// Descendants are keyed first so a block's key covers its whole subtree.
pub fn assign_set_keys(block: &mut ConfigBlock) -> Result<(), ConfigError> {
    for child in &mut block.children {
        assign_set_keys(child)?;
        if child.nesting_mode == NestingMode::Set {
            child.key = Some(content_key(&serialize(child)?));
        }
    }
    Ok(())
}

/// Full pass run before a tree is handed to a provider: root checks,
/// deprecations, set keys, then serialization.
pub fn prepare(root: &mut ConfigBlock) -> Result<Prepared, ConfigError> {
    if let Some(name) = &root.name {
        return Err(ConfigError::InvalidRoot {
            reason: format!("root block must not be named, got '{name}'"),
        });
    }
    if root.nesting_mode != NestingMode::Single {
        return Err(ConfigError::InvalidRoot {
            reason: format!("root block must use single nesting, got {}", root.nesting_mode),
        });
    }

    let warnings = check_deprecations(root);
    assign_set_keys(root)?;
    let config = serialize(root)?;
    Ok(Prepared { config, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deprecation_paths() {
        let root = ConfigBlock::root()
            .with_child(
                ConfigBlock::new("favorite_dishes", NestingMode::List)
                    .with_key("1")
                    .with_child(ConfigBlock::new("content", NestingMode::Single).deprecated()),
            )
            .with_child(ConfigBlock::new("legacy", NestingMode::Single).deprecated());

        let warnings = check_deprecations(&root);
        let paths: Vec<String> = warnings.iter().map(|w| w.path.to_string()).collect();
        assert_eq!(paths, vec!["favorite_dishes[1].content", "legacy"]);
        assert_eq!(
            warnings[1].to_string(),
            "the usage of config 'legacy' is deprecated"
        );
    }

    #[test]
    fn test_deprecated_root_is_reported_but_not_fatal() {
        let mut root = ConfigBlock::root().with_attribute("a", 1).deprecated();
        let prepared = prepare(&mut root).unwrap();
        assert_eq!(prepared.warnings.len(), 1);
        assert_eq!(
            prepared.warnings[0].to_string(),
            "the usage of config '' is deprecated"
        );
        assert_eq!(prepared.config["a"], json!(1));
    }

    #[test]
    fn test_assign_set_keys_is_content_hash() {
        let mut root = ConfigBlock::root()
            .with_child(
                ConfigBlock::new("children", NestingMode::Set).with_attribute("name", "Bob"),
            )
            .with_child(
                ConfigBlock::new("children", NestingMode::Set).with_attribute("name", "Bob"),
            )
            .with_child(ConfigBlock::new("pets", NestingMode::Dict).with_key("Brutus"));
        assign_set_keys(&mut root).unwrap();

        let bob = json!({ "name": "Bob" });
        let expected = content_key(bob.as_object().unwrap());
        assert_eq!(root.children[0].key.as_deref(), Some(expected.as_str()));
        assert_eq!(root.children[0].key, root.children[1].key);
        assert_eq!(root.children[2].key.as_deref(), Some("Brutus"));
    }

    #[test]
    fn test_nested_set_key_covers_subtree() {
        let member = |salt: &str| {
            ConfigBlock::new("dishes", NestingMode::Set)
                .with_attribute("name", "Pizza")
                .with_child(
                    ConfigBlock::new("content", NestingMode::Single).with_attribute("salt", salt),
                )
        };
        let mut root = ConfigBlock::root().with_child(member("yes")).with_child(member("no"));
        assign_set_keys(&mut root).unwrap();
        assert_ne!(root.children[0].key, root.children[1].key);
    }

    #[test]
    fn test_prepare_rejects_named_root() {
        let mut root = ConfigBlock::new("oops", NestingMode::Single);
        assert!(matches!(prepare(&mut root), Err(ConfigError::InvalidRoot { .. })));
    }

    #[test]
    fn test_prepare_rejects_non_single_root() {
        let mut root = ConfigBlock {
            nesting_mode: NestingMode::Set,
            ..ConfigBlock::root()
        };
        assert!(matches!(prepare(&mut root), Err(ConfigError::InvalidRoot { .. })));
    }

    #[test]
    fn test_prepare_fails_on_missing_list_key() {
        let mut root = ConfigBlock::root()
            .with_child(ConfigBlock::new("rules", NestingMode::List).deprecated());
        let err = prepare(&mut root).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { mode: NestingMode::List, .. }));
    }
}
