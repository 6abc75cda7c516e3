use serde::{Deserialize, Serialize};

use crate::config::{self, ConfigBlock, ConfigError, DeprecationWarning};

/// Attribute map exchanged with providers and persisted in state records.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Desired configuration of a resource, either as a block tree or as a ready-made map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredConfig {
    Block(ConfigBlock),
    Manual(Attributes),
}

impl DesiredConfig {
    /// Validates and serializes the config. Manual maps are taken as-is.
    pub fn render(&self) -> Result<(Attributes, Vec<DeprecationWarning>), ConfigError> {
        match self {
            DesiredConfig::Block(root) => {
                let mut root = root.clone();
                let prepared = config::prepare(&mut root)?;
                Ok((prepared.config, prepared.warnings))
            }
            DesiredConfig::Manual(attributes) => Ok((attributes.clone(), Vec::new())),
        }
    }
}

impl Default for DesiredConfig {
    fn default() -> Self {
        DesiredConfig::Manual(Attributes::new())
    }
}

/// One managed resource, as handed to the reconciler for a single cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ResourceRequest {
    /// Stable key of the state record.
    pub resource_id: String,
    pub type_name: String,
    #[serde(default)]
    pub config: DesiredConfig,
    /// Identifier of a pre-existing resource to adopt when no state is known.
    #[serde(default)]
    pub terraform_id: Option<String>,
    #[serde(default)]
    pub purged: bool,
}

impl ResourceRequest {
    pub fn new(
        resource_id: impl Into<String>,
        type_name: impl Into<String>,
        config: DesiredConfig,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            type_name: type_name.into(),
            config,
            terraform_id: None,
            purged: false,
        }
    }

    pub fn with_terraform_id(mut self, id: impl Into<String>) -> Self {
        self.terraform_id = Some(id.into());
        self
    }

    pub fn purged(mut self, purged: bool) -> Self {
        self.purged = purged;
        self
    }
}

/// Which provider session to open and how to configure it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProviderSpec {
    pub name: String,
    #[serde(default)]
    pub config: DesiredConfig,
}

/// Input file of `tfsync apply`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ResourceManifest {
    pub provider: ProviderSpec,
    pub resource: ResourceRequest,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NestingMode;

    #[test]
    fn test_manifest_deserialization_snake_case() {
        let json = r#"{
            "provider": { "name": "local" },
            "resource": {
                "resource_id": "local-file-a",
                "type_name": "local_file",
                "config": {
                    "block": {
                        "attributes": { "filename": "/tmp/a.txt" },
                        "children": [
                            {
                                "name": "tags",
                                "nesting_mode": "dict",
                                "key": "env",
                                "attributes": { "value": "dev" }
                            }
                        ]
                    }
                },
                "terraform_id": "/tmp/a.txt"
            }
        }"#;
        let manifest: ResourceManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.provider.name, "local");
        assert_eq!(manifest.provider.config, DesiredConfig::default());
        assert_eq!(manifest.resource.resource_id, "local-file-a");
        assert_eq!(manifest.resource.terraform_id.as_deref(), Some("/tmp/a.txt"));
        assert!(!manifest.resource.purged);

        match &manifest.resource.config {
            DesiredConfig::Block(root) => {
                assert!(root.name.is_none());
                assert_eq!(root.children[0].nesting_mode, NestingMode::Dict);
            }
            other => panic!("expected block config, got {:?}", other),
        }
    }

    #[test]
    fn test_render_block_config() {
        let root = ConfigBlock::root()
            .with_attribute("filename", "/tmp/a.txt")
            .with_child(
                ConfigBlock::new("tags", NestingMode::Dict)
                    .with_key("env")
                    .with_attribute("value", "dev"),
            );
        let (config, warnings) = DesiredConfig::Block(root).render().unwrap();
        assert!(warnings.is_empty());
        assert_eq!(
            serde_json::Value::Object(config),
            serde_json::json!({
                "filename": "/tmp/a.txt",
                "tags": { "env": { "value": "dev" } }
            })
        );
    }

    #[test]
    fn test_render_manual_config_is_verbatim() {
        let mut attrs = Attributes::new();
        attrs.insert("content".to_string(), serde_json::json!(null));
        let (config, warnings) = DesiredConfig::Manual(attrs.clone()).render().unwrap();
        assert_eq!(config, attrs);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_request_builders() {
        let request = ResourceRequest::new("id-1", "local_file", DesiredConfig::default())
            .with_terraform_id("abc")
            .purged(true);
        assert_eq!(request.terraform_id.as_deref(), Some("abc"));
        assert!(request.purged);
    }
}
