//! In-process provider managing plain files on the local filesystem.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{PlannedChange, ProviderError, ProviderSession};
use crate::resource::Attributes;
use crate::schema::{ProviderSchema, Schema, SchemaAttribute, SchemaBlock};

pub const LOCAL_FILE: &str = "local_file";

#[derive(Debug, Default)]
pub struct LocalSession;

impl LocalSession {
    pub fn new() -> Self {
        Self
    }
}

fn check_type(type_name: &str) -> Result<(), ProviderError> {
    if type_name == LOCAL_FILE {
        Ok(())
    } else {
        Err(ProviderError::UnsupportedType(type_name.to_string()))
    }
}

fn filename(attributes: &Attributes) -> Option<&str> {
    attributes.get("filename").and_then(Value::as_str)
}

fn content(attributes: &Attributes) -> &str {
    attributes.get("content").and_then(Value::as_str).unwrap_or_default()
}

fn file_state(filename: &str, content: &str) -> Attributes {
    let id = blake3::hash(content.as_bytes()).to_hex().to_string();
    match json!({ "filename": filename, "content": content, "id": id }) {
        Value::Object(map) => map,
        _ => Attributes::new(),
    }
}

async fn read_file(path: &str) -> io::Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

async fn write_file(path: &str, content: &str) -> io::Result<()> {
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await
}

#[async_trait]
impl ProviderSession for LocalSession {
    fn name(&self) -> &str {
        "local"
    }

    async fn read_schema(&self) -> Result<ProviderSchema, ProviderError> {
        let attribute = |name: &str, required, optional, computed| SchemaAttribute {
            name: name.to_string(),
            required,
            optional,
            computed,
            deprecated: false,
        };
        let file = Schema {
            version: 0,
            block: SchemaBlock {
                attributes: vec![
                    attribute("filename", true, false, false),
                    attribute("content", false, true, false),
                    attribute("id", false, false, true),
                ],
                block_types: Vec::new(),
            },
        };
        Ok(ProviderSchema {
            provider: Schema::default(),
            resource_schemas: [(LOCAL_FILE.to_string(), file)].into_iter().collect(),
        })
    }

    async fn configure(&self, _config: &Attributes) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn read(
        &self,
        type_name: &str,
        prior: &Attributes,
    ) -> Result<Option<Attributes>, ProviderError> {
        check_type(type_name)?;
        let read_error = |message: String| ProviderError::Read {
            type_name: type_name.to_string(),
            message,
        };
        let path = filename(prior).ok_or_else(|| read_error("state has no filename".to_string()))?;

        let found = read_file(path).await.map_err(|e| read_error(e.to_string()))?;
        tracing::debug!(filename = path, exists = found.is_some(), "read local file");
        Ok(found.map(|content| file_state(path, &content)))
    }

    async fn plan(
        &self,
        type_name: &str,
        prior: Option<&Attributes>,
        proposed: &Attributes,
    ) -> Result<PlannedChange, ProviderError> {
        check_type(type_name)?;
        let path = filename(proposed).ok_or_else(|| ProviderError::Plan {
            type_name: type_name.to_string(),
            message: "filename is required".to_string(),
        })?;
        let requires_replace = prior.is_some_and(|prior| filename(prior) != Some(path));
        Ok(PlannedChange {
            planned_state: file_state(path, content(proposed)),
            requires_replace,
        })
    }

    async fn create(
        &self,
        type_name: &str,
        desired: &Attributes,
    ) -> Result<Attributes, ProviderError> {
        check_type(type_name)?;
        let create_error = |message: String| ProviderError::Create {
            type_name: type_name.to_string(),
            message,
            partial: None,
        };
        let path =
            filename(desired).ok_or_else(|| create_error("filename is required".to_string()))?;
        let body = content(desired);

        write_file(path, body).await.map_err(|e| create_error(e.to_string()))?;
        tracing::info!(filename = path, "created local file");
        Ok(file_state(path, body))
    }

    async fn update(
        &self,
        type_name: &str,
        prior: &Attributes,
        desired: &Attributes,
    ) -> Result<Attributes, ProviderError> {
        check_type(type_name)?;
        let update_error = |message: String| ProviderError::Update {
            type_name: type_name.to_string(),
            message,
        };
        let path =
            filename(desired).ok_or_else(|| update_error("filename is required".to_string()))?;
        let body = content(desired);

        write_file(path, body).await.map_err(|e| update_error(e.to_string()))?;
        if let Some(old) = filename(prior).filter(|old| *old != path) {
            match tokio::fs::remove_file(old).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(update_error(e.to_string())),
            }
        }
        tracing::info!(filename = path, "updated local file");
        Ok(file_state(path, body))
    }

    async fn delete(&self, type_name: &str, prior: &Attributes) -> Result<(), ProviderError> {
        check_type(type_name)?;
        let delete_error = |message: String| ProviderError::Delete {
            type_name: type_name.to_string(),
            message,
        };
        let path =
            filename(prior).ok_or_else(|| delete_error("state has no filename".to_string()))?;

        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                tracing::info!(filename = path, "deleted local file");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(delete_error(e.to_string())),
        }
    }

    /// The import id is the file name.
    async fn import(&self, type_name: &str, id: &str) -> Result<Attributes, ProviderError> {
        check_type(type_name)?;
        match read_file(id).await {
            Ok(Some(content)) => Ok(file_state(id, &content)),
            Ok(None) => Err(ProviderError::ImportNotFound {
                type_name: type_name.to_string(),
                id: id.to_string(),
            }),
            Err(e) => Err(ProviderError::Import {
                type_name: type_name.to_string(),
                id: id.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desired(path: &Path, body: &str) -> Attributes {
        file_state(path.to_str().unwrap(), body)
            .into_iter()
            .filter(|(k, _)| k != "id")
            .collect()
    }

    #[tokio::test]
    async fn test_create_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/a.txt");
        let session = LocalSession::new();

        let created = session.create(LOCAL_FILE, &desired(&path, "hello")).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
        assert_eq!(created["content"], json!("hello"));
        assert_eq!(created["id"], json!(blake3::hash(b"hello").to_hex().to_string()));

        let read = session.read(LOCAL_FILE, &created).await.unwrap();
        assert_eq!(read, Some(created.clone()));

        session.delete(LOCAL_FILE, &created).await.unwrap();
        assert!(!path.exists());
        assert_eq!(session.read(LOCAL_FILE, &created).await.unwrap(), None);
        session.delete(LOCAL_FILE, &created).await.unwrap();
    }

    #[tokio::test]
    async fn test_plan_replaces_on_rename_only() {
        let dir = tempfile::tempdir().unwrap();
        let session = LocalSession::new();
        let prior = file_state(dir.path().join("a").to_str().unwrap(), "x");

        let same_name = session
            .plan(LOCAL_FILE, Some(&prior), &desired(&dir.path().join("a"), "y"))
            .await
            .unwrap();
        assert!(!same_name.requires_replace);
        assert_eq!(same_name.planned_state["content"], json!("y"));

        let renamed = session
            .plan(LOCAL_FILE, Some(&prior), &desired(&dir.path().join("b"), "x"))
            .await
            .unwrap();
        assert!(renamed.requires_replace);
    }

    #[tokio::test]
    async fn test_update_moves_file() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = (dir.path().join("a"), dir.path().join("b"));
        let session = LocalSession::new();

        let prior = session.create(LOCAL_FILE, &desired(&a, "x")).await.unwrap();
        let updated = session.update(LOCAL_FILE, &prior, &desired(&b, "y")).await.unwrap();
        assert!(!a.exists());
        assert_eq!(std::fs::read_to_string(&b).unwrap(), "y");
        assert_eq!(updated["filename"], json!(b.to_str().unwrap()));
    }

    #[tokio::test]
    async fn test_import_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let err = LocalSession::new()
            .import(LOCAL_FILE, missing.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ImportNotFound { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_type() {
        let err = LocalSession::new().import("aws_s3_bucket", "x").await.unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedType(ref t) if t == "aws_s3_bucket"));
    }

    #[tokio::test]
    async fn test_schema_marks_id_read_only() {
        let schema = LocalSession::new().read_schema().await.unwrap();
        let file = schema.resource(LOCAL_FILE).unwrap();
        let id = file.block.attributes.iter().find(|a| a.name == "id").unwrap();
        assert!(id.is_read_only());
    }
}
