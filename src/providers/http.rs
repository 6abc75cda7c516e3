//! Session with an out-of-process provider plugin speaking JSON over HTTP.

mod client;
mod error;
mod types;

pub use client::{ProviderClient, Reply};
pub use error::HttpSessionError;
pub use types::{Diagnostic, Severity};

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use super::{PlannedChange, ProviderError, ProviderSession};
use crate::resource::Attributes;
use crate::schema::{ProviderSchema, SchemaBlock, fill_partial_state};
use types::{ConfigureRequest, ImportRequest, PlanResult, ResourceRequest};

#[derive(Debug)]
pub struct HttpSession {
    client: ProviderClient,
    schema: OnceCell<ProviderSchema>,
}

impl HttpSession {
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, ProviderError> {
        let client = ProviderClient::new(endpoint, token, timeout)?;
        Ok(Self {
            client,
            schema: OnceCell::new(),
        })
    }

    async fn schema(&self) -> Result<&ProviderSchema, ProviderError> {
        self.schema
            .get_or_try_init(|| async {
                let reply: Reply<ProviderSchema> =
                    self.client.get("/schema").await.map_err(|e| ProviderError::Schema {
                        message: e.to_string(),
                    })?;
                let schema = reply.result.ok_or_else(|| ProviderError::Schema {
                    message: "plugin returned no schema".to_string(),
                })?;
                tracing::debug!(
                    resource_types = schema.resource_schemas.len(),
                    "fetched provider schema"
                );
                Ok::<_, ProviderError>(schema)
            })
            .await
    }

    async fn resource_block(&self, type_name: &str) -> Result<SchemaBlock, ProviderError> {
        let schema = self.schema().await?;
        schema
            .resource(type_name)
            .map(|s| s.block.clone())
            .ok_or_else(|| ProviderError::UnsupportedType(type_name.to_string()))
    }

    /// Completes `config` with nulls for everything the schema declares.
    async fn complete(
        &self,
        type_name: &str,
        config: &Attributes,
    ) -> Result<Attributes, ProviderError> {
        let block = self.resource_block(type_name).await?;
        fill_partial_state(config, &block).map_err(|e| ProviderError::Schema {
            message: e.to_string(),
        })
    }

    fn resource_path(type_name: &str, op: &str) -> String {
        format!("/resources/{}/{}", urlencoding::encode(type_name), op)
    }
}

#[async_trait]
impl ProviderSession for HttpSession {
    fn name(&self) -> &str {
        "http"
    }

    async fn read_schema(&self) -> Result<ProviderSchema, ProviderError> {
        self.schema().await.cloned()
    }

    async fn configure(&self, config: &Attributes) -> Result<(), ProviderError> {
        let block = self.schema().await?.provider.block.clone();
        let config =
            fill_partial_state(config, &block).map_err(|e| ProviderError::Configure {
                message: e.to_string(),
            })?;

        let _: Reply<serde_json::Value> = self
            .client
            .post("/configure", &ConfigureRequest { config: &config })
            .await
            .map_err(|e| ProviderError::Configure { message: e.to_string() })?;
        tracing::info!(endpoint = self.client.api_base(), "provider configured");
        Ok(())
    }

    async fn read(
        &self,
        type_name: &str,
        prior: &Attributes,
    ) -> Result<Option<Attributes>, ProviderError> {
        let body = ResourceRequest {
            prior: Some(prior),
            desired: None,
        };
        let reply: Reply<Attributes> = self
            .client
            .post(&Self::resource_path(type_name, "read"), &body)
            .await
            .map_err(|e| ProviderError::Read {
                type_name: type_name.to_string(),
                message: e.to_string(),
            })?;
        Ok(reply.result)
    }

    async fn plan(
        &self,
        type_name: &str,
        prior: Option<&Attributes>,
        proposed: &Attributes,
    ) -> Result<PlannedChange, ProviderError> {
        let proposed = self.complete(type_name, proposed).await?;
        let plan_error = |message: String| ProviderError::Plan {
            type_name: type_name.to_string(),
            message,
        };
        let body = ResourceRequest {
            prior,
            desired: Some(&proposed),
        };
        let reply: Reply<PlanResult> = self
            .client
            .post(&Self::resource_path(type_name, "plan"), &body)
            .await
            .map_err(|e| plan_error(e.to_string()))?;
        let plan = reply.result.ok_or_else(|| plan_error("plugin returned no plan".to_string()))?;
        Ok(PlannedChange {
            planned_state: plan.planned_state,
            requires_replace: plan.requires_replace,
        })
    }

    async fn create(
        &self,
        type_name: &str,
        desired: &Attributes,
    ) -> Result<Attributes, ProviderError> {
        let desired = self.complete(type_name, desired).await?;
        let body = ResourceRequest {
            prior: None,
            desired: Some(&desired),
        };
        let reply: Result<Reply<Attributes>, _> = self
            .client
            .post(&Self::resource_path(type_name, "create"), &body)
            .await;

        match reply {
            Ok(Reply { result: Some(state), .. }) => Ok(state),
            Ok(Reply { result: None, .. }) => Err(ProviderError::Create {
                type_name: type_name.to_string(),
                message: "plugin returned no state".to_string(),
                partial: None,
            }),
            Err(e) => {
                let (message, partial) = e.into_partial_state();
                Err(ProviderError::Create {
                    type_name: type_name.to_string(),
                    message,
                    partial,
                })
            }
        }
    }

    async fn update(
        &self,
        type_name: &str,
        prior: &Attributes,
        desired: &Attributes,
    ) -> Result<Attributes, ProviderError> {
        let desired = self.complete(type_name, desired).await?;
        let update_error = |message: String| ProviderError::Update {
            type_name: type_name.to_string(),
            message,
        };
        let body = ResourceRequest {
            prior: Some(prior),
            desired: Some(&desired),
        };
        let reply: Reply<Attributes> = self
            .client
            .post(&Self::resource_path(type_name, "update"), &body)
            .await
            .map_err(|e| update_error(e.to_string()))?;
        reply.result.ok_or_else(|| update_error("plugin returned no state".to_string()))
    }

    async fn delete(&self, type_name: &str, prior: &Attributes) -> Result<(), ProviderError> {
        let body = ResourceRequest {
            prior: Some(prior),
            desired: None,
        };
        let _: Reply<serde_json::Value> = self
            .client
            .post(&Self::resource_path(type_name, "delete"), &body)
            .await
            .map_err(|e| ProviderError::Delete {
                type_name: type_name.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn import(&self, type_name: &str, id: &str) -> Result<Attributes, ProviderError> {
        let import_error = |message: String| ProviderError::Import {
            type_name: type_name.to_string(),
            id: id.to_string(),
            message,
        };
        let not_found = || ProviderError::ImportNotFound {
            type_name: type_name.to_string(),
            id: id.to_string(),
        };

        match self
            .client
            .post::<_, Attributes>(&Self::resource_path(type_name, "import"), &ImportRequest { id })
            .await
        {
            Ok(Reply { result: Some(state), .. }) => Ok(state),
            Ok(Reply { result: None, .. }) | Err(HttpSessionError::NotFound { .. }) => {
                Err(not_found())
            }
            Err(e) => Err(import_error(e.to_string())),
        }
    }
}
