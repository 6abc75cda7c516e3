pub mod http;
pub mod local;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::ErrorKind;
use crate::resource::Attributes;
use crate::schema::ProviderSchema;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("unsupported resource type: {0}")]
    UnsupportedType(String),

    #[error("provider configuration failed: {message}")]
    Configure { message: String },

    #[error("schema retrieval failed: {message}")]
    Schema { message: String },

    #[error("read of {type_name} failed: {message}")]
    Read { type_name: String, message: String },

    #[error("plan of {type_name} failed: {message}")]
    Plan { type_name: String, message: String },

    /// `partial` holds whatever the provider reports as actually created.
    #[error("create of {type_name} failed: {message}")]
    Create {
        type_name: String,
        message: String,
        partial: Option<Attributes>,
    },

    #[error("update of {type_name} failed: {message}")]
    Update { type_name: String, message: String },

    #[error("delete of {type_name} failed: {message}")]
    Delete { type_name: String, message: String },

    #[error("import of {type_name} '{id}' failed: {message}")]
    Import {
        type_name: String,
        id: String,
        message: String,
    },

    /// The import id does not designate any existing resource.
    #[error("no {type_name} with id '{id}' to import")]
    ImportNotFound { type_name: String, id: String },
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::UnknownProvider(_) | ProviderError::Configure { .. } => {
                ErrorKind::Configure
            }
            ProviderError::UnsupportedType(_) | ProviderError::Schema { .. } => ErrorKind::Schema,
            ProviderError::Read { .. } => ErrorKind::Read,
            ProviderError::Plan { .. } => ErrorKind::Plan,
            ProviderError::Create { .. } => ErrorKind::Create,
            ProviderError::Update { .. } => ErrorKind::Update,
            ProviderError::Delete { .. } => ErrorKind::Delete,
            ProviderError::Import { .. } | ProviderError::ImportNotFound { .. } => {
                ErrorKind::Import
            }
        }
    }

    pub fn partial_state(&self) -> Option<&Attributes> {
        match self {
            ProviderError::Create { partial, .. } => partial.as_ref(),
            _ => None,
        }
    }
}

/// Outcome of planning a change against the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedChange {
    pub planned_state: Attributes,
    /// The change cannot be applied in place; the resource must be recreated.
    pub requires_replace: bool,
}

/// One conversation with one provider instance.
///
/// Calls are issued sequentially by the caller. Every call may fail on its
/// own, and nothing is retried here.
#[async_trait]
pub trait ProviderSession: Send + Sync {
    fn name(&self) -> &str;

    async fn read_schema(&self) -> Result<ProviderSchema, ProviderError>;

    async fn configure(&self, config: &Attributes) -> Result<(), ProviderError>;

    /// `Ok(None)` when the resource no longer exists.
    async fn read(
        &self,
        type_name: &str,
        prior: &Attributes,
    ) -> Result<Option<Attributes>, ProviderError>;

    /// Providers without planning support apply the proposed state as-is.
    async fn plan(
        &self,
        _type_name: &str,
        _prior: Option<&Attributes>,
        proposed: &Attributes,
    ) -> Result<PlannedChange, ProviderError> {
        Ok(PlannedChange {
            planned_state: proposed.clone(),
            requires_replace: false,
        })
    }

    async fn create(
        &self,
        type_name: &str,
        desired: &Attributes,
    ) -> Result<Attributes, ProviderError>;

    async fn update(
        &self,
        type_name: &str,
        prior: &Attributes,
        desired: &Attributes,
    ) -> Result<Attributes, ProviderError>;

    async fn delete(&self, type_name: &str, prior: &Attributes) -> Result<(), ProviderError>;

    async fn import(&self, type_name: &str, id: &str) -> Result<Attributes, ProviderError>;
}

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub timeout: Option<Duration>,
}

pub fn get_session(
    name: &str,
    options: &SessionOptions,
) -> Result<Box<dyn ProviderSession>, ProviderError> {
    match name {
        "local" => Ok(Box::new(local::LocalSession::new())),
        "http" => {
            let endpoint = options.endpoint.clone().ok_or_else(|| ProviderError::Configure {
                message:
                    "No endpoint provided. Set TFSYNC_PROVIDER_ENDPOINT or use --endpoint flag"
                        .to_string(),
            })?;
            let session = http::HttpSession::new(endpoint, options.token.clone(), options.timeout)?;
            Ok(Box::new(session))
        }
        other => Err(ProviderError::UnknownProvider(other.to_string())),
    }
}
