use std::fmt;

use thiserror::Error;

/// Which step of a cycle an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Configure,
    Schema,
    Read,
    Plan,
    Create,
    Update,
    Delete,
    Import,
    Store,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Config => "ConfigError",
            ErrorKind::Configure => "ConfigureError",
            ErrorKind::Schema => "SchemaError",
            ErrorKind::Read => "ReadError",
            ErrorKind::Plan => "PlanError",
            ErrorKind::Create => "CreateError",
            ErrorKind::Update => "UpdateError",
            ErrorKind::Delete => "DeleteError",
            ErrorKind::Import => "ImportError",
            ErrorKind::Store => "StoreError",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum TfsyncError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    Provider(#[from] crate::providers::ProviderError),

    #[error(transparent)]
    Store(#[from] crate::state::StoreError),

    #[error(transparent)]
    Reconcile(#[from] crate::reconcile::ReconcileError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid manifest: {0}")]
    Manifest(String),
}

impl TfsyncError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            TfsyncError::Config(_) => Some(ErrorKind::Config),
            TfsyncError::Provider(e) => Some(e.kind()),
            TfsyncError::Store(_) => Some(ErrorKind::Store),
            TfsyncError::Reconcile(e) => Some(e.kind()),
            TfsyncError::Io(_) | TfsyncError::Manifest(_) => None,
        }
    }
}
