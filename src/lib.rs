//! TFSync - Terraform-style resource reconciliation
//!
//! A library for driving provider resources towards a desired configuration,
//! one create/update/delete/import decision per cycle, with the last observed
//! state persisted between cycles.

pub mod config;
pub mod error;
pub mod providers;
pub mod reconcile;
pub mod resource;
pub mod schema;
pub mod state;

pub use config::{ConfigBlock, ConfigError, NestingMode};
pub use error::{ErrorKind, TfsyncError};
pub use providers::{ProviderError, ProviderSession, get_session};
pub use reconcile::{CycleReport, Reconciler};
pub use resource::{Attributes, DesiredConfig, ResourceManifest, ResourceRequest};
pub use state::{FileStateStore, MemoryStateStore, ResourceStateRecord, StateStore, StateValue};
