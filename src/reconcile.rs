//! The reconciliation engine.
//!
//! One cycle per resource: load the prior record, observe the live resource,
//! decide on exactly one action, execute it through the provider session and
//! fold the result back into the state store. A failed provider call never
//! leaves the stored record worse than it was before the cycle.

mod decision;
mod diff;

pub use decision::{Action, Decision, Facts, StateClass, decide};
pub use diff::changed_attributes;

use thiserror::Error;

use crate::config::{ConfigError, DeprecationWarning, content_key};
use crate::error::ErrorKind;
use crate::providers::{ProviderError, ProviderSession};
use crate::resource::{Attributes, DesiredConfig, ResourceRequest};
use crate::schema::Schema;
use crate::state::{ReferenceError, ResourceStateRecord, StateStore, StoreError, resolve_references};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("provider has no schema for resource type '{0}'")]
    UnknownResourceType(String),
}

impl ReconcileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::Config(_) | ReconcileError::Reference(_) => ErrorKind::Config,
            ReconcileError::Provider(e) => e.kind(),
            ReconcileError::Store(_) => ErrorKind::Store,
            ReconcileError::UnknownResourceType(_) => ErrorKind::Schema,
        }
    }
}

/// What the live read (or import) found.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveState {
    Found { attributes: Attributes, imported: bool },
    Absent { import_attempted: bool },
}

impl LiveState {
    pub fn exists(&self) -> bool {
        matches!(self, LiveState::Found { .. })
    }

    pub fn attributes(&self) -> Option<&Attributes> {
        match self {
            LiveState::Found { attributes, .. } => Some(attributes),
            LiveState::Absent { .. } => None,
        }
    }

    pub fn imported(&self) -> bool {
        matches!(self, LiveState::Found { imported: true, .. })
    }
}

/// Everything one cycle decides on.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationInput {
    pub resource_id: String,
    pub type_name: String,
    pub desired: Attributes,
    pub external_id: Option<String>,
    pub purge: bool,
    pub prior: Option<ResourceStateRecord>,
    pub live: LiveState,
}

impl ReconciliationInput {
    /// State is known only through a stored record, never through the live read.
    pub fn facts(&self) -> Facts {
        Facts {
            exists: self.live.exists(),
            state_known: self.prior.as_ref().is_some_and(ResourceStateRecord::is_known),
            id_provided: self.external_id.is_some(),
            purged: self.purge,
        }
    }

    fn known_prior(&self) -> Option<&ResourceStateRecord> {
        self.prior.as_ref().filter(|record| record.is_known())
    }
}

/// Mutating call the cycle issued successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Performed {
    NoOp,
    Created,
    Updated,
    /// Deleted, then created again.
    Replaced,
    Deleted,
}

/// What to do with the stored record once the cycle is over.
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    Unchanged,
    Store(ResourceStateRecord),
    Remove,
}

#[derive(Debug)]
pub struct CycleReport {
    pub resource_id: String,
    /// When observing the resource failed, the action the cycle meant to take
    /// on the resource the prior record or the import id points at.
    pub decision: Decision,
    pub performed: Performed,
    pub imported: bool,
    pub state: StateChange,
    pub warnings: Vec<DeprecationWarning>,
    pub error: Option<ReconcileError>,
}

impl CycleReport {
    fn new(resource_id: &str, decision: Decision) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            decision,
            performed: Performed::NoOp,
            imported: false,
            state: StateChange::Unchanged,
            warnings: Vec::new(),
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn action(&self) -> Action {
        self.decision.action
    }

    fn fail(mut self, error: impl Into<ReconcileError>) -> Self {
        self.error = Some(error.into());
        self
    }
}

pub struct Reconciler<'a> {
    session: &'a dyn ProviderSession,
    store: &'a dyn StateStore,
}

impl<'a> Reconciler<'a> {
    pub fn new(session: &'a dyn ProviderSession, store: &'a dyn StateStore) -> Self {
        Self { session, store }
    }

    /// Renders a provider config and configures the session with it.
    pub async fn configure(
        &self,
        config: &DesiredConfig,
    ) -> Result<Vec<DeprecationWarning>, ReconcileError> {
        let (rendered, warnings) = config.render()?;
        let rendered = resolve_references(&rendered, self.store)?;
        self.session.configure(&rendered).await?;
        Ok(warnings)
    }

    /// Runs one full cycle for `request`.
    ///
    /// `Err` is reserved for failures before the provider is touched: config
    /// authoring errors, unreadable state, missing schema. Provider failures
    /// are carried by the report, after the state has been persisted.
    pub async fn reconcile(
        &self,
        request: &ResourceRequest,
    ) -> Result<CycleReport, ReconcileError> {
        let resource_id = request.resource_id.as_str();
        let (desired, warnings) = request.config.render()?;
        let desired = if request.purged {
            desired
        } else {
            resolve_references(&desired, self.store)?
        };

        let prior = self.store.load(resource_id)?;
        let provider_schema = self.session.read_schema().await?;
        let schema = provider_schema
            .resource(&request.type_name)
            .ok_or_else(|| ReconcileError::UnknownResourceType(request.type_name.clone()))?;

        let live = match self.observe(request, prior.as_ref()).await {
            Ok(live) => live,
            Err(e) => {
                tracing::error!(resource_id, error = %e, "could not observe resource");
                let intended = decide(Facts {
                    exists: true,
                    state_known: prior.as_ref().is_some_and(ResourceStateRecord::is_known),
                    id_provided: request.terraform_id.is_some(),
                    purged: request.purged,
                });
                let mut report = CycleReport::new(resource_id, intended).fail(e);
                report.warnings = warnings;
                return Ok(report);
            }
        };

        let input = ReconciliationInput {
            resource_id: resource_id.to_string(),
            type_name: request.type_name.clone(),
            desired,
            external_id: request.terraform_id.clone(),
            purge: request.purged,
            prior,
            live,
        };

        let mut report = self.execute(schema, &input).await;
        report.warnings = warnings;
        Ok(self.persist(report))
    }

    async fn observe(
        &self,
        request: &ResourceRequest,
        prior: Option<&ResourceStateRecord>,
    ) -> Result<LiveState, ProviderError> {
        let type_name = request.type_name.as_str();

        if let Some(observed) = prior.and_then(|record| record.observed.as_known()) {
            let live = match self.session.read(type_name, observed).await? {
                Some(attributes) => LiveState::Found {
                    attributes,
                    imported: false,
                },
                None => {
                    tracing::warn!(
                        resource_id = %request.resource_id,
                        "resource is gone, treating it as purged"
                    );
                    LiveState::Absent {
                        import_attempted: false,
                    }
                }
            };
            return Ok(live);
        }

        let Some(id) = request.terraform_id.as_deref() else {
            return Ok(LiveState::Absent {
                import_attempted: false,
            });
        };

        match self.session.import(type_name, id).await {
            Ok(imported) => {
                tracing::info!(resource_id = %request.resource_id, id, "imported resource");
                Ok(match self.session.read(type_name, &imported).await? {
                    Some(attributes) => LiveState::Found {
                        attributes,
                        imported: true,
                    },
                    None => LiveState::Absent {
                        import_attempted: true,
                    },
                })
            }
            Err(ProviderError::ImportNotFound { .. }) => {
                tracing::info!(resource_id = %request.resource_id, id, "nothing to import");
                Ok(LiveState::Absent {
                    import_attempted: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Decides and executes one action for already-observed facts.
    ///
    /// Does not touch the store: the returned report says what to persist.
    pub async fn execute(&self, schema: &Schema, input: &ReconciliationInput) -> CycleReport {
        let facts = input.facts();
        let decision = decide(facts);
        let resource_id = input.resource_id.as_str();

        if let (Some(external_id), Some(tracked_id)) = (
            input.external_id.as_deref(),
            input.known_prior().and_then(ResourceStateRecord::id),
        ) {
            if tracked_id != external_id {
                tracing::warn!(
                    resource_id,
                    external_id,
                    tracked_id,
                    "state is already known, ignoring the provided import id"
                );
            }
        }

        tracing::info!(resource_id, action = %decision.action, ?facts, "reconciling");

        let mut report = CycleReport::new(resource_id, decision);
        report.imported = input.live.imported();

        match (decision.action, &input.live) {
            (Action::Update, LiveState::Found { attributes, .. }) => {
                let Some(prior) = input.known_prior() else {
                    return report;
                };
                let prior = prior.clone();
                self.update(schema, input, attributes, prior, StateChange::Unchanged, report)
                    .await
            }
            (Action::ImportThenUpdate, LiveState::Found { attributes, .. }) => {
                let imported = ResourceStateRecord::new(
                    resource_id,
                    &input.type_name,
                    attributes.clone(),
                    schema.version,
                    "",
                );
                let baseline = StateChange::Store(imported.clone());
                self.update(schema, input, attributes, imported, baseline, report).await
            }
            (Action::Create | Action::ImportOrCreate, _) => {
                self.create(schema, input, None, report).await
            }
            (Action::Repair, _) => {
                let prior = input.known_prior().cloned();
                self.create(schema, input, prior, report).await
            }
            (Action::Delete, LiveState::Found { attributes, .. }) => {
                self.delete(schema, input, attributes, report).await
            }
            (Action::Delete | Action::NoChange, _) => {
                report.state = if input.prior.is_some() && !input.live.exists() {
                    StateChange::Remove
                } else {
                    StateChange::Unchanged
                };
                report
            }
            (Action::Update | Action::ImportThenUpdate, LiveState::Absent { .. }) => report,
        }
    }

    async fn update(
        &self,
        schema: &Schema,
        input: &ReconciliationInput,
        observed: &Attributes,
        record: ResourceStateRecord,
        baseline: StateChange,
        mut report: CycleReport,
    ) -> CycleReport {
        let type_name = input.type_name.as_str();
        let config_hash = content_key(&input.desired);

        let changes = changed_attributes(&input.desired, observed, &schema.block);
        if changes.is_empty() {
            tracing::debug!(resource_id = %input.resource_id, "no changes");
            report.state = refresh(&record, baseline, observed, &config_hash);
            return report;
        }
        tracing::debug!(resource_id = %input.resource_id, ?changes, "desired config differs");

        let plan = match self.session.plan(type_name, Some(observed), &input.desired).await {
            Ok(plan) => plan,
            Err(e) => {
                report.state = baseline;
                return report.fail(e);
            }
        };

        if &plan.planned_state == observed {
            tracing::warn!(
                resource_id = %input.resource_id,
                ?changes,
                "planned state equals current state, desired changes are not applicable"
            );
            report.state = refresh(&record, baseline, observed, &config_hash);
            return report;
        }

        if plan.requires_replace {
            tracing::info!(resource_id = %input.resource_id, "change requires replacement");
            if let Err(e) = self.session.delete(type_name, observed).await {
                report.state = baseline;
                return report.fail(e);
            }
            return match self.session.create(type_name, &input.desired).await {
                Ok(created) => {
                    report.performed = Performed::Replaced;
                    report.state = StateChange::Store(record.with_observed(created, config_hash));
                    report
                }
                Err(e) => {
                    report.state = match e.partial_state() {
                        Some(partial) => {
                            StateChange::Store(record.with_observed(partial.clone(), ""))
                        }
                        None => baseline,
                    };
                    report.fail(e)
                }
            };
        }

        match self.session.update(type_name, observed, &input.desired).await {
            Ok(updated) => {
                report.performed = Performed::Updated;
                report.state = StateChange::Store(record.with_observed(updated, config_hash));
                report
            }
            Err(e) => {
                report.state = baseline;
                report.fail(e)
            }
        }
    }

    async fn create(
        &self,
        schema: &Schema,
        input: &ReconciliationInput,
        prior: Option<ResourceStateRecord>,
        mut report: CycleReport,
    ) -> CycleReport {
        let record = |observed: Attributes, config_hash: String| match &prior {
            Some(prior) => prior.with_observed(observed, config_hash),
            None => ResourceStateRecord::new(
                input.resource_id.as_str(),
                input.type_name.as_str(),
                observed,
                schema.version,
                config_hash,
            ),
        };

        match self.session.create(&input.type_name, &input.desired).await {
            Ok(created) => {
                report.performed = Performed::Created;
                report.state = StateChange::Store(record(created, content_key(&input.desired)));
                report
            }
            Err(e) => {
                if let Some(partial) = e.partial_state() {
                    tracing::warn!(
                        resource_id = %input.resource_id,
                        "create failed, keeping partial state"
                    );
                    report.state = StateChange::Store(record(partial.clone(), String::new()));
                }
                report.fail(e)
            }
        }
    }

    async fn delete(
        &self,
        schema: &Schema,
        input: &ReconciliationInput,
        observed: &Attributes,
        mut report: CycleReport,
    ) -> CycleReport {
        match self.session.delete(&input.type_name, observed).await {
            Ok(()) => {
                report.performed = Performed::Deleted;
                report.state = StateChange::Remove;
                report
            }
            Err(e) => {
                // Still there. An import is worth tracking even though the purge failed.
                if input.known_prior().is_none() && input.live.imported() {
                    report.state = StateChange::Store(ResourceStateRecord::new(
                        input.resource_id.as_str(),
                        input.type_name.as_str(),
                        observed.clone(),
                        schema.version,
                        "",
                    ));
                }
                report.fail(e)
            }
        }
    }

    fn persist(&self, mut report: CycleReport) -> CycleReport {
        let result = match &report.state {
            StateChange::Unchanged => Ok(()),
            StateChange::Store(record) => self.store.save(record),
            StateChange::Remove => self.store.remove(&report.resource_id).map(|_| ()),
        };

        if let Err(e) = result {
            tracing::error!(
                resource_id = %report.resource_id,
                error = %e,
                "could not persist state"
            );
            if report.error.is_none() {
                report.error = Some(e.into());
            }
        }

        match &report.error {
            None => tracing::info!(
                resource_id = %report.resource_id,
                performed = ?report.performed,
                "cycle complete"
            ),
            Some(e) => tracing::error!(
                resource_id = %report.resource_id,
                kind = %e.kind(),
                error = %e,
                "cycle failed"
            ),
        }
        report
    }
}

/// State change after a cycle that issued no mutating call: store the fresh
/// observation only if it differs from what is stored.
fn refresh(
    record: &ResourceStateRecord,
    baseline: StateChange,
    observed: &Attributes,
    config_hash: &str,
) -> StateChange {
    match baseline {
        StateChange::Unchanged if record.observed.as_known() == Some(observed) => {
            StateChange::Unchanged
        }
        _ => StateChange::Store(record.with_observed(observed.clone(), config_hash)),
    }
}
