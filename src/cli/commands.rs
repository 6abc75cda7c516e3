use std::path::Path;
use std::time::Duration;

use color_eyre::eyre::{Result, eyre};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use termtree::Tree;

use tfsync::config::{self, ConfigBlock};
use tfsync::error::TfsyncError;
use tfsync::providers::{self, SessionOptions};
use tfsync::reconcile::{CycleReport, Reconciler, StateChange};
use tfsync::resource::ResourceManifest;
use tfsync::state::{AttributePath, FileStateStore, StateStore};

use super::args::{ApplyArgs, RemoveArgs, RenderArgs, ShowArgs, StoreArgs};

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, TfsyncError> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map_err(|e| TfsyncError::Manifest(format!("{}: {e}", path.display())))
}

fn open_store(args: &StoreArgs) -> Result<FileStateStore, TfsyncError> {
    let dir = match &args.state_dir {
        Some(dir) => dir.clone(),
        None => FileStateStore::default_dir()?,
    };
    tracing::debug!(dir = %dir.display(), "using state directory");
    Ok(FileStateStore::new(dir))
}

pub fn render(args: &RenderArgs) -> Result<()> {
    let mut root: ConfigBlock = read_json(&args.file)?;
    let prepared = config::prepare(&mut root)?;

    if args.tree {
        println!("{}", block_tree(&root));
    } else {
        println!("{}", serde_json::to_string_pretty(&prepared.config)?);
    }
    for warning in &prepared.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}

fn block_tree(block: &ConfigBlock) -> Tree<String> {
    let label = match (&block.name, &block.key) {
        (None, _) => "(root)".to_string(),
        (Some(name), Some(key)) => format!("{name} [{}: {key}]", block.nesting_mode),
        (Some(name), None) => format!("{name} [{}]", block.nesting_mode),
    };
    let label = if block.deprecated {
        format!("{label} (deprecated)")
    } else {
        label
    };

    let attributes = block
        .attributes
        .iter()
        .map(|(key, value)| Tree::new(format!("{key} = {value}")));
    let children = block.children.iter().map(block_tree);
    Tree::new(label).with_leaves(attributes.chain(children))
}

pub async fn apply(args: &ApplyArgs) -> Result<()> {
    let manifest: ResourceManifest = read_json(&args.manifest)?;
    let store = open_store(&args.store)?;
    let options = SessionOptions {
        endpoint: args.endpoint.clone(),
        token: args.token.clone(),
        timeout: args.timeout.map(Duration::from_secs),
    };

    let session = providers::get_session(&manifest.provider.name, &options)?;
    let reconciler = Reconciler::new(session.as_ref(), &store);

    for warning in reconciler.configure(&manifest.provider.config).await? {
        eprintln!("warning: {warning}");
    }
    let report = reconciler.reconcile(&manifest.resource).await?;
    print_report(&report);

    match report.error {
        Some(e) => Err(eyre!("{}: {e}", e.kind())),
        None => Ok(()),
    }
}

fn print_report(report: &CycleReport) {
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
    let state = match &report.state {
        StateChange::Unchanged => "unchanged",
        StateChange::Store(_) => "stored",
        StateChange::Remove => "removed",
    };
    println!(
        "{}: action={} performed={:?} imported={} state={state}",
        report.resource_id,
        report.action(),
        report.performed,
        report.imported
    );
}

#[derive(Tabled)]
struct StateRow {
    #[tabled(rename = "RESOURCE")]
    resource_id: String,
    #[tabled(rename = "TYPE")]
    type_name: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "UPDATED")]
    updated_at: String,
}

pub fn list_state(args: &StoreArgs) -> Result<()> {
    let store = open_store(args)?;
    let mut rows = Vec::new();
    for resource_id in store.list()? {
        let Some(record) = store.load(&resource_id)? else {
            continue;
        };
        rows.push(StateRow {
            id: record.id().unwrap_or("-").to_string(),
            resource_id: record.resource_id,
            type_name: record.type_name,
            updated_at: record.updated_at.to_rfc3339(),
        });
    }

    if rows.is_empty() {
        println!("No resources in state.");
        return Ok(());
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

pub fn show_state(args: &ShowArgs) -> Result<()> {
    let store = open_store(&args.store)?;
    let record = store
        .load(&args.resource_id)?
        .ok_or_else(|| eyre!("no state stored for '{}'", args.resource_id))?;

    let value: Value = match &args.path {
        Some(path) => {
            let Ok(path) = path.parse::<AttributePath>();
            record.get(&path)?.clone()
        }
        None => record.to_persisted()?,
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

pub fn remove_state(args: &RemoveArgs) -> Result<()> {
    let store = open_store(&args.store)?;
    if store.remove(&args.resource_id)? {
        println!("Removed state of '{}'.", args.resource_id);
    } else {
        println!("No state stored for '{}'.", args.resource_id);
    }
    Ok(())
}
