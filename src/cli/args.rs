use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a config block tree and print the serialized map
    Render(RenderArgs),
    /// Run one reconciliation cycle for a resource manifest
    Apply(ApplyArgs),
    /// Inspect stored resource state
    State {
        #[command(subcommand)]
        command: StateCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum StateCommand {
    List(StoreArgs),
    Show(ShowArgs),
    Rm(RemoveArgs),
}

#[derive(clap::Args, Debug)]
pub struct RenderArgs {
    /// JSON file holding the root block
    pub file: PathBuf,

    /// Print the block tree instead of the serialized map
    #[arg(long)]
    pub tree: bool,
}

#[derive(clap::Args, Debug)]
pub struct StoreArgs {
    #[arg(long, env = "TFSYNC_STATE_DIR")]
    pub state_dir: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct ApplyArgs {
    /// JSON resource manifest
    pub manifest: PathBuf,

    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long, env = "TFSYNC_PROVIDER_ENDPOINT")]
    pub endpoint: Option<String>,

    #[arg(long, env = "TFSYNC_PROVIDER_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Provider call timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    pub resource_id: String,

    /// Dotted attribute path, e.g. `rules.0.port`
    #[arg(long)]
    pub path: Option<String>,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(clap::Args, Debug)]
pub struct RemoveArgs {
    pub resource_id: String,

    #[command(flatten)]
    pub store: StoreArgs,
}
