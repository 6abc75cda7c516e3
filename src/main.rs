mod cli;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, StateCommand};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Render(args) => cli::render(&args)?,
        Command::Apply(args) => cli::apply(&args).await?,
        Command::State { command } => match command {
            StateCommand::List(args) => cli::list_state(&args)?,
            StateCommand::Show(args) => cli::show_state(&args)?,
            StateCommand::Rm(args) => cli::remove_state(&args)?,
        },
    }

    Ok(())
}
