mod args;
mod commands;

pub use args::{Cli, Command, StateCommand};
pub use commands::{apply, list_state, remove_state, render, show_state};
