//! Command-line interface for paper-forge.
//!
//! Provides the `extract` and `search` commands.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands, ExtractArgs, SearchArgs};
