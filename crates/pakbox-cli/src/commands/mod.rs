//! CLI command definitions and dispatch.

pub mod overrides;
pub mod spawn;

use clap::{Parser, Subcommand};
use pakbox_common::constants::BIN_NAME;

/// pakbox: sandboxed application runner.
#[derive(Parser, Debug)]
#[command(name = BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Log every mount and skipped host path.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a sandbox in the current mount namespace and start its workload (internal).
    #[command(hide = true)]
    Spawn(spawn::SpawnArgs),
    /// Inspect and manage per-application permission overrides.
    Override(overrides::OverrideArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Spawn(args) => spawn::execute(args, cli.verbose.into()),
        Command::Override(args) => overrides::execute(args),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn verbose_is_global() {
        let cli = Cli::try_parse_from([
            "pakbox", "override", "show", "--app", "a", "--version", "1", "--verbose",
        ])
        .expect("parse");
        assert!(cli.verbose);
    }
}
