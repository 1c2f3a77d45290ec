//! CLI module - argument parsing and command dispatch

pub mod args;
pub mod commands;
pub mod helpers;
pub mod output;
pub mod viz;

pub use args::{Cli, Commands, GlobalOpts, OutputFormat};

use miette::Result;

/// Run one parsed command
pub fn dispatch(cli: Cli) -> Result<()> {
    let global = cli.global;
    match cli.command {
        Commands::Setups(args) => commands::setups::run(args, &global),
        Commands::Scores(args) => commands::scores::run(args, &global),
        Commands::Inventory(args) => commands::inventory::run(args, &global),
        Commands::Contrib(args) => commands::contrib::run(args, &global),
        Commands::Mc(args) => commands::mc::run(args, &global),
        Commands::Gsa(args) => commands::gsa::run(args, &global),
        Commands::Import(args) => commands::import::run(args, &global),
        Commands::Completions(args) => commands::completions::run(args),
    }
}
