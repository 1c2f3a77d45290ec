//! `abcalc import` command - mirror a YAML project into SQLite

use console::style;
use miette::Result;
use std::path::PathBuf;

use crate::cli::GlobalOpts;
use crate::core::cache::SqliteStore;
use crate::core::project::Project;

#[derive(clap::Args, Debug)]
pub struct ImportArgs {
    /// Target SQLite file
    #[arg(long = "to", short = 't')]
    pub target: PathBuf,

    /// Re-import even when the project is unchanged
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: ImportArgs, global: &GlobalOpts) -> Result<()> {
    let project = match &global.project {
        Some(dir) => Project::load(dir)?,
        None => Project::discover()?,
    };
    let store = SqliteStore::open(&args.target)?;
    let stats = if args.force {
        Some(store.import(project.store(), &project.fingerprint()?)?)
    } else {
        store.import_project(&project)?
    };
    match stats {
        Some(stats) => println!(
            "{} Imported '{}' into {}: {} databases, {} activities, {} exchanges, {} methods, {} setups",
            style("✓").green(),
            project.name(),
            args.target.display(),
            stats.databases,
            stats.activities,
            stats.exchanges,
            stats.methods,
            stats.setups
        ),
        None => println!(
            "{} {} is up to date",
            style("✓").green(),
            args.target.display()
        ),
    }
    Ok(())
}
