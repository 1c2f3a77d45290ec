//! Command-line arguments

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    completions::CompletionsArgs, contrib::ContribArgs, gsa::GsaArgs, import::ImportArgs,
    inventory::InventoryArgs, mc::McArgs, scores::ScoresArgs, setups::SetupsArgs,
};

#[derive(Parser, Debug)]
#[command(name = "abcalc")]
#[command(author, version)]
#[command(
    about = "Life cycle assessment results: scores, inventories, contributions, Monte Carlo and sensitivity analysis"
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Args, Debug, Clone)]
pub struct GlobalOpts {
    /// Project directory (default: search upward for project.yaml)
    #[arg(long, global = true, env = "ABCALC_PROJECT")]
    pub project: Option<PathBuf>,

    /// Read from an imported SQLite store instead of the YAML project
    #[arg(long, global = true, conflicts_with = "project")]
    pub db: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Decimal places for numbers (default: shortest exact form)
    #[arg(long, global = true)]
    pub precision: Option<usize>,

    /// More diagnostics on stderr (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// No progress line
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table on a terminal, TSV when piped
    Auto,
    Table,
    Csv,
    Tsv,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List calculation setups
    Setups(SetupsArgs),

    /// Score table of a setup (functional units by methods)
    Scores(ScoresArgs),

    /// Biosphere or technosphere inventory
    Inventory(InventoryArgs),

    /// Elementary flow, process or first-tier contributions
    Contrib(ContribArgs),

    /// Monte Carlo uncertainty analysis
    Mc(McArgs),

    /// Global sensitivity analysis over Monte Carlo samples
    Gsa(GsaArgs),

    /// Mirror a YAML project into a SQLite store
    Import(ImportArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}
