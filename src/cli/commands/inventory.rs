//! `abcalc inventory` command - biosphere or technosphere flows per functional unit

use miette::Result;
use std::path::PathBuf;

use crate::calc::inventory::{InventoryKind, InventoryOptions};
use crate::cli::helpers::{compute, Session, SetupArgs};
use crate::cli::output::emit;
use crate::cli::GlobalOpts;

#[derive(clap::Args, Debug)]
pub struct InventoryArgs {
    #[command(flatten)]
    pub setup: SetupArgs,

    /// Which inventory to show
    #[arg(long, short = 'k', default_value = "biosphere")]
    pub kind: InventoryKind,

    /// Scenario index (0-based)
    #[arg(long, default_value_t = 0)]
    pub scenario: usize,

    /// Keep rows that are zero for every functional unit
    #[arg(long)]
    pub keep_zeros: bool,

    /// Only flows characterized by at least one method
    #[arg(long)]
    pub characterized: bool,

    /// Write to a .csv, .xlsx or .json file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

pub fn run(args: InventoryArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let global = &session.effective(global);
    let setup = session.resolve(&args.setup)?;
    let view = compute(global, setup)?;
    let inventory = view.scenario_inventory(
        args.kind,
        args.scenario,
        InventoryOptions {
            remove_zeros: !args.keep_zeros,
            characterized_only: args.characterized,
        },
    )?;
    emit(&inventory.to_frame(), args.output.as_deref(), global)
}
