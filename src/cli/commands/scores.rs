//! `abcalc scores` command - score table of a setup

use miette::Result;
use std::path::PathBuf;

use crate::cli::helpers::{compute, Session, SetupArgs};
use crate::cli::output::emit;
use crate::cli::GlobalOpts;

#[derive(clap::Args, Debug)]
pub struct ScoresArgs {
    #[command(flatten)]
    pub setup: SetupArgs,

    /// Divide each method column by its largest absolute score
    #[arg(long)]
    pub normalize: bool,

    /// One row per (fu, method, scenario) cell instead of a wide table
    #[arg(long)]
    pub long: bool,

    /// Write to a .csv, .xlsx or .json file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

pub fn run(args: ScoresArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let global = &session.effective(global);
    let setup = session.resolve(&args.setup)?;
    let view = compute(global, setup)?;
    let frame = if args.long {
        view.scores().to_frame()
    } else {
        view.score_table(args.normalize)
    };
    emit(&frame, args.output.as_deref(), global)
}
