//! `abcalc gsa` command - global sensitivity analysis

use console::style;
use miette::Result;
use std::path::PathBuf;

use crate::calc::results::ResultViewModel;
use crate::calc::sensitivity::GsaOptions;
use crate::calc::worker;
use crate::cli::commands::mc::SamplingArgs;
use crate::cli::helpers::{report_warnings, wait_for, Session, SetupArgs};
use crate::cli::output::emit;
use crate::cli::GlobalOpts;

#[derive(clap::Args, Debug)]
pub struct GsaArgs {
    #[command(flatten)]
    pub setup: SetupArgs,

    #[command(flatten)]
    pub sampling: SamplingArgs,

    /// Functional unit index
    #[arg(long, default_value_t = 0)]
    pub fu: usize,

    /// Method index
    #[arg(long, short = 'm', default_value_t = 0)]
    pub method: usize,

    /// Technosphere cells below this share of the score are left out
    #[arg(long)]
    pub cutoff_technosphere: Option<f64>,

    /// Biosphere cells below this share of the score are left out
    #[arg(long)]
    pub cutoff_biosphere: Option<f64>,

    /// Write to a .csv, .xlsx or .json file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

pub fn run(args: GsaArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let global = &session.effective(global);
    let options = args.sampling.options(&session);
    let gsa_options = GsaOptions {
        fu: args.fu,
        method: args.method,
        cutoff_technosphere: args
            .cutoff_technosphere
            .unwrap_or(session.config.gsa.cutoff_technosphere),
        cutoff_biosphere: args
            .cutoff_biosphere
            .unwrap_or(session.config.gsa.cutoff_biosphere),
    };
    let setup = session.resolve(&args.setup)?;
    let metadata = std::sync::Arc::new(setup.metadata());

    let handle = worker::spawn("sensitivity", move |checkpoint| {
        let mut view = ResultViewModel::build(setup, metadata, checkpoint)?;
        let warnings = view.run_mc(&options, checkpoint)?.warnings.clone();
        Ok((view.run_gsa(&gsa_options)?, warnings))
    })?;
    let (result, warnings) = wait_for(global, handle)?;
    report_warnings(&warnings);
    if !global.quiet {
        eprintln!(
            "{} {} inputs over {} iterations, R² = {:.3}{}",
            style("◆").cyan(),
            result.rows.len(),
            result.iterations_used,
            result.r_squared,
            if result.log_transformed {
                " (log-transformed score)"
            } else {
                ""
            }
        );
    }
    emit(&result.to_frame(), args.output.as_deref(), global)
}
