//! `abcalc mc` command - Monte Carlo uncertainty analysis

use console::style;
use miette::Result;
use std::path::PathBuf;

use crate::calc::montecarlo::{IncludeFlags, McOptions};
use crate::calc::results::ResultViewModel;
use crate::calc::worker;
use crate::cli::helpers::{report_warnings, wait_for, Session, SetupArgs};
use crate::cli::output::emit;
use crate::cli::viz;
use crate::cli::GlobalOpts;

/// Monte Carlo options shared by `mc` and `gsa`
#[derive(clap::Args, Debug, Clone)]
pub struct SamplingArgs {
    /// Number of iterations
    #[arg(long, short = 'n')]
    pub iterations: Option<usize>,

    /// Random seed for a reproducible run
    #[arg(long)]
    pub seed: Option<u64>,

    /// Sampled inputs: technosphere, biosphere, characterization, parameters
    #[arg(long, short = 'i')]
    pub include: Option<IncludeFlags>,

    /// Sample around this scenario's matrices instead of the defaults
    #[arg(long)]
    pub scenario: Option<usize>,
}

impl SamplingArgs {
    pub fn options(&self, session: &Session) -> McOptions {
        let defaults = &session.config.monte_carlo;
        McOptions {
            iterations: self.iterations.unwrap_or(defaults.iterations),
            seed: self.seed.or(defaults.seed),
            include: self.include.unwrap_or(defaults.include),
            scenario: self.scenario,
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct McArgs {
    #[command(flatten)]
    pub setup: SetupArgs,

    #[command(flatten)]
    pub sampling: SamplingArgs,

    /// Print the sampled scores of this method instead of statistics
    #[arg(long, short = 'm')]
    pub method: Option<usize>,

    /// Draw a histogram of this functional unit's samples (needs --method)
    #[arg(long, requires = "method")]
    pub histogram: Option<usize>,

    /// Write to a .csv, .xlsx or .json file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

pub fn run(args: McArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let global = &session.effective(global);
    let options = args.sampling.options(&session);
    let setup = session.resolve(&args.setup)?;
    let metadata = std::sync::Arc::new(setup.metadata());

    let handle = worker::spawn("monte-carlo", move |checkpoint| {
        let mut view = ResultViewModel::build(setup, metadata, checkpoint)?;
        view.run_mc(&options, checkpoint)?;
        Ok(view)
    })?;
    let view = wait_for(global, handle)?;
    let Some(mc) = view.mc_result() else {
        return Err(miette::miette!("Monte Carlo produced no result"));
    };
    report_warnings(&mc.warnings);
    if !global.quiet {
        eprintln!(
            "{} {} iterations, seed {}, sampling {}",
            style("◆").cyan(),
            mc.iterations,
            mc.seed,
            mc.include.names().join(", ")
        );
    }

    let Some(method) = args.method else {
        return emit(&mc.statistics_frame(), args.output.as_deref(), global);
    };
    if let Some(fu) = args.histogram {
        let samples = mc.by_fu_method(fu, method)?;
        println!(
            "{} {} | {}",
            style("Distribution").bold(),
            mc.fu_labels[fu],
            mc.methods[method].label()
        );
        println!(
            "{}",
            viz::render_histogram(&samples, viz::HISTOGRAM_WIDTH, viz::HISTOGRAM_HEIGHT)
        );
        return Ok(());
    }
    emit(&view.mc_histogram(method)?, args.output.as_deref(), global)
}
