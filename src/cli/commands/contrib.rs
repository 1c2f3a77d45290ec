//! `abcalc contrib` command - contribution analysis

use clap::ValueEnum;
use console::style;
use miette::Result;
use std::path::PathBuf;

use crate::calc::contribution::{
    Compare, ContributionKind, ContributionRequest, Cutoff, LimitType, TotalMode,
};
use crate::calc::worker;
use crate::cli::helpers::{compute, wait_for, Session, SetupArgs};
use crate::cli::output::emit;
use crate::cli::GlobalOpts;

/// Limit used when `--limit-type number` is given without `--cutoff`
const DEFAULT_TOP_N: f64 = 10.0;

/// Axis shown as columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CompareAxis {
    /// One column per functional unit
    Fu,
    /// One column per impact method
    Method,
    /// One column per scenario
    Scenario,
}

#[derive(clap::Args, Debug)]
pub struct ContribArgs {
    #[command(flatten)]
    pub setup: SetupArgs,

    /// Contribution kind
    #[arg(long, short = 'k', default_value = "process")]
    pub kind: ContributionKind,

    /// Compared axis; the other two are fixed by --fu, --method, --scenario
    #[arg(long, short = 'c', default_value = "fu")]
    pub compare: CompareAxis,

    /// Functional unit index when not compared
    #[arg(long, default_value_t = 0)]
    pub fu: usize,

    /// Method index when not compared
    #[arg(long, short = 'm', default_value_t = 0)]
    pub method: usize,

    /// Scenario index when not compared
    #[arg(long, default_value_t = 0)]
    pub scenario: usize,

    /// Cut-off limit (fraction for percent types, count for number)
    #[arg(long)]
    pub cutoff: Option<f64>,

    /// How the cut-off limit is read
    #[arg(long)]
    pub limit_type: Option<LimitType>,

    /// Total used for the cut-off and relative values
    #[arg(long)]
    pub total_mode: Option<TotalMode>,

    /// Absolute values instead of relative shares
    #[arg(long, conflicts_with = "relative")]
    pub absolute: bool,

    /// Relative shares (the configured default)
    #[arg(long)]
    pub relative: bool,

    /// Group contributors by a metadata field (e.g. location, compartment)
    #[arg(long, short = 'a')]
    pub aggregate: Option<String>,

    /// Write to a .csv, .xlsx or .json file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

impl ContribArgs {
    pub fn compare(&self) -> Compare {
        match self.compare {
            CompareAxis::Fu => Compare::FunctionalUnits {
                method: self.method,
                scenario: self.scenario,
            },
            CompareAxis::Method => Compare::Methods {
                fu: self.fu,
                scenario: self.scenario,
            },
            CompareAxis::Scenario => Compare::Scenarios {
                fu: self.fu,
                method: self.method,
            },
        }
    }

    /// Request from the configured defaults overridden by flags
    pub fn request(&self, session: &Session) -> ContributionRequest {
        let defaults = &session.config.contribution;
        let mut request = ContributionRequest::from_defaults(self.kind, self.compare(), defaults);
        let limit_type = self.limit_type.unwrap_or(defaults.limit_type);
        let limit = match (self.cutoff, limit_type) {
            (Some(limit), _) => limit,
            (None, LimitType::Number) if defaults.limit_type != LimitType::Number => DEFAULT_TOP_N,
            (None, _) => defaults.cutoff,
        };
        request = request.with_cutoff(Cutoff { limit, limit_type });
        if let Some(mode) = self.total_mode {
            request = request.total_mode(mode);
        }
        if self.absolute {
            request = request.relative(false);
        } else if self.relative {
            request = request.relative(true);
        }
        if let Some(field) = &self.aggregate {
            request = request.aggregate_by(field.as_str());
        }
        request
    }
}

pub fn run(args: ContribArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let global = &session.effective(global);
    let request = args.request(&session);
    request.cutoff.validate()?;
    let setup = session.resolve(&args.setup)?;
    let mut view = compute(global, setup)?;

    let handle = worker::spawn("contributions", move |checkpoint| {
        view.contributions(&request, checkpoint)
    })?;
    let table = wait_for(global, handle)?;
    if table.relative_only && !global.quiet {
        eprintln!(
            "{} compared columns have different units; only relative values are meaningful",
            style("note:").cyan()
        );
    }
    emit(&table.to_frame(), args.output.as_deref(), global)
}
