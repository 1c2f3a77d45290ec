//! Shared helper functions for CLI commands
//!
//! Opening the store, picking a setup, loading scenario files and running
//! long computations on the worker with a progress line on stderr.

use console::{style, Term};
use dialoguer::{theme::ColorfulTheme, Select};
use miette::{IntoDiagnostic, Result};
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;

use crate::calc::results::ResultViewModel;
use crate::calc::setup::{resolve_setup, ResolvedSetup};
use crate::calc::worker::JobHandle;
use crate::cli::GlobalOpts;
use crate::core::cache::SqliteStore;
use crate::core::error::CellWarning;
use crate::core::progress::Progress;
use crate::core::project::Project;
use crate::core::scenario::{CombineMode, ScenarioMatrix};
use crate::core::store::LcaStore;
use crate::core::Config;

/// Store and configuration of one invocation
pub struct Session {
    pub store: Box<dyn LcaStore>,
    pub config: Config,
    pub project_dir: Option<PathBuf>,
}

impl Session {
    pub fn open(global: &GlobalOpts) -> Result<Self> {
        if let Some(db) = &global.db {
            if !db.exists() {
                return Err(miette::miette!(
                    help = "create it with `abcalc import --db <FILE>`",
                    "store {} does not exist",
                    db.display()
                ));
            }
            let store = SqliteStore::open(db)?;
            return Ok(Self {
                store: Box::new(store),
                config: Config::load(None)?,
                project_dir: None,
            });
        }
        let project = match &global.project {
            Some(dir) => Project::load(dir)?,
            None => Project::discover()?,
        };
        let root = project.root().to_path_buf();
        Ok(Self {
            config: Config::load(Some(&root))?,
            store: Box::new(project.into_store()),
            project_dir: Some(root),
        })
    }

    /// Global options with the configured export precision filled in
    pub fn effective(&self, global: &GlobalOpts) -> GlobalOpts {
        let mut global = global.clone();
        global.precision = global.precision.or(self.config.export.float_precision);
        global
    }

    /// Setup name from the argument, the only setup, or an interactive pick
    pub fn setup_name(&self, name: Option<&str>) -> Result<String> {
        if let Some(name) = name {
            return Ok(name.to_string());
        }
        let names = self.store.setup_names()?;
        match names.len() {
            0 => Err(miette::miette!("the project has no calculation setups")),
            1 => Ok(names[0].clone()),
            _ if io::stdin().is_terminal() && io::stderr().is_terminal() => {
                let selection = Select::with_theme(&ColorfulTheme::default())
                    .with_prompt("Calculation setup")
                    .items(&names)
                    .default(0)
                    .interact()
                    .into_diagnostic()?;
                Ok(names[selection].clone())
            }
            _ => Err(miette::miette!(
                help = format!("available setups: {}", names.join(", ")),
                "a setup name is required"
            )),
        }
    }

    pub fn resolve(&self, args: &SetupArgs) -> Result<ResolvedSetup> {
        let name = self.setup_name(args.setup.as_deref())?;
        let scenarios = args.scenarios()?;
        Ok(resolve_setup(self.store.as_ref(), &name, scenarios)?)
    }
}

/// Setup selection shared by every calculation command
#[derive(clap::Args, Debug, Clone)]
pub struct SetupArgs {
    /// Calculation setup name (prompted for when omitted on a terminal)
    pub setup: Option<String>,

    /// Scenario file (.csv or .xlsx); repeat to combine several
    #[arg(long = "scenarios", short = 's')]
    pub scenario_files: Vec<PathBuf>,

    /// How several scenario files are combined
    #[arg(long, default_value = "product")]
    pub combine: CombineMode,
}

impl SetupArgs {
    pub fn scenarios(&self) -> Result<Option<ScenarioMatrix>> {
        if self.scenario_files.is_empty() {
            return Ok(None);
        }
        let parts = self
            .scenario_files
            .iter()
            .map(|p| ScenarioMatrix::from_path(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(ScenarioMatrix::combine(parts, self.combine)?))
    }
}

/// Single progress line on stderr, only drawn on a terminal
pub struct ProgressLine {
    term: Term,
    enabled: bool,
    drawn: bool,
}

impl ProgressLine {
    pub fn new(global: &GlobalOpts) -> Self {
        let term = Term::stderr();
        let enabled = !global.quiet && term.is_term();
        Self {
            term,
            enabled,
            drawn: false,
        }
    }

    pub fn update(&mut self, progress: &Progress) {
        if !self.enabled {
            return;
        }
        let line = format!(
            "{} {:>3.0}% {}/{} {}",
            style("◆").cyan(),
            progress.fraction() * 100.0,
            progress.current,
            progress.total,
            style(&progress.label).dim()
        );
        let _ = self.term.clear_line();
        let _ = self.term.write_str(&line);
        self.drawn = true;
    }

    pub fn finish(&mut self) {
        if self.drawn {
            let _ = self.term.clear_line();
            self.drawn = false;
        }
    }
}

/// Block on a worker job, drawing its progress
pub fn wait_for<T>(global: &GlobalOpts, handle: JobHandle<T>) -> Result<T> {
    let mut line = ProgressLine::new(global);
    let outcome = handle.wait_with(|p| line.update(p));
    line.finish();
    Ok(outcome?)
}

/// Build the score cube on the worker
pub fn compute(global: &GlobalOpts, setup: ResolvedSetup) -> Result<ResultViewModel> {
    let metadata = Arc::new(setup.metadata());
    let view = wait_for(global, ResultViewModel::spawn(setup, metadata)?)?;
    report_warnings(&view.scores().warnings);
    Ok(view)
}

/// Non-fatal cell failures go to stderr
pub fn report_warnings(warnings: &[CellWarning]) {
    for warning in warnings {
        eprintln!("{} {}", style("warning:").yellow().bold(), warning);
    }
}

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
