//! Shared test helpers for integration tests
//!
//! `demo_project` writes a three-process foreground system:
//!
//! ```text
//! a (steel, DE) ──0.5──► b (electricity, FR) ──0.1──► c (coal, PL)
//! ```
//!
//! Per kg of steel: GWP 2.1 kg CO2 eq, CED 7.05 MJ.

#![allow(dead_code)]

use assert_cmd::cargo;
use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use abcalc::calc::results::ResultViewModel;
use abcalc::calc::setup::{resolve_setup, ResolvedSetup};
use abcalc::core::progress::Checkpoint;
use abcalc::core::project::Project;
use abcalc::core::scenario::ScenarioMatrix;

pub const GWP_A: f64 = 2.1;
pub const CED_A: f64 = 7.05;
pub const GWP_B2: f64 = 4.4;

/// Helper to get an abcalc command
pub fn abcalc() -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("abcalc"));
    cmd.env_remove("ABCALC_PROJECT")
        .env("ABCALC_CONFIG", "/nonexistent/abcalc.yaml");
    cmd
}

pub fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

const PROJECT: &str = "\
name: demo
parameters:
  - name: load
    amount: 0.5
setups:
  - name: basic
    inv:
      - key: [fg, a]
        amount: 1
    ia:
      - [IPCC, GWP100]
  - name: compare
    inv:
      - key: [fg, a]
        amount: 1
      - key: [fg, b]
        amount: 2
    ia:
      - [IPCC, GWP100]
      - [CED, fossil]
";

const FOREGROUND: &str = "\
name: fg
depends: [bio]
activities:
  - code: a
    name: steel production
    reference product: steel
    location: DE
    unit: kg
    exchanges:
      - input: [fg, b]
        amount: 0.5
        type: technosphere
        uncertainty type: 3
        loc: 0.5
        scale: 0.05
      - input: [bio, e1]
        amount: 2
        type: biosphere
      - input: [bio, e2]
        amount: 3
        type: biosphere
        formula: load * 6
  - code: b
    name: electricity production
    reference product: electricity
    location: FR
    unit: kWh
    exchanges:
      - input: [fg, c]
        amount: 0.1
        type: technosphere
      - input: [bio, e1]
        amount: 2
        type: biosphere
        uncertainty type: 4
        minimum: 1.5
        maximum: 2.5
      - input: [bio, e2]
        amount: 2
        type: biosphere
  - code: c
    name: coal mining
    reference product: coal
    location: PL
    unit: kg
    exchanges:
      - input: [bio, e1]
        amount: 1
        type: biosphere
";

const BIOSPHERE: &str = "\
name: bio
activities:
  - code: e1
    name: carbon dioxide
    type: emission
    categories: [air]
    unit: kg
  - code: e2
    name: methane
    type: emission
    categories: [air, urban]
    unit: kg
  - code: e3
    name: water
    type: natural resource
    categories: [water]
    unit: m3
";

const GWP: &str = "\
name: [IPCC, GWP100]
unit: kg CO2 eq
cfs:
  - flow: [bio, e1]
    amount: 2
  - flow: [bio, e2]
    amount: -1
";

const CED: &str = "\
name: [CED, fossil]
unit: MJ
cfs:
  - flow: [bio, e1]
    amount: 1
  - flow: [bio, e2]
    amount: 1
";

pub const SCENARIOS: &str = "\
from activity key,from database,to activity key,to database,flow,flow database,exchange type,amount_default,low,high
b,fg,a,fg,,,technosphere,0.5,0.25,1.0
";

/// Helper to create the demo project in a temp directory
pub fn demo_project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "project.yaml", PROJECT);
    write(tmp.path(), "databases/fg.yaml", FOREGROUND);
    write(tmp.path(), "databases/bio.yaml", BIOSPHERE);
    write(tmp.path(), "methods/gwp.yaml", GWP);
    write(tmp.path(), "methods/ced.yaml", CED);
    tmp
}

pub fn scenario_file(tmp: &TempDir) -> PathBuf {
    write(tmp.path(), "scenarios.csv", SCENARIOS)
}

pub fn load_setup(tmp: &TempDir, name: &str, with_scenarios: bool) -> ResolvedSetup {
    let project = Project::load(tmp.path()).unwrap();
    let scenarios = with_scenarios
        .then(|| ScenarioMatrix::from_path(&scenario_file(tmp)).unwrap());
    resolve_setup(project.store(), name, scenarios).unwrap()
}

pub fn view(setup: ResolvedSetup) -> ResultViewModel {
    let metadata = Arc::new(setup.metadata());
    ResultViewModel::build(setup, metadata, &mut Checkpoint::none()).unwrap()
}

/// Relative closeness within 1e-9
pub fn assert_close(actual: f64, expected: f64) {
    let scale = expected.abs().max(1.0);
    assert!(
        (actual - expected).abs() <= 1e-9 * scale,
        "{} != {}",
        actual,
        expected
    );
}

pub fn nan_sum(values: impl IntoIterator<Item = f64>) -> f64 {
    values.into_iter().filter(|v| !v.is_nan()).sum()
}
