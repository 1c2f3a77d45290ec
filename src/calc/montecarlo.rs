//! Monte Carlo engine - score distributions under sampled matrices
//!
//! Each iteration resamples every uncertain input selected by
//! [`IncludeFlags`], re-runs the (fu, method) loop and records the scores
//! together with the sampled input values. The sampled values and each
//! input's deterministic contribution feed the sensitivity analysis.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::calc::driver::{demand, score_matrix};
use crate::calc::engine::{InputKind, LcaEngine, UncertainInput};
use crate::calc::setup::ResolvedSetup;
use crate::core::error::{check_index, CalcError, CellIndex, CellWarning};
use crate::core::frame::{Cell, Frame};
use crate::core::identity::MethodKey;
use crate::core::metadata::MetaDataStore;
use crate::core::progress::Checkpoint;

/// Which uncertain inputs are sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct IncludeFlags {
    pub technosphere: bool,
    pub biosphere: bool,
    pub characterization: bool,
    pub parameters: bool,
}

impl Default for IncludeFlags {
    fn default() -> Self {
        Self {
            technosphere: true,
            biosphere: true,
            characterization: true,
            parameters: false,
        }
    }
}

impl IncludeFlags {
    pub fn all() -> Self {
        Self {
            technosphere: true,
            biosphere: true,
            characterization: true,
            parameters: true,
        }
    }

    pub fn none() -> Self {
        Self {
            technosphere: false,
            biosphere: false,
            characterization: false,
            parameters: false,
        }
    }

    pub fn includes(&self, kind: InputKind) -> bool {
        match kind {
            InputKind::Technosphere => self.technosphere,
            InputKind::Biosphere => self.biosphere,
            InputKind::Characterization => self.characterization,
            InputKind::Parameter => self.parameters,
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        [
            (self.technosphere, "technosphere"),
            (self.biosphere, "biosphere"),
            (self.characterization, "characterization"),
            (self.parameters, "parameters"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.names().is_empty()
    }
}

impl TryFrom<Vec<String>> for IncludeFlags {
    type Error = String;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        let mut flags = IncludeFlags::none();
        for name in names {
            match name.trim() {
                "technosphere" => flags.technosphere = true,
                "biosphere" => flags.biosphere = true,
                "characterization" => flags.characterization = true,
                "parameters" => flags.parameters = true,
                other => {
                    return Err(format!(
                        "unknown include flag '{}' (expected technosphere, biosphere, characterization or parameters)",
                        other
                    ))
                }
            }
        }
        Ok(flags)
    }
}

impl From<IncludeFlags> for Vec<String> {
    fn from(flags: IncludeFlags) -> Self {
        flags.names().into_iter().map(String::from).collect()
    }
}

impl FromStr for IncludeFlags {
    type Err = String;

    /// Comma-separated flag names
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let names: Vec<String> = s
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .collect();
        IncludeFlags::try_from(names)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct McOptions {
    pub iterations: usize,
    /// `None` draws a seed from OS entropy
    pub seed: Option<u64>,
    pub include: IncludeFlags,
    /// Scenario whose matrices are sampled; `None` uses the default matrices
    pub scenario: Option<usize>,
}

impl McOptions {
    pub fn new(iterations: usize) -> Self {
        Self {
            iterations,
            seed: None,
            include: IncludeFlags::default(),
            scenario: None,
        }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn include(mut self, include: IncludeFlags) -> Self {
        self.include = include;
        self
    }
}

/// Summary statistics of one (fu, method) distribution
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct McStatistics {
    /// Iterations with a finite score
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Lower percentile (2.5% for 95% CI)
    pub percentile_2_5: f64,
    /// Upper percentile (97.5% for 95% CI)
    pub percentile_97_5: f64,
}

impl McStatistics {
    pub fn from_samples(samples: &[f64]) -> Self {
        let mut values: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
        if values.is_empty() {
            return Self {
                count: 0,
                mean: f64::NAN,
                std_dev: f64::NAN,
                min: f64::NAN,
                max: f64::NAN,
                percentile_2_5: f64::NAN,
                percentile_97_5: f64::NAN,
            };
        }
        values.sort_by(f64::total_cmp);

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        let min = values[0];
        let max = values[values.len() - 1];
        let p2_5_idx = (n * 0.025) as usize;
        let p97_5_idx = (n * 0.975) as usize;
        Self {
            count: values.len(),
            mean,
            std_dev: variance.sqrt(),
            min,
            max,
            percentile_2_5: values.get(p2_5_idx).copied().unwrap_or(min),
            percentile_97_5: values.get(p97_5_idx).copied().unwrap_or(max),
        }
    }
}

/// Deterministic state sampled inputs are compared against
#[derive(Debug, Clone, PartialEq)]
pub struct Baseline {
    /// `scores[fu][method]`
    pub scores: Vec<Vec<f64>>,
    /// `contributions[fu][method][input]`; NaN for parameters
    pub contributions: Vec<Vec<Vec<f64>>>,
}

#[derive(Debug, Clone)]
pub struct McResult {
    pub iterations: usize,
    pub seed: u64,
    pub include: IncludeFlags,
    pub scenario: Option<usize>,
    pub fu_labels: Vec<String>,
    pub methods: Vec<MethodKey>,
    pub units: Vec<String>,
    /// `samples[iter][fu][method]`
    samples: Vec<Vec<Vec<f64>>>,
    pub inputs: Vec<UncertainInput>,
    /// `input_samples[iter][input]`
    input_samples: Vec<Vec<f64>>,
    pub baseline: Baseline,
    pub warnings: Vec<CellWarning>,
}

impl PartialEq for McResult {
    fn eq(&self, other: &Self) -> bool {
        let bits = |s: &Vec<Vec<Vec<f64>>>| -> Vec<u64> {
            s.iter().flatten().flatten().map(|v| v.to_bits()).collect()
        };
        self.iterations == other.iterations
            && self.seed == other.seed
            && self.include == other.include
            && self.fu_labels == other.fu_labels
            && self.methods == other.methods
            && bits(&self.samples) == bits(&other.samples)
            && self.input_samples == other.input_samples
    }
}

impl McResult {
    /// `(iterations, fus, methods)`
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.iterations, self.fu_labels.len(), self.methods.len())
    }

    pub fn get(&self, iteration: usize, fu: usize, method: usize) -> f64 {
        self.samples
            .get(iteration)
            .and_then(|s| s.get(fu))
            .and_then(|s| s.get(method))
            .copied()
            .unwrap_or(f64::NAN)
    }

    /// Scores of one (fu, method) across iterations
    pub fn by_fu_method(&self, fu: usize, method: usize) -> Result<Vec<f64>, CalcError> {
        check_index("functional unit", fu, self.fu_labels.len())?;
        check_index("method", method, self.methods.len())?;
        Ok(self.samples.iter().map(|s| s[fu][method]).collect())
    }

    /// `[iter][method]` for one functional unit
    pub fn by_fu(&self, fu: usize) -> Result<Vec<Vec<f64>>, CalcError> {
        check_index("functional unit", fu, self.fu_labels.len())?;
        Ok(self.samples.iter().map(|s| s[fu].clone()).collect())
    }

    /// `[iter][fu]` for one method
    pub fn by_method(&self, method: usize) -> Result<Vec<Vec<f64>>, CalcError> {
        check_index("method", method, self.methods.len())?;
        Ok(self
            .samples
            .iter()
            .map(|s| s.iter().map(|fu| fu[method]).collect())
            .collect())
    }

    pub fn statistics(&self, fu: usize, method: usize) -> Result<McStatistics, CalcError> {
        Ok(McStatistics::from_samples(&self.by_fu_method(fu, method)?))
    }

    /// Sampled values of input `input` across iterations
    pub fn input_samples(&self, input: usize) -> Result<Vec<f64>, CalcError> {
        check_index("input", input, self.inputs.len())?;
        Ok(self.input_samples.iter().map(|s| s[input]).collect())
    }

    /// Histogram data of one method: iteration, then one column per FU
    pub fn to_frame(&self, method: usize) -> Result<Frame, CalcError> {
        let per_iter = self.by_method(method)?;
        let columns = std::iter::once("iteration".to_string()).chain(self.fu_labels.iter().cloned());
        let mut frame = Frame::new(&self.methods[method].label(), columns);
        for (it, scores) in per_iter.into_iter().enumerate() {
            let mut row = vec![Cell::Number(it as f64)];
            row.extend(scores.into_iter().map(Cell::from));
            frame.push_row(row);
        }
        Ok(frame)
    }

    /// Statistics table: one row per (fu, method)
    pub fn statistics_frame(&self) -> Frame {
        let mut frame = Frame::new(
            "monte carlo statistics",
            ["fu", "method", "unit", "mean", "std", "min", "max", "p2.5", "p97.5"],
        );
        for (i, fu) in self.fu_labels.iter().enumerate() {
            for (j, method) in self.methods.iter().enumerate() {
                let Ok(stats) = self.statistics(i, j) else {
                    continue;
                };
                frame.push_row(vec![
                    Cell::from(fu.as_str()),
                    Cell::from(method.label()),
                    Cell::from(self.units[j].as_str()),
                    Cell::from(stats.mean),
                    Cell::from(stats.std_dev),
                    Cell::from(stats.min),
                    Cell::from(stats.max),
                    Cell::from(stats.percentile_2_5),
                    Cell::from(stats.percentile_97_5),
                ]);
            }
        }
        frame
    }
}

/// Run `options.iterations` Monte Carlo iterations
///
/// The engine is restored to its deterministic matrices afterwards, also
/// when the run fails or is cancelled.
pub fn run_mc(
    engine: &mut dyn LcaEngine,
    setup: &ResolvedSetup,
    metadata: &MetaDataStore,
    options: &McOptions,
    checkpoint: &mut Checkpoint<'_>,
) -> Result<McResult, CalcError> {
    if options.iterations == 0 {
        return Err(CalcError::invalid("iterations", "must be at least 1"));
    }
    if let Some(k) = options.scenario {
        if !setup.has_scenarios() {
            return Err(CalcError::incompatible(
                "Monte Carlo on a scenario requires a scenario matrix",
            ));
        }
        check_index("scenario", k, setup.scenario_count())?;
    }
    let seed = options.seed.unwrap_or_else(|| rand::rng().random());

    engine.set_scenario(options.scenario)?;
    let outcome = sample(engine, setup, metadata, options, seed, checkpoint);
    engine.restore();
    outcome
}

fn sample(
    engine: &mut dyn LcaEngine,
    setup: &ResolvedSetup,
    metadata: &MetaDataStore,
    options: &McOptions,
    seed: u64,
    checkpoint: &mut Checkpoint<'_>,
) -> Result<McResult, CalcError> {
    let demands: Vec<_> = setup.functional_units.iter().map(demand).collect();
    let n_method = setup.method_count();
    let baseline = baseline(engine, &demands, n_method)?;
    let inputs = engine.uncertain_inputs().to_vec();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut samples = Vec::with_capacity(options.iterations);
    let mut input_samples = Vec::with_capacity(options.iterations);
    let mut warnings = Vec::new();

    for it in 0..options.iterations {
        checkpoint.step(it + 1, options.iterations, "Monte Carlo iteration")?;
        let values = engine.resample(&mut rng, &options.include)?;
        let scores = score_matrix(engine, &demands, n_method)?;
        for (i, row) in scores.iter().enumerate() {
            if row.iter().any(|v| v.is_nan()) {
                warnings.push(CellWarning {
                    cell: CellIndex {
                        fu: Some(i),
                        method: None,
                        scenario: options.scenario,
                    },
                    message: format!("iteration {}: LCI solve failed", it),
                });
            }
        }
        samples.push(scores);
        input_samples.push(values);
    }

    tracing::debug!(
        iterations = options.iterations,
        seed,
        inputs = inputs.len(),
        include = ?options.include.names(),
        failed = warnings.len(),
        "Monte Carlo run complete"
    );

    Ok(McResult {
        iterations: options.iterations,
        seed,
        include: options.include,
        scenario: options.scenario,
        fu_labels: (0..setup.fu_count())
            .map(|i| setup.fu_label(metadata, i))
            .collect(),
        methods: setup.method_keys(),
        units: setup.method_units(),
        samples,
        inputs,
        input_samples,
        baseline,
        warnings,
    })
}

/// Deterministic scores and per-input contributions
///
/// Technosphere cell `(i, j)`: `T_ij · s_j · u_i` with `u` the unit scores;
/// biosphere cell `(e, j)`: `c_e · B_ej · s_j`; factor `e` of its own
/// method: `c_e · g_e`.
fn baseline(
    engine: &mut dyn LcaEngine,
    demands: &[Vec<(crate::core::identity::FlowKey, f64)>],
    n_method: usize,
) -> Result<Baseline, CalcError> {
    let inputs = engine.uncertain_inputs().to_vec();
    let mut unit_scores = Vec::with_capacity(n_method);
    let mut characterization = Vec::with_capacity(n_method);
    for j in 0..n_method {
        engine.set_method(j)?;
        characterization.push(engine.characterization().to_vec());
        // A singular deterministic matrix leaves every input unfiltered
        unit_scores.push(engine.unit_scores().ok());
    }

    let mut scores = Vec::with_capacity(demands.len());
    let mut contributions = Vec::with_capacity(demands.len());
    for (i, demand) in demands.iter().enumerate() {
        let solved = if i == 0 {
            engine.solve_lci(demand)
        } else {
            engine.redo_lci(demand)
        };
        if solved.is_err() {
            scores.push(vec![f64::NAN; n_method]);
            contributions.push(vec![vec![f64::NAN; inputs.len()]; n_method]);
            continue;
        }
        let supply = engine.supply().to_vec();
        let inventory = engine.inventory().to_vec();
        let mut fu_scores = Vec::with_capacity(n_method);
        let mut fu_contributions = Vec::with_capacity(n_method);
        for j in 0..n_method {
            engine.set_method(j)?;
            fu_scores.push(if j == 0 { engine.lcia()? } else { engine.redo_lcia()? });
            let c = &characterization[j];
            let per_input = inputs
                .iter()
                .map(|input| match input.kind {
                    InputKind::Technosphere => match &unit_scores[j] {
                        Some(u) => {
                            engine.technosphere_value(input.row, input.col)
                                * supply[input.col]
                                * u[input.row]
                        }
                        None => f64::NAN,
                    },
                    InputKind::Biosphere => {
                        c[input.row] * engine.biosphere_value(input.row, input.col) * supply[input.col]
                    }
                    InputKind::Characterization if input.col == j => c[input.row] * inventory[input.row],
                    InputKind::Characterization => 0.0,
                    InputKind::Parameter => f64::NAN,
                })
                .collect();
            fu_contributions.push(per_input);
        }
        scores.push(fu_scores);
        contributions.push(fu_contributions);
    }
    Ok(Baseline {
        scores,
        contributions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::engine::MatrixEngine;
    use crate::calc::setup::resolve_setup;
    use crate::core::identity::FlowKey;
    use crate::core::store::MemoryStore;
    use crate::entities::{
        Activity, CalculationSetup, Database, Exchange, ExchangeType, Method, Uncertainty,
    };

    fn key(code: &str) -> FlowKey {
        FlowKey::new("db", code)
    }

    fn setup() -> ResolvedSetup {
        let mut store = MemoryStore::new();
        let mut db = Database::new("db");
        db.activities.push(
            Activity::new("db", "a", "A")
                .with_exchange(
                    Exchange::new(key("b"), 0.5, ExchangeType::Technosphere)
                        .with_uncertainty(Uncertainty::normal(0.5, 0.05)),
                )
                .with_exchange(
                    Exchange::new(key("co2"), 1.0, ExchangeType::Biosphere)
                        .with_uncertainty(Uncertainty::uniform(0.8, 1.2)),
                ),
        );
        db.activities.push(
            Activity::new("db", "b", "B")
                .with_exchange(Exchange::new(key("co2"), 2.0, ExchangeType::Biosphere)),
        );
        let mut co2 = Activity::new("db", "co2", "CO2");
        co2.kind = "emission".into();
        db.activities.push(co2);
        store.add_database(db);
        store.add_method(Method::new(MethodKey::new(["GWP"]), "kg").with_cf(key("co2"), 1.0));
        store.add_setup(
            CalculationSetup::new("s")
                .with_fu(key("a"), 1.0)
                .with_fu(key("b"), 1.0)
                .with_method(MethodKey::new(["GWP"])),
        );
        resolve_setup(&store, "s", None).unwrap()
    }

    fn run(options: &McOptions) -> McResult {
        let setup = setup();
        let metadata = setup.metadata();
        let mut engine = MatrixEngine::build(&setup).unwrap();
        run_mc(&mut engine, &setup, &metadata, options, &mut Checkpoint::none()).unwrap()
    }

    #[test]
    fn test_include_flags_serde() {
        let flags: IncludeFlags = serde_yml::from_str("[technosphere, parameters]").unwrap();
        assert!(flags.technosphere && flags.parameters && !flags.biosphere);
        assert!(serde_yml::from_str::<IncludeFlags>("[bogus]").is_err());
        assert_eq!(
            "biosphere, characterization".parse::<IncludeFlags>().unwrap().names(),
            vec!["biosphere", "characterization"]
        );
        assert_eq!(IncludeFlags::default().names().len(), 3);
    }

    #[test]
    fn test_shape_and_determinism() {
        let options = McOptions::new(20).seed(42);
        let first = run(&options);
        let second = run(&options);
        assert_eq!(first.shape(), (20, 2, 1));
        assert_eq!(first, second);
        assert_eq!(first.seed, 42);
    }

    #[test]
    fn test_include_flags_limit_sampling() {
        let options = McOptions::new(10)
            .seed(1)
            .include(IncludeFlags {
                technosphere: false,
                biosphere: true,
                characterization: false,
                parameters: false,
            });
        let result = run(&options);
        // b has no uncertain exchanges and a does not feed it
        let b_scores = result.by_fu_method(1, 0).unwrap();
        assert!(b_scores.iter().all(|v| (v - 2.0).abs() < 1e-12));
        let technosphere = result.input_samples(0).unwrap();
        assert!(technosphere.iter().all(|v| *v == 0.5));
        let biosphere = result.input_samples(1).unwrap();
        assert!(biosphere.iter().all(|v| (0.8..=1.2).contains(v)));
    }

    #[test]
    fn test_statistics() {
        let stats = McStatistics::from_samples(&[1.0, 2.0, 3.0, 4.0, f64::NAN]);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean, 2.5);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        assert_eq!(stats.percentile_97_5, 4.0);
    }

    #[test]
    fn test_baseline_contributions() {
        let result = run(&McOptions::new(1).seed(3));
        // a: technosphere cell -0.5 * s_a 1 * u_b 2; biosphere cell 1 * 1 * 1
        let contributions = &result.baseline.contributions[0][0];
        assert!((contributions[0] + 1.0).abs() < 1e-12);
        assert!((contributions[1] - 1.0).abs() < 1e-12);
        assert!((result.baseline.scores[0][0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_frames() {
        let result = run(&McOptions::new(5).seed(9));
        let frame = result.to_frame(0).unwrap();
        assert_eq!(frame.rows.len(), 5);
        assert_eq!(frame.columns.len(), 3);
        assert!(result.to_frame(1).is_err());
        assert_eq!(result.statistics_frame().rows.len(), 2);
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let setup = setup();
        let metadata = setup.metadata();
        let mut engine = MatrixEngine::build(&setup).unwrap();
        let err = run_mc(&mut engine, &setup, &metadata, &McOptions::new(0), &mut Checkpoint::none());
        assert!(err.is_err());
    }
}
