//! LCA driver - fills the score cube and keeps the vectors contributions need
//!
//! One factorization per scenario: the first functional unit is solved with
//! `solve_lci`, every later one with `redo_lci`; methods are swapped on the
//! solved inventory. A failed solve marks its whole functional-unit column
//! as NaN and is recorded as a [`CellWarning`].

use serde::Serialize;

use crate::calc::engine::LcaEngine;
use crate::calc::setup::ResolvedSetup;
use crate::core::error::{check_index, CalcError, CellIndex, CellWarning, ErrorKind};
use crate::core::frame::{Cell, Frame};
use crate::core::identity::{FlowKey, MethodKey};
use crate::core::metadata::MetaDataStore;
use crate::core::progress::Checkpoint;
use crate::entities::FunctionalUnit;

/// Demand vector of a functional unit
pub fn demand(fu: &FunctionalUnit) -> Vec<(FlowKey, f64)> {
    fu.entries()
        .iter()
        .map(|e| (e.key.clone(), e.amount))
        .collect()
}

/// Scores `S[fu, method, scenario]`
#[derive(Debug, Clone, Serialize)]
pub struct ScoreCube {
    shape: (usize, usize, usize),
    values: Vec<f64>,
    pub fu_labels: Vec<String>,
    pub methods: Vec<MethodKey>,
    pub units: Vec<String>,
    pub scenarios: Vec<String>,
    pub warnings: Vec<CellWarning>,
}

impl ScoreCube {
    pub fn new(
        fu_labels: Vec<String>,
        methods: Vec<MethodKey>,
        units: Vec<String>,
        scenarios: Vec<String>,
    ) -> Self {
        let shape = (fu_labels.len(), methods.len(), scenarios.len().max(1));
        Self {
            values: vec![f64::NAN; shape.0 * shape.1 * shape.2],
            shape,
            fu_labels,
            methods,
            units,
            scenarios,
            warnings: Vec::new(),
        }
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.shape
    }

    fn offset(&self, i: usize, j: usize, k: usize) -> usize {
        (i * self.shape.1 + j) * self.shape.2 + k
    }

    /// Unchecked read; NaN outside the cube
    pub fn get(&self, i: usize, j: usize, k: usize) -> f64 {
        if i >= self.shape.0 || j >= self.shape.1 || k >= self.shape.2 {
            return f64::NAN;
        }
        self.values[self.offset(i, j, k)]
    }

    pub fn score(&self, i: usize, j: usize, k: usize) -> Result<f64, CalcError> {
        check_index("functional unit", i, self.shape.0)?;
        check_index("method", j, self.shape.1)?;
        check_index("scenario", k, self.shape.2)?;
        Ok(self.get(i, j, k))
    }

    pub fn set(&mut self, i: usize, j: usize, k: usize, value: f64) {
        let at = self.offset(i, j, k);
        self.values[at] = value;
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Long table `fu, method, scenario, score`
    pub fn to_frame(&self) -> Frame {
        let mut frame = Frame::new("scores", ["fu", "method", "scenario", "score"]);
        for i in 0..self.shape.0 {
            for j in 0..self.shape.1 {
                for k in 0..self.shape.2 {
                    let scenario = self
                        .scenarios
                        .get(k)
                        .cloned()
                        .unwrap_or_else(|| k.to_string());
                    frame.push_row(vec![
                        Cell::from(self.fu_labels[i].as_str()),
                        Cell::from(self.methods[j].label()),
                        Cell::from(scenario),
                        Cell::from(self.get(i, j, k)),
                    ]);
                }
            }
        }
        frame
    }
}

/// Score cube plus the solved vectors of every cell
///
/// Contribution tables are derived from these without touching the engine:
/// supply `s` and inventory `g` per (fu, scenario), `cᵀB` per
/// (method, scenario) and `c` per method.
#[derive(Debug, Clone)]
pub struct LcaResults {
    pub cube: ScoreCube,
    pub activities: Vec<FlowKey>,
    pub flows: Vec<FlowKey>,
    supply: Vec<Vec<Option<Vec<f64>>>>,
    inventory: Vec<Vec<Option<Vec<f64>>>>,
    production: Vec<Vec<f64>>,
    characterized_biosphere: Vec<Vec<Vec<f64>>>,
    characterization: Vec<Vec<f64>>,
}

impl LcaResults {
    pub fn supply(&self, fu: usize, scenario: usize) -> Option<&[f64]> {
        self.supply.get(scenario)?.get(fu)?.as_deref()
    }

    pub fn inventory(&self, fu: usize, scenario: usize) -> Option<&[f64]> {
        self.inventory.get(scenario)?.get(fu)?.as_deref()
    }

    /// Technosphere flows: supply times production amount
    pub fn technosphere_flows(&self, fu: usize, scenario: usize) -> Option<Vec<f64>> {
        let supply = self.supply(fu, scenario)?;
        let production = self.production.get(scenario)?;
        Some(supply.iter().zip(production).map(|(s, p)| s * p).collect())
    }

    pub fn characterized_biosphere(&self, method: usize, scenario: usize) -> Option<&[f64]> {
        self.characterized_biosphere
            .get(scenario)?
            .get(method)
            .map(Vec::as_slice)
    }

    pub fn characterization(&self, method: usize) -> Option<&[f64]> {
        self.characterization.get(method).map(Vec::as_slice)
    }

    /// Flows with a non-zero factor in at least one method
    pub fn characterized_flows(&self) -> Vec<bool> {
        (0..self.flows.len())
            .map(|e| {
                self.characterization
                    .iter()
                    .any(|c| c.get(e).is_some_and(|v| *v != 0.0))
            })
            .collect()
    }
}

/// Run every (scenario, fu, method) cell
pub fn build_results(
    engine: &mut dyn LcaEngine,
    setup: &ResolvedSetup,
    metadata: &MetaDataStore,
    checkpoint: &mut Checkpoint<'_>,
) -> Result<LcaResults, CalcError> {
    let fu_labels = (0..setup.fu_count())
        .map(|i| setup.fu_label(metadata, i))
        .collect();
    let mut cube = ScoreCube::new(
        fu_labels,
        setup.method_keys(),
        setup.method_units(),
        setup.scenario_names(),
    );
    let (n_fu, n_method, n_scenario) = cube.shape();
    let demands: Vec<_> = setup.functional_units.iter().map(demand).collect();
    let total = n_fu * n_method * n_scenario;

    let mut supply = Vec::with_capacity(n_scenario);
    let mut inventory = Vec::with_capacity(n_scenario);
    let mut production = Vec::with_capacity(n_scenario);
    let mut characterized = Vec::with_capacity(n_scenario);
    let mut characterization = vec![Vec::new(); n_method];
    let mut done = 0;

    for k in 0..n_scenario {
        engine.set_scenario(setup.has_scenarios().then_some(k))?;
        production.push(engine.production_amounts());

        let mut per_method = Vec::with_capacity(n_method);
        for (j, c) in characterization.iter_mut().enumerate() {
            engine.set_method(j)?;
            per_method.push(engine.characterized_biosphere());
            if k == 0 {
                *c = engine.characterization().to_vec();
            }
        }
        characterized.push(per_method);

        let mut supply_k = Vec::with_capacity(n_fu);
        let mut inventory_k = Vec::with_capacity(n_fu);
        for (i, demand) in demands.iter().enumerate() {
            let solved = if i == 0 {
                engine.solve_lci(demand)
            } else {
                engine.redo_lci(demand)
            };
            match solved {
                Ok(()) => {
                    supply_k.push(Some(engine.supply().to_vec()));
                    inventory_k.push(Some(engine.inventory().to_vec()));
                    for j in 0..n_method {
                        engine.set_method(j)?;
                        let score = if j == 0 {
                            engine.lcia()?
                        } else {
                            engine.redo_lcia()?
                        };
                        cube.set(i, j, k, score);
                        done += 1;
                        checkpoint.step(done, total, &cube.fu_labels[i])?;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NumericFailure => {
                    let cell = CellIndex::fu_column(i, k);
                    tracing::debug!(%cell, error = %err, "LCI solve failed; column left as NaN");
                    cube.warnings.push(CellWarning {
                        cell,
                        message: err.to_string(),
                    });
                    supply_k.push(None);
                    inventory_k.push(None);
                    done += n_method;
                    checkpoint.step(done, total, &cube.fu_labels[i])?;
                }
                Err(err) => return Err(err.at(CellIndex::fu_column(i, k))),
            }
        }
        supply.push(supply_k);
        inventory.push(inventory_k);
    }

    let stats = engine.stats();
    tracing::debug!(
        cells = total,
        factorizations = stats.factorizations,
        redo_lci = stats.redo_lci,
        warnings = cube.warnings.len(),
        "score cube complete"
    );

    Ok(LcaResults {
        cube,
        activities: engine.activity_keys().to_vec(),
        flows: engine.flow_keys().to_vec(),
        supply,
        inventory,
        production,
        characterized_biosphere: characterized,
        characterization,
    })
}

/// Scores of every (fu, method) cell in the engine's current state
///
/// Used per Monte-Carlo iteration; failed solves give NaN.
pub fn score_matrix(
    engine: &mut dyn LcaEngine,
    demands: &[Vec<(FlowKey, f64)>],
    n_method: usize,
) -> Result<Vec<Vec<f64>>, CalcError> {
    let mut scores = Vec::with_capacity(demands.len());
    for (i, demand) in demands.iter().enumerate() {
        let solved = if i == 0 {
            engine.solve_lci(demand)
        } else {
            engine.redo_lci(demand)
        };
        let mut row = vec![f64::NAN; n_method];
        match solved {
            Ok(()) => {
                for (j, slot) in row.iter_mut().enumerate() {
                    engine.set_method(j)?;
                    *slot = if j == 0 {
                        engine.lcia()?
                    } else {
                        engine.redo_lcia()?
                    };
                }
            }
            Err(err) if err.kind() == ErrorKind::NumericFailure => {}
            Err(err) => return Err(err),
        }
        scores.push(row);
    }
    Ok(scores)
}

/// FU metadata columns of the score table
const SCORE_TABLE_FIELDS: &[&str] = &["reference product", "name", "location", "database"];

/// Wide score table: one row per functional unit, one column per method
/// (per method and scenario when scenarios exist)
///
/// With `normalized`, each column is divided by its largest absolute value.
pub fn score_table(
    results: &LcaResults,
    setup: &ResolvedSetup,
    metadata: &MetaDataStore,
    normalized: bool,
) -> Frame {
    let cube = &results.cube;
    let (n_fu, n_method, n_scenario) = cube.shape();
    let mut columns: Vec<String> = vec!["amount".into(), "unit".into()];
    columns.extend(SCORE_TABLE_FIELDS.iter().map(|s| s.to_string()));
    let mut cells = Vec::new();
    for j in 0..n_method {
        for k in 0..n_scenario {
            let label = if setup.has_scenarios() {
                format!("{} | {}", cube.methods[j].label(), cube.scenarios[k])
            } else {
                cube.methods[j].label()
            };
            columns.push(label);
            cells.push((j, k));
        }
    }

    let maxima: Vec<f64> = cells
        .iter()
        .map(|&(j, k)| {
            (0..n_fu)
                .map(|i| cube.get(i, j, k).abs())
                .filter(|v| v.is_finite())
                .fold(0.0, f64::max)
        })
        .collect();

    let title = if normalized { "scores (normalized)" } else { "scores" };
    let mut frame = Frame::new(title, columns);
    for (i, fu) in setup.functional_units.iter().enumerate() {
        let mut row = vec![Cell::from(fu.total_amount())];
        match fu.reference() {
            Some(entry) => {
                row.push(Cell::from(metadata.field(&entry.key, "unit")));
                for field in SCORE_TABLE_FIELDS {
                    row.push(Cell::from(metadata.field(&entry.key, field)));
                }
            }
            None => row.extend((0..=SCORE_TABLE_FIELDS.len()).map(|_| Cell::Empty)),
        }
        for (c, &(j, k)) in cells.iter().enumerate() {
            let value = cube.get(i, j, k);
            row.push(Cell::from(if normalized {
                if maxima[c] == 0.0 {
                    f64::NAN
                } else {
                    value / maxima[c]
                }
            } else {
                value
            }));
        }
        frame.push_row(row);
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::engine::MatrixEngine;
    use crate::calc::setup::resolve_setup;
    use crate::core::store::MemoryStore;
    use crate::entities::{Activity, CalculationSetup, Database, Exchange, ExchangeType, Method};

    fn key(code: &str) -> FlowKey {
        FlowKey::new("db", code)
    }

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        let mut db = Database::new("db");
        db.activities.push(
            Activity::new("db", "a", "A")
                .with_exchange(Exchange::new(key("b"), 0.5, ExchangeType::Technosphere))
                .with_exchange(Exchange::new(key("e1"), 1.0, ExchangeType::Biosphere)),
        );
        db.activities.push(
            Activity::new("db", "b", "B")
                .with_exchange(Exchange::new(key("e1"), 4.0, ExchangeType::Biosphere)),
        );
        let mut e1 = Activity::new("db", "e1", "Carbon dioxide");
        e1.kind = "emission".into();
        db.activities.push(e1);
        store.add_database(db);
        store.add_method(Method::new(MethodKey::new(["GWP"]), "kg CO2 eq").with_cf(key("e1"), 1.0));
        store.add_method(Method::new(MethodKey::new(["Ten"]), "pt").with_cf(key("e1"), 10.0));
        store.add_setup(
            CalculationSetup::new("two")
                .with_fu(key("a"), 1.0)
                .with_fu(key("b"), 2.0)
                .with_method(MethodKey::new(["GWP"]))
                .with_method(MethodKey::new(["Ten"])),
        );
        store
    }

    fn run() -> (ResolvedSetup, MetaDataStore, LcaResults, MatrixEngine) {
        let setup = resolve_setup(&store(), "two", None).unwrap();
        let metadata = setup.metadata();
        let mut engine = MatrixEngine::build(&setup).unwrap();
        let results =
            build_results(&mut engine, &setup, &metadata, &mut Checkpoint::none()).unwrap();
        (setup, metadata, results, engine)
    }

    #[test]
    fn test_cube_shape_and_values() {
        let (_, _, results, engine) = run();
        let cube = &results.cube;
        assert_eq!(cube.shape(), (2, 2, 1));
        assert!((cube.get(0, 0, 0) - 3.0).abs() < 1e-12);
        assert!((cube.get(0, 1, 0) - 30.0).abs() < 1e-12);
        assert!((cube.get(1, 0, 0) - 8.0).abs() < 1e-12);
        assert!(cube.score(2, 0, 0).is_err());
        assert!(!cube.has_warnings());

        let stats = engine.stats();
        assert_eq!(stats.solve_lci, 1);
        assert_eq!(stats.redo_lci, 1);
        assert_eq!(stats.factorizations, 1);
    }

    #[test]
    fn test_vectors_are_kept() {
        let (_, _, results, _) = run();
        assert_eq!(results.supply(0, 0).unwrap(), &[1.0, 0.5]);
        assert_eq!(results.characterized_biosphere(1, 0).unwrap(), &[10.0, 40.0]);
        assert_eq!(results.technosphere_flows(1, 0).unwrap(), vec![0.0, 2.0]);
        assert_eq!(results.characterized_flows(), vec![true]);
    }

    #[test]
    fn test_long_frame_and_score_table() {
        let (setup, metadata, results, _) = run();
        let long = results.cube.to_frame();
        assert_eq!(long.columns, vec!["fu", "method", "scenario", "score"]);
        assert_eq!(long.rows.len(), 4);

        let table = score_table(&results, &setup, &metadata, true);
        assert_eq!(table.number(0, "GWP"), Some(3.0 / 8.0));
        assert_eq!(table.number(1, "Ten"), Some(1.0));
        assert_eq!(table.number(1, "amount"), Some(2.0));
    }

    #[test]
    fn test_cancelled_run() {
        let setup = resolve_setup(&store(), "two", None).unwrap();
        let metadata = setup.metadata();
        let mut engine = MatrixEngine::build(&setup).unwrap();
        let mut checkpoint = Checkpoint::none();
        checkpoint.token().cancel();
        let err = build_results(&mut engine, &setup, &metadata, &mut checkpoint).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}
