//! First-tier contributions - direct impact plus cumulative impact of each input
//!
//! Every technosphere input of the reference activity is re-solved on its
//! own, scaled to the demanded amount; whatever the inputs do not explain is
//! attributed to the reference activity itself. One re-solve per input serves
//! all methods, and results are cached per (fu, method, scenario).

use serde::Serialize;
use std::collections::HashMap;

use crate::calc::driver::LcaResults;
use crate::calc::engine::LcaEngine;
use crate::calc::setup::ResolvedSetup;
use crate::core::error::{CalcError, CellIndex};
use crate::core::formula::Formula;
use crate::core::identity::FlowKey;
use crate::core::progress::Checkpoint;
use crate::entities::{Activity, Exchange};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FirstTierResult {
    pub score: f64,
    /// Σ|input contributions| + |remainder|
    pub range: f64,
    /// Input products, then the reference activity with the remainder
    pub entries: Vec<(FlowKey, f64)>,
}

impl FirstTierResult {
    fn failed() -> Self {
        Self {
            score: f64::NAN,
            range: f64::NAN,
            entries: Vec::new(),
        }
    }

    pub fn remainder(&self) -> Option<f64> {
        self.entries.last().map(|(_, v)| *v)
    }
}

/// Cached first-tier results of one resolved setup
#[derive(Debug, Default)]
pub struct FirstTierCache {
    fingerprint: Option<String>,
    cells: HashMap<(usize, usize, usize), FirstTierResult>,
}

impl FirstTierCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop cached cells computed for a different setup; returns true when cleared
    pub fn ensure(&mut self, fingerprint: &str) -> bool {
        if self.fingerprint.as_deref() == Some(fingerprint) {
            return false;
        }
        let cleared = !self.cells.is_empty();
        self.cells.clear();
        self.fingerprint = Some(fingerprint.to_string());
        cleared
    }

    pub fn get(&self, fu: usize, method: usize, scenario: usize) -> Option<&FirstTierResult> {
        self.cells.get(&(fu, method, scenario))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    /// Fill every (fu, method) cell of scenario `k` that is not cached yet
    pub fn precompute(
        &mut self,
        engine: &mut dyn LcaEngine,
        setup: &ResolvedSetup,
        results: &LcaResults,
        scenario: usize,
        checkpoint: &mut Checkpoint<'_>,
    ) -> Result<(), CalcError> {
        let methods: Vec<usize> = (0..setup.method_count()).collect();
        for i in 0..setup.fu_count() {
            if methods.iter().all(|&j| self.cells.contains_key(&(i, j, scenario))) {
                continue;
            }
            let computed = compute(engine, setup, results, i, scenario, &methods, checkpoint)?;
            for (j, result) in methods.iter().zip(computed) {
                self.cells.insert((i, *j, scenario), result);
            }
        }
        tracing::debug!(scenario, cells = self.cells.len(), "first-tier cache filled");
        Ok(())
    }
}

/// First-tier result of a single cell, uncached
pub fn first_tier(
    engine: &mut dyn LcaEngine,
    setup: &ResolvedSetup,
    results: &LcaResults,
    fu: usize,
    method: usize,
    scenario: usize,
    checkpoint: &mut Checkpoint<'_>,
) -> Result<FirstTierResult, CalcError> {
    let mut computed = compute(engine, setup, results, fu, scenario, &[method], checkpoint)?;
    computed
        .pop()
        .ok_or_else(|| CalcError::numeric("no first-tier result", CellIndex::new(fu, method, scenario)))
}

fn compute(
    engine: &mut dyn LcaEngine,
    setup: &ResolvedSetup,
    results: &LcaResults,
    fu: usize,
    scenario: usize,
    methods: &[usize],
    checkpoint: &mut Checkpoint<'_>,
) -> Result<Vec<FirstTierResult>, CalcError> {
    if results.supply(fu, scenario).is_none() {
        return Ok(methods.iter().map(|_| FirstTierResult::failed()).collect());
    }
    let reference = setup
        .functional_units
        .get(fu)
        .and_then(|f| f.reference())
        .ok_or_else(|| CalcError::incompatible("Functional unit with an empty demand"))?;
    let activity = find_activity(setup, &reference.key)?;

    engine.set_scenario(setup.has_scenarios().then_some(scenario))?;
    let inputs = if setup.has_scenarios() {
        scenario_inputs(engine, activity, reference.amount)?
    } else {
        static_inputs(setup, activity, reference.amount)?
    };

    let scores: Vec<f64> = methods
        .iter()
        .map(|&j| results.cube.get(fu, j, scenario))
        .collect();
    let mut remainders = scores.clone();
    let mut ranges = vec![0.0; methods.len()];
    let mut entries: Vec<Vec<(FlowKey, f64)>> = vec![Vec::new(); methods.len()];

    let label = format!("first tier of {}", reference.key);
    for (n, (key, amount)) in inputs.iter().enumerate() {
        checkpoint.step(n + 1, inputs.len(), &label)?;
        engine
            .redo_lci(&[(key.clone(), *amount)])
            .map_err(|e| e.at(CellIndex::fu_column(fu, scenario)))?;
        for (m, &j) in methods.iter().enumerate() {
            engine.set_method(j)?;
            let score = engine.redo_lcia()?;
            if score != 0.0 {
                entries[m].push((key.clone(), score));
                ranges[m] += score.abs();
                remainders[m] -= score;
            }
        }
    }

    Ok(scores
        .into_iter()
        .zip(remainders)
        .zip(ranges)
        .zip(entries)
        .map(|(((score, remainder), range), mut entries)| {
            if score == 0.0 {
                return FirstTierResult {
                    score,
                    range: 0.0,
                    entries: vec![(reference.key.clone(), 0.0)],
                };
            }
            entries.push((reference.key.clone(), remainder));
            FirstTierResult {
                score,
                range: range + remainder.abs(),
                entries,
            }
        })
        .collect())
}

fn find_activity<'a>(setup: &'a ResolvedSetup, key: &FlowKey) -> Result<&'a Activity, CalcError> {
    setup
        .activities
        .binary_search_by(|a| a.key().cmp(key))
        .map(|idx| &setup.activities[idx])
        .map_err(|_| CalcError::FlowNotFound(key.clone()))
}

fn is_first_tier_input(activity: &Activity, exchange: &Exchange) -> bool {
    exchange.input != activity.key()
}

/// Stored exchange amounts scaled by demand over production
fn static_inputs(
    setup: &ResolvedSetup,
    activity: &Activity,
    demand: f64,
) -> Result<Vec<(FlowKey, f64)>, CalcError> {
    let params: HashMap<String, f64> = setup
        .parameters
        .iter()
        .map(|p| (p.name.clone(), p.amount))
        .collect();
    let scale = demand / activity.production_amount();
    let mut inputs: Vec<(FlowKey, f64)> = Vec::new();
    for exc in activity
        .technosphere()
        .filter(|e| is_first_tier_input(activity, e))
    {
        let amount = match &exc.formula {
            Some(source) => Formula::parse(source)?.eval(&params)?,
            None => exc.amount,
        } * scale;
        match inputs.iter_mut().find(|(k, _)| k == &exc.input) {
            Some((_, total)) => *total += amount,
            None => inputs.push((exc.input.clone(), amount)),
        }
    }
    inputs.retain(|(_, amount)| *amount != 0.0);
    Ok(inputs)
}

/// Amounts read from the scenario technosphere: `-T[in, r] / T[r, r] · demand`
fn scenario_inputs(
    engine: &dyn LcaEngine,
    activity: &Activity,
    demand: f64,
) -> Result<Vec<(FlowKey, f64)>, CalcError> {
    let key = activity.key();
    let col = engine
        .activity_index(&key)
        .ok_or_else(|| CalcError::FlowNotFound(key.clone()))?;
    let production = engine.technosphere_value(col, col);
    let scale = demand / production;
    let mut inputs: Vec<(FlowKey, f64)> = Vec::new();
    for exc in activity
        .technosphere()
        .filter(|e| is_first_tier_input(activity, e))
    {
        if inputs.iter().any(|(k, _)| k == &exc.input) {
            continue;
        }
        let row = engine
            .activity_index(&exc.input)
            .ok_or_else(|| CalcError::FlowNotFound(exc.input.clone()))?;
        let amount = -engine.technosphere_value(row, col) * scale;
        if amount != 0.0 {
            inputs.push((exc.input.clone(), amount));
        }
    }
    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::driver::build_results;
    use crate::calc::engine::MatrixEngine;
    use crate::calc::setup::resolve_setup;
    use crate::core::identity::MethodKey;
    use crate::core::store::MemoryStore;
    use crate::entities::{CalculationSetup, Database, ExchangeType, Method};

    fn key(code: &str) -> FlowKey {
        FlowKey::new("db", code)
    }

    // a: 2 units of b and 1 of c, emits 1 co2; b emits 3; c emits 5
    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        let mut db = Database::new("db");
        db.activities.push(
            Activity::new("db", "a", "A")
                .with_exchange(Exchange::new(key("a"), 2.0, ExchangeType::Production))
                .with_exchange(Exchange::new(key("b"), 2.0, ExchangeType::Technosphere))
                .with_exchange(Exchange::new(key("c"), 1.0, ExchangeType::Technosphere))
                .with_exchange(Exchange::new(key("co2"), 1.0, ExchangeType::Biosphere)),
        );
        db.activities.push(
            Activity::new("db", "b", "B")
                .with_exchange(Exchange::new(key("co2"), 3.0, ExchangeType::Biosphere)),
        );
        db.activities.push(
            Activity::new("db", "c", "C")
                .with_exchange(Exchange::new(key("co2"), 5.0, ExchangeType::Biosphere)),
        );
        let mut co2 = Activity::new("db", "co2", "CO2");
        co2.kind = "emission".into();
        db.activities.push(co2);
        store.add_database(db);
        store.add_method(Method::new(MethodKey::new(["GWP"]), "kg").with_cf(key("co2"), 1.0));
        store.add_method(Method::new(MethodKey::new(["Half"]), "kg").with_cf(key("co2"), 0.5));
        store.add_setup(
            CalculationSetup::new("s")
                .with_fu(key("a"), 4.0)
                .with_method(MethodKey::new(["GWP"]))
                .with_method(MethodKey::new(["Half"])),
        );
        store
    }

    fn prepared() -> (ResolvedSetup, LcaResults, MatrixEngine) {
        let setup = resolve_setup(&store(), "s", None).unwrap();
        let metadata = setup.metadata();
        let mut engine = MatrixEngine::build(&setup).unwrap();
        let results = build_results(&mut engine, &setup, &metadata, &mut Checkpoint::none()).unwrap();
        (setup, results, engine)
    }

    #[test]
    fn test_inputs_and_remainder() {
        let (setup, results, mut engine) = prepared();
        // 4 units of a = 2 runs: 4 b (12), 2 c (10), direct 2
        let r = first_tier(&mut engine, &setup, &results, 0, 0, 0, &mut Checkpoint::none()).unwrap();
        assert!((r.score - 24.0).abs() < 1e-9);
        assert_eq!(r.entries.len(), 3);
        assert_eq!(r.entries[0].0, key("b"));
        assert!((r.entries[0].1 - 12.0).abs() < 1e-9);
        assert!((r.entries[1].1 - 10.0).abs() < 1e-9);
        assert!((r.remainder().unwrap() - 2.0).abs() < 1e-9);
        assert!((r.range - 24.0).abs() < 1e-9);
        let total: f64 = r.entries.iter().map(|(_, v)| v).sum();
        assert!((total - r.score).abs() < 1e-9);
    }

    #[test]
    fn test_precompute_fills_all_methods_once() {
        let (setup, results, mut engine) = prepared();
        let before = engine.stats();
        let mut cache = FirstTierCache::new();
        cache.ensure(&setup.fingerprint());
        cache
            .precompute(&mut engine, &setup, &results, 0, &mut Checkpoint::none())
            .unwrap();
        assert_eq!(cache.len(), 2);
        let after = engine.stats();
        assert_eq!(after.redo_lci - before.redo_lci, 2);
        assert_eq!(after.redo_lcia - before.redo_lcia, 4);

        let half = cache.get(0, 1, 0).unwrap();
        assert!((half.score - 12.0).abs() < 1e-9);

        cache
            .precompute(&mut engine, &setup, &results, 0, &mut Checkpoint::none())
            .unwrap();
        assert_eq!(engine.stats().redo_lci, after.redo_lci);
    }

    #[test]
    fn test_cache_invalidated_by_fingerprint() {
        let (setup, results, mut engine) = prepared();
        let mut cache = FirstTierCache::new();
        assert!(!cache.ensure(&setup.fingerprint()));
        cache
            .precompute(&mut engine, &setup, &results, 0, &mut Checkpoint::none())
            .unwrap();
        assert!(!cache.ensure(&setup.fingerprint()));
        assert!(cache.ensure("other"));
        assert!(cache.is_empty());
    }
}
