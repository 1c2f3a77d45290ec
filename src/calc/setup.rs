//! Setup resolver - turns a named calculation setup into validated inputs
//!
//! Resolution loads the setup, its methods and every activity of the
//! databases the functional units reach (through `depends` and through
//! exchange inputs), then aligns an optional scenario matrix to that scope.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashSet, VecDeque};

use crate::core::error::CalcError;
use crate::core::identity::{FlowKey, MethodKey};
use crate::core::metadata::{FlowMetadata, MetaDataStore, ACTIVITY_FIELDS};
use crate::core::scenario::ScenarioMatrix;
use crate::core::store::LcaStore;
use crate::entities::{Activity, CalculationSetup, FunctionalUnit, Method, Parameter};

/// Everything the driver needs, validated against the store
#[derive(Debug, Clone)]
pub struct ResolvedSetup {
    pub name: String,
    pub functional_units: Vec<FunctionalUnit>,
    pub methods: Vec<Method>,
    /// Included databases, sorted
    pub databases: Vec<String>,
    /// Every activity and flow of the included databases, sorted by key
    pub activities: Vec<Activity>,
    pub parameters: Vec<Parameter>,
    pub scenarios: Option<ScenarioMatrix>,
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    name: &'a str,
    functional_units: &'a [FunctionalUnit],
    methods: &'a [Method],
    databases: &'a [String],
    parameters: &'a [Parameter],
}

impl ResolvedSetup {
    pub fn fu_count(&self) -> usize {
        self.functional_units.len()
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Number of scenarios; a setup without scenarios has one implicit scenario
    pub fn scenario_count(&self) -> usize {
        self.scenarios
            .as_ref()
            .map(|s| s.scenario_count())
            .unwrap_or(1)
    }

    pub fn has_scenarios(&self) -> bool {
        self.scenarios.is_some()
    }

    pub fn scenario_names(&self) -> Vec<String> {
        match &self.scenarios {
            Some(s) => s.names().to_vec(),
            None => vec!["default".to_string()],
        }
    }

    pub fn method_keys(&self) -> Vec<MethodKey> {
        self.methods.iter().map(|m| m.name.clone()).collect()
    }

    pub fn method_units(&self) -> Vec<String> {
        self.methods.iter().map(|m| m.unit.clone()).collect()
    }

    pub fn metadata(&self) -> MetaDataStore {
        let mut store = MetaDataStore::new();
        for act in &self.activities {
            store.insert(act.key(), FlowMetadata::from_activity(act));
        }
        store
    }

    /// Label of functional unit `i` from its reference activities
    pub fn fu_label(&self, metadata: &MetaDataStore, i: usize) -> String {
        self.functional_units
            .get(i)
            .map(|fu| {
                fu.entries()
                    .iter()
                    .map(|e| metadata.label(&e.key, ACTIVITY_FIELDS))
                    .collect::<Vec<_>>()
                    .join(" + ")
            })
            .unwrap_or_default()
    }

    /// SHA-256 over the resolved inputs; invalidates first-tier caches
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        let input = FingerprintInput {
            name: &self.name,
            functional_units: &self.functional_units,
            methods: &self.methods,
            databases: &self.databases,
            parameters: &self.parameters,
        };
        if let Ok(json) = serde_json::to_vec(&input) {
            hasher.update(json);
        }
        for act in &self.activities {
            if let Ok(json) = serde_json::to_vec(act) {
                hasher.update(json);
            }
        }
        if let Some(scenarios) = &self.scenarios {
            hasher.update(scenarios.names().join("\u{1f}").as_bytes());
            for row in scenarios.rows() {
                hasher.update(row.input.to_string().as_bytes());
                hasher.update(row.output.to_string().as_bytes());
                for v in &row.values {
                    hasher.update(v.to_le_bytes());
                }
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Resolve a named setup against the store
pub fn resolve_setup(
    store: &dyn LcaStore,
    name: &str,
    scenarios: Option<ScenarioMatrix>,
) -> Result<ResolvedSetup, CalcError> {
    let setup = store.setup(name)?;
    resolve(store, setup, scenarios)
}

/// Resolve an in-memory setup against the store
pub fn resolve(
    store: &dyn LcaStore,
    setup: CalculationSetup,
    scenarios: Option<ScenarioMatrix>,
) -> Result<ResolvedSetup, CalcError> {
    if setup.inv.is_empty() {
        return Err(CalcError::incompatible(format!(
            "Setup '{}' has no functional units",
            setup.name
        )));
    }
    if setup.ia.is_empty() {
        return Err(CalcError::incompatible(format!(
            "Setup '{}' has no impact assessment methods",
            setup.name
        )));
    }

    let mut roots = BTreeSet::new();
    for fu in &setup.inv {
        if fu.entries().is_empty() {
            return Err(CalcError::incompatible("Functional unit with an empty demand"));
        }
        for entry in fu.entries() {
            let act = store.activity(&entry.key)?;
            if !act.is_process() {
                return Err(CalcError::incompatible(format!(
                    "Functional unit {} is a biosphere flow, not a process",
                    entry.key
                )));
            }
            roots.insert(entry.key.database().to_string());
        }
    }
    let total: f64 = setup.inv.iter().map(FunctionalUnit::total_amount).sum();
    if total == 0.0 {
        return Err(CalcError::incompatible(
            "Sum of reference flows equals 0; a calculation needs a non-zero demand",
        ));
    }

    let methods = setup
        .ia
        .iter()
        .map(|key| store.method(key))
        .collect::<Result<Vec<_>, _>>()?;

    let (databases, activities) = collect_databases(store, roots)?;

    let scenarios = match scenarios {
        Some(matrix) => Some(align_scenarios(matrix, &activities)?),
        None => None,
    };

    tracing::debug!(
        setup = %setup.name,
        fus = setup.inv.len(),
        methods = methods.len(),
        databases = databases.len(),
        activities = activities.len(),
        "resolved calculation setup"
    );

    Ok(ResolvedSetup {
        name: setup.name,
        functional_units: setup.inv,
        methods,
        databases,
        activities,
        parameters: store.parameters()?,
        scenarios,
    })
}

/// Databases reachable from `roots` through `depends` and exchange inputs
fn collect_databases(
    store: &dyn LcaStore,
    roots: BTreeSet<String>,
) -> Result<(Vec<String>, Vec<Activity>), CalcError> {
    let mut seen: BTreeSet<String> = roots.clone();
    let mut queue: VecDeque<String> = roots.into_iter().collect();
    let mut activities = Vec::new();

    while let Some(db) = queue.pop_front() {
        let info = store.database(&db)?;
        let mut next: BTreeSet<String> = info.depends.iter().cloned().collect();
        for act in store.activities_in(&db)? {
            for exc in &act.exchanges {
                next.insert(exc.input.database().to_string());
            }
            activities.push(act);
        }
        for dep in next {
            if seen.insert(dep.clone()) {
                queue.push_back(dep);
            }
        }
    }

    activities.sort_by_key(|a| a.key());
    Ok((seen.into_iter().collect(), activities))
}

/// Drop scenario rows whose keys are outside the resolved scope
fn align_scenarios(
    mut matrix: ScenarioMatrix,
    activities: &[Activity],
) -> Result<ScenarioMatrix, CalcError> {
    if matrix.scenario_count() == 0 {
        return Err(CalcError::incompatible("Scenario matrix has no scenarios"));
    }
    let known: HashSet<FlowKey> = activities.iter().map(Activity::key).collect();
    let processes: HashSet<FlowKey> = activities
        .iter()
        .filter(|a| a.is_process())
        .map(Activity::key)
        .collect();
    let dropped = matrix.retain(|row| known.contains(&row.input) && processes.contains(&row.output));
    if matrix.is_empty() {
        return Err(CalcError::incompatible(
            "Filtering unused flows removed all of the scenario data",
        ));
    }
    if dropped > 0 {
        tracing::debug!(dropped, "dropped scenario rows outside the setup");
    }
    Ok(matrix)
}
