//! LCA engine - matrix construction and solves
//!
//! [`LcaEngine`] is the seam between the driver and the linear algebra.
//! Callers see flat `f64` slices and key lists only; [`MatrixEngine`] is the
//! reference implementation on dense `nalgebra` matrices.
//!
//! ```text
//! T · s = f        technosphere solve (T: products x activities)
//! g = B · s        life cycle inventory (B: flows x activities)
//! score = c · g    characterization of the current method
//! ```

use nalgebra::{DMatrix, DVector, Dyn, LU};
use rand::rngs::StdRng;
use std::collections::HashMap;

use crate::calc::montecarlo::IncludeFlags;
use crate::calc::setup::ResolvedSetup;
use crate::core::error::{check_index, CalcError, CellIndex};
use crate::core::formula::Formula;
use crate::core::identity::{FlowKey, MethodKey};
use crate::entities::{ExchangeType, Uncertainty};

/// Which matrix a cell lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatrixKind {
    Technosphere,
    Biosphere,
}

/// Kind of a sampled model input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Technosphere,
    Biosphere,
    Characterization,
    Parameter,
}

impl std::fmt::Display for InputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputKind::Technosphere => write!(f, "technosphere"),
            InputKind::Biosphere => write!(f, "biosphere"),
            InputKind::Characterization => write!(f, "characterization"),
            InputKind::Parameter => write!(f, "parameter"),
        }
    }
}

/// An exchange, characterization factor or parameter with a stochastic distribution
///
/// `row`/`col` address the cell: technosphere `(product, activity)`,
/// biosphere `(flow, activity)`, characterization `(flow, method)`,
/// parameter `(parameter, 0)`.
#[derive(Debug, Clone)]
pub struct UncertainInput {
    pub kind: InputKind,
    pub row: usize,
    pub col: usize,
    /// Deterministic amount, unsigned as written in the store
    pub amount: f64,
    /// Sign applied when the amount enters its matrix
    pub sign: f64,
    pub uncertainty: Uncertainty,
    /// Exchange input, or characterized flow
    pub input: Option<FlowKey>,
    /// Exchange output activity
    pub output: Option<FlowKey>,
    /// Parameter name
    pub name: Option<String>,
    /// Amount is computed from a formula when parameters are sampled
    pub formula_driven: bool,
}

/// Call counters, for tests and tracing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolveStats {
    pub factorizations: usize,
    pub solve_lci: usize,
    pub redo_lci: usize,
    pub lcia: usize,
    pub redo_lcia: usize,
}

pub trait LcaEngine: Send {
    /// Technosphere activity keys, in matrix column order
    fn activity_keys(&self) -> &[FlowKey];

    /// Biosphere flow keys, in matrix row order
    fn flow_keys(&self) -> &[FlowKey];

    fn activity_index(&self, key: &FlowKey) -> Option<usize>;

    fn flow_index(&self, key: &FlowKey) -> Option<usize>;

    fn method_keys(&self) -> &[MethodKey];

    /// Factorize `T` and solve for `demand`
    fn solve_lci(&mut self, demand: &[(FlowKey, f64)]) -> Result<(), CalcError>;

    /// Solve for a new demand, reusing the factorization when matrices are unchanged
    fn redo_lci(&mut self, demand: &[(FlowKey, f64)]) -> Result<(), CalcError>;

    fn set_method(&mut self, method: usize) -> Result<(), CalcError>;

    fn lcia(&mut self) -> Result<f64, CalcError>;

    /// Re-apply the current method after `redo_lci`
    fn redo_lcia(&mut self) -> Result<f64, CalcError>;

    /// Swap matrices to scenario `k`; `None` restores the default matrices
    fn set_scenario(&mut self, scenario: Option<usize>) -> Result<(), CalcError>;

    fn score(&self) -> f64;

    /// Supply vector `s`
    fn supply(&self) -> &[f64];

    /// Inventory vector `g = B·s`
    fn inventory(&self) -> &[f64];

    /// Characterization vector of the current method, over flows
    fn characterization(&self) -> &[f64];

    /// `cᵀB` for the current method, over activities
    fn characterized_biosphere(&self) -> Vec<f64>;

    /// Solution `u` of `Tᵀu = Bᵀc`: score per unit of each product
    fn unit_scores(&mut self) -> Result<Vec<f64>, CalcError>;

    fn technosphere_value(&self, row: usize, col: usize) -> f64;

    fn biosphere_value(&self, row: usize, col: usize) -> f64;

    /// Diagonal of `T`: production amount of every activity
    fn production_amounts(&self) -> Vec<f64>;

    fn uncertain_inputs(&self) -> &[UncertainInput];

    /// Draw new matrix values; returns one value per uncertain input
    fn resample(&mut self, rng: &mut StdRng, include: &IncludeFlags) -> Result<Vec<f64>, CalcError>;

    /// Drop sampled values, back to the deterministic matrices of the current scenario
    fn restore(&mut self);

    fn stats(&self) -> SolveStats;
}

/// Scenario override of one matrix cell
#[derive(Debug, Clone)]
struct CellOverride {
    matrix: MatrixKind,
    row: usize,
    col: usize,
    values: Vec<Option<f64>>,
}

/// Exchange whose amount comes from a formula
#[derive(Debug, Clone)]
struct FormulaCell {
    matrix: MatrixKind,
    row: usize,
    col: usize,
    sign: f64,
    formula: Formula,
    amount: f64,
}

/// Dense reference engine
pub struct MatrixEngine {
    activities: Vec<FlowKey>,
    flows: Vec<FlowKey>,
    methods: Vec<MethodKey>,
    activity_index: HashMap<FlowKey, usize>,
    flow_index: HashMap<FlowKey, usize>,

    base_t: DMatrix<f64>,
    base_b: DMatrix<f64>,
    base_cfs: Vec<DVector<f64>>,
    det_t: DMatrix<f64>,
    det_b: DMatrix<f64>,
    t: DMatrix<f64>,
    b: DMatrix<f64>,
    cfs: Vec<DVector<f64>>,

    overrides: Vec<CellOverride>,
    scenario: Option<usize>,
    scenario_count: usize,

    inputs: Vec<UncertainInput>,
    formulas: Vec<FormulaCell>,
    parameters: Vec<(String, f64)>,

    lu: Option<LU<f64, Dyn, Dyn>>,
    lu_t: Option<LU<f64, Dyn, Dyn>>,
    /// Working matrices hold sampled values
    dirty: bool,
    method: usize,
    supply: DVector<f64>,
    inventory: DVector<f64>,
    score: f64,
    stats: SolveStats,
}

impl MatrixEngine {
    /// Build matrices for every activity and flow of a resolved setup
    pub fn build(setup: &ResolvedSetup) -> Result<Self, CalcError> {
        let activities: Vec<FlowKey> = setup
            .activities
            .iter()
            .filter(|a| a.is_process())
            .map(|a| a.key())
            .collect();
        let flows: Vec<FlowKey> = setup
            .activities
            .iter()
            .filter(|a| !a.is_process())
            .map(|a| a.key())
            .collect();
        let activity_index: HashMap<FlowKey, usize> = activities
            .iter()
            .enumerate()
            .map(|(i, k)| (k.clone(), i))
            .collect();
        let flow_index: HashMap<FlowKey, usize> = flows
            .iter()
            .enumerate()
            .map(|(i, k)| (k.clone(), i))
            .collect();

        let params: HashMap<String, f64> = setup
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.amount))
            .collect();

        let n = activities.len();
        let mut t = DMatrix::<f64>::zeros(n, n);
        let mut b = DMatrix::<f64>::zeros(flows.len(), n);
        let mut inputs = Vec::new();
        let mut formulas = Vec::new();

        for act in setup.activities.iter().filter(|a| a.is_process()) {
            let col = activity_index[&act.key()];
            let mut has_production = false;
            for exc in &act.exchanges {
                let amount = match &exc.formula {
                    Some(source) => Formula::parse(source)?.eval(&params)?,
                    None => exc.amount,
                };
                let (matrix, row, sign) = if exc.kind.is_technosphere_type() {
                    let row = match activity_index.get(&exc.input) {
                        Some(r) => *r,
                        None if flow_index.contains_key(&exc.input) => {
                            return Err(CalcError::incompatible(format!(
                                "{} exchange of {} points to biosphere flow {}",
                                exc.kind,
                                act.key(),
                                exc.input
                            )))
                        }
                        None => return Err(CalcError::FlowNotFound(exc.input.clone())),
                    };
                    if exc.kind == ExchangeType::Production {
                        has_production = true;
                    }
                    (MatrixKind::Technosphere, row, exc.kind.matrix_sign())
                } else {
                    let row = match flow_index.get(&exc.input) {
                        Some(r) => *r,
                        None if activity_index.contains_key(&exc.input) => {
                            return Err(CalcError::incompatible(format!(
                                "biosphere exchange of {} points to process {}",
                                act.key(),
                                exc.input
                            )))
                        }
                        None => return Err(CalcError::FlowNotFound(exc.input.clone())),
                    };
                    (MatrixKind::Biosphere, row, 1.0)
                };

                match matrix {
                    MatrixKind::Technosphere => t[(row, col)] += sign * amount,
                    MatrixKind::Biosphere => b[(row, col)] += sign * amount,
                }

                if let Some(source) = &exc.formula {
                    formulas.push(FormulaCell {
                        matrix,
                        row,
                        col,
                        sign,
                        formula: Formula::parse(source)?,
                        amount,
                    });
                }

                if exc.uncertainty.is_stochastic() {
                    inputs.push(UncertainInput {
                        kind: match matrix {
                            MatrixKind::Technosphere => InputKind::Technosphere,
                            MatrixKind::Biosphere => InputKind::Biosphere,
                        },
                        row,
                        col,
                        amount,
                        sign,
                        uncertainty: exc.uncertainty.clone(),
                        input: Some(exc.input.clone()),
                        output: Some(act.key()),
                        name: None,
                        formula_driven: exc.formula.is_some(),
                    });
                }
            }
            if !has_production {
                t[(col, col)] += 1.0;
            }
        }

        let mut cfs = Vec::with_capacity(setup.methods.len());
        for (m, method) in setup.methods.iter().enumerate() {
            let mut c = DVector::<f64>::zeros(flows.len());
            for cf in &method.cfs {
                // Flows outside the setup scope cannot contribute
                let Some(&row) = flow_index.get(&cf.flow) else {
                    continue;
                };
                c[row] += cf.amount;
                if cf.uncertainty.is_stochastic() {
                    inputs.push(UncertainInput {
                        kind: InputKind::Characterization,
                        row,
                        col: m,
                        amount: cf.amount,
                        sign: 1.0,
                        uncertainty: cf.uncertainty.clone(),
                        input: Some(cf.flow.clone()),
                        output: None,
                        name: None,
                        formula_driven: false,
                    });
                }
            }
            cfs.push(c);
        }

        let parameters: Vec<(String, f64)> = setup
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.amount))
            .collect();
        for (i, param) in setup.parameters.iter().enumerate() {
            if param.uncertainty.is_stochastic() {
                inputs.push(UncertainInput {
                    kind: InputKind::Parameter,
                    row: i,
                    col: 0,
                    amount: param.amount,
                    sign: 1.0,
                    uncertainty: param.uncertainty.clone(),
                    input: None,
                    output: None,
                    name: Some(param.name.clone()),
                    formula_driven: false,
                });
            }
        }

        let mut overrides = Vec::new();
        let scenario_count = setup.scenarios.as_ref().map(|s| s.scenario_count()).unwrap_or(0);
        if let Some(matrix) = &setup.scenarios {
            for row in matrix.rows() {
                let Some(&col) = activity_index.get(&row.output) else {
                    continue;
                };
                let target = if row.kind.is_technosphere_type() {
                    activity_index
                        .get(&row.input)
                        .map(|&r| (MatrixKind::Technosphere, r))
                } else {
                    flow_index.get(&row.input).map(|&r| (MatrixKind::Biosphere, r))
                };
                let Some((kind, r)) = target else {
                    continue;
                };
                overrides.push(CellOverride {
                    matrix: kind,
                    row: r,
                    col,
                    values: (0..scenario_count).map(|k| row.matrix_amount(k)).collect(),
                });
            }
        }

        tracing::debug!(
            activities = n,
            flows = flows.len(),
            methods = cfs.len(),
            uncertain = inputs.len(),
            overrides = overrides.len(),
            "built technosphere and biosphere matrices"
        );

        Ok(Self {
            methods: setup.method_keys(),
            activities,
            flows,
            activity_index,
            flow_index,
            det_t: t.clone(),
            det_b: b.clone(),
            t: t.clone(),
            b: b.clone(),
            base_t: t,
            base_b: b,
            cfs: cfs.clone(),
            base_cfs: cfs,
            overrides,
            scenario: None,
            scenario_count,
            inputs,
            formulas,
            parameters,
            lu: None,
            lu_t: None,
            dirty: false,
            method: 0,
            supply: DVector::zeros(n),
            inventory: DVector::zeros(0),
            score: 0.0,
            stats: SolveStats::default(),
        })
    }

    pub fn current_scenario(&self) -> Option<usize> {
        self.scenario
    }

    fn demand_vector(&self, demand: &[(FlowKey, f64)]) -> Result<DVector<f64>, CalcError> {
        let mut f = DVector::<f64>::zeros(self.activities.len());
        for (key, amount) in demand {
            let idx = self
                .activity_index
                .get(key)
                .ok_or_else(|| CalcError::FlowNotFound(key.clone()))?;
            f[*idx] += amount;
        }
        Ok(f)
    }

    fn factorize(&mut self) {
        self.lu = Some(self.t.clone().lu());
        self.lu_t = None;
        self.stats.factorizations += 1;
    }

    fn solve(&mut self, demand: &[(FlowKey, f64)]) -> Result<(), CalcError> {
        let f = self.demand_vector(demand)?;
        let lu = self
            .lu
            .as_ref()
            .ok_or_else(|| CalcError::numeric("technosphere not factorized", CellIndex::default()))?;
        let supply = lu
            .solve(&f)
            .filter(|s| s.iter().all(|v| v.is_finite()))
            .ok_or_else(|| {
                CalcError::numeric("technosphere matrix is singular", CellIndex::default())
            })?;
        self.inventory = &self.b * &supply;
        self.supply = supply;
        Ok(())
    }

    fn invalidate(&mut self) {
        self.lu = None;
        self.lu_t = None;
    }

    fn current_cfs(&self) -> Result<&DVector<f64>, CalcError> {
        self.cfs
            .get(self.method)
            .ok_or(CalcError::IndexOutOfRange {
                axis: "method",
                index: self.method,
                len: self.cfs.len(),
            })
    }
}

impl LcaEngine for MatrixEngine {
    fn activity_keys(&self) -> &[FlowKey] {
        &self.activities
    }

    fn flow_keys(&self) -> &[FlowKey] {
        &self.flows
    }

    fn activity_index(&self, key: &FlowKey) -> Option<usize> {
        self.activity_index.get(key).copied()
    }

    fn flow_index(&self, key: &FlowKey) -> Option<usize> {
        self.flow_index.get(key).copied()
    }

    fn method_keys(&self) -> &[MethodKey] {
        &self.methods
    }

    fn solve_lci(&mut self, demand: &[(FlowKey, f64)]) -> Result<(), CalcError> {
        self.factorize();
        self.stats.solve_lci += 1;
        self.solve(demand)
    }

    fn redo_lci(&mut self, demand: &[(FlowKey, f64)]) -> Result<(), CalcError> {
        if self.lu.is_none() {
            self.factorize();
        }
        self.stats.redo_lci += 1;
        self.solve(demand)
    }

    fn set_method(&mut self, method: usize) -> Result<(), CalcError> {
        check_index("method", method, self.cfs.len())?;
        self.method = method;
        Ok(())
    }

    fn lcia(&mut self) -> Result<f64, CalcError> {
        self.stats.lcia += 1;
        self.score = self.current_cfs()?.dot(&self.inventory);
        Ok(self.score)
    }

    fn redo_lcia(&mut self) -> Result<f64, CalcError> {
        self.stats.redo_lcia += 1;
        self.score = self.current_cfs()?.dot(&self.inventory);
        Ok(self.score)
    }

    fn set_scenario(&mut self, scenario: Option<usize>) -> Result<(), CalcError> {
        if let Some(k) = scenario {
            check_index("scenario", k, self.scenario_count)?;
        }
        if scenario == self.scenario {
            self.restore();
            return Ok(());
        }
        let mut t = self.base_t.clone();
        let mut b = self.base_b.clone();
        if let Some(k) = scenario {
            for o in &self.overrides {
                if let Some(v) = o.values[k] {
                    match o.matrix {
                        MatrixKind::Technosphere => t[(o.row, o.col)] = v,
                        MatrixKind::Biosphere => b[(o.row, o.col)] = v,
                    }
                }
            }
        }
        tracing::trace!(?scenario, "switched scenario matrices");
        self.t = t.clone();
        self.b = b.clone();
        self.det_t = t;
        self.det_b = b;
        self.cfs = self.base_cfs.clone();
        self.scenario = scenario;
        self.dirty = false;
        self.invalidate();
        Ok(())
    }

    fn score(&self) -> f64 {
        self.score
    }

    fn supply(&self) -> &[f64] {
        self.supply.as_slice()
    }

    fn inventory(&self) -> &[f64] {
        self.inventory.as_slice()
    }

    fn characterization(&self) -> &[f64] {
        self.cfs
            .get(self.method)
            .map(|c| c.as_slice())
            .unwrap_or(&[])
    }

    fn characterized_biosphere(&self) -> Vec<f64> {
        match self.cfs.get(self.method) {
            Some(c) => (self.b.transpose() * c).as_slice().to_vec(),
            None => vec![0.0; self.activities.len()],
        }
    }

    fn unit_scores(&mut self) -> Result<Vec<f64>, CalcError> {
        if self.lu_t.is_none() {
            self.lu_t = Some(self.t.transpose().lu());
            self.stats.factorizations += 1;
        }
        let rhs = self.b.transpose() * self.current_cfs()?;
        let lu_t = self
            .lu_t
            .as_ref()
            .ok_or_else(|| CalcError::numeric("transposed factorization missing", CellIndex::default()))?;
        lu_t.solve(&rhs)
            .filter(|u| u.iter().all(|v| v.is_finite()))
            .map(|u| u.as_slice().to_vec())
            .ok_or_else(|| CalcError::numeric("technosphere matrix is singular", CellIndex::default()))
    }

    fn technosphere_value(&self, row: usize, col: usize) -> f64 {
        self.t.get((row, col)).copied().unwrap_or(0.0)
    }

    fn biosphere_value(&self, row: usize, col: usize) -> f64 {
        self.b.get((row, col)).copied().unwrap_or(0.0)
    }

    fn production_amounts(&self) -> Vec<f64> {
        self.t.diagonal().as_slice().to_vec()
    }

    fn uncertain_inputs(&self) -> &[UncertainInput] {
        &self.inputs
    }

    fn resample(&mut self, rng: &mut StdRng, include: &IncludeFlags) -> Result<Vec<f64>, CalcError> {
        self.t = self.det_t.clone();
        self.b = self.det_b.clone();
        self.cfs = self.base_cfs.clone();

        let mut params: HashMap<String, f64> = HashMap::new();
        let mut values = Vec::with_capacity(self.inputs.len());
        for input in &self.inputs {
            let sampled = match input.kind {
                InputKind::Technosphere
                    if include.technosphere && !(include.parameters && input.formula_driven) =>
                {
                    input.uncertainty.sample(input.amount, rng)
                }
                InputKind::Biosphere
                    if include.biosphere && !(include.parameters && input.formula_driven) =>
                {
                    input.uncertainty.sample(input.amount, rng)
                }
                InputKind::Characterization if include.characterization => {
                    input.uncertainty.sample(input.amount, rng)
                }
                InputKind::Parameter if include.parameters => {
                    input.uncertainty.sample(input.amount, rng)
                }
                _ => input.amount,
            };
            let delta = input.sign * (sampled - input.amount);
            match input.kind {
                InputKind::Technosphere => self.t[(input.row, input.col)] += delta,
                InputKind::Biosphere => self.b[(input.row, input.col)] += delta,
                InputKind::Characterization => self.cfs[input.col][input.row] += delta,
                InputKind::Parameter => {
                    if let Some(name) = &input.name {
                        params.insert(name.clone(), sampled);
                    }
                }
            }
            values.push(sampled);
        }

        if include.parameters && !self.formulas.is_empty() {
            // Deterministic parameters keep their stored amounts
            for (name, amount) in &self.parameters {
                params.entry(name.clone()).or_insert(*amount);
            }
            for cell in &self.formulas {
                let value = cell.formula.eval(&params)?;
                let delta = cell.sign * (value - cell.amount);
                match cell.matrix {
                    MatrixKind::Technosphere => self.t[(cell.row, cell.col)] += delta,
                    MatrixKind::Biosphere => self.b[(cell.row, cell.col)] += delta,
                }
            }
        }

        self.dirty = true;
        self.invalidate();
        Ok(values)
    }

    fn restore(&mut self) {
        if !self.dirty {
            return;
        }
        self.t = self.det_t.clone();
        self.b = self.det_b.clone();
        self.cfs = self.base_cfs.clone();
        self.dirty = false;
        self.invalidate();
    }

    fn stats(&self) -> SolveStats {
        self.stats
    }
}
