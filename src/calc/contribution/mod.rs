//! Contribution engine - elementary, process and first-tier contribution tables
//!
//! Every kind produces `(contributor, value)` columns for the compared axis;
//! the shared [`pipeline`] turns them into a [`ContributionFrame`].

pub mod cutoff;
pub mod first_tier;
pub mod pipeline;

use serde::{Deserialize, Serialize};

pub use cutoff::{Cutoff, LimitType};
pub use first_tier::{FirstTierCache, FirstTierResult};

use crate::calc::driver::LcaResults;
use crate::calc::engine::LcaEngine;
use crate::calc::setup::ResolvedSetup;
use crate::core::config::ContributionDefaults;
use crate::core::error::{check_index, CalcError, CellIndex};
use crate::core::frame::{Cell, Frame};
use crate::core::identity::FlowKey;
use crate::core::metadata::{
    MetaDataStore, ACTIVITY_AGGREGATORS, ACTIVITY_FIELDS, FLOW_AGGREGATORS, FLOW_FIELDS,
};
use crate::core::progress::Checkpoint;
use pipeline::{ColumnInput, PipelineOptions};

pub const UNIT_RELATIVE: &str = "relative share";
pub const UNIT_PER_METHOD: &str = "units of each impact category";

/// Base of relative values and of the cut-off total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TotalMode {
    /// Signed column total
    #[default]
    Score,
    /// Sum of absolute contributions
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ContributionKind {
    /// Characterized elementary flows
    Elementary,
    /// Characterized impact of each process in the supply vector
    Process,
    /// Direct impact plus the cumulative impact of every input product
    FirstTier,
}

impl ContributionKind {
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            ContributionKind::Elementary => FLOW_FIELDS,
            ContributionKind::Process | ContributionKind::FirstTier => ACTIVITY_FIELDS,
        }
    }

    pub fn aggregators(&self) -> &'static [&'static str] {
        match self {
            ContributionKind::Elementary => FLOW_AGGREGATORS,
            ContributionKind::Process | ContributionKind::FirstTier => ACTIVITY_AGGREGATORS,
        }
    }
}

impl std::fmt::Display for ContributionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContributionKind::Elementary => write!(f, "elementary flow contributions"),
            ContributionKind::Process => write!(f, "process contributions"),
            ContributionKind::FirstTier => write!(f, "first-tier contributions"),
        }
    }
}

/// Compared axis, with the other two axes fixed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "compare", rename_all = "snake_case")]
pub enum Compare {
    FunctionalUnits { method: usize, scenario: usize },
    Methods { fu: usize, scenario: usize },
    Scenarios { fu: usize, method: usize },
}

impl Compare {
    /// Cells of the compared columns, in axis order
    fn cells(&self, setup: &ResolvedSetup) -> Result<Vec<CellIndex>, CalcError> {
        let (n_fu, n_method, n_scenario) = (
            setup.fu_count(),
            setup.method_count(),
            setup.scenario_count(),
        );
        match *self {
            Compare::FunctionalUnits { method, scenario } => {
                check_index("method", method, n_method)?;
                check_index("scenario", scenario, n_scenario)?;
                Ok((0..n_fu).map(|i| CellIndex::new(i, method, scenario)).collect())
            }
            Compare::Methods { fu, scenario } => {
                check_index("functional unit", fu, n_fu)?;
                check_index("scenario", scenario, n_scenario)?;
                Ok((0..n_method).map(|j| CellIndex::new(fu, j, scenario)).collect())
            }
            Compare::Scenarios { fu, method } => {
                if !setup.has_scenarios() {
                    return Err(CalcError::incompatible(
                        "Comparing scenarios requires a scenario matrix",
                    ));
                }
                check_index("functional unit", fu, n_fu)?;
                check_index("method", method, n_method)?;
                Ok((0..n_scenario).map(|k| CellIndex::new(fu, method, k)).collect())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContributionRequest {
    pub kind: ContributionKind,
    pub compare: Compare,
    pub cutoff: Cutoff,
    pub relative: bool,
    pub total_mode: TotalMode,
    pub aggregator: Option<String>,
}

impl ContributionRequest {
    pub fn new(kind: ContributionKind, compare: Compare) -> Self {
        Self::from_defaults(kind, compare, &ContributionDefaults::default())
    }

    pub fn from_defaults(
        kind: ContributionKind,
        compare: Compare,
        defaults: &ContributionDefaults,
    ) -> Self {
        Self {
            kind,
            compare,
            cutoff: Cutoff {
                limit: defaults.cutoff,
                limit_type: defaults.limit_type,
            },
            relative: defaults.relative,
            total_mode: defaults.total_mode,
            aggregator: None,
        }
    }

    pub fn with_cutoff(mut self, cutoff: Cutoff) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn relative(mut self, relative: bool) -> Self {
        self.relative = relative;
        self
    }

    pub fn total_mode(mut self, mode: TotalMode) -> Self {
        self.total_mode = mode;
        self
    }

    pub fn aggregate_by(mut self, field: impl Into<String>) -> Self {
        self.aggregator = Some(field.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowKind {
    Score,
    RestPositive,
    RestNegative,
    Contributor,
}

impl RowKind {
    pub fn label(&self) -> &'static str {
        match self {
            RowKind::Score => "Score",
            RowKind::RestPositive => "Rest (+)",
            RowKind::RestNegative => "Rest (-)",
            RowKind::Contributor => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContributionRow {
    pub label: String,
    pub kind: RowKind,
    /// Contributor key; `None` for synthetic and aggregated rows
    pub key: Option<FlowKey>,
    pub metadata: Vec<String>,
    pub values: Vec<f64>,
}

impl ContributionRow {
    fn synthetic(kind: RowKind, metadata: Vec<String>, values: Vec<f64>) -> Self {
        Self {
            label: kind.label().to_string(),
            kind,
            key: None,
            metadata,
            values,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContributionFrame {
    pub kind: ContributionKind,
    pub compare: Compare,
    pub metadata_columns: Vec<String>,
    /// Compared axis labels
    pub columns: Vec<String>,
    pub unit: String,
    pub relative: bool,
    pub total_mode: TotalMode,
    /// Compared columns carry different units
    pub relative_only: bool,
    /// Synthetic rows first, then contributors
    pub rows: Vec<ContributionRow>,
}

impl ContributionFrame {
    fn synthetic(&self, kind: RowKind) -> &[f64] {
        self.rows
            .iter()
            .find(|r| r.kind == kind)
            .map(|r| r.values.as_slice())
            .unwrap_or(&[])
    }

    pub fn score(&self) -> &[f64] {
        self.synthetic(RowKind::Score)
    }

    pub fn rest_positive(&self) -> &[f64] {
        self.synthetic(RowKind::RestPositive)
    }

    pub fn rest_negative(&self) -> &[f64] {
        self.synthetic(RowKind::RestNegative)
    }

    pub fn contributors(&self) -> impl Iterator<Item = &ContributionRow> {
        self.rows.iter().filter(|r| r.kind == RowKind::Contributor)
    }

    pub fn row(&self, label: &str) -> Option<&ContributionRow> {
        self.rows.iter().find(|r| r.label == label)
    }

    pub fn row_for(&self, key: &FlowKey) -> Option<&ContributionRow> {
        self.rows.iter().find(|r| r.key.as_ref() == Some(key))
    }

    /// `index | metadata... | unit | one column per compared element`
    pub fn to_frame(&self) -> Frame {
        let columns = std::iter::once("index".to_string())
            .chain(self.metadata_columns.iter().cloned())
            .chain(std::iter::once("unit".to_string()))
            .chain(self.columns.iter().cloned());
        let mut frame = Frame::new(&self.kind.to_string(), columns);
        for row in &self.rows {
            let mut cells = vec![Cell::from(row.label.as_str())];
            cells.extend(row.metadata.iter().map(|m| Cell::from(m.as_str())));
            cells.push(match row.kind {
                RowKind::Contributor => Cell::from(self.unit.as_str()),
                _ => Cell::Empty,
            });
            cells.extend(row.values.iter().map(|v| Cell::from(*v)));
            frame.push_row(cells);
        }
        frame
    }
}

/// Everything a contribution request reads
pub struct ContributionContext<'a> {
    pub setup: &'a ResolvedSetup,
    pub results: &'a LcaResults,
    pub metadata: &'a MetaDataStore,
}

/// Single entrypoint for all contribution kinds
///
/// The engine and cache are only touched for first-tier requests.
pub fn contributions(
    ctx: &ContributionContext<'_>,
    engine: &mut dyn LcaEngine,
    cache: &mut FirstTierCache,
    request: &ContributionRequest,
    checkpoint: &mut Checkpoint<'_>,
) -> Result<ContributionFrame, CalcError> {
    request.cutoff.validate()?;
    if let Some(field) = &request.aggregator {
        let known = request.kind.aggregators().contains(&field.as_str())
            || request.kind.fields().contains(&field.as_str());
        if !known {
            return Err(CalcError::invalid(
                "aggregator",
                format!(
                    "'{}' is not a {} field; use one of: {}",
                    field,
                    request.kind,
                    request.kind.aggregators().join(", ")
                ),
            ));
        }
    }

    let cells = request.compare.cells(ctx.setup)?;
    let cube = &ctx.results.cube;
    let units: Vec<String> = cells
        .iter()
        .map(|c| cube.units[c.method.unwrap_or(0)].clone())
        .collect();
    let relative_only = units.iter().any(|u| u != &units[0]);
    if relative_only && !request.relative {
        let mut distinct: Vec<String> = Vec::new();
        for u in &units {
            if !distinct.contains(u) {
                distinct.push(u.clone());
            }
        }
        return Err(CalcError::MixedUnits { units: distinct });
    }

    let unit = if request.relative {
        UNIT_RELATIVE.to_string()
    } else if matches!(request.compare, Compare::Methods { .. }) {
        UNIT_PER_METHOD.to_string()
    } else {
        units.first().cloned().unwrap_or_default()
    };

    if request.kind == ContributionKind::FirstTier {
        let scenarios: Vec<usize> = {
            let mut ks: Vec<usize> = cells.iter().filter_map(|c| c.scenario).collect();
            ks.dedup();
            ks
        };
        cache.ensure(&ctx.setup.fingerprint());
        for k in scenarios {
            cache.precompute(engine, ctx.setup, ctx.results, k, checkpoint)?;
        }
    }

    let mut columns = Vec::with_capacity(cells.len());
    for (cell, unit) in cells.iter().zip(units) {
        let (i, j, k) = (
            cell.fu.unwrap_or(0),
            cell.method.unwrap_or(0),
            cell.scenario.unwrap_or(0),
        );
        let label = match request.compare {
            Compare::FunctionalUnits { .. } => cube.fu_labels[i].clone(),
            Compare::Methods { .. } => cube.methods[j].label(),
            Compare::Scenarios { .. } => cube.scenarios[k].clone(),
        };
        let score = cube.get(i, j, k);
        let values = match request.kind {
            ContributionKind::Elementary => elementary_values(ctx.results, i, j, k),
            ContributionKind::Process => process_values(ctx.results, i, j, k),
            ContributionKind::FirstTier => match cache.get(i, j, k) {
                Some(result) => result.entries.clone(),
                None => first_tier::first_tier(engine, ctx.setup, ctx.results, i, j, k, checkpoint)?
                    .entries,
            },
        };
        columns.push(ColumnInput {
            label,
            unit,
            score,
            values,
        });
    }

    let options = PipelineOptions {
        cutoff: request.cutoff,
        relative: request.relative,
        total_mode: request.total_mode,
        aggregator: request.aggregator.as_deref(),
        fields: display_fields(request.kind),
    };
    let output = pipeline::run(&columns, ctx.metadata, &options)?;

    tracing::debug!(
        kind = %request.kind,
        columns = columns.len(),
        rows = output.rows.len(),
        relative = request.relative,
        "contribution table built"
    );

    Ok(ContributionFrame {
        kind: request.kind,
        compare: request.compare,
        metadata_columns: output.metadata_columns,
        columns: columns.into_iter().map(|c| c.label).collect(),
        unit,
        relative: request.relative,
        total_mode: request.total_mode,
        relative_only,
        rows: output.rows,
    })
}

/// Metadata fields shown per row; the unit column is the table unit
fn display_fields(kind: ContributionKind) -> &'static [&'static str] {
    match kind {
        ContributionKind::Elementary => &["name", "categories", "type", "database"],
        ContributionKind::Process | ContributionKind::FirstTier => {
            &["reference product", "name", "location", "database"]
        }
    }
}

/// `c_e · g_e` per biosphere flow
fn elementary_values(results: &LcaResults, i: usize, j: usize, k: usize) -> Vec<(FlowKey, f64)> {
    match (results.inventory(i, k), results.characterization(j)) {
        (Some(g), Some(c)) => results
            .flows
            .iter()
            .zip(g.iter().zip(c))
            .map(|(key, (g, c))| (key.clone(), g * c))
            .collect(),
        _ => Vec::new(),
    }
}

/// `(cᵀB)_p · s_p` per activity
fn process_values(results: &LcaResults, i: usize, j: usize, k: usize) -> Vec<(FlowKey, f64)> {
    match (results.supply(i, k), results.characterized_biosphere(j, k)) {
        (Some(s), Some(cb)) => results
            .activities
            .iter()
            .zip(s.iter().zip(cb))
            .map(|(key, (s, cb))| (key.clone(), s * cb))
            .collect(),
        _ => Vec::new(),
    }
}
