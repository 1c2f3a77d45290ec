//! Global sensitivity analysis over Monte Carlo samples
//!
//! Inputs are filtered by their deterministic contribution, then the
//! sampled score of one (fu, method) is regressed on the z-scored input
//! samples. Reported per input: standardized regression coefficient (SRC)
//! and Spearman rank correlation, ranked by |SRC|.

use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use crate::calc::engine::{InputKind, UncertainInput};
use crate::calc::montecarlo::McResult;
use crate::core::error::{check_index, CalcError};
use crate::core::frame::{Cell, Frame};
use crate::core::identity::FlowKey;
use crate::core::metadata::MetaDataStore;

const SVD_EPS: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GsaOptions {
    pub fu: usize,
    pub method: usize,
    /// Fraction of |score| a technosphere cell must exceed
    pub cutoff_technosphere: f64,
    /// Fraction of |score| a biosphere cell must exceed
    pub cutoff_biosphere: f64,
}

impl GsaOptions {
    pub fn new(fu: usize, method: usize) -> Self {
        Self {
            fu,
            method,
            cutoff_technosphere: 0.01,
            cutoff_biosphere: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GsaRow {
    pub rank: usize,
    pub name: String,
    pub kind: InputKind,
    /// Index into [`McResult::inputs`]
    pub input: usize,
    pub amount: f64,
    /// Deterministic contribution to the score; NaN for parameters
    pub contribution: f64,
    pub src: f64,
    pub spearman: f64,
}

impl GsaRow {
    pub fn direction(&self) -> &'static str {
        if self.src >= 0.0 {
            "+"
        } else {
            "-"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GsaResult {
    pub fu: usize,
    pub method: usize,
    pub fu_label: String,
    pub method_label: String,
    pub cutoff_technosphere: f64,
    pub cutoff_biosphere: f64,
    /// Iterations left after removing NaN scores
    pub iterations_used: usize,
    /// Inputs of this cell and the sampled kinds removed by the cut-offs or for constant samples
    pub inputs_dropped: usize,
    pub log_transformed: bool,
    pub r_squared: f64,
    pub rows: Vec<GsaRow>,
}

impl GsaResult {
    pub fn to_frame(&self) -> Frame {
        let mut frame = Frame::new(
            &format!("GSA {} | {}", self.fu_label, self.method_label),
            [
                "rank",
                "input",
                "type",
                "amount",
                "contribution",
                "src",
                "spearman",
                "direction",
            ],
        );
        for row in &self.rows {
            frame.push_row(vec![
                Cell::Number(row.rank as f64),
                Cell::from(row.name.as_str()),
                Cell::from(row.kind.to_string()),
                Cell::from(row.amount),
                Cell::from(row.contribution),
                Cell::from(row.src),
                Cell::from(row.spearman),
                Cell::from(row.direction()),
            ]);
        }
        frame
    }
}

pub fn run_gsa(
    mc: &McResult,
    metadata: &MetaDataStore,
    options: &GsaOptions,
) -> Result<GsaResult, CalcError> {
    let (_, n_fu, n_method) = mc.shape();
    check_index("functional unit", options.fu, n_fu)?;
    check_index("method", options.method, n_method)?;
    for (name, value) in [
        ("cutoff_technosphere", options.cutoff_technosphere),
        ("cutoff_biosphere", options.cutoff_biosphere),
    ] {
        if !(0.0..1.0).contains(&value) {
            return Err(CalcError::invalid(name, "must lie in [0, 1)"));
        }
    }

    let base_score = mc.baseline.scores[options.fu][options.method];
    let contributions = &mc.baseline.contributions[options.fu][options.method];
    // Sampled inputs that can move this cell's score
    let eligible: Vec<usize> = mc
        .inputs
        .iter()
        .enumerate()
        .filter(|(_, input)| {
            mc.include.includes(input.kind)
                && (input.kind != InputKind::Characterization || input.col == options.method)
        })
        .map(|(idx, _)| idx)
        .collect();
    let candidates: Vec<usize> = eligible
        .iter()
        .copied()
        .filter(|&idx| {
            let input = &mc.inputs[idx];
            let contribution = contributions[idx].abs();
            match input.kind {
                InputKind::Technosphere => {
                    contribution.is_nan() || contribution > options.cutoff_technosphere * base_score.abs()
                }
                InputKind::Biosphere => {
                    contribution.is_nan() || contribution > options.cutoff_biosphere * base_score.abs()
                }
                InputKind::Characterization | InputKind::Parameter => true,
            }
        })
        .collect();

    let scores = mc.by_fu_method(options.fu, options.method)?;
    let samples: Vec<Vec<f64>> = candidates
        .iter()
        .map(|&idx| mc.input_samples(idx))
        .collect::<Result<_, _>>()?;
    let usable: Vec<usize> = (0..scores.len())
        .filter(|&it| scores[it].is_finite() && samples.iter().all(|s| s[it].is_finite()))
        .collect();

    let y: Vec<f64> = usable.iter().map(|&it| scores[it]).collect();
    let mut kept: Vec<(usize, Vec<f64>)> = Vec::new();
    for (idx, column) in candidates.iter().zip(samples) {
        let x: Vec<f64> = usable.iter().map(|&it| column[it]).collect();
        if std_dev(&x) > 0.0 {
            kept.push((*idx, x));
        }
    }
    let inputs_dropped = eligible.len() - kept.len();

    if kept.is_empty() {
        return Err(CalcError::Insufficient(
            "no uncertain inputs left after the cut-offs; lower the cut-offs or include more input types".into(),
        ));
    }
    let (n, p) = (y.len(), kept.len());
    if n < p + 2 {
        return Err(CalcError::Insufficient(format!(
            "{} usable iterations for {} inputs; run at least {} iterations",
            n,
            p,
            p + 2
        )));
    }

    let (y, log_transformed) = log_transform(y);
    let zy = zscore(&y).ok_or_else(|| {
        CalcError::Insufficient("the sampled score does not vary across iterations".into())
    })?;
    let mut design = DMatrix::<f64>::zeros(n, p);
    for (c, (_, x)) in kept.iter().enumerate() {
        // constant columns were dropped above
        let z = zscore(x).unwrap_or_else(|| vec![0.0; n]);
        for (r, v) in z.into_iter().enumerate() {
            design[(r, c)] = v;
        }
    }

    let target = DVector::from_vec(zy.clone());
    let svd = design.clone().svd(true, true);
    if svd.rank(SVD_EPS) < p {
        return Err(CalcError::Insufficient(
            "input samples are linearly dependent; the regression is singular".into(),
        ));
    }
    let beta = svd
        .solve(&target, SVD_EPS)
        .map_err(|e| CalcError::Insufficient(format!("regression failed: {}", e)))?;
    let fitted = &design * &beta;
    let ss_res: f64 = fitted.iter().zip(&zy).map(|(f, y)| (y - f).powi(2)).sum();
    let ss_tot: f64 = zy.iter().map(|y| y * y).sum();
    let r_squared = 1.0 - ss_res / ss_tot;

    let y_ranks = ranks(&y);
    let mut rows: Vec<GsaRow> = kept
        .iter()
        .enumerate()
        .map(|(c, (idx, x))| {
            let input = &mc.inputs[*idx];
            GsaRow {
                rank: 0,
                name: input_name(input, metadata),
                kind: input.kind,
                input: *idx,
                amount: input.amount,
                contribution: contributions[*idx],
                src: beta[c],
                spearman: pearson(&ranks(x), &y_ranks),
            }
        })
        .collect();
    rows.sort_by(|a, b| b.src.abs().total_cmp(&a.src.abs()));
    for (r, row) in rows.iter_mut().enumerate() {
        row.rank = r + 1;
    }

    tracing::debug!(
        fu = options.fu,
        method = options.method,
        inputs = p,
        iterations = n,
        r_squared,
        "sensitivity analysis complete"
    );

    Ok(GsaResult {
        fu: options.fu,
        method: options.method,
        fu_label: mc.fu_labels[options.fu].clone(),
        method_label: mc.methods[options.method].label(),
        cutoff_technosphere: options.cutoff_technosphere,
        cutoff_biosphere: options.cutoff_biosphere,
        iterations_used: n,
        inputs_dropped,
        log_transformed,
        r_squared,
        rows,
    })
}

/// `ln y` when every sample is positive, `-ln|y|` when every sample is negative
fn log_transform(y: Vec<f64>) -> (Vec<f64>, bool) {
    if y.iter().all(|v| *v > 0.0) {
        (y.iter().map(|v| v.ln()).collect(), true)
    } else if y.iter().all(|v| *v < 0.0) {
        (y.iter().map(|v| -v.abs().ln()).collect(), true)
    } else {
        (y, false)
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

fn zscore(values: &[f64]) -> Option<Vec<f64>> {
    let sd = std_dev(values);
    if sd == 0.0 || !sd.is_finite() {
        return None;
    }
    let m = mean(values);
    Some(values.iter().map(|v| (v - m) / sd).collect())
}

/// 1-based ranks; ties share their average rank
fn ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let mut out = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        let rank = (start + end + 1) as f64 / 2.0;
        for &i in &order[start..end] {
            out[i] = rank;
        }
        start = end;
    }
    out
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let (ma, mb) = (mean(a), mean(b));
    let cov: f64 = a.iter().zip(b).map(|(x, y)| (x - ma) * (y - mb)).sum();
    let va: f64 = a.iter().map(|x| (x - ma).powi(2)).sum();
    let vb: f64 = b.iter().map(|y| (y - mb).powi(2)).sum();
    if va == 0.0 || vb == 0.0 {
        return f64::NAN;
    }
    cov / (va.sqrt() * vb.sqrt())
}

fn describe(metadata: &MetaDataStore, key: &FlowKey) -> String {
    let name = metadata.field(key, "name");
    let product = metadata.field(key, "reference product");
    let location = metadata.field(key, "location");
    let mut out = if name.is_empty() { key.to_string() } else { name };
    if !product.is_empty() {
        out.push_str(&format!(" ({})", product));
    }
    if !location.is_empty() {
        out.push_str(&format!(" [{}]", location));
    }
    out
}

/// Readable name of a sampled input
pub fn input_name(input: &UncertainInput, metadata: &MetaDataStore) -> String {
    match input.kind {
        InputKind::Technosphere => {
            let (Some(from), Some(to)) = (&input.input, &input.output) else {
                return "T: ?".into();
            };
            let product = metadata.field(from, "reference product");
            let location = metadata.field(from, "location");
            let mut source = if product.is_empty() {
                metadata.field(from, "name")
            } else {
                product
            };
            source.push_str(&format!(" FROM {}", metadata.field(from, "name")));
            if !location.is_empty() {
                source.push_str(&format!(" [{}]", location));
            }
            format!("T: {} TO {}", source, describe(metadata, to))
        }
        InputKind::Biosphere => {
            let (Some(flow), Some(to)) = (&input.input, &input.output) else {
                return "B: ?".into();
            };
            format!("B: {} // {}", metadata.label(flow, &["name"]), describe(metadata, to))
        }
        InputKind::Characterization => match &input.input {
            Some(flow) => {
                let categories = metadata.field(flow, "categories");
                if categories.is_empty() {
                    format!("CF: {}", metadata.label(flow, &["name"]))
                } else {
                    format!("CF: {} ({})", metadata.label(flow, &["name"]), categories)
                }
            }
            None => "CF: ?".into(),
        },
        InputKind::Parameter => format!("P: {}", input.name.as_deref().unwrap_or("?")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::engine::MatrixEngine;
    use crate::calc::montecarlo::{run_mc, IncludeFlags, McOptions};
    use crate::calc::setup::resolve_setup;
    use crate::core::error::ErrorKind;
    use crate::core::identity::MethodKey;
    use crate::core::progress::Checkpoint;
    use crate::core::store::MemoryStore;
    use crate::entities::{
        Activity, CalculationSetup, Database, Exchange, ExchangeType, Method, Uncertainty,
    };

    fn key(code: &str) -> FlowKey {
        FlowKey::new("db", code)
    }

    fn flow(code: &str, name: &str) -> Activity {
        let mut act = Activity::new("db", code, name);
        act.kind = "emission".into();
        act.categories = vec!["air".into()];
        act
    }

    fn mc(iterations: usize) -> (McResult, MetaDataStore) {
        mc_with(iterations, false)
    }

    /// With `second_method`, a CED method whose methane factor is uncertain
    fn mc_with(iterations: usize, second_method: bool) -> (McResult, MetaDataStore) {
        let mut store = MemoryStore::new();
        let mut db = Database::new("db");
        let mut a = Activity::new("db", "a", "steel production")
            .with_exchange(
                Exchange::new(key("co2"), 10.0, ExchangeType::Biosphere)
                    .with_uncertainty(Uncertainty::uniform(5.0, 15.0)),
            )
            .with_exchange(
                Exchange::new(key("ch4"), 1.0, ExchangeType::Biosphere)
                    .with_uncertainty(Uncertainty::uniform(0.9, 1.1)),
            );
        a.reference_product = Some("steel".into());
        a.location = Some("DE".into());
        db.activities.push(a);
        db.activities.push(flow("co2", "Carbon dioxide"));
        db.activities.push(flow("ch4", "Methane"));
        store.add_database(db);
        store.add_method(
            Method::new(MethodKey::new(["GWP"]), "kg")
                .with_cf(key("co2"), 1.0)
                .with_cf(key("ch4"), 1.0),
        );
        let mut setup = CalculationSetup::new("s")
            .with_fu(key("a"), 1.0)
            .with_method(MethodKey::new(["GWP"]));
        if second_method {
            let mut ced = Method::new(MethodKey::new(["CED"]), "MJ").with_cf(key("ch4"), 1.0);
            ced.cfs[0].uncertainty = Uncertainty::uniform(0.5, 1.5);
            store.add_method(ced);
            setup = setup.with_method(MethodKey::new(["CED"]));
        }
        store.add_setup(setup);
        let setup = resolve_setup(&store, "s", None).unwrap();
        let metadata = setup.metadata();
        let mut engine = MatrixEngine::build(&setup).unwrap();
        let options = McOptions::new(iterations).seed(11).include(IncludeFlags::default());
        let result = run_mc(&mut engine, &setup, &metadata, &options, &mut Checkpoint::none()).unwrap();
        (result, metadata)
    }

    #[test]
    fn test_ranks_dominant_input_first() {
        let (mc, metadata) = mc(200);
        let result = run_gsa(&mc, &metadata, &GsaOptions::new(0, 0)).unwrap();
        assert_eq!(result.rows.len(), 2);
        assert!(result.log_transformed);
        assert_eq!(result.rows[0].rank, 1);
        assert_eq!(result.rows[0].name, "B: Carbon dioxide // steel production (steel) [DE]");
        assert!(result.rows[0].src > result.rows[1].src.abs());
        assert!(result.rows[0].spearman > 0.9);
        assert!(result.r_squared > 0.8);
        assert_eq!(result.to_frame().rows.len(), 2);
    }

    #[test]
    fn test_cutoff_removes_small_inputs() {
        let (mc, metadata) = mc(50);
        let options = GsaOptions {
            cutoff_biosphere: 0.5,
            ..GsaOptions::new(0, 0)
        };
        let result = run_gsa(&mc, &metadata, &options).unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.inputs_dropped, 1);
    }

    #[test]
    fn test_dropped_count_ignores_other_methods() {
        let (mc, metadata) = mc_with(50, true);
        assert_eq!(mc.inputs.len(), 3);
        let options = GsaOptions {
            cutoff_biosphere: 0.5,
            ..GsaOptions::new(0, 0)
        };
        let result = run_gsa(&mc, &metadata, &options).unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.inputs_dropped, 1);
    }

    #[test]
    fn test_too_few_iterations() {
        let (mc, metadata) = mc(3);
        let err = run_gsa(&mc, &metadata, &GsaOptions::new(0, 0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Insufficient);
        assert!(run_gsa(&mc, &metadata, &GsaOptions::new(1, 0)).is_err());
    }

    #[test]
    fn test_ranks_average_ties() {
        assert_eq!(ranks(&[3.0, 1.0, 3.0, 2.0]), vec![3.5, 1.0, 3.5, 2.0]);
        assert!((pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]) - 1.0).abs() < 1e-12);
    }
}
