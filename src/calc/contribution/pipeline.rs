//! Contribution pipeline shared by every contribution kind
//!
//! ```text
//! columns of (contributor, value)
//!   -> union rows (first appearance order, zero = NaN)
//!   -> optional group-by sum on a metadata field
//!   -> cut-off per column, dropped values summed into Rest (+) / Rest (-)
//!   -> drop all-NaN rows, stable sort by mean square
//!   -> Score, Rest (+), Rest (-) on top
//!   -> optional division by score or range
//! ```

use std::collections::{BTreeMap, HashMap};

use super::{ContributionRow, Cutoff, RowKind, TotalMode};
use crate::core::error::CalcError;
use crate::core::identity::FlowKey;
use crate::core::metadata::MetaDataStore;

/// One compared column before the pipeline runs
#[derive(Debug, Clone)]
pub struct ColumnInput {
    pub label: String,
    pub unit: String,
    /// Column score; NaN when the cell failed
    pub score: f64,
    /// Contributor values in contributor order
    pub values: Vec<(FlowKey, f64)>,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions<'a> {
    pub cutoff: Cutoff,
    pub relative: bool,
    pub total_mode: TotalMode,
    pub aggregator: Option<&'a str>,
    /// Metadata fields shown per contributor row
    pub fields: &'a [&'a str],
}

/// Rows plus the metadata column names they carry
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub metadata_columns: Vec<String>,
    pub rows: Vec<ContributionRow>,
}

struct WideRow {
    label: String,
    key: Option<FlowKey>,
    metadata: Vec<String>,
    values: Vec<f64>,
}

pub fn run(
    columns: &[ColumnInput],
    metadata: &MetaDataStore,
    options: &PipelineOptions<'_>,
) -> Result<PipelineOutput, CalcError> {
    options.cutoff.validate()?;
    let n = columns.len();

    // Union of contributors, first appearance order
    let mut order: Vec<FlowKey> = Vec::new();
    let mut position: HashMap<FlowKey, usize> = HashMap::new();
    let mut cells: Vec<Vec<f64>> = Vec::new();
    for (c, column) in columns.iter().enumerate() {
        for (key, value) in &column.values {
            if *value == 0.0 || !value.is_finite() {
                continue;
            }
            let row = *position.entry(key.clone()).or_insert_with(|| {
                order.push(key.clone());
                cells.push(vec![f64::NAN; n]);
                order.len() - 1
            });
            let cell = &mut cells[row][c];
            *cell = if cell.is_nan() { *value } else { *cell + value };
        }
    }

    let (metadata_columns, mut rows) = match options.aggregator {
        None => {
            let rows: Vec<WideRow> = order
                .iter()
                .zip(cells)
                .map(|(key, values)| WideRow {
                    label: metadata.label(key, options.fields),
                    key: Some(key.clone()),
                    metadata: options.fields.iter().map(|f| metadata.field(key, f)).collect(),
                    values,
                })
                .collect();
            (options.fields.iter().map(|f| f.to_string()).collect(), rows)
        }
        Some(field) => {
            let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
            for (key, values) in order.iter().zip(cells) {
                let group = groups
                    .entry(metadata.field(key, field))
                    .or_insert_with(|| vec![f64::NAN; n]);
                for (acc, v) in group.iter_mut().zip(values) {
                    if !v.is_nan() {
                        *acc = if acc.is_nan() { v } else { *acc + v };
                    }
                }
            }
            let rows: Vec<WideRow> = groups
                .into_iter()
                .map(|(label, values)| WideRow {
                    metadata: vec![label.clone()],
                    label,
                    key: None,
                    values,
                })
                .collect();
            (vec![field.to_string()], rows)
        }
    };

    // Σ|x| of the rows as grouped, taken before any value goes to Rest
    let ranges: Vec<f64> = (0..n)
        .map(|c| {
            if !columns[c].score.is_finite() {
                return f64::NAN;
            }
            rows.iter()
                .map(|r| r.values[c])
                .filter(|v| v.is_finite())
                .map(f64::abs)
                .sum()
        })
        .collect();

    // Cut-off per column
    let mut rest_positive = vec![0.0; n];
    let mut rest_negative = vec![0.0; n];
    for c in 0..n {
        if !columns[c].score.is_finite() {
            for row in rows.iter_mut() {
                row.values[c] = f64::NAN;
            }
            rest_positive[c] = f64::NAN;
            rest_negative[c] = f64::NAN;
            continue;
        }
        let column: Vec<f64> = rows.iter().map(|r| r.values[c]).collect();
        let total = match options.total_mode {
            TotalMode::Score => column.iter().filter(|v| v.is_finite()).sum::<f64>(),
            TotalMode::Range => ranges[c],
        };
        let keep = options.cutoff.select(&column, total)?;
        for (row, kept) in rows.iter_mut().zip(keep) {
            let value = row.values[c];
            if kept || !value.is_finite() {
                continue;
            }
            if value > 0.0 {
                rest_positive[c] += value;
            } else {
                rest_negative[c] += value;
            }
            row.values[c] = f64::NAN;
        }
    }

    rows.retain(|r| r.values.iter().any(|v| !v.is_nan()));
    let strength: Vec<f64> = rows.iter().map(|r| mean_square(&r.values)).collect();
    let mut ranked: Vec<(f64, WideRow)> = strength.into_iter().zip(rows).collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

    let scores: Vec<f64> = columns.iter().map(|c| c.score).collect();
    let divisors: Vec<f64> = match options.total_mode {
        TotalMode::Score => scores.clone(),
        TotalMode::Range => ranges,
    };
    let normalize = |values: Vec<f64>| -> Vec<f64> {
        if !options.relative {
            return values;
        }
        values
            .into_iter()
            .zip(&divisors)
            .map(|(v, d)| if *d == 0.0 || d.is_nan() { f64::NAN } else { v / d })
            .collect()
    };

    let blank = vec![String::new(); metadata_columns.len()];
    let mut out = vec![
        ContributionRow::synthetic(RowKind::Score, blank.clone(), normalize(scores)),
        ContributionRow::synthetic(RowKind::RestPositive, blank.clone(), normalize(rest_positive)),
        ContributionRow::synthetic(RowKind::RestNegative, blank, normalize(rest_negative)),
    ];
    out.extend(ranked.into_iter().map(|(_, row)| ContributionRow {
        label: row.label,
        kind: RowKind::Contributor,
        key: row.key,
        metadata: row.metadata,
        values: normalize(row.values),
    }));

    Ok(PipelineOutput {
        metadata_columns,
        rows: out,
    })
}

/// nanmean of squares; NaN rows sort last
fn mean_square(values: &[f64]) -> f64 {
    let present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if present.is_empty() {
        return f64::NEG_INFINITY;
    }
    present.iter().map(|v| v * v).sum::<f64>() / present.len() as f64
}
