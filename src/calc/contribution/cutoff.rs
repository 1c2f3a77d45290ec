//! Cut-off selection for one contribution column

use serde::{Deserialize, Serialize};

use crate::core::error::CalcError;

/// How the cut-off limit is read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LimitType {
    /// Keep contributors with `|x| >= limit * |total|`
    #[default]
    Percent,
    /// Keep the `limit` largest contributors by magnitude
    Number,
    /// Keep the largest positives and negatives until each reaches `limit` of the total
    CumPercent,
}

impl LimitType {
    pub fn validate(&self, limit: f64) -> Result<(), CalcError> {
        match self {
            LimitType::Percent | LimitType::CumPercent => {
                if !(limit > 0.0 && limit <= 1.0) {
                    return Err(CalcError::invalid(
                        "cutoff",
                        format!("percentage limits must lie in (0, 1], got {}", limit),
                    ));
                }
            }
            LimitType::Number => {
                if !(limit >= 1.0) || limit.fract() != 0.0 {
                    return Err(CalcError::invalid(
                        "cutoff",
                        format!("number limits must be a whole number >= 1, got {}", limit),
                    ));
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for LimitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitType::Percent => write!(f, "percent"),
            LimitType::Number => write!(f, "number"),
            LimitType::CumPercent => write!(f, "cum_percent"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cutoff {
    pub limit: f64,
    pub limit_type: LimitType,
}

impl Default for Cutoff {
    fn default() -> Self {
        Self::percent(0.05)
    }
}

impl Cutoff {
    pub fn percent(limit: f64) -> Self {
        Self {
            limit,
            limit_type: LimitType::Percent,
        }
    }

    pub fn number(limit: usize) -> Self {
        Self {
            limit: limit as f64,
            limit_type: LimitType::Number,
        }
    }

    pub fn cum_percent(limit: f64) -> Self {
        Self {
            limit,
            limit_type: LimitType::CumPercent,
        }
    }

    pub fn validate(&self) -> Result<(), CalcError> {
        self.limit_type.validate(self.limit)
    }

    /// Keep-mask over `values`; NaN and zero cells are never kept
    pub fn select(&self, values: &[f64], total: f64) -> Result<Vec<bool>, CalcError> {
        let present: Vec<usize> = (0..values.len())
            .filter(|&r| values[r].is_finite() && values[r] != 0.0)
            .collect();
        let mut keep = vec![false; values.len()];

        match self.limit_type {
            LimitType::Percent => {
                let threshold = total.abs() * self.limit;
                for r in present {
                    if values[r].abs() >= threshold {
                        keep[r] = true;
                    }
                }
            }
            LimitType::Number => {
                for r in by_magnitude(values, present).into_iter().take(self.limit as usize) {
                    keep[r] = true;
                }
            }
            LimitType::CumPercent => {
                if total == 0.0 || !total.is_finite() {
                    return Err(CalcError::incompatible(
                        "cumulative percentage cannot be calculated to a total of 0; use a different limit type",
                    ));
                }
                let ordered = by_magnitude(values, present);
                for positive in [true, false] {
                    let mut share = 0.0;
                    for &r in ordered.iter().filter(|&&r| (values[r] > 0.0) == positive) {
                        keep[r] = true;
                        share += (values[r] / total).abs();
                        if share >= self.limit {
                            break;
                        }
                    }
                }
            }
        }
        Ok(keep)
    }
}

/// Row indices by descending magnitude; ties keep row order
fn by_magnitude(values: &[f64], mut rows: Vec<usize>) -> Vec<usize> {
    rows.sort_by(|&a, &b| values[b].abs().total_cmp(&values[a].abs()));
    rows
}
