//! Project parameter entity

use serde::{Deserialize, Serialize};

use crate::entities::uncertainty::Uncertainty;

/// Named scalar referenced by exchange formulas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,

    pub amount: f64,

    #[serde(flatten)]
    pub uncertainty: Uncertainty,
}

impl Parameter {
    pub fn new(name: &str, amount: f64) -> Self {
        Self {
            name: name.to_string(),
            amount,
            uncertainty: Uncertainty::default(),
        }
    }

    pub fn with_uncertainty(mut self, uncertainty: Uncertainty) -> Self {
        self.uncertainty = uncertainty;
        self
    }
}
