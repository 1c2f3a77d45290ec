//! Impact assessment method entity

use serde::{Deserialize, Serialize};

use crate::core::identity::{FlowKey, MethodKey};
use crate::entities::uncertainty::Uncertainty;

/// Characterization factor for one elementary flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterizationFactor {
    pub flow: FlowKey,

    pub amount: f64,

    #[serde(flatten)]
    pub uncertainty: Uncertainty,
}

impl CharacterizationFactor {
    pub fn new(flow: FlowKey, amount: f64) -> Self {
        Self {
            flow,
            amount,
            uncertainty: Uncertainty::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Method {
    pub name: MethodKey,

    #[serde(default)]
    pub unit: String,

    #[serde(default)]
    pub cfs: Vec<CharacterizationFactor>,
}

impl Method {
    pub fn new(name: MethodKey, unit: &str) -> Self {
        Self {
            name,
            unit: unit.to_string(),
            cfs: Vec::new(),
        }
    }

    pub fn with_cf(mut self, flow: FlowKey, amount: f64) -> Self {
        self.cfs.push(CharacterizationFactor::new(flow, amount));
        self
    }

    /// Characterization factor of a flow, summed when listed twice
    pub fn factor(&self, flow: &FlowKey) -> Option<f64> {
        let mut found = None;
        for cf in self.cfs.iter().filter(|cf| &cf.flow == flow) {
            *found.get_or_insert(0.0) += cf.amount;
        }
        found
    }
}
