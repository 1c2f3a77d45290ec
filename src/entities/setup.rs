//! Calculation setup entity - functional units and methods to compute

use serde::{Deserialize, Serialize};

use crate::core::identity::{FlowKey, MethodKey};

/// One reference flow of a functional unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandEntry {
    pub key: FlowKey,
    pub amount: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FunctionalUnitRepr {
    Single(DemandEntry),
    Multi(Vec<DemandEntry>),
}

/// Demand vector: activity keys with amounts, usually a single entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "FunctionalUnitRepr")]
pub struct FunctionalUnit(pub Vec<DemandEntry>);

impl From<FunctionalUnitRepr> for FunctionalUnit {
    fn from(repr: FunctionalUnitRepr) -> Self {
        match repr {
            FunctionalUnitRepr::Single(entry) => FunctionalUnit(vec![entry]),
            FunctionalUnitRepr::Multi(entries) => FunctionalUnit(entries),
        }
    }
}

impl FunctionalUnit {
    pub fn single(key: FlowKey, amount: f64) -> Self {
        FunctionalUnit(vec![DemandEntry { key, amount }])
    }

    pub fn entries(&self) -> &[DemandEntry] {
        &self.0
    }

    /// First (reference) activity of the demand
    pub fn reference(&self) -> Option<&DemandEntry> {
        self.0.first()
    }

    pub fn total_amount(&self) -> f64 {
        self.0.iter().map(|e| e.amount).sum()
    }
}

/// Named pairing of functional units and impact methods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationSetup {
    pub name: String,

    #[serde(default)]
    pub inv: Vec<FunctionalUnit>,

    #[serde(default)]
    pub ia: Vec<MethodKey>,
}

impl CalculationSetup {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inv: Vec::new(),
            ia: Vec::new(),
        }
    }

    pub fn with_fu(mut self, key: FlowKey, amount: f64) -> Self {
        self.inv.push(FunctionalUnit::single(key, amount));
        self
    }

    pub fn with_method(mut self, method: MethodKey) -> Self {
        self.ia.push(method);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_functional_unit_single_and_multi_yaml() {
        let yaml = r#"
name: basic
inv:
  - key: [fg, a]
    amount: 2
  - - key: [fg, a]
      amount: 1
    - key: [fg, b]
      amount: 3
ia:
  - [IPCC, GWP]
"#;
        let setup: CalculationSetup = serde_yml::from_str(yaml).unwrap();
        assert_eq!(setup.inv.len(), 2);
        assert_eq!(setup.inv[0].entries().len(), 1);
        assert_eq!(setup.inv[1].total_amount(), 4.0);
        assert_eq!(
            setup.inv[1].reference().map(|e| e.key.clone()),
            Some(FlowKey::new("fg", "a"))
        );
        assert_eq!(setup.ia[0], MethodKey::new(["IPCC", "GWP"]));
    }
}
