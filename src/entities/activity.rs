//! Activity entity - processes and biosphere flows with their exchanges

use serde::{Deserialize, Serialize};

use crate::core::identity::FlowKey;
use crate::entities::uncertainty::Uncertainty;

/// Exchange classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeType {
    Production,
    Technosphere,
    Biosphere,
    Substitution,
}

impl ExchangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeType::Production => "production",
            ExchangeType::Technosphere => "technosphere",
            ExchangeType::Biosphere => "biosphere",
            ExchangeType::Substitution => "substitution",
        }
    }

    /// Exchange lands in the technosphere matrix
    pub fn is_technosphere_type(&self) -> bool {
        !matches!(self, ExchangeType::Biosphere)
    }

    /// Sign applied when the amount enters the technosphere matrix
    pub fn matrix_sign(&self) -> f64 {
        match self {
            ExchangeType::Technosphere => -1.0,
            _ => 1.0,
        }
    }
}

impl std::fmt::Display for ExchangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ExchangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "production" => Ok(ExchangeType::Production),
            "technosphere" => Ok(ExchangeType::Technosphere),
            "biosphere" => Ok(ExchangeType::Biosphere),
            "substitution" => Ok(ExchangeType::Substitution),
            other => Err(format!("Unknown exchange type: {}", other)),
        }
    }
}

/// One edge between an input flow and the activity that owns it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub input: FlowKey,

    /// Filled in from the owning activity when loading
    #[serde(default, skip_serializing)]
    pub output: Option<FlowKey>,

    pub amount: f64,

    #[serde(rename = "type")]
    pub kind: ExchangeType,

    /// Arithmetic expression over project parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,

    #[serde(flatten)]
    pub uncertainty: Uncertainty,
}

impl Exchange {
    pub fn new(input: FlowKey, amount: f64, kind: ExchangeType) -> Self {
        Self {
            input,
            output: None,
            amount,
            kind,
            formula: None,
            uncertainty: Uncertainty::default(),
        }
    }

    pub fn with_uncertainty(mut self, uncertainty: Uncertainty) -> Self {
        self.uncertainty = uncertainty;
        self
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }
}

pub const PROCESS_TYPE: &str = "process";

fn default_activity_type() -> String {
    PROCESS_TYPE.to_string()
}

/// A process (technosphere) or an elementary flow (biosphere)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Filled in from the database file when loading
    #[serde(default, skip_serializing)]
    pub database: String,

    pub code: String,

    pub name: String,

    #[serde(
        rename = "reference product",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub reference_product: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default)]
    pub unit: String,

    #[serde(rename = "type", default = "default_activity_type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exchanges: Vec<Exchange>,
}

impl Activity {
    pub fn new(database: &str, code: &str, name: &str) -> Self {
        Self {
            database: database.to_string(),
            code: code.to_string(),
            name: name.to_string(),
            reference_product: None,
            location: None,
            unit: String::new(),
            kind: PROCESS_TYPE.to_string(),
            categories: Vec::new(),
            exchanges: Vec::new(),
        }
    }

    pub fn key(&self) -> FlowKey {
        FlowKey::new(&self.database, &self.code)
    }

    /// Processes go into the technosphere; every other type is a biosphere flow
    pub fn is_process(&self) -> bool {
        self.kind == PROCESS_TYPE
    }

    pub fn exchanges_of(&self, kind: ExchangeType) -> impl Iterator<Item = &Exchange> {
        self.exchanges.iter().filter(move |e| e.kind == kind)
    }

    pub fn production(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges_of(ExchangeType::Production)
    }

    pub fn technosphere(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges_of(ExchangeType::Technosphere)
    }

    pub fn biosphere(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges_of(ExchangeType::Biosphere)
    }

    pub fn substitution(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges_of(ExchangeType::Substitution)
    }

    /// Sum of production amounts, 1 when the activity has none
    pub fn production_amount(&self) -> f64 {
        let mut production = self.production().peekable();
        if production.peek().is_none() {
            1.0
        } else {
            production.map(|e| e.amount).sum()
        }
    }

    /// Set `output` on every exchange and default the reference product
    pub fn normalize(&mut self) {
        let key = self.key();
        for exc in &mut self.exchanges {
            exc.output = Some(key.clone());
        }
        if self.is_process() && self.reference_product.is_none() {
            self.reference_product = Some(self.name.clone());
        }
    }

    pub fn with_exchange(mut self, exchange: Exchange) -> Self {
        self.exchanges.push(exchange);
        self
    }
}

/// A named collection of activities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub name: String,

    #[serde(default)]
    pub depends: Vec<String>,

    #[serde(default)]
    pub activities: Vec<Activity>,
}

impl Database {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            depends: Vec::new(),
            activities: Vec::new(),
        }
    }

    /// Stamp the database name on every activity and link exchanges
    pub fn normalize(&mut self) {
        for act in &mut self.activities {
            act.database = self.name.clone();
            act.normalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_amount_defaults_to_one() {
        let act = Activity::new("fg", "a", "A");
        assert_eq!(act.production_amount(), 1.0);

        let act = act.with_exchange(Exchange::new(
            FlowKey::new("fg", "a"),
            2.5,
            ExchangeType::Production,
        ));
        assert_eq!(act.production_amount(), 2.5);
    }

    #[test]
    fn test_normalize_links_exchanges() {
        let mut db = Database::new("fg");
        db.activities.push(Activity::new("", "a", "steel").with_exchange(Exchange::new(
            FlowKey::new("bio", "co2"),
            1.0,
            ExchangeType::Biosphere,
        )));
        db.normalize();
        let act = &db.activities[0];
        assert_eq!(act.key(), FlowKey::new("fg", "a"));
        assert_eq!(act.exchanges[0].output, Some(FlowKey::new("fg", "a")));
        assert_eq!(act.reference_product.as_deref(), Some("steel"));
    }

    #[test]
    fn test_exchange_yaml_shape() {
        let yaml = r#"
input: [bio, co2]
amount: 2.0
type: biosphere
uncertainty type: 3
loc: 2.0
scale: 0.2
"#;
        let exc: Exchange = serde_yml::from_str(yaml).unwrap();
        assert_eq!(exc.kind, ExchangeType::Biosphere);
        assert!(exc.uncertainty.is_stochastic());
        assert_eq!(exc.uncertainty.scale, Some(0.2));
    }

    #[test]
    fn test_matrix_sign() {
        assert_eq!(ExchangeType::Technosphere.matrix_sign(), -1.0);
        assert_eq!(ExchangeType::Substitution.matrix_sign(), 1.0);
        assert!(!ExchangeType::Biosphere.is_technosphere_type());
        assert_eq!(
            "Production".parse::<ExchangeType>().unwrap(),
            ExchangeType::Production
        );
    }
}
