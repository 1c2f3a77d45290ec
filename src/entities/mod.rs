//! LCA store records: databases, activities, methods, setups and parameters

pub mod activity;
pub mod method;
pub mod parameter;
pub mod setup;
pub mod uncertainty;

pub use activity::{Activity, Database, Exchange, ExchangeType};
pub use method::{CharacterizationFactor, Method};
pub use parameter::Parameter;
pub use setup::{CalculationSetup, DemandEntry, FunctionalUnit};
pub use uncertainty::{Uncertainty, UncertaintyType};
