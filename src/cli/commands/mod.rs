//! CLI command implementations

pub mod completions;
pub mod contrib;
pub mod gsa;
pub mod import;
pub mod inventory;
pub mod mc;
pub mod scores;
pub mod setups;
