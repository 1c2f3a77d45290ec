//! abcalc: calculation results engine for life cycle assessment
//!
//! Turns a named calculation setup (functional units and impact methods,
//! optionally with scenario matrices) into score cubes, inventories,
//! contribution tables, Monte Carlo samples and sensitivity rankings.

pub mod calc;
pub mod cli;
pub mod core;
pub mod entities;
pub mod schema;
pub mod yaml;
