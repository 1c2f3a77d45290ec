//! Calculation results engine
//!
//! ```text
//! setup name ──► resolve ──► MatrixEngine ──► build_results ──► ScoreCube
//!                                  │                               │
//!                                  ├──► run_mc ──► run_gsa         ├──► inventory
//!                                  └──► first tier ◄── contributions ◄┘
//! ```

pub mod contribution;
pub mod driver;
pub mod engine;
pub mod inventory;
pub mod montecarlo;
pub mod results;
pub mod sensitivity;
pub mod setup;
pub mod worker;

pub use contribution::{
    Compare, ContributionFrame, ContributionKind, ContributionRequest, Cutoff, LimitType, TotalMode,
};
pub use driver::{LcaResults, ScoreCube};
pub use engine::{InputKind, LcaEngine, MatrixEngine};
pub use inventory::{InventoryFrame, InventoryKind};
pub use montecarlo::{IncludeFlags, McOptions, McResult};
pub use results::ResultViewModel;
pub use sensitivity::{GsaOptions, GsaResult};
pub use setup::{resolve_setup, ResolvedSetup};
