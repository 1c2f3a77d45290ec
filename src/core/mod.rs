//! Core module - identities, errors, stores and shared data structures

pub mod cache;
pub mod config;
pub mod error;
pub mod formula;
pub mod frame;
pub mod identity;
pub mod metadata;
pub mod progress;
pub mod project;
pub mod scenario;
pub mod store;

pub use cache::{ImportStats, SqliteStore};
pub use config::Config;
pub use error::{CalcError, CellIndex, CellWarning, ErrorKind};
pub use formula::Formula;
pub use frame::{Cell, ExportFormat, Frame};
pub use identity::{FlowKey, MethodKey};
pub use metadata::{FlowMetadata, MetaDataStore};
pub use progress::{CancelToken, Checkpoint, Progress};
pub use project::Project;
pub use scenario::{CombineMode, ScenarioExchange, ScenarioMatrix};
pub use store::{DatabaseInfo, LcaStore, MemoryStore};
