//! Embedded JSON schemas for project files

pub mod registry;

pub use registry::{FileKind, SchemaRegistry};
