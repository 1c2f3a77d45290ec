//! Calculation errors
//!
//! All fallible operations of the engine return [`CalcError`]. Callers that
//! only care about the behavioral class of a failure match on
//! [`CalcError::kind`].

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::core::identity::{FlowKey, MethodKey};

/// Behavioral class of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Referenced setup, flow or method absent
    NotFound,
    /// Dimension mismatch, unsupported combination, invalid parameter
    Incompatible,
    /// Singular matrix or solver non-convergence
    NumericFailure,
    /// Too little data for the requested analysis
    Insufficient,
    /// Cooperative cancellation observed
    Cancelled,
    /// Backend failure (I/O, database, file parsing)
    Store,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not found"),
            ErrorKind::Incompatible => write!(f, "incompatible"),
            ErrorKind::NumericFailure => write!(f, "numeric failure"),
            ErrorKind::Insufficient => write!(f, "insufficient"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
            ErrorKind::Store => write!(f, "store"),
        }
    }
}

/// Position of a result cell; every axis is optional
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellIndex {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fu: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<usize>,
}

impl CellIndex {
    pub fn new(fu: usize, method: usize, scenario: usize) -> Self {
        Self {
            fu: Some(fu),
            method: Some(method),
            scenario: Some(scenario),
        }
    }

    /// A whole functional-unit column in one scenario
    pub fn fu_column(fu: usize, scenario: usize) -> Self {
        Self {
            fu: Some(fu),
            method: None,
            scenario: Some(scenario),
        }
    }
}

impl fmt::Display for CellIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(i) = self.fu {
            parts.push(format!("fu {}", i));
        }
        if let Some(j) = self.method {
            parts.push(format!("method {}", j));
        }
        if let Some(k) = self.scenario {
            parts.push(format!("scenario {}", k));
        }
        if parts.is_empty() {
            write!(f, "(all cells)")
        } else {
            write!(f, "({})", parts.join(", "))
        }
    }
}

/// Non-fatal failure attached to a result cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellWarning {
    pub cell: CellIndex,
    pub message: String,
}

impl fmt::Display for CellWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.cell, self.message)
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum CalcError {
    #[error("Calculation setup '{0}' not found")]
    #[diagnostic(code(abcalc::not_found::setup), help("list setups with `abcalc setups`"))]
    SetupNotFound(String),

    #[error("Flow {0} not found in the store")]
    #[diagnostic(code(abcalc::not_found::flow))]
    FlowNotFound(FlowKey),

    #[error("Impact assessment method {0} not found")]
    #[diagnostic(code(abcalc::not_found::method))]
    MethodNotFound(MethodKey),

    #[error("Database '{0}' not found")]
    #[diagnostic(code(abcalc::not_found::database))]
    DatabaseNotFound(String),

    #[error("Parameter '{0}' not found")]
    #[diagnostic(code(abcalc::not_found::parameter))]
    ParameterNotFound(String),

    #[error("{message}")]
    #[diagnostic(code(abcalc::incompatible))]
    Incompatible {
        message: String,
        cell: Option<CellIndex>,
    },

    #[error("Methods with different units ({}) cannot be compared in absolute mode", .units.join(", "))]
    #[diagnostic(
        code(abcalc::incompatible::mixed_units),
        help("use relative mode to compare across impact categories")
    )]
    MixedUnits { units: Vec<String> },

    #[error("{axis} index {index} out of range (0..{len})")]
    #[diagnostic(code(abcalc::incompatible::index))]
    IndexOutOfRange {
        axis: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Invalid value for {name}: {message}")]
    #[diagnostic(code(abcalc::incompatible::parameter))]
    InvalidParameter { name: String, message: String },

    #[error("Numeric failure {cell}: {message}")]
    #[diagnostic(code(abcalc::numeric))]
    Numeric { message: String, cell: CellIndex },

    #[error("{0}")]
    #[diagnostic(code(abcalc::insufficient))]
    Insufficient(String),

    #[error("Calculation cancelled")]
    #[diagnostic(code(abcalc::cancelled))]
    Cancelled,

    #[error("{0}")]
    #[diagnostic(code(abcalc::store))]
    Store(String),

    #[error(transparent)]
    #[diagnostic(code(abcalc::io))]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(code(abcalc::sqlite))]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    #[diagnostic(code(abcalc::csv))]
    Csv(#[from] csv::Error),
}

impl CalcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CalcError::SetupNotFound(_)
            | CalcError::FlowNotFound(_)
            | CalcError::MethodNotFound(_)
            | CalcError::DatabaseNotFound(_)
            | CalcError::ParameterNotFound(_) => ErrorKind::NotFound,
            CalcError::Incompatible { .. }
            | CalcError::MixedUnits { .. }
            | CalcError::IndexOutOfRange { .. }
            | CalcError::InvalidParameter { .. } => ErrorKind::Incompatible,
            CalcError::Numeric { .. } => ErrorKind::NumericFailure,
            CalcError::Insufficient(_) => ErrorKind::Insufficient,
            CalcError::Cancelled => ErrorKind::Cancelled,
            CalcError::Store(_) | CalcError::Io(_) | CalcError::Sqlite(_) | CalcError::Csv(_) => {
                ErrorKind::Store
            }
        }
    }

    /// Result cell the error concerns, when there is one
    pub fn cell(&self) -> Option<CellIndex> {
        match self {
            CalcError::Incompatible { cell, .. } => *cell,
            CalcError::Numeric { cell, .. } => Some(*cell),
            _ => None,
        }
    }

    pub fn incompatible(message: impl Into<String>) -> Self {
        CalcError::Incompatible {
            message: message.into(),
            cell: None,
        }
    }

    pub fn numeric(message: impl Into<String>, cell: CellIndex) -> Self {
        CalcError::Numeric {
            message: message.into(),
            cell,
        }
    }

    pub fn invalid(name: impl Into<String>, message: impl Into<String>) -> Self {
        CalcError::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Attach a cell to a numeric failure raised without one
    pub fn at(self, at: CellIndex) -> Self {
        match self {
            CalcError::Numeric { message, .. } => CalcError::Numeric { message, cell: at },
            CalcError::Incompatible { message, .. } => CalcError::Incompatible {
                message,
                cell: Some(at),
            },
            other => other,
        }
    }
}

/// Check an index against an axis length
pub fn check_index(axis: &'static str, index: usize, len: usize) -> Result<(), CalcError> {
    if index < len {
        Ok(())
    } else {
        Err(CalcError::IndexOutOfRange { axis, index, len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            CalcError::SetupNotFound("x".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            CalcError::MixedUnits {
                units: vec!["kg".into(), "MJ".into()]
            }
            .kind(),
            ErrorKind::Incompatible
        );
        assert_eq!(CalcError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            CalcError::Insufficient("few".into()).kind(),
            ErrorKind::Insufficient
        );
    }

    #[test]
    fn test_numeric_error_carries_cell() {
        let err = CalcError::numeric("singular", CellIndex::default()).at(CellIndex::new(1, 2, 0));
        assert_eq!(err.kind(), ErrorKind::NumericFailure);
        assert_eq!(err.cell(), Some(CellIndex::new(1, 2, 0)));
        assert!(err.to_string().contains("fu 1, method 2, scenario 0"));
    }

    #[test]
    fn test_check_index() {
        assert!(check_index("fu", 0, 1).is_ok());
        let err = check_index("method", 3, 2).unwrap_err();
        assert_eq!(err.to_string(), "method index 3 out of range (0..2)");
    }

    #[test]
    fn test_mixed_units_message() {
        let err = CalcError::MixedUnits {
            units: vec!["kg CO2 eq".into(), "MJ".into()],
        };
        assert!(err.to_string().contains("kg CO2 eq, MJ"));
    }
}
