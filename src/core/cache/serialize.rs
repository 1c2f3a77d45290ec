//! SQLite serialization for store types
//!
//! Exchange types are stored as text; uncertainty records and method keys
//! as JSON text.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use crate::core::identity::MethodKey;
use crate::entities::{ExchangeType, Uncertainty};

fn invalid_data(message: String) -> FromSqlError {
    FromSqlError::Other(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message,
    )))
}

// =========================================================================
// ExchangeType - ToSql/FromSql
// =========================================================================

impl ToSql for ExchangeType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ExchangeType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        s.parse().map_err(invalid_data)
    }
}

// =========================================================================
// Uncertainty - ToSql/FromSql (JSON text)
// =========================================================================

impl ToSql for Uncertainty {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let json = serde_json::to_string(self)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok(ToSqlOutput::from(json))
    }
}

impl FromSql for Uncertainty {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Uncertainty::default()),
            other => {
                let s = other.as_str()?;
                serde_json::from_str(s).map_err(|e| invalid_data(e.to_string()))
            }
        }
    }
}

// =========================================================================
// MethodKey - ToSql/FromSql (JSON array text)
// =========================================================================

impl ToSql for MethodKey {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let json = serde_json::to_string(self)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok(ToSqlOutput::from(json))
    }
}

impl FromSql for MethodKey {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        serde_json::from_str(s).map_err(|e| invalid_data(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_exchange_type_roundtrip() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (kind TEXT)", []).unwrap();
        conn.execute("INSERT INTO t VALUES (?1)", [ExchangeType::Substitution])
            .unwrap();
        let kind: ExchangeType = conn
            .query_row("SELECT kind FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(kind, ExchangeType::Substitution);
    }

    #[test]
    fn test_unknown_exchange_type_is_an_error() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (kind TEXT)", []).unwrap();
        conn.execute("INSERT INTO t VALUES ('output')", []).unwrap();
        let result: rusqlite::Result<ExchangeType> =
            conn.query_row("SELECT kind FROM t", [], |row| row.get(0));
        assert!(result.is_err());
    }

    #[test]
    fn test_null_uncertainty_is_default() {
        let conn = Connection::open_in_memory().unwrap();
        let u: Uncertainty = conn
            .query_row("SELECT NULL", [], |row| row.get(0))
            .unwrap();
        assert!(!u.is_stochastic());
    }

    #[test]
    fn test_uncertainty_json_column() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (u TEXT)", []).unwrap();
        conn.execute("INSERT INTO t VALUES (?1)", [Uncertainty::normal(1.0, 0.1)])
            .unwrap();
        let u: Uncertainty = conn
            .query_row("SELECT u FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(u.scale, Some(0.1));
    }
}
