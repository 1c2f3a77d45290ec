//! Identity types - flow keys and method keys
//!
//! Every activity and biosphere flow is addressed by a `(database, code)`
//! pair; every impact assessment method by a tuple of names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Key of an activity or elementary flow: `(database, code)`
///
/// Serialized as a two-element sequence (`[db, code]`) so YAML fixtures can
/// write keys inline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowKey(pub String, pub String);

impl FlowKey {
    pub fn new(database: impl Into<String>, code: impl Into<String>) -> Self {
        Self(database.into(), code.into())
    }

    pub fn database(&self) -> &str {
        &self.0
    }

    pub fn code(&self) -> &str {
        &self.1
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.0, self.1)
    }
}

impl std::str::FromStr for FlowKey {
    type Err = String;

    /// Parse `db/code`, `db:code` or `(db, code)`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('(').trim_end_matches(')');
        let (db, code) = trimmed
            .split_once(", ")
            .or_else(|| trimmed.split_once('/'))
            .or_else(|| trimmed.split_once(':'))
            .ok_or_else(|| format!("Invalid flow key '{}': expected db/code", s))?;
        let (db, code) = (db.trim(), code.trim());
        if db.is_empty() || code.is_empty() {
            return Err(format!("Invalid flow key '{}': empty database or code", s));
        }
        Ok(FlowKey::new(db, code))
    }
}

/// Key of an impact assessment method, e.g. `("IPCC 2013", "climate change", "GWP 100a")`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MethodKey(pub Vec<String>);

impl MethodKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// Label used for column headers: parts joined by `" | "`
    pub fn label(&self) -> String {
        self.0.join(" | ")
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0.join(", "))
    }
}

impl std::str::FromStr for MethodKey {
    type Err = String;

    /// Parse a `" | "`- or `"/"`-separated method name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = if s.contains('|') {
            s.split('|').collect()
        } else {
            s.split('/').collect()
        };
        let parts: Vec<String> = parts
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            return Err(format!("Invalid method key '{}'", s));
        }
        Ok(MethodKey(parts))
    }
}
