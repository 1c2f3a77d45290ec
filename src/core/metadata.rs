//! Metadata store - descriptive fields of activities and flows
//!
//! Built once per resolved setup and shared read-only (behind an `Arc`)
//! between the driver, the contribution engine and the result façade.

use std::collections::HashMap;

use crate::core::error::CalcError;
use crate::core::identity::FlowKey;
use crate::core::store::LcaStore;
use crate::entities::Activity;

/// Fields describing a process contributor, in display order
pub const ACTIVITY_FIELDS: &[&str] = &["reference product", "name", "location", "unit", "database"];

/// Fields describing an elementary flow contributor, in display order
pub const FLOW_FIELDS: &[&str] = &["name", "categories", "type", "unit", "database"];

/// Grouping fields offered for elementary flows
pub const FLOW_AGGREGATORS: &[&str] = &["compartment", "name", "categories", "type", "unit", "database"];

/// Grouping fields offered for processes
pub const ACTIVITY_AGGREGATORS: &[&str] =
    &["reference product", "name", "location", "unit", "database", "type"];

/// Descriptive fields of one activity or flow
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowMetadata {
    pub name: String,
    pub reference_product: String,
    pub location: String,
    pub unit: String,
    pub database: String,
    pub code: String,
    pub kind: String,
    pub categories: Vec<String>,
}

impl FlowMetadata {
    pub fn from_activity(act: &Activity) -> Self {
        Self {
            name: act.name.clone(),
            reference_product: act.reference_product.clone().unwrap_or_default(),
            location: act.location.clone().unwrap_or_default(),
            unit: act.unit.clone(),
            database: act.database.clone(),
            code: act.code.clone(),
            kind: act.kind.clone(),
            categories: act.categories.clone(),
        }
    }

    /// Field by column name; unknown fields are empty
    pub fn field(&self, name: &str) -> String {
        match name {
            "name" => self.name.clone(),
            "reference product" | "product" => self.reference_product.clone(),
            "location" => self.location.clone(),
            "unit" => self.unit.clone(),
            "database" => self.database.clone(),
            "code" | "key" => self.code.clone(),
            "type" => self.kind.clone(),
            "categories" => self.categories.join(", "),
            "compartment" => self.categories.first().cloned().unwrap_or_default(),
            _ => String::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetaDataStore {
    entries: HashMap<FlowKey, FlowMetadata>,
}

impl MetaDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load metadata of every activity in the given databases
    pub fn load(store: &dyn LcaStore, databases: &[String]) -> Result<Self, CalcError> {
        let mut entries = HashMap::new();
        for db in databases {
            for act in store.activities_in(db)? {
                entries.insert(act.key(), FlowMetadata::from_activity(&act));
            }
        }
        Ok(Self { entries })
    }

    pub fn insert(&mut self, key: FlowKey, meta: FlowMetadata) {
        self.entries.insert(key, meta);
    }

    pub fn get(&self, key: &FlowKey) -> Option<&FlowMetadata> {
        self.entries.get(key)
    }

    /// Field value of a key, empty when the key or field is unknown
    pub fn field(&self, key: &FlowKey, name: &str) -> String {
        self.entries
            .get(key)
            .map(|m| m.field(name))
            .unwrap_or_default()
    }

    /// Values of several fields joined with `" | "`, skipping empty ones
    pub fn label(&self, key: &FlowKey, fields: &[&str]) -> String {
        let parts: Vec<String> = fields
            .iter()
            .map(|f| self.field(key, f))
            .filter(|v| !v.is_empty())
            .collect();
        if parts.is_empty() {
            key.to_string()
        } else {
            parts.join(" | ")
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn co2() -> FlowMetadata {
        FlowMetadata {
            name: "Carbon dioxide".into(),
            unit: "kilogram".into(),
            database: "bio".into(),
            code: "co2".into(),
            kind: "emission".into(),
            categories: vec!["air".into(), "urban".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_field_lookup() {
        let meta = co2();
        assert_eq!(meta.field("categories"), "air, urban");
        assert_eq!(meta.field("compartment"), "air");
        assert_eq!(meta.field("nonexistent"), "");
    }

    #[test]
    fn test_label_joins_non_empty_fields() {
        let mut store = MetaDataStore::new();
        let key = FlowKey::new("bio", "co2");
        store.insert(key.clone(), co2());
        assert_eq!(
            store.label(&key, FLOW_FIELDS),
            "Carbon dioxide | air, urban | emission | kilogram | bio"
        );
        // Activity fields without reference product or location
        assert_eq!(
            store.label(&key, ACTIVITY_FIELDS),
            "Carbon dioxide | kilogram | bio"
        );
        assert_eq!(
            store.label(&FlowKey::new("x", "y"), FLOW_FIELDS),
            "(x, y)"
        );
    }
}
