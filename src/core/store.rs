//! LCA store - read-only access to databases, methods and setups
//!
//! The engine never writes to the store. [`MemoryStore`] backs YAML
//! projects and tests; [`crate::core::cache::SqliteStore`] is the persistent
//! mirror.

use std::collections::{BTreeMap, HashMap};

use crate::core::error::CalcError;
use crate::core::identity::{FlowKey, MethodKey};
use crate::entities::{Activity, CalculationSetup, Database, Method, Parameter};

/// Database header without its activities
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseInfo {
    pub name: String,
    pub depends: Vec<String>,
    pub activity_codes: Vec<String>,
}

pub trait LcaStore: Send + Sync {
    fn setup(&self, name: &str) -> Result<CalculationSetup, CalcError>;

    fn setup_names(&self) -> Result<Vec<String>, CalcError>;

    fn activity(&self, key: &FlowKey) -> Result<Activity, CalcError>;

    fn method(&self, key: &MethodKey) -> Result<Method, CalcError>;

    fn database(&self, name: &str) -> Result<DatabaseInfo, CalcError>;

    fn database_names(&self) -> Result<Vec<String>, CalcError>;

    fn parameters(&self) -> Result<Vec<Parameter>, CalcError>;

    fn has_activity(&self, key: &FlowKey) -> bool {
        self.activity(key).is_ok()
    }

    /// All activities of a database, ordered by code
    fn activities_in(&self, name: &str) -> Result<Vec<Activity>, CalcError> {
        let info = self.database(name)?;
        let mut codes = info.activity_codes;
        codes.sort();
        codes
            .iter()
            .map(|code| self.activity(&FlowKey::new(name, code)))
            .collect()
    }
}

/// In-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    databases: BTreeMap<String, DatabaseInfo>,
    activities: HashMap<FlowKey, Activity>,
    methods: BTreeMap<MethodKey, Method>,
    setups: BTreeMap<String, CalculationSetup>,
    parameters: Vec<Parameter>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_database(&mut self, mut db: Database) {
        db.normalize();
        let mut codes: Vec<String> = db.activities.iter().map(|a| a.code.clone()).collect();
        codes.sort();
        codes.dedup();
        let entry = self
            .databases
            .entry(db.name.clone())
            .or_insert_with(|| DatabaseInfo {
                name: db.name.clone(),
                depends: Vec::new(),
                activity_codes: Vec::new(),
            });
        for dep in db.depends {
            if !entry.depends.contains(&dep) {
                entry.depends.push(dep);
            }
        }
        for code in codes {
            if !entry.activity_codes.contains(&code) {
                entry.activity_codes.push(code);
            }
        }
        for act in db.activities {
            self.activities.insert(act.key(), act);
        }
    }

    pub fn add_method(&mut self, method: Method) {
        self.methods.insert(method.name.clone(), method);
    }

    pub fn add_setup(&mut self, setup: CalculationSetup) {
        self.setups.insert(setup.name.clone(), setup);
    }

    pub fn add_parameter(&mut self, parameter: Parameter) {
        self.parameters.retain(|p| p.name != parameter.name);
        self.parameters.push(parameter);
    }

    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.methods.values()
    }

    pub fn setups(&self) -> impl Iterator<Item = &CalculationSetup> {
        self.setups.values()
    }

    /// Every database with its activities, ordered by name
    pub fn databases(&self) -> Vec<Database> {
        self.databases
            .values()
            .map(|info| {
                let mut codes = info.activity_codes.clone();
                codes.sort();
                Database {
                    name: info.name.clone(),
                    depends: info.depends.clone(),
                    activities: codes
                        .iter()
                        .filter_map(|c| self.activities.get(&FlowKey::new(&info.name, c)))
                        .cloned()
                        .collect(),
                }
            })
            .collect()
    }
}

impl LcaStore for MemoryStore {
    fn setup(&self, name: &str) -> Result<CalculationSetup, CalcError> {
        self.setups
            .get(name)
            .cloned()
            .ok_or_else(|| CalcError::SetupNotFound(name.to_string()))
    }

    fn setup_names(&self) -> Result<Vec<String>, CalcError> {
        Ok(self.setups.keys().cloned().collect())
    }

    fn activity(&self, key: &FlowKey) -> Result<Activity, CalcError> {
        self.activities
            .get(key)
            .cloned()
            .ok_or_else(|| CalcError::FlowNotFound(key.clone()))
    }

    fn method(&self, key: &MethodKey) -> Result<Method, CalcError> {
        self.methods
            .get(key)
            .cloned()
            .ok_or_else(|| CalcError::MethodNotFound(key.clone()))
    }

    fn database(&self, name: &str) -> Result<DatabaseInfo, CalcError> {
        self.databases
            .get(name)
            .cloned()
            .ok_or_else(|| CalcError::DatabaseNotFound(name.to_string()))
    }

    fn database_names(&self) -> Result<Vec<String>, CalcError> {
        Ok(self.databases.keys().cloned().collect())
    }

    fn parameters(&self) -> Result<Vec<Parameter>, CalcError> {
        Ok(self.parameters.clone())
    }

    fn has_activity(&self, key: &FlowKey) -> bool {
        self.activities.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::entities::{Exchange, ExchangeType};

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        let mut db = Database::new("fg");
        db.activities.push(Activity::new("fg", "b", "B"));
        db.activities.push(Activity::new("fg", "a", "A").with_exchange(Exchange::new(
            FlowKey::new("fg", "b"),
            1.0,
            ExchangeType::Technosphere,
        )));
        store.add_database(db);
        store
    }

    #[test]
    fn test_missing_items_are_not_found() {
        let store = store();
        assert_eq!(
            store.setup("nope").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            store
                .method(&MethodKey::new(["x"]))
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
        assert!(!store.has_activity(&FlowKey::new("fg", "zzz")));
    }

    #[test]
    fn test_activities_in_sorted_by_code() {
        let store = store();
        let acts = store.activities_in("fg").unwrap();
        let codes: Vec<&str> = acts.iter().map(|a| a.code.as_str()).collect();
        assert_eq!(codes, vec!["a", "b"]);
        assert_eq!(
            acts[0].exchanges[0].output,
            Some(FlowKey::new("fg", "a"))
        );
    }

    #[test]
    fn test_parameters_replace_by_name() {
        let mut store = MemoryStore::new();
        store.add_parameter(Parameter::new("p", 1.0));
        store.add_parameter(Parameter::new("p", 2.0));
        let params = store.parameters().unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].amount, 2.0);
    }
}
