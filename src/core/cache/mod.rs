//! SQLite mirror of a project
//!
//! `abcalc import` copies a YAML project into a single SQLite file so large
//! background databases load without re-parsing YAML. The file records the
//! project fingerprint; re-importing an unchanged project is a no-op.

mod serialize;


use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::core::error::CalcError;
use crate::core::identity::{FlowKey, MethodKey};
use crate::core::project::Project;
use crate::core::store::{DatabaseInfo, LcaStore, MemoryStore};
use crate::entities::{
    Activity, CalculationSetup, CharacterizationFactor, Exchange, ExchangeType, Method, Parameter,
    Uncertainty,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS databases (
    name TEXT PRIMARY KEY,
    depends TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS activities (
    database TEXT NOT NULL,
    code TEXT NOT NULL,
    name TEXT NOT NULL,
    reference_product TEXT,
    location TEXT,
    unit TEXT NOT NULL,
    type TEXT NOT NULL,
    categories TEXT NOT NULL,
    PRIMARY KEY (database, code)
);
CREATE TABLE IF NOT EXISTS exchanges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    output_db TEXT NOT NULL,
    output_code TEXT NOT NULL,
    input_db TEXT NOT NULL,
    input_code TEXT NOT NULL,
    amount REAL NOT NULL,
    type TEXT NOT NULL,
    formula TEXT,
    uncertainty TEXT
);
CREATE INDEX IF NOT EXISTS idx_exchanges_output ON exchanges(output_db, output_code);
CREATE TABLE IF NOT EXISTS methods (
    name TEXT PRIMARY KEY,
    unit TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS cfs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    method TEXT NOT NULL,
    flow_db TEXT NOT NULL,
    flow_code TEXT NOT NULL,
    amount REAL NOT NULL,
    uncertainty TEXT
);
CREATE INDEX IF NOT EXISTS idx_cfs_method ON cfs(method);
CREATE TABLE IF NOT EXISTS setups (
    name TEXT PRIMARY KEY,
    data TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS parameters (
    name TEXT PRIMARY KEY,
    amount REAL NOT NULL,
    uncertainty TEXT
);
"#;

const FINGERPRINT_KEY: &str = "fingerprint";

/// Row counts written by an import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub databases: usize,
    pub activities: usize,
    pub exchanges: usize,
    pub methods: usize,
    pub setups: usize,
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, CalcError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, CalcError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CalcError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CalcError> {
        self.conn
            .lock()
            .map_err(|_| CalcError::Store("SQLite connection lock poisoned".to_string()))
    }

    pub fn fingerprint(&self) -> Result<Option<String>, CalcError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                [FINGERPRINT_KEY],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Import a project unless the stored fingerprint already matches
    pub fn import_project(&self, project: &Project) -> Result<Option<ImportStats>, CalcError> {
        let fingerprint = project.fingerprint()?;
        if self.fingerprint()?.as_deref() == Some(fingerprint.as_str()) {
            tracing::debug!(%fingerprint, "store is current, skipping import");
            return Ok(None);
        }
        self.import(project.store(), &fingerprint).map(Some)
    }

    /// Replace the whole content with `store`
    pub fn import(&self, store: &MemoryStore, fingerprint: &str) -> Result<ImportStats, CalcError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute_batch(
            "DELETE FROM databases; DELETE FROM activities; DELETE FROM exchanges;
             DELETE FROM methods; DELETE FROM cfs; DELETE FROM setups;
             DELETE FROM parameters; DELETE FROM meta;",
        )?;

        let mut stats = ImportStats::default();
        for db in store.databases() {
            let depends = serde_json::to_string(&db.depends)
                .map_err(|e| CalcError::Store(e.to_string()))?;
            tx.execute(
                "INSERT INTO databases (name, depends) VALUES (?1, ?2)",
                params![db.name, depends],
            )?;
            stats.databases += 1;
            for act in &db.activities {
                let categories = serde_json::to_string(&act.categories)
                    .map_err(|e| CalcError::Store(e.to_string()))?;
                tx.execute(
                    "INSERT INTO activities
                     (database, code, name, reference_product, location, unit, type, categories)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        act.database,
                        act.code,
                        act.name,
                        act.reference_product,
                        act.location,
                        act.unit,
                        act.kind,
                        categories
                    ],
                )?;
                stats.activities += 1;
                for exc in &act.exchanges {
                    tx.execute(
                        "INSERT INTO exchanges
                         (output_db, output_code, input_db, input_code, amount, type, formula, uncertainty)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                        params![
                            act.database,
                            act.code,
                            exc.input.database(),
                            exc.input.code(),
                            exc.amount,
                            exc.kind,
                            exc.formula,
                            exc.uncertainty
                        ],
                    )?;
                    stats.exchanges += 1;
                }
            }
        }

        for method in store.methods() {
            tx.execute(
                "INSERT INTO methods (name, unit) VALUES (?1, ?2)",
                params![method.name, method.unit],
            )?;
            for cf in &method.cfs {
                tx.execute(
                    "INSERT INTO cfs (method, flow_db, flow_code, amount, uncertainty)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        method.name,
                        cf.flow.database(),
                        cf.flow.code(),
                        cf.amount,
                        cf.uncertainty
                    ],
                )?;
            }
            stats.methods += 1;
        }

        for setup in store.setups() {
            let data = serde_json::to_string(setup).map_err(|e| CalcError::Store(e.to_string()))?;
            tx.execute(
                "INSERT INTO setups (name, data) VALUES (?1, ?2)",
                params![setup.name, data],
            )?;
            stats.setups += 1;
        }

        for param in store.parameters()? {
            tx.execute(
                "INSERT INTO parameters (name, amount, uncertainty) VALUES (?1, ?2, ?3)",
                params![param.name, param.amount, param.uncertainty],
            )?;
        }

        tx.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)",
            params![FINGERPRINT_KEY, fingerprint],
        )?;
        tx.commit()?;

        tracing::debug!(
            databases = stats.databases,
            activities = stats.activities,
            exchanges = stats.exchanges,
            "imported project into SQLite"
        );
        Ok(stats)
    }
}

impl LcaStore for SqliteStore {
    fn setup(&self, name: &str) -> Result<CalculationSetup, CalcError> {
        let conn = self.conn()?;
        let data: Option<String> = conn
            .query_row("SELECT data FROM setups WHERE name = ?1", [name], |row| {
                row.get(0)
            })
            .optional()?;
        let data = data.ok_or_else(|| CalcError::SetupNotFound(name.to_string()))?;
        serde_json::from_str(&data).map_err(|e| CalcError::Store(e.to_string()))
    }

    fn setup_names(&self) -> Result<Vec<String>, CalcError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name FROM setups ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn activity(&self, key: &FlowKey) -> Result<Activity, CalcError> {
        let conn = self.conn()?;
        let act = conn
            .query_row(
                "SELECT name, reference_product, location, unit, type, categories
                 FROM activities WHERE database = ?1 AND code = ?2",
                params![key.database(), key.code()],
                |row| {
                    let categories: String = row.get(5)?;
                    Ok(Activity {
                        database: key.database().to_string(),
                        code: key.code().to_string(),
                        name: row.get(0)?,
                        reference_product: row.get(1)?,
                        location: row.get(2)?,
                        unit: row.get(3)?,
                        kind: row.get(4)?,
                        categories: serde_json::from_str(&categories).unwrap_or_default(),
                        exchanges: Vec::new(),
                    })
                },
            )
            .optional()?;
        let mut act = act.ok_or_else(|| CalcError::FlowNotFound(key.clone()))?;

        let mut stmt = conn.prepare(
            "SELECT input_db, input_code, amount, type, formula, uncertainty
             FROM exchanges WHERE output_db = ?1 AND output_code = ?2 ORDER BY id",
        )?;
        let exchanges = stmt
            .query_map(params![key.database(), key.code()], |row| {
                let kind: ExchangeType = row.get(3)?;
                let uncertainty: Uncertainty = row.get(5)?;
                Ok(Exchange {
                    input: FlowKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                    output: Some(key.clone()),
                    amount: row.get(2)?,
                    kind,
                    formula: row.get(4)?,
                    uncertainty,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        act.exchanges = exchanges;
        Ok(act)
    }

    fn method(&self, key: &MethodKey) -> Result<Method, CalcError> {
        let conn = self.conn()?;
        let unit: Option<String> = conn
            .query_row("SELECT unit FROM methods WHERE name = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        let unit = unit.ok_or_else(|| CalcError::MethodNotFound(key.clone()))?;
        let mut stmt = conn.prepare(
            "SELECT flow_db, flow_code, amount, uncertainty FROM cfs WHERE method = ?1 ORDER BY id",
        )?;
        let cfs = stmt
            .query_map([key], |row| {
                Ok(CharacterizationFactor {
                    flow: FlowKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                    amount: row.get(2)?,
                    uncertainty: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Method {
            name: key.clone(),
            unit,
            cfs,
        })
    }

    fn database(&self, name: &str) -> Result<DatabaseInfo, CalcError> {
        let conn = self.conn()?;
        let depends: Option<String> = conn
            .query_row(
                "SELECT depends FROM databases WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        let depends = depends.ok_or_else(|| CalcError::DatabaseNotFound(name.to_string()))?;
        let mut stmt = conn.prepare("SELECT code FROM activities WHERE database = ?1 ORDER BY code")?;
        let codes = stmt
            .query_map([name], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(DatabaseInfo {
            name: name.to_string(),
            depends: serde_json::from_str(&depends).map_err(|e| CalcError::Store(e.to_string()))?,
            activity_codes: codes,
        })
    }

    fn database_names(&self) -> Result<Vec<String>, CalcError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name FROM databases ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn parameters(&self) -> Result<Vec<Parameter>, CalcError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name, amount, uncertainty FROM parameters ORDER BY name")?;
        let params = stmt
            .query_map([], |row| {
                Ok(Parameter {
                    name: row.get(0)?,
                    amount: row.get(1)?,
                    uncertainty: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(params)
    }
}
