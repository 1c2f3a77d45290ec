//! Project loading - a directory of YAML files mirrored into a [`MemoryStore`]
//!
//! ```text
//! <root>/
//!   project.yaml          name, parameters, calculation setups
//!   abcalc.yaml           optional configuration overrides
//!   databases/*.yaml      one database per file
//!   methods/*.yaml        one impact assessment method per file
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::core::error::CalcError;
use crate::core::store::MemoryStore;
use crate::entities::{CalculationSetup, Database, Method, Parameter};
use crate::schema::{FileKind, SchemaRegistry};
use crate::yaml::{parse_yaml_value, YamlError};

pub const PROJECT_FILE: &str = "project.yaml";
pub const DATABASES_DIR: &str = "databases";
pub const METHODS_DIR: &str = "methods";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectFile {
    pub name: String,

    #[serde(default)]
    pub parameters: Vec<Parameter>,

    #[serde(default)]
    pub setups: Vec<CalculationSetup>,
}

#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    name: String,
    store: MemoryStore,
    files: Vec<PathBuf>,
}

impl Project {
    /// Search upward from the current directory for `project.yaml`
    pub fn discover() -> Result<Self, CalcError> {
        let cwd = std::env::current_dir()?;
        let mut dir: Option<&Path> = Some(cwd.as_path());
        while let Some(d) = dir {
            if d.join(PROJECT_FILE).exists() {
                return Self::load(d);
            }
            dir = d.parent();
        }
        Err(CalcError::Store(format!(
            "No {} found in {} or any parent directory",
            PROJECT_FILE,
            cwd.display()
        )))
    }

    pub fn load(root: &Path) -> Result<Self, CalcError> {
        let registry = SchemaRegistry::new();
        let project_path = root.join(PROJECT_FILE);
        if !project_path.exists() {
            return Err(CalcError::Store(format!(
                "{} not found in {}",
                PROJECT_FILE,
                root.display()
            )));
        }

        let mut files = vec![project_path.clone()];
        let project: ProjectFile = load_validated(&registry, FileKind::Project, &project_path)?;

        let mut store = MemoryStore::new();
        for path in yaml_files(&root.join(DATABASES_DIR)) {
            let db: Database = load_validated(&registry, FileKind::Database, &path)?;
            store.add_database(db);
            files.push(path);
        }
        for path in yaml_files(&root.join(METHODS_DIR)) {
            let method: Method = load_validated(&registry, FileKind::Method, &path)?;
            store.add_method(method);
            files.push(path);
        }
        for param in project.parameters {
            store.add_parameter(param);
        }
        for setup in project.setups {
            store.add_setup(setup);
        }

        tracing::debug!(
            project = %project.name,
            files = files.len(),
            "loaded project"
        );

        Ok(Self {
            root: root.to_path_buf(),
            name: project.name,
            store,
            files,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn into_store(self) -> MemoryStore {
        self.store
    }

    /// SHA-256 over the relative paths and contents of every project file
    pub fn fingerprint(&self) -> Result<String, CalcError> {
        let mut hasher = Sha256::new();
        for path in &self.files {
            let rel = path.strip_prefix(&self.root).unwrap_or(path);
            hasher.update(rel.to_string_lossy().as_bytes());
            hasher.update(std::fs::read(path)?);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// YAML files below `dir`, sorted by path
fn yaml_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        return Vec::new();
    }
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            )
        })
        .collect();
    paths.sort();
    paths
}

fn load_validated<T: serde::de::DeserializeOwned>(
    registry: &SchemaRegistry,
    kind: FileKind,
    path: &Path,
) -> Result<T, CalcError> {
    let content = std::fs::read_to_string(path)?;
    let filename = path.display().to_string();
    let value = parse_yaml_value(&content, &filename)?;
    registry.validate(kind, &value).map_err(|errors| {
        CalcError::from(YamlError::Schema {
            path: filename.clone(),
            message: errors.join("; "),
        })
    })?;
    serde_json::from_value(value).map_err(|e| CalcError::Store(format!("{}: {}", filename, e)))
}
