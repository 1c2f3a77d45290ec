//! Schema registry - embedded JSON schemas

use rust_embed::Embed;
use std::collections::HashMap;

#[derive(Embed)]
#[folder = "schemas/"]
struct EmbeddedSchemas;

/// Kinds of project files that carry a schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Project,
    Database,
    Method,
}

impl FileKind {
    pub fn all() -> &'static [FileKind] {
        &[FileKind::Project, FileKind::Database, FileKind::Method]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Project => "project",
            FileKind::Database => "database",
            FileKind::Method => "method",
        }
    }
}

/// Registry of compiled JSON schemas for project file validation
pub struct SchemaRegistry {
    validators: HashMap<FileKind, jsonschema::Validator>,
}

impl SchemaRegistry {
    /// Create a new schema registry with embedded schemas
    pub fn new() -> Self {
        let mut validators = HashMap::new();

        for kind in FileKind::all() {
            let filename = format!("{}.schema.json", kind.as_str());
            let Some(file) = EmbeddedSchemas::get(&filename) else {
                continue;
            };
            let Ok(schema) = serde_json::from_slice::<serde_json::Value>(&file.data) else {
                continue;
            };
            if let Ok(validator) = jsonschema::validator_for(&schema) {
                validators.insert(*kind, validator);
            }
        }

        Self { validators }
    }

    pub fn has_schema(&self, kind: FileKind) -> bool {
        self.validators.contains_key(&kind)
    }

    /// Validate a document; returns one message per violation
    pub fn validate(&self, kind: FileKind, document: &serde_json::Value) -> Result<(), Vec<String>> {
        let Some(validator) = self.validators.get(&kind) else {
            return Ok(());
        };
        let errors: Vec<String> = validator
            .iter_errors(document)
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{}: {}", path, e)
                }
            })
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_all_schemas_compile() {
        let registry = SchemaRegistry::new();
        for kind in FileKind::all() {
            assert!(registry.has_schema(*kind), "missing schema {}", kind.as_str());
        }
    }

    #[test]
    fn test_database_validation_reports_bad_exchange_type() {
        let registry = SchemaRegistry::new();
        let doc = json!({
            "name": "fg",
            "activities": [{
                "code": "a",
                "name": "A",
                "exchanges": [{"input": ["fg", "a"], "amount": 1.0, "type": "output"}]
            }]
        });
        let errors = registry.validate(FileKind::Database, &doc).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("/activities/0/exchanges/0/type"), "{}", errors[0]);
    }

    #[test]
    fn test_method_validation_accepts_minimal_document() {
        let registry = SchemaRegistry::new();
        let doc = json!({"name": ["IPCC"], "unit": "kg", "cfs": []});
        assert!(registry.validate(FileKind::Method, &doc).is_ok());
    }
}
