//! YAML parsing with error handling

use serde::de::DeserializeOwned;

use crate::yaml::diagnostics::{YamlError, YamlSyntaxError};

/// Parse YAML into a typed value, keeping the error location
pub fn parse_yaml<T: DeserializeOwned + 'static>(content: &str, filename: &str) -> Result<T, YamlError> {
    serde_yml::from_str(content).map_err(|e| {
        YamlError::Syntax(YamlSyntaxError::from_serde_error(&e, content, filename))
    })
}

/// Parse YAML into an untyped JSON value, for schema validation
pub fn parse_yaml_value(content: &str, filename: &str) -> Result<serde_json::Value, YamlError> {
    parse_yaml(content, filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Setting {
        name: String,
        iterations: i32,
    }

    #[test]
    fn test_parse_valid_yaml() {
        let yaml = "name: mc\niterations: 42";
        let result: Setting = parse_yaml(yaml, "abcalc.yaml").unwrap();
        assert_eq!(result.name, "mc");
        assert_eq!(result.iterations, 42);
    }

    #[test]
    fn test_syntax_error_has_span() {
        let yaml = "name: [unclosed\niterations: 1";
        let err = parse_yaml::<Setting>(yaml, "bad.yaml").unwrap_err();
        match err {
            YamlError::Syntax(e) => assert!(e.span.is_some()),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_value_parse_for_validation() {
        let value = parse_yaml_value("a: [1, 2]", "v.yaml").unwrap();
        assert_eq!(value["a"][1], 2);
    }
}
