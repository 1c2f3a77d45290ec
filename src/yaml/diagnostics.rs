//! Source-annotated YAML errors

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum YamlError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Syntax(#[from] YamlSyntaxError),

    #[error("{path}: {message}")]
    #[diagnostic(code(abcalc::yaml::schema), help("fix the fields listed above"))]
    Schema { path: String, message: String },

    #[error("Failed to read file: {0}")]
    #[diagnostic(code(abcalc::yaml::io))]
    Io(#[from] std::io::Error),
}

/// YAML parse error pointing at the offending location
#[derive(Debug, Error, Diagnostic)]
#[error("YAML syntax error: {message}")]
#[diagnostic(code(abcalc::yaml::syntax))]
pub struct YamlSyntaxError {
    pub message: String,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("here")]
    pub span: Option<SourceSpan>,
}

impl YamlSyntaxError {
    pub fn from_serde_error(err: &serde_yml::Error, content: &str, filename: &str) -> Self {
        let span = err.location().map(|loc| {
            let offset = loc.index().min(content.len());
            // Highlight up to the end of the line
            let rest = content.get(offset..).unwrap_or("");
            let len = rest.find('\n').unwrap_or(rest.len()).max(1);
            SourceSpan::from((offset, len))
        });
        Self {
            message: err.to_string(),
            src: NamedSource::new(filename, content.to_string()),
            span,
        }
    }
}

impl From<YamlError> for crate::core::error::CalcError {
    fn from(err: YamlError) -> Self {
        match err {
            YamlError::Io(e) => crate::core::error::CalcError::Io(e),
            other => crate::core::error::CalcError::Store(other.to_string()),
        }
    }
}
