use miette::Diagnostic;
use thiserror::Error;

use crate::domain::NodeKind;

#[derive(Debug, Error, Diagnostic)]
pub enum PolymixError {
    #[error("missing config value `{0}` (set it in polymix.json, pass a flag, or run interactively)")]
    MissingConfigField(&'static str),

    #[error("invalid config value for `{field}`: {message}")]
    InvalidConfig { field: &'static str, message: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(String),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to read CSV file {path}: {message}")]
    CsvRead { path: String, message: String },

    #[error("malformed CSV row at line {line}: {message}")]
    CsvRow { line: usize, message: String },

    #[error("store request failed: {0}")]
    StoreHttp(String),

    #[error("store returned status {status}: {message}")]
    StoreStatus { status: u16, message: String },

    #[error("unexpected store response: {0}")]
    StoreDecode(String),

    #[error("{kind} not found for query {query}")]
    NotFound { kind: NodeKind, query: String },

    #[error("{kind} already exists: {key}")]
    Duplicate { kind: NodeKind, key: String },

    #[error("prompt failed: {0}")]
    Prompt(String),

    #[error("upload worker failed: {0}")]
    Worker(String),
}

impl PolymixError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PolymixError::NotFound { .. })
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, PolymixError::Duplicate { .. })
    }
}
