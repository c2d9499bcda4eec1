//! Error types for the FHIR schema registry

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
