//! Error types for the FHIRPath editor engine
//!
//! Type errors are not errors here: they are carried as `Type::Invalid`
//! values. This enum covers host-facing lookups and the external evaluator.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Binding not found: {0}")]
    BindingNotFound(String),

    #[error("Token not found at index {0}")]
    TokenNotFound(usize),

    #[error("Token at index {0} is not a function")]
    NotAFunction(usize),

    #[error("Argument {arg} of {function} out of range")]
    ArgumentOutOfRange { function: String, arg: usize },

    #[error("Index out of bounds: {0}")]
    IndexOutOfBounds(usize),

    #[error("Schema error: {0}")]
    Schema(String),
}

impl From<ferrum_schema::Error> for Error {
    fn from(err: ferrum_schema::Error) -> Self {
        Error::Schema(err.to_string())
    }
}
