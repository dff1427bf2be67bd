//! Error types for extraction, filter calls and registry setup

use thiserror::Error;

use crate::value::Value;

/// Errors returned by an evaluation
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Selector matched nothing where a result was required
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// Composite type is missing its child template
    #[error("schema error: {0}")]
    Schema(String),

    /// Text could not be parsed as the declared type
    #[error("decode error: {0}")]
    Decode(String),

    #[error("selector syntax error: {0}")]
    SelectorSyntax(String),

    /// A validator filter rejected the value; the chain stopped there
    #[error("invalid content rejected by `{filter}`")]
    InvalidContent { filter: String, value: Box<Value> },

    #[error("unsupported type `{type_tag}` for {page} document")]
    UnsupportedType { type_tag: String, page: &'static str },

    #[error("spec tree deeper than {0} levels")]
    DepthExceeded(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExtractError>;

/// Outcome of a single filter call that did not produce a value
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    /// Raised by validator filters only. Aborts the chain.
    #[error("invalid content")]
    InvalidContent,

    #[error("filter `{0}` not found")]
    NotFound(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// The value shape is not one this filter handles
    #[error("unsupported value: {0}")]
    Unsupported(String),

    #[error("conversion failed: {0}")]
    Conversion(String),

    /// A fetch/store collaborator failed
    #[error("{0}")]
    External(String),
}

/// Registration conflicts, raised while the registry is being built
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("filter with name '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("filter with name '{0}' does not exist (therefore cannot be replaced)")]
    NotRegistered(String),
}
