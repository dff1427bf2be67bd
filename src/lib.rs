//! docpipe: declarative extraction from HTML, JSON and text documents
//!
//! A spec tree names what to pull out of a document:
//! - selectors: CSS chains with navigation operators, dotted JSON paths or
//!   `regexp:` / `regexp2:` patterns
//! - types: scalars, scalar lists, maps, arrays and embedded JSON
//! - filters: a `|`-separated chain of registered transformations and
//!   validators run on every value
//!
//! The C ABI in [`ffi`] exposes the same pipeline to non-Rust hosts.

pub mod config;
pub mod error;
pub mod extractors;
pub mod ffi;
pub mod filters;
pub mod remote;
pub mod spec;
pub mod value;

pub use config::{load_spec, EvaluatorOptions};
pub use error::{ExtractError, FilterError, RegistryError, Result};
pub use extractors::{Document, Evaluator, PageKind};
pub use filters::{FilterChain, FilterRegistry};
pub use spec::{SelectorExpr, SpecNode, SpecType};
pub use value::Value;
