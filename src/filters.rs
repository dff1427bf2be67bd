//! Filter chains: named post-processing and validation of extracted values
//!
//! A chain is written `name(params)|name|...` and applied left to right.
//! Validator filters (leading `_`) abort the chain with invalid content;
//! any other failing call is skipped and the previous value carries on.

mod chain;
mod format;
mod params;
mod registry;
mod text;
mod validators;

pub use chain::*;
pub use format::{quote_str, unquote_str};
pub use params::*;
pub use registry::*;

use crate::error::FilterError;
use crate::value::Value;

/// Applies `f` to a string, or element-wise to a string sequence.
/// Other shapes pass through unchanged.
pub(crate) fn map_text<F>(value: &Value, mut f: F) -> Result<Value, FilterError>
where
    F: FnMut(&str) -> Result<String, FilterError>,
{
    map_text_dyn(value, &mut f)
}

fn map_text_dyn(
    value: &Value,
    f: &mut dyn FnMut(&str) -> Result<String, FilterError>,
) -> Result<Value, FilterError> {
    match value {
        Value::String(s) => Ok(Value::String(f(s)?)),
        Value::StringArray(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(f(item)?);
            }
            Ok(Value::StringArray(out))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(map_text_dyn(item, &mut *f)?);
            }
            Ok(Value::Array(out))
        }
        other => Ok(other.clone()),
    }
}

/// The elements of a string sequence, if the value is one
pub(crate) fn string_items(value: &Value) -> Option<Vec<&str>> {
    match value {
        Value::StringArray(items) => Some(items.iter().map(String::as_str).collect()),
        Value::Array(items) => items.iter().map(Value::as_str).collect(),
        _ => None,
    }
}
