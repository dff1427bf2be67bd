//! Text → typed value conversions shared by every backend

use serde_json::Value as Json;

use crate::error::{ExtractError, Result};
use crate::filters::unquote_str;
use crate::spec::SpecType;
use crate::value::Value;

pub fn parse_int(text: &str) -> Result<i64> {
    text.trim()
        .parse()
        .map_err(|_| ExtractError::Decode(format!("`{}` is not an integer", text)))
}

pub fn parse_float(text: &str) -> Result<f64> {
    text.trim()
        .parse()
        .map_err(|_| ExtractError::Decode(format!("`{}` is not a number", text)))
}

pub fn parse_bool(text: &str) -> Result<bool> {
    match text.trim() {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        other => Err(ExtractError::Decode(format!("`{}` is not a boolean", other))),
    }
}

/// Scalar kinds: `int float bool string text`
pub fn coerce_scalar(text: String, spec_type: &SpecType) -> Result<Value> {
    Ok(match spec_type {
        SpecType::Int => Value::Int(parse_int(&text)?),
        SpecType::Float => Value::Float(parse_float(&text)?),
        SpecType::Bool => Value::Bool(parse_bool(&text)?),
        _ => Value::String(text),
    })
}

/// Scalar-array kinds. One element that fails to parse fails the list.
pub fn coerce_list(items: Vec<String>, spec_type: &SpecType) -> Result<Value> {
    Ok(match spec_type {
        SpecType::IntArray => Value::IntArray(items.iter().map(|s| parse_int(s)).collect::<Result<_>>()?),
        SpecType::FloatArray => Value::FloatArray(items.iter().map(|s| parse_float(s)).collect::<Result<_>>()?),
        SpecType::BoolArray => Value::BoolArray(items.iter().map(|s| parse_bool(s)).collect::<Result<_>>()?),
        _ => Value::StringArray(items),
    })
}

fn object_or_array(text: &str) -> Option<Json> {
    serde_json::from_str::<Json>(text)
        .ok()
        .filter(|json| json.is_object() || json.is_array())
}

/// Decodes text holding a JSON object or array. Text that is itself an
/// escaped JSON string literal is unquoted and tried again.
pub fn decode_embedded_json(text: &str) -> Result<Json> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ExtractError::Decode("embedded json is empty".to_string()));
    }
    if let Some(json) = object_or_array(trimmed) {
        return Ok(json);
    }
    unquote_str(trimmed)
        .ok()
        .and_then(|unquoted| object_or_array(unquoted.trim()))
        .ok_or_else(|| {
            let preview: String = trimmed.chars().take(40).collect();
            ExtractError::Decode(format!("text is not a json object or array: {}", preview))
        })
}
