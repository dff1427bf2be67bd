//! Evaluator options and spec file loading

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ExtractError, Result};
use crate::spec::SpecNode;

pub const DEFAULT_MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorOptions {
    /// Deepest spec nesting an evaluation may reach
    pub max_depth: usize,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Reads a spec tree from a `.json`, `.yaml` or `.yml` file
pub fn load_spec(path: impl AsRef<Path>) -> Result<SpecNode> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => SpecNode::from_json_str(&text),
        Some("yaml") | Some("yml") => SpecNode::from_yaml_str(&text),
        other => Err(ExtractError::Decode(format!(
            "unknown spec file extension {:?} for {}",
            other.unwrap_or(""),
            path.display()
        ))),
    }
}
