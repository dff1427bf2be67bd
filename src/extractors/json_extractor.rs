//! Dotted JSON paths: `data.items[0].title`, `this[2]`

use serde_json::Value as Json;
use std::fmt;

use crate::error::{ExtractError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::Key(key) => write!(f, ".{}", key),
            PathStep::Index(i) => write!(f, "[{}]", i),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    steps: Vec<PathStep>,
}

impl JsonPath {
    pub fn parse(raw: &str) -> Result<Self> {
        let syntax = |why: &str| ExtractError::SelectorSyntax(format!("json path `{}`: {}", raw, why));
        let mut steps = Vec::new();

        for segment in raw.split('.') {
            let (key, mut rest) = match segment.find('[') {
                Some(idx) => (&segment[..idx], &segment[idx..]),
                None => (segment, ""),
            };

            match key {
                "this" => {}
                "" if rest.is_empty() => return Err(syntax("empty segment")),
                "" => {}
                key => steps.push(PathStep::Key(key.to_string())),
            }

            while !rest.is_empty() {
                let body = rest.strip_prefix('[').ok_or_else(|| syntax("text after index"))?;
                let close = body.find(']').ok_or_else(|| syntax("unclosed `[`"))?;
                let inner = &body[..close];
                if inner.is_empty() || !inner.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(syntax("index is not a non-negative integer"));
                }
                let index = inner.parse().map_err(|_| syntax("index too large"))?;
                steps.push(PathStep::Index(index));
                rest = &body[close + 1..];
            }
        }

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Walks the path from `root`. A missing key, an index past the end or
    /// a step into the wrong kind of value is `NodeNotFound`.
    pub fn resolve<'a>(&self, root: &'a Json) -> Result<&'a Json> {
        let mut current = root;
        for (depth, step) in self.steps.iter().enumerate() {
            let next = match step {
                PathStep::Key(key) => current.as_object().and_then(|obj| obj.get(key)),
                PathStep::Index(i) => current.as_array().and_then(|arr| arr.get(*i)),
            };
            current = next.ok_or_else(|| {
                let walked: String = self.steps[..=depth].iter().map(|s| s.to_string()).collect();
                ExtractError::NodeNotFound(format!("json path {}", walked))
            })?;
        }
        Ok(current)
    }
}
