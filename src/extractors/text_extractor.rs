//! Pattern selectors (`regexp:` / `regexp2:`) over serialized context text

use fancy_regex::Regex as ExtendedRegex;
use regex::Regex;

use crate::error::{ExtractError, Result};
use crate::spec::PatternEngine;

/// A compiled pattern selector
#[derive(Debug, Clone)]
pub enum Pattern {
    Standard(Regex),
    Extended(ExtendedRegex),
}

impl Pattern {
    pub fn compile(engine: PatternEngine, pattern: &str) -> Result<Self> {
        let bad = |e: String| ExtractError::SelectorSyntax(format!("{}{}: {}", engine.prefix(), pattern, e));
        match engine {
            PatternEngine::Standard => Regex::new(pattern).map(Pattern::Standard).map_err(|e| bad(e.to_string())),
            PatternEngine::Extended => ExtendedRegex::new(pattern)
                .map(Pattern::Extended)
                .map_err(|e| bad(e.to_string())),
        }
    }

    /// First match with all of its groups; groups that did not take part
    /// are empty strings
    pub fn first_match(&self, text: &str) -> Result<Option<MatchGroups>> {
        let groups: Option<Vec<String>> = match self {
            Pattern::Standard(re) => re.captures(text).map(|caps| {
                caps.iter()
                    .map(|m| m.map_or_else(String::new, |m| m.as_str().to_string()))
                    .collect()
            }),
            Pattern::Extended(re) => re
                .captures(text)
                .map_err(|e| ExtractError::Decode(format!("pattern match failed: {}", e)))?
                .map(|caps| {
                    caps.iter()
                        .map(|m| m.map_or_else(String::new, |m| m.as_str().to_string()))
                        .collect()
                }),
        };
        Ok(groups.map(|groups| MatchGroups { groups }))
    }
}

/// Groups of one match; index 0 is the whole match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchGroups {
    groups: Vec<String>,
}

impl MatchGroups {
    /// Whole match when the pattern has no groups, otherwise group 1
    pub fn scalar(&self) -> &str {
        match self.groups.as_slice() {
            [whole] => whole.as_str(),
            [_, first, ..] => first.as_str(),
            [] => "",
        }
    }

    /// Whole match when the pattern has no groups, otherwise groups 1..n
    pub fn list(&self) -> Vec<String> {
        match self.groups.as_slice() {
            [whole] => vec![whole.clone()],
            [_, rest @ ..] => rest.to_vec(),
            [] => vec![],
        }
    }
}
