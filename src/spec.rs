//! Specification tree: the declarative extraction rules
//!
//! Serialized as a recursive record `{name, selector, type, filter, subitem}`.
//! Field names and type tags are a compatibility surface and round-trip
//! exactly, including tags this crate does not understand.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ExtractError, Result};

pub const REGEXP_PREFIX: &str = "regexp:";
pub const REGEXP2_PREFIX: &str = "regexp2:";

/// One node of a specification tree
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpecNode {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "SelectorExpr::is_current")]
    pub selector: SelectorExpr,
    #[serde(rename = "type", default)]
    pub spec_type: SpecType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filter: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subitem: Vec<SpecNode>,
}

impl SpecNode {
    pub fn new(spec_type: SpecType) -> Self {
        Self {
            spec_type,
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = SelectorExpr::from(selector.into());
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_children(mut self, children: Vec<SpecNode>) -> Self {
        self.subitem = children;
        self
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ExtractError::Decode(format!("spec json: {}", e)))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| ExtractError::Decode(format!("spec yaml: {}", e)))
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ExtractError::Decode(format!("spec json: {}", e)))
    }

    /// Children that take part in `map` assembly
    pub fn named_children(&self) -> impl Iterator<Item = &SpecNode> {
        self.subitem.iter().filter(|c| !c.name.is_empty())
    }

    /// The single child required by `array` and `jsonparse`
    pub fn template(&self) -> Result<&SpecNode> {
        match self.subitem.as_slice() {
            [only] => Ok(only),
            [] => Err(ExtractError::Schema(format!(
                "type `{}` needs one subitem",
                self.spec_type
            ))),
            many => Err(ExtractError::Schema(format!(
                "type `{}` needs exactly one subitem, got {}",
                self.spec_type,
                many.len()
            ))),
        }
    }
}

/// Which pattern engine a regex selector runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternEngine {
    /// `regexp:` – linear-time, no lookaround or backreferences
    Standard,
    /// `regexp2:` – backtracking, supports lookaround and backreferences
    Extended,
}

impl PatternEngine {
    pub fn prefix(self) -> &'static str {
        match self {
            PatternEngine::Standard => REGEXP_PREFIX,
            PatternEngine::Extended => REGEXP2_PREFIX,
        }
    }
}

/// A selector, classified once when the spec is built
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SelectorExpr {
    /// Empty selector: operate on the current context unchanged
    #[default]
    Current,
    /// Pattern match against the serialized context
    Pattern { engine: PatternEngine, pattern: String },
    /// Backend-native selector (CSS chain or JSON path)
    Native(String),
}

impl SelectorExpr {
    pub fn is_current(&self) -> bool {
        matches!(self, SelectorExpr::Current)
    }
}

impl From<String> for SelectorExpr {
    fn from(raw: String) -> Self {
        if let Some(pattern) = raw.strip_prefix(REGEXP2_PREFIX) {
            SelectorExpr::Pattern {
                engine: PatternEngine::Extended,
                pattern: pattern.to_string(),
            }
        } else if let Some(pattern) = raw.strip_prefix(REGEXP_PREFIX) {
            SelectorExpr::Pattern {
                engine: PatternEngine::Standard,
                pattern: pattern.to_string(),
            }
        } else if raw.is_empty() {
            SelectorExpr::Current
        } else {
            SelectorExpr::Native(raw)
        }
    }
}

impl From<&str> for SelectorExpr {
    fn from(raw: &str) -> Self {
        SelectorExpr::from(raw.to_string())
    }
}

impl From<SelectorExpr> for String {
    fn from(sel: SelectorExpr) -> Self {
        match sel {
            SelectorExpr::Current => String::new(),
            SelectorExpr::Pattern { engine, pattern } => format!("{}{}", engine.prefix(), pattern),
            SelectorExpr::Native(raw) => raw,
        }
    }
}

/// Declared result type of a spec node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SpecType {
    Int,
    Float,
    Bool,
    String,
    IntArray,
    FloatArray,
    BoolArray,
    StringArray,
    Map,
    Array,
    /// `json`: decode the text as a generic JSON value
    JsonValue,
    /// `jsonparse`: treat the text as an embedded document and recurse
    JsonParse,
    // Legacy HTML-only tags
    Text,
    Href,
    Html,
    OutHtml,
    Src,
    Alt,
    TextArray,
    HrefArray,
    Attr(String),
    AttrArray(String),
    /// Any tag not listed above, kept verbatim
    Unsupported(String),
}

impl Default for SpecType {
    fn default() -> Self {
        SpecType::Unsupported(String::new())
    }
}

impl SpecType {
    pub fn tag(&self) -> String {
        match self {
            SpecType::Int => "int".into(),
            SpecType::Float => "float".into(),
            SpecType::Bool => "bool".into(),
            SpecType::String => "string".into(),
            SpecType::IntArray => "int-array".into(),
            SpecType::FloatArray => "float-array".into(),
            SpecType::BoolArray => "bool-array".into(),
            SpecType::StringArray => "string-array".into(),
            SpecType::Map => "map".into(),
            SpecType::Array => "array".into(),
            SpecType::JsonValue => "json".into(),
            SpecType::JsonParse => "jsonparse".into(),
            SpecType::Text => "text".into(),
            SpecType::Href => "href".into(),
            SpecType::Html => "html".into(),
            SpecType::OutHtml => "outhtml".into(),
            SpecType::Src => "src".into(),
            SpecType::Alt => "alt".into(),
            SpecType::TextArray => "text-array".into(),
            SpecType::HrefArray => "href-array".into(),
            SpecType::Attr(name) => format!("attr[{}]", name),
            SpecType::AttrArray(name) => format!("attr-array[{}]", name),
            SpecType::Unsupported(raw) => raw.clone(),
        }
    }
}

impl fmt::Display for SpecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

/// Parses `prefix[inner]` with a non-empty inner part
fn bracketed<'a>(tag: &'a str, prefix: &str) -> Option<&'a str> {
    tag.strip_prefix(prefix)?
        .strip_suffix(']')
        .filter(|inner| !inner.is_empty())
}

impl From<String> for SpecType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "int" => SpecType::Int,
            "float" => SpecType::Float,
            "bool" => SpecType::Bool,
            "string" => SpecType::String,
            "int-array" => SpecType::IntArray,
            "float-array" => SpecType::FloatArray,
            "bool-array" => SpecType::BoolArray,
            "string-array" => SpecType::StringArray,
            "map" => SpecType::Map,
            "array" => SpecType::Array,
            "json" => SpecType::JsonValue,
            "jsonparse" => SpecType::JsonParse,
            "text" => SpecType::Text,
            "href" => SpecType::Href,
            "html" => SpecType::Html,
            "outhtml" => SpecType::OutHtml,
            "src" => SpecType::Src,
            "alt" => SpecType::Alt,
            "text-array" => SpecType::TextArray,
            "href-array" => SpecType::HrefArray,
            other => {
                if let Some(name) = bracketed(other, "attr[") {
                    SpecType::Attr(name.to_string())
                } else if let Some(name) = bracketed(other, "attr-array[") {
                    SpecType::AttrArray(name.to_string())
                } else {
                    SpecType::Unsupported(tag)
                }
            }
        }
    }
}

impl From<&str> for SpecType {
    fn from(tag: &str) -> Self {
        SpecType::from(tag.to_string())
    }
}

impl From<SpecType> for String {
    fn from(t: SpecType) -> Self {
        t.tag()
    }
}
