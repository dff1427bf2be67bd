//! Extraction evaluator
//!
//! Walks a [`SpecNode`] tree against one parsed document and produces a
//! [`Value`]. Each document kind has its own resolution rules:
//! - HTML: selector chains over a node-set (see [`SelectorChain`])
//! - JSON: dotted paths (see [`JsonPath`])
//! - Text: the body itself; only pattern selectors narrow it
//!
//! Pattern selectors (`regexp:` / `regexp2:`) work on every kind by matching
//! against the serialized context. The filter chain runs on every node's
//! value before it is handed to the parent.

mod coerce;
mod html_extractor;
mod json_extractor;
mod selector_chain;
mod text_extractor;

pub use coerce::{decode_embedded_json, parse_bool, parse_float, parse_int};
pub use html_extractor::{extract_content, extract_content_each, inner_html, node_text, outer_html};
pub use json_extractor::{JsonPath, PathStep};
pub use selector_chain::{ContentMode, SelectorChain};
pub use text_extractor::{MatchGroups, Pattern};

use ego_tree::NodeId;
use scraper::Html;
use serde_json::Value as Json;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::str::FromStr;

use crate::config::EvaluatorOptions;
use crate::error::{ExtractError, Result};
use crate::filters::{FilterChain, FilterRegistry};
use crate::spec::{PatternEngine, SelectorExpr, SpecNode, SpecType};
use crate::value::Value;
use coerce::{coerce_list, coerce_scalar};

/// Declared kind of an input body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Html,
    Json,
    Text,
}

impl PageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PageKind::Html => "html",
            PageKind::Json => "json",
            PageKind::Text => "text",
        }
    }
}

impl FromStr for PageKind {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(PageKind::Html),
            "json" => Ok(PageKind::Json),
            // scripts and xml bodies are only reachable through patterns
            "text" | "js" | "xml" => Ok(PageKind::Text),
            other => Err(ExtractError::Decode(format!("unknown page kind `{}`", other))),
        }
    }
}

/// A parsed body, owned by a single evaluation
#[derive(Debug)]
pub enum Document {
    Html(Html),
    Json(Json),
    Text(String),
}

impl Document {
    pub fn parse(body: &[u8], kind: PageKind) -> Result<Self> {
        Ok(match kind {
            PageKind::Html => Document::Html(Html::parse_document(&String::from_utf8_lossy(body))),
            PageKind::Json => Document::Json(
                serde_json::from_slice(body).map_err(|e| ExtractError::Decode(format!("json body: {}", e)))?,
            ),
            PageKind::Text => Document::Text(String::from_utf8_lossy(body).into_owned()),
        })
    }

    pub fn kind(&self) -> PageKind {
        match self {
            Document::Html(_) => PageKind::Html,
            Document::Json(_) => PageKind::Json,
            Document::Text(_) => PageKind::Text,
        }
    }
}

/// Parsed selectors, paths, patterns and filter chains keyed by source text.
/// An `array` template runs once per element but is parsed once.
#[derive(Debug, Clone, Default)]
struct ParseCache {
    selectors: RefCell<HashMap<String, Rc<SelectorChain>>>,
    paths: RefCell<HashMap<String, Rc<JsonPath>>>,
    patterns: RefCell<HashMap<String, Rc<Pattern>>>,
    filters: RefCell<HashMap<String, Rc<FilterChain>>>,
}

fn cached<V>(cache: &RefCell<HashMap<String, Rc<V>>>, key: &str, parse: impl FnOnce() -> Result<V>) -> Result<Rc<V>> {
    if let Some(hit) = cache.borrow().get(key) {
        return Ok(Rc::clone(hit));
    }
    let parsed = Rc::new(parse()?);
    cache.borrow_mut().insert(key.to_string(), Rc::clone(&parsed));
    Ok(parsed)
}

/// Evaluates spec trees with a shared, read-only filter registry
#[derive(Debug, Clone)]
pub struct Evaluator<'r> {
    registry: &'r FilterRegistry,
    max_depth: usize,
    cache: ParseCache,
}

impl<'r> Evaluator<'r> {
    pub fn new(registry: &'r FilterRegistry) -> Self {
        Self::with_options(registry, &EvaluatorOptions::default())
    }

    pub fn with_options(registry: &'r FilterRegistry, options: &EvaluatorOptions) -> Self {
        Self {
            registry,
            max_depth: options.max_depth,
            cache: ParseCache::default(),
        }
    }

    /// Evaluates `spec` against `doc`. HTML documents may be modified by the
    /// `rm` selector operator.
    pub fn evaluate(&self, spec: &SpecNode, doc: &mut Document) -> Result<Value> {
        match doc {
            Document::Html(html) => {
                let root = html.tree.root().id();
                self.eval_html(spec, html, &[root], 0)
            }
            Document::Json(json) => self.eval_json(spec, json, 0),
            Document::Text(text) => self.eval_text(spec, text, 0),
        }
    }

    /// Parses `body` as `kind` and evaluates `spec` against it
    pub fn pipe_bytes(&self, spec: &SpecNode, body: &[u8], kind: PageKind) -> Result<Value> {
        let mut doc = Document::parse(body, kind)?;
        self.evaluate(spec, &mut doc)
    }

    fn enter(&self, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            return Err(ExtractError::DepthExceeded(self.max_depth));
        }
        Ok(())
    }

    /// Runs the node's filter chain
    fn finish(&self, spec: &SpecNode, value: Value) -> Result<Value> {
        if spec.filter.is_empty() {
            return Ok(value);
        }
        let chain = cached(&self.cache.filters, &spec.filter, || Ok(FilterChain::parse(&spec.filter)))?;
        chain
            .apply(self.registry, value)
            .map_err(|rejected| ExtractError::InvalidContent {
                filter: rejected.filter,
                value: Box::new(rejected.value),
            })
    }

    /// Evaluates every named child and keeps the ones that succeed
    fn assemble_map<F>(&self, spec: &SpecNode, mut eval_child: F) -> Result<Value>
    where
        F: FnMut(&SpecNode) -> Result<Value>,
    {
        let mut children = spec.named_children().peekable();
        if children.peek().is_none() {
            return Err(ExtractError::Schema("type `map` needs at least one named subitem".to_string()));
        }

        let mut map = HashMap::new();
        for child in children {
            match eval_child(child) {
                Ok(value) => {
                    map.insert(child.name.clone(), value);
                }
                Err(e @ ExtractError::DepthExceeded(_)) => return Err(e),
                Err(e) => tracing::debug!(field = %child.name, error = %e, "map field omitted"),
            }
        }
        self.finish(spec, Value::Map(map))
    }

    /// Evaluates the template once per element, dropping failed elements
    fn assemble_array<T, F>(&self, spec: &SpecNode, elements: &[T], mut eval_element: F) -> Result<Value>
    where
        F: FnMut(&SpecNode, &T) -> Result<Value>,
    {
        let template = spec.template()?;
        let mut items = Vec::with_capacity(elements.len());
        for (index, element) in elements.iter().enumerate() {
            match eval_element(template, element) {
                Ok(value) => items.push(value),
                Err(e @ ExtractError::DepthExceeded(_)) => return Err(e),
                Err(e) => tracing::debug!(index, error = %e, "array element omitted"),
            }
        }
        self.finish(spec, Value::Array(items))
    }

    /// `jsonparse`: decode `text` and evaluate the template against it
    fn eval_embedded(&self, spec: &SpecNode, text: &str, depth: usize) -> Result<Value> {
        let template = spec.template()?;
        let doc = decode_embedded_json(text)?;
        let value = self.eval_json(template, &doc, depth + 1)?;
        self.finish(spec, value)
    }

    fn eval_json_value(&self, spec: &SpecNode, text: &str) -> Result<Value> {
        let json = decode_embedded_json(text)?;
        self.finish(spec, Value::Json(json))
    }

    fn unsupported(spec: &SpecNode, kind: PageKind) -> ExtractError {
        ExtractError::UnsupportedType {
            type_tag: spec.spec_type.tag(),
            page: kind.as_str(),
        }
    }

    /// Pattern selectors, shared by every document kind. `text` is the
    /// serialized context.
    fn eval_pattern(
        &self,
        spec: &SpecNode,
        engine: PatternEngine,
        pattern: &str,
        text: &str,
        kind: PageKind,
        depth: usize,
    ) -> Result<Value> {
        let key = format!("{}{}", engine.prefix(), pattern);
        let matched = cached(&self.cache.patterns, &key, || Pattern::compile(engine, pattern))?.first_match(text)?;
        let scalar = || {
            matched
                .as_ref()
                .map(|m| m.scalar().to_string())
                .ok_or_else(|| ExtractError::NodeNotFound(key.clone()))
        };

        match &spec.spec_type {
            SpecType::Int | SpecType::Float | SpecType::Bool | SpecType::String | SpecType::Text => {
                let value = coerce_scalar(scalar()?, &spec.spec_type)?;
                self.finish(spec, value)
            }
            SpecType::IntArray
            | SpecType::FloatArray
            | SpecType::BoolArray
            | SpecType::StringArray
            | SpecType::TextArray => {
                let items = matched.as_ref().map(MatchGroups::list).unwrap_or_default();
                let value = coerce_list(items, &spec.spec_type)?;
                self.finish(spec, value)
            }
            SpecType::JsonParse => self.eval_embedded(spec, &scalar()?, depth),
            SpecType::JsonValue => self.eval_json_value(spec, &scalar()?),
            SpecType::Map => {
                let text = scalar()?;
                self.assemble_map(spec, |child| self.eval_text(child, &text, depth + 1))
            }
            _ => Err(Self::unsupported(spec, kind)),
        }
    }

    fn eval_html(&self, spec: &SpecNode, html: &mut Html, context: &[NodeId], depth: usize) -> Result<Value> {
        self.enter(depth)?;

        let (nodes, mode, shown) = match &spec.selector {
            SelectorExpr::Pattern { engine, pattern } => {
                let text = context.first().map(|id| inner_html(html, *id)).unwrap_or_default();
                return self.eval_pattern(spec, *engine, pattern, &text, PageKind::Html, depth);
            }
            SelectorExpr::Current => (context.to_vec(), ContentMode::Text, String::new()),
            SelectorExpr::Native(raw) => {
                let chain = cached(&self.cache.selectors, raw, || SelectorChain::parse(raw))?;
                let nodes = chain.apply(html, context);
                (nodes, chain.mode.clone(), raw.clone())
            }
        };
        if nodes.is_empty() {
            return Err(ExtractError::NodeNotFound(format!("selector `{}`", shown)));
        }

        let first_attr = |name: &str| {
            html_extractor::attr(html, nodes[0], name)
                .ok_or_else(|| ExtractError::NodeNotFound(format!("attribute `{}` of `{}`", name, shown)))
        };

        let value = match &spec.spec_type {
            SpecType::Int | SpecType::Float | SpecType::Bool | SpecType::String | SpecType::Text => {
                let text = extract_content(html, &nodes, &mode)
                    .ok_or_else(|| ExtractError::NodeNotFound(format!("content of `{}`", shown)))?;
                coerce_scalar(text, &spec.spec_type)?
            }
            SpecType::IntArray
            | SpecType::FloatArray
            | SpecType::BoolArray
            | SpecType::StringArray
            | SpecType::TextArray => coerce_list(extract_content_each(html, &nodes, &mode), &spec.spec_type)?,
            SpecType::Html => Value::String(extract_content(html, &nodes, &ContentMode::Html).unwrap_or_default()),
            SpecType::OutHtml => {
                Value::String(extract_content(html, &nodes, &ContentMode::OuterHtml).unwrap_or_default())
            }
            SpecType::Href => Value::String(first_attr("href")?),
            SpecType::Src => Value::String(first_attr("src")?),
            SpecType::Alt => Value::String(first_attr("alt")?),
            SpecType::Attr(name) => Value::String(first_attr(name)?),
            SpecType::HrefArray => {
                Value::StringArray(extract_content_each(html, &nodes, &ContentMode::Attr("href".to_string())))
            }
            SpecType::AttrArray(name) => {
                Value::StringArray(extract_content_each(html, &nodes, &ContentMode::Attr(name.clone())))
            }
            SpecType::JsonParse | SpecType::JsonValue => {
                let text = extract_content(html, &nodes, &mode)
                    .ok_or_else(|| ExtractError::NodeNotFound(format!("content of `{}`", shown)))?;
                return if spec.spec_type == SpecType::JsonParse {
                    self.eval_embedded(spec, &text, depth)
                } else {
                    self.eval_json_value(spec, &text)
                };
            }
            SpecType::Array => {
                return self.assemble_array(spec, &nodes, |template, id| {
                    self.eval_html(template, html, &[*id], depth + 1)
                });
            }
            SpecType::Map => {
                return self.assemble_map(spec, |child| self.eval_html(child, html, &nodes, depth + 1));
            }
            SpecType::Unsupported(_) => return Err(Self::unsupported(spec, PageKind::Html)),
        };

        self.finish(spec, value)
    }

    fn eval_json(&self, spec: &SpecNode, json: &Json, depth: usize) -> Result<Value> {
        self.enter(depth)?;

        let target = match &spec.selector {
            SelectorExpr::Pattern { engine, pattern } => {
                let text = json.to_string();
                return self.eval_pattern(spec, *engine, pattern, &text, PageKind::Json, depth);
            }
            SelectorExpr::Current => json,
            SelectorExpr::Native(raw) => cached(&self.cache.paths, raw, || JsonPath::parse(raw))?.resolve(json)?,
        };

        let value = match &spec.spec_type {
            SpecType::Int => Value::Int(json_int(target)?),
            SpecType::Float => Value::Float(json_float(target)?),
            SpecType::Bool => Value::Bool(json_bool(target)?),
            SpecType::String | SpecType::Text => Value::String(json_string(target)?),
            SpecType::IntArray => Value::IntArray(json_items(target, json_int)?),
            SpecType::FloatArray => Value::FloatArray(json_items(target, json_float)?),
            SpecType::BoolArray => Value::BoolArray(json_items(target, json_bool)?),
            SpecType::StringArray | SpecType::TextArray => Value::StringArray(json_items(target, json_string)?),
            SpecType::JsonValue => match target {
                Json::String(text) => return self.eval_json_value(spec, text),
                other => Value::Json(other.clone()),
            },
            SpecType::JsonParse => match target {
                Json::String(text) => return self.eval_embedded(spec, text, depth),
                Json::Object(_) | Json::Array(_) => {
                    let inner = self.eval_json(spec.template()?, target, depth + 1)?;
                    return self.finish(spec, inner);
                }
                other => return Err(ExtractError::Decode(format!("jsonparse needs text, got {}", other))),
            },
            SpecType::Array => {
                let elements = target
                    .as_array()
                    .ok_or_else(|| ExtractError::Decode(format!("type `array` needs a json array, got {}", target)))?;
                return self.assemble_array(spec, elements, |template, element| {
                    self.eval_json(template, element, depth + 1)
                });
            }
            SpecType::Map => {
                return self.assemble_map(spec, |child| self.eval_json(child, target, depth + 1));
            }
            _ => return Err(Self::unsupported(spec, PageKind::Json)),
        };

        self.finish(spec, value)
    }

    fn eval_text(&self, spec: &SpecNode, text: &str, depth: usize) -> Result<Value> {
        self.enter(depth)?;

        if let SelectorExpr::Pattern { engine, pattern } = &spec.selector {
            return self.eval_pattern(spec, *engine, pattern, text, PageKind::Text, depth);
        }

        match &spec.spec_type {
            SpecType::Int | SpecType::Float | SpecType::Bool | SpecType::String | SpecType::Text => {
                let value = coerce_scalar(text.to_string(), &spec.spec_type)?;
                self.finish(spec, value)
            }
            SpecType::JsonParse => self.eval_embedded(spec, text, depth),
            SpecType::JsonValue => self.eval_json_value(spec, text),
            SpecType::Map => self.assemble_map(spec, |child| self.eval_text(child, text, depth + 1)),
            _ => Err(Self::unsupported(spec, PageKind::Text)),
        }
    }
}

fn json_int(json: &Json) -> Result<i64> {
    match json {
        Json::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| is_whole_i64(*f)).map(|f| f as i64))
            .ok_or_else(|| ExtractError::Decode(format!("{} is not an integer", n))),
        Json::String(s) => parse_int(s),
        other => Err(ExtractError::Decode(format!("{} is not an integer", other))),
    }
}

/// `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive
fn is_whole_i64(f: f64) -> bool {
    f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64
}

fn json_float(json: &Json) -> Result<f64> {
    match json {
        Json::Number(n) => n
            .as_f64()
            .ok_or_else(|| ExtractError::Decode(format!("{} is not a number", n))),
        Json::String(s) => parse_float(s),
        other => Err(ExtractError::Decode(format!("{} is not a number", other))),
    }
}

fn json_bool(json: &Json) -> Result<bool> {
    match json {
        Json::Bool(b) => Ok(*b),
        Json::String(s) => parse_bool(s),
        other => Err(ExtractError::Decode(format!("{} is not a boolean", other))),
    }
}

fn json_string(json: &Json) -> Result<String> {
    match json {
        Json::String(s) => Ok(s.clone()),
        Json::Number(n) => Ok(n.to_string()),
        Json::Bool(b) => Ok(b.to_string()),
        other => Err(ExtractError::Decode(format!("{} is not a string", other))),
    }
}

fn json_items<T>(json: &Json, convert: fn(&Json) -> Result<T>) -> Result<Vec<T>> {
    json.as_array()
        .ok_or_else(|| ExtractError::Decode(format!("{} is not an array", json)))?
        .iter()
        .map(convert)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BOOK: &str = r#"
        <html><body>
        <div id="book">
            <h1 class="title"> Dune </h1>
            <span class="year">1965</span>
            <span class="rating">4.25</span>
            <span class="stock">true</span>
            <a class="author" href="/author/herbert" title="Frank">Frank Herbert</a>
            <img class="cover" src="/img/dune.jpg" alt="Dune cover">
            <ul class="tags">
                <li>sf</li><li>classic</li><li>desert</li><li>politics</li><li>ecology</li>
            </ul>
            <ul class="scores"><li>5</li><li>3</li><li>x</li></ul>
            <script id="data">{"isbn": "0441013597", "pages": 412}</script>
            <div class="ad">buy now</div>
        </div>
        </body></html>
    "#;

    fn registry() -> FilterRegistry {
        FilterRegistry::builtin().unwrap()
    }

    fn html_spec(json: &str) -> SpecNode {
        SpecNode::from_json_str(json).unwrap()
    }

    fn eval_html(spec: &SpecNode) -> Result<Value> {
        let registry = registry();
        Evaluator::new(&registry).pipe_bytes(spec, BOOK.as_bytes(), PageKind::Html)
    }

    fn leaf(t: SpecType, selector: &str) -> SpecNode {
        SpecNode::new(t).with_selector(selector)
    }

    #[test]
    fn test_scalar_coercion() {
        let html = r#"<p class="n">123</p><p class="f">12.3</p>"#;
        let registry = registry();
        let evaluator = Evaluator::new(&registry);
        assert_eq!(
            evaluator.pipe_bytes(&leaf(SpecType::Int, "p.n"), html.as_bytes(), PageKind::Html).unwrap(),
            Value::Int(123)
        );
        assert_eq!(
            evaluator.pipe_bytes(&leaf(SpecType::Float, "p.f"), html.as_bytes(), PageKind::Html).unwrap(),
            Value::Float(12.3)
        );
        assert_eq!(eval_html(&leaf(SpecType::Bool, ".stock")).unwrap(), Value::Bool(true));
        assert!(matches!(eval_html(&leaf(SpecType::Int, "h1")), Err(ExtractError::Decode(_))));
    }

    #[test]
    fn test_strings_and_filters() {
        let title = leaf(SpecType::String, "h1.title").with_filter("trimspace|preadd(Book: )");
        assert_eq!(eval_html(&title).unwrap(), Value::from("Book: Dune"));

        let missing = leaf(SpecType::String, "h2");
        assert!(matches!(eval_html(&missing), Err(ExtractError::NodeNotFound(_))));
    }

    #[test]
    fn test_validator_rejection_surfaces() {
        let spec = leaf(SpecType::String, ".year").with_filter("_alpha|postadd(x)");
        match eval_html(&spec) {
            Err(ExtractError::InvalidContent { filter, value }) => {
                assert_eq!(filter, "_alpha");
                assert_eq!(*value, Value::from("1965"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_selector_chain_and_suffix() {
        assert_eq!(
            eval_html(&leaf(SpecType::String, "ul.tags > li | eq(1) | next")).unwrap(),
            Value::from("desert")
        );
        assert_eq!(
            eval_html(&leaf(SpecType::String, "a.author//attr[title]")).unwrap(),
            Value::from("Frank")
        );
        assert_eq!(
            eval_html(&leaf(SpecType::String, "ul.scores//html")).unwrap(),
            Value::from("<li>5</li><li>3</li><li>x</li>")
        );
    }

    #[test]
    fn test_legacy_tags() {
        assert_eq!(eval_html(&leaf(SpecType::Href, "a.author")).unwrap(), Value::from("/author/herbert"));
        assert_eq!(eval_html(&leaf(SpecType::Src, "img")).unwrap(), Value::from("/img/dune.jpg"));
        assert_eq!(eval_html(&leaf(SpecType::Alt, "img")).unwrap(), Value::from("Dune cover"));
        assert_eq!(
            eval_html(&leaf(SpecType::Attr("class".into()), "img")).unwrap(),
            Value::from("cover")
        );
        assert_eq!(
            eval_html(&leaf(SpecType::OutHtml, "span.year")).unwrap(),
            Value::from(r#"<span class="year">1965</span>"#)
        );
        assert_eq!(
            eval_html(&leaf(SpecType::HrefArray, "a, img")).unwrap(),
            Value::StringArray(vec!["/author/herbert".into()])
        );
        assert!(matches!(eval_html(&leaf(SpecType::Href, "img")), Err(ExtractError::NodeNotFound(_))));
    }

    #[test]
    fn test_arrays() {
        assert_eq!(
            eval_html(&leaf(SpecType::StringArray, "ul.tags li | filter(:nth-child(-n+2))")).unwrap(),
            Value::StringArray(vec!["sf".into(), "classic".into()])
        );
        // one bad element fails a typed list
        assert!(matches!(eval_html(&leaf(SpecType::IntArray, "ul.scores li")), Err(ExtractError::Decode(_))));

        // but an `array` drops the element and keeps going
        let spec = leaf(SpecType::Array, "ul.scores li").with_children(vec![SpecNode::new(SpecType::Int)]);
        assert_eq!(
            eval_html(&spec).unwrap(),
            Value::Array(vec![Value::Int(5), Value::Int(3)])
        );

        let no_template = leaf(SpecType::Array, "ul.scores li");
        assert!(matches!(eval_html(&no_template), Err(ExtractError::Schema(_))));
    }

    #[test]
    fn test_array_template_parsed_once() {
        let registry = registry();
        let evaluator = Evaluator::new(&registry);
        let spec = leaf(SpecType::Array, "ul.tags li")
            .with_children(vec![leaf(SpecType::String, r"regexp:(\w+)").with_filter("postadd(!)")]);
        let value = evaluator.pipe_bytes(&spec, BOOK.as_bytes(), PageKind::Html).unwrap();
        assert_eq!(value.to_json(), json!(["sf!", "classic!", "desert!", "politics!", "ecology!"]));

        assert_eq!(evaluator.cache.selectors.borrow().len(), 1);
        assert_eq!(evaluator.cache.patterns.borrow().len(), 1);
        assert_eq!(evaluator.cache.filters.borrow().len(), 1);
    }

    #[test]
    fn test_rejected_children_are_dropped() {
        let map = SpecNode::new(SpecType::Map).with_selector("#book").with_children(vec![
            leaf(SpecType::String, ".year").named("year"),
            leaf(SpecType::String, ".author").named("author").with_filter("_numeric"),
        ]);
        assert_eq!(eval_html(&map).unwrap().to_json(), json!({"year": "1965"}));

        let array = leaf(SpecType::Array, "ul.scores li")
            .with_children(vec![SpecNode::new(SpecType::String).with_filter("_numeric|postadd(pt)")]);
        assert_eq!(eval_html(&array).unwrap().to_json(), json!(["5pt", "3pt"]));

        // the composite's own chain still surfaces a rejection
        let strict = array.clone().with_filter("_required");
        let empty = leaf(SpecType::Array, "ul.scores li")
            .with_children(vec![SpecNode::new(SpecType::String).with_filter("_alpha|_numeric")])
            .with_filter("_required");
        assert!(eval_html(&strict).is_ok());
        assert!(matches!(eval_html(&empty), Err(ExtractError::InvalidContent { filter, .. }) if filter == "_required"));
    }

    #[test]
    fn test_map_omits_failed_children() {
        let spec = SpecNode::new(SpecType::Map).with_selector("#book").with_children(vec![
            leaf(SpecType::String, "h1").named("title").with_filter("trimspace"),
            leaf(SpecType::String, "h6.subtitle").named("subtitle"),
            leaf(SpecType::Int, "ignored"),
        ]);
        let value = eval_html(&spec).unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["title"], Value::from("Dune"));

        let unnamed_only = SpecNode::new(SpecType::Map).with_children(vec![leaf(SpecType::Int, ".year")]);
        assert!(matches!(eval_html(&unnamed_only), Err(ExtractError::Schema(_))));
    }

    #[test]
    fn test_jsonparse_inside_html() {
        let spec = html_spec(
            r#"{"selector": "script#data", "type": "jsonparse", "subitem": [
                {"type": "map", "subitem": [
                    {"name": "isbn", "selector": "isbn", "type": "string"},
                    {"name": "pages", "selector": "pages", "type": "int"}
                ]}
            ]}"#,
        );
        let value = eval_html(&spec).unwrap();
        assert_eq!(value.to_json(), json!({"isbn": "0441013597", "pages": 412}));

        let raw = leaf(SpecType::JsonValue, "script#data");
        assert_eq!(eval_html(&raw).unwrap(), Value::Json(json!({"isbn": "0441013597", "pages": 412})));
    }

    #[test]
    fn test_rm_only_affects_this_document() {
        let spec = SpecNode::new(SpecType::Map).with_children(vec![
            leaf(SpecType::Int, "#book | rm(.ad) | children | filter(.year)").named("year"),
            leaf(SpecType::String, ".ad").named("ad"),
        ]);
        let registry = registry();
        let evaluator = Evaluator::new(&registry);
        let mut doc = Document::parse(BOOK.as_bytes(), PageKind::Html).unwrap();

        // children run in order, so `ad` sees the pruned tree
        let value = evaluator.evaluate(&spec, &mut doc).unwrap();
        assert_eq!(value.to_json(), json!({"year": 1965}));
        let again = evaluator.evaluate(&leaf(SpecType::String, ".ad"), &mut doc);
        assert!(matches!(again, Err(ExtractError::NodeNotFound(_))));

        let fresh = evaluator.pipe_bytes(&leaf(SpecType::String, ".ad"), BOOK.as_bytes(), PageKind::Html);
        assert_eq!(fresh.unwrap(), Value::from("buy now"));
    }

    #[test]
    fn test_patterns_on_html() {
        let year = leaf(SpecType::Int, r#"regexp:class="year">(\d+)<"#);
        assert_eq!(eval_html(&year).unwrap(), Value::Int(1965));

        let lookbehind = leaf(SpecType::String, r"regexp2:(?<=/author/)\w+");
        assert_eq!(eval_html(&lookbehind).unwrap(), Value::from("herbert"));

        let none = leaf(SpecType::String, "regexp:nothing-here");
        assert!(matches!(eval_html(&none), Err(ExtractError::NodeNotFound(_))));
        let empty_list = leaf(SpecType::StringArray, "regexp:nothing-here");
        assert_eq!(eval_html(&empty_list).unwrap(), Value::StringArray(vec![]));

        let array = leaf(SpecType::Array, r"regexp:\d+").with_children(vec![SpecNode::new(SpecType::Int)]);
        assert!(matches!(eval_html(&array), Err(ExtractError::UnsupportedType { .. })));
    }

    #[test]
    fn test_unsupported_types() {
        let spec = html_spec(r#"{"selector": "h1", "type": "date"}"#);
        match eval_html(&spec) {
            Err(ExtractError::UnsupportedType { type_tag, page }) => {
                assert_eq!(type_tag, "date");
                assert_eq!(page, "html");
            }
            other => panic!("expected unsupported type, got {:?}", other),
        }
        let untyped = html_spec(r#"{"selector": "h1"}"#);
        assert!(matches!(eval_html(&untyped), Err(ExtractError::UnsupportedType { .. })));
    }

    fn eval_json(spec: &SpecNode, body: &Json) -> Result<Value> {
        let registry = registry();
        Evaluator::new(&registry).evaluate(spec, &mut Document::Json(body.clone()))
    }

    #[test]
    fn test_json_backend() {
        let body = json!({
            "data": {
                "title": "Dune",
                "year": 1965,
                "price": "9.99",
                "ok": "true",
                "tags": ["sf", "classic"],
                "scores": [5, "3"],
                "items": [{"n": 1}, {"n": "two"}, {"n": 3}],
                "embedded": "{\"a\": 1}"
            }
        });

        assert_eq!(eval_json(&leaf(SpecType::String, "data.title"), &body).unwrap(), Value::from("Dune"));
        assert_eq!(eval_json(&leaf(SpecType::Int, "data.year"), &body).unwrap(), Value::Int(1965));
        assert_eq!(eval_json(&leaf(SpecType::String, "data.year"), &body).unwrap(), Value::from("1965"));
        assert_eq!(eval_json(&leaf(SpecType::Float, "data.price"), &body).unwrap(), Value::Float(9.99));
        assert_eq!(eval_json(&leaf(SpecType::Bool, "data.ok"), &body).unwrap(), Value::Bool(true));
        assert_eq!(
            eval_json(&leaf(SpecType::StringArray, "data.tags"), &body).unwrap(),
            Value::StringArray(vec!["sf".into(), "classic".into()])
        );
        assert_eq!(
            eval_json(&leaf(SpecType::IntArray, "data.scores"), &body).unwrap(),
            Value::IntArray(vec![5, 3])
        );
        assert_eq!(eval_json(&leaf(SpecType::String, "data.tags[1]"), &body).unwrap(), Value::from("classic"));

        let items = leaf(SpecType::Array, "data.items")
            .with_children(vec![leaf(SpecType::Int, "n")]);
        assert_eq!(
            eval_json(&items, &body).unwrap(),
            Value::Array(vec![Value::Int(1), Value::Int(3)])
        );

        let embedded = leaf(SpecType::JsonParse, "data.embedded").with_children(vec![leaf(SpecType::Int, "a")]);
        assert_eq!(eval_json(&embedded, &body).unwrap(), Value::Int(1));

        assert!(matches!(eval_json(&leaf(SpecType::String, "data.nope"), &body), Err(ExtractError::NodeNotFound(_))));
        assert!(matches!(eval_json(&leaf(SpecType::Array, "data.title"), &body), Err(ExtractError::Decode(_))));
        assert!(matches!(eval_json(&leaf(SpecType::Href, "data.title"), &body), Err(ExtractError::UnsupportedType { .. })));
    }

    #[test]
    fn test_json_int_range() {
        let spec = leaf(SpecType::Int, "n");
        assert_eq!(eval_json(&spec, &json!({"n": 3.0})).unwrap(), Value::Int(3));
        assert_eq!(eval_json(&spec, &json!({"n": -9.0e18})).unwrap(), Value::Int(-9_000_000_000_000_000_000));
        for out_of_range in [json!({"n": 1e20}), json!({"n": -1e20}), json!({"n": u64::MAX}), json!({"n": 2.5})] {
            assert!(
                matches!(eval_json(&spec, &out_of_range), Err(ExtractError::Decode(_))),
                "{} should not fit an int",
                out_of_range
            );
        }
    }

    #[test]
    fn test_json_pattern_serializes_context() {
        let body = json!({"id": "item-42"});
        let spec = leaf(SpecType::Int, r"regexp:item-(\d+)");
        assert_eq!(eval_json(&spec, &body).unwrap(), Value::Int(42));
    }

    #[test]
    fn test_text_backend() {
        let registry = registry();
        let evaluator = Evaluator::new(&registry);
        let body = b"name=Dune; year=1965; tags=sf,classic";

        let year = leaf(SpecType::Int, r"regexp:year=(\d+)");
        assert_eq!(evaluator.pipe_bytes(&year, body, PageKind::Text).unwrap(), Value::Int(1965));

        let pairs = leaf(SpecType::StringArray, r"regexp:name=(\w+); year=(\d+)");
        assert_eq!(
            evaluator.pipe_bytes(&pairs, body, PageKind::Text).unwrap(),
            Value::StringArray(vec!["Dune".into(), "1965".into()])
        );

        let record = SpecNode::new(SpecType::Map).with_children(vec![
            leaf(SpecType::String, r"regexp:name=(\w+)").named("name"),
            leaf(SpecType::String, r"regexp:tags=([\w,]+)").named("tags").with_filter("split(,)"),
            leaf(SpecType::Int, r"regexp:pages=(\d+)").named("pages"),
        ]);
        let value = evaluator.pipe_bytes(&record, body, PageKind::Text).unwrap();
        assert_eq!(value.to_json(), json!({"name": "Dune", "tags": ["sf", "classic"]}));

        let whole = SpecNode::new(SpecType::String).with_filter("substr(0,9)");
        assert_eq!(evaluator.pipe_bytes(&whole, body, PageKind::Text).unwrap(), Value::from("name=Dune"));

        let array = SpecNode::new(SpecType::Array).with_children(vec![SpecNode::new(SpecType::String)]);
        assert!(matches!(
            evaluator.pipe_bytes(&array, body, PageKind::Text),
            Err(ExtractError::UnsupportedType { page: "text", .. })
        ));
    }

    #[test]
    fn test_pattern_map_on_matched_text() {
        let registry = registry();
        let evaluator = Evaluator::new(&registry);
        let spec = SpecNode::new(SpecType::Map)
            .with_selector(r"regexp:<b>(.*?)</b>")
            .with_children(vec![
                leaf(SpecType::Int, r"regexp:(\d+)").named("n"),
                leaf(SpecType::String, "").named("raw"),
            ]);
        let value = evaluator
            .pipe_bytes(&spec, b"<i>0</i><b>item 7</b>", PageKind::Text)
            .unwrap();
        assert_eq!(value.to_json(), json!({"n": 7, "raw": "item 7"}));
    }

    #[test]
    fn test_depth_guard() {
        let mut spec = SpecNode::new(SpecType::String);
        for _ in 0..5 {
            spec = SpecNode::new(SpecType::Map).with_children(vec![spec.named("inner")]);
        }
        let registry = registry();
        let shallow = Evaluator::with_options(&registry, &EvaluatorOptions { max_depth: 3 });
        assert!(matches!(
            shallow.pipe_bytes(&spec, b"x", PageKind::Text),
            Err(ExtractError::DepthExceeded(3))
        ));
        assert!(Evaluator::new(&registry).pipe_bytes(&spec, b"x", PageKind::Text).is_ok());
    }

    #[test]
    fn test_page_kind_parsing() {
        assert_eq!("HTML".parse::<PageKind>().unwrap(), PageKind::Html);
        assert_eq!("js".parse::<PageKind>().unwrap(), PageKind::Text);
        assert_eq!("xml".parse::<PageKind>().unwrap(), PageKind::Text);
        assert!("pdf".parse::<PageKind>().is_err());
        assert!(matches!(Document::parse(b"{oops", PageKind::Json), Err(ExtractError::Decode(_))));
    }
}
