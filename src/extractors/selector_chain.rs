//! HTML selector chains
//!
//! `ul > li | eq(1) | next//attr[href]`: a CSS selector found within the
//! current node-set, then `|`-separated navigation and filtering operators,
//! then an optional content suffix after the first `//`.

use ego_tree::{NodeId, NodeRef};
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::error::{ExtractError, Result};

static OP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^([A-Za-z_]+)\s*(?:\((.*)\))?$").expect("valid operator pattern"));

/// What is read from each node of the final set
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ContentMode {
    #[default]
    Text,
    Attr(String),
    Html,
    OuterHtml,
}

impl ContentMode {
    fn parse(raw: &str) -> Self {
        if let Some(name) = raw.strip_prefix("attr[").and_then(|r| r.strip_suffix(']')) {
            if !name.is_empty() {
                return ContentMode::Attr(name.to_string());
            }
        }
        match raw {
            "html" => ContentMode::Html,
            "outhtml" => ContentMode::OuterHtml,
            _ => ContentMode::Text,
        }
    }
}

/// Tree relation walked by navigation operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relation {
    Next,
    Prev,
    NextAll,
    PrevAll,
    Siblings,
    Children,
    Parent,
    Parents,
}

#[derive(Debug, Clone)]
enum ChainOp {
    Eq(i64),
    First,
    Last,
    /// Walk a relation, optionally keeping only matches of a selector
    Walk(Relation, Option<Selector>),
    Keep(Selector),
    Drop(Selector),
    Remove(Selector),
    /// Unknown operator, or a filter with an empty argument
    Pass,
}

impl ChainOp {
    fn parse(raw: &str) -> Result<Self> {
        let caps = OP_RE
            .captures(raw)
            .ok_or_else(|| ExtractError::SelectorSyntax(format!("bad selector operator `{}`", raw)))?;
        let name = caps.get(1).map_or("", |m| m.as_str());
        let arg = caps.get(2).map_or("", |m| m.as_str().trim());

        let nav = |relation: Relation| -> Result<ChainOp> { Ok(ChainOp::Walk(relation, None)) };
        let filtered = |relation: Relation| -> Result<ChainOp> {
            Ok(match optional_selector(arg)? {
                Some(sel) => ChainOp::Walk(relation, Some(sel)),
                None => ChainOp::Pass,
            })
        };

        match name {
            "eq" => Ok(ChainOp::Eq(arg.trim().parse().unwrap_or_else(|_| {
                tracing::debug!(arg, "eq argument is not an integer, using 0");
                0
            }))),
            "first" => Ok(ChainOp::First),
            "last" => Ok(ChainOp::Last),
            "next" => nav(Relation::Next),
            "prev" => nav(Relation::Prev),
            "nextall" => nav(Relation::NextAll),
            "siblings" => nav(Relation::Siblings),
            "children" => nav(Relation::Children),
            "parent" => nav(Relation::Parent),
            "parents" => nav(Relation::Parents),
            "nextfilter" => filtered(Relation::Next),
            "prevfilter" => filtered(Relation::Prev),
            "nextallfilter" => filtered(Relation::NextAll),
            "prevallfilter" => filtered(Relation::PrevAll),
            "siblingsfilter" => filtered(Relation::Siblings),
            "childrenfilter" => filtered(Relation::Children),
            "parentfilter" => filtered(Relation::Parent),
            "parentsfilter" => filtered(Relation::Parents),
            "filter" => Ok(optional_selector(arg)?.map_or(ChainOp::Pass, ChainOp::Keep)),
            "not" => Ok(optional_selector(arg)?.map_or(ChainOp::Pass, ChainOp::Drop)),
            "rm" => Ok(optional_selector(arg)?.map_or(ChainOp::Pass, ChainOp::Remove)),
            other => {
                tracing::debug!(operator = other, "unknown selector operator ignored");
                Ok(ChainOp::Pass)
            }
        }
    }
}

pub(crate) fn parse_css(raw: &str) -> Result<Selector> {
    Selector::parse(raw).map_err(|e| ExtractError::SelectorSyntax(format!("`{}`: {}", raw, e)))
}

fn optional_selector(arg: &str) -> Result<Option<Selector>> {
    if arg.is_empty() {
        Ok(None)
    } else {
        parse_css(arg).map(Some)
    }
}

/// A parsed selector chain
#[derive(Debug, Clone)]
pub struct SelectorChain {
    source: String,
    primary: Option<Selector>,
    ops: Vec<ChainOp>,
    pub mode: ContentMode,
}

impl SelectorChain {
    pub fn parse(raw: &str) -> Result<Self> {
        let (chain, mode) = match raw.find("//") {
            Some(idx) if idx > 0 => (raw[..idx].trim(), ContentMode::parse(raw[idx + 2..].trim())),
            _ => (raw.trim(), ContentMode::Text),
        };

        let mut parts = chain.split('|').map(str::trim);
        let primary = match parts.next() {
            Some(css) if !css.is_empty() => Some(parse_css(css)?),
            _ => None,
        };
        let ops = parts.map(ChainOp::parse).collect::<Result<Vec<_>>>()?;

        Ok(Self {
            source: chain.to_string(),
            primary,
            ops,
            mode,
        })
    }

    /// The selector text without its content suffix
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Runs the chain from `context`. Only `rm` writes to `html`.
    pub fn apply(&self, html: &mut Html, context: &[NodeId]) -> Vec<NodeId> {
        let mut nodes = match &self.primary {
            Some(sel) => find(html, context, sel),
            None => context.to_vec(),
        };

        for op in &self.ops {
            nodes = match op {
                ChainOp::Eq(n) => {
                    let index = if *n < 0 { nodes.len() as i64 + n } else { *n };
                    usize::try_from(index)
                        .ok()
                        .and_then(|i| nodes.get(i).copied())
                        .into_iter()
                        .collect()
                }
                ChainOp::First => nodes.first().copied().into_iter().collect(),
                ChainOp::Last => nodes.last().copied().into_iter().collect(),
                ChainOp::Walk(relation, filter) => {
                    let walked = walk(html, &nodes, *relation);
                    match filter {
                        Some(sel) => retain(html, walked, sel, true),
                        None => walked,
                    }
                }
                ChainOp::Keep(sel) => retain(html, nodes, sel, true),
                ChainOp::Drop(sel) => retain(html, nodes, sel, false),
                ChainOp::Remove(sel) => {
                    for id in find(html, &nodes, sel) {
                        if let Some(mut node) = html.tree.get_mut(id) {
                            node.detach();
                        }
                    }
                    nodes
                }
                ChainOp::Pass => nodes,
            };
        }

        nodes
    }
}

fn element_matches(node: NodeRef<'_, Node>, sel: &Selector) -> bool {
    ElementRef::wrap(node).is_some_and(|el| sel.matches(&el))
}

/// Descendants of every context node matching `sel`, deduplicated
fn find(html: &Html, context: &[NodeId], sel: &Selector) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();
    for node in context.iter().filter_map(|id| html.tree.get(*id)) {
        for candidate in node.descendants().skip(1) {
            if element_matches(candidate, sel) && seen.insert(candidate.id()) {
                found.push(candidate.id());
            }
        }
    }
    found
}

fn retain(html: &Html, nodes: Vec<NodeId>, sel: &Selector, keep_matches: bool) -> Vec<NodeId> {
    nodes
        .into_iter()
        .filter(|id| {
            html.tree
                .get(*id)
                .is_some_and(|node| node.value().is_element() && element_matches(node, sel) == keep_matches)
        })
        .collect()
}

fn walk(html: &Html, nodes: &[NodeId], relation: Relation) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for node in nodes.iter().filter_map(|id| html.tree.get(*id)) {
        let related: Vec<NodeRef<'_, Node>> = match relation {
            Relation::Next => node.next_siblings().find(is_element).into_iter().collect(),
            Relation::Prev => node.prev_siblings().find(is_element).into_iter().collect(),
            Relation::NextAll => node.next_siblings().filter(is_element).collect(),
            Relation::PrevAll => node.prev_siblings().filter(is_element).collect(),
            Relation::Siblings => node
                .parent()
                .map(|parent| {
                    parent
                        .children()
                        .filter(|c| is_element(c) && c.id() != node.id())
                        .collect()
                })
                .unwrap_or_default(),
            Relation::Children => node.children().filter(is_element).collect(),
            Relation::Parent => node.parent().filter(is_element).into_iter().collect(),
            Relation::Parents => node.ancestors().filter(is_element).collect(),
        };
        for r in related {
            if seen.insert(r.id()) {
                out.push(r.id());
            }
        }
    }

    out
}

fn is_element(node: &NodeRef<'_, Node>) -> bool {
    node.value().is_element()
}
