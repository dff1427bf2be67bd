//! Reading text, markup and attributes out of an HTML node-set

use ego_tree::NodeId;
use scraper::{ElementRef, Html};

use super::selector_chain::ContentMode;

/// Concatenated text of every text node below `id`
pub fn node_text(html: &Html, id: NodeId) -> String {
    html.tree
        .get(id)
        .map(|node| {
            node.descendants()
                .filter_map(|n| n.value().as_text().map(|t| &**t))
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Markup inside `id`. The document node renders as its root element.
pub fn inner_html(html: &Html, id: NodeId) -> String {
    match html.tree.get(id).and_then(ElementRef::wrap) {
        Some(el) => el.inner_html(),
        None => html.root_element().html(),
    }
}

pub fn outer_html(html: &Html, id: NodeId) -> String {
    match html.tree.get(id).and_then(ElementRef::wrap) {
        Some(el) => el.html(),
        None => html.root_element().html(),
    }
}

pub fn attr(html: &Html, id: NodeId, name: &str) -> Option<String> {
    html.tree
        .get(id)
        .and_then(ElementRef::wrap)
        .and_then(|el| el.value().attr(name).map(String::from))
}

/// The node-set read as one string: text and markup are concatenated over
/// every node, an attribute comes from the first node only.
pub fn extract_content(html: &Html, nodes: &[NodeId], mode: &ContentMode) -> Option<String> {
    match mode {
        ContentMode::Text => Some(nodes.iter().map(|id| node_text(html, *id)).collect()),
        ContentMode::Html => Some(nodes.iter().map(|id| inner_html(html, *id)).collect()),
        ContentMode::OuterHtml => Some(nodes.iter().map(|id| outer_html(html, *id)).collect()),
        ContentMode::Attr(name) => nodes.first().and_then(|id| attr(html, *id, name)),
    }
}

/// One string per node. Nodes without the requested attribute are skipped.
pub fn extract_content_each(html: &Html, nodes: &[NodeId], mode: &ContentMode) -> Vec<String> {
    nodes
        .iter()
        .filter_map(|id| match mode {
            ContentMode::Text => Some(node_text(html, *id)),
            ContentMode::Html => Some(inner_html(html, *id)),
            ContentMode::OuterHtml => Some(outer_html(html, *id)),
            ContentMode::Attr(name) => attr(html, *id, name),
        })
        .collect()
}
