//! Separator checks around a candidate span.
//!
//! A span only counts as a standalone token if the character on each side is a
//! separator, or if the span touches the node edge and the neighboring node
//! ends (or starts) with one. This keeps `foo@bar.com` from producing a
//! mention and lets a match run right up to a node boundary.

use crate::document::{Document, NodeId};
use crate::nodes::NodeKind;

pub fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, '.' | ',' | ';')
}

pub fn starts_with_separator(text: &str) -> bool {
    text.chars().next().is_some_and(is_separator)
}

pub fn ends_with_separator(text: &str) -> bool {
    text.chars().next_back().is_some_and(is_separator)
}

/// Whatever precedes `node` allows a token to start at its first character.
pub fn is_previous_node_valid(doc: &Document, node: NodeId) -> bool {
    let mut previous = doc.previous_sibling(node);
    if let Some(sibling) = previous {
        if doc.get(sibling).is_some_and(NodeKind::is_element) {
            previous = doc.last_descendant(sibling);
        }
    }
    match previous.and_then(|p| doc.get(p)) {
        None | Some(NodeKind::LineBreak) => true,
        Some(NodeKind::Text(text)) => ends_with_separator(&text.text),
        Some(_) => false,
    }
}

/// Whatever follows `node` allows a token to end at its last character.
pub fn is_next_node_valid(doc: &Document, node: NodeId) -> bool {
    let mut next = doc.next_sibling(node);
    if let Some(sibling) = next {
        if doc.get(sibling).is_some_and(NodeKind::is_element) {
            next = doc.first_descendant(sibling);
        }
    }
    match next.and_then(|n| doc.get(n)) {
        None | Some(NodeKind::LineBreak) => true,
        Some(NodeKind::Text(text)) => starts_with_separator(&text.text),
        Some(_) => false,
    }
}

/// Check the context of the span `start..end` (byte offsets into `text`, the
/// full content of `node`).
pub fn is_content_around_valid(
    doc: &Document,
    node: NodeId,
    text: &str,
    start: usize,
    end: usize,
) -> bool {
    let before_valid = if start > 0 {
        text[..start].chars().next_back().is_some_and(is_separator)
    } else {
        is_previous_node_valid(doc, node)
    };
    if !before_valid {
        return false;
    }

    if end < text.len() {
        text[end..].chars().next().is_some_and(is_separator)
    } else {
        is_next_node_valid(doc, node)
    }
}
