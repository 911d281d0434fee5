//! Arena-backed document tree.
//!
//! Nodes live in a slot vector and are addressed by [`NodeId`] handles. Each
//! slot records its parent and ordered children, so every structural edit
//! (split, replace, remove) is an index edit on a children list. Handles of
//! removed nodes are never reused within a document.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EditorError;
use crate::nodes::{NodeKind, NodeTypes, TextNode};

/// Stable handle to a node in a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct Slot {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Serialized form of a subtree, used to hand documents across process or
/// FFI boundaries and for persistence by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedNode {
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SerializedNode>,
}

impl SerializedNode {
    pub fn leaf(kind: NodeKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
        }
    }

    pub fn element(kind: NodeKind, children: Vec<SerializedNode>) -> Self {
        Self { kind, children }
    }
}

/// Document tree with a fixed set of accepted node types.
#[derive(Debug, Clone)]
pub struct Document {
    slots: Vec<Option<Slot>>,
    root: NodeId,
    types: NodeTypes,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Empty document accepting only structural nodes.
    pub fn new() -> Self {
        Self::with_types(NodeTypes::STRUCTURAL)
    }

    /// Empty document accepting `types` in addition to the structural nodes.
    pub fn with_types(types: NodeTypes) -> Self {
        let root = Slot {
            kind: NodeKind::Root,
            parent: None,
            children: Vec::new(),
        };
        Self {
            slots: vec![Some(root)],
            root: NodeId(0),
            types: types | NodeTypes::STRUCTURAL,
        }
    }

    /// Build `root > paragraph > (text | line-break)*` from plain post text.
    pub fn from_plain_text(content: &str, types: NodeTypes) -> Self {
        let mut doc = Self::with_types(types);
        let paragraph = doc.alloc(NodeKind::Paragraph, Some(doc.root));
        doc.slot_mut(doc.root).children.push(paragraph);

        for (i, line) in content.split('\n').enumerate() {
            if i > 0 {
                let br = doc.alloc(NodeKind::LineBreak, Some(paragraph));
                doc.slot_mut(paragraph).children.push(br);
            }
            if !line.is_empty() {
                let text = doc.alloc(NodeKind::text(line), Some(paragraph));
                doc.slot_mut(paragraph).children.push(text);
            }
        }
        doc
    }

    // === Registration ===

    pub fn register(&mut self, types: NodeTypes) {
        self.types |= types;
    }

    pub fn registered(&self) -> NodeTypes {
        self.types
    }

    pub fn has_types(&self, types: NodeTypes) -> bool {
        self.types.contains(types)
    }

    // === Queries ===

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn contains(&self, id: NodeId) -> bool {
        matches!(self.slots.get(id.index()), Some(Some(_)))
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeKind> {
        self.slot(id).map(|s| &s.kind)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut NodeKind> {
        self.slots
            .get_mut(id.index())
            .and_then(|s| s.as_mut())
            .map(|s| &mut s.kind)
    }

    /// Like [`Document::get`], but a missing node is an error.
    pub fn kind(&self, id: NodeId) -> Result<&NodeKind, EditorError> {
        self.get(id).ok_or(EditorError::MissingNode(id))
    }

    pub fn node_type(&self, id: NodeId) -> Option<NodeTypes> {
        self.get(id).map(NodeKind::node_type)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).and_then(|s| s.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.slot(id).map(|s| s.children.as_slice()).unwrap_or(&[])
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|c| *c == id)
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        index
            .checked_sub(1)
            .and_then(|i| self.children(parent).get(i).copied())
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        self.children(parent).get(index + 1).copied()
    }

    /// Deepest first node under `id`, descending through element children.
    pub fn first_descendant(&self, id: NodeId) -> Option<NodeId> {
        let mut node = *self.children(id).first()?;
        while let Some(child) = self.children(node).first() {
            node = *child;
        }
        Some(node)
    }

    /// Deepest last node under `id`, descending through element children.
    pub fn last_descendant(&self, id: NodeId) -> Option<NodeId> {
        let mut node = *self.children(id).last()?;
        while let Some(child) = self.children(node).last() {
            node = *child;
        }
        Some(node)
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.get(id)
            .and_then(NodeKind::as_text)
            .map(|t| t.text.as_str())
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        self.text(id).is_some()
    }

    pub fn is_simple_text(&self, id: NodeId) -> bool {
        self.get(id)
            .and_then(NodeKind::as_text)
            .is_some_and(TextNode::is_simple)
    }

    pub fn is_link_like(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(NodeKind::is_link_like)
    }

    /// Plain text the subtree stands for.
    ///
    /// Leaf embeds contribute the span they replaced, line breaks a newline,
    /// and root-level blocks are separated by newlines.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_text_content(id, &mut out);
        out
    }

    fn write_text_content(&self, id: NodeId, out: &mut String) {
        let Some(kind) = self.get(id) else {
            return;
        };
        match kind {
            NodeKind::Text(text) => out.push_str(&text.text),
            NodeKind::LineBreak => out.push('\n'),
            NodeKind::Media(media) => out.push_str(&media.source),
            NodeKind::Mention(mention) => out.push_str(&mention.source),
            NodeKind::Root => {
                for (i, child) in self.children(id).iter().enumerate() {
                    if i > 0 {
                        out.push('\n');
                    }
                    self.write_text_content(*child, out);
                }
            }
            NodeKind::Paragraph
            | NodeKind::Autolink(_)
            | NodeKind::EditableMention(_)
            | NodeKind::Reference(_) => {
                for child in self.children(id) {
                    self.write_text_content(*child, out);
                }
            }
        }
    }

    /// Nodes under `id` in document order, `id` excluded.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev());
        }
        out
    }

    /// All text nodes attached to the tree, in document order.
    pub fn text_nodes(&self) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|id| self.is_text(*id))
            .collect()
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    // === Edits ===

    /// Allocate a detached node. Its type must be registered.
    pub fn create(&mut self, kind: NodeKind) -> Result<NodeId, EditorError> {
        if !self.types.contains(kind.node_type()) {
            return Err(EditorError::UnregisteredNode { kind: kind.name() });
        }
        if matches!(kind, NodeKind::Root) {
            return Err(EditorError::UnregisteredNode { kind: kind.name() });
        }
        Ok(self.alloc(kind, None))
    }

    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) -> Result<(), EditorError> {
        let node = self.text_node_mut(id)?;
        node.text = text.into();
        Ok(())
    }

    /// Append a detached node as the last child of `parent`.
    pub fn append(&mut self, parent: NodeId, child: NodeId) -> Result<(), EditorError> {
        self.check_attachable(parent, child)?;
        self.slot_mut(child).parent = Some(parent);
        self.slot_mut(parent).children.push(child);
        Ok(())
    }

    /// Insert a detached node right after `anchor`.
    pub fn insert_after(&mut self, anchor: NodeId, node: NodeId) -> Result<(), EditorError> {
        self.insert_at_offset(anchor, node, 1)
    }

    /// Insert a detached node right before `anchor`.
    pub fn insert_before(&mut self, anchor: NodeId, node: NodeId) -> Result<(), EditorError> {
        self.insert_at_offset(anchor, node, 0)
    }

    fn insert_at_offset(
        &mut self,
        anchor: NodeId,
        node: NodeId,
        offset: usize,
    ) -> Result<(), EditorError> {
        let parent = self
            .parent(anchor)
            .ok_or(EditorError::InvalidTreeEdit(anchor))?;
        self.check_attachable(parent, node)?;
        let index = self
            .index_in_parent(anchor)
            .ok_or(EditorError::InvalidTreeEdit(anchor))?;
        self.slot_mut(node).parent = Some(parent);
        self.slot_mut(parent).children.insert(index + offset, node);
        Ok(())
    }

    /// Unlink a node from its parent, keeping it (and its subtree) alive.
    pub fn detach(&mut self, id: NodeId) -> Result<(), EditorError> {
        if id == self.root {
            return Err(EditorError::InvalidTreeEdit(id));
        }
        let parent = self.slot(id).ok_or(EditorError::MissingNode(id))?.parent;
        if let Some(parent) = parent {
            self.slot_mut(parent).children.retain(|c| *c != id);
        }
        self.slot_mut(id).parent = None;
        Ok(())
    }

    /// Unlink a node and free it together with its subtree.
    pub fn remove(&mut self, id: NodeId) -> Result<(), EditorError> {
        self.detach(id)?;
        self.free_subtree(id);
        Ok(())
    }

    /// Put detached `new` where `old` is and free `old` with its subtree.
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> Result<(), EditorError> {
        if old == new {
            return Ok(());
        }
        self.insert_before(old, new)?;
        self.remove(old)
    }

    /// Split a text node at byte offsets.
    ///
    /// The first piece keeps the original handle; later pieces are new
    /// siblings inserted after it, carrying the same format and mode. Offsets
    /// at the node boundaries are ignored, so no empty piece is produced.
    pub fn split_text(&mut self, id: NodeId, offsets: &[usize]) -> Result<Vec<NodeId>, EditorError> {
        let template = self
            .get(id)
            .ok_or(EditorError::MissingNode(id))?
            .as_text()
            .ok_or_else(|| self.unexpected(id, "text"))?
            .clone();
        let text = &template.text;

        for &offset in offsets {
            if offset > text.len() || !text.is_char_boundary(offset) {
                return Err(EditorError::InvalidOffset { id, offset });
            }
        }
        let mut cuts: Vec<usize> = offsets
            .iter()
            .copied()
            .filter(|o| *o > 0 && *o < text.len())
            .collect();
        cuts.sort_unstable();
        cuts.dedup();
        if cuts.is_empty() {
            return Ok(vec![id]);
        }
        if self.parent(id).is_none() {
            return Err(EditorError::InvalidTreeEdit(id));
        }

        let mut bounds = Vec::with_capacity(cuts.len() + 2);
        bounds.push(0);
        bounds.extend(cuts);
        bounds.push(text.len());

        let mut pieces = vec![id];
        let mut anchor = id;
        for window in bounds.windows(2).skip(1) {
            let piece = TextNode {
                text: text[window[0]..window[1]].to_owned(),
                ..template.clone()
            };
            let node = self.alloc(NodeKind::Text(piece), None);
            self.insert_after(anchor, node)?;
            pieces.push(node);
            anchor = node;
        }
        self.text_node_mut(id)?.text = text[..bounds[1]].to_owned();
        Ok(pieces)
    }

    // === Serialization ===

    pub fn export(&self) -> SerializedNode {
        self.export_node(self.root)
    }

    fn export_node(&self, id: NodeId) -> SerializedNode {
        let kind = self.get(id).cloned().unwrap_or(NodeKind::Root);
        let children = self
            .children(id)
            .iter()
            .map(|c| self.export_node(*c))
            .collect();
        SerializedNode { kind, children }
    }

    /// Rebuild a document from its serialized root.
    pub fn import(root: &SerializedNode, types: NodeTypes) -> Result<Self, EditorError> {
        let mut doc = Self::with_types(types);
        if root.kind != NodeKind::Root {
            return Err(EditorError::UnregisteredNode {
                kind: root.kind.name(),
            });
        }
        let doc_root = doc.root;
        for child in &root.children {
            doc.import_node(doc_root, child)?;
        }
        Ok(doc)
    }

    fn import_node(&mut self, parent: NodeId, node: &SerializedNode) -> Result<(), EditorError> {
        let id = self.create(node.kind.clone())?;
        self.append(parent, id)?;
        for child in &node.children {
            self.import_node(id, child)?;
        }
        Ok(())
    }

    /// Indented one-line-per-node rendering of the tree.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        self.write_outline(self.root, 0, &mut out);
        out
    }

    fn write_outline(&self, id: NodeId, depth: usize, out: &mut String) {
        let Some(kind) = self.get(id) else {
            return;
        };
        for _ in 0..depth {
            out.push_str("  ");
        }
        let line = match kind {
            NodeKind::Root | NodeKind::Paragraph | NodeKind::LineBreak => {
                kind.name().to_owned()
            }
            NodeKind::Text(text) if text.format.is_empty() => format!("text {:?}", text.text),
            NodeKind::Text(text) => format!("text {:?} {:?}", text.text, text.format),
            NodeKind::Autolink(link) => format!("autolink {}", link.url),
            NodeKind::Media(media) => {
                let kind = if media.is_video() { "video" } else { "image" };
                format!("media {} {}", kind, media.url)
            }
            NodeKind::Mention(mention) if mention.resolved => {
                format!("mention {} resolved", mention.target_key)
            }
            NodeKind::Mention(mention) => format!("mention {}", mention.target_key),
            NodeKind::EditableMention(mention) => format!(
                "editable-mention {:?} candidates={}",
                mention.search_text.as_str(),
                mention.candidates.len()
            ),
            NodeKind::Reference(reference) => format!(
                "reference {} {}",
                reference.target.as_str(),
                reference.href
            ),
        };
        out.push_str(&line);
        out.push('\n');
        for child in self.children(id) {
            self.write_outline(*child, depth + 1, out);
        }
    }

    // === Internals ===

    fn alloc(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.slots.len() as u32);
        self.slots.push(Some(Slot {
            kind,
            parent,
            children: Vec::new(),
        }));
        id
    }

    fn slot(&self, id: NodeId) -> Option<&Slot> {
        self.slots.get(id.index()).and_then(|s| s.as_ref())
    }

    /// Only called with handles already checked to be live.
    fn slot_mut(&mut self, id: NodeId) -> &mut Slot {
        match self.slots.get_mut(id.index()) {
            Some(Some(slot)) => slot,
            _ => unreachable!("slot_mut on dead node {id}"),
        }
    }

    fn text_node_mut(&mut self, id: NodeId) -> Result<&mut TextNode, EditorError> {
        let actual = self.kind(id)?.name();
        match self.get_mut(id) {
            Some(NodeKind::Text(text)) => Ok(text),
            _ => Err(EditorError::UnexpectedNodeType {
                id,
                expected: "text",
                actual,
            }),
        }
    }

    fn unexpected(&self, id: NodeId, expected: &'static str) -> EditorError {
        EditorError::UnexpectedNodeType {
            id,
            expected,
            actual: self.get(id).map(NodeKind::name).unwrap_or("missing"),
        }
    }

    fn check_attachable(&self, parent: NodeId, child: NodeId) -> Result<(), EditorError> {
        let parent_kind = self.kind(parent)?;
        let child_slot = self.slot(child).ok_or(EditorError::MissingNode(child))?;
        if !parent_kind.is_element() {
            return Err(self.unexpected(parent, "element"));
        }
        if child == self.root || child_slot.parent.is_some() || self.is_ancestor(child, parent) {
            return Err(EditorError::InvalidTreeEdit(child));
        }
        Ok(())
    }

    fn free_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            if let Some(slot) = self.slots.get_mut(node.index()).and_then(|s| s.take()) {
                stack.extend(slot.children);
            }
        }
    }
}
