//! Host-facing composer.
//!
//! [`Composer`] bundles a document, a reconciler and the context snapshots a
//! UI layer would otherwise thread through every call. Each edit method runs
//! exactly one reconciliation pass and returns its report.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::config::ComposerConfig;
use crate::document::{Document, NodeId};
use crate::error::EditorError;
use crate::nodes::{MentionNode, NodeKind};
use crate::reconcile::{Reconciler, Reconciliation};
use crate::resolve::ResolveContext;
use crate::types::{Tag, UserRecord, UserSnapshot};

/// Post text and tags ready to publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDraft {
    pub content: String,
    pub tags: Vec<Tag>,
}

impl PostDraft {
    /// Tags as raw arrays, in index order.
    pub fn raw_tags(&self) -> Vec<Vec<String>> {
        let mut tags: Vec<&Tag> = self.tags.iter().collect();
        tags.sort_by_key(|t| t.index);
        tags.into_iter().map(Tag::to_raw).collect()
    }
}

#[derive(Debug, Clone)]
pub struct Composer {
    doc: Document,
    reconciler: Reconciler,
    tags: Vec<Tag>,
    users: UserSnapshot,
    /// Last search text requested by an editable mention.
    mention_query: Option<SmolStr>,
}

impl Composer {
    pub fn new(config: ComposerConfig) -> Result<Self, EditorError> {
        Self::from_content("", Vec::new(), config)
    }

    /// Load post text and run a full pass over it.
    pub fn from_content(
        content: &str,
        tags: Vec<Tag>,
        config: ComposerConfig,
    ) -> Result<Self, EditorError> {
        let doc = Document::from_plain_text(content, config.required_types());
        Self::with_document(doc, tags, UserSnapshot::default(), config)
    }

    /// Adopt an existing document. Its registered node types must cover
    /// everything `config` can produce.
    pub fn with_document(
        mut doc: Document,
        tags: Vec<Tag>,
        users: UserSnapshot,
        config: ComposerConfig,
    ) -> Result<Self, EditorError> {
        let reconciler = Reconciler::new(&doc, config)?;
        let report = reconciler.reconcile_all(&mut doc, &ResolveContext::new(&tags, &users))?;
        tracing::debug!(created = report.created.len(), "loaded composer document");
        Ok(Self {
            doc,
            reconciler,
            tags,
            users,
            mention_query: report.mention_query,
        })
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn config(&self) -> &ComposerConfig {
        self.reconciler.config()
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn users(&self) -> &UserSnapshot {
        &self.users
    }

    /// Query the host should look users up for, if any.
    pub fn mention_query(&self) -> Option<&str> {
        self.mention_query.as_deref()
    }

    /// Plain text of the whole document as shown.
    pub fn text(&self) -> String {
        self.doc.text_content(self.doc.root())
    }

    // === Edits ===

    /// Replace the text of `node`.
    pub fn set_text(
        &mut self,
        node: NodeId,
        text: impl Into<String>,
    ) -> Result<Reconciliation, EditorError> {
        self.doc.set_text(node, text)?;
        self.reconcile(node)
    }

    /// Insert `text` at byte `offset` of `node`.
    pub fn insert_text(
        &mut self,
        node: NodeId,
        offset: usize,
        text: &str,
    ) -> Result<Reconciliation, EditorError> {
        let current = self.text_of(node)?;
        if offset > current.len() || !current.is_char_boundary(offset) {
            return Err(EditorError::InvalidOffset { id: node, offset });
        }
        let mut next = current.to_owned();
        next.insert_str(offset, text);
        self.set_text(node, next)
    }

    /// Delete the byte range `range` of `node`.
    pub fn delete_text(
        &mut self,
        node: NodeId,
        range: Range<usize>,
    ) -> Result<Reconciliation, EditorError> {
        let current = self.text_of(node)?;
        for offset in [range.start, range.end] {
            if offset > current.len() || !current.is_char_boundary(offset) {
                return Err(EditorError::InvalidOffset { id: node, offset });
            }
        }
        if range.start > range.end {
            return Err(EditorError::InvalidOffset {
                id: node,
                offset: range.start,
            });
        }
        let mut next = current.to_owned();
        next.replace_range(range, "");
        self.set_text(node, next)
    }

    /// Type `text` at the end of the document, one character per pass.
    ///
    /// Characters go into the last text run of the last paragraph. A run
    /// ending in a link or in-progress mention is extended inside its label,
    /// like a caret sitting at the end of the link; after any other node a
    /// new run is started.
    pub fn type_text(&mut self, text: &str) -> Result<Reconciliation, EditorError> {
        let mut report = Reconciliation::default();
        let mut buf = [0u8; 4];
        for c in text.chars() {
            let paragraph = self.last_paragraph()?;
            if c == '\n' {
                let br = self.doc.create(NodeKind::LineBreak)?;
                self.doc.append(paragraph, br)?;
                continue;
            }
            let node = match self.typing_target(paragraph) {
                Some(node) => {
                    let len = self.text_of(node)?.len();
                    report.merge(self.insert_text(node, len, c.encode_utf8(&mut buf))?);
                    continue;
                }
                None => {
                    let node = self.doc.create(NodeKind::text(c.to_string()))?;
                    self.doc.append(paragraph, node)?;
                    node
                }
            };
            report.merge(self.reconcile(node)?);
        }
        Ok(report)
    }

    fn last_paragraph(&mut self) -> Result<NodeId, EditorError> {
        let root = self.doc.root();
        if let Some(last) = self.doc.children(root).last() {
            return Ok(*last);
        }
        let paragraph = self.doc.create(NodeKind::Paragraph)?;
        self.doc.append(root, paragraph)?;
        Ok(paragraph)
    }

    fn typing_target(&self, paragraph: NodeId) -> Option<NodeId> {
        let last = *self.doc.children(paragraph).last()?;
        match self.doc.get(last)? {
            NodeKind::Text(text) if text.is_simple() => Some(last),
            NodeKind::Autolink(_) | NodeKind::EditableMention(_) => self
                .doc
                .children(last)
                .last()
                .copied()
                .filter(|label| self.doc.is_simple_text(*label)),
            _ => None,
        }
    }

    fn reconcile(&mut self, node: NodeId) -> Result<Reconciliation, EditorError> {
        let ctx = ResolveContext::new(&self.tags, &self.users);
        let report = self.reconciler.on_text_mutated(&mut self.doc, node, &ctx)?;
        if let Some(query) = &report.mention_query {
            self.mention_query = Some(query.clone());
        }
        Ok(report)
    }

    fn text_of(&self, node: NodeId) -> Result<&str, EditorError> {
        let kind = self.doc.kind(node)?;
        kind.as_text()
            .map(|t| t.text.as_str())
            .ok_or(EditorError::UnexpectedNodeType {
                id: node,
                expected: "text",
                actual: kind.name(),
            })
    }

    // === Context ===

    /// Accept the result of a user lookup.
    ///
    /// Results for anything but the current query are stale and dropped.
    /// Returns the editable mentions whose candidates changed.
    pub fn deliver_users(
        &mut self,
        query: impl Into<SmolStr>,
        users: Vec<UserRecord>,
    ) -> Vec<NodeId> {
        let query = query.into();
        if self.mention_query.as_ref() != Some(&query) {
            tracing::debug!(%query, current = ?self.mention_query, "ignoring stale user lookup");
            return Vec::new();
        }
        self.users = UserSnapshot::new(query, users);

        let limit = self.reconciler.config().max_mention_candidates;
        let mut refreshed = Vec::new();
        for id in self.doc.descendants(self.doc.root()) {
            if let Some(NodeKind::EditableMention(mention)) = self.doc.get_mut(id) {
                let candidates = self.users.candidates(&mention.search_text, limit);
                if mention.candidates != candidates {
                    mention.candidates = candidates;
                    refreshed.push(id);
                }
            }
        }
        refreshed
    }

    /// Finish an editable mention by picking `user`.
    pub fn select_mention(&mut self, node: NodeId, user: &UserRecord) -> Result<NodeId, EditorError> {
        let kind = self.doc.kind(node)?;
        if !matches!(kind, NodeKind::EditableMention(_)) {
            return Err(EditorError::UnexpectedNodeType {
                id: node,
                expected: "editable-mention",
                actual: kind.name(),
            });
        }
        let mention = self.doc.create(NodeKind::Mention(MentionNode {
            target_key: user.identifier.clone(),
            resolved: true,
            source: format!("@{}", user.label()),
        }))?;
        self.doc.replace(node, mention)?;
        self.mention_query = None;
        tracing::debug!(%node, %mention, key = %user.identifier, "selected mention");
        Ok(mention)
    }

    /// Swap in a new tag list and re-check everything that depends on it.
    pub fn set_tags(&mut self, tags: Vec<Tag>) -> Result<Reconciliation, EditorError> {
        self.tags = tags;
        let ctx = ResolveContext::new(&self.tags, &self.users);
        self.reconciler.reconcile_all(&mut self.doc, &ctx)
    }

    // === Output ===

    /// Serialize to post text.
    ///
    /// Mentions are written as `#[n]`, reusing a `p` tag for the same key or
    /// appending a new one. References keep the span they were created from.
    pub fn to_post(&self) -> PostDraft {
        let mut tags = self.tags.clone();
        let mut content = String::new();
        let root = self.doc.root();
        for (i, block) in self.doc.children(root).iter().enumerate() {
            if i > 0 {
                content.push('\n');
            }
            for inline in self.doc.children(*block) {
                self.write_post_text(*inline, &mut tags, &mut content);
            }
        }
        PostDraft { content, tags }
    }

    fn write_post_text(&self, node: NodeId, tags: &mut Vec<Tag>, out: &mut String) {
        match self.doc.get(node) {
            Some(NodeKind::Mention(mention)) => {
                let index = person_tag_index(tags, &mention.target_key);
                out.push_str(&format!("#[{index}]"));
            }
            Some(NodeKind::Reference(reference)) => out.push_str(&reference.source),
            Some(_) => out.push_str(&self.doc.text_content(node)),
            None => {}
        }
    }
}

fn person_tag_index(tags: &mut Vec<Tag>, key: &str) -> usize {
    let existing = tags
        .iter()
        .find(|t| t.key == "p" && t.pub_key.as_deref() == Some(key));
    if let Some(tag) = existing {
        return tag.index;
    }
    let index = tags.iter().map(|t| t.index + 1).max().unwrap_or(0);
    tags.push(Tag::person(index, key));
    index
}
