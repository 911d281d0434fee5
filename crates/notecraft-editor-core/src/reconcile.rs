//! Keeping typed nodes in sync with the text around them.
//!
//! The host calls [`Reconciler::on_text_mutated`] after every text node
//! change. A pass then does one of three things depending on where the text
//! lives:
//!
//! - inside a link-like node: re-validate that node, updating it in place or
//!   turning it back into text;
//! - directly in a block: demote link-like neighbors whose separator the edit
//!   removed, then scan the text for new spans;
//! - emptied: drop the node and re-validate its former neighbors.
//!
//! Every piece of text that a pass produces (leading remainders of a split,
//! the contents of a demoted node) is queued and scanned in the same pass, so
//! one call always leaves the document at a fixed point. Demoted text is first
//! merged with the plain text runs on either side, so a span that now crosses
//! the old node edge is found just like in freshly loaded text.

use std::collections::VecDeque;

use smol_str::SmolStr;
use tracing::{debug, trace};

use crate::boundary::{
    ends_with_separator, is_content_around_valid, is_next_node_valid, is_previous_node_valid,
    starts_with_separator,
};
use crate::config::ComposerConfig;
use crate::document::{Document, NodeId};
use crate::error::EditorError;
use crate::matcher::MatcherSet;
use crate::nodes::NodeKind;
use crate::resolve::{Embed, ResolveContext, resolve_match};

#[cfg(test)]
mod tests;

/// What one reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Typed nodes created from plain text, in creation order.
    pub created: Vec<NodeId>,
    /// Typed nodes whose payload was updated in place.
    pub updated: Vec<NodeId>,
    /// Typed nodes turned back into text.
    pub demoted: usize,
    /// Search text of the last editable mention created or edited.
    pub mention_query: Option<SmolStr>,
}

impl Reconciliation {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.demoted == 0
    }

    /// Fold a later pass into this one.
    pub fn merge(&mut self, later: Reconciliation) {
        self.created.extend(later.created);
        self.updated.extend(later.updated);
        self.demoted += later.demoted;
        if later.mention_query.is_some() {
            self.mention_query = later.mention_query;
        }
    }
}

/// Reconciliation engine bound to a configuration.
#[derive(Debug, Clone)]
pub struct Reconciler {
    config: ComposerConfig,
    matchers: MatcherSet,
}

impl Reconciler {
    /// Fails if `doc` does not accept every node type this configuration may
    /// create. That is a wiring bug in the host, so it is reported up front
    /// instead of on the first match.
    pub fn new(doc: &Document, config: ComposerConfig) -> Result<Self, EditorError> {
        let missing = config.required_types().difference(doc.registered());
        if !missing.is_empty() {
            return Err(EditorError::UnregisteredNodeTypes { missing });
        }
        let matchers = MatcherSet::for_config(&config);
        Ok(Self { config, matchers })
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    pub fn matchers(&self) -> &MatcherSet {
        &self.matchers
    }

    /// Run a pass after the text of `node` changed.
    pub fn on_text_mutated(
        &self,
        doc: &mut Document,
        node: NodeId,
        ctx: &ResolveContext<'_>,
    ) -> Result<Reconciliation, EditorError> {
        let mut pass = Pass::new(self, doc, *ctx);
        pass.text_mutated(node)?;
        pass.drain()?;
        Ok(pass.report)
    }

    /// Re-validate every link-like node, then scan every text node.
    ///
    /// Used after loading a document and whenever the tag list changes. On a
    /// document that is already reconciled this changes nothing.
    pub fn reconcile_all(
        &self,
        doc: &mut Document,
        ctx: &ResolveContext<'_>,
    ) -> Result<Reconciliation, EditorError> {
        let mut pass = Pass::new(self, doc, *ctx);
        pass.validate_all_links()?;
        let texts = pass.doc.text_nodes();
        pass.queue.extend(texts);
        pass.drain()?;
        Ok(pass.report)
    }
}

/// Outcome of applying a re-resolved match to an existing node.
enum Update {
    Unchanged,
    Changed {
        label: Option<String>,
        mention_query: Option<SmolStr>,
    },
    KindChanged,
}

fn apply_update(kind: &mut NodeKind, embed: Embed) -> Update {
    match (kind, embed) {
        (NodeKind::Autolink(current), Embed::Autolink(next)) => {
            if *current == next {
                return Update::Unchanged;
            }
            *current = next;
            Update::Changed {
                label: None,
                mention_query: None,
            }
        }
        (NodeKind::Reference(current), Embed::Reference(next)) => {
            if *current == next {
                return Update::Unchanged;
            }
            let label = next.display_text.clone();
            *current = next;
            Update::Changed {
                label: Some(label),
                mention_query: None,
            }
        }
        (NodeKind::EditableMention(current), Embed::EditableMention(next)) => {
            if *current == next {
                return Update::Unchanged;
            }
            let query = next.search_text.clone();
            *current = next;
            Update::Changed {
                label: None,
                mention_query: Some(query),
            }
        }
        _ => Update::KindChanged,
    }
}

/// State of one synchronous pass.
struct Pass<'r, 'd, 'c> {
    reconciler: &'r Reconciler,
    doc: &'d mut Document,
    ctx: ResolveContext<'c>,
    /// Text nodes waiting for a creation scan.
    queue: VecDeque<NodeId>,
    report: Reconciliation,
}

impl<'r, 'd, 'c> Pass<'r, 'd, 'c> {
    fn new(reconciler: &'r Reconciler, doc: &'d mut Document, ctx: ResolveContext<'c>) -> Self {
        Self {
            reconciler,
            doc,
            ctx,
            queue: VecDeque::new(),
            report: Reconciliation::default(),
        }
    }

    fn text_mutated(&mut self, node: NodeId) -> Result<(), EditorError> {
        let kind = self.doc.kind(node)?;
        let Some(text) = kind.as_text() else {
            return Err(EditorError::UnexpectedNodeType {
                id: node,
                expected: "text",
                actual: kind.name(),
            });
        };
        let emptied = text.text.is_empty();
        let parent = self
            .doc
            .parent(node)
            .ok_or(EditorError::InvalidTreeEdit(node))?;

        if self.doc.is_link_like(parent) {
            return self.validate_link(parent);
        }

        if emptied {
            let neighbors = [self.doc.previous_sibling(node), self.doc.next_sibling(node)];
            self.doc.remove(node)?;
            trace!(%node, "removed empty text node");
            for neighbor in neighbors.into_iter().flatten() {
                if self.doc.is_link_like(neighbor) {
                    self.validate_link(neighbor)?;
                }
            }
            return Ok(());
        }

        self.repair_neighbors(node)?;
        // A demoted neighbor may have absorbed the node into its text run.
        if self.doc.is_simple_text(node) {
            self.enqueue(node);
        }
        Ok(())
    }

    fn enqueue(&mut self, node: NodeId) {
        if !self.queue.contains(&node) {
            self.queue.push_back(node);
        }
    }

    fn drain(&mut self) -> Result<(), EditorError> {
        while let Some(node) = self.queue.pop_front() {
            self.scan(node)?;
        }
        Ok(())
    }

    fn validate_all_links(&mut self) -> Result<(), EditorError> {
        let links: Vec<NodeId> = self
            .doc
            .descendants(self.doc.root())
            .into_iter()
            .filter(|id| self.doc.is_link_like(*id))
            .collect();
        for link in links {
            // An earlier demotion may have freed a nested link.
            if self.doc.contains(link) {
                self.validate_link(link)?;
            }
        }
        Ok(())
    }

    /// Creation scan over one text node.
    fn scan(&mut self, node: NodeId) -> Result<(), EditorError> {
        if !self.doc.is_simple_text(node) {
            return Ok(());
        }
        match self.doc.parent(node) {
            Some(parent) if !self.doc.is_link_like(parent) => {}
            _ => return Ok(()),
        }

        let mut remaining = node;
        // Start of the unscanned part of `remaining`; moves past rejected spans.
        let mut consumed = 0;
        loop {
            let text = self.doc.text(remaining).unwrap_or_default().to_owned();
            let Some(m) = self.reconciler.matchers.find_first(&text[consumed..]) else {
                break;
            };
            let start = consumed + m.index;
            let end = consumed + m.end();

            if !is_content_around_valid(self.doc, remaining, &text, start, end) {
                trace!(candidate = %m.text, start, end, "no separator around candidate");
                consumed = end;
                continue;
            }

            let embed = resolve_match(&m, &self.ctx, &self.reconciler.config);
            if embed == Embed::Literal {
                trace!(candidate = %m.text, "candidate does not resolve, kept as text");
                consumed = end;
                continue;
            }

            let pieces = self.doc.split_text(remaining, &[start, end])?;
            let (span, tail) = match (start, pieces.as_slice()) {
                (0, [span, rest @ ..]) => (*span, rest.first().copied()),
                (_, [leading, span, rest @ ..]) => {
                    // Lower-priority matches may still hide in front of this one.
                    self.enqueue(*leading);
                    (*span, rest.first().copied())
                }
                _ => return Err(EditorError::InvalidTreeEdit(remaining)),
            };

            let created = self.materialize(span, embed)?;
            self.report.created.push(created);

            match tail {
                Some(tail) => {
                    remaining = tail;
                    consumed = 0;
                }
                None => break,
            }
        }
        Ok(())
    }

    /// Replace the isolated text node `span` with the node for `embed`.
    fn materialize(&mut self, span: NodeId, embed: Embed) -> Result<NodeId, EditorError> {
        let (kind, label) = match embed {
            Embed::Autolink(link) => (NodeKind::Autolink(link), None),
            Embed::EditableMention(mention) => {
                self.report.mention_query = Some(mention.search_text.clone());
                (NodeKind::EditableMention(mention), None)
            }
            Embed::Reference(reference) => {
                let label = reference.display_text.clone();
                (NodeKind::Reference(reference), Some(label))
            }
            Embed::Media(media) => return self.replace_with_leaf(span, NodeKind::Media(media)),
            Embed::Mention(mention) => {
                return self.replace_with_leaf(span, NodeKind::Mention(mention));
            }
            Embed::Literal => return Ok(span),
        };

        let name = kind.name();
        let element = self.doc.create(kind)?;
        self.doc.insert_before(span, element)?;
        self.doc.detach(span)?;
        if let Some(label) = label {
            self.doc.set_text(span, label)?;
        }
        self.doc.append(element, span)?;
        debug!(node = %element, kind = name, "created typed node");
        Ok(element)
    }

    fn replace_with_leaf(&mut self, span: NodeId, kind: NodeKind) -> Result<NodeId, EditorError> {
        let name = kind.name();
        let leaf = self.doc.create(kind)?;
        self.doc.replace(span, leaf)?;
        debug!(node = %leaf, kind = name, "created typed node");
        Ok(leaf)
    }

    /// Demote link-like siblings of `node` that no longer have a separator
    /// between them and the edited text.
    fn repair_neighbors(&mut self, node: NodeId) -> Result<(), EditorError> {
        let text = self.doc.text(node).unwrap_or_default().to_owned();
        // Decide both sides first: demoting one side can merge `node` away.
        let previous = self
            .doc
            .previous_sibling(node)
            .filter(|id| self.doc.is_link_like(*id) && !starts_with_separator(&text));
        let next = self
            .doc
            .next_sibling(node)
            .filter(|id| self.doc.is_link_like(*id) && !ends_with_separator(&text));

        if let Some(previous) = previous {
            debug!(link = %previous, "edit after link removed its separator");
            self.demote(previous)?;
        }
        if let Some(next) = next {
            debug!(link = %next, "edit before link removed its separator");
            self.demote(next)?;
        }
        Ok(())
    }

    /// Check a link-like node against its current label and neighbors.
    fn validate_link(&mut self, link: NodeId) -> Result<(), EditorError> {
        let children = self.doc.children(link).to_vec();
        if children.iter().any(|child| !self.doc.is_simple_text(*child)) {
            debug!(%link, "link holds formatted or non-text content");
            return self.demote(link);
        }

        let label = self.doc.text_content(link);
        // An untouched reference label shows resolved text; the span it came
        // from is what gets re-matched.
        let candidate = match self.doc.kind(link)? {
            NodeKind::Reference(reference) if reference.display_text == label => {
                reference.source.clone()
            }
            _ => label,
        };

        let Some(m) = self.reconciler.matchers.find_first(&candidate) else {
            debug!(%link, text = %candidate, "link text no longer matches");
            return self.demote(link);
        };
        if m.index != 0 || m.length != candidate.len() {
            debug!(%link, text = %candidate, matched = %m.text, "match no longer covers link text");
            return self.demote(link);
        }
        if !is_previous_node_valid(self.doc, link) || !is_next_node_valid(self.doc, link) {
            debug!(%link, "link lost a separator to a neighbor");
            return self.demote(link);
        }

        let embed = resolve_match(&m, &self.ctx, &self.reconciler.config);
        let kind = self.doc.get_mut(link).ok_or(EditorError::MissingNode(link))?;
        match apply_update(kind, embed) {
            Update::Unchanged => Ok(()),
            Update::Changed {
                label,
                mention_query,
            } => {
                if let Some(label) = label {
                    self.set_label(link, label)?;
                }
                if mention_query.is_some() {
                    self.report.mention_query = mention_query;
                }
                debug!(%link, "updated typed node in place");
                self.report.updated.push(link);
                Ok(())
            }
            Update::KindChanged => {
                debug!(%link, "link text now resolves to another kind");
                self.demote(link)
            }
        }
    }

    fn set_label(&mut self, link: NodeId, label: String) -> Result<(), EditorError> {
        let children = self.doc.children(link).to_vec();
        match children.split_first() {
            Some((first, rest)) => {
                if self.doc.text(*first) != Some(label.as_str()) {
                    self.doc.set_text(*first, label)?;
                }
                for extra in rest {
                    self.doc.remove(*extra)?;
                }
            }
            None => {
                let text = self.doc.create(NodeKind::text(label))?;
                self.doc.append(link, text)?;
            }
        }
        Ok(())
    }

    /// Replace a typed node with the text it stands for, merge that text into
    /// the surrounding plain run and queue the run for scanning.
    ///
    /// Leaves and untouched references come back as their source span;
    /// links come back as their (possibly edited) label children.
    fn demote(&mut self, node: NodeId) -> Result<(), EditorError> {
        let source = match self.doc.kind(node)? {
            NodeKind::Media(media) => Some(media.source.clone()),
            NodeKind::Mention(mention) => Some(mention.source.clone()),
            NodeKind::Reference(reference)
                if self.doc.text_content(node) == reference.display_text =>
            {
                Some(reference.source.clone())
            }
            NodeKind::Autolink(_) | NodeKind::EditableMention(_) | NodeKind::Reference(_) => None,
            other @ (NodeKind::Root | NodeKind::Paragraph | NodeKind::Text(_) | NodeKind::LineBreak) => {
                return Err(EditorError::UnexpectedNodeType {
                    id: node,
                    expected: "typed node",
                    actual: other.name(),
                });
            }
        };

        let pieces = match source {
            Some(source) => {
                let text = self.doc.create(NodeKind::text(source))?;
                self.doc.replace(node, text)?;
                vec![text]
            }
            None => {
                let children = self.doc.children(node).to_vec();
                for child in &children {
                    self.doc.detach(*child)?;
                    self.doc.insert_before(node, *child)?;
                }
                self.doc.remove(node)?;
                children
            }
        };
        self.report.demoted += 1;
        debug!(%node, "demoted typed node to text");

        for piece in pieces {
            // Absorbed by the run of an earlier piece.
            if !self.doc.contains(piece) {
                continue;
            }
            if self.doc.text(piece).is_some_and(str::is_empty) {
                self.doc.remove(piece)?;
            } else if self.doc.is_simple_text(piece) {
                let run = self.merge_text_run(piece)?;
                self.enqueue(run);
            }
        }
        Ok(())
    }

    /// Fold the plain text siblings around `node` into the first node of the
    /// run and return it. Formatted text and typed nodes end a run.
    fn merge_text_run(&mut self, node: NodeId) -> Result<NodeId, EditorError> {
        let mut first = node;
        while let Some(previous) = self.doc.previous_sibling(first) {
            if !self.doc.is_simple_text(previous) {
                break;
            }
            first = previous;
        }

        let mut merged = self.doc.text(first).unwrap_or_default().to_owned();
        let mut absorbed = 0;
        while let Some(next) = self.doc.next_sibling(first) {
            if !self.doc.is_simple_text(next) {
                break;
            }
            merged.push_str(self.doc.text(next).unwrap_or_default());
            self.doc.remove(next)?;
            absorbed += 1;
        }
        if absorbed > 0 {
            trace!(node = %first, absorbed, "merged text run");
            self.doc.set_text(first, merged)?;
        }
        Ok(first)
    }
}
