//! Node kinds stored in the document tree.
//!
//! The set is closed: structural nodes (root, paragraph, text, line break)
//! plus the typed nodes the reconciler produces from recognized text spans.
//! Anything that needs to know "is this a link-like node" matches on
//! [`NodeKind`] exhaustively instead of asking the node what it is.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::types::UserRecord;

bitflags! {
    /// Node types a document can hold.
    ///
    /// A document only accepts nodes whose type was registered with it, and the
    /// reconciler refuses to start unless every type it may create is registered.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeTypes: u16 {
        const ROOT = 1 << 0;
        const PARAGRAPH = 1 << 1;
        const TEXT = 1 << 2;
        const LINE_BREAK = 1 << 3;
        const AUTOLINK = 1 << 4;
        const MEDIA = 1 << 5;
        const MENTION = 1 << 6;
        const EDITABLE_MENTION = 1 << 7;
        const REFERENCE = 1 << 8;

        const STRUCTURAL = Self::ROOT.bits()
            | Self::PARAGRAPH.bits()
            | Self::TEXT.bits()
            | Self::LINE_BREAK.bits();
        const EMBEDS = Self::AUTOLINK.bits()
            | Self::MEDIA.bits()
            | Self::MENTION.bits()
            | Self::REFERENCE.bits();
    }
}

bitflags! {
    /// Inline formatting owned by the host editor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct TextFormat: u8 {
        const BOLD = 1 << 0;
        const ITALIC = 1 << 1;
        const STRIKETHROUGH = 1 << 2;
        const UNDERLINE = 1 << 3;
        const CODE = 1 << 4;
    }
}

impl Default for TextFormat {
    fn default() -> Self {
        Self::empty()
    }
}

/// How the host treats a text run while editing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextMode {
    /// Freely editable characters.
    #[default]
    Normal,
    /// Edited as a single unit (deleting removes the whole run).
    Token,
    /// Edited word by word.
    Segmented,
}

/// A run of plain characters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextNode {
    pub text: String,
    #[serde(default, skip_serializing_if = "TextFormat::is_empty")]
    pub format: TextFormat,
    #[serde(default, skip_serializing_if = "is_normal_mode")]
    pub mode: TextMode,
}

fn is_normal_mode(mode: &TextMode) -> bool {
    *mode == TextMode::Normal
}

impl TextNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: TextFormat::empty(),
            mode: TextMode::Normal,
        }
    }

    /// Plain, unformatted, normally edited text. Only these runs are scanned.
    pub fn is_simple(&self) -> bool {
        self.mode == TextMode::Normal && self.format.is_empty()
    }
}

/// `rel`/`target` attributes rendered onto links.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinkAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<SmolStr>,
}

impl LinkAttributes {
    /// `rel="noopener" target="_blank"`, what every auto-detected link gets.
    pub fn external() -> Self {
        Self {
            rel: Some(SmolStr::new_static("noopener")),
            target: Some(SmolStr::new_static("_blank")),
        }
    }
}

/// Automatically detected link. Its label child holds the URL text as typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutolinkNode {
    pub url: String,
    #[serde(default)]
    pub attributes: LinkAttributes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaKind {
    Image,
    Video,
}

/// Inline image or video. Renders its own representation, so it has no children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaNode {
    pub url: String,
    pub media: MediaKind,
    /// The text span this node replaced.
    pub source: String,
}

impl MediaNode {
    pub fn is_video(&self) -> bool {
        self.media == MediaKind::Video
    }
}

/// A mention of a known identity (public key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionNode {
    pub target_key: SmolStr,
    /// Whether a profile for `target_key` was available when the node was built.
    pub resolved: bool,
    /// The text span this node replaced.
    pub source: String,
}

/// `@handle` typed while composing, waiting for the user to pick a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditableMentionNode {
    /// Handle text without the leading `@`.
    pub search_text: SmolStr,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<UserRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceKind {
    Note,
    Hashtag,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Note => "note",
            ReferenceKind::Hashtag => "hashtag",
        }
    }
}

/// Link to a note or hashtag. Its label child shows `display_text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceNode {
    pub target: ReferenceKind,
    pub target_id: SmolStr,
    pub display_text: String,
    pub href: String,
    /// The text span this node replaced (`#[0]`, `#nostr`).
    pub source: String,
}

/// Every node kind the document can hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NodeKind {
    Root,
    Paragraph,
    Text(TextNode),
    LineBreak,
    Autolink(AutolinkNode),
    Media(MediaNode),
    Mention(MentionNode),
    EditableMention(EditableMentionNode),
    Reference(ReferenceNode),
}

impl NodeKind {
    pub fn text(text: impl Into<String>) -> Self {
        NodeKind::Text(TextNode::new(text))
    }

    pub fn node_type(&self) -> NodeTypes {
        match self {
            NodeKind::Root => NodeTypes::ROOT,
            NodeKind::Paragraph => NodeTypes::PARAGRAPH,
            NodeKind::Text(_) => NodeTypes::TEXT,
            NodeKind::LineBreak => NodeTypes::LINE_BREAK,
            NodeKind::Autolink(_) => NodeTypes::AUTOLINK,
            NodeKind::Media(_) => NodeTypes::MEDIA,
            NodeKind::Mention(_) => NodeTypes::MENTION,
            NodeKind::EditableMention(_) => NodeTypes::EDITABLE_MENTION,
            NodeKind::Reference(_) => NodeTypes::REFERENCE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Paragraph => "paragraph",
            NodeKind::Text(_) => "text",
            NodeKind::LineBreak => "line-break",
            NodeKind::Autolink(_) => "autolink",
            NodeKind::Media(_) => "media",
            NodeKind::Mention(_) => "mention",
            NodeKind::EditableMention(_) => "editable-mention",
            NodeKind::Reference(_) => "reference",
        }
    }

    /// Nodes that may have children.
    pub fn is_element(&self) -> bool {
        match self {
            NodeKind::Root
            | NodeKind::Paragraph
            | NodeKind::Autolink(_)
            | NodeKind::EditableMention(_)
            | NodeKind::Reference(_) => true,
            NodeKind::Text(_) | NodeKind::LineBreak | NodeKind::Media(_) | NodeKind::Mention(_) => {
                false
            }
        }
    }

    /// Typed nodes whose validity is derived from their label text and neighbors.
    pub fn is_link_like(&self) -> bool {
        match self {
            NodeKind::Autolink(_) | NodeKind::EditableMention(_) | NodeKind::Reference(_) => true,
            NodeKind::Root
            | NodeKind::Paragraph
            | NodeKind::Text(_)
            | NodeKind::LineBreak
            | NodeKind::Media(_)
            | NodeKind::Mention(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&TextNode> {
        match self {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Literal span a leaf typed node stands in for.
    pub fn source(&self) -> Option<&str> {
        match self {
            NodeKind::Media(media) => Some(&media.source),
            NodeKind::Mention(mention) => Some(&mention.source),
            NodeKind::Reference(reference) => Some(&reference.source),
            _ => None,
        }
    }
}
