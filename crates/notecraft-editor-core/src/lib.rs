//! notecraft-editor-core: inline content resolution for a post composer.
//!
//! This crate provides:
//! - `Document` - arena-backed rich text tree with stable `NodeId` handles
//! - `MatcherSet` - URL/media, tag reference, hashtag and mention recognizers
//! - `Reconciler` - turns matched spans into typed nodes and keeps them valid
//!   as surrounding text is edited
//! - `Composer` - document + reconciler + tag/user context, for UI hosts

pub mod boundary;
pub mod composer;
pub mod config;
pub mod document;
pub mod error;
pub mod matcher;
pub mod nodes;
pub mod reconcile;
pub mod resolve;
pub mod types;

pub use composer::{Composer, PostDraft};
pub use config::ComposerConfig;
pub use document::{Document, NodeId, SerializedNode};
pub use error::EditorError;
pub use matcher::{Match, MatchKind, Matcher, MatcherSet};
pub use nodes::{
    AutolinkNode, EditableMentionNode, LinkAttributes, MediaKind, MediaNode, MentionNode,
    NodeKind, NodeTypes, ReferenceKind, ReferenceNode, TextFormat, TextMode, TextNode,
};
pub use reconcile::{Reconciler, Reconciliation};
pub use resolve::{Embed, ResolveContext, Resolution, encode_note, resolve_match};
pub use smol_str::SmolStr;
pub use types::{Tag, UserRecord, UserSnapshot, tags_from_raw};
