//! Turning matches into the typed nodes that replace them.
//!
//! URL matches map directly onto links or media. Tag references are looked up
//! in the post's tag list and become mentions, note links or hashtag links.
//! Mention shorthand becomes an in-progress mention fed by the latest user
//! lookup. Anything that cannot be resolved stays literal text.

use bech32::{Bech32, Hrp};
use data_encoding::HEXLOWER_PERMISSIVE;
use smol_str::SmolStr;

use crate::config::ComposerConfig;
use crate::matcher::{Match, MatchKind};
use crate::nodes::{
    AutolinkNode, EditableMentionNode, MediaNode, MentionNode, ReferenceKind, ReferenceNode,
};
use crate::types::{Tag, UserSnapshot};

const NOTE_HRP: Hrp = Hrp::parse_unchecked("note");

/// Read-only context for one reconciliation pass.
///
/// The caller refreshes it between passes; nothing in it is cached by the
/// engine.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub tags: &'a [Tag],
    pub users: &'a UserSnapshot,
}

impl<'a> ResolveContext<'a> {
    pub fn new(tags: &'a [Tag], users: &'a UserSnapshot) -> Self {
        Self { tags, users }
    }
}

/// What a tag reference points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Person {
        pub_key: SmolStr,
    },
    Note {
        event_id: SmolStr,
        display_text: String,
        href: String,
    },
    Hashtag {
        hashtag: SmolStr,
        display_text: String,
        href: String,
    },
    Literal,
}

/// Node that should replace a matched span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Embed {
    Autolink(AutolinkNode),
    Media(MediaNode),
    Mention(MentionNode),
    EditableMention(EditableMentionNode),
    Reference(ReferenceNode),
    /// Keep the span as plain text.
    Literal,
}

/// First tag carrying `index`.
pub fn find_tag(tags: &[Tag], index: usize) -> Option<&Tag> {
    tags.iter().find(|t| t.index == index)
}

/// bech32 `note1…` encoding of a hex event id.
pub fn encode_note(event_id: &str) -> Option<String> {
    let bytes = HEXLOWER_PERMISSIVE.decode(event_id.as_bytes()).ok()?;
    if bytes.is_empty() {
        return None;
    }
    bech32::encode::<Bech32>(NOTE_HRP, &bytes).ok()
}

/// Shortened `note1…` label for an event id.
pub fn note_display_text(event_id: &str, len: usize) -> Option<String> {
    let encoded = encode_note(event_id)?;
    Some(encoded.chars().take(len).collect())
}

pub fn resolve_tag_ref(
    tags: &[Tag],
    tag_index: Option<usize>,
    config: &ComposerConfig,
) -> Resolution {
    let Some(tag) = tag_index.and_then(|i| find_tag(tags, i)) else {
        return Resolution::Literal;
    };
    match tag.key.as_str() {
        "p" => match &tag.pub_key {
            Some(pub_key) => Resolution::Person {
                pub_key: pub_key.clone(),
            },
            None => Resolution::Literal,
        },
        "e" => {
            let Some(event_id) = &tag.event else {
                return Resolution::Literal;
            };
            match note_display_text(event_id, config.note_display_len) {
                Some(display_text) => Resolution::Note {
                    event_id: event_id.clone(),
                    display_text,
                    href: config.note_href(event_id),
                },
                None => {
                    tracing::debug!(%event_id, "event tag is not a hex id");
                    Resolution::Literal
                }
            }
        }
        "t" => match &tag.hashtag {
            Some(hashtag) => Resolution::Hashtag {
                hashtag: hashtag.clone(),
                display_text: format!("#{hashtag}"),
                href: config.hashtag_href(hashtag),
            },
            None => Resolution::Literal,
        },
        _ => Resolution::Literal,
    }
}

/// Decide what replaces `m`.
pub fn resolve_match(m: &Match, ctx: &ResolveContext<'_>, config: &ComposerConfig) -> Embed {
    match &m.kind {
        MatchKind::Url { url } => Embed::Autolink(AutolinkNode {
            url: url.clone(),
            attributes: config.link_attributes.clone(),
        }),
        MatchKind::Media { url, media, .. } => Embed::Media(MediaNode {
            url: url.clone(),
            media: *media,
            source: m.text.clone(),
        }),
        MatchKind::TagRef { tag_index } => {
            match resolve_tag_ref(ctx.tags, *tag_index, config) {
                Resolution::Person { pub_key } => Embed::Mention(MentionNode {
                    resolved: ctx.users.profile(&pub_key).is_some(),
                    target_key: pub_key,
                    source: m.text.clone(),
                }),
                Resolution::Note {
                    event_id,
                    display_text,
                    href,
                } => Embed::Reference(ReferenceNode {
                    target: ReferenceKind::Note,
                    target_id: event_id,
                    display_text,
                    href,
                    source: m.text.clone(),
                }),
                Resolution::Hashtag {
                    hashtag,
                    display_text,
                    href,
                } => Embed::Reference(ReferenceNode {
                    target: ReferenceKind::Hashtag,
                    target_id: hashtag,
                    display_text,
                    href,
                    source: m.text.clone(),
                }),
                Resolution::Literal => Embed::Literal,
            }
        }
        MatchKind::Hashtag { tag } => Embed::Reference(ReferenceNode {
            target: ReferenceKind::Hashtag,
            target_id: tag.clone(),
            display_text: m.text.clone(),
            href: config.hashtag_href(tag),
            source: m.text.clone(),
        }),
        MatchKind::Mention { handle } => Embed::EditableMention(EditableMentionNode {
            search_text: handle.clone(),
            candidates: ctx
                .users
                .candidates(handle, config.max_mention_candidates),
        }),
    }
}
