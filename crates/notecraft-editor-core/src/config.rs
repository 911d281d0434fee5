//! Composer configuration.

use serde::{Deserialize, Serialize};

use crate::nodes::{LinkAttributes, NodeTypes};

/// Settings for one composer or viewer surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ComposerConfig {
    /// Editable surfaces also recognize `@handle` shorthand.
    pub editable: bool,
    /// Recognize free-form `#hashtag` words.
    pub hashtags: bool,
    /// Length of the shortened `note1…` label shown for event references.
    pub note_display_len: usize,
    /// Candidates shown under an in-progress mention.
    pub max_mention_candidates: usize,
    pub note_path_prefix: String,
    pub hashtag_path_prefix: String,
    pub link_attributes: LinkAttributes,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            editable: false,
            hashtags: true,
            note_display_len: 12,
            max_mention_candidates: 5,
            note_path_prefix: "/note/".to_owned(),
            hashtag_path_prefix: "/t/".to_owned(),
            link_attributes: LinkAttributes::external(),
        }
    }
}

impl ComposerConfig {
    pub fn editable() -> Self {
        Self {
            editable: true,
            ..Self::default()
        }
    }

    pub fn read_only() -> Self {
        Self::default()
    }

    /// Node types the reconciler may create under this configuration.
    pub fn required_types(&self) -> NodeTypes {
        if self.editable {
            NodeTypes::EMBEDS | NodeTypes::EDITABLE_MENTION
        } else {
            NodeTypes::EMBEDS
        }
    }

    pub fn note_href(&self, event_id: &str) -> String {
        format!("{}{}", self.note_path_prefix, event_id)
    }

    pub fn hashtag_href(&self, hashtag: &str) -> String {
        format!("{}{}", self.hashtag_path_prefix, hashtag)
    }
}
