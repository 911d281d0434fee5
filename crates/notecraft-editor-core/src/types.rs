//! Context records supplied by the surrounding application.
//!
//! Tags come from the post being composed or viewed, users from a local
//! profile store. The engine reads both as snapshots and never owns them.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Index-addressed reference record attached to a post.
///
/// `#[n]` in post text refers to the tag whose `index` is `n`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub index: usize,
    /// `p` (person), `e` (event), `t` (hashtag) or anything else.
    pub key: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_key: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashtag: Option<SmolStr>,
}

impl Tag {
    pub fn person(index: usize, pub_key: impl Into<SmolStr>) -> Self {
        Self {
            index,
            key: SmolStr::new_static("p"),
            pub_key: Some(pub_key.into()),
            event: None,
            hashtag: None,
        }
    }

    pub fn event(index: usize, event: impl Into<SmolStr>) -> Self {
        Self {
            index,
            key: SmolStr::new_static("e"),
            pub_key: None,
            event: Some(event.into()),
            hashtag: None,
        }
    }

    pub fn hashtag(index: usize, hashtag: impl Into<SmolStr>) -> Self {
        Self {
            index,
            key: SmolStr::new_static("t"),
            pub_key: None,
            event: None,
            hashtag: Some(hashtag.into()),
        }
    }

    /// Parse a raw tag array as found on a published event (`["p", "<hex>"]`).
    ///
    /// Returns `None` for an empty array. Unknown keys are kept with no payload.
    pub fn from_raw(index: usize, raw: &[String]) -> Option<Self> {
        let key = raw.first()?;
        let value = raw.get(1).map(SmolStr::new);
        let mut tag = Self {
            index,
            key: SmolStr::new(key),
            pub_key: None,
            event: None,
            hashtag: None,
        };
        match key.as_str() {
            "p" => tag.pub_key = value,
            "e" => tag.event = value,
            "t" => tag.hashtag = value,
            _ => {}
        }
        Some(tag)
    }

    /// Raw array form, inverse of [`Tag::from_raw`] for `p`/`e`/`t` tags.
    pub fn to_raw(&self) -> Vec<String> {
        let value = match self.key.as_str() {
            "p" => self.pub_key.as_ref(),
            "e" => self.event.as_ref(),
            "t" => self.hashtag.as_ref(),
            _ => None,
        };
        std::iter::once(self.key.to_string())
            .chain(value.map(|v| v.to_string()))
            .collect()
    }
}

/// Parse the `tags` array of an event. Indices follow array position.
pub fn tags_from_raw(raw: &[Vec<String>]) -> Vec<Tag> {
    raw.iter()
        .enumerate()
        .filter_map(|(index, tag)| Tag::from_raw(index, tag))
        .collect()
}

/// Profile record returned by the user lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Public key the mention resolves to.
    pub identifier: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<SmolStr>,
}

impl UserRecord {
    pub fn new(identifier: impl Into<SmolStr>) -> Self {
        Self {
            identifier: identifier.into(),
            display_name: None,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<SmolStr>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<SmolStr>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Best label for this user: display name, then name, then the key.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.identifier)
    }
}

/// Result of the most recent user lookup, tagged with the query it answers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub query: SmolStr,
    #[serde(default)]
    pub users: Vec<UserRecord>,
}

impl UserSnapshot {
    pub fn new(query: impl Into<SmolStr>, users: Vec<UserRecord>) -> Self {
        Self {
            query: query.into(),
            users,
        }
    }

    /// Candidates for `search`, in the order the lookup returned them.
    ///
    /// Empty when the snapshot answers a different query: a stale lookup
    /// never leaks into a newer search.
    pub fn candidates(&self, search: &str, limit: usize) -> Vec<UserRecord> {
        if self.query != search {
            return Vec::new();
        }
        self.users.iter().take(limit).cloned().collect()
    }

    pub fn profile(&self, identifier: &str) -> Option<&UserRecord> {
        self.users.iter().find(|u| u.identifier == identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_tag_from_raw() {
        let tag = Tag::from_raw(2, &raw(&["e", "abc", "wss://relay"])).unwrap();
        assert_eq!(tag.index, 2);
        assert_eq!(tag.key, "e");
        assert_eq!(tag.event.as_deref(), Some("abc"));
        assert!(tag.pub_key.is_none());

        let tag = Tag::from_raw(0, &raw(&["p"])).unwrap();
        assert!(tag.pub_key.is_none());

        let tag = Tag::from_raw(0, &raw(&["client", "x"])).unwrap();
        assert_eq!(tag.key, "client");
        assert_eq!(tag.to_raw(), raw(&["client"]));

        assert!(Tag::from_raw(0, &[]).is_none());
    }

    #[test]
    fn test_tags_from_raw_indices() {
        let tags = tags_from_raw(&[raw(&["p", "k1"]), raw(&["t", "nostr"])]);
        assert_eq!(tags, vec![Tag::person(0, "k1"), Tag::hashtag(1, "nostr")]);
        assert_eq!(tags[1].to_raw(), raw(&["t", "nostr"]));
    }

    #[test]
    fn test_snapshot_candidates() {
        let users: Vec<_> = (0..7).map(|i| UserRecord::new(format!("k{i}"))).collect();
        let snapshot = UserSnapshot::new("ali", users);

        let candidates = snapshot.candidates("ali", 5);
        assert_eq!(candidates.len(), 5);
        assert_eq!(candidates[0].identifier, "k0");
        assert_eq!(candidates[4].identifier, "k4");

        assert!(snapshot.candidates("alic", 5).is_empty());
    }

    #[test]
    fn test_user_label() {
        let user = UserRecord::new("k").with_name("alice");
        assert_eq!(user.label(), "alice");
        let user = user.with_display_name("Alice");
        assert_eq!(user.label(), "Alice");
        assert_eq!(UserRecord::new("k").label(), "k");
    }
}
