//! Recognizers for special content in raw text.
//!
//! Each matcher finds the leftmost occurrence of its pattern in a slice of
//! text. Matchers are pure: they know nothing about the node the text came
//! from, and they are re-run on shrinking suffixes as a node is scanned.
//! Resolution of what a match points at happens later, in [`crate::resolve`].

use std::sync::LazyLock;

use regex::Regex;
use smol_str::SmolStr;
use url::Url;

use crate::config::ComposerConfig;
use crate::nodes::MediaKind;

/// Scheme-optional `//host.tld/path` URL.
static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:[a-z]+:)?//[-a-zA-Z0-9@:%._+~#=]{1,256}\.[a-zA-Z0-9()]{1,12}\b[-a-zA-Z0-9()@:%_+.~#?&/=]*",
    )
    .unwrap()
});

/// Final extension of a URL path.
static EXTENSION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.(\w+)$").unwrap());

static TAG_REF_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#\[(\d+)\]").unwrap());

static HASHTAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#(\w+)").unwrap());

static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@[A-Za-z0-9_]+").unwrap());

const IMAGE_EXTENSIONS: &[&str] = &["gif", "jpg", "jpeg", "png", "bmp", "webp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "avi", "m4v"];

/// A recognized span, with offsets relative to the text the matcher was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Byte offset of the span.
    pub index: usize,
    /// Byte length of the span.
    pub length: usize,
    pub text: String,
    pub kind: MatchKind,
}

impl Match {
    pub fn end(&self) -> usize {
        self.index + self.length
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchKind {
    /// Link to anything that is not recognized media.
    Url { url: String },
    /// Link whose path ends in an image or video extension.
    Media {
        url: String,
        media: MediaKind,
        extension: SmolStr,
    },
    /// `#[n]`. `tag_index` is `None` when `n` does not fit a `usize`.
    TagRef { tag_index: Option<usize> },
    /// `#word`, without the `#`.
    Hashtag { tag: SmolStr },
    /// `@handle`, without the `@`.
    Mention { handle: SmolStr },
}

/// One content class recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    Url,
    TagRef,
    Hashtag,
    Mention,
}

impl Matcher {
    pub fn find(&self, text: &str) -> Option<Match> {
        match self {
            Matcher::Url => match_url(text),
            Matcher::TagRef => match_tag_ref(text),
            Matcher::Hashtag => match_hashtag(text),
            Matcher::Mention => match_mention(text),
        }
    }
}

/// Matchers in precedence order.
///
/// The first matcher that finds anything wins, even if a later matcher
/// would have found something further left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatcherSet {
    matchers: Vec<Matcher>,
}

impl MatcherSet {
    pub fn new(matchers: Vec<Matcher>) -> Self {
        Self { matchers }
    }

    /// URL, tag reference, then hashtag (if enabled) and mention shorthand
    /// (editable surfaces only).
    pub fn for_config(config: &ComposerConfig) -> Self {
        let mut matchers = vec![Matcher::Url, Matcher::TagRef];
        if config.hashtags {
            matchers.push(Matcher::Hashtag);
        }
        if config.editable {
            matchers.push(Matcher::Mention);
        }
        Self { matchers }
    }

    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    pub fn find_first(&self, text: &str) -> Option<Match> {
        self.matchers.iter().find_map(|m| m.find(text))
    }
}

/// Give a scheme-less `//host` match an `https:` scheme. A matched scheme is
/// kept as written.
pub fn normalize_url(raw: &str) -> String {
    if raw.starts_with("//") {
        format!("https:{raw}")
    } else {
        raw.to_owned()
    }
}

/// Classify a URL by the extension of its path.
pub fn media_kind(url: &Url) -> Option<(MediaKind, SmolStr)> {
    let path = url.path().to_lowercase();
    let extension = EXTENSION_RE.captures(&path)?.get(1)?.as_str();
    let kind = if IMAGE_EXTENSIONS.contains(&extension) {
        MediaKind::Image
    } else if VIDEO_EXTENSIONS.contains(&extension) {
        MediaKind::Video
    } else {
        return None;
    };
    Some((kind, SmolStr::new(extension)))
}

fn match_url(text: &str) -> Option<Match> {
    let found = URL_RE.find(text)?;
    let url = normalize_url(found.as_str());
    let parsed = match Url::parse(&url) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::trace!(candidate = found.as_str(), %err, "url candidate does not parse");
            return None;
        }
    };
    let kind = match media_kind(&parsed) {
        Some((media, extension)) => MatchKind::Media {
            url,
            media,
            extension,
        },
        None => MatchKind::Url { url },
    };
    Some(Match {
        index: found.start(),
        length: found.len(),
        text: found.as_str().to_owned(),
        kind,
    })
}

fn match_tag_ref(text: &str) -> Option<Match> {
    let caps = TAG_REF_RE.captures(text)?;
    let full = caps.get(0)?;
    let tag_index = caps.get(1).and_then(|n| n.as_str().parse().ok());
    Some(Match {
        index: full.start(),
        length: full.len(),
        text: full.as_str().to_owned(),
        kind: MatchKind::TagRef { tag_index },
    })
}

fn match_hashtag(text: &str) -> Option<Match> {
    let caps = HASHTAG_RE.captures(text)?;
    let full = caps.get(0)?;
    let tag = caps.get(1)?.as_str();
    Some(Match {
        index: full.start(),
        length: full.len(),
        text: full.as_str().to_owned(),
        kind: MatchKind::Hashtag {
            tag: SmolStr::new(tag),
        },
    })
}

fn match_mention(text: &str) -> Option<Match> {
    let found = MENTION_RE.find(text)?;
    Some(Match {
        index: found.start(),
        length: found.len(),
        text: found.as_str().to_owned(),
        kind: MatchKind::Mention {
            handle: SmolStr::new(&found.as_str()[1..]),
        },
    })
}
