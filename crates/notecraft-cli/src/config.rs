//! `config.kdl` loading.
//!
//! ```kdl
//! editable true
//! hashtags false
//! note-display-len 16
//! max-mention-candidates 5
//! note-path-prefix "/e/"
//! hashtag-path-prefix "/t/"
//! link-rel "noopener"
//! link-target "_blank"
//! ```
//!
//! Every node is optional; missing ones keep their defaults.

use std::path::{Path, PathBuf};

use kdl::{KdlDocument, KdlValue};
use miette::{IntoDiagnostic, Result, WrapErr};
use notecraft_editor_core::{ComposerConfig, SmolStr};

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("notecraft").join("config.kdl"))
}

/// Read the config at `path`. A missing default file is not an error.
pub fn load(path: Option<&Path>) -> Result<ComposerConfig> {
    let (path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => match default_config_path() {
            Some(path) => (path, false),
            None => return Ok(ComposerConfig::default()),
        },
    };
    if !explicit && !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(ComposerConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .into_diagnostic()
        .wrap_err_with(|| format!("reading {}", path.display()))?;
    let config = parse(&content).wrap_err_with(|| format!("in {}", path.display()))?;
    tracing::debug!(path = %path.display(), ?config, "loaded config");
    Ok(config)
}

pub fn parse(content: &str) -> Result<ComposerConfig> {
    let doc: KdlDocument = content.parse().into_diagnostic()?;
    let mut config = ComposerConfig::default();

    if let Some(value) = arg(&doc, "editable") {
        config.editable = as_bool(value, "editable")?;
    }
    if let Some(value) = arg(&doc, "hashtags") {
        config.hashtags = as_bool(value, "hashtags")?;
    }
    if let Some(value) = arg(&doc, "note-display-len") {
        config.note_display_len = as_usize(value, "note-display-len")?;
    }
    if let Some(value) = arg(&doc, "max-mention-candidates") {
        config.max_mention_candidates = as_usize(value, "max-mention-candidates")?;
    }
    if let Some(value) = arg(&doc, "note-path-prefix") {
        config.note_path_prefix = as_str(value, "note-path-prefix")?.to_owned();
    }
    if let Some(value) = arg(&doc, "hashtag-path-prefix") {
        config.hashtag_path_prefix = as_str(value, "hashtag-path-prefix")?.to_owned();
    }
    if let Some(value) = arg(&doc, "link-rel") {
        config.link_attributes.rel = Some(SmolStr::new(as_str(value, "link-rel")?));
    }
    if let Some(value) = arg(&doc, "link-target") {
        config.link_attributes.target = Some(SmolStr::new(as_str(value, "link-target")?));
    }
    Ok(config)
}

fn arg<'a>(doc: &'a KdlDocument, name: &str) -> Option<&'a KdlValue> {
    Some(doc.get(name)?.entries().first()?.value())
}

fn as_bool(value: &KdlValue, name: &str) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| miette::miette!("`{name}` expects true or false, got {value}"))
}

fn as_usize(value: &KdlValue, name: &str) -> Result<usize> {
    value
        .as_i64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| miette::miette!("`{name}` expects a non-negative integer, got {value}"))
}

fn as_str<'a>(value: &'a KdlValue, name: &str) -> Result<&'a str> {
    value
        .as_string()
        .ok_or_else(|| miette::miette!("`{name}` expects a string, got {value}"))
}
