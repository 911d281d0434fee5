use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use miette::{IntoDiagnostic, Result, WrapErr};
use notecraft_editor_core::{
    Composer, Document, SmolStr, Tag, UserRecord, UserSnapshot, tags_from_raw,
};
use serde::Serialize;

mod config;

#[derive(Parser)]
#[command(version, about = "notecraft - resolve links, media, mentions and references in post text", long_about = None)]
struct Cli {
    /// Post text. Read from --file or stdin when omitted.
    text: Option<String>,

    /// Read post text from a file
    #[arg(long, short)]
    file: Option<PathBuf>,

    /// JSON array of raw tags, e.g. [["p", "<hex>"], ["e", "<hex>"]]
    #[arg(long)]
    tags: Option<PathBuf>,

    /// JSON array of user records to serve mention lookups from
    #[arg(long)]
    users: Option<PathBuf>,

    /// Path to config.kdl
    #[arg(long, env = "NOTECRAFT_CONFIG")]
    config: Option<PathBuf>,

    /// Treat the surface as editable (enables @mention shorthand)
    #[arg(long)]
    editable: bool,

    /// Feed the text one character at a time, like a user typing
    #[arg(long)]
    typed: bool,

    #[arg(long, value_enum, default_value_t = Format::Outline)]
    format: Format,

    /// Log engine decisions (same as RUST_LOG=debug)
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    /// Indented node tree
    Outline,
    /// Serialized document tree
    Json,
    /// Post content and tags ready to publish
    Post,
    /// Text as displayed
    Text,
}

#[derive(Serialize)]
struct PostOutput {
    content: String,
    tags: Vec<Vec<String>>,
}

fn main() -> Result<()> {
    init_miette();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = config::load(cli.config.as_deref())?;
    if cli.editable {
        config.editable = true;
    }

    let text = read_text(cli.text, cli.file.as_deref())?;
    let tags = match &cli.tags {
        Some(path) => read_tags(path)?,
        None => Vec::new(),
    };
    let directory = match &cli.users {
        Some(path) => read_json::<Vec<UserRecord>>(path)?,
        None => Vec::new(),
    };

    let snapshot = UserSnapshot::new("", directory.clone());
    let composer = if cli.typed {
        let doc = Document::from_plain_text("", config.required_types());
        let mut composer =
            Composer::with_document(doc, tags, snapshot, config).into_diagnostic()?;
        let mut buf = [0u8; 4];
        for c in text.chars() {
            composer
                .type_text(c.encode_utf8(&mut buf))
                .into_diagnostic()?;
            answer_lookup(&mut composer, &directory);
        }
        composer
    } else {
        let doc = Document::from_plain_text(&text, config.required_types());
        let mut composer =
            Composer::with_document(doc, tags, snapshot, config).into_diagnostic()?;
        answer_lookup(&mut composer, &directory);
        composer
    };

    match cli.format {
        Format::Outline => print!("{}", composer.document().outline()),
        Format::Json => {
            let json = serde_json::to_string_pretty(&composer.document().export()).into_diagnostic()?;
            println!("{json}");
        }
        Format::Post => {
            let draft = composer.to_post();
            let output = PostOutput {
                tags: draft.raw_tags(),
                content: draft.content,
            };
            println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
        }
        Format::Text => println!("{}", composer.text()),
    }

    Ok(())
}

/// Stand-in for the profile store: serve the pending mention query from the
/// users file, matching name, display name or key by prefix.
fn answer_lookup(composer: &mut Composer, directory: &[UserRecord]) {
    let Some(query) = composer.mention_query().map(SmolStr::new) else {
        return;
    };
    if composer.users().query == query {
        return;
    }
    let needle = query.to_lowercase();
    let found: Vec<UserRecord> = directory
        .iter()
        .filter(|user| {
            [user.name.as_deref(), user.display_name.as_deref(), Some(user.identifier.as_str())]
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().starts_with(&needle))
        })
        .cloned()
        .collect();
    tracing::debug!(%query, found = found.len(), "answered mention lookup");
    composer.deliver_users(query, found);
}

fn read_text(text: Option<String>, file: Option<&Path>) -> Result<String> {
    if let Some(text) = text {
        return Ok(text);
    }
    if let Some(path) = file {
        return std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("reading {}", path.display()));
    }
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .into_diagnostic()
        .wrap_err("reading post text from stdin")?;
    // A trailing newline from the shell is not part of the post.
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}

fn read_tags(path: &Path) -> Result<Vec<Tag>> {
    let raw: Vec<Vec<String>> = read_json(path)?;
    Ok(tags_from_raw(&raw))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content)
        .into_diagnostic()
        .wrap_err_with(|| format!("parsing {}", path.display()))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

fn init_miette() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }))
    .expect("couldn't set the miette hook");
    miette::set_panic_hook();
}
