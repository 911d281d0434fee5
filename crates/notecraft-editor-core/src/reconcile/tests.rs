//! Reconciliation passes over small documents.
//!
//! Tree shapes are checked as `Document::outline()` snapshots.

use super::*;
use crate::nodes::{NodeTypes, TextFormat, TextNode};
use crate::types::{Tag, UserRecord, UserSnapshot};

const EVENT: &str = "abc1230000000000000000000000000000000000000000000000000000000000";

struct Fixture {
    doc: Document,
    reconciler: Reconciler,
    tags: Vec<Tag>,
    users: UserSnapshot,
}

impl Fixture {
    fn new(content: &str, config: ComposerConfig) -> Self {
        Self::with_tags(content, config, Vec::new())
    }

    fn with_tags(content: &str, config: ComposerConfig, tags: Vec<Tag>) -> Self {
        let doc = Document::from_plain_text(content, config.required_types());
        let reconciler = Reconciler::new(&doc, config).unwrap();
        Self {
            doc,
            reconciler,
            tags,
            users: UserSnapshot::default(),
        }
    }

    /// Build and run the initial full pass.
    fn loaded(content: &str, config: ComposerConfig, tags: Vec<Tag>) -> Self {
        let mut fixture = Self::with_tags(content, config, tags);
        fixture.reconcile_all();
        fixture
    }

    fn reconcile_all(&mut self) -> Reconciliation {
        let ctx = ResolveContext::new(&self.tags, &self.users);
        self.reconciler.reconcile_all(&mut self.doc, &ctx).unwrap()
    }

    fn edit(&mut self, node: NodeId, text: &str) -> Reconciliation {
        self.doc.set_text(node, text).unwrap();
        let ctx = ResolveContext::new(&self.tags, &self.users);
        self.reconciler
            .on_text_mutated(&mut self.doc, node, &ctx)
            .unwrap()
    }

    fn paragraph(&self) -> NodeId {
        self.doc.children(self.doc.root())[0]
    }

    fn child(&self, index: usize) -> NodeId {
        self.doc.children(self.paragraph())[index]
    }

    fn label(&self, index: usize) -> NodeId {
        self.doc.children(self.child(index))[0]
    }

    fn outline(&self) -> String {
        self.doc.outline()
    }

    fn content(&self) -> String {
        self.doc.text_content(self.doc.root())
    }
}

#[test]
fn test_plain_text_is_noop() {
    let mut fx = Fixture::new(
        "just words, no links; nothing.\nsecond line",
        ComposerConfig::editable(),
    );
    let before = fx.outline();
    let report = fx.reconcile_all();
    assert!(report.is_noop());
    assert_eq!(fx.outline(), before);
}

#[test]
fn test_standalone_url_becomes_autolink() {
    let fx = Fixture::loaded(
        "go https://example.com/a now",
        ComposerConfig::default(),
        Vec::new(),
    );
    insta::assert_snapshot!(fx.outline(), @r##"
    root
      paragraph
        text "go "
        autolink https://example.com/a
          text "https://example.com/a"
        text " now"
    "##);
    let NodeKind::Autolink(link) = fx.doc.get(fx.child(1)).unwrap() else {
        panic!("expected autolink");
    };
    assert_eq!(link.attributes.rel.as_deref(), Some("noopener"));
    assert_eq!(link.attributes.target.as_deref(), Some("_blank"));
}

#[test]
fn test_scheme_less_url_is_normalized() {
    let fx = Fixture::loaded("//example.com", ComposerConfig::default(), Vec::new());
    insta::assert_snapshot!(fx.outline(), @r##"
    root
      paragraph
        autolink https://example.com
          text "//example.com"
    "##);
}

#[test]
fn test_url_keeps_its_scheme() {
    let fx = Fixture::loaded("see ftp://a.com/x now", ComposerConfig::default(), Vec::new());
    insta::assert_snapshot!(fx.outline(), @r##"
    root
      paragraph
        text "see "
        autolink ftp://a.com/x
          text "ftp://a.com/x"
        text " now"
    "##);
}

#[test]
fn test_url_between_line_breaks() {
    let fx = Fixture::loaded("a\nhttps://a.com\nb", ComposerConfig::default(), Vec::new());
    insta::assert_snapshot!(fx.outline(), @r##"
    root
      paragraph
        text "a"
        line-break
        autolink https://a.com
          text "https://a.com"
        line-break
        text "b"
    "##);
}

#[test]
fn test_url_glued_to_word_stays_text() {
    let mut fx = Fixture::new("see:https://a.com", ComposerConfig::default());
    let report = fx.reconcile_all();
    assert!(report.is_noop());
}

#[test]
fn test_media_classification() {
    let fx = Fixture::loaded(
        "https://x.com/img.PNG https://x.com/clip.mkv https://x.com/page",
        ComposerConfig::default(),
        Vec::new(),
    );
    insta::assert_snapshot!(fx.outline(), @r##"
    root
      paragraph
        media image https://x.com/img.PNG
        text " "
        media video https://x.com/clip.mkv
        text " "
        autolink https://x.com/page
          text "https://x.com/page"
    "##);
}

#[test]
fn test_mention_needs_separator_before() {
    let mut fx = Fixture::new("foo@bar.com", ComposerConfig::editable());
    assert!(fx.reconcile_all().is_noop());

    let mut fx = Fixture::new("hi @bar.com", ComposerConfig::editable());
    let report = fx.reconcile_all();
    assert_eq!(report.created.len(), 1);
    assert_eq!(report.mention_query.as_deref(), Some("bar"));
    insta::assert_snapshot!(fx.outline(), @r##"
    root
      paragraph
        text "hi "
        editable-mention "bar" candidates=0
          text "@bar"
        text ".com"
    "##);
}

#[test]
fn test_read_only_ignores_mentions() {
    let mut fx = Fixture::new("hi @bar", ComposerConfig::read_only());
    assert!(fx.reconcile_all().is_noop());
}

#[test]
fn test_tag_reference_to_note() {
    let fx = Fixture::loaded(
        "see #[0] now",
        ComposerConfig::default(),
        vec![Tag::event(0, EVENT)],
    );
    insta::assert_snapshot!(fx.outline(), @r##"
    root
      paragraph
        text "see "
        reference note /note/abc1230000000000000000000000000000000000000000000000000000000000
          text "note140qjxqq"
        text " now"
    "##);
    let NodeKind::Reference(reference) = fx.doc.get(fx.child(1)).unwrap() else {
        panic!("expected reference");
    };
    assert_eq!(reference.target_id, EVENT);
    assert_eq!(reference.source, "#[0]");
}

#[test]
fn test_missing_tag_stays_literal() {
    let mut fx = Fixture::with_tags(
        "see #[9] now",
        ComposerConfig::default(),
        vec![Tag::event(0, EVENT)],
    );
    let report = fx.reconcile_all();
    assert!(report.is_noop());
    insta::assert_snapshot!(fx.outline(), @r##"
    root
      paragraph
        text "see #[9] now"
    "##);
}

#[test]
fn test_person_tag_becomes_mention() {
    let mut fx = Fixture::with_tags(
        "gm #[0]",
        ComposerConfig::default(),
        vec![Tag::person(0, "pk")],
    );
    fx.users = UserSnapshot::new("", vec![UserRecord::new("pk").with_name("pat")]);
    fx.reconcile_all();
    insta::assert_snapshot!(fx.outline(), @r##"
    root
      paragraph
        text "gm "
        mention pk resolved
    "##);
    assert_eq!(fx.content(), "gm #[0]");
}

#[test]
fn test_rejected_matches_keep_offsets() {
    let fx = Fixture::loaded(
        "a#[0] b#[1] #[2]",
        ComposerConfig::default(),
        vec![
            Tag::hashtag(0, "x"),
            Tag::hashtag(1, "x"),
            Tag::hashtag(2, "x"),
        ],
    );
    insta::assert_snapshot!(fx.outline(), @r##"
    root
      paragraph
        text "a#[0] b#[1] "
        reference hashtag /t/x
          text "#x"
    "##);
}

#[test]
fn test_matches_before_higher_priority_hit_are_found() {
    let fx = Fixture::loaded(
        "@al #[0] https://a.com",
        ComposerConfig::editable(),
        vec![Tag::hashtag(0, "nostr")],
    );
    insta::assert_snapshot!(fx.outline(), @r##"
    root
      paragraph
        editable-mention "al" candidates=0
          text "@al"
        text " "
        reference hashtag /t/nostr
          text "#nostr"
        text " "
        autolink https://a.com
          text "https://a.com"
    "##);
}

#[test]
fn test_multibyte_text() {
    let fx = Fixture::loaded(
        "héllo https://a.com ünï #tag",
        ComposerConfig::default(),
        Vec::new(),
    );
    insta::assert_snapshot!(fx.outline(), @r##"
    root
      paragraph
        text "héllo "
        autolink https://a.com
          text "https://a.com"
        text " ünï "
        reference hashtag /t/tag
          text "#tag"
    "##);
}

#[test]
fn test_resolved_document_is_fixed_point() {
    let mut fx = Fixture::loaded(
        "hi @al see #[0] and https://a.com #nostr\nhttps://x.com/a.gif #[1]",
        ComposerConfig::editable(),
        vec![Tag::event(0, EVENT), Tag::person(1, "pk")],
    );
    let before = fx.outline();
    assert_eq!(fx.doc.descendants(fx.doc.root()).len(), 17);

    let report = fx.reconcile_all();
    assert!(report.is_noop(), "{report:?}");
    assert_eq!(fx.outline(), before);
}

#[test]
fn test_demotion_preserves_content() {
    let content = "a https://x.com/i.png #[0] #[1] https://b.com z";
    let mut fx = Fixture::loaded(
        content,
        ComposerConfig::default(),
        vec![Tag::person(0, "pk"), Tag::event(1, EVENT)],
    );
    let paragraph = fx.paragraph();
    let typed: Vec<NodeId> = fx
        .doc
        .children(paragraph)
        .iter()
        .copied()
        .filter(|id| !fx.doc.is_text(*id))
        .collect();
    assert_eq!(typed.len(), 4);

    let users = UserSnapshot::default();
    let mut pass = Pass::new(
        &fx.reconciler,
        &mut fx.doc,
        ResolveContext::new(&fx.tags, &users),
    );
    for node in &typed {
        pass.demote(*node).unwrap();
    }
    assert_eq!(pass.report.demoted, 4);
    // Everything folded back into one run.
    assert_eq!(pass.queue.len(), 1);
    assert_eq!(pass.doc.text_nodes().len(), 1);
    assert_eq!(pass.doc.text_content(pass.doc.root()), content);

    pass.drain().unwrap();
    assert_eq!(pass.report.created.len(), 4);
    assert!(typed.iter().all(|id| !fx.doc.contains(*id)));
    assert_eq!(fx.content(), content);
    let fresh = Fixture::loaded(
        content,
        ComposerConfig::default(),
        vec![Tag::person(0, "pk"), Tag::event(1, EVENT)],
    );
    assert_eq!(fx.outline(), fresh.outline());
}

#[test]
fn test_demoted_text_is_rescanned_as_merged_run() {
    let mut fx = Fixture::loaded("#ab cd", ComposerConfig::default(), Vec::new());
    let hashtag = fx.child(0);
    let tail = fx.child(1);

    let report = fx.edit(tail, "cd");
    assert_eq!(report.demoted, 1);
    assert_eq!(report.created.len(), 1);
    assert!(!fx.doc.contains(hashtag));
    insta::assert_snapshot!(fx.outline(), @r##"
    root
      paragraph
        reference hashtag /t/abcd
          text "#abcd"
    "##);
    let fresh = Fixture::loaded("#abcd", ComposerConfig::default(), Vec::new());
    assert_eq!(fx.outline(), fresh.outline());
}

#[test]
fn test_neighbor_edit_demotes_autolink() {
    let mut fx = Fixture::loaded("http://a.com ab", ComposerConfig::default(), Vec::new());
    let tail = fx.child(1);
    assert_eq!(fx.doc.text(tail), Some(" ab"));

    let link = fx.child(0);

    let report = fx.edit(tail, "ab");
    assert_eq!(report.demoted, 1);
    assert!(!fx.doc.contains(link));
    assert!(!fx.doc.contains(tail));
    // The merged text is a longer URL of its own.
    insta::assert_snapshot!(fx.outline(), @r##"
    root
      paragraph
        autolink http://a.comab
          text "http://a.comab"
    "##);

    let mut fx = Fixture::loaded("http://a.com ab", ComposerConfig::default(), Vec::new());
    let tail = fx.child(1);
    let report = fx.edit(tail, "!ab");
    assert_eq!(report.demoted, 1);
    assert!(report.created.is_empty());
    insta::assert_snapshot!(fx.outline(), @r##"
    root
      paragraph
        text "http://a.com!ab"
    "##);
}

#[test]
fn test_edit_before_link_demotes_it() {
    let mut fx = Fixture::loaded("x https://a.com", ComposerConfig::default(), Vec::new());
    let head = fx.child(0);

    let report = fx.edit(head, "x!");
    assert_eq!(report.demoted, 1);
    assert!(report.created.is_empty());
    insta::assert_snapshot!(fx.outline(), @r##"
    root
      paragraph
        text "x!https://a.com"
    "##);
}

#[test]
fn test_neighbor_edit_keeping_separator_is_harmless() {
    let mut fx = Fixture::loaded("http://a.com ab", ComposerConfig::default(), Vec::new());
    let before = fx.outline();
    let tail = fx.child(1);

    let report = fx.edit(tail, ", ab");
    assert!(report.is_noop());
    assert_eq!(fx.outline(), before.replace("\" ab\"", "\", ab\""));
}

#[test]
fn test_link_edit_updates_url_in_place() {
    let mut fx = Fixture::loaded("https://a.com x", ComposerConfig::default(), Vec::new());
    let link = fx.child(0);
    let label = fx.label(0);

    let report = fx.edit(label, "https://a.com/b");
    assert_eq!(report.updated, vec![link]);
    assert_eq!(report.demoted, 0);
    insta::assert_snapshot!(fx.outline(), @r##"
    root
      paragraph
        autolink https://a.com/b
          text "https://a.com/b"
        text " x"
    "##);
}

#[test]
fn test_link_edit_breaking_match_demotes() {
    let mut fx = Fixture::loaded("https://a.com x", ComposerConfig::default(), Vec::new());
    let label = fx.label(0);

    let report = fx.edit(label, "https://a.com!");
    assert_eq!(report.demoted, 1);
    assert!(report.created.is_empty());
    insta::assert_snapshot!(fx.outline(), @r##"
    root
      paragraph
        text "https://a.com! x"
    "##);
}

#[test]
fn test_typing_separator_inside_link_splits_it_out() {
    let mut fx = Fixture::loaded("https://a.com x", ComposerConfig::default(), Vec::new());
    let label = fx.label(0);

    let report = fx.edit(label, "https://a.com ");
    assert_eq!(report.demoted, 1);
    assert_eq!(report.created.len(), 1);
    insta::assert_snapshot!(fx.outline(), @r##"
    root
      paragraph
        autolink https://a.com
          text "https://a.com"
        text "  x"
    "##);
}

#[test]
fn test_link_edit_changing_kind_rescans() {
    let mut fx = Fixture::loaded("https://a.com x", ComposerConfig::default(), Vec::new());
    let label = fx.label(0);

    let report = fx.edit(label, "https://a.com/i.png");
    assert_eq!(report.demoted, 1);
    assert_eq!(report.created.len(), 1);
    insta::assert_snapshot!(fx.outline(), @r##"
    root
      paragraph
        media image https://a.com/i.png
        text " x"
    "##);

    let mut fx = Fixture::loaded("https://a.com x", ComposerConfig::default(), Vec::new());
    let label = fx.label(0);
    fx.edit(label, "#nostr");
    insta::assert_snapshot!(fx.outline(), @r##"
    root
      paragraph
        reference hashtag /t/nostr
          text "#nostr"
        text " x"
    "##);
}

#[test]
fn test_emptied_text_revalidates_neighbors() {
    let mut fx = Fixture::loaded("#a #b", ComposerConfig::default(), Vec::new());
    let gap = fx.child(1);
    assert_eq!(fx.doc.text(gap), Some(" "));

    let report = fx.edit(gap, "");
    assert_eq!(report.demoted, 2);
    assert!(report.created.is_empty());
    assert!(!fx.doc.contains(gap));
    insta::assert_snapshot!(fx.outline(), @r##"
    root
      paragraph
        text "#a#b"
    "##);
}

#[test]
fn test_editable_mention_follows_typing() {
    let mut fx = Fixture::loaded("hi @al", ComposerConfig::editable(), Vec::new());
    let mention = fx.child(1);
    let label = fx.label(1);
    fx.users = UserSnapshot::new(
        "ali",
        (0..7).map(|i| UserRecord::new(format!("k{i}"))).collect(),
    );

    let report = fx.edit(label, "@ali");
    assert_eq!(report.updated, vec![mention]);
    assert_eq!(report.mention_query.as_deref(), Some("ali"));
    insta::assert_snapshot!(fx.outline(), @r##"
    root
      paragraph
        text "hi "
        editable-mention "ali" candidates=5
          text "@ali"
    "##);
    let NodeKind::EditableMention(node) = fx.doc.get(mention).unwrap() else {
        panic!("expected editable mention");
    };
    let keys: Vec<_> = node.candidates.iter().map(|u| u.identifier.as_str()).collect();
    assert_eq!(keys, ["k0", "k1", "k2", "k3", "k4"]);
}

#[test]
fn test_tag_changes_revalidate_references() {
    let mut fx = Fixture::loaded(
        "see #[0] now",
        ComposerConfig::default(),
        vec![Tag::event(0, EVENT)],
    );
    let reference = fx.child(1);

    fx.tags = vec![Tag::hashtag(0, "nostr")];
    let report = fx.reconcile_all();
    assert_eq!(report.updated, vec![reference]);
    insta::assert_snapshot!(fx.outline(), @r##"
    root
      paragraph
        text "see "
        reference hashtag /t/nostr
          text "#nostr"
        text " now"
    "##);

    fx.tags.clear();
    let report = fx.reconcile_all();
    assert_eq!(report.demoted, 1);
    insta::assert_snapshot!(fx.outline(), @r##"
    root
      paragraph
        text "see #[0] now"
    "##);

    fx.tags = vec![Tag::event(0, EVENT)];
    let report = fx.reconcile_all();
    assert_eq!(report.created.len(), 1);
    assert_eq!(fx.content(), "see note140qjxqq now");
}

#[test]
fn test_formatted_text_is_not_scanned() {
    let config = ComposerConfig::default();
    let mut doc = Document::with_types(config.required_types());
    let paragraph = doc.create(NodeKind::Paragraph).unwrap();
    doc.append(doc.root(), paragraph).unwrap();
    let mut bold = TextNode::new("https://a.com");
    bold.format = TextFormat::BOLD;
    let text = doc.create(NodeKind::Text(bold)).unwrap();
    doc.append(paragraph, text).unwrap();

    let reconciler = Reconciler::new(&doc, config).unwrap();
    let users = UserSnapshot::default();
    let report = reconciler
        .on_text_mutated(&mut doc, text, &ResolveContext::new(&[], &users))
        .unwrap();
    assert!(report.is_noop());
}

#[test]
fn test_link_with_formatted_child_is_demoted() {
    let mut fx = Fixture::loaded("https://a.com x", ComposerConfig::default(), Vec::new());
    let link = fx.child(0);
    let mut bold = TextNode::new("!");
    bold.format = TextFormat::BOLD;
    let extra = fx.doc.create(NodeKind::Text(bold)).unwrap();
    fx.doc.append(link, extra).unwrap();

    let users = UserSnapshot::default();
    let report = fx
        .reconciler
        .on_text_mutated(&mut fx.doc, extra, &ResolveContext::new(&fx.tags, &users))
        .unwrap();
    assert_eq!(report.demoted, 1);
    assert!(!fx.doc.contains(link));
    assert_eq!(fx.content(), "https://a.com! x");
    assert!(
        fx.doc
            .descendants(fx.doc.root())
            .iter()
            .all(|id| !fx.doc.is_link_like(*id))
    );
}

#[test]
fn test_missing_registration_fails_fast() {
    let doc = Document::from_plain_text("x", NodeTypes::AUTOLINK);
    let err = Reconciler::new(&doc, ComposerConfig::read_only()).unwrap_err();
    assert_eq!(
        err,
        EditorError::UnregisteredNodeTypes {
            missing: NodeTypes::MEDIA | NodeTypes::MENTION | NodeTypes::REFERENCE
        }
    );

    let doc = Document::from_plain_text("x", NodeTypes::EMBEDS);
    let err = Reconciler::new(&doc, ComposerConfig::editable()).unwrap_err();
    assert_eq!(
        err,
        EditorError::UnregisteredNodeTypes {
            missing: NodeTypes::EDITABLE_MENTION
        }
    );
}

#[test]
fn test_mutation_of_non_text_is_an_error() {
    let mut fx = Fixture::new("x", ComposerConfig::default());
    let paragraph = fx.paragraph();
    let users = UserSnapshot::default();
    let ctx = ResolveContext::new(&[], &users);

    let err = fx
        .reconciler
        .on_text_mutated(&mut fx.doc, paragraph, &ctx)
        .unwrap_err();
    assert_eq!(
        err,
        EditorError::UnexpectedNodeType {
            id: paragraph,
            expected: "text",
            actual: "paragraph"
        }
    );

    let text = fx.child(0);
    fx.doc.remove(text).unwrap();
    assert_eq!(
        fx.reconciler
            .on_text_mutated(&mut fx.doc, text, &ctx)
            .unwrap_err(),
        EditorError::MissingNode(text)
    );
}
