use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use core_types::Preferences;
use html::dom_utils::{cells_followed_by_cell, is_blank, is_block_tag, split_lines};
use html::{Document, NodeId, NodeKind, body_html};

use crate::autolink::autolink;
use crate::policy::Policy;
use crate::tracking::is_tracking_pixel;

static RELAXED: LazyLock<Policy> = LazyLock::new(Policy::relaxed);

pub const QUOTE_PLACEHOLDER: &str = "\u{2026}";
pub const RULE_TEXT: &str = "----------------------------------------";

/// Formats the label of the link shown next to a neutralized tracking pixel
/// from its declared width and height.
pub type TrackingHint = fn(&str, &str) -> String;

pub fn default_tracking_hint(width: &str, height: &str) -> String {
    format!("Tracking image {width}x{height}")
}

#[derive(Clone, Copy, Debug)]
pub struct SanitizeOptions {
    /// When false, every blockquote collapses to an ellipsis.
    pub show_quoted_text: bool,
    /// Remove tracking pixel sources and show a link in their place.
    pub paranoid: bool,
    pub tracking_hint: TrackingHint,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self {
            show_quoted_text: true,
            paranoid: true,
            tracking_hint: default_tracking_hint,
        }
    }
}

impl SanitizeOptions {
    pub fn from_prefs(prefs: &dyn Preferences, show_quoted_text: bool) -> Self {
        Self {
            show_quoted_text,
            paranoid: core_types::paranoid(prefs),
            ..Self::default()
        }
    }
}

/// Element-class rewrites, applied in declaration order after the whitelist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Rule {
    CollapseQuotes,
    ShortQuotes,
    Preformatted,
    Code,
    HorizontalRules,
    Descriptions,
    Abbreviations,
    Images,
    Tables,
    Lists,
}

const RULES: &[Rule] = &[
    Rule::CollapseQuotes,
    Rule::ShortQuotes,
    Rule::Preformatted,
    Rule::Code,
    Rule::HorizontalRules,
    Rule::Descriptions,
    Rule::Abbreviations,
    Rule::Images,
    Rule::Tables,
    Rule::Lists,
];

impl Rule {
    fn apply(self, doc: &mut Document, opts: &SanitizeOptions) {
        match self {
            Rule::CollapseQuotes => {
                if !opts.show_quoted_text {
                    collapse_quotes(doc);
                }
            }
            Rule::ShortQuotes => {
                for q in doc.elements_by_tag("q") {
                    doc.prepend_text(q, "\"");
                    doc.append_text(q, "\"");
                    doc.rename(q, "em");
                }
            }
            Rule::Preformatted => {
                for pre in doc.elements_by_tag("pre") {
                    break_lines(doc, pre);
                    doc.rename(pre, "div");
                }
            }
            Rule::Code => retag_all(doc, "code", "div"),
            Rule::HorizontalRules => {
                for hr in doc.elements_by_tag("hr") {
                    doc.rename(hr, "div");
                    doc.set_text_content(hr, RULE_TEXT);
                }
            }
            Rule::Descriptions => {
                retag_all(doc, "dl", "div");
                for dt in doc.elements_by_tag("dt") {
                    doc.rename(dt, "strong");
                    doc.append_element(dt, "br");
                }
                for dd in doc.elements_by_tag("dd") {
                    doc.rename(dd, "em");
                    doc.append_element(dd, "br");
                    doc.append_element(dd, "br");
                }
            }
            Rule::Abbreviations => retag_all(doc, "abbr", "u"),
            Rule::Images => {
                for img in doc.elements_by_tag("img") {
                    rewrite_image(doc, img, opts);
                }
            }
            Rule::Tables => rewrite_tables(doc),
            Rule::Lists => {
                for li in doc.elements_by_tag("li") {
                    doc.rename(li, "span");
                    doc.prepend_text(li, "* ");
                    doc.append_element(li, "br");
                }
                retag_all(doc, "ol", "div");
                retag_all(doc, "ul", "div");
            }
        }
    }
}

/// Full sanitizing pass: whitelist, element rewrites, autolinking and
/// empty-block pruning. Returns the inner markup of `body`.
pub fn sanitize(html: &str, opts: &SanitizeOptions) -> String {
    let mut doc = RELAXED.apply(html);
    for rule in RULES {
        rule.apply(&mut doc, opts);
        log::trace!(target: "sanitize", "applied {rule:?}");
    }
    autolink(&mut doc);
    prune_empty_blocks(&mut doc);
    body_html(&doc)
}

pub fn sanitize_with_prefs(html: &str, show_quoted_text: bool, prefs: &dyn Preferences) -> String {
    sanitize(html, &SanitizeOptions::from_prefs(prefs, show_quoted_text))
}

fn retag_all(doc: &mut Document, from: &str, to: &str) {
    for id in doc.elements_by_tag(from) {
        doc.rename(id, to);
    }
}

fn collapse_quotes(doc: &mut Document) {
    for quote in doc.elements_by_tag("blockquote") {
        // Nested quotes were detached with their collapsed ancestor.
        if !doc.is_attached(quote) {
            continue;
        }
        doc.set_text_content(quote, QUOTE_PLACEHOLDER);
    }
}

/// Replaces each newline inside the text under `pre` with a `br` element.
fn break_lines(doc: &mut Document, pre: NodeId) {
    let texts: Vec<NodeId> = doc
        .descendants(pre)
        .into_iter()
        .filter(|id| doc.node(*id).is_text())
        .collect();
    let mut replacements = HashMap::new();
    for text_id in texts {
        let Some(text) = doc.text(text_id) else {
            continue;
        };
        let lines: Vec<String> = split_lines(text).into_iter().map(str::to_string).collect();
        if lines.len() < 2 {
            continue;
        }
        let mut pieces = Vec::with_capacity(lines.len() * 2);
        for (i, line) in lines.into_iter().enumerate() {
            if i > 0 {
                pieces.push(doc.create_element("br"));
            }
            if !line.is_empty() {
                pieces.push(doc.create_text(line));
            }
        }
        replacements.insert(text_id, pieces);
    }
    doc.replace_many(&replacements);
}

fn rewrite_image(doc: &mut Document, img: NodeId, opts: &SanitizeOptions) {
    // Snapshot before any mutation; the clone below must see the stripped src
    // while the hint link needs the original one.
    let src = doc.attr_or_empty(img, "src").to_string();
    let alt = doc.attr_or_empty(img, "alt").to_string();
    let title = doc.attr_or_empty(img, "title").to_string();
    let width = doc.attr_or_empty(img, "width").to_string();
    let height = doc.attr_or_empty(img, "height").to_string();
    let tracking = opts.paranoid && is_tracking_pixel(doc, img);

    if tracking {
        log::debug!(target: "sanitize", "neutralizing tracking pixel {src}");
        doc.remove_attr(img, "src");
    }

    let container = doc.create_element("span");
    doc.append_element(container, "br");
    let copy = doc.clone_subtree(img);
    doc.append_child(container, copy);
    doc.append_element(container, "br");

    if !title.is_empty() {
        doc.append_element(container, "br");
        let em = doc.append_element(container, "em");
        doc.append_text(em, title);
    }
    if !alt.is_empty() {
        doc.append_element(container, "br");
        let em = doc.append_element(container, "em");
        doc.append_text(em, alt);
    }
    if tracking {
        doc.append_element(container, "br");
        let a = doc.append_element(container, "a");
        doc.set_attr(a, "href", src);
        doc.append_text(a, (opts.tracking_hint)(&width, &height));
    }

    doc.rename(img, "span");
    doc.clear_attrs(img);
    doc.clear_children(img);
    doc.move_children(container, img);
}

fn rewrite_tables(doc: &mut Document) {
    let joined = cells_followed_by_cell(doc);
    for cell in doc.elements_by_tags(&["th", "td"]) {
        if joined.contains(&cell) {
            doc.append_text(cell, "\u{a0}");
        } else if !has_block_descendant(doc, cell) {
            doc.append_element(cell, "br");
        }
        let tag = if doc.is_element_named(cell, "th") {
            "strong"
        } else {
            "span"
        };
        doc.rename(cell, tag);
    }
    retag_all(doc, "tr", "span");
    retag_all(doc, "caption", "p");
    retag_all(doc, "table", "div");
}

fn has_block_descendant(doc: &Document, id: NodeId) -> bool {
    doc.descendants(id)
        .into_iter()
        .any(|d| doc.element_name(d).is_some_and(is_block_tag))
}

/// Removes block elements that display nothing: no text and no image.
fn prune_empty_blocks(doc: &mut Document) {
    let order = doc.descendants(doc.root());
    // Children come before parents in reverse document order.
    let mut has_content: HashSet<NodeId> = HashSet::new();
    for &id in order.iter().rev() {
        let own = match doc.kind(id) {
            NodeKind::Text { text } => !is_blank(text),
            NodeKind::Element { name, .. } => name == "img",
            _ => false,
        };
        if own || doc.children(id).iter().any(|c| has_content.contains(c)) {
            has_content.insert(id);
        }
    }

    let mut empty = Vec::new();
    let mut stack = vec![doc.root()];
    while let Some(id) = stack.pop() {
        let prunable = doc.element_name(id).is_some_and(|name| {
            name != "html" && name != "body" && is_block_tag(name)
        });
        if prunable && !has_content.contains(&id) {
            empty.push(id);
            continue;
        }
        stack.extend(doc.children(id).iter().rev());
    }
    doc.detach_all(&empty);
    log::trace!(target: "sanitize", "pruned {} empty blocks", empty.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(input: &str) -> String {
        sanitize(input, &SanitizeOptions::default())
    }

    #[test]
    fn plain_paragraph_is_unchanged() {
        assert_eq!(run("<p>hello</p>"), "<p>hello</p>");
    }

    #[test]
    fn empty_input_produces_empty_output() {
        assert_eq!(run(""), "");
        assert_eq!(run("<script>x()</script>"), "");
    }

    #[test]
    fn collapses_nested_quotes() {
        let opts = SanitizeOptions {
            show_quoted_text: false,
            ..SanitizeOptions::default()
        };
        let out = sanitize(
            "<blockquote>a<blockquote>b<blockquote>c</blockquote></blockquote></blockquote>",
            &opts,
        );
        assert_eq!(out, "<blockquote>\u{2026}</blockquote>");
    }

    #[test]
    fn shows_quotes_when_asked() {
        let out = run("<blockquote><p>quoted</p></blockquote>");
        assert_eq!(out, "<blockquote><p>quoted</p></blockquote>");
    }

    #[test]
    fn short_quotes_become_emphasis() {
        assert_eq!(run("<q>hi</q>"), "<em>\"hi\"</em>");
    }

    #[test]
    fn preformatted_newlines_become_breaks() {
        assert_eq!(run("<pre>a\nb\r\nc</pre>"), "<div>a<br>b<br>c</div>");
    }

    #[test]
    fn code_becomes_div() {
        assert_eq!(run("<code>x</code>"), "<div>x</div>");
    }

    #[test]
    fn horizontal_rule_becomes_dashes() {
        assert_eq!(run("<hr>"), format!("<div>{RULE_TEXT}</div>"));
    }

    #[test]
    fn definition_lists() {
        assert_eq!(
            run("<dl><dt>term</dt><dd>def</dd></dl>"),
            "<div><strong>term<br></strong><em>def<br><br></em></div>"
        );
    }

    #[test]
    fn abbreviations_are_underlined() {
        assert_eq!(run("<abbr>TLA</abbr>"), "<u>TLA</u>");
    }

    #[test]
    fn image_is_demoted_with_title_and_alt() {
        let out = run(r#"<img src="https://x.example/a.png" alt="A" title="T">"#);
        assert_eq!(
            out,
            concat!(
                r#"<span><br><img src="https://x.example/a.png" alt="A" title="T"><br>"#,
                "<br><em>T</em><br><em>A</em></span>"
            )
        );
    }

    #[test]
    fn tracking_pixel_gets_hint_link() {
        let out = run(r#"<img src="https://t.example/o.gif" width="1" height="1">"#);
        assert_eq!(
            out,
            concat!(
                r#"<span><br><img width="1" height="1"><br>"#,
                r#"<br><a href="https://t.example/o.gif">Tracking image 1x1</a></span>"#
            )
        );
    }

    #[test]
    fn tracking_pixel_kept_when_not_paranoid() {
        let opts = SanitizeOptions {
            paranoid: false,
            ..SanitizeOptions::default()
        };
        let out = sanitize(r#"<img src="https://t.example/o.gif" width="1" height="1">"#, &opts);
        assert!(out.contains(r#"src="https://t.example/o.gif""#));
        assert!(!out.contains("Tracking image"));
    }

    #[test]
    fn custom_tracking_hint() {
        fn hint(w: &str, h: &str) -> String {
            format!("pixel {w}/{h}")
        }
        let opts = SanitizeOptions {
            tracking_hint: hint,
            ..SanitizeOptions::default()
        };
        let out = sanitize(r#"<img src="https://t.example/o.gif" width="2" height="3">"#, &opts);
        assert!(out.contains(">pixel 2/3</a>"), "{out}");
    }

    #[test]
    fn table_row_is_linearized_into_spans() {
        assert_eq!(
            run("<table><tr><th>h</th><td>a</td><td>b</td></tr></table>"),
            "<div><span><strong>h\u{a0}</strong><span>a\u{a0}</span><span>b<br></span></span></div>"
                .replace('\u{a0}', "&nbsp;")
        );
    }

    #[test]
    fn last_cell_with_block_gets_no_break() {
        assert_eq!(
            run("<table><tr><td><p>x</p></td></tr></table>"),
            "<div><span><span><p>x</p></span></span></div>"
        );
    }

    #[test]
    fn list_items_get_markers() {
        assert_eq!(
            run("<ul><li>one</li><li>two</li></ul>"),
            "<div><span>* one<br></span><span>* two<br></span></div>"
        );
    }

    #[test]
    fn empty_blocks_are_pruned() {
        assert_eq!(run("<div><br></div><p> </p><p>x</p>"), "<p>x</p>");
        assert_eq!(
            run(r#"<div><img src="https://x.example/a.png"></div>"#),
            r#"<div><span><br><img src="https://x.example/a.png"><br></span></div>"#
        );
    }

    #[test]
    fn urls_are_autolinked() {
        assert_eq!(
            run("<p>see https://example.com/x now</p>"),
            r#"<p><span>see <a href="https://example.com/x">https://example.com/x</a> now</span></p>"#
        );
    }

    #[test]
    fn script_urls_in_text_are_not_linked() {
        let out = run("<p>click javascript://x.example/%0aalert(document.cookie)</p>");
        assert!(!out.contains("href"), "{out}");
        assert!(out.starts_with("<p>click javascript:"), "{out}");
    }

    #[test]
    fn head_content_never_reaches_output() {
        assert_eq!(
            run("<html><head><title>Secret subject</title><style>p{}</style></head><body><p>body</p></body></html>"),
            "<p>body</p>"
        );
    }

    #[test]
    fn long_preformatted_block_is_linear() {
        let input = format!("<pre>{}</pre>", "line\n".repeat(80_000));
        let started = std::time::Instant::now();
        let out = run(&input);
        assert_eq!(out.matches("<br>").count(), 80_000);
        assert!(
            started.elapsed() < std::time::Duration::from_secs(30),
            "took {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn nested_empty_blocks_go_together() {
        assert_eq!(
            run("<div><div><p> </p></div><div><p>x</p><div></div></div></div>"),
            "<div><div><p>x</p></div></div>"
        );
    }

    #[test]
    fn reads_paranoid_from_prefs() {
        let mut prefs = core_types::MemoryPreferences::new();
        prefs.set_bool(core_types::keys::PARANOID, false);
        let out = sanitize_with_prefs(
            r#"<img src="https://t.example/o.gif" width="1" height="1">"#,
            true,
            &prefs,
        );
        assert!(!out.contains("Tracking image"));
    }
}
