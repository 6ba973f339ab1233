use std::collections::HashMap;

use html::{Document, NodeId, Visitor, traverse};
use linkify::{LinkFinder, LinkKind};

use crate::policy::url_allowed;

fn url_finder() -> LinkFinder {
    let mut finder = LinkFinder::new();
    finder.kinds(&[LinkKind::Url]);
    finder.url_must_have_scheme(false);
    finder
}

/// Wraps bare web addresses found in text nodes into anchors.
///
/// Each text node with at least one match is replaced by a `span` holding
/// the unmatched runs as text and every match as `<a href=match>match</a>`.
/// Text already inside an `a` element is left alone.
pub fn autolink(doc: &mut Document) {
    let finder = url_finder();
    let mut replacements = HashMap::new();
    let mut linked = 0usize;
    for text_id in unlinked_text(doc) {
        let Some(text) = doc.text(text_id) else {
            continue;
        };
        let ranges: Vec<(usize, usize)> = finder
            .links(text)
            .filter(|link| is_safe_target(link.as_str()))
            .map(|link| (link.start(), link.end()))
            .collect();
        if ranges.is_empty() {
            continue;
        }
        let text = text.to_string();
        linked += ranges.len();
        let span = build_span(doc, &text, &ranges);
        replacements.insert(text_id, vec![span]);
    }
    doc.replace_many(&replacements);
    if linked > 0 {
        log::debug!(target: "sanitize", "autolinked {linked} urls");
    }
}

/// Text nodes outside any `a` element, in document order.
fn unlinked_text(doc: &Document) -> Vec<NodeId> {
    struct Collect {
        anchors: usize,
        out: Vec<NodeId>,
    }

    impl Visitor for Collect {
        fn head(&mut self, doc: &Document, id: NodeId, _depth: usize) {
            if doc.is_element_named(id, "a") {
                self.anchors += 1;
            } else if self.anchors == 0 && doc.node(id).is_text() {
                self.out.push(id);
            }
        }

        fn tail(&mut self, doc: &Document, id: NodeId, _depth: usize) {
            if doc.is_element_named(id, "a") {
                self.anchors -= 1;
            }
        }
    }

    let mut collect = Collect {
        anchors: 0,
        out: Vec::new(),
    };
    traverse(doc, doc.root(), &mut collect);
    collect.out
}

/// Scheme-less hosts are kept; anything with a scheme must pass the same
/// check as a whitelisted `a[href]`.
fn is_safe_target(url: &str) -> bool {
    match url.split_once(':') {
        Some((scheme, _)) if is_scheme(scheme) => url_allowed("a", "href", url),
        _ => true,
    }
}

// Dots are legal in schemes but would also match `host.tld:port`.
fn is_scheme(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-')
}

fn build_span(doc: &mut Document, text: &str, ranges: &[(usize, usize)]) -> NodeId {
    let span = doc.create_element("span");
    let mut pos = 0;
    for &(start, end) in ranges {
        if start > pos {
            doc.append_text(span, &text[pos..start]);
        }
        let url = &text[start..end];
        let a = doc.append_element(span, "a");
        doc.set_attr(a, "href", url);
        doc.append_text(a, url);
        pos = end;
    }
    if pos < text.len() {
        doc.append_text(span, &text[pos..]);
    }
    span
}
