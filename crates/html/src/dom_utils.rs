use std::collections::HashSet;

use memchr::memchr;

use crate::{Document, NodeId};

/// Elements that take part in block layout. Used for empty-block pruning and
/// for deciding whether a table cell already breaks the line.
const BLOCK_TAGS: &[&str] = &[
    "html", "head", "body", "frameset", "script", "noscript", "style", "meta", "link", "title",
    "frame", "noframes", "section", "nav", "aside", "hgroup", "header", "footer", "p", "h1", "h2",
    "h3", "h4", "h5", "h6", "ul", "ol", "pre", "div", "blockquote", "hr", "address", "figure",
    "figcaption", "form", "fieldset", "ins", "del", "dl", "dt", "dd", "li", "table", "caption",
    "thead", "tfoot", "tbody", "colgroup", "col", "tr", "th", "td", "video", "audio", "canvas",
    "details", "menu", "plaintext", "template", "article", "main", "svg", "math", "center",
];

pub fn is_block_tag(name: &str) -> bool {
    BLOCK_TAGS.iter().any(|t| t.eq_ignore_ascii_case(name))
}

pub fn is_non_rendering_tag(name: &str) -> bool {
    let n = name.to_ascii_lowercase();
    matches!(
        n.as_str(),
        "head" | "style" | "script" | "title" | "meta" | "link"
    )
}

/// Whitespace in the HTML sense: space, tab, LF, FF, CR.
pub fn is_html_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\x0c' | '\r')
}

/// True when `text` holds only HTML whitespace. A no-break space counts as
/// content.
pub fn is_blank(text: &str) -> bool {
    text.chars().all(is_html_whitespace)
}

/// Collapses each run of whitespace (including no-break spaces) into one
/// ASCII space.
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if is_html_whitespace(c) || c == '\u{a0}' {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

/// Splits on `\n` and `\r\n`. A trailing newline yields a trailing empty
/// piece.
pub fn split_lines(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut start = 0;
    while let Some(rel) = memchr(b'\n', &bytes[start..]) {
        let nl = start + rel;
        let end = if nl > start && bytes[nl - 1] == b'\r' {
            nl - 1
        } else {
            nl
        };
        out.push(&text[start..end]);
        start = nl + 1;
    }
    out.push(&text[start..]);
    out
}

pub fn starts_with_ignore_ascii_case(haystack: &str, prefix: &str) -> bool {
    haystack.len() >= prefix.len()
        && haystack.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

pub fn is_table_cell(doc: &Document, id: NodeId) -> bool {
    doc.is_element_named(id, "td") || doc.is_element_named(id, "th")
}

/// Table cells whose next element sibling is also a cell, found in one pass
/// over the tree.
pub fn cells_followed_by_cell(doc: &Document) -> HashSet<NodeId> {
    let mut out = HashSet::new();
    let parents = std::iter::once(doc.root()).chain(doc.descendants(doc.root()));
    for parent in parents {
        let mut prev_cell: Option<NodeId> = None;
        for &child in doc.children(parent) {
            if doc.element_name(child).is_none() {
                continue;
            }
            let is_cell = is_table_cell(doc, child);
            if let (true, Some(prev)) = (is_cell, prev_cell) {
                out.insert(prev);
            }
            prev_cell = is_cell.then_some(child);
        }
    }
    out
}

/// Collect <img src="…"> values, trimmed and non-empty, in document order.
pub fn collect_img_srcs(doc: &Document) -> Vec<String> {
    doc.elements_by_tag("img")
        .into_iter()
        .filter_map(|img| {
            let src = doc.attr(img, "src")?.trim();
            (!src.is_empty()).then(|| src.to_string())
        })
        .collect()
}

pub fn outline_from_dom(doc: &Document, start: NodeId, cap: usize) -> Vec<String> {
    use crate::traverse::{Visitor, traverse};

    struct Outline {
        out: Vec<String>,
        left: usize,
    }

    impl Visitor for Outline {
        fn head(&mut self, doc: &Document, id: NodeId, depth: usize) {
            if self.left == 0 {
                return;
            }
            self.left -= 1;
            let indent = "  ".repeat(depth);
            if let Some(name) = doc.element_name(id) {
                self.out.push(format!("{indent}<{name}>"));
            } else if let Some(text) = doc.text(id) {
                let t = normalize_whitespace(text);
                let t = t.trim();
                if !t.is_empty() {
                    let show: String = t.chars().take(40).collect();
                    self.out.push(format!("{indent}\"{show}\""));
                }
            }
        }

        fn tail(&mut self, _doc: &Document, _id: NodeId, _depth: usize) {}

        fn descend(&mut self, _doc: &Document, _id: NodeId) -> bool {
            self.left > 0
        }
    }

    let mut outline = Outline {
        out: Vec::new(),
        left: cap,
    };
    traverse(doc, start, &mut outline);
    outline.out
}
