use crate::traverse::{Visitor, traverse};
use crate::types::NodeKind;
use crate::{Document, NodeId};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "plaintext",
];

pub fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(name))
}

/// Serializes the whole document, doctype included.
pub fn to_html(doc: &Document) -> String {
    inner_html(doc, NodeId::ROOT)
}

pub fn outer_html(doc: &Document, id: NodeId) -> String {
    let mut ser = Serializer {
        out: String::new(),
        skip: None,
    };
    traverse(doc, id, &mut ser);
    ser.out
}

pub fn inner_html(doc: &Document, id: NodeId) -> String {
    let mut ser = Serializer {
        out: String::new(),
        skip: None,
    };
    for child in doc.children(id) {
        traverse(doc, *child, &mut ser);
    }
    ser.out
}

struct Serializer {
    out: String,
    // Children of a void element are never written.
    skip: Option<NodeId>,
}

impl Visitor for Serializer {
    fn head(&mut self, doc: &Document, id: NodeId, _depth: usize) {
        if self.skip.is_some() {
            return;
        }
        match doc.kind(id) {
            NodeKind::Document => {}
            NodeKind::Doctype { name } => {
                self.out.push_str("<!DOCTYPE ");
                self.out.push_str(name);
                self.out.push('>');
            }
            NodeKind::Element { name, attributes } => {
                self.out.push('<');
                self.out.push_str(name);
                for (k, v) in attributes {
                    self.out.push(' ');
                    self.out.push_str(k);
                    self.out.push_str("=\"");
                    escape_into(&mut self.out, v, true);
                    self.out.push('"');
                }
                self.out.push('>');
                if is_void_element(name) {
                    self.skip = Some(id);
                }
            }
            NodeKind::Text { text } => {
                let raw = doc
                    .parent(id)
                    .and_then(|p| doc.element_name(p))
                    .is_some_and(|p| RAW_TEXT_ELEMENTS.iter().any(|r| r.eq_ignore_ascii_case(p)));
                if raw {
                    self.out.push_str(text);
                } else {
                    escape_into(&mut self.out, text, false);
                }
            }
            NodeKind::Comment { text } => {
                self.out.push_str("<!--");
                self.out.push_str(text);
                self.out.push_str("-->");
            }
        }
    }

    fn tail(&mut self, doc: &Document, id: NodeId, _depth: usize) {
        if let Some(void) = self.skip {
            if void == id {
                self.skip = None;
            }
            return;
        }
        if let NodeKind::Element { name, .. } = doc.kind(id) {
            self.out.push_str("</");
            self.out.push_str(name);
            self.out.push('>');
        }
    }
}

pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    escape_into(&mut out, text, false);
    out
}

pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    escape_into(&mut out, value, true);
    out
}

fn escape_into(out: &mut String, text: &str, attr_mode: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            '"' if attr_mode => out.push_str("&quot;"),
            '<' if !attr_mode => out.push_str("&lt;"),
            '>' if !attr_mode => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}
