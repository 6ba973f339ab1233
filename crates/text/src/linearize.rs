use std::collections::HashSet;

use html::dom_utils::{cells_followed_by_cell, normalize_whitespace};
use html::traverse::is_non_rendering_element;
use html::{Document, NodeId, NodeKind, Visitor, parse_document, traverse};
use url::Url;

const QUOTE_MARKER: char = '>';

/// Elements that start a new line when entered.
const HEAD_BREAKS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "ol", "ul", "table", "br", "hr",
];

/// Elements that end the current line when left.
const TAIL_BREAKS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6", "p", "ol", "ul", "li"];

/// Renders HTML as quote-annotated plain text suitable for previews and
/// reply quoting. Output lines are separated by `\n` and prefixed with one
/// `>` per enclosing `blockquote`.
pub fn get_text(html: &str) -> String {
    Linearizer::new().linearize(html)
}

#[derive(Clone, Debug, Default)]
pub struct Linearizer {
    base: Option<Url>,
}

impl Linearizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relative link and image targets are resolved against `base`.
    pub fn with_base(base: Url) -> Self {
        Self { base: Some(base) }
    }

    pub fn linearize(&self, html: &str) -> String {
        self.linearize_document(&parse_document(html))
    }

    pub fn linearize_document(&self, doc: &Document) -> String {
        let mut state = State {
            base: self.base.as_ref(),
            joined_cells: cells_followed_by_cell(doc),
            out: String::new(),
            quote_level: 0,
            emitted_level: 0,
        };
        traverse(doc, doc.root(), &mut state);
        let text = state.finish();
        log::trace!(target: "text", "linearized {} nodes into {} bytes", doc.len(), text.len());
        text
    }
}

struct State<'a> {
    base: Option<&'a Url>,
    /// Cells followed by another cell stay on the current line.
    joined_cells: HashSet<NodeId>,
    out: String,
    quote_level: usize,
    emitted_level: usize,
}

impl State<'_> {
    fn emit(&mut self, text: &str) {
        if self.emitted_level != self.quote_level {
            self.line_break();
            self.emitted_level = self.quote_level;
        }
        let text = if self.out.is_empty() || self.out.ends_with([' ', '\n']) {
            text.trim_start_matches(' ')
        } else {
            text
        };
        self.out.push_str(text);
    }

    fn emit_text(&mut self, raw: &str) {
        let normalized = normalize_whitespace(raw);
        let trimmed = normalized.trim_end_matches(' ');
        if trimmed.trim_start_matches(' ').is_empty() {
            return;
        }
        self.emit(trimmed);
        self.out.push(' ');
    }

    fn emit_target(&mut self, doc: &Document, id: NodeId, attribute: &str) {
        let Some(target) = doc.attr(id, attribute).and_then(|v| self.absolute(v)) else {
            return;
        };
        self.emit("[");
        self.out.push_str(&target);
        self.out.push_str("] ");
    }

    fn absolute(&self, value: &str) -> Option<String> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let url = match self.base {
            Some(base) => base.join(value).ok()?,
            None => Url::parse(value).ok()?,
        };
        Some(url.to_string())
    }

    /// Ends the current line and starts the next one with the quote markers
    /// for the current level. A line holding nothing but markers is reused.
    fn line_break(&mut self) {
        trim_spaces(&mut self.out);
        let line_start = self.out.rfind('\n').map_or(0, |i| i + 1);
        if self.out[line_start..].chars().all(|c| c == QUOTE_MARKER) {
            self.out.truncate(line_start);
        } else {
            self.out.push('\n');
        }
        for _ in 0..self.quote_level {
            self.out.push(QUOTE_MARKER);
        }
        if self.quote_level > 0 {
            self.out.push(' ');
        }
    }

    fn finish(mut self) -> String {
        loop {
            let before = self.out.len();
            self.out.truncate(self.out.trim_end_matches([' ', '\n']).len());
            let line_start = self.out.rfind('\n').map_or(0, |i| i + 1);
            if self.out[line_start..].chars().all(|c| c == QUOTE_MARKER) {
                self.out.truncate(line_start);
            }
            if self.out.len() == before {
                break;
            }
        }
        self.out.push('\n');
        self.out
    }
}

fn trim_spaces(out: &mut String) {
    out.truncate(out.trim_end_matches(' ').len());
}

impl Visitor for State<'_> {
    fn head(&mut self, doc: &Document, id: NodeId, _depth: usize) {
        let name = match doc.kind(id) {
            NodeKind::Text { text } => {
                self.emit_text(text);
                return;
            }
            NodeKind::Element { name, .. } => name.as_str(),
            _ => return,
        };
        match name {
            "li" => self.emit("* "),
            "blockquote" => self.quote_level += 1,
            _ => {}
        }
        if HEAD_BREAKS.contains(&name) {
            self.line_break();
        }
    }

    fn tail(&mut self, doc: &Document, id: NodeId, _depth: usize) {
        let Some(name) = doc.element_name(id) else {
            return;
        };
        match name {
            "a" => self.emit_target(doc, id, "href"),
            "img" => self.emit_target(doc, id, "src"),
            "td" | "th" => {
                if !self.joined_cells.contains(&id) {
                    self.line_break();
                }
            }
            "blockquote" => self.quote_level = self.quote_level.saturating_sub(1),
            _ => {}
        }
        if TAIL_BREAKS.contains(&name) {
            self.line_break();
        }
    }

    fn descend(&mut self, doc: &Document, id: NodeId) -> bool {
        !is_non_rendering_element(doc, id)
    }
}
