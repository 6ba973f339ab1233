use std::ops::Range;

use html::dom_utils::{is_block_tag, normalize_whitespace};
use html::traverse::is_non_rendering_element;
use html::serialize::{escape_attr, escape_text};
use html::{Document, NodeId, NodeKind, Visitor, parse_document, traverse};

/// Stands in for an inline image inside [`StyledText::text`].
pub const OBJECT_CHAR: char = '\u{FFFC}';

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Style {
    Bold,
    Italic,
    Underline,
    Strike,
    Monospace,
    Link(String),
    Image(String),
    Quote,
}

impl Style {
    fn for_element(doc: &Document, id: NodeId, name: &str) -> Option<Self> {
        let style = match name {
            "b" | "strong" => Style::Bold,
            "i" | "em" | "cite" => Style::Italic,
            "u" => Style::Underline,
            "s" | "strike" | "del" => Style::Strike,
            "tt" | "code" => Style::Monospace,
            "a" => Style::Link(doc.attr(id, "href")?.to_string()),
            "blockquote" => Style::Quote,
            _ => return None,
        };
        Some(style)
    }

    fn tag(&self) -> Option<&'static str> {
        match self {
            Style::Bold => Some("b"),
            Style::Italic => Some("i"),
            Style::Underline => Some("u"),
            Style::Strike => Some("strike"),
            Style::Monospace => Some("tt"),
            Style::Link(_) => Some("a"),
            Style::Image(_) | Style::Quote => None,
        }
    }
}

/// Byte range of [`StyledText::text`] carrying one style.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StyleSpan {
    pub range: Range<usize>,
    pub style: Style,
}

/// Plain text plus style ranges, the editing model used when composing.
/// Conversions to and from markup are lossy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StyledText {
    pub text: String,
    pub spans: Vec<StyleSpan>,
}

impl StyledText {
    pub fn from_html(html: &str) -> Self {
        let doc = parse_document(html);
        let mut builder = Builder::default();
        traverse(&doc, doc.root(), &mut builder);
        builder.finish()
    }

    pub fn styles_at(&self, offset: usize) -> impl Iterator<Item = &Style> {
        self.spans
            .iter()
            .filter(move |s| s.range.contains(&offset))
            .map(|s| &s.style)
    }

    /// One `<p>` per line; quoted lines are wrapped in `blockquote`.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        let mut start = 0;
        for line in self.text.split_inclusive('\n') {
            let content = line.strip_suffix('\n').unwrap_or(line);
            let range = start..start + content.len();
            start += line.len();
            self.write_line(&mut out, range);
        }
        out
    }

    fn write_line(&self, out: &mut String, line: Range<usize>) {
        let quoted = self.spans.iter().any(|s| {
            s.style == Style::Quote && s.range.start <= line.start && line.start < s.range.end
        });
        if quoted {
            out.push_str("<blockquote>");
        }
        if line.is_empty() {
            out.push_str("<br>");
        } else {
            out.push_str("<p>");
            self.write_inline(out, line);
            out.push_str("</p>");
        }
        if quoted {
            out.push_str("</blockquote>");
        }
    }

    /// Spans are public, so an edge may fall inside a multi-byte character.
    fn char_floor(&self, mut offset: usize) -> usize {
        while !self.text.is_char_boundary(offset) {
            offset -= 1;
        }
        offset
    }

    fn write_inline(&self, out: &mut String, line: Range<usize>) {
        let inline: Vec<&StyleSpan> = self
            .spans
            .iter()
            .filter(|s| s.style != Style::Quote)
            .filter(|s| s.range.start < line.end && line.start < s.range.end)
            .collect();

        let mut cuts = vec![line.start, line.end];
        for span in &inline {
            for edge in [span.range.start, span.range.end] {
                cuts.push(self.char_floor(edge.clamp(line.start, line.end)));
            }
        }
        cuts.sort_unstable();
        cuts.dedup();

        for pair in cuts.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let active: Vec<&Style> = inline
                .iter()
                .filter(|s| s.range.start <= a && b <= s.range.end)
                .map(|s| &s.style)
                .collect();
            if let Some(Style::Image(src)) = active.iter().find(|s| matches!(s, Style::Image(_))) {
                out.push_str("<img src=\"");
                out.push_str(&escape_attr(src));
                out.push_str("\">");
                continue;
            }
            for style in &active {
                match style {
                    Style::Link(href) => {
                        out.push_str("<a href=\"");
                        out.push_str(&escape_attr(href));
                        out.push_str("\">");
                    }
                    other => {
                        if let Some(tag) = other.tag() {
                            out.push('<');
                            out.push_str(tag);
                            out.push('>');
                        }
                    }
                }
            }
            out.push_str(&escape_text(&self.text[a..b]));
            for style in active.iter().rev() {
                if let Some(tag) = style.tag() {
                    out.push_str("</");
                    out.push_str(tag);
                    out.push('>');
                }
            }
        }
    }
}

#[derive(Default)]
struct Builder {
    text: String,
    spans: Vec<StyleSpan>,
    open: Vec<(NodeId, Style, usize)>,
}

impl Builder {
    fn paragraph_break(&mut self) {
        self.trim_spaces();
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push('\n');
        }
    }

    fn trim_spaces(&mut self) {
        self.text.truncate(self.text.trim_end_matches(' ').len());
    }

    fn push_text(&mut self, raw: &str) {
        let normalized = normalize_whitespace(raw);
        let piece = if self.text.is_empty() || self.text.ends_with([' ', '\n']) {
            normalized.trim_start_matches(' ')
        } else {
            normalized.as_str()
        };
        self.text.push_str(piece);
    }

    fn push_span(&mut self, range: Range<usize>, style: Style) {
        if range.start < range.end {
            self.spans.push(StyleSpan { range, style });
        }
    }

    fn finish(mut self) -> StyledText {
        self.trim_spaces();
        while self.text.ends_with("\n\n") {
            self.text.pop();
        }
        let len = self.text.len();
        let mut spans: Vec<StyleSpan> = self
            .spans
            .into_iter()
            .filter_map(|mut s| {
                s.range.end = s.range.end.min(len);
                (s.range.start < s.range.end).then_some(s)
            })
            .collect();
        spans.sort_by_key(|s| s.range.start);
        StyledText {
            text: self.text,
            spans,
        }
    }
}

impl Visitor for Builder {
    fn head(&mut self, doc: &Document, id: NodeId, _depth: usize) {
        let name = match doc.kind(id) {
            NodeKind::Text { text } => {
                self.push_text(text);
                return;
            }
            NodeKind::Element { name, .. } => name.as_str(),
            _ => return,
        };
        if is_block_tag(name) {
            self.paragraph_break();
        }
        match name {
            "br" => {
                self.trim_spaces();
                self.text.push('\n');
            }
            "img" => {
                let start = self.text.len();
                self.text.push(OBJECT_CHAR);
                let src = doc.attr_or_empty(id, "src").to_string();
                self.push_span(start..self.text.len(), Style::Image(src));
            }
            _ => {
                if let Some(style) = Style::for_element(doc, id, name) {
                    self.open.push((id, style, self.text.len()));
                }
            }
        }
    }

    fn tail(&mut self, doc: &Document, id: NodeId, _depth: usize) {
        let Some(name) = doc.element_name(id) else {
            return;
        };
        if self.open.last().is_some_and(|(open, _, _)| *open == id) {
            if let Some((_, style, start)) = self.open.pop() {
                self.push_span(start..self.text.len(), style);
            }
        }
        if is_block_tag(name) {
            self.paragraph_break();
        }
    }

    fn descend(&mut self, doc: &Document, id: NodeId) -> bool {
        !is_non_rendering_element(doc, id)
    }
}
