use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

use ammonia::{Builder, UrlRelative};
use html::{Document, body_html, parse_document};

/// Tags kept by the whitelist: a relaxed baseline plus `hr` and `abbr`,
/// without `col`, `colgroup`, `thead` and `tbody`.
const TAGS: &[&str] = &[
    "a", "abbr", "b", "blockquote", "br", "caption", "cite", "code", "dd", "div", "dl", "dt", "em",
    "h1", "h2", "h3", "h4", "h5", "h6", "hr", "i", "img", "li", "ol", "p", "pre", "q", "small",
    "span", "strike", "strong", "sub", "sup", "table", "td", "tfoot", "th", "tr", "u", "ul",
];

/// Dropped together with their content.
const CONTENT_TAGS: &[&str] = &["script", "style"];

// Sizing attributes of table, td and th are intentionally absent.
const TAG_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("a", &["href", "title"]),
    ("blockquote", &["cite"]),
    ("img", &["align", "alt", "height", "src", "title", "width"]),
    ("ol", &["start", "type"]),
    ("q", &["cite"]),
    ("table", &["summary"]),
    ("td", &["abbr", "axis"]),
    ("th", &["abbr", "axis", "scope"]),
    ("ul", &["type"]),
];

const URL_SCHEMES: &[(&str, &str, &[&str])] = &[
    ("a", "href", &["ftp", "http", "https", "mailto"]),
    ("blockquote", "cite", &["http", "https"]),
    ("img", "src", &["http", "https", "cid", "data"]),
    ("q", "cite", &["http", "https"]),
];

/// Wrappers the HTML5 tree builder inserts on its own that the whitelist
/// does not allow.
const SYNTHESIZED_WRAPPERS: &[&str] = &["tbody", "thead", "colgroup", "col"];

/// Whitelist cleaner for untrusted mail markup.
pub struct Policy {
    cleaner: Builder<'static>,
}

impl Default for Policy {
    fn default() -> Self {
        Self::relaxed()
    }
}

impl Policy {
    pub fn relaxed() -> Self {
        let mut cleaner = Builder::default();
        cleaner
            .tags(TAGS.iter().copied().collect())
            .clean_content_tags(CONTENT_TAGS.iter().copied().collect())
            .tag_attributes(
                TAG_ATTRIBUTES
                    .iter()
                    .map(|(tag, attrs)| (*tag, attrs.iter().copied().collect::<HashSet<_>>()))
                    .collect::<HashMap<_, _>>(),
            )
            .generic_attributes(HashSet::new())
            .url_schemes(
                URL_SCHEMES
                    .iter()
                    .flat_map(|(_, _, schemes)| schemes.iter().copied())
                    .collect(),
            )
            .url_relative(UrlRelative::Deny)
            .link_rel(None)
            .strip_comments(true)
            .attribute_filter(|element, attribute, value| {
                if url_allowed(element, attribute, value) {
                    Some(Cow::Borrowed(value))
                } else {
                    log::trace!(target: "sanitize", "dropping {element}[{attribute}]");
                    None
                }
            });
        Self { cleaner }
    }

    pub fn allows_tag(&self, name: &str) -> bool {
        TAGS.iter().any(|t| t.eq_ignore_ascii_case(name))
    }

    /// Parses `html` as a document, cleans the inner markup of its body and
    /// parses the result into a tree. Nothing from `head` survives.
    pub fn apply(&self, html: &str) -> Document {
        let body = body_html(&parse_document(html));
        let cleaned = self.cleaner.clean(&body).to_string();
        let mut doc = parse_document(&cleaned);
        for wrapper in doc.elements_by_tags(SYNTHESIZED_WRAPPERS) {
            doc.unwrap(wrapper);
        }
        doc
    }
}

/// Per-(tag, attribute) scheme check on top of the global scheme list, so
/// `data:` stays limited to image sources.
pub fn url_allowed(element: &str, attribute: &str, value: &str) -> bool {
    let Some((_, _, schemes)) = URL_SCHEMES
        .iter()
        .find(|(e, a, _)| e.eq_ignore_ascii_case(element) && a.eq_ignore_ascii_case(attribute))
    else {
        return true;
    };
    match url::Url::parse(value.trim()) {
        Ok(url) => schemes.iter().any(|s| *s == url.scheme()),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(input: &str) -> String {
        body_html(&Policy::relaxed().apply(input))
    }

    #[test]
    fn scheme_rules_are_per_attribute() {
        assert!(url_allowed("img", "src", "cid:part1@example"));
        assert!(url_allowed("img", "src", "data:image/png;base64,AAAA"));
        assert!(!url_allowed("a", "href", "data:text/html;base64,AAAA"));
        assert!(!url_allowed("a", "href", "javascript:alert(1)"));
        assert!(url_allowed("a", "href", "mailto:someone@example.com"));
        assert!(!url_allowed("img", "src", "relative/path.png"));
        assert!(url_allowed("p", "title", "anything"));
    }

    #[test]
    fn drops_script_subtree_and_unwraps_unknown_tags() {
        let out = clean("<font color=red>kept</font><script>gone()</script>");
        assert_eq!(out, "kept");
    }

    #[test]
    fn strips_table_sizing_and_wrappers() {
        let out = clean(
            r#"<table width="600"><tbody><tr><td width="10" colspan="2" abbr="x">a</td></tr></tbody></table>"#,
        );
        assert_eq!(out, r#"<table><tr><td abbr="x">a</td></tr></table>"#);
    }

    #[test]
    fn keeps_hr_and_abbr() {
        let out = clean(r#"<abbr title="t">HTML</abbr><hr>"#);
        assert_eq!(out, "<abbr>HTML</abbr><hr>");
    }

    #[test]
    fn embedded_image_schemes_survive() {
        let out = clean(r#"<img src="cid:logo@example"><img src="data:image/png;base64,AAAA">"#);
        assert!(out.contains(r#"src="cid:logo@example""#), "{out}");
        assert!(out.contains(r#"src="data:image/png;base64,AAAA""#), "{out}");
    }

    #[test]
    fn head_is_dropped() {
        let out = clean("<html><head><title>Subject</title><meta charset=utf-8></head><body><p>b</p></body></html>");
        assert_eq!(out, "<p>b</p>");
    }

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(clean(""), "");
    }
}
