//! Arena-backed HTML document tree: parsing (via html5ever), mutation,
//! traversal and serialization.

pub mod dom_utils;
pub mod serialize;
pub mod traverse;

mod dom;
mod parse;
mod types;

pub use crate::dom::{Ancestors, Document};
pub use crate::parse::parse_document;
pub use crate::serialize::{inner_html, outer_html, to_html};
pub use crate::traverse::{Visitor, traverse};
pub use crate::types::{Node, NodeId, NodeKind};

/// Inner markup of `<body>`, or the empty string when there is no body.
pub fn body_html(doc: &Document) -> String {
    match doc.body() {
        Some(body) => inner_html(doc, body),
        None => String::new(),
    }
}
