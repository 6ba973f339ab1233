use html5ever::tendril::TendrilSink;
use html5ever::{ParseOpts, parse_document as parse_rcdom};
use markup5ever_rcdom::{Handle, NodeData, RcDom};

use crate::{Document, NodeId};

/// Parses a complete HTML document (missing `html`/`head`/`body` are
/// synthesized by the HTML5 tree builder) into an arena [`Document`].
pub fn parse_document(html: &str) -> Document {
    let dom = parse_rcdom(RcDom::default(), ParseOpts::default()).one(html);
    let doc = from_rcdom(&dom.document);
    log::trace!(target: "html.parse", "parsed {} bytes into {} nodes", html.len(), doc.len());
    doc
}

/// Copies an rcdom tree into the arena. Iterative so hostile nesting depth
/// cannot exhaust the stack.
fn from_rcdom(document: &Handle) -> Document {
    let mut doc = Document::new();
    let mut stack: Vec<(Handle, NodeId)> = Vec::new();
    for child in document.children.borrow().iter().rev() {
        stack.push((child.clone(), NodeId::ROOT));
    }

    while let Some((handle, parent)) = stack.pop() {
        let id = match &handle.data {
            NodeData::Doctype { name, .. } => doc.create_doctype(name.to_string()),
            NodeData::Text { contents } => {
                let text = contents.borrow();
                if text.is_empty() {
                    continue;
                }
                doc.create_text(text.to_string())
            }
            NodeData::Comment { contents } => doc.create_comment(contents.to_string()),
            NodeData::Element { name, attrs, .. } => {
                let id = doc.create_element(name.local.as_ref());
                for attr in attrs.borrow().iter() {
                    let key: &str = attr.name.local.as_ref();
                    if doc.attr(id, key).is_none() {
                        doc.set_attr(id, key, attr.value.to_string());
                    }
                }
                id
            }
            NodeData::Document | NodeData::ProcessingInstruction { .. } => continue,
        };
        doc.append_child(parent, id);

        if doc.node(id).can_have_children() {
            for child in handle.children.borrow().iter().rev() {
                stack.push((child.clone(), id));
            }
        }
    }

    doc
}
