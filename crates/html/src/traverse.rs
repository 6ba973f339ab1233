use crate::{Document, NodeId};

/// Depth-first callbacks: `head` when a node is entered, `tail` when it is
/// left (after all of its descendants).
pub trait Visitor {
    fn head(&mut self, doc: &Document, id: NodeId, depth: usize);
    fn tail(&mut self, doc: &Document, id: NodeId, depth: usize);

    /// Returning false skips the children of `id`; `tail` still runs.
    fn descend(&mut self, _doc: &Document, _id: NodeId) -> bool {
        true
    }
}

/// Walks the subtree rooted at `start` (inclusive) in document order without
/// recursion.
pub fn traverse<V: Visitor + ?Sized>(doc: &Document, start: NodeId, visitor: &mut V) {
    // (node, depth, entered)
    let mut stack: Vec<(NodeId, usize, bool)> = vec![(start, 0, false)];
    while let Some((id, depth, entered)) = stack.pop() {
        if entered {
            visitor.tail(doc, id, depth);
            continue;
        }
        visitor.head(doc, id, depth);
        stack.push((id, depth, true));
        if visitor.descend(doc, id) {
            for child in doc.children(id).iter().rev() {
                stack.push((*child, depth + 1, false));
            }
        }
    }
}

pub fn is_non_rendering_element(doc: &Document, id: NodeId) -> bool {
    doc.element_name(id)
        .is_some_and(crate::dom_utils::is_non_rendering_tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Vec<String>);

    impl Visitor for Recorder {
        fn head(&mut self, doc: &Document, id: NodeId, _depth: usize) {
            let label = doc
                .element_name(id)
                .or_else(|| doc.text(id))
                .unwrap_or("#");
            self.0.push(format!("+{label}"));
        }

        fn tail(&mut self, doc: &Document, id: NodeId, _depth: usize) {
            let label = doc
                .element_name(id)
                .or_else(|| doc.text(id))
                .unwrap_or("#");
            self.0.push(format!("-{label}"));
        }

        fn descend(&mut self, doc: &Document, id: NodeId) -> bool {
            !doc.is_element_named(id, "script")
        }
    }

    #[test]
    fn head_and_script_do_not_render() {
        let doc = crate::parse_document("<head><title>t</title></head><body><script></script><p>x</p></body>");
        let names: Vec<&str> = doc
            .all_elements()
            .into_iter()
            .filter(|id| is_non_rendering_element(&doc, *id))
            .filter_map(|id| doc.element_name(id))
            .collect();
        assert_eq!(names, vec!["head", "title", "script"]);
    }

    #[test]
    fn visits_head_and_tail_in_document_order() {
        let mut doc = Document::new();
        let div = doc.append_element(NodeId::ROOT, "div");
        let b = doc.append_element(div, "b");
        doc.append_text(b, "x");
        let script = doc.append_element(div, "script");
        doc.append_text(script, "evil()");

        let mut rec = Recorder(Vec::new());
        traverse(&doc, div, &mut rec);
        assert_eq!(
            rec.0,
            vec!["+div", "+b", "+x", "-x", "-b", "+script", "-script", "-div"]
        );
    }
}
