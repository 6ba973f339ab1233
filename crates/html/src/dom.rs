use std::collections::HashMap;

use crate::types::{Node, NodeId, NodeKind};

/// Mutable, arena-owned document tree.
///
/// Every node lives in `nodes`; structure is expressed through child index
/// lists plus a non-owning parent index. Detached nodes keep their slot but
/// are no longer reachable from [`NodeId::ROOT`].
#[derive(Clone, Debug)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeKind::Document)],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    pub fn element_name(&self, id: NodeId) -> Option<&str> {
        self.node(id).element_name()
    }

    pub fn is_element_named(&self, id: NodeId, target: &str) -> bool {
        self.node(id).is_element_named(target)
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.node(id).text()
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(kind));
        id
    }

    /// Creates a detached element. Names are stored lowercase.
    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.push(NodeKind::Element {
            name: name.to_ascii_lowercase(),
            attributes: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Text { text: text.into() })
    }

    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Comment { text: text.into() })
    }

    pub fn create_doctype(&mut self, name: impl Into<String>) -> NodeId {
        self.push(NodeKind::Doctype { name: name.into() })
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let at = self.nodes[parent.index()].children.len();
        self.insert_child(parent, at, child);
    }

    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_child(parent, 0, child);
    }

    /// Inserts `child` at position `at` of `parent`'s child list, detaching
    /// it from any previous parent first.
    pub fn insert_child(&mut self, parent: NodeId, at: usize, child: NodeId) {
        debug_assert!(parent != child, "node cannot be its own child");
        debug_assert!(
            self.nodes[parent.index()].can_have_children(),
            "parent cannot have children"
        );
        self.detach(child);
        let children = &mut self.nodes[parent.index()].children;
        let at = at.min(children.len());
        children.insert(at, child);
        self.nodes[child.index()].parent = Some(parent);
    }

    /// Unlinks `id` (and its subtree) from its parent. No-op for detached
    /// nodes and for the root.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.nodes[id.index()].parent.take() else {
            return;
        };
        self.nodes[parent.index()].children.retain(|c| *c != id);
    }

    /// Puts `replacement` where `old` was and detaches `old`.
    pub fn replace(&mut self, old: NodeId, replacement: NodeId) {
        if old == replacement {
            return;
        }
        self.detach(replacement);
        let (Some(parent), Some(at)) = (self.parent(old), self.position_in_parent(old)) else {
            return;
        };
        self.nodes[parent.index()].children[at] = replacement;
        self.nodes[replacement.index()].parent = Some(parent);
        self.nodes[old.index()].parent = None;
    }

    /// Replaces `id` by its children, in order.
    pub fn unwrap(&mut self, id: NodeId) {
        let (Some(parent), Some(at)) = (self.parent(id), self.position_in_parent(id)) else {
            return;
        };
        let children = std::mem::take(&mut self.nodes[id.index()].children);
        for child in &children {
            self.nodes[child.index()].parent = Some(parent);
        }
        self.nodes[parent.index()].children.splice(at..=at, children);
        self.nodes[id.index()].parent = None;
    }

    /// Replaces every key of `replacements` by its node list, rebuilding each
    /// affected parent's child list once. Replacement nodes must be detached;
    /// detached keys are ignored.
    pub fn replace_many(&mut self, replacements: &HashMap<NodeId, Vec<NodeId>>) {
        let mut parents: Vec<NodeId> = replacements
            .keys()
            .filter_map(|id| self.parent(*id))
            .collect();
        parents.sort_unstable();
        parents.dedup();
        for parent in parents {
            let old = std::mem::take(&mut self.nodes[parent.index()].children);
            let mut rebuilt = Vec::with_capacity(old.len());
            for child in old {
                let Some(nodes) = replacements.get(&child) else {
                    rebuilt.push(child);
                    continue;
                };
                self.nodes[child.index()].parent = None;
                for &node in nodes {
                    debug_assert!(self.parent(node).is_none(), "replacement is attached");
                    self.nodes[node.index()].parent = Some(parent);
                    rebuilt.push(node);
                }
            }
            self.nodes[parent.index()].children = rebuilt;
        }
    }

    /// Detaches every node in `ids`, touching each parent's child list once.
    pub fn detach_all(&mut self, ids: &[NodeId]) {
        let gone: HashMap<NodeId, Vec<NodeId>> = ids.iter().map(|id| (*id, Vec::new())).collect();
        self.replace_many(&gone);
    }

    pub fn clear_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.nodes[id.index()].children);
        for child in children {
            self.nodes[child.index()].parent = None;
        }
    }

    /// Moves every child of `from` to the end of `to`'s child list.
    pub fn move_children(&mut self, from: NodeId, to: NodeId) {
        let children = std::mem::take(&mut self.nodes[from.index()].children);
        for child in children {
            self.nodes[child.index()].parent = None;
            self.append_child(to, child);
        }
    }

    /// Replaces the children of `id` with a single text node.
    pub fn set_text_content(&mut self, id: NodeId, text: impl Into<String>) {
        self.clear_children(id);
        let text = self.create_text(text);
        self.append_child(id, text);
    }

    pub fn append_text(&mut self, parent: NodeId, text: impl Into<String>) -> NodeId {
        let node = self.create_text(text);
        self.append_child(parent, node);
        node
    }

    pub fn prepend_text(&mut self, parent: NodeId, text: impl Into<String>) -> NodeId {
        let node = self.create_text(text);
        self.prepend_child(parent, node);
        node
    }

    pub fn append_element(&mut self, parent: NodeId, name: &str) -> NodeId {
        let node = self.create_element(name);
        self.append_child(parent, node);
        node
    }

    pub fn rename(&mut self, id: NodeId, new_name: &str) {
        if let NodeKind::Element { name, .. } = &mut self.nodes[id.index()].kind {
            *name = new_name.to_ascii_lowercase();
        }
    }

    pub fn attributes(&self, id: NodeId) -> &[(String, String)] {
        match &self.nodes[id.index()].kind {
            NodeKind::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Attribute value or the empty string, like a DOM `getAttribute` that
    /// never returns null.
    pub fn attr_or_empty(&self, id: NodeId, name: &str) -> &str {
        self.attr(id, name).unwrap_or("")
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        let NodeKind::Element { attributes, .. } = &mut self.nodes[id.index()].kind else {
            return;
        };
        let value = value.into();
        match attributes
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => *v = value,
            None => attributes.push((name.to_ascii_lowercase(), value)),
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Option<String> {
        let NodeKind::Element { attributes, .. } = &mut self.nodes[id.index()].kind else {
            return None;
        };
        let pos = attributes
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))?;
        Some(attributes.remove(pos).1)
    }

    /// Keeps the attributes for which `keep` returns true, in their
    /// original order. Returns how many were removed.
    pub fn retain_attrs<F>(&mut self, id: NodeId, mut keep: F) -> usize
    where
        F: FnMut(&str, &str) -> bool,
    {
        let NodeKind::Element { attributes, .. } = &mut self.nodes[id.index()].kind else {
            return 0;
        };
        let before = attributes.len();
        attributes.retain(|(k, v)| keep(k, v));
        before - attributes.len()
    }

    pub fn clear_attrs(&mut self, id: NodeId) {
        if let NodeKind::Element { attributes, .. } = &mut self.nodes[id.index()].kind {
            attributes.clear();
        }
    }

    /// Deep copy of the subtree rooted at `id`. The copy is detached.
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let copy = self.push(self.nodes[id.index()].kind.clone());
        let mut stack: Vec<(NodeId, NodeId)> = vec![(id, copy)];
        while let Some((source, target)) = stack.pop() {
            let children = self.nodes[source.index()].children.clone();
            for child in children {
                let child_copy = self.push(self.nodes[child.index()].kind.clone());
                self.nodes[child_copy.index()].parent = Some(target);
                self.nodes[target.index()].children.push(child_copy);
                stack.push((child, child_copy));
            }
        }
        copy
    }

    pub fn position_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.nodes[parent.index()]
            .children
            .iter()
            .position(|c| *c == id)
    }

    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            doc: self,
            next: self.parent(id),
        }
    }

    /// True when `id` is reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        id == NodeId::ROOT || self.ancestors(id).any(|a| a == NodeId::ROOT)
    }

    /// Descendants of `id` in document order, `id` excluded.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Snapshot of all attached elements named `name`, in document order.
    pub fn elements_by_tag(&self, name: &str) -> Vec<NodeId> {
        self.descendants(NodeId::ROOT)
            .into_iter()
            .filter(|id| self.is_element_named(*id, name))
            .collect()
    }

    /// Snapshot of all attached elements whose name is in `names`.
    pub fn elements_by_tags(&self, names: &[&str]) -> Vec<NodeId> {
        self.descendants(NodeId::ROOT)
            .into_iter()
            .filter(|id| {
                self.element_name(*id)
                    .is_some_and(|n| names.iter().any(|t| n.eq_ignore_ascii_case(t)))
            })
            .collect()
    }

    pub fn all_elements(&self) -> Vec<NodeId> {
        self.descendants(NodeId::ROOT)
            .into_iter()
            .filter(|id| self.element_name(*id).is_some())
            .collect()
    }

    pub fn text_nodes(&self) -> Vec<NodeId> {
        self.descendants(NodeId::ROOT)
            .into_iter()
            .filter(|id| self.node(*id).is_text())
            .collect()
    }

    pub fn html_element(&self) -> Option<NodeId> {
        self.children(NodeId::ROOT)
            .iter()
            .copied()
            .find(|id| self.is_element_named(*id, "html"))
    }

    pub fn body(&self) -> Option<NodeId> {
        let html = self.html_element()?;
        self.children(html)
            .iter()
            .copied()
            .find(|id| self.is_element_named(*id, "body"))
    }

    /// Concatenated text of every descendant text node.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(text) = self.text(id) {
            out.push_str(text);
        }
        for d in self.descendants(id) {
            if let Some(text) = self.text(d) {
                out.push_str(text);
            }
        }
        out
    }
}

pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.doc.parent(current);
        Some(current)
    }
}
