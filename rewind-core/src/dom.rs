//! Arena-backed document model.
//!
//! Both halves of the system work against this tree: the recorder reads a
//! live [`Document`] supplied by its host, and the player rebuilds one from
//! snapshots. Nodes are addressed by [`NodeKey`] handles that stay valid for
//! the lifetime of the document, including after a node is detached.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(usize);

impl NodeKey {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Document,
    Doctype {
        name: String,
        public_id: String,
        system_id: String,
    },
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
    Fragment,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    #[error("unknown node {0:?}")]
    UnknownNode(NodeKey),

    #[error("node {0:?} cannot have children")]
    NotAContainer(NodeKey),

    #[error("inserting {child:?} under {parent:?} would create a cycle")]
    HierarchyRequest { parent: NodeKey, child: NodeKey },

    #[error("{reference:?} is not a child of {parent:?}")]
    NotAChild { parent: NodeKey, reference: NodeKey },
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeKey,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
            root: NodeKey(0),
        }
    }

    pub fn root(&self) -> NodeKey {
        self.root
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        key.0 < self.nodes.len()
    }

    /// Number of nodes ever created, attached or not.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeKey {
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        NodeKey(self.nodes.len() - 1)
    }

    pub fn create_element(&mut self, tag: &str) -> NodeKey {
        self.alloc(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeKey {
        self.alloc(NodeKind::Text(text.to_string()))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeKey {
        self.alloc(NodeKind::Comment(text.to_string()))
    }

    pub fn create_doctype(&mut self, name: &str, public_id: &str, system_id: &str) -> NodeKey {
        self.alloc(NodeKind::Doctype {
            name: name.to_string(),
            public_id: public_id.to_string(),
            system_id: system_id.to_string(),
        })
    }

    pub fn create_fragment(&mut self) -> NodeKey {
        self.alloc(NodeKind::Fragment)
    }

    fn node(&self, key: NodeKey) -> Result<&Node, DomError> {
        self.nodes.get(key.0).ok_or(DomError::UnknownNode(key))
    }

    fn node_mut(&mut self, key: NodeKey) -> Result<&mut Node, DomError> {
        self.nodes.get_mut(key.0).ok_or(DomError::UnknownNode(key))
    }

    pub fn kind(&self, key: NodeKey) -> Option<&NodeKind> {
        self.nodes.get(key.0).map(|n| &n.kind)
    }

    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.nodes.get(key.0).and_then(|n| n.parent)
    }

    pub fn children(&self, key: NodeKey) -> &[NodeKey] {
        self.nodes
            .get(key.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_element(&self, key: NodeKey) -> bool {
        matches!(self.kind(key), Some(NodeKind::Element { .. }))
    }

    pub fn tag(&self, key: NodeKey) -> Option<&str> {
        match self.kind(key) {
            Some(NodeKind::Element { tag, .. }) => Some(tag.as_str()),
            _ => None,
        }
    }

    pub fn attributes(&self, key: NodeKey) -> &[(String, String)] {
        match self.kind(key) {
            Some(NodeKind::Element { attrs, .. }) => attrs.as_slice(),
            _ => &[],
        }
    }

    pub fn attribute(&self, key: NodeKey, name: &str) -> Option<&str> {
        self.attributes(key)
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attribute(&mut self, key: NodeKey, name: &str, value: &str) -> Result<(), DomError> {
        match &mut self.node_mut(key)?.kind {
            NodeKind::Element { attrs, .. } => {
                if let Some(slot) = attrs.iter_mut().find(|(k, _)| k == name) {
                    slot.1 = value.to_string();
                } else {
                    attrs.push((name.to_string(), value.to_string()));
                }
                Ok(())
            }
            _ => Err(DomError::NotAContainer(key)),
        }
    }

    pub fn remove_attribute(&mut self, key: NodeKey, name: &str) -> Result<(), DomError> {
        match &mut self.node_mut(key)?.kind {
            NodeKind::Element { attrs, .. } => {
                attrs.retain(|(k, _)| k != name);
                Ok(())
            }
            _ => Err(DomError::NotAContainer(key)),
        }
    }

    /// Character data of a text or comment node.
    pub fn text(&self, key: NodeKey) -> Option<&str> {
        match self.kind(key) {
            Some(NodeKind::Text(t)) | Some(NodeKind::Comment(t)) => Some(t.as_str()),
            _ => None,
        }
    }

    /// `textContent` assignment: rewrites character data, or replaces the
    /// children of a container with a single text node.
    pub fn set_text(&mut self, key: NodeKey, text: &str) -> Result<(), DomError> {
        match &mut self.node_mut(key)?.kind {
            NodeKind::Text(t) | NodeKind::Comment(t) => {
                *t = text.to_string();
                return Ok(());
            }
            NodeKind::Doctype { .. } => return Ok(()),
            _ => {}
        }
        self.clear_children(key)?;
        if !text.is_empty() {
            let t = self.create_text(text);
            self.append_child(key, t)?;
        }
        Ok(())
    }

    /// Concatenated descendant text, like `Node.textContent`.
    pub fn text_content(&self, key: NodeKey) -> String {
        let mut out = String::new();
        self.collect_text(key, &mut out);
        out
    }

    fn collect_text(&self, key: NodeKey, out: &mut String) {
        match self.kind(key) {
            Some(NodeKind::Text(t)) => out.push_str(t),
            Some(NodeKind::Comment(_)) | Some(NodeKind::Doctype { .. }) | None => {}
            Some(_) => {
                for &child in self.children(key) {
                    self.collect_text(child, out);
                }
            }
        }
    }

    fn can_have_children(&self, key: NodeKey) -> bool {
        matches!(
            self.kind(key),
            Some(NodeKind::Document) | Some(NodeKind::Element { .. }) | Some(NodeKind::Fragment)
        )
    }

    /// True when `ancestor` is `node` or one of its ancestors.
    pub fn is_inclusive_ancestor(&self, ancestor: NodeKey, node: NodeKey) -> bool {
        let mut cur = Some(node);
        let mut hops = 0;
        while let Some(k) = cur {
            if k == ancestor {
                return true;
            }
            hops += 1;
            if hops > self.nodes.len() {
                return false;
            }
            cur = self.parent(k);
        }
        false
    }

    pub fn ancestors(&self, key: NodeKey) -> Ancestors<'_> {
        Ancestors {
            doc: self,
            next: self.parent(key),
            budget: self.nodes.len(),
        }
    }

    /// Whether the node is reachable from the document root.
    pub fn is_connected(&self, key: NodeKey) -> bool {
        self.is_inclusive_ancestor(self.root, key)
    }

    pub fn next_sibling(&self, key: NodeKey) -> Option<NodeKey> {
        let parent = self.parent(key)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|&c| c == key)?;
        siblings.get(pos + 1).copied()
    }

    pub fn previous_sibling(&self, key: NodeKey) -> Option<NodeKey> {
        let parent = self.parent(key)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|&c| c == key)?;
        pos.checked_sub(1).map(|p| siblings[p])
    }

    fn check_insert(&self, parent: NodeKey, child: NodeKey) -> Result<(), DomError> {
        self.node(parent)?;
        self.node(child)?;
        if !self.can_have_children(parent) {
            return Err(DomError::NotAContainer(parent));
        }
        if child == self.root || self.is_inclusive_ancestor(child, parent) {
            return Err(DomError::HierarchyRequest { parent, child });
        }
        Ok(())
    }

    /// Detach a node from its parent. Detached nodes keep their subtree.
    pub fn remove(&mut self, key: NodeKey) -> Result<(), DomError> {
        let parent = self.node(key)?.parent;
        if let Some(p) = parent {
            self.node_mut(p)?.children.retain(|&c| c != key);
            self.node_mut(key)?.parent = None;
        }
        Ok(())
    }

    pub fn clear_children(&mut self, key: NodeKey) -> Result<(), DomError> {
        let children = std::mem::take(&mut self.node_mut(key)?.children);
        for c in children {
            self.node_mut(c)?.parent = None;
        }
        Ok(())
    }

    /// Children to move for an insertion; fragments contribute their children.
    fn take_insertable(&mut self, child: NodeKey) -> Result<Vec<NodeKey>, DomError> {
        if matches!(self.node(child)?.kind, NodeKind::Fragment) {
            let moved = std::mem::take(&mut self.node_mut(child)?.children);
            for &m in &moved {
                self.node_mut(m)?.parent = None;
            }
            Ok(moved)
        } else {
            self.remove(child)?;
            Ok(vec![child])
        }
    }

    pub fn append_child(&mut self, parent: NodeKey, child: NodeKey) -> Result<(), DomError> {
        self.check_insert(parent, child)?;
        let moved = self.take_insertable(child)?;
        for m in moved {
            self.node_mut(m)?.parent = Some(parent);
            self.node_mut(parent)?.children.push(m);
        }
        Ok(())
    }

    pub fn insert_before(
        &mut self,
        parent: NodeKey,
        child: NodeKey,
        reference: NodeKey,
    ) -> Result<(), DomError> {
        if reference == child {
            return Ok(());
        }
        self.check_insert(parent, child)?;
        if self.parent(reference) != Some(parent) {
            return Err(DomError::NotAChild { parent, reference });
        }
        let moved = self.take_insertable(child)?;
        for m in moved {
            let pos = self
                .children(parent)
                .iter()
                .position(|&c| c == reference)
                .ok_or(DomError::NotAChild { parent, reference })?;
            self.node_mut(m)?.parent = Some(parent);
            self.node_mut(parent)?.children.insert(pos, m);
        }
        Ok(())
    }

    /// Outer HTML of a node, with text and attribute values escaped.
    pub fn to_html(&self, key: NodeKey) -> String {
        let mut out = String::new();
        self.write_html(key, &mut out, 0);
        out
    }

    fn write_html(&self, key: NodeKey, out: &mut String, depth: usize) {
        if depth > self.nodes.len() {
            return;
        }
        match self.kind(key) {
            None => {}
            Some(NodeKind::Document) | Some(NodeKind::Fragment) => {
                for &c in self.children(key) {
                    self.write_html(c, out, depth + 1);
                }
            }
            Some(NodeKind::Doctype { name, .. }) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(name);
                out.push('>');
            }
            Some(NodeKind::Text(t)) => out.push_str(&escape(t, false)),
            Some(NodeKind::Comment(t)) => {
                out.push_str("<!--");
                out.push_str(t);
                out.push_str("-->");
            }
            Some(NodeKind::Element { tag, attrs }) => {
                out.push('<');
                out.push_str(tag);
                for (k, v) in attrs {
                    out.push(' ');
                    out.push_str(k);
                    out.push_str("=\"");
                    out.push_str(&escape(v, true));
                    out.push('"');
                }
                out.push('>');
                if is_void(tag) {
                    return;
                }
                for &c in self.children(key) {
                    self.write_html(c, out, depth + 1);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<NodeKey>,
    budget: usize,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeKey;

    fn next(&mut self) -> Option<NodeKey> {
        if self.budget == 0 {
            return None;
        }
        self.budget -= 1;
        let cur = self.next?;
        self.next = self.doc.parent(cur);
        Some(cur)
    }
}

fn is_void(tag: &str) -> bool {
    matches!(
        tag,
        "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta"
            | "source" | "track" | "wbr"
    )
}

fn escape(s: &str, attr: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attr => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
