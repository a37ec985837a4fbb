//! Virtual DOM serializer: live [`Document`] subtree to [`VirtualNode`].

use std::collections::{BTreeMap, HashSet};

use thiserror::Error;

use crate::dom::{Document, NodeKey, NodeKind};
use crate::identity::IdentityMap;
use crate::mask::{MaskPolicy, MASK};
use crate::models::vnode::{NodeType, VirtualNode};

/// Elements carrying this attribute, and everything below them, are never
/// serialized or reported.
pub const IGNORE_ATTR: &str = "data-rewind-ignore";

/// Deepest node level serialized below the walk root. Each level costs two
/// JSON nesting levels, so a tree this deep still parses under serde_json's
/// default limit of 128 once wrapped in a stored recording or mutation add.
pub const MAX_DEPTH: usize = 48;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SerializeError {
    #[error("node {0:?} does not exist")]
    UnknownNode(NodeKey),

    #[error("node {0:?} was reached twice in one walk")]
    Cycle(NodeKey),

    #[error("tree deeper than {0} levels")]
    DepthExceeded(usize),

    #[error("node {0:?} is skipped")]
    Skipped(NodeKey),
}

#[derive(Debug, Clone, Default)]
pub struct Serializer {
    ids: IdentityMap,
    mask: MaskPolicy,
}

impl Serializer {
    pub fn new(mask: MaskPolicy) -> Self {
        Self {
            ids: IdentityMap::new(),
            mask,
        }
    }

    /// Serialize `node` and its descendants, or `None` when the node is
    /// ignored, a comment, or cannot be walked. Never panics.
    pub fn serialize(&mut self, doc: &Document, node: NodeKey) -> Option<VirtualNode> {
        match self.try_serialize(doc, node) {
            Ok(v) => Some(v),
            Err(SerializeError::Skipped(_)) => None,
            Err(e) => {
                tracing::warn!(node = node.index(), error = %e, "subtree not serialized");
                None
            }
        }
    }

    pub fn try_serialize(
        &mut self,
        doc: &Document,
        node: NodeKey,
    ) -> Result<VirtualNode, SerializeError> {
        if !doc.contains(node) {
            return Err(SerializeError::UnknownNode(node));
        }
        if self.is_ignored(doc, node) {
            return Err(SerializeError::Skipped(node));
        }
        let mut seen = HashSet::new();
        self.walk(doc, node, 0, &mut seen)
    }

    fn walk(
        &mut self,
        doc: &Document,
        node: NodeKey,
        depth: usize,
        seen: &mut HashSet<NodeKey>,
    ) -> Result<VirtualNode, SerializeError> {
        if depth > MAX_DEPTH {
            return Err(SerializeError::DepthExceeded(MAX_DEPTH));
        }
        if !seen.insert(node) {
            return Err(SerializeError::Cycle(node));
        }
        let kind = doc.kind(node).ok_or(SerializeError::UnknownNode(node))?;

        let mut out = match kind {
            NodeKind::Comment(_) => return Err(SerializeError::Skipped(node)),
            NodeKind::Element { tag, attrs } => {
                if attrs.iter().any(|(k, _)| k == IGNORE_ATTR) {
                    return Err(SerializeError::Skipped(node));
                }
                let sensitive = self.mask.is_sensitive(doc, node);
                let mut v = VirtualNode::new(self.ids.id_of(node), NodeType::Element);
                v.tag = Some(tag.clone());
                let map: BTreeMap<String, String> = attrs
                    .iter()
                    .map(|(k, val)| {
                        let val = if sensitive && k == "value" && !val.is_empty() {
                            MASK.to_string()
                        } else {
                            val.clone()
                        };
                        (k.clone(), val)
                    })
                    .collect();
                if !map.is_empty() {
                    v.a = Some(map);
                }
                v
            }
            NodeKind::Text(text) => {
                let sensitive_parent = doc
                    .parent(node)
                    .map(|p| self.mask.is_sensitive(doc, p))
                    .unwrap_or(false);
                let mut v = VirtualNode::new(self.ids.id_of(node), NodeType::Text);
                v.v = Some(if sensitive_parent && !text.is_empty() {
                    MASK.to_string()
                } else {
                    text.clone()
                });
                return Ok(v);
            }
            NodeKind::Doctype {
                name,
                public_id,
                system_id,
            } => {
                let mut v = VirtualNode::new(self.ids.id_of(node), NodeType::Doctype);
                v.name = Some(if name.is_empty() { "html".into() } else { name.clone() });
                v.public_id = Some(public_id.clone());
                v.system_id = Some(system_id.clone());
                return Ok(v);
            }
            NodeKind::Document => VirtualNode::new(self.ids.id_of(node), NodeType::Document),
            NodeKind::Fragment => VirtualNode::new(self.ids.id_of(node), NodeType::Fragment),
        };

        let mut children = Vec::with_capacity(doc.children(node).len());
        for &child in doc.children(node) {
            match self.walk(doc, child, depth + 1, seen) {
                Ok(c) => children.push(c),
                Err(SerializeError::Skipped(_)) => {}
                Err(e) => {
                    tracing::debug!(node = child.index(), error = %e, "child subtree omitted");
                }
            }
        }
        out.c = Some(children);
        Ok(out)
    }

    /// True when the node or any ancestor element carries [`IGNORE_ATTR`].
    pub fn is_ignored(&self, doc: &Document, node: NodeKey) -> bool {
        std::iter::once(node)
            .chain(doc.ancestors(node))
            .any(|k| doc.attribute(k, IGNORE_ATTR).is_some())
    }

    pub fn is_sensitive(&self, doc: &Document, node: NodeKey) -> bool {
        self.mask.is_sensitive(doc, node)
    }

    pub fn id_of(&mut self, node: NodeKey) -> u32 {
        self.ids.id_of(node)
    }

    pub fn peek_id(&self, node: NodeKey) -> Option<u32> {
        self.ids.peek(node)
    }

    pub fn identity(&self) -> &IdentityMap {
        &self.ids
    }

    pub fn identity_mut(&mut self) -> &mut IdentityMap {
        &mut self.ids
    }

    /// Drop every assigned id. The next walk numbers nodes from 1 again.
    pub fn reset(&mut self) {
        self.ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> (Document, NodeKey) {
        let mut doc = Document::new();
        let dt = doc.create_doctype("html", "", "");
        doc.append_child(doc.root(), dt).unwrap();
        let html = doc.create_element("html");
        doc.append_child(doc.root(), html).unwrap();
        let body = doc.create_element("body");
        doc.append_child(html, body).unwrap();
        (doc, body)
    }

    #[test]
    fn test_ids_stable_across_walks() {
        let (mut doc, body) = page();
        let p = doc.create_element("p");
        doc.append_child(body, p).unwrap();
        let mut s = Serializer::new(MaskPolicy::none());

        let first = s.serialize(&doc, doc.root()).unwrap();
        let again = s.serialize(&doc, p).unwrap();
        assert_eq!(s.peek_id(p), Some(again.id));
        assert_eq!(first.count(), 5);
        assert_eq!(first.children()[0].t, NodeType::Doctype);
    }

    #[test]
    fn test_skips_comments_and_ignored_subtrees() {
        let (mut doc, body) = page();
        let c = doc.create_comment("note");
        let secret = doc.create_element("div");
        doc.set_attribute(secret, IGNORE_ATTR, "").unwrap();
        let inner = doc.create_element("span");
        doc.append_child(secret, inner).unwrap();
        doc.append_child(body, c).unwrap();
        doc.append_child(body, secret).unwrap();

        let mut s = Serializer::new(MaskPolicy::none());
        let v = s.serialize(&doc, body).unwrap();
        assert!(v.children().is_empty());
        assert!(s.serialize(&doc, inner).is_none());
        assert_eq!(s.peek_id(inner), None);
    }

    #[test]
    fn test_masks_values_and_text_of_sensitive_fields() {
        let (mut doc, body) = page();
        let input = doc.create_element("input");
        doc.set_attribute(input, "type", "password").unwrap();
        doc.set_attribute(input, "value", "hunter2").unwrap();
        let area = doc.create_element("textarea");
        let t = doc.create_text("private note that is long");
        doc.append_child(area, t).unwrap();
        doc.append_child(body, input).unwrap();
        doc.append_child(body, area).unwrap();

        let mut s = Serializer::new(MaskPolicy::new(true, &[]));
        let v = s.serialize(&doc, body).unwrap();
        let a = v.children()[0].a.as_ref().unwrap();
        assert_eq!(a["value"], MASK);
        assert_eq!(a["type"], "password");
        assert_eq!(v.children()[1].children()[0].v.as_deref(), Some(MASK));
    }

    #[test]
    fn test_unknown_node_degrades_to_none() {
        let (doc, _) = page();
        let mut other = Document::new();
        for _ in 0..50 {
            other.create_element("div");
        }
        let foreign = other.create_element("div");
        let mut s = Serializer::default();
        assert!(s.serialize(&doc, foreign).is_none());
        assert!(matches!(
            s.try_serialize(&doc, foreign),
            Err(SerializeError::UnknownNode(_))
        ));
    }

    #[test]
    fn test_over_deep_subtree_is_cut_at_max_depth() {
        let (mut doc, body) = page();
        let mut parent = body;
        for _ in 0..100 {
            let div = doc.create_element("div");
            doc.append_child(parent, div).unwrap();
            parent = div;
        }
        let mut s = Serializer::new(MaskPolicy::none());
        let v = s.serialize(&doc, doc.root()).unwrap();
        // document, doctype, html, body, then divs at levels 3..=MAX_DEPTH
        assert_eq!(v.count(), 4 + (MAX_DEPTH - 2));
        assert!(s.serialize(&doc, body).is_some());
    }

    #[test]
    fn test_detached_subtree_serializes() {
        let (mut doc, body) = page();
        let ul = doc.create_element("ul");
        let li = doc.create_element("li");
        doc.append_child(body, ul).unwrap();
        doc.append_child(ul, li).unwrap();
        doc.remove(ul).unwrap();
        let mut s = Serializer::new(MaskPolicy::none());
        assert_eq!(s.serialize(&doc, ul).unwrap().count(), 2);
    }
}
