//! The replayed document.
//!
//! A [`Replica`] owns a private [`Document`] and the id table that maps
//! recorded node ids onto it. Snapshots rebuild both from scratch; mutation
//! batches patch them in place. Anything that cannot be resolved is skipped.

use rewind_core::protocol::MutationData;
use rewind_core::{AddedNode, Document, IdentityMap, MutationEntry, NodeKey, NodeType, VirtualNode};

/// Tags never created in the replica.
const INERT_TAGS: [&str; 2] = ["script", "noscript"];

/// Counts from applying one mutation batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub skipped: usize,
}

impl ApplyReport {
    fn hit(&mut self, ok: bool) {
        if ok {
            self.applied += 1;
        } else {
            self.skipped += 1;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Replica {
    doc: Document,
    ids: IdentityMap,
    pub url: String,
    pub scroll: (f64, f64),
    pub pointer: Option<(f64, f64)>,
    pub user: Option<String>,
    pub hidden: bool,
}

impl Replica {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to an empty document.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn resolve(&self, id: u32) -> Option<NodeKey> {
        self.ids.resolve(id)
    }

    pub fn node_count(&self) -> usize {
        self.ids.len()
    }

    pub fn html(&self) -> String {
        self.doc.to_html(self.doc.root())
    }

    /// Discard the current document and rebuild it from a snapshot tree.
    pub fn load_snapshot(&mut self, root: &VirtualNode) {
        self.doc = Document::new();
        self.ids.clear();
        let doc_root = self.doc.root();
        if root.t == NodeType::Document {
            self.ids.bind(root.id, doc_root);
            for child in root.children() {
                if let Some(node) = self.build(child) {
                    self.attach(doc_root, node);
                }
            }
        } else if let Some(node) = self.build(root) {
            self.attach(doc_root, node);
        }
        tracing::debug!(nodes = self.ids.len(), "snapshot rebuilt");
    }

    fn attach(&mut self, parent: NodeKey, child: NodeKey) {
        if let Err(e) = self.doc.append_child(parent, child) {
            tracing::debug!(error = %e, "could not attach rebuilt node");
        }
    }

    /// Create a detached node (and subtree) for `v`, binding every id.
    fn build(&mut self, v: &VirtualNode) -> Option<NodeKey> {
        let node = match v.t {
            NodeType::Element => {
                let tag = v.tag.as_deref()?.to_ascii_lowercase();
                if INERT_TAGS.contains(&tag.as_str()) {
                    return None;
                }
                let el = self.doc.create_element(&tag);
                for (name, value) in v.a.iter().flatten() {
                    if keep_attribute(&tag, name) {
                        // element handles always accept attributes
                        let _ = self.doc.set_attribute(el, name, value);
                    }
                }
                el
            }
            NodeType::Text => self.doc.create_text(v.v.as_deref().unwrap_or_default()),
            NodeType::Doctype => self.doc.create_doctype(
                v.name.as_deref().unwrap_or("html"),
                v.public_id.as_deref().unwrap_or_default(),
                v.system_id.as_deref().unwrap_or_default(),
            ),
            NodeType::Document | NodeType::Fragment => self.doc.create_fragment(),
        };
        if let Some(old) = self.ids.resolve(v.id) {
            // the id moved; drop the stale copy and its ids
            let _ = self.doc.remove(old);
            self.forget_subtree(old);
        }
        self.ids.bind(v.id, node);
        for child in v.children() {
            if let Some(c) = self.build(child) {
                self.attach(node, c);
            }
        }
        Some(node)
    }

    /// Apply one mutation batch, entry by entry.
    pub fn apply_mutations(&mut self, data: &MutationData) -> ApplyReport {
        let mut report = ApplyReport::default();
        for entry in &data.mutations {
            match entry {
                MutationEntry::ChildList {
                    target_id,
                    adds,
                    removes,
                } => {
                    for r in removes {
                        let ok = self.remove(r.id);
                        report.hit(ok);
                    }
                    let Some(target) = self.ids.resolve(*target_id) else {
                        report.skipped += adds.len();
                        continue;
                    };
                    for add in adds {
                        let ok = self.insert(target, add);
                        report.hit(ok);
                    }
                }
                MutationEntry::Attributes {
                    target_id,
                    attr,
                    val,
                } => {
                    let ok = self.set_attribute(*target_id, attr, val.as_deref());
                    report.hit(ok);
                }
                MutationEntry::CharacterData { target_id, text } => {
                    let ok = self
                        .ids
                        .resolve(*target_id)
                        .is_some_and(|n| self.doc.set_text(n, text).is_ok());
                    report.hit(ok);
                }
            }
        }
        if report.skipped > 0 {
            tracing::debug!(
                applied = report.applied,
                skipped = report.skipped,
                "mutation entries skipped"
            );
        }
        report
    }

    fn remove(&mut self, id: u32) -> bool {
        let Some(node) = self.ids.resolve(id) else {
            return false;
        };
        if self.doc.remove(node).is_err() {
            return false;
        }
        self.forget_subtree(node);
        true
    }

    fn forget_subtree(&mut self, node: NodeKey) {
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            if let Some(id) = self.ids.peek(n) {
                self.ids.forget(id);
            }
            stack.extend_from_slice(self.doc.children(n));
        }
    }

    fn insert(&mut self, parent: NodeKey, add: &AddedNode) -> bool {
        let Some(node) = self.build(&add.node) else {
            return false;
        };
        let sibling = |id: Option<u32>| {
            id.and_then(|id| self.ids.resolve(id))
                .filter(|n| *n != node && self.doc.parent(*n) == Some(parent))
        };
        let reference = match sibling(add.next) {
            Some(next) => Some(next),
            None => sibling(add.prev).and_then(|prev| self.doc.next_sibling(prev)),
        };
        let result = match reference {
            Some(reference) => self.doc.insert_before(parent, node, reference),
            None => self.doc.append_child(parent, node),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, id = add.node.id, "could not insert added node");
                false
            }
        }
    }

    fn set_attribute(&mut self, id: u32, name: &str, value: Option<&str>) -> bool {
        let Some(node) = self.ids.resolve(id) else {
            return false;
        };
        let Some(tag) = self.doc.tag(node).map(str::to_string) else {
            return false;
        };
        if !keep_attribute(&tag, name) {
            return true;
        }
        match value {
            Some(v) => self.doc.set_attribute(node, name, v).is_ok(),
            None => self.doc.remove_attribute(node, name).is_ok(),
        }
    }
}

/// Attributes that would run code or fetch scripts are not replayed.
fn keep_attribute(tag: &str, name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    if name.starts_with("on") || name == "integrity" || name == "nonce" {
        return false;
    }
    !(name == "src" && matches!(tag, "script" | "iframe"))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use rewind_core::RemovedNode;

    fn el(id: u32, tag: &str, attrs: &[(&str, &str)], children: Vec<VirtualNode>) -> VirtualNode {
        let mut v = VirtualNode::new(id, NodeType::Element);
        v.tag = Some(tag.to_string());
        if !attrs.is_empty() {
            v.a = Some(
                attrs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            );
        }
        v.c = Some(children);
        v
    }

    fn text(id: u32, value: &str) -> VirtualNode {
        let mut v = VirtualNode::new(id, NodeType::Text);
        v.v = Some(value.to_string());
        v
    }

    fn snapshot() -> VirtualNode {
        let mut doc = VirtualNode::new(1, NodeType::Document);
        doc.c = Some(vec![el(
            2,
            "html",
            &[],
            vec![el(
                3,
                "body",
                &[("onload", "steal()")],
                vec![
                    el(4, "p", &[("class", "a")], vec![text(5, "one")]),
                    el(6, "script", &[("src", "x.js")], vec![]),
                    el(7, "p", &[], vec![text(8, "three")]),
                ],
            )],
        )]);
        doc
    }

    #[test]
    fn test_snapshot_is_sanitized() {
        let mut r = Replica::new();
        r.load_snapshot(&snapshot());
        assert_eq!(
            r.html(),
            "<html><body><p class=\"a\">one</p><p>three</p></body></html>"
        );
        assert!(r.resolve(6).is_none());
        assert_eq!(r.resolve(1), Some(r.document().root()));
    }

    #[test]
    fn test_add_uses_next_then_prev_then_append() {
        let mut r = Replica::new();
        r.load_snapshot(&snapshot());
        let batch = MutationData::new(vec![MutationEntry::ChildList {
            target_id: 3,
            adds: vec![
                AddedNode {
                    node: el(10, "em", &[], vec![]),
                    prev: None,
                    next: Some(7),
                },
                AddedNode {
                    node: el(11, "b", &[], vec![]),
                    prev: Some(4),
                    next: Some(999),
                },
                AddedNode {
                    node: el(12, "i", &[], vec![]),
                    prev: None,
                    next: None,
                },
            ],
            removes: vec![],
        }]);
        let report = r.apply_mutations(&batch);
        assert_eq!(report.applied, 3);
        assert_eq!(
            r.html(),
            "<html><body><p class=\"a\">one</p><b></b><em></em><p>three</p><i></i></body></html>"
        );
    }

    #[test]
    fn test_rebound_id_forgets_stale_descendants() {
        let mut r = Replica::new();
        r.load_snapshot(&snapshot());
        let batch = MutationData::new(vec![MutationEntry::ChildList {
            target_id: 3,
            adds: vec![AddedNode {
                node: el(4, "section", &[], vec![]),
                prev: None,
                next: None,
            }],
            removes: vec![],
        }]);
        assert_eq!(r.apply_mutations(&batch).applied, 1);
        assert!(r.resolve(5).is_none());
        assert_eq!(r.document().tag(r.resolve(4).unwrap()), Some("section"));
        assert_eq!(
            r.html(),
            "<html><body><p>three</p><section></section></body></html>"
        );
    }

    #[test]
    fn test_unknown_targets_are_skipped() {
        let mut r = Replica::new();
        r.load_snapshot(&snapshot());
        let before = r.html();
        let batch = MutationData::new(vec![
            MutationEntry::Attributes {
                target_id: 404,
                attr: "class".into(),
                val: Some("x".into()),
            },
            MutationEntry::CharacterData {
                target_id: 405,
                text: "nope".into(),
            },
            MutationEntry::ChildList {
                target_id: 406,
                adds: vec![AddedNode {
                    node: el(20, "div", &[], vec![]),
                    prev: None,
                    next: None,
                }],
                removes: vec![RemovedNode { id: 407 }],
            },
        ]);
        let report = r.apply_mutations(&batch);
        assert_eq!(report, ApplyReport { applied: 0, skipped: 4 });
        assert_eq!(r.html(), before);
    }

    #[test]
    fn test_remove_forgets_subtree_and_edits_apply() {
        let mut r = Replica::new();
        r.load_snapshot(&snapshot());
        let batch = MutationData::new(vec![
            MutationEntry::ChildList {
                target_id: 3,
                adds: vec![],
                removes: vec![RemovedNode { id: 4 }],
            },
            MutationEntry::CharacterData {
                target_id: 5,
                text: "gone".into(),
            },
            MutationEntry::CharacterData {
                target_id: 8,
                text: "3".into(),
            },
            MutationEntry::Attributes {
                target_id: 7,
                attr: "onclick".into(),
                val: Some("x()".into()),
            },
            MutationEntry::Attributes {
                target_id: 7,
                attr: "title".into(),
                val: Some("t".into()),
            },
        ]);
        let report = r.apply_mutations(&batch);
        assert_eq!(report.skipped, 1);
        assert!(r.resolve(4).is_none());
        assert!(r.resolve(5).is_none());
        assert_eq!(r.html(), "<html><body><p title=\"t\">3</p></body></html>");
    }
}
