//! Bidirectional node identity table (id <-> node handle).
//!
//! Scoped to one serializer or replica; discarded wholesale whenever a fresh
//! snapshot is taken or rebuilt.

use std::collections::HashMap;

use crate::dom::NodeKey;

#[derive(Debug, Clone)]
pub struct IdentityMap {
    next_id: u32,
    by_node: HashMap<NodeKey, u32>,
    by_id: HashMap<u32, NodeKey>,
}

impl Default for IdentityMap {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityMap {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            by_node: HashMap::new(),
            by_id: HashMap::new(),
        }
    }

    /// Id for `node`, assigned on first encounter and stable afterwards.
    pub fn id_of(&mut self, node: NodeKey) -> u32 {
        if let Some(&id) = self.by_node.get(&node) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.by_node.insert(node, id);
        self.by_id.insert(id, node);
        id
    }

    pub fn peek(&self, node: NodeKey) -> Option<u32> {
        self.by_node.get(&node).copied()
    }

    pub fn resolve(&self, id: u32) -> Option<NodeKey> {
        self.by_id.get(&id).copied()
    }

    /// Register a known id for a node (replay side). Rebinding an id drops
    /// the previous node's entry.
    pub fn bind(&mut self, id: u32, node: NodeKey) {
        if let Some(old) = self.by_id.insert(id, node) {
            if old != node {
                self.by_node.remove(&old);
            }
        }
        if let Some(old_id) = self.by_node.insert(node, id) {
            if old_id != id {
                self.by_id.remove(&old_id);
            }
        }
        if id >= self.next_id {
            self.next_id = id + 1;
        }
    }

    pub fn forget(&mut self, id: u32) -> Option<NodeKey> {
        let node = self.by_id.remove(&id)?;
        self.by_node.remove(&node);
        Some(node)
    }

    pub fn clear(&mut self) {
        self.next_id = 1;
        self.by_node.clear();
        self.by_id.clear();
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
