use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Node kind codes, matching the DOM `nodeType` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum NodeType {
    Element,
    Text,
    Document,
    Doctype,
    Fragment,
}

impl From<NodeType> for u8 {
    fn from(t: NodeType) -> u8 {
        match t {
            NodeType::Element => 1,
            NodeType::Text => 3,
            NodeType::Document => 9,
            NodeType::Doctype => 10,
            NodeType::Fragment => 11,
        }
    }
}

impl TryFrom<u8> for NodeType {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(NodeType::Element),
            3 => Ok(NodeType::Text),
            9 => Ok(NodeType::Document),
            10 => Ok(NodeType::Doctype),
            11 => Ok(NodeType::Fragment),
            other => Err(format!("unsupported node type {}", other)),
        }
    }
}

/// JSON-safe snapshot of one node and its subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualNode {
    pub id: u32,
    pub t: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c: Option<Vec<VirtualNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        rename = "publicId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub public_id: Option<String>,
    #[serde(
        rename = "systemId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub system_id: Option<String>,
}

impl VirtualNode {
    pub fn new(id: u32, t: NodeType) -> Self {
        Self {
            id,
            t,
            tag: None,
            a: None,
            c: None,
            v: None,
            name: None,
            public_id: None,
            system_id: None,
        }
    }

    pub fn children(&self) -> &[VirtualNode] {
        self.c.as_deref().unwrap_or(&[])
    }

    /// Nodes in this subtree, including self.
    pub fn count(&self) -> usize {
        1 + self.children().iter().map(VirtualNode::count).sum::<usize>()
    }

    /// Copy with every id zeroed, for comparing trees whose numbering differs.
    pub fn without_ids(&self) -> VirtualNode {
        let mut out = self.clone();
        out.id = 0;
        out.c = self
            .c
            .as_ref()
            .map(|c| c.iter().map(VirtualNode::without_ids).collect());
        out
    }
}
