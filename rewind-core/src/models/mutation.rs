use serde::{Deserialize, Serialize};

use super::vnode::VirtualNode;

/// One entry of a mutation batch. Targets are always node ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MutationEntry {
    #[serde(rename = "childList", rename_all = "camelCase")]
    ChildList {
        target_id: u32,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        adds: Vec<AddedNode>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        removes: Vec<RemovedNode>,
    },
    #[serde(rename = "attributes", rename_all = "camelCase")]
    Attributes {
        target_id: u32,
        attr: String,
        /// `None` means the attribute was removed.
        #[serde(default)]
        val: Option<String>,
    },
    #[serde(rename = "characterData", rename_all = "camelCase")]
    CharacterData {
        target_id: u32,
        #[serde(default)]
        text: String,
    },
}

impl MutationEntry {
    pub fn target_id(&self) -> u32 {
        match self {
            MutationEntry::ChildList { target_id, .. }
            | MutationEntry::Attributes { target_id, .. }
            | MutationEntry::CharacterData { target_id, .. } => *target_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddedNode {
    pub node: VirtualNode,
    #[serde(default)]
    pub prev: Option<u32>,
    #[serde(default)]
    pub next: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedNode {
    pub id: u32,
}
