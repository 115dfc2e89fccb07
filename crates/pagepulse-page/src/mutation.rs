use pagepulse_types::layout::NodeHandle;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationKind {
    ChildList,
    Attributes,
    CharacterData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub target: NodeHandle,
    pub added: Vec<NodeHandle>,
    pub removed: Vec<NodeHandle>,
    pub attribute_name: Option<String>,
}

impl MutationRecord {
    pub fn child_list(target: NodeHandle, added: Vec<NodeHandle>, removed: Vec<NodeHandle>) -> Self {
        Self {
            kind: MutationKind::ChildList,
            target,
            added,
            removed,
            attribute_name: None,
        }
    }

    pub fn attribute(target: NodeHandle, name: impl Into<String>) -> Self {
        Self {
            kind: MutationKind::Attributes,
            target,
            added: Vec::new(),
            removed: Vec::new(),
            attribute_name: Some(name.into()),
        }
    }

    pub fn character_data(target: NodeHandle) -> Self {
        Self {
            kind: MutationKind::CharacterData,
            target,
            added: Vec::new(),
            removed: Vec::new(),
            attribute_name: None,
        }
    }
}

/// Which mutations a subscriber wants; `target: None` observes the whole document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationObserverInit {
    pub target: Option<NodeHandle>,
    pub child_list: bool,
    pub subtree: bool,
    pub attributes: bool,
    pub character_data: bool,
}

impl MutationObserverInit {
    /// Tree, attribute and text changes anywhere in the document.
    pub fn document_wide() -> Self {
        Self {
            target: None,
            child_list: true,
            subtree: true,
            attributes: true,
            character_data: true,
        }
    }

    /// Structural changes under `root`.
    pub fn child_list_under(root: NodeHandle) -> Self {
        Self {
            target: Some(root),
            child_list: true,
            subtree: true,
            attributes: false,
            character_data: false,
        }
    }

    pub fn accepts_kind(&self, kind: MutationKind) -> bool {
        match kind {
            MutationKind::ChildList => self.child_list,
            MutationKind::Attributes => self.attributes,
            MutationKind::CharacterData => self.character_data,
        }
    }
}
