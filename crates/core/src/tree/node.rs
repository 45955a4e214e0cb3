use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::{Action, ExecutionContext};

pub type Style = Map<String, Json>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Container,
    ThemedContainer,
    Text,
    Actionable,
    /// Repeats its inline children once per record of a data collection.
    Collection,
}

/// Interaction a handler list responds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HandlerKind {
    Press,
    DragStart,
    DragChange,
    DragEnd,
    StateChange,
}

impl HandlerKind {
    /// Taps and state changes are discrete; drags stream at input rate.
    pub fn default_context(self) -> ExecutionContext {
        match self {
            Self::Press | Self::StateChange => ExecutionContext::FullCapability,
            Self::DragStart | Self::DragChange | Self::DragEnd => ExecutionContext::LowLatency,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Handlers {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub press: Vec<Action>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub drag_start: Vec<Action>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub drag_change: Vec<Action>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub drag_end: Vec<Action>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub state_change: Vec<Action>,
}

impl Handlers {
    pub fn get(&self, kind: HandlerKind) -> &[Action] {
        match kind {
            HandlerKind::Press => &self.press,
            HandlerKind::DragStart => &self.drag_start,
            HandlerKind::DragChange => &self.drag_change,
            HandlerKind::DragEnd => &self.drag_end,
            HandlerKind::StateChange => &self.state_change,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.press.is_empty()
            && self.drag_start.is_empty()
            && self.drag_change.is_empty()
            && self.drag_end.is_empty()
            && self.state_change.is_empty()
    }
}

/// Child slot: a lookup key into the graph, or an owned template subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Child {
    Ref(String),
    Inline(Box<Node>),
}

impl Child {
    pub fn as_ref_id(&self) -> Option<&str> {
        match self {
            Self::Ref(id) => Some(id),
            Self::Inline(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub style: Style,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Child>,
    #[serde(default, skip_serializing_if = "Handlers::is_empty")]
    pub handlers: Handlers,
    /// Data-store collection a `Collection` node repeats over.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Placeholder prefix for item bindings, `item` unless overridden.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            style: Style::new(),
            text: None,
            children: Vec::new(),
            handlers: Handlers::default(),
            collection: None,
            item_name: None,
            parent_id: None,
        }
    }

    pub fn child_refs(&self) -> impl Iterator<Item = &str> {
        self.children.iter().filter_map(Child::as_ref_id)
    }

    pub fn has_child_ref(&self, id: &str) -> bool {
        self.child_refs().any(|child| child == id)
    }

    /// Depth-first search through inline children.
    pub fn find_inline(&self, id: &str) -> Option<&Node> {
        self.children.iter().find_map(|child| match child {
            Child::Inline(node) if node.id == id => Some(&**node),
            Child::Inline(node) => node.find_inline(id),
            Child::Ref(_) => None,
        })
    }
}

/// `CreateNode` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub style: Style,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub on_press: Vec<Action>,
    #[serde(default)]
    pub on_drag_start: Vec<Action>,
    #[serde(default)]
    pub on_drag_change: Vec<Action>,
    #[serde(default)]
    pub on_drag_end: Vec<Action>,
    #[serde(default)]
    pub on_state_change: Vec<Action>,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub item_name: Option<String>,
    /// Inline template children.
    #[serde(default)]
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            style: Style::new(),
            text: None,
            on_press: Vec::new(),
            on_drag_start: Vec::new(),
            on_drag_change: Vec::new(),
            on_drag_end: Vec::new(),
            on_state_change: Vec::new(),
            collection: None,
            item_name: None,
            children: Vec::new(),
        }
    }

    pub fn into_node(self, parent_id: Option<String>) -> Node {
        let id = self.id;
        let children = self
            .children
            .into_iter()
            .map(|child| Child::Inline(Box::new(child.into_node(Some(id.clone())))))
            .collect();
        Node {
            kind: self.kind,
            style: self.style,
            text: self.text,
            children,
            handlers: Handlers {
                press: self.on_press,
                drag_start: self.on_drag_start,
                drag_change: self.on_drag_change,
                drag_end: self.on_drag_end,
                state_change: self.on_state_change,
            },
            collection: self.collection,
            item_name: self.item_name,
            parent_id,
            id,
        }
    }
}
