use serde::{Deserialize, Serialize};

use super::{NodeSpec, Style};
use crate::{Result, Value, ValueType};

fn merge_by_default() -> bool {
    true
}

/// Structural command in the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Event {
    CreateCell {
        id: String,
        #[serde(rename = "type")]
        ty: ValueType,
        initial: Value,
    },
    UpdateCell {
        id: String,
        value: Value,
        #[serde(default)]
        animated: bool,
        /// Animation length in milliseconds.
        #[serde(default)]
        duration: Option<u64>,
    },
    CreateNode(NodeSpec),
    AddChild {
        parent_id: String,
        child_id: String,
        #[serde(default)]
        index: Option<usize>,
    },
    RemoveChild {
        parent_id: String,
        child_id: String,
    },
    UpdateStyle {
        id: String,
        style: Style,
        #[serde(default = "merge_by_default")]
        merge: bool,
        #[serde(default)]
        animated: bool,
        #[serde(default)]
        duration: Option<u64>,
    },
    UpdateText {
        id: String,
        text: String,
    },
    DeleteNode {
        id: String,
        #[serde(default)]
        animated: bool,
        #[serde(default)]
        duration: Option<u64>,
    },
    SetRoot {
        id: String,
    },
    Batch {
        #[serde(default)]
        events: Vec<Event>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateCell { .. } => "createCell",
            Self::UpdateCell { .. } => "updateCell",
            Self::CreateNode(_) => "createNode",
            Self::AddChild { .. } => "addChild",
            Self::RemoveChild { .. } => "removeChild",
            Self::UpdateStyle { .. } => "updateStyle",
            Self::UpdateText { .. } => "updateText",
            Self::DeleteNode { .. } => "deleteNode",
            Self::SetRoot { .. } => "setRoot",
            Self::Batch { .. } => "batch",
        }
    }

    /// Parses a JSON array of events.
    pub fn parse_log(json: &str) -> Result<Vec<Event>> {
        Ok(serde_json::from_str(json)?)
    }
}
