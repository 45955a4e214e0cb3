//! Tree synthesizer.
//!
//! Replays structural events into a node graph. Referenced children live in
//! an arena keyed by id and every node keeps a back-reference to its parent:
//! `child.parent_id == Some(p.id)` exactly when `p` lists `child` as a
//! reference. Events that name unknown nodes are no-ops.

mod event;
mod node;

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use serde::Serialize;

use crate::{AnimationConfig, CellStore, RenderConsumer, Value};

pub use event::Event;
pub use node::{Child, HandlerKind, Handlers, Node, NodeKind, NodeSpec, Style};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeGraph {
    nodes: BTreeMap<String, Node>,
    root: Option<String>,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Looks up a node by id, including inline template nodes.
    pub fn find(&self, id: &str) -> Option<&Node> {
        self.nodes
            .get(id)
            .or_else(|| self.nodes.values().find_map(|node| node.find_inline(id)))
    }

    /// Collection node whose template contains the inline node `id`.
    pub fn template_owner(&self, id: &str) -> Option<&Node> {
        self.nodes
            .values()
            .filter(|node| node.kind == NodeKind::Collection)
            .find(|node| node.id == id || node.find_inline(id).is_some())
    }

    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn root_node(&self) -> Option<&Node> {
        self.root.as_deref().and_then(|id| self.nodes.get(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Referenced children of `id`, in order.
    pub fn children_of(&self, id: &str) -> Vec<&Node> {
        self.nodes
            .get(id)
            .map(|node| node.child_refs().filter_map(|c| self.nodes.get(c)).collect())
            .unwrap_or_default()
    }

    /// Lists every broken parent/child link. Empty for a consistent graph.
    pub fn violations(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for node in self.nodes.values() {
            for child in node.child_refs() {
                match self.nodes.get(child) {
                    Some(c) if c.parent_id.as_deref() == Some(node.id.as_str()) => {}
                    Some(_) => problems.push(format!("{child} listed by {} but parented elsewhere", node.id)),
                    None => problems.push(format!("{} references missing {child}", node.id)),
                }
                if node.child_refs().filter(|c| *c == child).count() > 1 {
                    problems.push(format!("{} lists {child} more than once", node.id));
                }
            }
            if let Some(parent) = &node.parent_id {
                let listed = self
                    .nodes
                    .get(parent)
                    .map(|p| p.has_child_ref(&node.id))
                    .unwrap_or(false);
                if !listed {
                    problems.push(format!("{} claims parent {parent} which does not list it", node.id));
                }
            }
        }
        problems
    }

    fn is_ancestor(&self, ancestor: &str, of: &str) -> bool {
        let mut current = Some(of);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(id).and_then(|n| n.parent_id.as_deref());
        }
        false
    }

    fn detach(&mut self, child_id: &str) {
        let Some(parent_id) = self.nodes.get_mut(child_id).and_then(|c| c.parent_id.take()) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(&parent_id) {
            parent
                .children
                .retain(|c| c.as_ref_id() != Some(child_id));
        }
    }

    fn insert(&mut self, spec: NodeSpec) {
        let id = spec.id.clone();
        let mut node = spec.into_node(None);
        if let Some(existing) = self.nodes.remove(&id) {
            tracing::debug!(node = %id, "node recreated; keeping its links");
            node.parent_id = existing.parent_id;
            let refs: Vec<Child> = existing
                .children
                .into_iter()
                .filter(|c| matches!(c, Child::Ref(_)))
                .collect();
            node.children.splice(0..0, refs);
        }
        self.nodes.insert(id, node);
    }

    fn add_child(&mut self, parent_id: &str, child_id: &str, index: Option<usize>) {
        if !self.nodes.contains_key(parent_id) || !self.nodes.contains_key(child_id) {
            tracing::debug!(parent = parent_id, child = child_id, "addChild on unknown node ignored");
            return;
        }
        if self.is_ancestor(child_id, parent_id) {
            tracing::warn!(parent = parent_id, child = child_id, "addChild would create a cycle; ignored");
            return;
        }

        self.detach(child_id);
        if let Some(parent) = self.nodes.get_mut(parent_id) {
            let at = index.unwrap_or(parent.children.len()).min(parent.children.len());
            parent.children.insert(at, Child::Ref(child_id.to_string()));
        }
        if let Some(child) = self.nodes.get_mut(child_id) {
            child.parent_id = Some(parent_id.to_string());
        }
    }

    fn remove_child(&mut self, parent_id: &str, child_id: &str) {
        let is_parent = self
            .nodes
            .get(child_id)
            .is_some_and(|c| c.parent_id.as_deref() == Some(parent_id));
        if is_parent {
            self.detach(child_id);
        }
    }

    /// Removes `id` and its referenced subtree.
    fn delete(&mut self, id: &str) {
        if !self.nodes.contains_key(id) {
            return;
        }
        self.detach(id);

        let mut doomed = vec![id.to_string()];
        while let Some(next) = doomed.pop() {
            if let Some(node) = self.nodes.remove(&next) {
                doomed.extend(node.child_refs().map(str::to_string));
            }
            if self.root.as_deref() == Some(next.as_str()) {
                self.root = None;
            }
        }
    }
}

/// Applies events to a [`NodeGraph`] and registers their cells.
pub struct Synthesizer {
    graph: NodeGraph,
    applied: usize,
    cells: Arc<CellStore>,
    renderer: Arc<dyn RenderConsumer>,
    animation: AnimationConfig,
}

impl std::fmt::Debug for Synthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synthesizer")
            .field("nodes", &self.graph.len())
            .field("applied", &self.applied)
            .finish()
    }
}

impl Synthesizer {
    pub fn new(
        cells: Arc<CellStore>,
        renderer: Arc<dyn RenderConsumer>,
        animation: AnimationConfig,
    ) -> Self {
        Self {
            graph: NodeGraph::new(),
            applied: 0,
            cells,
            renderer,
            animation,
        }
    }

    pub fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    /// Number of top-level log entries consumed by [`Synthesizer::sync`].
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Applies the entries of a growing log that have not been seen yet and
    /// returns how many were applied.
    pub fn sync(&mut self, log: &[Event]) -> usize {
        let Some(fresh) = log.get(self.applied..) else {
            tracing::warn!(applied = self.applied, len = log.len(), "event log shrank; ignoring");
            return 0;
        };
        for event in fresh {
            self.apply(event);
        }
        self.applied = log.len();
        fresh.len()
    }

    pub fn apply(&mut self, event: &Event) {
        tracing::debug!(event = event.name(), "apply");
        match event {
            Event::CreateCell { id, ty, initial } => {
                self.cells.create(id.clone(), initial.clone().coerce(*ty));
            }
            Event::UpdateCell {
                id,
                value,
                animated,
                duration,
            } => match value {
                Value::Number(target)
                    if *animated && matches!(self.cells.read(id), Some(Value::Number(_))) =>
                {
                    let duration = Duration::from_millis(
                        duration.unwrap_or(self.animation.default_duration_ms),
                    );
                    self.renderer
                        .animate_to(id, *target, duration, self.animation.default_curve);
                }
                _ => {
                    let coerced = self
                        .cells
                        .update(id, |current| value.clone().coerce(current.value_type()));
                    if coerced.is_none() {
                        tracing::debug!(cell = %id, "updateCell on unknown cell ignored");
                    }
                }
            },
            Event::CreateNode(spec) => self.graph.insert(spec.clone()),
            Event::AddChild {
                parent_id,
                child_id,
                index,
            } => self.graph.add_child(parent_id, child_id, *index),
            Event::RemoveChild {
                parent_id,
                child_id,
            } => self.graph.remove_child(parent_id, child_id),
            Event::UpdateStyle {
                id, style, merge, ..
            } => {
                if let Some(node) = self.graph.nodes.get_mut(id) {
                    if *merge {
                        node.style
                            .extend(style.iter().map(|(k, v)| (k.clone(), v.clone())));
                    } else {
                        node.style = style.clone();
                    }
                }
            }
            Event::UpdateText { id, text } => {
                if let Some(node) = self.graph.nodes.get_mut(id) {
                    node.text = Some(text.clone());
                }
            }
            Event::DeleteNode { id, .. } => self.graph.delete(id),
            Event::SetRoot { id } => self.graph.root = Some(id.clone()),
            Event::Batch { events } => {
                for event in events {
                    self.apply(event);
                }
            }
        }
    }
}
