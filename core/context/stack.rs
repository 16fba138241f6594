use super::{Context, Value};
use crate::flow::NodeId;

/// The stack of nodes currently acting as configuration contexts.
///
/// A node is entered once per step of its routine, and exited when the step returns. Nested
/// entries happen when a routine invokes a flow whose node did not exist yet, since constructing
/// that node runs its first step right away.
///
#[derive(Debug, Default)]
pub struct ContextStack {
    frames: Vec<NodeId>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&mut self, node: NodeId) {
        self.frames.push(node);
    }

    pub fn exit(&mut self) -> Option<NodeId> {
        self.frames.pop()
    }

    pub fn current(&self) -> Option<NodeId> {
        self.frames.last().copied()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Resolve an option from the innermost context outwards, falling back to `base`.
    ///
    pub fn resolve<'a, F>(&self, name: &str, frame: F, base: &'a dyn Context) -> Option<&'a Value>
    where
        F: Fn(NodeId) -> &'a dyn Context,
    {
        self.frames
            .iter()
            .rev()
            .find_map(|id| frame(*id).get(name))
            .or_else(|| base.get(name))
    }
}
