use super::*;
use crate::context::{Context, Params, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::*;

#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum NodeState {
    /// Ready to be stepped.
    Pending,

    /// Its routine is executing a step.
    Running,

    /// Suspended until its dependencies complete.
    Blocked,

    Completed,

    Failed,
}

impl NodeState {
    pub fn is_finished(&self) -> bool {
        matches!(self, NodeState::Completed | NodeState::Failed)
    }
}

/// A flow instantiated for one specific set of parameters.
///
/// Nodes live for as long as the `Engine` that created them. The parameters used to invoke the
/// flow are the node's identity; the copy held by the node may be changed by its routine.
///
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) group: GroupId,
    pub(crate) label: String,
    pub(crate) params: Params,
    pub(crate) state: NodeState,
    pub(crate) chain: Chain,
    pub(crate) routine: Option<Box<dyn Routine>>,
    pub(crate) error: Option<anyhow::Error>,
    pub(crate) failed_on: Option<Dependency>,
    pub(crate) target: Option<PathBuf>,
    pub(crate) changed: bool,
    pub(crate) started: bool,

    /// Dependencies from the last step that the scheduler has not registered yet.
    awaiting: Vec<Dependency>,

    /// Registered dependencies that have not completed yet.
    outstanding: usize,

    closed: bool,
}

impl Node {
    pub(crate) fn new(
        id: NodeId,
        group: GroupId,
        group_name: &str,
        params: Params,
        chain: Chain,
        routine: Box<dyn Routine>,
    ) -> Self {
        Self {
            id,
            group,
            label: format!("{}({})", group_name, params),
            params,
            state: NodeState::Pending,
            chain,
            routine: Some(routine),
            error: None,
            failed_on: None,
            target: None,
            changed: false,
            started: false,
            awaiting: vec![],
            outstanding: 0,
            closed: false,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    /// A human readable name, like `compile(source=main.c)`.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn error(&self) -> Option<&anyhow::Error> {
        self.error.as_ref()
    }

    /// The file this node produces, if it declared one.
    pub fn target(&self) -> Option<&Path> {
        self.target.as_deref()
    }

    /// Whether this node forces its dependents to be rebuilt, regardless of timestamps.
    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// True if the node failed only because something it was waiting on failed.
    pub fn failed_on_dependency(&self) -> bool {
        self.failed_on.is_some()
    }

    /// The dependency whose failure failed this node.
    pub fn failed_on(&self) -> Option<Dependency> {
        self.failed_on
    }

    pub(crate) fn block(&mut self, deps: Vec<Dependency>) {
        self.state = NodeState::Blocked;
        self.awaiting = deps;
    }

    pub(crate) fn take_awaiting(&mut self) -> Vec<Dependency> {
        std::mem::take(&mut self.awaiting)
    }

    pub(crate) fn wait_for(&mut self) {
        self.outstanding += 1;
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Mark one dependency as satisfied. Returns true if that made the node runnable again.
    ///
    pub fn unblock(&mut self) -> bool {
        self.outstanding = self.outstanding.saturating_sub(1);
        if self.outstanding == 0 && self.state == NodeState::Blocked {
            self.state = NodeState::Pending;
            true
        } else {
            false
        }
    }

    pub(crate) fn fail(&mut self, error: anyhow::Error) {
        self.state = NodeState::Failed;
        self.error = Some(error);
    }

    pub(crate) fn fail_on(&mut self, dep: Dependency, error: FlowError) {
        self.fail(error.into());
        self.failed_on = Some(dep);
    }

    /// Finalize a node that did not complete.
    ///
    /// A still-suspended routine gets a chance to clean up, and the declared target is removed so
    /// a partially built file is never mistaken for a finished one. Completed nodes keep their
    /// target. Closing twice does nothing.
    ///
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(mut routine) = self.routine.take() {
            routine.close();
        }

        if self.state == NodeState::Completed {
            return;
        }

        if let Some(target) = &self.target {
            match std::fs::remove_file(target) {
                Ok(()) => debug!("Removed incomplete target {:?} of {}", target, self.label),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => (),
                Err(err) => warn!(
                    "Could not remove incomplete target {:?} of {}: {}",
                    target, self.label, err
                ),
            }
        }
    }
}

impl Context for Node {
    fn get(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    fn set(&mut self, name: &str, value: Value) {
        self.params.insert(name, value);
    }

    fn remove(&mut self, name: &str) -> Option<Value> {
        self.params.remove(name)
    }

    fn names(&self) -> Vec<&str> {
        self.params.iter().map(|(name, _)| name).collect()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("state", &self.state)
            .field("target", &self.target)
            .field("outstanding", &self.outstanding)
            .finish_non_exhaustive()
    }
}
