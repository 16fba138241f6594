use super::*;
use crate::context::{ContextError, Params, Value};
use crate::process::{Command, Process, ProcessId};
use crate::{Config, Engine};
use std::path::PathBuf;
use std::process::Child;

/// What a routine can see and do while one of its steps runs.
///
pub struct StepContext<'a> {
    engine: &'a mut Engine,
    node: NodeId,
}

impl<'a> StepContext<'a> {
    pub(crate) fn new(engine: &'a mut Engine, node: NodeId) -> Self {
        Self { engine, node }
    }

    /// The node this routine is running for.
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn params(&self) -> &Params {
        self.engine.node(self.node).params()
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params().get(name)
    }

    pub fn set_param<K, V>(&mut self, name: K, value: V)
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.engine.node_mut(self.node).params.insert(name, value);
    }

    /// Resolve an option through every context currently entered, innermost first.
    pub fn option(&self, name: &str) -> Option<&Value> {
        self.engine.option(name)
    }

    pub fn config(&self) -> &Config {
        self.engine.config()
    }

    /// Invoke a flow. A node that did not exist yet runs its first step before this returns.
    pub fn call(&mut self, group: GroupId, params: Params) -> Result<NodeId, FlowError> {
        self.engine.call(group, params)
    }

    pub fn invoke(&mut self, name: &str, params: Params) -> Result<NodeId, FlowError> {
        self.engine.invoke(name, params)
    }

    /// Hand a command to the engine. Its message is rendered against the current contexts now.
    ///
    /// The command does not start until the node blocks on the returned id.
    pub fn spawn(&mut self, command: Command) -> Result<ProcessId, ContextError> {
        self.engine.spawn(command)
    }

    pub fn spawn_with<S, F>(&mut self, description: S, start: F) -> ProcessId
    where
        S: Into<String>,
        F: FnOnce() -> std::io::Result<Child> + 'static,
    {
        self.engine.spawn_with(description, start)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        self.engine.node(id)
    }

    pub fn process(&self, id: ProcessId) -> &Process {
        self.engine.process(id)
    }

    pub fn command(&self, id: ProcessId) -> Option<&Command> {
        self.engine.process(id).command()
    }

    /// Declare the file this node produces. It is removed if the node does not complete.
    pub fn declare_target<P: Into<PathBuf>>(&mut self, path: P) {
        self.engine.node_mut(self.node).target = Some(path.into());
    }

    /// Force dependents of this node to consider themselves out of date.
    pub fn mark_changed(&mut self) {
        self.engine.node_mut(self.node).changed = true;
    }

    pub fn artifact(&self, id: NodeId) -> Artifact {
        Artifact::of(self.engine.node(id))
    }
}
