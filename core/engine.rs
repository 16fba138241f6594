use super::*;
use crate::capture::{CaptureError, OutputReader};
use crate::context::{Context, ContextError, ContextStack};
use crate::flow::{Chain, FlowError};
use crate::process::{Process, ProcessKind};
use crate::scheduler::Scheduler;
use fxhash::FxHashMap;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::process::Child;
use std::sync::Arc;
use thiserror::*;
use tracing::{debug, trace};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    ConfigError(#[from] ConfigError),

    #[error(transparent)]
    CaptureError(#[from] CaptureError),

    #[error(transparent)]
    FlowError(#[from] FlowError),
}

/// The registry every build runs against.
///
/// An engine owns the registered flows, every node ever created from them, every process handed
/// to it, and the output reader thread. Independent engines share nothing, except for the signal
/// dispositions a running `make` installs.
///
pub struct Engine {
    pub(crate) config: Config,
    pub(crate) groups: Vec<FlowGroup>,
    group_names: FxHashMap<String, GroupId>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) processes: Vec<Process>,
    pub(crate) contexts: ContextStack,
    pub(crate) reader: OutputReader,
}

impl Engine {
    #[tracing::instrument(name = "Engine::new", skip(config))]
    pub fn new(config: Config) -> Result<Self, EngineError> {
        Ok(Self {
            config,
            groups: vec![],
            group_names: FxHashMap::default(),
            nodes: vec![],
            processes: vec![],
            contexts: ContextStack::new(),
            reader: OutputReader::start()?,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn logger(&self) -> &Arc<dyn Logger> {
        self.config.logger()
    }

    pub fn register(&mut self, group: FlowGroup) -> Result<GroupId, FlowError> {
        if self.group_names.contains_key(group.name()) {
            return Err(FlowError::DuplicateFlow(group.name().to_string()));
        }
        let id = GroupId(self.groups.len());
        self.group_names.insert(group.name().to_string(), id);
        self.groups.push(group);
        Ok(id)
    }

    pub fn group_id(&self, name: &str) -> Option<GroupId> {
        self.group_names.get(name).copied()
    }

    pub fn group(&self, id: GroupId) -> &FlowGroup {
        &self.groups[id.0]
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn process(&self, id: ProcessId) -> &Process {
        &self.processes[id.0]
    }

    pub fn processes(&self) -> impl Iterator<Item = &Process> {
        self.processes.iter()
    }

    /// Resolve an option through every context currently entered, innermost first, and finally
    /// the overrides in the configuration.
    ///
    pub fn option(&self, name: &str) -> Option<&Value> {
        let nodes = &self.nodes;
        self.contexts.resolve(
            name,
            |id| &nodes[id.0] as &dyn Context,
            self.config.overrides(),
        )
    }

    /// Invoke a flow with a set of parameters.
    ///
    /// The same parameters always yield the same node. A new node immediately runs its first
    /// step, so by the time this returns it may already be completed, failed, or blocked.
    ///
    #[tracing::instrument(name = "Engine::call", skip(self))]
    pub fn call(&mut self, group: GroupId, params: Params) -> Result<NodeId, FlowError> {
        let flow = &self.groups[group.0];
        if let Some(node) = flow.cached(&params) {
            return Ok(node);
        }

        let mut chain = Chain::default();
        let routine = flow.next_candidate(&mut chain, &params)?.instantiate();
        let id = NodeId(self.nodes.len());
        let node = Node::new(id, group, flow.name(), params.clone(), chain, routine);
        debug!("Created {} as {}", node.label(), id);

        self.groups[group.0].remember(params, id);
        self.nodes.push(node);
        self.advance(id);
        Ok(id)
    }

    pub fn invoke(&mut self, name: &str, params: Params) -> Result<NodeId, FlowError> {
        let group = self
            .group_id(name)
            .ok_or_else(|| FlowError::UnknownFlow(name.to_string()))?;
        self.call(group, params)
    }

    /// Hand a command over to the engine. Its message is rendered against the current contexts
    /// now, and it is started once a node blocks on it.
    ///
    pub fn spawn(&mut self, mut command: Command) -> Result<ProcessId, ContextError> {
        command.render_message(|name| self.option(name).cloned())?;
        Ok(self.add_process(ProcessKind::Command(command)))
    }

    /// Like `spawn`, for a process started by an arbitrary action. It completes whenever it
    /// exits, regardless of its exit code.
    pub fn spawn_with<S, F>(&mut self, description: S, start: F) -> ProcessId
    where
        S: Into<String>,
        F: FnOnce() -> std::io::Result<Child> + 'static,
    {
        self.add_process(ProcessKind::Spawn {
            description: description.into(),
            start: Some(Box::new(start)),
        })
    }

    fn add_process(&mut self, kind: ProcessKind) -> ProcessId {
        let id = ProcessId(self.processes.len());
        self.processes.push(Process::new(id, kind));
        id
    }

    /// Run everything `goal` depends on, then `goal` itself. Returns every failure; an empty list
    /// means the goal completed.
    ///
    #[tracing::instrument(name = "Engine::make", skip(self))]
    pub fn make(&mut self, goal: NodeId) -> Vec<Failure> {
        Scheduler::new(self).run(goal)
    }

    /// Finalize a node that is not going to complete.
    pub fn close(&mut self, id: NodeId) {
        self.nodes[id.0].close();
    }

    /// Step a node's routine until it suspends, finishes, or runs out of variants to try.
    ///
    pub(crate) fn advance(&mut self, id: NodeId) -> NodeState {
        loop {
            let node = &mut self.nodes[id.0];
            let Some(mut routine) = node.routine.take() else {
                return node.state;
            };
            if !node.started {
                node.started = true;
                self.config.logger().node_started(node);
            }
            node.state = NodeState::Running;

            self.contexts.enter(id);
            let result = {
                let mut cx = StepContext::new(self, id);
                catch_unwind(AssertUnwindSafe(|| routine.step(&mut cx)))
            };
            self.contexts.exit();

            let result = result.unwrap_or_else(|panic| {
                Err(FlowError::Panicked(panic_message(panic.as_ref())).into())
            });

            let logger = self.config.logger();
            let node = &mut self.nodes[id.0];
            match result {
                Ok(Step::Done) => {
                    node.state = NodeState::Completed;
                    logger.node_completed(node);
                }
                Ok(Step::Blocked(deps)) if !deps.is_empty() => {
                    trace!("{} blocked on {} dependencies", node.label(), deps.len());
                    node.routine = Some(routine);
                    node.block(deps);
                }
                Ok(Step::Continue | Step::Blocked(_)) => {
                    node.routine = Some(routine);
                    node.state = NodeState::Pending;
                }
                Ok(Step::Declined) => {
                    routine.close();
                    let group = &self.groups[node.group.0];
                    match group.next_candidate(&mut node.chain, &node.params) {
                        Ok(variant) => {
                            debug!("{} falls through to priority {}", node.label(), variant.priority());
                            node.routine = Some(variant.instantiate());
                            continue;
                        }
                        Err(err) => {
                            node.fail(err.into());
                            if let Some(err) = node.error() {
                                logger.node_failed(node, err);
                            }
                        }
                    }
                }
                Err(err) => {
                    node.fail(err);
                    if let Some(err) = node.error() {
                        logger.node_failed(node, err);
                    }
                }
            }
            return node.state;
        }
    }

    pub(crate) fn start_process(&mut self, id: ProcessId) -> ProcessState {
        let logger = self.config.logger();
        let process = &mut self.processes[id.0];
        let state = process.start(&self.reader, &self.config, logger);
        match state {
            ProcessState::Running => logger.process_started(process),
            ProcessState::Completed => logger.process_completed(process),
            ProcessState::Failed => logger.process_failed(process),
            ProcessState::Pending => (),
        }
        state
    }

    pub(crate) fn process_exited(&mut self, id: ProcessId, outcome: ExitOutcome) -> ProcessState {
        let logger = self.config.logger();
        let process = &mut self.processes[id.0];
        let state = process.exited(outcome, &self.reader);
        match state {
            ProcessState::Failed => logger.process_failed(process),
            _ => logger.process_completed(process),
        }
        state
    }

    pub(crate) fn process_lost(&mut self, id: ProcessId) {
        let process = &mut self.processes[id.0];
        process.lost(&self.reader);
        self.config.logger().process_failed(process);
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("groups", &self.groups.len())
            .field("nodes", &self.nodes.len())
            .field("processes", &self.processes.len())
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
