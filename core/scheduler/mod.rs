//! # Scheduling
//!
//! `make` drives a goal to completion. It keeps the queue of runnable nodes, the queue of
//! commands waiting for a free slot, and the commands currently running, and loops until none of
//! them has anything left. Each turn it does exactly one of these, in this order:
//!
//! 1. start a queued command, if fewer than `jobs` are running
//! 2. step the node that became runnable first
//! 3. wait for any running command to exit
//!
//! Completing a node or a command unblocks whatever was waiting on it; failing one fails
//! everything waiting on it, transitively.
//!
mod failure;
mod signals;

pub use failure::*;

use crate::engine::Engine;
use crate::flow::{Dependency, FlowError, NodeId, NodeState};
use crate::process::{ExitOutcome, ProcessId, ProcessState};
use fxhash::{FxHashMap, FxHashSet};
use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use signals::SignalGuard;
use std::collections::VecDeque;
use tracing::*;

pub struct Scheduler<'e> {
    engine: &'e mut Engine,

    /// Nodes ready to be stepped, in the order they became ready.
    pending: VecDeque<NodeId>,

    /// Commands some node is waiting on, that have not started yet.
    queued: VecDeque<ProcessId>,
    enqueued: FxHashSet<ProcessId>,

    running: FxHashMap<Pid, ProcessId>,

    /// Who is waiting on what.
    dependents: FxHashMap<Dependency, Vec<NodeId>>,

    /// Every node this run has seen, in the order it saw them.
    tracked: Vec<NodeId>,
    seen: FxHashSet<NodeId>,

    failures: Vec<Failure>,
    interruptions: Vec<Signal>,
}

impl<'e> Scheduler<'e> {
    pub fn new(engine: &'e mut Engine) -> Self {
        Self {
            engine,
            pending: VecDeque::new(),
            queued: VecDeque::new(),
            enqueued: FxHashSet::default(),
            running: FxHashMap::default(),
            dependents: FxHashMap::default(),
            tracked: vec![],
            seen: FxHashSet::default(),
            failures: vec![],
            interruptions: vec![],
        }
    }

    #[tracing::instrument(name = "Scheduler::run", skip(self))]
    pub fn run(mut self, goal: NodeId) -> Vec<Failure> {
        let signals = SignalGuard::install();
        self.engine
            .logger()
            .goal_started(self.engine.node(goal));

        self.track(goal);
        loop {
            self.interruptions.extend(signals.drain());
            if !self.interruptions.is_empty()
                || (self.engine.config().fail_fast() && !self.failures.is_empty())
            {
                self.discard();
            }

            if self.running.len() < self.engine.config().jobs() {
                if let Some(process) = self.queued.pop_front() {
                    self.start(process);
                    continue;
                }
            }

            if let Some(node) = self.pending.pop_front() {
                self.step(node);
                continue;
            }

            if !self.running.is_empty() {
                self.wait();
                continue;
            }

            break;
        }
        drop(signals);

        self.finish(goal)
    }

    fn finish(mut self, goal: NodeId) -> Vec<Failure> {
        self.failures
            .extend(self.interruptions.drain(..).map(Failure::Interrupted));

        let unfinished: Vec<NodeId> = self
            .tracked
            .iter()
            .copied()
            .filter(|id| self.engine.node(*id).state() != NodeState::Completed)
            .collect();

        if self.failures.is_empty() && !unfinished.is_empty() {
            let blocked = unfinished
                .iter()
                .map(|id| self.engine.node(*id).label().to_string())
                .collect();
            self.failures.push(Failure::CircularDependency { blocked });
        }

        for id in unfinished {
            self.engine.close(id);
        }

        let logger = self.engine.logger();
        let goal = self.engine.node(goal);
        if self.failures.is_empty() {
            logger.goal_completed(goal);
        } else {
            logger.goal_failed(goal, &self.failures);
        }
        self.failures
    }

    /// Drop everything that has not started yet. Running commands are left to finish.
    fn discard(&mut self) {
        if !self.pending.is_empty() || !self.queued.is_empty() {
            debug!(
                "Discarding {} pending nodes and {} queued commands",
                self.pending.len(),
                self.queued.len()
            );
        }
        self.pending.clear();
        self.queued.clear();
    }

    fn track(&mut self, id: NodeId) {
        if !self.seen.insert(id) {
            return;
        }
        self.tracked.push(id);
        self.settle(id);
    }

    /// React to the state a node was left in by its last step.
    fn settle(&mut self, id: NodeId) {
        match self.engine.node(id).state() {
            NodeState::Pending => self.pending.push_back(id),
            NodeState::Blocked => self.register(id),
            NodeState::Completed => self.complete(Dependency::Node(id)),
            NodeState::Failed => self.node_failed(id),
            NodeState::Running => warn!("{} is still running outside of a step", id),
        }
    }

    /// Wait on whatever the node blocked on in its last step.
    fn register(&mut self, id: NodeId) {
        let deps = self.engine.node_mut(id).take_awaiting();
        let mut failed = None;

        for dep in deps {
            match dep {
                Dependency::Node(node) => {
                    self.track(node);
                    match self.engine.node(node).state() {
                        NodeState::Completed => continue,
                        NodeState::Failed => {
                            failed.get_or_insert(dep);
                            continue;
                        }
                        _ => (),
                    }
                }
                Dependency::Process(process) => match self.engine.process(process).state() {
                    ProcessState::Completed => continue,
                    ProcessState::Failed => {
                        self.report(Failure::Command(process));
                        failed.get_or_insert(dep);
                        continue;
                    }
                    ProcessState::Pending => {
                        if self.enqueued.insert(process) {
                            self.queued.push_back(process);
                        }
                    }
                    ProcessState::Running => (),
                },
            }
            self.engine.node_mut(id).wait_for();
            self.dependents.entry(dep).or_default().push(id);
        }

        if let Some(dep) = failed {
            self.fail_dependent(id, dep);
        } else if self.engine.node(id).outstanding() == 0 {
            self.engine.node_mut(id).state = NodeState::Pending;
            self.pending.push_back(id);
        }
    }

    fn step(&mut self, id: NodeId) {
        if self.engine.node(id).state() != NodeState::Pending {
            return;
        }
        self.engine.advance(id);
        self.settle(id);
    }

    fn start(&mut self, id: ProcessId) {
        match self.engine.start_process(id) {
            ProcessState::Running => match self.engine.process(id).pid() {
                Some(pid) => {
                    self.running.insert(pid, id);
                }
                None => warn!("{} is running without a pid", id),
            },
            ProcessState::Completed => self.complete(Dependency::Process(id)),
            ProcessState::Failed => self.process_failed(id),
            ProcessState::Pending => warn!("{} did not start", id),
        }
    }

    fn wait(&mut self) {
        match waitpid(Pid::from_raw(-1), None) {
            Ok(WaitStatus::Exited(pid, code)) => self.exited(pid, ExitOutcome::Exited(code)),
            Ok(WaitStatus::Signaled(pid, signal, _)) => {
                self.exited(pid, ExitOutcome::Signaled(signal))
            }
            Ok(status) => trace!("Ignoring {:?}", status),
            Err(Errno::EINTR) => (),
            Err(err) => {
                warn!("Lost track of {} running commands: {}", self.running.len(), err);
                let lost: Vec<ProcessId> = self.running.drain().map(|(_, id)| id).collect();
                for id in lost {
                    self.engine.process_lost(id);
                    self.process_failed(id);
                }
            }
        }
    }

    fn exited(&mut self, pid: Pid, outcome: ExitOutcome) {
        let Some(id) = self.running.remove(&pid) else {
            warn!("Reaped {} which was not started by this build", pid);
            return;
        };
        match self.engine.process_exited(id, outcome) {
            ProcessState::Failed => self.process_failed(id),
            _ => self.complete(Dependency::Process(id)),
        }
    }

    fn complete(&mut self, dep: Dependency) {
        for node in self.dependents.remove(&dep).unwrap_or_default() {
            if self.engine.node_mut(node).unblock() {
                self.pending.push_back(node);
            }
        }
    }

    /// A node seen already failed. Nodes that failed on a dependency in an earlier run report
    /// whatever failed first.
    fn node_failed(&mut self, id: NodeId) {
        let cause = self.root_cause(Dependency::Node(id));
        self.report(cause);
        self.fail_dependents(Dependency::Node(id));
    }

    fn process_failed(&mut self, id: ProcessId) {
        self.report(Failure::Command(id));
        self.fail_dependents(Dependency::Process(id));
    }

    fn root_cause(&self, mut dep: Dependency) -> Failure {
        loop {
            match dep {
                Dependency::Process(process) => return Failure::Command(process),
                Dependency::Node(node) => match self.engine.node(node).failed_on() {
                    Some(next) => dep = next,
                    None => return Failure::Node(node),
                },
            }
        }
    }

    fn report(&mut self, failure: Failure) {
        if !self.failures.contains(&failure) {
            self.failures.push(failure);
        }
    }

    fn fail_dependents(&mut self, dep: Dependency) {
        for node in self.dependents.remove(&dep).unwrap_or_default() {
            self.fail_dependent(node, dep);
        }
    }

    fn fail_dependent(&mut self, id: NodeId, dep: Dependency) {
        if self.engine.node(id).state().is_finished() {
            return;
        }
        let dependency = match dep {
            Dependency::Node(node) => self.engine.node(node).label().to_string(),
            Dependency::Process(process) => self.engine.process(process).command_line(),
        };
        let error = FlowError::DependencyFailed {
            node: self.engine.node(id).label().to_string(),
            dependency,
        };
        debug!("{}", error);

        let logger = self.engine.logger().clone();
        let node = self.engine.node_mut(id);
        node.fail_on(dep, error);
        if let Some(error) = node.error() {
            logger.node_failed(node, error);
        }
        self.fail_dependents(Dependency::Node(id));
    }
}
