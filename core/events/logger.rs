use super::*;
use crate::flow::Node;
use crate::process::Process;
use crate::scheduler::Failure;
use tracing::*;

/// Receives notifications about a build as it runs.
///
/// Output callbacks are made from the output reader thread, everything else from the thread
/// running the scheduler.
///
pub trait Logger: std::fmt::Debug + Send + Sync {
    fn goal_started(&self, _goal: &Node) {}

    fn goal_completed(&self, _goal: &Node) {}

    fn goal_failed(&self, _goal: &Node, _failures: &[Failure]) {}

    fn node_started(&self, _node: &Node) {}

    fn node_completed(&self, _node: &Node) {}

    fn node_failed(&self, _node: &Node, _error: &anyhow::Error) {}

    fn process_started(&self, _process: &Process) {}

    fn process_completed(&self, _process: &Process) {}

    fn process_failed(&self, _process: &Process) {}

    fn stdout(&self, _bytes: &[u8]) {}

    fn stderr(&self, _bytes: &[u8]) {}
}

/// Logs every notification through `tracing`.
///
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn goal_started(&self, goal: &Node) {
        info!("Making {}", goal.label());
    }

    fn goal_completed(&self, goal: &Node) {
        info!("Made {}", goal.label());
    }

    fn goal_failed(&self, goal: &Node, failures: &[Failure]) {
        error!("Failed to make {} ({} failures)", goal.label(), failures.len());
    }

    fn node_started(&self, node: &Node) {
        debug!("Started {}", node.label());
    }

    fn node_completed(&self, node: &Node) {
        debug!("Completed {}", node.label());
    }

    fn node_failed(&self, node: &Node, error: &anyhow::Error) {
        error!("{} failed: {:#}", node.label(), error);
    }

    fn process_started(&self, process: &Process) {
        match process.message() {
            Some(message) => info!("{}", message),
            None => info!("{}", process.command_line()),
        }
    }

    fn process_completed(&self, process: &Process) {
        debug!("Finished {}", process.command_line());
    }

    fn process_failed(&self, process: &Process) {
        match process.error() {
            Some(err) => error!("{}", err),
            None => error!("{} failed", process.command_line()),
        }
    }

    fn stdout(&self, bytes: &[u8]) {
        info!(target: "forge::stdout", "{}", String::from_utf8_lossy(bytes).trim_end());
    }

    fn stderr(&self, bytes: &[u8]) {
        warn!(target: "forge::stderr", "{}", String::from_utf8_lossy(bytes).trim_end());
    }
}

impl Logger for EventChannel {
    fn goal_started(&self, goal: &Node) {
        self.send(GoalEvent::GoalStarted {
            goal: goal.label().to_string(),
        });
    }

    fn goal_completed(&self, goal: &Node) {
        self.send(GoalEvent::GoalCompleted {
            goal: goal.label().to_string(),
        });
    }

    fn goal_failed(&self, goal: &Node, failures: &[Failure]) {
        self.send(GoalEvent::GoalFailed {
            goal: goal.label().to_string(),
            failures: failures.iter().map(ToString::to_string).collect(),
        });
    }

    fn node_started(&self, node: &Node) {
        self.send(NodeEvent::NodeStarted {
            node: node.label().to_string(),
        });
    }

    fn node_completed(&self, node: &Node) {
        self.send(NodeEvent::NodeCompleted {
            node: node.label().to_string(),
        });
    }

    fn node_failed(&self, node: &Node, error: &anyhow::Error) {
        self.send(NodeEvent::NodeFailed {
            node: node.label().to_string(),
            error: format!("{:#}", error),
        });
    }

    fn process_started(&self, process: &Process) {
        self.send(ProcessEvent::ProcessStarted {
            command: process.command_line(),
            message: process.message().map(str::to_string),
        });
    }

    fn process_completed(&self, process: &Process) {
        self.send(ProcessEvent::ProcessCompleted {
            command: process.command_line(),
        });
    }

    fn process_failed(&self, process: &Process) {
        self.send(ProcessEvent::ProcessFailed {
            command: process.command_line(),
            error: process
                .error()
                .map(ToString::to_string)
                .unwrap_or_default(),
        });
    }

    fn stdout(&self, bytes: &[u8]) {
        self.send(OutputEvent::Stdout(bytes.to_vec()));
    }

    fn stderr(&self, bytes: &[u8]) {
        self.send(OutputEvent::Stderr(bytes.to_vec()));
    }
}
