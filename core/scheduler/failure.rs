use crate::flow::NodeId;
use crate::process::ProcessId;
use nix::sys::signal::Signal;
use thiserror::*;

/// One reason a build did not succeed.
///
/// Nodes that failed only because something they waited on failed are not reported, only the
/// root causes are.
///
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    #[error("{0} failed")]
    Node(NodeId),

    #[error("{0} failed")]
    Command(ProcessId),

    #[error("Circular dependency between {}", .blocked.join(", "))]
    CircularDependency { blocked: Vec<String> },

    #[error("Build interrupted by {0:?}")]
    Interrupted(Signal),
}
