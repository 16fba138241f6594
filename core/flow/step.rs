use super::{NodeId, StepContext};
use crate::process::ProcessId;

/// Something a node can be blocked on.
///
#[derive(Copy, Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum Dependency {
    Node(NodeId),
    Process(ProcessId),
}

impl From<NodeId> for Dependency {
    fn from(value: NodeId) -> Self {
        Dependency::Node(value)
    }
}

impl From<ProcessId> for Dependency {
    fn from(value: ProcessId) -> Self {
        Dependency::Process(value)
    }
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dependency::Node(id) => id.fmt(f),
            Dependency::Process(id) => id.fmt(f),
        }
    }
}

/// What a routine asks of the scheduler after one step.
///
/// A failed step is the `Err` arm of the routine's result.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Suspend without waiting on anything. The node is queued behind the other pending work.
    Continue,

    /// This variant gives up on the node. The next matching variant of the flow takes over.
    Declined,

    /// Suspend until every one of these has completed.
    Blocked(Vec<Dependency>),

    Done,
}

impl Step {
    pub fn blocked_on<I, D>(deps: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<Dependency>,
    {
        Step::Blocked(deps.into_iter().map(Into::into).collect())
    }
}

/// A resumable build step.
///
/// Each call to `step` runs the routine up to its next suspension point. A routine that returns
/// `Step::Done`, `Step::Declined`, or an error is never stepped again.
///
pub trait Routine {
    fn step(&mut self, cx: &mut StepContext<'_>) -> anyhow::Result<Step>;

    /// Called when the node is closed while the routine is still suspended.
    fn close(&mut self) {}
}

impl<F> Routine for F
where
    F: FnMut(&mut StepContext<'_>) -> anyhow::Result<Step>,
{
    fn step(&mut self, cx: &mut StepContext<'_>) -> anyhow::Result<Step> {
        self(cx)
    }
}

/// Pin a closure to the signature of `Routine::step`, so it can be used as one.
///
pub fn routine<F>(f: F) -> F
where
    F: FnMut(&mut StepContext<'_>) -> anyhow::Result<Step>,
{
    f
}
