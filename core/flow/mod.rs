//! # Flows, variants, and nodes
//!
//! A `FlowGroup` is a named build step with one or more competing `Variant`s. Invoking a group
//! with a set of `Params` yields the one `Node` ever created for those parameters. A node drives a
//! `Routine` one `Step` at a time, and the scheduler resumes it once whatever it is blocked on has
//! completed.
//!
mod freshness;
mod group;
mod node;
mod predicate;
mod step;
mod step_context;

pub use freshness::*;
pub use group::*;
pub use node::*;
pub use predicate::*;
pub use step::*;
pub use step_context::*;

use thiserror::*;

/// A handle to a `FlowGroup` registered with an `Engine`.
///
#[derive(Copy, Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct GroupId(pub(crate) usize);

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Group({})", self.0)
    }
}

/// A handle to a `Node`. It can only be obtained by invoking a `FlowGroup` through an `Engine`.
///
#[derive(Copy, Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct NodeId(pub(crate) usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("{candidates} variants of {group} match ({params}) at priority {priority}")]
    AmbiguousMatch {
        group: String,
        params: String,
        priority: i32,
        candidates: usize,
    },

    #[error("No variant of {group} matches ({params})")]
    NoMatch { group: String, params: String },

    #[error("There is no flow named {0:?}")]
    UnknownFlow(String),

    #[error("A flow named {0:?} is already registered")]
    DuplicateFlow(String),

    #[error("{node} could not continue because {dependency} failed")]
    DependencyFailed { node: String, dependency: String },

    #[error("Routine panicked: {0}")]
    Panicked(String),
}
