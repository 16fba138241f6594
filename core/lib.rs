//! # Forge Core
//!
//! The execution engine of a dependency-driven build orchestrator.
//!
//! The flow begins by creating a `Config` and using it to build an `Engine`. Flows are registered
//! with the engine as `FlowGroup`s, and invoking a group with a set of parameters yields a memoized
//! `Node`. Calling `Engine::make` on a root node drives it, and everything it depends on, to
//! completion: nodes are stepped cooperatively, external `Command`s run in parallel up to the
//! configured quota, and their output is captured by a single background reader thread.
//!
//! The result of a run is the list of `Failure`s that were collected. An empty list means the goal
//! was built.
//!

pub mod capture;
pub(crate) mod config;
pub mod context;
pub(crate) mod engine;
pub mod events;
pub mod flow;
pub mod process;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use config::*;
pub use context::{Params, Value};
pub use engine::*;
pub use events::Logger;
pub use flow::{
    routine, Dependency, FlowGroup, GroupId, Node, NodeId, NodeState, Predicate, Routine, Step,
    StepContext, Variant,
};
pub use process::{Command, ExitOutcome, FailurePolicy, ProcessId, ProcessState};
pub use scheduler::Failure;

#[macro_use]
extern crate derive_builder;

#[cfg(test)]
#[macro_use]
extern crate assert_matches;

#[cfg(test)]
extern crate quickcheck;
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;
