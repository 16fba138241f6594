//! # Configuration contexts
//!
//! A context is anything that can answer option queries by name. While a `Node` is being stepped,
//! it is the innermost context on the `ContextStack`, so option lookups made by its routine (and by
//! anything the routine creates, like a `Command` message) see the node's parameters first, then
//! the parameters of whichever node is being stepped further out, and finally the base overrides
//! in the `Config`.
//!
mod params;
mod stack;
mod template;

pub use params::*;
pub use stack::*;
pub use template::*;

use thiserror::*;

/// The protocol every configuration context follows.
///
pub trait Context {
    fn get(&self, name: &str) -> Option<&Value>;

    fn set(&mut self, name: &str, value: Value);

    fn remove(&mut self, name: &str) -> Option<Value>;

    fn names(&self) -> Vec<&str>;

    fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("Option {0:?} is not set in the current context")]
    UnknownOption(String),
}
