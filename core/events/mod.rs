//! # Build notifications
//!
//! The engine reports what it is doing to a `Logger`, synchronously and as it happens. The
//! default `TracingLogger` turns notifications into `tracing` events. An `EventChannel` turns them
//! into self-contained `Event` values that a reporter (or a test) can consume at its own pace.
//!
mod channel;
mod consumer;
pub mod event;
mod logger;

pub use channel::*;
pub use consumer::*;
pub use event::*;
pub use logger::*;
