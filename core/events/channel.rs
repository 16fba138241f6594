use super::event::Event;
use super::EventConsumer;
use crossbeam::deque::{Injector, Worker};
use std::sync::Arc;

/// A queue of build `Event`s.
///
/// Every clone feeds the same queue. An engine configured with a channel as its `Logger` reports
/// into it from the scheduler and from the output reader thread, while a reporter drains it
/// through a consumer.
///
#[derive(Clone, Debug, Default)]
pub struct EventChannel {
    events: Arc<Injector<Event>>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn send<E>(&self, event: E)
    where
        E: Into<Event>,
    {
        self.events.push(event.into())
    }

    pub fn consumer(&self) -> EventConsumer {
        EventConsumer::new(self.events.clone(), Worker::new_fifo())
    }
}
