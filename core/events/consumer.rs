use super::event::Event;
use crossbeam::deque::{Injector, Steal, Worker};
use std::sync::Arc;

/// The receiving end of an `EventChannel`.
///
/// Events are moved in batches from the shared queue into a local one by `fetch`; `pop` only
/// looks at the local queue.
///
pub struct EventConsumer {
    shared: Arc<Injector<Event>>,
    local: Worker<Event>,
}

impl EventConsumer {
    pub fn new(shared: Arc<Injector<Event>>, local: Worker<Event>) -> Self {
        Self { shared, local }
    }

    /// Move a batch of events over from the channel. Returns whether there was anything to take.
    pub fn fetch(&self) -> bool {
        loop {
            match self.shared.steal_batch(&self.local) {
                Steal::Success(()) => return true,
                Steal::Empty => return false,
                Steal::Retry => continue,
            }
        }
    }

    pub fn pop(&self) -> Option<Event> {
        self.local.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.fetch();
        self.local.is_empty()
    }

    /// Everything sent so far, in order.
    pub fn drain(&self) -> Vec<Event> {
        self.collect()
    }
}

/// Iterating fetches more events whenever the local queue runs dry, and stops once the channel
/// has nothing left.
impl Iterator for &EventConsumer {
    type Item = Event;

    fn next(&mut self) -> Option<Self::Item> {
        self.pop().or_else(|| {
            self.fetch();
            self.pop()
        })
    }
}
