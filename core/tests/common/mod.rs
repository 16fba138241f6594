#![allow(dead_code)]

use forge_core::events::{Event, EventChannel, ProcessEvent};
use forge_core::{
    routine, Config, Dependency, Engine, FlowGroup, Routine, Step, StepContext, Variant,
};
use std::sync::{Mutex, MutexGuard, PoisonError};

static EXCLUSIVE: Mutex<()> = Mutex::new(());

/// `make` reaps any child with `waitpid(-1)` and swaps signal handlers, so builds in the same
/// test binary cannot overlap.
pub fn exclusive() -> MutexGuard<'static, ()> {
    EXCLUSIVE.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn engine(jobs: usize) -> Engine {
    Engine::new(Config::builder().jobs(jobs).build().unwrap()).unwrap()
}

/// An engine reporting to a channel, and the channel.
pub fn observed(config: &mut forge_core::ConfigBuilder) -> (Engine, EventChannel) {
    let channel = EventChannel::new();
    let config = config.logger(channel.clone()).build().unwrap();
    (Engine::new(config).unwrap(), channel)
}

pub fn flow<F, R>(name: &str, factory: F) -> FlowGroup
where
    F: Fn() -> R + 'static,
    R: Routine + 'static,
{
    FlowGroup::new(name).with_variant(Variant::new(0, factory))
}

/// A routine that blocks once on whatever `first` returns, and is done when resumed.
pub fn once<F>(mut first: F) -> impl Routine
where
    F: FnMut(&mut StepContext<'_>) -> anyhow::Result<Vec<Dependency>> + 'static,
{
    let mut started = false;
    routine(move |cx| {
        if started {
            return Ok(Step::Done);
        }
        started = true;
        Ok(Step::Blocked(first(cx)?))
    })
}

pub fn events(channel: &EventChannel) -> Vec<Event> {
    channel.consumer().drain()
}

pub fn process_events(channel: &EventChannel) -> Vec<ProcessEvent> {
    events(channel)
        .into_iter()
        .filter_map(|event| match event {
            Event::ProcessEvent(event) => Some(event),
            _ => None,
        })
        .collect()
}
