//! None of these events include references to engine data. They are self-contained, so they can
//! outlive the engine or cross a thread boundary.

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum GoalEvent {
    GoalStarted { goal: String },
    GoalCompleted { goal: String },
    GoalFailed { goal: String, failures: Vec<String> },
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeEvent {
    NodeStarted { node: String },
    NodeCompleted { node: String },
    NodeFailed { node: String, error: String },
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProcessEvent {
    ProcessStarted {
        command: String,
        message: Option<String>,
    },
    ProcessCompleted {
        command: String,
    },
    ProcessFailed {
        command: String,
        error: String,
    },
}

/// Raw bytes, as they were read from a command.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum OutputEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

#[derive(Default, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Event {
    /// The "nothing happened" event.
    #[default]
    Noop,
    GoalEvent(GoalEvent),
    NodeEvent(NodeEvent),
    ProcessEvent(ProcessEvent),
    OutputEvent(OutputEvent),
}

impl From<GoalEvent> for Event {
    fn from(value: GoalEvent) -> Self {
        Event::GoalEvent(value)
    }
}

impl From<NodeEvent> for Event {
    fn from(value: NodeEvent) -> Self {
        Event::NodeEvent(value)
    }
}

impl From<ProcessEvent> for Event {
    fn from(value: ProcessEvent) -> Self {
        Event::ProcessEvent(value)
    }
}

impl From<OutputEvent> for Event {
    fn from(value: OutputEvent) -> Self {
        Event::OutputEvent(value)
    }
}
