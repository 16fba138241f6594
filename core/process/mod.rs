//! # External processes
//!
//! A `Process` wraps one invocation of an external program through its lifecycle:
//!
//! ```text
//!   Pending --start--> Running --exited--> Completed | Failed
//!      |
//!      +--failed to start--> Failed (or Completed, if the command tolerates failure)
//! ```
//!
//! Most processes are `Command`s, which add a failure policy and captured output on top of the
//! base lifecycle.
//!
mod command;
mod quote;

pub use command::*;
pub use quote::*;

use crate::capture::{CaptureError, OutputReader};
use crate::events::Logger;
use std::sync::Arc;
use crate::Config;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::fmt;
use std::process::Child;
use thiserror::*;
use tracing::*;

/// A handle to a `Process` owned by an `Engine`.
///
#[derive(Copy, Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ProcessId(pub(crate) usize);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Process({})", self.0)
    }
}

#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum ProcessState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// How a process that ran ended.
///
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum ExitOutcome {
    Exited(i32),
    Signaled(Signal),
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        matches!(self, ExitOutcome::Exited(0))
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitOutcome::Exited(code) => Some(*code),
            ExitOutcome::Signaled(_) => None,
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Exited(code) => write!(f, "exit code {}", code),
            ExitOutcome::Signaled(signal) => write!(f, "signal {:?}", signal),
        }
    }
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Command failed with {outcome}: {command}")]
    CommandFailed {
        command: String,
        outcome: ExitOutcome,
    },

    #[error("Could not start {command}: {source}")]
    FailedToStart {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not capture the output of {command}: {source}")]
    Capture {
        command: String,
        #[source]
        source: CaptureError,
    },

    #[error("Cannot run a command without arguments")]
    EmptyCommand,

    #[error("Lost track of {command} before it exited")]
    Lost { command: String },

    #[error("{0} was already started")]
    AlreadyStarted(String),
}

impl From<derive_builder::UninitializedFieldError> for ProcessError {
    fn from(_: derive_builder::UninitializedFieldError) -> Self {
        ProcessError::EmptyCommand
    }
}

type StartAction = Box<dyn FnOnce() -> std::io::Result<Child>>;

pub(crate) enum ProcessKind {
    /// A process started by an arbitrary action. It completes whenever it exits.
    Spawn {
        description: String,
        start: Option<StartAction>,
    },

    Command(Command),
}

pub struct Process {
    id: ProcessId,
    state: ProcessState,
    kind: ProcessKind,
    pid: Option<Pid>,
    child: Option<Child>,
    error: Option<ProcessError>,
    outcome: Option<ExitOutcome>,
}

impl Process {
    pub(crate) fn new(id: ProcessId, kind: ProcessKind) -> Self {
        Self {
            id,
            state: ProcessState::Pending,
            kind,
            pid: None,
            child: None,
            error: None,
            outcome: None,
        }
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn error(&self) -> Option<&ProcessError> {
        self.error.as_ref()
    }

    pub fn outcome(&self) -> Option<ExitOutcome> {
        self.outcome
    }

    pub fn pid(&self) -> Option<Pid> {
        self.pid
    }

    pub fn command(&self) -> Option<&Command> {
        match &self.kind {
            ProcessKind::Command(command) => Some(command),
            ProcessKind::Spawn { .. } => None,
        }
    }

    /// What to show when talking about this process.
    pub fn command_line(&self) -> String {
        match &self.kind {
            ProcessKind::Command(command) => command.command_line(),
            ProcessKind::Spawn { description, .. } => description.clone(),
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.command().and_then(Command::message)
    }

    /// Start the process.
    ///
    /// If it cannot be started it never enters `Running`, and goes through `failed_to_start`
    /// instead.
    ///
    pub(crate) fn start(
        &mut self,
        reader: &OutputReader,
        config: &Config,
        logger: &Arc<dyn Logger>,
    ) -> ProcessState {
        if self.state != ProcessState::Pending {
            self.failed_to_start(ProcessError::AlreadyStarted(self.command_line()));
            return self.state;
        }

        let spawned = match &mut self.kind {
            ProcessKind::Command(command) => command.spawn(reader, config, logger),
            ProcessKind::Spawn { description, start } => match start.take() {
                Some(start) => start().map_err(|source| ProcessError::FailedToStart {
                    command: description.clone(),
                    source,
                }),
                None => Err(ProcessError::AlreadyStarted(description.clone())),
            },
        };

        match spawned {
            Ok(child) => {
                let pid = Pid::from_raw(child.id() as i32);
                debug!("Started {} as {}", self.command_line(), pid);
                self.pid = Some(pid);
                self.child = Some(child);
                self.state = ProcessState::Running;
            }
            Err(err) => {
                self.failed_to_start(err);
            }
        }
        self.state
    }

    /// Record that the process exited. A plain process always completes; a command consults its
    /// failure policy.
    ///
    pub(crate) fn exited(&mut self, outcome: ExitOutcome, reader: &OutputReader) -> ProcessState {
        self.outcome = Some(outcome);
        self.child = None;
        self.state = ProcessState::Completed;

        if let ProcessKind::Command(command) = &mut self.kind {
            if command.finish(outcome, reader) {
                self.state = ProcessState::Failed;
                self.error = Some(ProcessError::CommandFailed {
                    command: command.command_line(),
                    outcome,
                });
            }
        }
        self.state
    }

    pub(crate) fn failed_to_start(&mut self, error: ProcessError) -> ProcessState {
        debug!("{} did not start: {}", self.command_line(), error);
        let tolerated = match &mut self.kind {
            ProcessKind::Command(command) => !command.start_failed(),
            ProcessKind::Spawn { .. } => false,
        };
        if tolerated {
            self.state = ProcessState::Completed;
        } else {
            self.state = ProcessState::Failed;
            self.error = Some(error);
        }
        self.state
    }

    /// The exit of this process can no longer be observed.
    pub(crate) fn lost(&mut self, reader: &OutputReader) -> ProcessState {
        if let ProcessKind::Command(command) = &mut self.kind {
            command.abandon(reader);
        }
        self.child = None;
        self.state = ProcessState::Failed;
        self.error = Some(ProcessError::Lost {
            command: self.command_line(),
        });
        self.state
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("command_line", &self.command_line())
            .field("pid", &self.pid)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}
