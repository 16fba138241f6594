use forge_core::flow::Node;
use forge_core::process::Process;
use forge_core::{Engine, Failure, Logger};
use std::io::Write;
use std::time::Instant;
use tracing::trace;

/// Prints progress to stderr, and echoed command output as-is.
///
#[derive(Debug)]
pub struct ConsoleReporter {
    started: Instant,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger for ConsoleReporter {
    fn goal_started(&self, goal: &Node) {
        eprintln!("{:>12} {}", "Making", goal.label());
    }

    fn goal_completed(&self, goal: &Node) {
        eprintln!(
            "{:>12} {} in {:.2}s",
            "Finished",
            goal.label(),
            self.started.elapsed().as_secs_f64()
        );
    }

    fn process_started(&self, process: &Process) {
        let what = process
            .message()
            .map(str::to_string)
            .unwrap_or_else(|| process.command_line());
        eprintln!("{:>12} {}", "Running", what);
    }

    fn process_failed(&self, process: &Process) {
        eprintln!("{:>12} {}", "Failed", process.command_line());
    }

    fn stdout(&self, bytes: &[u8]) {
        if let Err(err) = std::io::stdout().lock().write_all(bytes) {
            trace!("Could not echo {} bytes of stdout: {}", bytes.len(), err);
        }
    }

    fn stderr(&self, bytes: &[u8]) {
        if let Err(err) = std::io::stderr().lock().write_all(bytes) {
            trace!("Could not echo {} bytes of stderr: {}", bytes.len(), err);
        }
    }
}

pub fn print_failures(engine: &Engine, failures: &[Failure]) {
    eprintln!();
    for failure in failures {
        match failure {
            Failure::Command(id) => {
                let process = engine.process(*id);
                match process.error() {
                    Some(err) => eprintln!("{:>12} {}", "Error", err),
                    None => eprintln!("{:>12} {}", "Error", process.command_line()),
                }
                for line in process.command().into_iter().flat_map(|cmd| cmd.output()) {
                    eprintln!("{:>12} {}", "|", line);
                }
            }
            Failure::Node(id) => {
                let node = engine.node(*id);
                match node.error() {
                    Some(err) => eprintln!("{:>12} {}: {:#}", "Error", node.label(), err),
                    None => eprintln!("{:>12} {} failed", "Error", node.label()),
                }
            }
            other => eprintln!("{:>12} {}", "Error", other),
        }
    }
}
