use super::*;
use crate::capture::{OutputLine, OutputReader, OutputSink, StreamKind};
use crate::context::{render, ContextError, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};

/// Decides whether an unsuccessful command counts as a failure.
///
/// The policy is only consulted when the command exited with a non-zero code, was killed by a
/// signal, or could not be started at all.
///
#[derive(Clone)]
pub enum FailurePolicy {
    Fail(bool),
    Decide(Arc<dyn Fn(&Command) -> bool + Send + Sync>),
}

impl FailurePolicy {
    pub fn decide<F>(f: F) -> Self
    where
        F: Fn(&Command) -> bool + Send + Sync + 'static,
    {
        FailurePolicy::Decide(Arc::new(f))
    }

    pub fn fails(&self, command: &Command) -> bool {
        match self {
            FailurePolicy::Fail(fail) => *fail,
            FailurePolicy::Decide(decide) => decide(command),
        }
    }
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::Fail(true)
    }
}

impl From<bool> for FailurePolicy {
    fn from(value: bool) -> Self {
        FailurePolicy::Fail(value)
    }
}

impl std::fmt::Debug for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::Fail(fail) => f.debug_tuple("Fail").field(fail).finish(),
            FailurePolicy::Decide(_) => f.write_str("Decide(<fn>)"),
        }
    }
}

/// An external program to run, and everything it printed once it has run.
///
#[derive(Builder, Debug)]
#[builder(
    pattern = "owned",
    build_fn(validate = "Self::validate", error = "ProcessError")
)]
pub struct Command {
    /// The program and its arguments. For shell commands, the script.
    #[builder(setter(custom))]
    args: Vec<String>,

    /// A progress message. `{name}` placeholders are filled in from the active contexts when the
    /// command is handed to the engine.
    #[builder(setter(into, strip_option), default)]
    message: Option<String>,

    #[builder(setter(into), default)]
    policy: FailurePolicy,

    /// Run the arguments as a script through the configured shell.
    #[builder(default)]
    use_shell: bool,

    #[builder(setter(into, strip_option), default)]
    cwd: Option<PathBuf>,

    #[builder(setter(custom), default)]
    env: BTreeMap<String, String>,

    /// Forward output to the logger as it arrives. Defaults to the engine configuration.
    #[builder(setter(strip_option), default)]
    echo: Option<bool>,

    #[builder(setter(skip))]
    output: Vec<OutputLine>,

    #[builder(setter(skip))]
    outcome: Option<ExitOutcome>,

    #[builder(setter(skip))]
    sink: Option<OutputSink>,
}

impl CommandBuilder {
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.get_or_insert_with(Vec::new).push(arg.into());
        self
    }

    pub fn env<K, V>(mut self, name: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    fn validate(&self) -> Result<(), ProcessError> {
        match &self.args {
            Some(args) if !args.is_empty() => Ok(()),
            _ => Err(ProcessError::EmptyCommand),
        }
    }
}

impl Command {
    pub fn builder() -> CommandBuilder {
        CommandBuilder::default()
    }

    /// A program with its arguments, run directly.
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            message: None,
            policy: FailurePolicy::default(),
            use_shell: false,
            cwd: None,
            env: BTreeMap::new(),
            echo: None,
            output: vec![],
            outcome: None,
            sink: None,
        }
    }

    /// A script, run through the configured shell.
    pub fn shell<S: Into<String>>(script: S) -> Self {
        let mut command = Self::new([script]);
        command.use_shell = true;
        command
    }

    pub fn with_policy<P: Into<FailurePolicy>>(mut self, policy: P) -> Self {
        self.policy = policy.into();
        self
    }

    pub fn with_message<S: Into<String>>(mut self, message: S) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn policy(&self) -> &FailurePolicy {
        &self.policy
    }

    pub fn use_shell(&self) -> bool {
        self.use_shell
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// How the command ended, once it has.
    pub fn outcome(&self) -> Option<ExitOutcome> {
        self.outcome
    }

    /// Everything the command printed, in the order it was read.
    pub fn output(&self) -> &[OutputLine] {
        &self.output
    }

    pub fn stdout_lines(&self) -> impl Iterator<Item = &str> {
        self.lines_from(StreamKind::Stdout)
    }

    pub fn stderr_lines(&self) -> impl Iterator<Item = &str> {
        self.lines_from(StreamKind::Stderr)
    }

    fn lines_from(&self, stream: StreamKind) -> impl Iterator<Item = &str> {
        self.output
            .iter()
            .filter(move |line| line.stream() == stream)
            .map(OutputLine::text)
    }

    /// The shell equivalent of this command, including its working directory and environment.
    ///
    pub fn command_line(&self) -> String {
        let mut parts = vec![];
        if let Some(cwd) = &self.cwd {
            parts.push(format!("cd {} &&", quote(&cwd.to_string_lossy())));
        }
        for (name, value) in &self.env {
            parts.push(format!("{}={}", name, quote(value)));
        }
        if self.use_shell {
            parts.push(self.args.join(" "));
        } else {
            parts.push(join(&self.args));
        }
        parts.join(" ")
    }

    /// Fill in the placeholders of the message template.
    pub fn render_message<F>(&mut self, resolve: F) -> Result<(), ContextError>
    where
        F: Fn(&str) -> Option<Value>,
    {
        if let Some(template) = &self.message {
            self.message = Some(render(template, resolve)?);
        }
        Ok(())
    }

    pub(crate) fn spawn(
        &mut self,
        reader: &OutputReader,
        config: &Config,
        logger: &Arc<dyn Logger>,
    ) -> Result<Child, ProcessError> {
        if self.args.is_empty() {
            return Err(ProcessError::EmptyCommand);
        }

        let echo = self
            .echo
            .unwrap_or_else(|| config.echo_output())
            .then(|| logger.clone());
        let mut sink = OutputSink::open(reader, echo).map_err(|source| ProcessError::Capture {
            command: self.command_line(),
            source,
        })?;

        let mut cmd = if self.use_shell {
            let mut cmd = std::process::Command::new(config.shell());
            cmd.arg("-c").arg(self.args.join(" "));
            cmd
        } else {
            let mut cmd = std::process::Command::new(&self.args[0]);
            cmd.args(&self.args[1..]);
            cmd
        };
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd.envs(&self.env)
            .stdin(Stdio::null())
            .stdout(sink.stdout())
            .stderr(sink.stderr());

        let spawned = cmd.spawn();
        // The command holds the write ends of both pipes.
        drop(cmd);

        match spawned {
            Ok(child) => {
                self.sink = Some(sink);
                Ok(child)
            }
            Err(source) => {
                sink.close(reader);
                Err(ProcessError::FailedToStart {
                    command: self.command_line(),
                    source,
                })
            }
        }
    }

    /// Collect the output of a command that exited. Returns whether the exit counts as a failure.
    ///
    pub(crate) fn finish(&mut self, outcome: ExitOutcome, reader: &OutputReader) -> bool {
        self.outcome = Some(outcome);
        self.abandon(reader);
        !outcome.success() && self.policy.fails(self)
    }

    /// Returns whether failing to start counts as a failure.
    pub(crate) fn start_failed(&mut self) -> bool {
        self.policy.fails(self)
    }

    pub(crate) fn abandon(&mut self, reader: &OutputReader) {
        if let Some(sink) = self.sink.take() {
            self.output = sink.close(reader);
        }
    }
}
