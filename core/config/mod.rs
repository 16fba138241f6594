use crate::context::Params;
use crate::events::{Logger, TracingLogger};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::*;

/// A collection of flags and options that affect how the engine runs a build.
///
#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate", error = "ConfigError"))]
pub struct Config {
    /// The maximum number of commands running at the same time.
    #[builder(default = "self.default_jobs()")]
    jobs: usize,

    /// Stop starting new work as soon as anything fails.
    #[builder(default = "false")]
    fail_fast: bool,

    /// Forward the output of commands to the logger while they run.
    #[builder(default = "false")]
    echo_output: bool,

    /// The shell used to run shell commands, as `<shell> -c <script>`.
    #[builder(setter(into), default = "self.default_shell()")]
    shell: PathBuf,

    /// Options visible to every node, unless a node sets them itself.
    #[builder(default)]
    overrides: Params,

    /// The time at which this configuration was created. We will use this to compute the total
    /// build time.
    #[builder(default = "self.default_created_at()")]
    created_at: Instant,

    #[builder(setter(custom), default = "self.default_logger()")]
    logger: Arc<dyn Logger>,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build().unwrap()
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Never less than one.
    pub fn jobs(&self) -> usize {
        self.jobs.max(1)
    }

    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    pub fn echo_output(&self) -> bool {
        self.echo_output
    }

    pub fn shell(&self) -> &Path {
        &self.shell
    }

    pub fn overrides(&self) -> &Params {
        &self.overrides
    }

    pub fn overrides_mut(&mut self) -> &mut Params {
        &mut self.overrides
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }
}

impl ConfigBuilder {
    pub fn logger<L: Logger + 'static>(&mut self, logger: L) -> &mut Self {
        self.logger = Some(Arc::new(logger));
        self
    }

    pub fn shared_logger(&mut self, logger: Arc<dyn Logger>) -> &mut Self {
        self.logger = Some(logger);
        self
    }

    fn default_jobs(&self) -> usize {
        num_cpus::get()
    }

    fn default_shell(&self) -> PathBuf {
        PathBuf::from("/bin/sh")
    }

    fn default_created_at(&self) -> Instant {
        Instant::now()
    }

    fn default_logger(&self) -> Arc<dyn Logger> {
        Arc::new(TracingLogger)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match &self.shell {
            Some(shell) if shell.as_os_str().is_empty() => Err(ConfigError::EmptyShell),
            _ => Ok(()),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("The shell used to run commands cannot be empty")]
    EmptyShell,

    #[error("Attempted to build a Config struct while missing fields: {0:?}")]
    BuilderError(derive_builder::UninitializedFieldError),
}

impl From<derive_builder::UninitializedFieldError> for ConfigError {
    fn from(err: derive_builder::UninitializedFieldError) -> Self {
        Self::BuilderError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventChannel;

    #[test]
    fn defaults_run_one_job_per_cpu() {
        let config = Config::default();
        assert_eq!(config.jobs(), num_cpus::get().max(1));
        assert!(!config.fail_fast());
        assert!(!config.echo_output());
        assert_eq!(config.shell(), Path::new("/bin/sh"));
        assert!(config.overrides().is_empty());
    }

    #[test]
    fn zero_jobs_means_one() {
        let config = Config::builder().jobs(0).build().unwrap();
        assert_eq!(config.jobs(), 1);
    }

    #[test]
    fn an_empty_shell_is_rejected() {
        assert_matches!(
            Config::builder().shell("").build(),
            Err(ConfigError::EmptyShell)
        );
    }

    #[test]
    fn overrides_and_logger_can_be_set() {
        let config = Config::builder()
            .overrides(Params::new().with("cc", "clang"))
            .logger(EventChannel::new())
            .build()
            .unwrap();
        assert_eq!(config.overrides().get("cc").and_then(|v| v.as_str()), Some("clang"));
    }
}
