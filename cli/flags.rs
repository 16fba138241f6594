use forge_core::ConfigBuilder;
use structopt::StructOpt;

#[derive(Default, Debug, Clone, Copy, StructOpt)]
pub struct Flags {
    #[structopt(
        help = r"The maximum number of commands to run at the same time. Defaults to the number of CPUs.",
        short = "j",
        long = "jobs"
    )]
    pub(crate) jobs: Option<usize>,

    #[structopt(
        help = r"Keep going after a failure, building everything that does not depend on it.",
        short = "k",
        long = "keep-going"
    )]
    pub(crate) keep_going: bool,

    #[structopt(
        help = r"Print the output of commands while they run, instead of only when they fail.",
        long = "echo"
    )]
    pub(crate) echo: bool,
}

impl From<Flags> for ConfigBuilder {
    fn from(flags: Flags) -> Self {
        let mut config = ConfigBuilder::default();

        config.fail_fast(!flags.keep_going).echo_output(flags.echo);

        if let Some(jobs) = flags.jobs {
            config.jobs(jobs);
        }

        config
    }
}
