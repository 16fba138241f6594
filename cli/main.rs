mod commands;
pub mod flags;
mod flows;
mod reporter;

use commands::*;
use structopt::StructOpt;
use tracing::{error, log};

#[derive(StructOpt, Debug, Clone)]
#[structopt(
    name = "forge",
    setting = structopt::clap::AppSettings::ColoredHelp,
    about = "Run build flows and the commands they depend on"
)]
struct Forge {
    #[structopt(subcommand, help = "the command to run")]
    cmd: Command,
}

impl Forge {
    fn run(self) -> Result<(), anyhow::Error> {
        human_panic::setup_panic!(Metadata {
            name: "forge".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            authors: "The Forge developers".into(),
            homepage: "".into(),
        });

        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .format_timestamp_micros()
            .format_module_path(false)
            .parse_env("FORGE_LOG")
            .try_init()?;

        let result = self.cmd.run();

        if let Err(ref err) = result {
            error!("{:?}", &err);
        };

        result
    }
}

#[derive(StructOpt, Debug, Clone)]
enum Command {
    Make(MakeCommand),
    Flows(FlowsCommand),
}

impl Command {
    fn run(self) -> Result<(), anyhow::Error> {
        match self {
            Command::Make(x) => x.run(),
            Command::Flows(x) => x.run(),
        }
    }
}

fn main() -> Result<(), anyhow::Error> {
    Forge::from_args().run()
}
