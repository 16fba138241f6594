use crate::flows::BUILTIN;
use structopt::StructOpt;

#[derive(StructOpt, Debug, Clone)]
#[structopt(
    name = "flows",
    setting = structopt::clap::AppSettings::ColoredHelp,
    about = "List the flows that can be made"
)]
pub struct FlowsCommand {}

impl FlowsCommand {
    pub fn run(self) -> Result<(), anyhow::Error> {
        for (name, about) in BUILTIN {
            println!("{:>8}  {}", name, about);
        }
        Ok(())
    }
}
