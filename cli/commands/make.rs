use crate::flags::Flags;
use crate::flows;
use crate::reporter::{self, ConsoleReporter};
use forge_core::{ConfigBuilder, Engine, Params, Value};
use std::str::FromStr;
use structopt::StructOpt;

#[derive(StructOpt, Debug, Clone)]
#[structopt(
    name = "make",
    setting = structopt::clap::AppSettings::ColoredHelp,
    about = "Make a goal, and everything it depends on"
)]
pub struct MakeCommand {
    #[structopt(help = r"The flow to make. See `forge flows` for the ones available.")]
    goal: String,

    #[structopt(help = r"Parameters for the goal, as key=value pairs.

Example: forge make sh cmd='cc -c main.c' target=main.o inputs=main.c
")]
    params: Vec<Param>,

    #[structopt(flatten)]
    flags: Flags,
}

impl MakeCommand {
    pub fn run(self) -> Result<(), anyhow::Error> {
        let config = ConfigBuilder::from(self.flags)
            .logger(ConsoleReporter::new())
            .build()?;
        let mut engine = Engine::new(config)?;
        flows::register_all(&mut engine)?;

        let params: Params = self
            .params
            .into_iter()
            .map(|param| (param.name, param.value))
            .collect();
        let goal = engine.invoke(&self.goal, params)?;
        let failures = engine.make(goal);

        if failures.is_empty() {
            return Ok(());
        }

        reporter::print_failures(&engine, &failures);
        Err(anyhow::anyhow!(
            "Could not make {} ({} failures)",
            engine.node(goal).label(),
            failures.len()
        ))
    }
}

/// A `key=value` goal parameter.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    name: String,
    value: Value,
}

impl FromStr for Param {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| format!("Expected a key=value parameter, found {:?}", s))?;
        if name.is_empty() {
            return Err(format!("Parameter {:?} has no name", s));
        }
        let value = match value {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            other => other
                .parse::<i64>()
                .map(Value::Int)
                .unwrap_or_else(|_| Value::from(other)),
        };
        Ok(Self {
            name: name.to_string(),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_are_split_on_the_first_equals_sign() {
        assert_eq!(
            "cmd=a=b".parse::<Param>(),
            Ok(Param {
                name: "cmd".to_string(),
                value: Value::from("a=b")
            })
        );
    }

    #[test]
    fn params_values_are_typed() {
        assert_eq!("jobs=4".parse::<Param>().unwrap().value, Value::Int(4));
        assert_eq!("fast=true".parse::<Param>().unwrap().value, Value::Bool(true));
        assert_eq!(
            "cmd=exit 3".parse::<Param>().unwrap().value,
            Value::from("exit 3")
        );
    }

    #[test]
    fn params_need_a_name_and_a_value() {
        assert!("cmd".parse::<Param>().is_err());
        assert!("=x".parse::<Param>().is_err());
    }
}
