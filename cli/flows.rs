//! The flows the command line can make.

use anyhow::anyhow;
use forge_core::flow::{Artifact, FlowError, Predicate};
use forge_core::{routine, Command, Engine, FlowGroup, Routine, Step, StepContext, Value, Variant};

pub const BUILTIN: &[(&str, &str)] = &[(
    "sh",
    "Run `cmd` through the shell. With `target`, only when it is missing or older than `inputs`.",
)];

pub fn register_all(engine: &mut Engine) -> Result<(), FlowError> {
    engine.register(sh())?;
    Ok(())
}

fn sh() -> FlowGroup {
    FlowGroup::new("sh")
        .with_variant(
            Variant::new(1, || routine(skip_when_up_to_date))
                .when("target", Predicate::test(|_| true)),
        )
        .with_variant(Variant::new(0, RunShell::default))
}

/// Declines, handing over to `RunShell`, unless the target is newer than all of its inputs.
fn skip_when_up_to_date(cx: &mut StepContext<'_>) -> anyhow::Result<Step> {
    let target = cx
        .param("target")
        .map(Value::to_string)
        .ok_or_else(|| anyhow!("sh needs a `target` parameter"))?;

    let inputs: Vec<Artifact> = match cx.param("inputs") {
        Some(Value::List(inputs)) => inputs
            .iter()
            .map(|input| Artifact::file(input.to_string()))
            .collect(),
        Some(inputs) => inputs
            .to_string()
            .split_whitespace()
            .map(Artifact::file)
            .collect(),
        None => vec![],
    };

    if Artifact::file(&target).needs_update(&inputs) {
        cx.declare_target(target);
        Ok(Step::Declined)
    } else {
        Ok(Step::Done)
    }
}

#[derive(Default)]
struct RunShell {
    started: bool,
}

impl Routine for RunShell {
    fn step(&mut self, cx: &mut StepContext<'_>) -> anyhow::Result<Step> {
        if self.started {
            return Ok(Step::Done);
        }
        let script = cx
            .param("cmd")
            .map(Value::to_string)
            .ok_or_else(|| anyhow!("sh needs a `cmd` parameter"))?;

        self.started = true;
        let command = cx.spawn(Command::shell(script).with_message("Running {cmd}"))?;
        Ok(Step::blocked_on([command]))
    }
}
