use forge_core::capture::OutputLine;
use forge_core::events::{Event, OutputEvent, ProcessEvent};
use forge_core::process::ProcessError;
use forge_core::{
    routine, Command, Config, Engine, ExitOutcome, Failure, FailurePolicy, FlowGroup, NodeState,
    Params, ProcessId, ProcessState, Step, Variant,
};
use nix::sys::signal::{raise, Signal};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

mod common;
use common::*;

#[test]
fn a_goal_waits_for_its_commands_and_collects_their_output() {
    let _lock = exclusive();
    let mut engine = engine(2);
    let goal = engine
        .register(flow("G", || {
            once(|cx| {
                let a = cx.spawn(Command::new(["echo", "a"]))?;
                let b = cx.spawn(Command::new(["echo", "b"]))?;
                Ok(vec![a.into(), b.into()])
            })
        }))
        .unwrap();

    let root = engine.call(goal, Params::new()).unwrap();
    assert_eq!(engine.node(root).state(), NodeState::Blocked);

    assert!(engine.make(root).is_empty());
    assert_eq!(engine.node(root).state(), NodeState::Completed);

    let outputs: Vec<Vec<OutputLine>> = engine
        .processes()
        .map(|process| process.command().unwrap().output().to_vec())
        .collect();
    assert_eq!(
        outputs,
        vec![vec![OutputLine::stdout("a")], vec![OutputLine::stdout("b")]]
    );
}

#[test]
fn a_failing_command_fails_the_goal_and_is_the_only_failure() {
    let _lock = exclusive();
    let mut engine = engine(2);
    let goal = engine
        .register(flow("G", || {
            once(|cx| {
                let a = cx.spawn(Command::new(["sh", "-c", "echo a; exit 3"]))?;
                let b = cx.spawn(Command::new(["echo", "b"]))?;
                Ok(vec![a.into(), b.into()])
            })
        }))
        .unwrap();

    let root = engine.call(goal, Params::new()).unwrap();
    let failures = engine.make(root);

    let failed = engine.processes().next().unwrap();
    assert_eq!(failures, vec![Failure::Command(failed.id())]);
    assert_eq!(failed.state(), ProcessState::Failed);
    assert_eq!(failed.outcome(), Some(ExitOutcome::Exited(3)));
    assert!(matches!(
        failed.error(),
        Some(ProcessError::CommandFailed { outcome: ExitOutcome::Exited(3), .. })
    ));
    assert_eq!(failed.command().unwrap().output(), [OutputLine::stdout("a")]);

    let node = engine.node(root);
    assert_eq!(node.state(), NodeState::Failed);
    assert!(node.failed_on_dependency());
    assert!(node.is_closed());
}

fn sleepers(jobs: usize) -> Vec<char> {
    let (mut engine, channel) = observed(Config::builder().jobs(jobs));
    let goal = engine
        .register(flow("sleepers", || {
            once(|cx| {
                let mut sleepers = vec![];
                for _ in 0..3 {
                    sleepers.push(cx.spawn(Command::shell("sleep 0.2"))?.into());
                }
                Ok(sleepers)
            })
        }))
        .unwrap();
    let root = engine.call(goal, Params::new()).unwrap();
    assert!(engine.make(root).is_empty());

    process_events(&channel)
        .into_iter()
        .filter_map(|event| match event {
            ProcessEvent::ProcessStarted { .. } => Some('S'),
            ProcessEvent::ProcessCompleted { .. } => Some('C'),
            ProcessEvent::ProcessFailed { .. } => None,
        })
        .collect()
}

#[test]
fn one_job_runs_commands_one_at_a_time() {
    let _lock = exclusive();
    assert_eq!(sleepers(1), vec!['S', 'C', 'S', 'C', 'S', 'C']);
}

#[test]
fn enough_jobs_run_every_command_at_once() {
    let _lock = exclusive();
    assert_eq!(sleepers(3), vec!['S', 'S', 'S', 'C', 'C', 'C']);
}

fn run_with_policy(policy: FailurePolicy) -> (ProcessState, Vec<Failure>) {
    let mut engine = engine(1);
    let goal = engine
        .register(flow("policy", move || {
            let policy = policy.clone();
            once(move |cx| {
                let command = Command::shell("exit 2").with_policy(policy.clone());
                Ok(vec![cx.spawn(command)?.into()])
            })
        }))
        .unwrap();
    let root = engine.call(goal, Params::new()).unwrap();
    let failures = engine.make(root);
    let state = engine.processes().next().unwrap().state();
    (state, failures)
}

#[test]
fn the_failure_policy_decides_what_a_nonzero_exit_means() {
    let _lock = exclusive();

    let (state, failures) = run_with_policy(FailurePolicy::Fail(true));
    assert_eq!(state, ProcessState::Failed);
    assert_eq!(failures.len(), 1);

    let (state, failures) = run_with_policy(false.into());
    assert_eq!(state, ProcessState::Completed);
    assert!(failures.is_empty());

    let tolerate_two = FailurePolicy::decide(|cmd| cmd.outcome() != Some(ExitOutcome::Exited(2)));
    let (state, failures) = run_with_policy(tolerate_two);
    assert_eq!(state, ProcessState::Completed);
    assert!(failures.is_empty());

    let strict = FailurePolicy::decide(|_| true);
    let (state, _) = run_with_policy(strict);
    assert_eq!(state, ProcessState::Failed);
}

#[test]
fn commands_that_cannot_start_follow_the_policy_too() {
    let _lock = exclusive();
    let config = Config::builder().jobs(2).fail_fast(false).build().unwrap();
    let mut engine = Engine::new(config).unwrap();
    let goal = engine
        .register(flow("missing", || {
            once(|cx| {
                let strict = cx.spawn(Command::new(["/nonexistent/forge-tool"]))?;
                let lenient =
                    cx.spawn(Command::new(["/nonexistent/forge-tool", "-v"]).with_policy(false))?;
                Ok(vec![strict.into(), lenient.into()])
            })
        }))
        .unwrap();
    let root = engine.call(goal, Params::new()).unwrap();
    let failures = engine.make(root);

    let processes: Vec<_> = engine.processes().collect();
    assert_eq!(failures, vec![Failure::Command(processes[0].id())]);
    assert_eq!(processes[0].state(), ProcessState::Failed);
    assert!(matches!(
        processes[0].error(),
        Some(ProcessError::FailedToStart { .. })
    ));
    assert_eq!(processes[0].pid(), None);
    assert_eq!(processes[1].state(), ProcessState::Completed);
    assert!(processes[1].command().unwrap().output().is_empty());
}

#[test]
fn output_is_split_into_lines_tagged_by_stream() {
    let _lock = exclusive();
    let mut engine = engine(1);
    let goal = engine
        .register(flow("noisy", || {
            once(|cx| {
                let script = "echo out; echo err >&2; printf 'no newline'";
                Ok(vec![cx.spawn(Command::shell(script))?.into()])
            })
        }))
        .unwrap();
    let root = engine.call(goal, Params::new()).unwrap();
    assert!(engine.make(root).is_empty());

    let command = engine.processes().next().unwrap().command().unwrap();
    assert_eq!(
        command.stdout_lines().collect::<Vec<_>>(),
        vec!["out", "no newline"]
    );
    assert_eq!(command.stderr_lines().collect::<Vec<_>>(), vec!["err"]);
}

#[test]
fn echoed_output_reaches_the_logger_as_it_is_read() {
    let _lock = exclusive();
    let (mut engine, channel) = observed(Config::builder().jobs(1).echo_output(true));
    let goal = engine
        .register(flow("echo", || {
            once(|cx| Ok(vec![cx.spawn(Command::new(["echo", "hello"]))?.into()]))
        }))
        .unwrap();
    let root = engine.call(goal, Params::new()).unwrap();
    assert!(engine.make(root).is_empty());

    let stdout: Vec<u8> = events(&channel)
        .into_iter()
        .filter_map(|event| match event {
            Event::OutputEvent(OutputEvent::Stdout(bytes)) => Some(bytes),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(stdout, b"hello\n");
}

#[test]
fn messages_are_rendered_against_the_node_parameters() {
    let _lock = exclusive();
    let (mut engine, channel) = observed(&mut Config::builder());
    let goal = engine
        .register(flow("compile", || {
            once(|cx| {
                let command = Command::new(["true"]).with_message("Compiling {source}");
                Ok(vec![cx.spawn(command)?.into()])
            })
        }))
        .unwrap();
    let root = engine
        .call(goal, Params::new().with("source", "main.c"))
        .unwrap();
    assert!(engine.make(root).is_empty());

    assert!(process_events(&channel).contains(&ProcessEvent::ProcessStarted {
        command: "true".to_string(),
        message: Some("Compiling main.c".to_string()),
    }));
}

#[test]
fn nodes_resume_once_the_nodes_they_wait_on_complete() {
    let _lock = exclusive();
    let mut engine = engine(2);
    engine
        .register(flow("lib", || {
            once(|cx| Ok(vec![cx.spawn(Command::shell("sleep 0.1"))?.into()]))
        }))
        .unwrap();
    let app = engine
        .register(flow("app", || {
            let mut lib = None;
            routine(move |cx| match lib {
                None => {
                    let id = cx.invoke("lib", Params::new())?;
                    lib = Some(id);
                    Ok(Step::blocked_on([id]))
                }
                Some(id) => {
                    anyhow::ensure!(
                        cx.node(id).state() == NodeState::Completed,
                        "resumed before lib was built"
                    );
                    Ok(Step::Done)
                }
            })
        }))
        .unwrap();

    let root = engine.call(app, Params::new()).unwrap();
    assert!(engine.make(root).is_empty());
    assert!(engine.nodes().all(|node| node.state() == NodeState::Completed));
}

#[test]
fn failures_propagate_through_waiting_nodes() {
    let _lock = exclusive();
    let mut engine = engine(2);
    engine
        .register(flow("lib", || {
            once(|cx| Ok(vec![cx.spawn(Command::shell("exit 1"))?.into()]))
        }))
        .unwrap();
    let app = engine
        .register(flow("app", || {
            once(|cx| Ok(vec![cx.invoke("lib", Params::new())?.into()]))
        }))
        .unwrap();

    let root = engine.call(app, Params::new()).unwrap();
    let failures = engine.make(root);

    let command = engine.processes().next().unwrap().id();
    assert_eq!(failures, vec![Failure::Command(command)]);
    assert!(engine
        .nodes()
        .all(|node| node.state() == NodeState::Failed && node.failed_on_dependency()));
}

#[test]
fn nodes_waiting_on_each_other_are_a_circular_dependency() {
    let _lock = exclusive();
    let mut engine = engine(1);
    let a = engine
        .register(flow("a", || {
            once(|cx| Ok(vec![cx.invoke("b", Params::new())?.into()]))
        }))
        .unwrap();
    engine
        .register(flow("b", || {
            once(|cx| Ok(vec![cx.invoke("a", Params::new())?.into()]))
        }))
        .unwrap();

    let root = engine.call(a, Params::new()).unwrap();
    assert_eq!(
        engine.make(root),
        vec![Failure::CircularDependency {
            blocked: vec!["a()".to_string(), "b()".to_string()]
        }]
    );
    assert!(engine.nodes().all(|node| node.is_closed()));
}

#[test]
fn making_a_failed_goal_again_reports_what_failed_it() {
    let _lock = exclusive();
    let mut engine = engine(1);
    engine
        .register(flow("lib", || {
            once(|cx| Ok(vec![cx.spawn(Command::shell("exit 1"))?.into()]))
        }))
        .unwrap();
    let app = engine
        .register(flow("app", || {
            once(|cx| Ok(vec![cx.invoke("lib", Params::new())?.into()]))
        }))
        .unwrap();
    let tests = engine
        .register(flow("tests", || {
            once(|cx| Ok(vec![cx.invoke("lib", Params::new())?.into()]))
        }))
        .unwrap();

    let root = engine.call(app, Params::new()).unwrap();
    let first = engine.make(root);
    let command = engine.processes().next().unwrap().id();
    assert_eq!(first, vec![Failure::Command(command)]);
    assert_eq!(engine.make(root), first);

    let other = engine.call(tests, Params::new()).unwrap();
    assert_eq!(engine.make(other), first);
    assert!(engine.node(other).failed_on_dependency());
}

#[test]
fn waiting_on_a_command_that_already_failed_reports_it() {
    let _lock = exclusive();
    let mut engine = engine(1);
    let failed: Rc<Cell<Option<ProcessId>>> = Rc::new(Cell::new(None));

    let spawned = failed.clone();
    let first = engine
        .register(flow("first", move || {
            let spawned = spawned.clone();
            once(move |cx| {
                let id = cx.spawn(Command::shell("exit 1"))?;
                spawned.set(Some(id));
                Ok(vec![id.into()])
            })
        }))
        .unwrap();
    let awaited = failed.clone();
    let second = engine
        .register(flow("second", move || {
            let awaited = awaited.clone();
            once(move |_| Ok(awaited.get().into_iter().map(Into::into).collect()))
        }))
        .unwrap();

    let root = engine.call(first, Params::new()).unwrap();
    assert_eq!(engine.make(root).len(), 1);
    let command = failed.get().unwrap();

    let root = engine.call(second, Params::new()).unwrap();
    assert_eq!(engine.make(root), vec![Failure::Command(command)]);
    assert_eq!(engine.node(root).state(), NodeState::Failed);
}

#[test]
fn commands_reaped_behind_the_schedulers_back_are_lost() {
    let _lock = exclusive();
    let mut engine = engine(1);
    let goal = engine
        .register(flow("reaped", || {
            once(|cx| {
                let id = cx.spawn_with("true", || {
                    let mut child = std::process::Command::new("true").spawn()?;
                    child.wait()?;
                    Ok(child)
                });
                Ok(vec![id.into()])
            })
        }))
        .unwrap();
    let root = engine.call(goal, Params::new()).unwrap();
    let failures = engine.make(root);

    let process = engine.processes().next().unwrap();
    assert_eq!(failures, vec![Failure::Command(process.id())]);
    assert_eq!(process.state(), ProcessState::Failed);
    assert!(matches!(process.error(), Some(ProcessError::Lost { .. })));
    assert_eq!(engine.node(root).state(), NodeState::Failed);
}

#[test]
fn continuing_nodes_step_again_after_other_pending_work() {
    let _lock = exclusive();
    let mut engine = engine(1);
    let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(vec![]));

    for name in ["a", "b"] {
        let log = log.clone();
        let steps = if name == "a" { 3 } else { 2 };
        engine
            .register(FlowGroup::new(name).with_variant(Variant::new(0, move || {
                let log = log.clone();
                let mut step = 0;
                routine(move |_| {
                    step += 1;
                    log.borrow_mut().push(format!("{}{}", name, step));
                    Ok(if step < steps {
                        Step::Continue
                    } else {
                        Step::Done
                    })
                })
            })))
            .unwrap();
    }
    let goal = engine
        .register(flow("both", || {
            once(|cx| {
                let a = cx.invoke("a", Params::new())?;
                let b = cx.invoke("b", Params::new())?;
                Ok(vec![a.into(), b.into()])
            })
        }))
        .unwrap();

    let root = engine.call(goal, Params::new()).unwrap();
    assert!(engine.make(root).is_empty());
    assert_eq!(*log.borrow(), vec!["a1", "b1", "a2", "b2", "a3"]);
}

fn fail_fast(enabled: bool) -> (Vec<Failure>, Vec<ProcessState>) {
    let mut engine = Engine::new(
        Config::builder()
            .jobs(1)
            .fail_fast(enabled)
            .build()
            .unwrap(),
    )
    .unwrap();
    let goal = engine
        .register(flow("both", || {
            once(|cx| {
                let bad = cx.spawn(Command::shell("exit 1"))?;
                let good = cx.spawn(Command::new(["true"]))?;
                Ok(vec![bad.into(), good.into()])
            })
        }))
        .unwrap();
    let root = engine.call(goal, Params::new()).unwrap();
    let failures = engine.make(root);
    let states = engine.processes().map(|process| process.state()).collect();
    (failures, states)
}


#[test]
fn fail_fast_discards_work_that_has_not_started() {
    let _lock = exclusive();
    let (failures, states) = fail_fast(true);
    assert_eq!(failures.len(), 1);
    assert_eq!(states, vec![ProcessState::Failed, ProcessState::Pending]);
}

#[test]
fn keep_going_runs_independent_work_after_a_failure() {
    let _lock = exclusive();
    let (failures, states) = fail_fast(false);
    assert_eq!(failures.len(), 1);
    assert_eq!(states, vec![ProcessState::Failed, ProcessState::Completed]);
}

#[test]
fn interruptions_discard_pending_work_and_let_running_commands_finish() {
    let _lock = exclusive();
    let mut engine = engine(2);
    let raiser = engine
        .register(FlowGroup::new("raiser").with_variant(Variant::new(0, || {
            let mut steps = 0;
            routine(move |cx| {
                steps += 1;
                match steps {
                    1 => Ok(Step::Continue),
                    2 => {
                        raise(Signal::SIGTERM)?;
                        let late = cx.spawn(Command::new(["true"]))?;
                        Ok(Step::blocked_on([late]))
                    }
                    _ => Ok(Step::Done),
                }
            })
        })))
        .unwrap();
    let goal = engine
        .register(flow("goal", move || {
            once(move |cx| {
                let sleeper = cx.spawn(Command::shell("sleep 0.3"))?;
                let node = cx.call(raiser, Params::new())?;
                Ok(vec![sleeper.into(), node.into()])
            })
        }))
        .unwrap();

    let root = engine.call(goal, Params::new()).unwrap();
    assert_eq!(
        engine.make(root),
        vec![Failure::Interrupted(Signal::SIGTERM)]
    );

    let states: Vec<ProcessState> = engine.processes().map(|process| process.state()).collect();
    assert_eq!(states, vec![ProcessState::Completed, ProcessState::Pending]);
    assert!(engine.nodes().all(|node| node.is_closed()));
}

#[test]
fn plain_processes_complete_whatever_their_exit_code() {
    let _lock = exclusive();
    let mut engine = engine(1);
    let goal = engine
        .register(flow("plain", || {
            once(|cx| {
                let id = cx.spawn_with("false", || std::process::Command::new("false").spawn());
                Ok(vec![id.into()])
            })
        }))
        .unwrap();
    let root = engine.call(goal, Params::new()).unwrap();
    assert!(engine.make(root).is_empty());

    let process = engine.processes().next().unwrap();
    assert_eq!(process.state(), ProcessState::Completed);
    assert_eq!(process.outcome(), Some(ExitOutcome::Exited(1)));
    assert_eq!(process.command_line(), "false");
}

fn build_target(script: &'static str) -> (Vec<Failure>, bool) {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.o");
    let mut engine = engine(1);
    let path = target.clone();
    let goal = engine
        .register(flow("compile", move || {
            let path = path.clone();
            once(move |cx| {
                std::fs::write(&path, "partial")?;
                cx.declare_target(&path);
                Ok(vec![cx.spawn(Command::shell(script))?.into()])
            })
        }))
        .unwrap();
    let root = engine.call(goal, Params::new()).unwrap();
    let failures = engine.make(root);
    (failures, target.exists())
}

#[test]
fn targets_of_nodes_that_fail_are_removed() {
    let _lock = exclusive();
    let (failures, exists) = build_target("exit 1");
    assert_eq!(failures.len(), 1);
    assert!(!exists);
}

#[test]
fn targets_of_completed_nodes_are_kept() {
    let _lock = exclusive();
    let (failures, exists) = build_target("true");
    assert!(failures.is_empty());
    assert!(exists);
}
