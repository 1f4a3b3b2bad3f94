// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::{FakeExecutor, Suite};
use benchplan_metadata::{MetricValue, ResultKind};
use benchplan_runner::{
    config::{ConfigOverrides, HarnessConfig, NumThreads},
    context::TestContext,
    driver::TestRunDriver,
    errors::{DriverError, StepError},
    fingerprint::{Fingerprint, PreviousResults},
    modules::{ModuleRegistry, TestModule},
    plan::{ExecStatus, ExecutionPlan, Invocation, RunStep},
    slots::SlotController,
};
use color_eyre::eyre::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex},
};

const BENCH_TEST: &str = indoc! {"
    # A simple benchmark.
    RUN: ./bench --iterations 10
"};

fn modules(names: &[&str]) -> ConfigOverrides {
    ConfigOverrides {
        test_modules: Some(names.iter().map(|name| (*name).to_owned()).collect()),
        ..ConfigOverrides::default()
    }
}

fn bounded(capacity: usize) -> SlotController {
    SlotController::new(NonZeroUsize::new(capacity).expect("capacity is non-zero"))
}

#[test]
fn unsupported_suite_runs_nothing() -> Result<()> {
    let suite = Suite::new()?;
    suite.write("benchplan.toml", "unsupported = true\n")?;
    let test = suite.add_test("a.test", BENCH_TEST)?;
    let config = HarnessConfig::from_sources(suite.root(), None, |_, unknown| {
        panic!("unexpected unknown keys: {unknown:?}")
    })?;

    let registry = ModuleRegistry::with_builtin_modules();
    let slots = SlotController::unlimited();
    let executor = FakeExecutor::succeeding();
    let driver = TestRunDriver::new(&config, &registry, &slots, &executor);

    let outcome = driver.run(&test)?;
    assert_eq!(outcome.kind, ResultKind::Unsupported);
    assert_eq!(outcome.output, "Test is unsupported");
    assert!(executor.calls().is_empty());
    assert!(!suite.root().join("Output").exists(), "no temp dir created");
    Ok(())
}

#[test]
fn dry_run_passes_without_side_effects() -> Result<()> {
    let suite = Suite::new()?;
    // Neither the executable nor a valid declaration is needed for a dry run.
    let test = suite.add_test("a.test", "nothing to see here\n")?;
    let config = suite.config(ConfigOverrides {
        no_execute: true,
        ..modules(&["hash", "timeit"])
    });

    let registry = ModuleRegistry::with_builtin_modules();
    let slots = bounded(1);
    let executor = FakeExecutor::succeeding();
    let driver = TestRunDriver::new(&config, &registry, &slots, &executor);

    let outcome = driver.run(&test)?;
    assert_eq!(outcome.kind, ResultKind::Pass);
    assert!(outcome.metrics.is_empty());
    assert!(executor.calls().is_empty());
    assert!(!suite.root().join("Output").exists(), "no temp dir created");
    assert_eq!(slots.available(), Some(1));
    Ok(())
}

#[test]
fn missing_executable() -> Result<()> {
    let suite = Suite::new()?;
    let test = suite.add_test("SingleSource/a.test", BENCH_TEST)?;
    let config = suite.config(modules(&["hash"]));

    let registry = ModuleRegistry::with_builtin_modules();
    let slots = bounded(1);
    let executor = FakeExecutor::succeeding();
    let driver = TestRunDriver::new(&config, &registry, &slots, &executor);

    let outcome = driver.run(&test)?;
    assert_eq!(outcome.kind, ResultKind::MissingExecutable);
    assert_eq!(
        outcome.output,
        format!(
            "Executable '{}' is missing",
            suite.root().join("SingleSource/bench")
        )
    );
    assert!(outcome.metrics.is_empty());
    assert!(executor.calls().is_empty());
    // The temporary directory is created before the executable check.
    assert!(suite.root().join("SingleSource/Output").is_dir());
    Ok(())
}

#[test]
fn malformed_declaration_is_a_driver_error() -> Result<()> {
    let suite = Suite::new()?;
    let test = suite.add_test("a.test", "THREADS: 2\n")?;
    let config = suite.config(ConfigOverrides::default());

    let registry = ModuleRegistry::with_builtin_modules();
    let slots = SlotController::unlimited();
    let executor = FakeExecutor::succeeding();
    let driver = TestRunDriver::new(&config, &registry, &slots, &executor);

    let error = driver.run(&test).expect_err("no RUN lines");
    assert!(matches!(error, DriverError::TestFileParse(_)), "{error:?}");
    Ok(())
}

#[test]
fn unchanged_executable_is_skipped() -> Result<()> {
    let suite = Suite::new()?;
    let test = suite.add_test("a.test", BENCH_TEST)?;
    let bench = suite.write("bench", b"\x7fELF version 1")?;
    let config = suite.config(ConfigOverrides {
        previous_results_file: Some("previous.json".into()),
        ..modules(&["hash", "timeit"])
    });

    let mut previous = PreviousResults::empty();
    previous.insert("a.test", Fingerprint::of_file(&bench)?);

    let registry = ModuleRegistry::with_builtin_modules();
    let slots = bounded(1);
    let executor = FakeExecutor::succeeding();
    let driver =
        TestRunDriver::new(&config, &registry, &slots, &executor).with_previous_results(&previous);

    let outcome = driver.run(&test)?;
    assert_eq!(outcome.kind, ResultKind::Unchanged);
    assert_eq!(outcome.output, "Executable identical to previous run");
    let hash = MetricValue::Text(Fingerprint::of_file(&bench)?.to_string());
    assert_eq!(outcome.metrics.get("hash"), Some(&hash));
    assert!(executor.calls().is_empty(), "nothing is executed");

    // Once the executable changes, the test runs again.
    suite.write("bench", b"\x7fELF version 2")?;
    let outcome = driver.run(&test)?;
    assert_eq!(outcome.kind, ResultKind::Pass);
    let hash = MetricValue::Text(Fingerprint::of_file(&bench)?.to_string());
    assert_eq!(outcome.metrics.get("hash"), Some(&hash));
    assert!(outcome.metrics.contains_key("exec_time"));
    assert_eq!(executor.calls(), ["bench"]);
    Ok(())
}

#[test]
fn first_run_is_never_skipped() -> Result<()> {
    let suite = Suite::new()?;
    let test = suite.add_test("a.test", BENCH_TEST)?;
    suite.write("bench", b"binary")?;
    let config = suite.config(ConfigOverrides {
        previous_results_file: Some("previous.json".into()),
        ..modules(&["hash"])
    });

    let registry = ModuleRegistry::with_builtin_modules();
    let slots = SlotController::unlimited();
    let executor = FakeExecutor::succeeding();

    // No previous results at all, then previous results without this test.
    let mut previous = PreviousResults::empty();
    previous.insert("other.test", Fingerprint::of_bytes(b"binary"));
    let drivers = [
        TestRunDriver::new(&config, &registry, &slots, &executor),
        TestRunDriver::new(&config, &registry, &slots, &executor).with_previous_results(&previous),
    ];

    for driver in drivers {
        let outcome = driver.run(&test)?;
        assert_eq!(outcome.kind, ResultKind::Pass);
        let hash = MetricValue::Text(Fingerprint::of_bytes(b"binary").to_string());
        assert_eq!(outcome.metrics.get("hash"), Some(&hash));
    }
    assert_eq!(executor.calls(), ["bench", "bench"]);
    Ok(())
}

#[test]
fn previous_results_are_ignored_when_disabled() -> Result<()> {
    let suite = Suite::new()?;
    let test = suite.add_test("a.test", BENCH_TEST)?;
    suite.write("bench", b"binary")?;
    let config = suite.config(ConfigOverrides::default());
    assert!(!config.previous_results());

    let mut previous = PreviousResults::empty();
    previous.insert("a.test", Fingerprint::of_bytes(b"binary"));

    let registry = ModuleRegistry::with_builtin_modules();
    let slots = SlotController::unlimited();
    let executor = FakeExecutor::succeeding();
    let driver =
        TestRunDriver::new(&config, &registry, &slots, &executor).with_previous_results(&previous);

    let outcome = driver.run(&test)?;
    assert_eq!(outcome.kind, ResultKind::Pass);
    assert_eq!(executor.calls(), ["bench"]);
    Ok(())
}

#[test]
fn unknown_module_is_a_driver_error() -> Result<()> {
    let suite = Suite::new()?;
    let test = suite.add_test("a.test", BENCH_TEST)?;
    suite.write("bench", b"binary")?;
    let config = suite.config(modules(&["timeit", "nonexistent"]));

    let registry = ModuleRegistry::with_builtin_modules();
    let slots = bounded(2);
    let executor = FakeExecutor::succeeding();
    let driver = TestRunDriver::new(&config, &registry, &slots, &executor);

    match driver.run(&test) {
        Err(DriverError::UnknownModule(error)) => assert_eq!(error.name(), "nonexistent"),
        other => panic!("expected unknown module error, got {other:?}"),
    }
    assert!(executor.calls().is_empty());
    assert_eq!(slots.available(), Some(2));
    Ok(())
}

#[test]
fn thread_requirement_is_clamped_to_the_budget() -> Result<()> {
    let suite = Suite::new()?;
    let test = suite.add_test(
        "a.test",
        indoc! {"
            RUN: ./bench --threads 4
            THREADS: 4
        "},
    )?;
    suite.write("bench", b"binary")?;
    let config = suite.config(ConfigOverrides {
        num_threads: Some(NumThreads::Count(2)),
        ..ConfigOverrides::default()
    });

    let registry = ModuleRegistry::with_builtin_modules();
    let slots = Arc::new(SlotController::from_num_threads(config.num_threads()));
    assert_eq!(slots.capacity(), Some(2));

    // The test must hold the whole budget while it runs.
    let observed = Arc::new(Mutex::new(Vec::new()));
    let executor = {
        let slots = slots.clone();
        let observed = observed.clone();
        FakeExecutor::new(move |_| {
            observed.lock().unwrap().push(slots.available());
            (ExecStatus::Success, String::new())
        })
    };
    let driver = TestRunDriver::new(&config, &registry, &slots, &executor);

    let outcome = driver.run(&test)?;
    assert_eq!(outcome.kind, ResultKind::Pass);
    assert_eq!(*observed.lock().unwrap(), [Some(0)]);
    assert_eq!(slots.available(), Some(2), "slots released after the run");
    Ok(())
}

/// Adds a run step that fails, and records the thread requirement it saw.
struct Flaky {
    threads_seen: Arc<Mutex<Vec<usize>>>,
}

struct FailingStep;

impl RunStep for FailingStep {
    fn name(&self) -> &str {
        "flaky"
    }

    fn before(
        &self,
        _cx: &mut TestContext<'_>,
        _invocation: &mut Invocation,
    ) -> Result<(), StepError> {
        Err(StepError::custom("perf counters unavailable"))
    }
}

impl TestModule for Flaky {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn description(&self) -> &'static str {
        "fails before running"
    }

    fn mutate_plan(
        &self,
        cx: &mut TestContext<'_>,
        plan: &mut ExecutionPlan,
    ) -> Result<(), StepError> {
        self.threads_seen
            .lock()
            .unwrap()
            .push(cx.threads_required());
        plan.add_run_step(FailingStep);
        Ok(())
    }
}

#[test]
fn failing_step_still_releases_slots() -> Result<()> {
    let suite = Suite::new()?;
    let test = suite.add_test("a.test", "RUN: ./bench\nTHREADS: 3\n")?;
    suite.write("bench", b"binary")?;
    let config = suite.config(ConfigOverrides {
        num_threads: Some(NumThreads::Count(2)),
        ..modules(&["flaky"])
    });

    let threads_seen = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ModuleRegistry::new();
    registry.register(Flaky {
        threads_seen: threads_seen.clone(),
    });
    let slots = SlotController::from_num_threads(config.num_threads());
    let executor = FakeExecutor::succeeding();
    let driver = TestRunDriver::new(&config, &registry, &slots, &executor);

    let outcome = driver.run(&test)?;
    assert_eq!(outcome.kind, ResultKind::Fail);
    assert_eq!(outcome.output, "perf counters unavailable");
    assert!(executor.calls().is_empty());
    assert_eq!(slots.available(), Some(2));

    // Modules see the declared requirement: the clamp happens after the plan is built.
    assert_eq!(*threads_seen.lock().unwrap(), [3]);
    Ok(())
}

#[test]
fn failing_run_keeps_diagnostics() -> Result<()> {
    let suite = Suite::new()?;
    let test = suite.add_test(
        "a.test",
        indoc! {"
            RUN: ./bench
            VERIFY: ./check
            METRIC: score: ./score
        "},
    )?;
    suite.write("bench", b"binary")?;
    let config = suite.config(modules(&["codesize"]));

    let registry = ModuleRegistry::with_builtin_modules();
    let slots = SlotController::unlimited();
    let executor = FakeExecutor::new(|command| {
        if command.program.ends_with("bench") {
            (
                ExecStatus::Failed {
                    command: command.to_string(),
                    exit_code: Some(3),
                },
                "partial output\n".to_owned(),
            )
        } else {
            (ExecStatus::Success, String::new())
        }
    });
    let driver = TestRunDriver::new(&config, &registry, &slots, &executor);

    let outcome = driver.run(&test)?;
    assert_eq!(outcome.kind, ResultKind::Fail);
    assert!(
        outcome.output.contains("exited with code 3"),
        "{}",
        outcome.output
    );
    assert!(
        outcome.output.contains("partial output"),
        "{}",
        outcome.output
    );
    // Verification and metrics are skipped, but result steps still run.
    assert_eq!(executor.calls(), ["bench"]);
    assert_eq!(outcome.metrics.get("size"), Some(&MetricValue::Integer(6)));
    Ok(())
}

#[cfg(unix)]
#[test]
fn runs_real_processes() -> Result<()> {
    use benchplan_runner::plan::ProcessExecutor;
    use std::os::unix::fs::PermissionsExt;

    let suite = Suite::new()?;
    let test = suite.add_test(
        "MultiSource/hello.test",
        indoc! {"
            RUN: ./hello.sh world > %o
            VERIFY: grep -q 'hello world' %o
            METRIC: score: echo 42
            METRIC: ratio: echo 0.5
        "},
    )?;
    let script = suite.write("MultiSource/hello.sh", "#!/bin/sh\necho \"hello $1\"\n")?;
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;
    let config = suite.config(modules(&["timeit", "codesize"]));

    let registry = ModuleRegistry::with_builtin_modules();
    let slots = bounded(1);
    let executor = ProcessExecutor::default();
    let driver = TestRunDriver::new(&config, &registry, &slots, &executor);

    let outcome = driver.run(&test)?;
    assert_eq!(outcome.kind, ResultKind::Pass, "{}", outcome.output);
    assert_eq!(
        outcome.metrics.keys().map(String::as_str).collect::<Vec<_>>(),
        ["exec_time", "score", "ratio", "size"]
    );
    assert_eq!(outcome.metrics["score"], MetricValue::Integer(42));
    assert_eq!(outcome.metrics["ratio"], MetricValue::Real(0.5));
    assert_eq!(
        std::fs::read_to_string(suite.root().join("MultiSource/Output/hello.test.out"))?,
        "hello world\n"
    );
    Ok(())
}
