// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::{FakeExecutor, Suite};
use benchplan_metadata::ResultKind;
use benchplan_runner::{
    config::{ConfigOverrides, NumThreads},
    context::TestContext,
    driver::TestRunDriver,
    errors::{DriverError, StepError},
    list::TestList,
    modules::{ModuleRegistry, TestModule},
    plan::{ExecStatus, ExecutionPlan, Invocation, RunStep},
    reporter::TestReporter,
    runner::{CancelReason, RunStats, SuiteRunner, TestEvent},
    slots::SlotController,
};
use color_eyre::eyre::{Result, bail};
use pretty_assertions::assert_eq;
use std::{collections::BTreeMap, time::Duration};

/// Creates a suite with one passing test, one failing test and one test without an executable.
fn mixed_suite() -> Result<Suite> {
    let suite = Suite::new()?;
    suite.add_test("SingleSource/pass.test", "RUN: ./pass\n")?;
    suite.write("SingleSource/pass", b"pass")?;
    suite.add_test("SingleSource/fail.test", "RUN: ./fail\n")?;
    suite.write("SingleSource/fail", b"fail")?;
    suite.add_test("MultiSource/missing.test", "RUN: ./missing\n")?;
    Ok(suite)
}

fn fail_named_fail() -> FakeExecutor {
    FakeExecutor::new(|command| {
        if command.program.ends_with("/fail") {
            (
                ExecStatus::Failed {
                    command: command.to_string(),
                    exit_code: Some(1),
                },
                String::new(),
            )
        } else {
            (ExecStatus::Success, String::new())
        }
    })
}

#[test]
fn run_reports_every_test() -> Result<()> {
    let suite = mixed_suite()?;
    let config = suite.config(ConfigOverrides::default());
    let test_list = TestList::discover(suite.root(), &[])?;
    assert_eq!(test_list.run_count(), 3);

    let registry = ModuleRegistry::with_builtin_modules();
    let slots = SlotController::from_num_threads(NumThreads::Count(1));
    let executor = fail_named_fail();
    let driver = TestRunDriver::new(&config, &registry, &slots, &executor);
    let runner = SuiteRunner::new(&test_list, driver, 2)?;

    let mut kinds = BTreeMap::new();
    let mut started = 0;
    let mut finished_event = None;
    let run_stats = runner.execute(|event| match event {
        TestEvent::RunStarted { test_list } => assert_eq!(test_list.run_count(), 3),
        TestEvent::TestStarted { .. } => started += 1,
        TestEvent::TestFinished {
            test_instance,
            outcome,
            ..
        } => {
            kinds.insert(test_instance.name.clone(), outcome.kind);
        }
        TestEvent::TestSetupFailed { error, .. } => panic!("unexpected setup failure: {error}"),
        TestEvent::RunBeginCancel { .. } => panic!("run should not be canceled"),
        TestEvent::RunFinished { run_stats, .. } => finished_event = Some(run_stats),
    });

    assert_eq!(started, 3);
    assert_eq!(
        kinds,
        BTreeMap::from([
            ("MultiSource/missing.test".to_owned(), ResultKind::MissingExecutable),
            ("SingleSource/fail.test".to_owned(), ResultKind::Fail),
            ("SingleSource/pass.test".to_owned(), ResultKind::Pass),
        ])
    );
    assert_eq!(
        run_stats,
        RunStats {
            initial_run_count: 3,
            finished_count: 3,
            passed: 1,
            failed: 1,
            missing_executable: 1,
            ..RunStats::default()
        }
    );
    assert_eq!(finished_event, Some(run_stats));
    assert!(!run_stats.is_success());
    assert_eq!(slots.available(), Some(1));
    Ok(())
}

#[test]
fn reporter_collects_the_run() -> Result<()> {
    let suite = mixed_suite()?;
    let config = suite.config(ConfigOverrides::default());
    let test_list = TestList::discover(suite.root(), &["SingleSource".into()])?;

    let registry = ModuleRegistry::with_builtin_modules();
    let slots = SlotController::unlimited();
    let executor = fail_named_fail();
    let driver = TestRunDriver::new(&config, &registry, &slots, &executor);
    let runner = SuiteRunner::new(&test_list, driver, 4)?;

    let mut reporter = TestReporter::new();
    let mut out = Vec::new();
    let run_stats = runner.try_execute(|event| reporter.report_event(event, &mut out))?;
    assert_eq!(run_stats.passed, 1);
    assert_eq!(run_stats.failed, 1);

    let report = reporter.report();
    assert_eq!(report.tests.len(), 2);
    assert_eq!(
        report.find("SingleSource/fail.test").map(|entry| entry.code),
        Some(ResultKind::Fail)
    );

    let out = String::from_utf8(out)?;
    assert!(out.contains("Starting 2 tests in"), "{out}");
    assert!(out.contains("--- SingleSource/fail.test ---"), "{out}");
    assert!(out.contains("2 tests run: 1 passed, 1 failed"), "{out}");
    Ok(())
}

#[test]
fn callback_error_cancels_the_run() -> Result<()> {
    let suite = Suite::new()?;
    for idx in 0..8 {
        suite.add_test(&format!("t{idx}.test"), "RUN: ./bench\n")?;
    }
    suite.write("bench", b"bench")?;
    let config = suite.config(ConfigOverrides::default());
    let test_list = TestList::discover(suite.root(), &[])?;

    let registry = ModuleRegistry::with_builtin_modules();
    let slots = SlotController::from_num_threads(NumThreads::Count(1));
    let executor = FakeExecutor::new(|_| {
        std::thread::sleep(Duration::from_millis(20));
        (ExecStatus::Success, String::new())
    });
    let driver = TestRunDriver::new(&config, &registry, &slots, &executor);
    // A single worker runs tests one at a time, so the run is canceled before it completes.
    let runner = SuiteRunner::new(&test_list, driver, 1)?;

    let mut cancel_reasons = Vec::new();
    let mut last_stats = None;
    let result = runner.try_execute(|event| {
        match event {
            TestEvent::TestFinished { .. } => bail!("output closed"),
            TestEvent::RunBeginCancel { reason, .. } => cancel_reasons.push(reason),
            TestEvent::RunFinished { run_stats, .. } => last_stats = Some(run_stats),
            _ => {}
        }
        Ok(())
    });

    let error = result.expect_err("the callback failed");
    assert_eq!(error.to_string(), "output closed");
    assert_eq!(cancel_reasons, [CancelReason::ReportError]);
    let last_stats = last_stats.expect("run finished is always reported");
    assert!(last_stats.finished_count < last_stats.initial_run_count);
    assert!(!last_stats.is_success());
    assert_eq!(slots.available(), Some(1));
    Ok(())
}

/// A module whose run step panics.
struct Panicking;

struct PanickingStep;

impl RunStep for PanickingStep {
    fn name(&self) -> &str {
        "panicking"
    }

    fn before(
        &self,
        _cx: &mut TestContext<'_>,
        _invocation: &mut Invocation,
    ) -> Result<(), StepError> {
        panic!("instrumentation bug");
    }
}

impl TestModule for Panicking {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn description(&self) -> &'static str {
        "panics while running"
    }

    fn mutate_plan(
        &self,
        _cx: &mut TestContext<'_>,
        plan: &mut ExecutionPlan,
    ) -> Result<(), StepError> {
        plan.add_run_step(PanickingStep);
        Ok(())
    }
}

#[test]
fn panic_releases_slots_and_is_reported() -> Result<()> {
    let suite = Suite::new()?;
    suite.add_test("a.test", "RUN: ./bench\nTHREADS: 2\n")?;
    suite.add_test("b.test", "RUN: ./bench\nTHREADS: 2\n")?;
    suite.write("bench", b"bench")?;
    let config = suite.config(ConfigOverrides {
        test_modules: Some(vec!["panicking".to_owned()]),
        ..ConfigOverrides::default()
    });
    let test_list = TestList::discover(suite.root(), &[])?;

    let mut registry = ModuleRegistry::new();
    registry.register(Panicking);
    let slots = SlotController::from_num_threads(NumThreads::Count(2));
    let executor = FakeExecutor::succeeding();
    let driver = TestRunDriver::new(&config, &registry, &slots, &executor);
    let runner = SuiteRunner::new(&test_list, driver, 2)?;

    let mut panics = 0;
    let run_stats = runner.execute(|event| {
        if let TestEvent::TestSetupFailed { error, .. } = event {
            match error {
                DriverError::Panicked { message } => {
                    assert_eq!(message, "instrumentation bug");
                    panics += 1;
                }
                other => panic!("expected a panic, got {other}"),
            }
        }
    });

    // Both tests need the whole budget, so the second one only runs if the first one's slots
    // were released while unwinding.
    assert_eq!(panics, 2);
    assert_eq!(run_stats.setup_failed, 2);
    assert_eq!(slots.available(), Some(2));
    assert!(executor.calls().is_empty());
    Ok(())
}

#[test]
fn mixed_requirements_all_complete() -> Result<()> {
    let suite = Suite::new()?;
    for (idx, threads) in [1, 2, 3, 1, 2, 3, 1, 2].into_iter().enumerate() {
        suite.add_test(
            &format!("t{idx}.test"),
            &format!("RUN: ./bench\nTHREADS: {threads}\n"),
        )?;
    }
    suite.write("bench", b"bench")?;
    let config = suite.config(ConfigOverrides {
        num_threads: Some(NumThreads::Count(3)),
        ..ConfigOverrides::default()
    });
    let test_list = TestList::discover(suite.root(), &[])?;

    let registry = ModuleRegistry::with_builtin_modules();
    let slots = SlotController::from_num_threads(config.num_threads());
    let executor = FakeExecutor::new(|_| {
        std::thread::sleep(Duration::from_millis(5));
        (ExecStatus::Success, String::new())
    });
    let driver = TestRunDriver::new(&config, &registry, &slots, &executor);
    let runner = SuiteRunner::new(&test_list, driver, 8)?;

    let run_stats = runner.execute(|_| {});
    assert_eq!(run_stats.passed, 8);
    assert!(run_stats.is_success());
    assert_eq!(slots.available(), Some(3));
    Ok(())
}

#[test]
fn tests_waiting_for_slots_count_as_running() -> Result<()> {
    let suite = Suite::new()?;
    suite.add_test("a.test", "RUN: ./bench\n")?;
    suite.add_test("b.test", "RUN: ./bench\n")?;
    suite.write("bench", b"bench")?;
    let config = suite.config(ConfigOverrides::default());
    let test_list = TestList::discover(suite.root(), &[])?;

    let registry = ModuleRegistry::with_builtin_modules();
    let slots = SlotController::from_num_threads(NumThreads::Count(1));
    let executor = FakeExecutor::new(|_| {
        std::thread::sleep(Duration::from_millis(200));
        (ExecStatus::Success, String::new())
    });
    let driver = TestRunDriver::new(&config, &registry, &slots, &executor);
    let runner = SuiteRunner::new(&test_list, driver, 2)?;

    let mut max_running = 0;
    let run_stats = runner.execute(|event| {
        if let TestEvent::TestStarted { running, .. } = event {
            max_running = max_running.max(running);
        }
    });

    // Only one slot exists, but both tests are picked up while the first one executes.
    assert_eq!(max_running, 2);
    assert_eq!(run_stats.passed, 2);
    assert_eq!(slots.available(), Some(1));
    Ok(())
}
