// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The suite runner: runs every test in a [`TestList`] in parallel.
//!
//! Each test runs on its own worker thread. How many of those threads actually execute at once
//! is decided by the [`SlotController`](crate::slots::SlotController) inside the driver, based on
//! each test's thread requirement.

use crate::{
    driver::TestRunDriver,
    errors::{DriverError, RunnerBuildError},
    list::{TestInstance, TestList},
    plan::TestOutcome,
    stopwatch::stopwatch,
};
use benchplan_metadata::ResultKind;
use chrono::{DateTime, Local};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::{
    any::Any,
    convert::Infallible,
    marker::PhantomData,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use tracing::debug;

/// Runs the tests of a list through a driver.
pub struct SuiteRunner<'a> {
    test_list: &'a TestList,
    driver: TestRunDriver<'a>,
    run_pool: ThreadPool,
}

impl<'a> SuiteRunner<'a> {
    /// Creates a new runner with the given number of worker threads.
    pub fn new(
        test_list: &'a TestList,
        driver: TestRunDriver<'a>,
        workers: usize,
    ) -> Result<Self, RunnerBuildError> {
        let run_pool = ThreadPoolBuilder::new()
            // The event loop needs its own thread.
            .num_threads(workers.max(1) + 1)
            .thread_name(|idx| format!("benchplan-run-{idx}"))
            .build()
            .map_err(RunnerBuildError)?;
        Ok(Self {
            test_list,
            driver,
            run_pool,
        })
    }

    /// Runs every test, calling the callback with each event.
    pub fn execute<F>(&self, mut callback: F) -> RunStats
    where
        F: FnMut(TestEvent<'a>) + Send,
    {
        match self.try_execute::<Infallible, _>(|event| {
            callback(event);
            Ok(())
        }) {
            Ok(run_stats) => run_stats,
            Err(never) => match never {},
        }
    }

    /// Runs every test, calling the callback with each event.
    ///
    /// If the callback returns an error, tests that haven't started yet are skipped, tests that
    /// are running are allowed to finish, and the first error is returned.
    pub fn try_execute<E, F>(&self, callback: F) -> Result<RunStats, E>
    where
        F: FnMut(TestEvent<'a>) -> Result<(), E> + Send,
        E: Send,
    {
        let (run_sender, run_receiver) = crossbeam_channel::unbounded();

        let canceled = AtomicBool::new(false);
        let canceled_ref = &canceled;

        let mut ctx = CallbackContext::new(callback, self.test_list.run_count());

        // Send the initial event. The run hasn't started yet, so there's nothing to cancel if
        // this fails.
        ctx.run_started(self.test_list)?;

        // Stores the first error that occurred. This error is propagated up.
        let mut first_error = None;

        let ctx_mut = &mut ctx;
        let first_error_mut = &mut first_error;
        let driver = &self.driver;

        self.run_pool.scope(move |run_scope| {
            for test_instance in self.test_list.iter_tests() {
                if canceled_ref.load(Ordering::Acquire) {
                    break;
                }

                let this_run_sender = run_sender.clone();
                run_scope.spawn(move |_| {
                    if canceled_ref.load(Ordering::Acquire) {
                        return;
                    }

                    // Failure to send means the receiver was dropped.
                    let _ = this_run_sender.send(InternalTestEvent::Started { test_instance });

                    let stopwatch = stopwatch();
                    let result = catch_unwind(AssertUnwindSafe(|| driver.run(test_instance)))
                        .unwrap_or_else(|panic| {
                            Err(DriverError::Panicked {
                                message: panic_message(panic.as_ref()),
                            })
                        });

                    let event = match result {
                        Ok(mut outcome) => {
                            if outcome.elapsed.is_zero() {
                                outcome.elapsed = stopwatch.snapshot().duration;
                            }
                            InternalTestEvent::Finished {
                                test_instance,
                                outcome,
                            }
                        }
                        Err(error) => InternalTestEvent::SetupFailed {
                            test_instance,
                            error,
                        },
                    };
                    let _ = this_run_sender.send(event);
                });
            }

            drop(run_sender);

            for event in run_receiver {
                if let Err(err) = ctx_mut.handle_event(event) {
                    // The callback failed: stop starting new tests, and let running ones
                    // finish.
                    canceled_ref.store(true, Ordering::Release);
                    if first_error_mut.is_none() {
                        *first_error_mut = Some(err);
                        // Ignore errors that happen during error cancellation.
                        let _ = ctx_mut.error_cancel();
                    }
                }
            }
        });

        if let Err(err) = ctx.run_finished() {
            first_error.get_or_insert(err);
        }

        match first_error {
            None => Ok(ctx.run_stats),
            Some(err) => Err(err),
        }
    }
}

impl std::fmt::Debug for SuiteRunner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiteRunner")
            .field("test_list", &self.test_list)
            .field("driver", &self.driver)
            .field("workers", &(self.run_pool.current_num_threads() - 1))
            .finish()
    }
}

/// An event produced while running a suite.
#[derive(Debug)]
pub enum TestEvent<'a> {
    /// The run started.
    RunStarted {
        /// The tests that will be run.
        test_list: &'a TestList,
    },

    /// A test was picked up by a worker.
    ///
    /// This is reported before the test acquires its thread slots, so the test may still be
    /// waiting for capacity.
    TestStarted {
        /// The test.
        test_instance: &'a TestInstance,

        /// The number of tests picked up and not yet finished, including this one. This counts
        /// tests waiting for slots as well as tests executing.
        running: usize,
    },

    /// A test produced a result.
    TestFinished {
        /// The test.
        test_instance: &'a TestInstance,

        /// The result.
        outcome: TestOutcome,

        /// The number of tests still running.
        running: usize,

        /// The number of tests that have finished, including this one.
        finished: usize,
    },

    /// A test could not be set up, and didn't produce a result.
    TestSetupFailed {
        /// The test.
        test_instance: &'a TestInstance,

        /// The error.
        error: DriverError,

        /// The number of tests still running.
        running: usize,

        /// The number of tests that have finished, including this one.
        finished: usize,
    },

    /// A cancellation notice was received.
    RunBeginCancel {
        /// The number of tests still running.
        running: usize,

        /// The reason this run was canceled.
        reason: CancelReason,
    },

    /// The run finished.
    RunFinished {
        /// The time at which the run was started.
        start_time: DateTime<Local>,

        /// The amount of time it took for the tests to run.
        elapsed: Duration,

        /// Statistics for the run.
        run_stats: RunStats,
    },
}

/// The reason why a test run is being canceled.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CancelReason {
    /// An error occurred while reporting results.
    ReportError,
}

/// Statistics for a test run.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq)]
pub struct RunStats {
    /// The total number of tests that were expected to be run at the beginning.
    ///
    /// If the test run is canceled, this will be more than `finished_count`.
    pub initial_run_count: usize,

    /// The total number of tests that finished, including setup failures.
    pub finished_count: usize,

    /// The number of tests that passed.
    pub passed: usize,

    /// The number of tests that failed.
    pub failed: usize,

    /// The number of unsupported tests.
    pub unsupported: usize,

    /// The number of tests skipped because their executable was unchanged.
    pub unchanged: usize,

    /// The number of tests whose executable was missing.
    pub missing_executable: usize,

    /// The number of tests that could not be set up.
    pub setup_failed: usize,
}

impl RunStats {
    /// Returns true if this run is considered a success.
    ///
    /// A run is marked as failed if any of the following are true:
    /// * the run was canceled: the initial run count is greater than the finished count
    /// * any tests failed or were missing their executable
    /// * any tests could not be set up
    pub fn is_success(&self) -> bool {
        if self.initial_run_count > self.finished_count {
            return false;
        }
        self.failed == 0 && self.missing_executable == 0 && self.setup_failed == 0
    }

    /// Returns true if any test produced a failing result.
    pub fn any_failed(&self) -> bool {
        self.failed > 0 || self.missing_executable > 0
    }

    fn on_test_finished(&mut self, kind: ResultKind) {
        self.finished_count += 1;
        match kind {
            ResultKind::Pass => self.passed += 1,
            ResultKind::Fail => self.failed += 1,
            ResultKind::Unsupported => self.unsupported += 1,
            ResultKind::Unchanged => self.unchanged += 1,
            ResultKind::MissingExecutable => self.missing_executable += 1,
        }
    }

    fn on_setup_failed(&mut self) {
        self.finished_count += 1;
        self.setup_failed += 1;
    }
}

struct CallbackContext<F, E> {
    callback: F,
    stopwatch: crate::stopwatch::StopwatchStart,
    run_stats: RunStats,
    running: usize,
    canceled: bool,
    phantom: PhantomData<E>,
}

impl<'a, F, E> CallbackContext<F, E>
where
    F: FnMut(TestEvent<'a>) -> Result<(), E> + Send,
{
    fn new(callback: F, initial_run_count: usize) -> Self {
        Self {
            callback,
            stopwatch: stopwatch(),
            run_stats: RunStats {
                initial_run_count,
                ..RunStats::default()
            },
            running: 0,
            canceled: false,
            phantom: PhantomData,
        }
    }

    fn run_started(&mut self, test_list: &'a TestList) -> Result<(), E> {
        (self.callback)(TestEvent::RunStarted { test_list })
    }

    fn handle_event(&mut self, event: InternalTestEvent<'a>) -> Result<(), E> {
        match event {
            InternalTestEvent::Started { test_instance } => {
                self.running += 1;
                (self.callback)(TestEvent::TestStarted {
                    test_instance,
                    running: self.running,
                })
            }
            InternalTestEvent::Finished {
                test_instance,
                outcome,
            } => {
                self.running -= 1;
                self.run_stats.on_test_finished(outcome.kind);
                debug!(
                    test = %test_instance.name,
                    kind = %outcome.kind,
                    "test finished"
                );
                (self.callback)(TestEvent::TestFinished {
                    test_instance,
                    outcome,
                    running: self.running,
                    finished: self.run_stats.finished_count,
                })
            }
            InternalTestEvent::SetupFailed {
                test_instance,
                error,
            } => {
                self.running -= 1;
                self.run_stats.on_setup_failed();
                (self.callback)(TestEvent::TestSetupFailed {
                    test_instance,
                    error,
                    running: self.running,
                    finished: self.run_stats.finished_count,
                })
            }
        }
    }

    fn error_cancel(&mut self) -> Result<(), E> {
        if self.canceled {
            return Ok(());
        }
        self.canceled = true;
        (self.callback)(TestEvent::RunBeginCancel {
            running: self.running,
            reason: CancelReason::ReportError,
        })
    }

    fn run_finished(&mut self) -> Result<(), E> {
        let snapshot = self.stopwatch.snapshot();
        (self.callback)(TestEvent::RunFinished {
            start_time: snapshot.start_time,
            elapsed: snapshot.duration,
            run_stats: self.run_stats,
        })
    }
}

#[derive(Debug)]
enum InternalTestEvent<'a> {
    Started {
        test_instance: &'a TestInstance,
    },
    Finished {
        test_instance: &'a TestInstance,
        outcome: TestOutcome,
    },
    SetupFailed {
        test_instance: &'a TestInstance,
        error: DriverError,
    },
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "(non-string panic payload)".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_success() {
        assert!(RunStats::default().is_success(), "empty run => success");
        assert!(
            RunStats {
                initial_run_count: 42,
                finished_count: 42,
                passed: 40,
                unsupported: 1,
                unchanged: 1,
                ..RunStats::default()
            }
            .is_success(),
            "unsupported and unchanged tests are not failures"
        );
        assert!(
            !RunStats {
                initial_run_count: 42,
                finished_count: 41,
                ..RunStats::default()
            }
            .is_success(),
            "initial run count > finished count => failure"
        );
        assert!(
            !RunStats {
                initial_run_count: 42,
                finished_count: 42,
                failed: 1,
                ..RunStats::default()
            }
            .is_success(),
            "failed => failure"
        );
        assert!(
            !RunStats {
                initial_run_count: 42,
                finished_count: 42,
                missing_executable: 1,
                ..RunStats::default()
            }
            .is_success(),
            "missing executable => failure"
        );
        assert!(
            !RunStats {
                initial_run_count: 42,
                finished_count: 42,
                setup_failed: 1,
                ..RunStats::default()
            }
            .is_success(),
            "setup failed => failure"
        );
    }

    #[test]
    fn panic_messages() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&String::from("kaboom")), "kaboom");
        assert_eq!(panic_message(&42), "(non-string panic payload)");
    }
}
