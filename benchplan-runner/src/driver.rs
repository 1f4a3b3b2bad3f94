// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running a single test from start to finish.
//!
//! [`TestRunDriver::run`] takes one test through these steps, in order. Steps marked with a `*`
//! may end the run early with a result.
//!
//! 1. * The suite is configured as unsupported: `UNSUPPORTED`.
//! 2. * The harness is in no-execute mode: `PASS`, with no side effects.
//! 3. The temporary directory is created and the declaration is parsed.
//! 4. * The main executable doesn't exist: `NOEXE`.
//! 5. * `previous-results` is enabled and the executable's fingerprint matches the previous
//!    run's: `NOCHANGE`, with the fingerprint as the `hash` metric.
//! 6. The configured test modules build the execution plan.
//! 7. The test's thread requirement is clamped to the global budget.
//! 8. The required slots are acquired, blocking until they are free.
//! 9. The plan is executed.
//! 10. The slots are released, whether or not execution succeeded.
//!
//! Malformed declarations and unknown module names are returned as a [`DriverError`]. Every other
//! failure becomes a `FAIL` result.

use crate::{
    config::HarnessConfig,
    context::TestContext,
    errors::{DriverError, PlanBuildError},
    fingerprint::{self, PreviousResults},
    list::TestInstance,
    modules::ModuleRegistry,
    plan::{CommandExecutor, TestOutcome},
    slots::SlotController,
};
use benchplan_metadata::ResultKind;
use tracing::{debug, info};

/// Runs individual tests.
///
/// A driver holds only shared, read-only state, and may be used from many threads at once.
#[derive(Clone, Copy)]
pub struct TestRunDriver<'a> {
    config: &'a HarnessConfig,
    registry: &'a ModuleRegistry,
    slots: &'a SlotController,
    executor: &'a dyn CommandExecutor,
    previous: Option<&'a PreviousResults>,
}

impl<'a> TestRunDriver<'a> {
    /// Creates a new driver.
    pub fn new(
        config: &'a HarnessConfig,
        registry: &'a ModuleRegistry,
        slots: &'a SlotController,
        executor: &'a dyn CommandExecutor,
    ) -> Self {
        Self {
            config,
            registry,
            slots,
            executor,
            previous: None,
        }
    }

    /// Sets the fingerprints to compare against when `previous-results` is enabled.
    ///
    /// If no previous results are set, no test is ever considered unchanged.
    pub fn with_previous_results(mut self, previous: &'a PreviousResults) -> Self {
        self.previous = Some(previous);
        self
    }

    /// Returns the harness configuration.
    pub fn config(&self) -> &'a HarnessConfig {
        self.config
    }

    /// Runs a single test.
    pub fn run(&self, test: &TestInstance) -> Result<TestOutcome, DriverError> {
        if self.config.unsupported() {
            return Ok(TestOutcome::new(
                ResultKind::Unsupported,
                "Test is unsupported",
            ));
        }
        if self.config.no_execute() {
            return Ok(TestOutcome::new(ResultKind::Pass, ""));
        }

        let mut cx = TestContext::init(self.config, &test.name, &test.path)?;

        if !cx.executable().exists() {
            return Ok(TestOutcome::new(
                ResultKind::MissingExecutable,
                format!("Executable '{}' is missing", cx.executable()),
            ));
        }

        if self.config.previous_results() {
            let fingerprint = match fingerprint::compute(&mut cx) {
                Ok(fingerprint) => fingerprint.clone(),
                Err(error) => return Ok(TestOutcome::from_error(&error)),
            };
            let unchanged = self
                .previous
                .is_some_and(|previous| fingerprint::same_as_previous(&cx, previous));
            if unchanged {
                debug!(
                    test = cx.name(),
                    %fingerprint,
                    "executable unchanged, skipping"
                );
                return Ok(TestOutcome::new(
                    ResultKind::Unchanged,
                    "Executable identical to previous run",
                )
                .with_metric("hash", fingerprint.as_str()));
            }
        }

        let modules = self.config.test_modules();
        let plan = match self.registry.build_plan(&mut cx, modules) {
            Ok(plan) => plan,
            Err(PlanBuildError::UnknownModule(error)) => return Err(error.into()),
            Err(error) => return Ok(TestOutcome::from_error(&error)),
        };
        debug!(test = cx.name(), ?plan, "built execution plan");

        let declared = cx.threads_required();
        let required = self.slots.clamp(declared);
        if required < declared {
            info!(
                "overriding the {declared} threads required by {} because of the thread \
                 budget of {required}",
                cx.name(),
            );
            cx.set_threads_required(required);
        }

        // The guard releases the slots when dropped, including while unwinding.
        let guard = self.slots.acquire(required);
        debug!(test = cx.name(), slots = guard.slots(), "executing plan");
        let outcome = plan.execute(&mut cx, self.executor);
        drop(guard);

        Ok(outcome)
    }
}

impl std::fmt::Debug for TestRunDriver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestRunDriver")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("slots", &self.slots)
            .field("previous", &self.previous)
            .finish_non_exhaustive()
    }
}
