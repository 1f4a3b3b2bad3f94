// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Execution plans.
//!
//! An [`ExecutionPlan`] describes how to run one test: the scripts it runs, and the chains of
//! [`RunStep`]s and [`ResultStep`]s that test modules wrap around them. A plan is built fresh for
//! every test run and executed exactly once.
//!
//! Execution proceeds in three phases:
//!
//! 1. The prepare script runs on its own, outside any step.
//! 2. The run script is passed through the run chain. The innermost layer is the
//!    [`CommandExecutor`], which produces a [`RawOutcome`].
//! 3. The raw outcome is passed through the result chain. The innermost layer evaluates the
//!    outcome, runs the verify script and the metric scripts, and produces a [`TestOutcome`].

mod command;
mod executor;
mod steps;

pub use command::*;
pub use executor::*;
pub use steps::*;

use crate::{
    context::TestContext,
    errors::{DisplayErrorChain, StepError},
    stopwatch::stopwatch,
};
use benchplan_metadata::{MetricValue, ResultKind};
use indexmap::IndexMap;
use std::time::Duration;
use tracing::debug;

/// The final result of running a test.
#[derive(Clone, Debug, PartialEq)]
pub struct TestOutcome {
    /// The result kind.
    pub kind: ResultKind,

    /// Named metrics, in the order they were attached.
    pub metrics: IndexMap<String, MetricValue>,

    /// Diagnostic output. Empty for most passing tests.
    pub output: String,

    /// How long the plan took to execute. Zero for tests that never executed.
    pub elapsed: Duration,
}

impl TestOutcome {
    /// Creates a new outcome with no metrics.
    pub fn new(kind: ResultKind, output: impl Into<String>) -> Self {
        Self {
            kind,
            metrics: IndexMap::new(),
            output: output.into(),
            elapsed: Duration::ZERO,
        }
    }

    /// Creates a failed outcome describing an error and its causes.
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        Self::new(ResultKind::Fail, DisplayErrorChain::new(error).to_string())
    }

    /// Attaches a metric, replacing any previous value with the same name.
    pub fn add_metric(&mut self, name: impl Into<String>, value: impl Into<MetricValue>) {
        self.metrics.insert(name.into(), value.into());
    }

    /// Attaches a metric and returns `self`.
    pub fn with_metric(mut self, name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.add_metric(name, value);
        self
    }
}

/// A composed plan for running a single test.
pub struct ExecutionPlan {
    prepare: Invocation,
    run: Invocation,
    verify: Invocation,
    metric_scripts: IndexMap<String, Invocation>,
    run_steps: Vec<Box<dyn RunStep>>,
    result_steps: Vec<Box<dyn ResultStep>>,
}

impl ExecutionPlan {
    /// Creates a plan with the given run script and nothing else.
    pub fn new(run: Invocation) -> Self {
        Self {
            prepare: Invocation::default(),
            run,
            verify: Invocation::default(),
            metric_scripts: IndexMap::new(),
            run_steps: Vec::new(),
            result_steps: Vec::new(),
        }
    }

    /// Creates a plan running the scripts declared by the test, with no steps.
    pub fn from_context(cx: &TestContext<'_>) -> Self {
        let declaration = cx.declaration();
        Self {
            prepare: Invocation::new(declaration.prepare().iter().cloned()),
            run: Invocation::new(declaration.run().iter().cloned()),
            verify: Invocation::new(declaration.verify().iter().cloned()),
            metric_scripts: declaration
                .metric_scripts()
                .iter()
                .map(|(name, commands)| (name.clone(), Invocation::new(commands.iter().cloned())))
                .collect(),
            run_steps: Vec::new(),
            result_steps: Vec::new(),
        }
    }

    /// Wraps the run script in another step.
    pub fn add_run_step(&mut self, step: impl RunStep + 'static) {
        self.run_steps.push(Box::new(step));
    }

    /// Wraps result processing in another step.
    pub fn add_result_step(&mut self, step: impl ResultStep + 'static) {
        self.result_steps.push(Box::new(step));
    }

    /// Returns the prepare script for modification.
    pub fn prepare_mut(&mut self) -> &mut Invocation {
        &mut self.prepare
    }

    /// Returns the run script.
    pub fn run_script(&self) -> &Invocation {
        &self.run
    }

    /// Returns the run script for modification.
    pub fn run_script_mut(&mut self) -> &mut Invocation {
        &mut self.run
    }

    /// Returns the verify script for modification.
    pub fn verify_mut(&mut self) -> &mut Invocation {
        &mut self.verify
    }

    /// Returns the metric scripts for modification.
    pub fn metric_scripts_mut(&mut self) -> &mut IndexMap<String, Invocation> {
        &mut self.metric_scripts
    }

    /// Returns the names of the run steps, outermost first.
    pub fn run_step_names(&self) -> impl Iterator<Item = &str> {
        self.run_steps.iter().map(|step| step.name())
    }

    /// Returns the names of the result steps, outermost first.
    pub fn result_step_names(&self) -> impl Iterator<Item = &str> {
        self.result_steps.iter().map(|step| step.name())
    }

    /// Executes the plan.
    ///
    /// This never fails: errors raised by a step or by the executor become a failed outcome
    /// carrying the error as diagnostic output.
    pub fn execute(
        &self,
        cx: &mut TestContext<'_>,
        executor: &dyn CommandExecutor,
    ) -> TestOutcome {
        let stopwatch = stopwatch();
        let mut outcome = match self.execute_inner(cx, executor) {
            Ok(outcome) => outcome,
            Err(error) => {
                debug!(test = cx.name(), %error, "plan execution raised an error");
                TestOutcome::from_error(&error)
            }
        };
        outcome.elapsed = stopwatch.snapshot().duration;
        outcome
    }

    fn execute_inner(
        &self,
        cx: &mut TestContext<'_>,
        executor: &dyn CommandExecutor,
    ) -> Result<TestOutcome, StepError> {
        let timeout = cx.config().timeout();

        if !self.prepare.is_empty() {
            let prepared = executor.execute(&self.prepare, timeout)?;
            if !prepared.status.is_success() {
                let mut output = format!("preparation failed: {}\n", prepared.status);
                output.push_str(&prepared.diagnostic_output());
                return Ok(TestOutcome::new(ResultKind::Fail, output));
            }
        }

        let raw = RunNext::new(&self.run_steps, executor, timeout).run(cx, self.run.clone())?;

        let core = EvaluateCore {
            verify: &self.verify,
            metric_scripts: &self.metric_scripts,
            executor,
            timeout,
        };
        ResultNext::new(&self.result_steps, &core).run(cx, raw)
    }
}

impl std::fmt::Debug for ExecutionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionPlan")
            .field("prepare", &self.prepare)
            .field("run", &self.run)
            .field("verify", &self.verify)
            .field("metric_scripts", &self.metric_scripts)
            .field("run_steps", &self.run_step_names().collect::<Vec<_>>())
            .field("result_steps", &self.result_step_names().collect::<Vec<_>>())
            .finish()
    }
}

struct EvaluateCore<'a> {
    verify: &'a Invocation,
    metric_scripts: &'a IndexMap<String, Invocation>,
    executor: &'a dyn CommandExecutor,
    timeout: Option<Duration>,
}

impl EvaluateOutcome for EvaluateCore<'_> {
    fn evaluate(
        &self,
        _cx: &mut TestContext<'_>,
        raw: RawOutcome,
    ) -> Result<TestOutcome, StepError> {
        let mut outcome = TestOutcome::new(ResultKind::Pass, "");
        outcome.metrics = raw.metrics.clone();

        if !raw.status.is_success() {
            outcome.kind = ResultKind::Fail;
            outcome.output = format!("{}\n{}", raw.status, raw.diagnostic_output());
            return Ok(outcome);
        }

        if !self.verify.is_empty() {
            let verified = self.executor.execute(self.verify, self.timeout)?;
            if !verified.status.is_success() {
                outcome.kind = ResultKind::Fail;
                outcome.output = format!(
                    "verification failed: {}\n{}",
                    verified.status,
                    verified.diagnostic_output()
                );
                return Ok(outcome);
            }
        }

        for (name, script) in self.metric_scripts {
            let collected = self.executor.execute(script, self.timeout)?;
            if !collected.status.is_success() {
                outcome.kind = ResultKind::Fail;
                outcome.output = format!(
                    "metric `{name}` failed: {}\n{}",
                    collected.status,
                    collected.diagnostic_output()
                );
                return Ok(outcome);
            }
            let value = parse_metric(name, &collected.stdout)?;
            outcome.add_metric(name.clone(), value);
        }

        Ok(outcome)
    }
}

fn parse_metric(name: &str, stdout: &str) -> Result<MetricValue, StepError> {
    let trimmed = stdout.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Ok(MetricValue::Integer(value));
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(MetricValue::Real(value)),
        _ => Err(StepError::InvalidMetric {
            name: name.to_owned(),
            output: trimmed.to_owned(),
        }),
    }
}
