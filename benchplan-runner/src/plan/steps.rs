// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{CommandExecutor, Invocation, RawOutcome, TestOutcome};
use crate::{context::TestContext, errors::StepError};
use std::time::Duration;

/// A layer wrapped around the execution of a plan's run script.
///
/// Steps are composed in registration order: the first step registered is the outermost. Most
/// steps only need [`before`](Self::before) and [`after`](Self::after); a step that needs to
/// observe the whole inner execution (for example to time it) overrides [`run`](Self::run).
pub trait RunStep {
    /// The name of this step, used in logs.
    fn name(&self) -> &str;

    /// Called on the way in, before the inner steps run.
    fn before(
        &self,
        _cx: &mut TestContext<'_>,
        _invocation: &mut Invocation,
    ) -> Result<(), StepError> {
        Ok(())
    }

    /// Called on the way out, after the inner steps have run.
    fn after(&self, _cx: &mut TestContext<'_>, _outcome: &mut RawOutcome) -> Result<(), StepError> {
        Ok(())
    }

    /// Runs this step around the rest of the chain.
    fn run(
        &self,
        cx: &mut TestContext<'_>,
        mut invocation: Invocation,
        next: RunNext<'_>,
    ) -> Result<RawOutcome, StepError> {
        self.before(cx, &mut invocation)?;
        let mut outcome = next.run(cx, invocation)?;
        self.after(cx, &mut outcome)?;
        Ok(outcome)
    }
}

/// The remainder of a run chain, handed to each [`RunStep`].
pub struct RunNext<'a> {
    steps: &'a [Box<dyn RunStep>],
    executor: &'a dyn CommandExecutor,
    timeout: Option<Duration>,
}

impl<'a> RunNext<'a> {
    pub(super) fn new(
        steps: &'a [Box<dyn RunStep>],
        executor: &'a dyn CommandExecutor,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            steps,
            executor,
            timeout,
        }
    }

    /// Runs the remaining steps, and finally the commands themselves.
    pub fn run(
        self,
        cx: &mut TestContext<'_>,
        invocation: Invocation,
    ) -> Result<RawOutcome, StepError> {
        match self.steps.split_first() {
            Some((step, rest)) => step.run(
                cx,
                invocation,
                RunNext {
                    steps: rest,
                    ..self
                },
            ),
            None => self.executor.execute(&invocation, self.timeout),
        }
    }
}

/// A layer wrapped around result processing.
///
/// The innermost layer turns the raw outcome into a [`TestOutcome`], running verification and
/// metric scripts. Result steps compose like [`RunStep`]s: the first registered is outermost, so
/// it processes the outcome last.
pub trait ResultStep {
    /// The name of this step, used in logs.
    fn name(&self) -> &str;

    /// Annotates or adjusts the outcome produced by the inner steps.
    fn process(&self, cx: &mut TestContext<'_>, outcome: &mut TestOutcome)
    -> Result<(), StepError>;

    /// Runs this step around the rest of the chain.
    fn run(
        &self,
        cx: &mut TestContext<'_>,
        raw: RawOutcome,
        next: ResultNext<'_>,
    ) -> Result<TestOutcome, StepError> {
        let mut outcome = next.run(cx, raw)?;
        self.process(cx, &mut outcome)?;
        Ok(outcome)
    }
}

/// The core of result processing, at the center of every result chain.
pub(super) trait EvaluateOutcome {
    fn evaluate(&self, cx: &mut TestContext<'_>, raw: RawOutcome)
    -> Result<TestOutcome, StepError>;
}

/// The remainder of a result chain, handed to each [`ResultStep`].
pub struct ResultNext<'a> {
    steps: &'a [Box<dyn ResultStep>],
    core: &'a dyn EvaluateOutcome,
}

impl<'a> ResultNext<'a> {
    pub(super) fn new(steps: &'a [Box<dyn ResultStep>], core: &'a dyn EvaluateOutcome) -> Self {
        Self { steps, core }
    }

    /// Runs the remaining steps, and finally the core evaluation.
    pub fn run(
        self,
        cx: &mut TestContext<'_>,
        raw: RawOutcome,
    ) -> Result<TestOutcome, StepError> {
        match self.steps.split_first() {
            Some((step, rest)) => step.run(
                cx,
                raw,
                ResultNext {
                    steps: rest,
                    ..self
                },
            ),
            None => self.core.evaluate(cx, raw),
        }
    }
}
