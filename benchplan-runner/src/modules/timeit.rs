// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::TestModule;
use crate::{
    context::TestContext,
    errors::StepError,
    plan::{ExecutionPlan, Invocation, RawOutcome, RunNext, RunStep},
};
use std::time::Instant;

/// Measures the wall-clock time of the run script, reported as the `exec_time` metric in
/// seconds.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeitModule;

impl TestModule for TimeitModule {
    fn name(&self) -> &'static str {
        "timeit"
    }

    fn description(&self) -> &'static str {
        "measure the run script's wall-clock time as the `exec_time` metric"
    }

    fn mutate_plan(
        &self,
        _cx: &mut TestContext<'_>,
        plan: &mut ExecutionPlan,
    ) -> Result<(), StepError> {
        plan.add_run_step(Timeit);
        Ok(())
    }
}

struct Timeit;

impl RunStep for Timeit {
    fn name(&self) -> &str {
        "timeit"
    }

    fn run(
        &self,
        cx: &mut TestContext<'_>,
        invocation: Invocation,
        next: RunNext<'_>,
    ) -> Result<RawOutcome, StepError> {
        // Time everything inside this step, including steps registered after it.
        let start = Instant::now();
        let mut outcome = next.run(cx, invocation)?;
        let elapsed = start.elapsed();
        outcome
            .metrics
            .insert("exec_time".to_owned(), elapsed.as_secs_f64().into());
        Ok(outcome)
    }
}
