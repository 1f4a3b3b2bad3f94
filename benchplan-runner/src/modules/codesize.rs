// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::TestModule;
use crate::{
    context::TestContext,
    errors::StepError,
    plan::{ExecutionPlan, ResultStep, TestOutcome},
};

/// Reports the size of the executable in bytes as the `size` metric.
#[derive(Clone, Copy, Debug, Default)]
pub struct CodesizeModule;

impl TestModule for CodesizeModule {
    fn name(&self) -> &'static str {
        "codesize"
    }

    fn description(&self) -> &'static str {
        "record the executable's size in bytes as the `size` metric"
    }

    fn mutate_plan(
        &self,
        _cx: &mut TestContext<'_>,
        plan: &mut ExecutionPlan,
    ) -> Result<(), StepError> {
        plan.add_result_step(Codesize);
        Ok(())
    }
}

struct Codesize;

impl ResultStep for Codesize {
    fn name(&self) -> &str {
        "codesize"
    }

    fn process(
        &self,
        cx: &mut TestContext<'_>,
        outcome: &mut TestOutcome,
    ) -> Result<(), StepError> {
        let executable = cx.executable();
        let metadata = std::fs::metadata(executable).map_err(|err| StepError::ReadExecutable {
            path: executable.to_owned(),
            err,
        })?;
        let size = i64::try_from(metadata.len()).unwrap_or(i64::MAX);
        outcome.add_metric("size", size);
        Ok(())
    }
}
