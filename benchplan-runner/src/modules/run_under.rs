// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::TestModule;
use crate::{
    context::TestContext,
    errors::StepError,
    plan::{ExecutionPlan, Invocation, RunStep},
};

/// Prefixes every command of the run script with the `run-under` config value, for example
/// `taskset -c 0` or a simulator.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunUnderModule;

impl TestModule for RunUnderModule {
    fn name(&self) -> &'static str {
        "run_under"
    }

    fn description(&self) -> &'static str {
        "run each command of the run script under the `run-under` command"
    }

    fn mutate_plan(
        &self,
        cx: &mut TestContext<'_>,
        plan: &mut ExecutionPlan,
    ) -> Result<(), StepError> {
        let run_under = cx.config().run_under();
        let prefix = shell_words::split(run_under).map_err(|err| {
            StepError::custom(format!("invalid run-under command `{run_under}`: {err}"))
        })?;
        if prefix.is_empty() {
            return Ok(());
        }

        cx.params_mut()
            .insert("run_under".to_owned(), run_under.to_owned());
        plan.add_run_step(RunUnder { prefix });
        Ok(())
    }
}

struct RunUnder {
    prefix: Vec<String>,
}

impl RunStep for RunUnder {
    fn name(&self) -> &str {
        "run_under"
    }

    fn before(
        &self,
        _cx: &mut TestContext<'_>,
        invocation: &mut Invocation,
    ) -> Result<(), StepError> {
        for command in invocation.iter_mut() {
            command.wrap(&self.prefix);
        }
        Ok(())
    }
}
