// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::TestModule;
use crate::{
    context::TestContext,
    errors::StepError,
    fingerprint,
    plan::{ExecutionPlan, ResultStep, TestOutcome},
};

/// Attaches the executable's fingerprint to the result as the `hash` metric.
///
/// Recording the fingerprint is what allows a later run with `previous-results` enabled to skip
/// the test if its executable hasn't changed.
#[derive(Clone, Copy, Debug, Default)]
pub struct HashModule;

impl TestModule for HashModule {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn description(&self) -> &'static str {
        "record a fingerprint of the executable as the `hash` metric"
    }

    fn mutate_plan(
        &self,
        cx: &mut TestContext<'_>,
        plan: &mut ExecutionPlan,
    ) -> Result<(), StepError> {
        fingerprint::compute(cx)?;
        plan.add_result_step(HashMetric);
        Ok(())
    }
}

struct HashMetric;

impl ResultStep for HashMetric {
    fn name(&self) -> &str {
        "hash"
    }

    fn process(
        &self,
        cx: &mut TestContext<'_>,
        outcome: &mut TestOutcome,
    ) -> Result<(), StepError> {
        let fingerprint = fingerprint::compute(cx)?;
        outcome.add_metric("hash", fingerprint.as_str());
        Ok(())
    }
}
