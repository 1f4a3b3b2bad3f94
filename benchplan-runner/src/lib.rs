// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for benchplan, a harness for running benchmark suites.
//!
//! The basic flow of a run is:
//!
//! 1. Configuration is read into a [`HarnessConfig`](config::HarnessConfig).
//! 2. Tests are discovered into a [`TestList`](list::TestList).
//! 3. A [`SuiteRunner`](runner::SuiteRunner) hands each test to a
//!    [`TestRunDriver`](driver::TestRunDriver), which builds an
//!    [`ExecutionPlan`](plan::ExecutionPlan) from the configured test modules, waits for enough
//!    slots from the shared [`SlotController`](slots::SlotController), and executes the plan.
//! 4. Results are reported by a [`TestReporter`](reporter::TestReporter).

pub mod config;
pub mod context;
pub mod driver;
pub mod errors;
pub mod fingerprint;
pub mod list;
pub mod modules;
pub mod plan;
pub mod reporter;
pub mod runner;
pub mod slots;
mod stopwatch;
pub mod test_file;
