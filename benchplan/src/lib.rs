// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A harness for running benchmark suites.
//!
//! Tests are declared in `.test` files within a suite. For each test, benchplan builds an
//! execution plan from the configured test modules, waits until enough of the global thread
//! budget is free, and runs the plan.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::OutputContext;
