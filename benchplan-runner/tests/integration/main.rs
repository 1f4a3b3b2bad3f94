// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the benchplan runner.
//!
//! Most tests use a fake executor that records what it is asked to run, so they exercise the
//! driver's control flow without depending on the host system.

mod driver;
mod fixtures;
mod runner;
