// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `benchplan` failures.
///
/// `benchplan` runs may fail for a variety of reasons. This structure documents the exit codes
/// that may occur in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum BenchplanExitCode {}

impl BenchplanExitCode {
    /// No errors occurred and benchplan exited normally.
    pub const OK: i32 = 0;

    /// No tests were selected to run, but no other errors occurred.
    pub const NO_TESTS_RUN: i32 = 4;

    /// A user issue happened while setting up a benchplan invocation: for example, the config
    /// file could not be parsed.
    pub const SETUP_ERROR: i32 = 96;

    /// One or more tests failed, or had a missing executable.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// Setting up one or more tests failed: a test file was malformed, or the configuration
    /// named an unknown test module.
    ///
    /// Takes precedence over [`TEST_RUN_FAILED`](Self::TEST_RUN_FAILED).
    pub const TEST_SETUP_FAILED: i32 = 104;

    /// Writing data to stdout, stderr or the report file produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}
