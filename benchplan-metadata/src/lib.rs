// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Structured access to benchplan results.
//!
//! This crate holds the vocabulary shared between the benchplan runner and anything that
//! consumes its output: the kinds of result a test can produce, metric values, the JSON report
//! format, and documented process exit codes.
//!
//! The report format is also what the runner reads back as its previous-results store, so
//! changes to [`ReportSummary`] must remain backwards-compatible.

mod exit_codes;
mod report;
mod result;

pub use exit_codes::*;
pub use report::*;
pub use result::*;
