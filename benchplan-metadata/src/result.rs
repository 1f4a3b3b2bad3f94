// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// The final kind of result a single test produced.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum ResultKind {
    /// The test ran and passed.
    #[serde(rename = "PASS")]
    Pass,

    /// The test ran and failed, or its execution could not complete.
    #[serde(rename = "FAIL")]
    Fail,

    /// The test is marked unsupported by configuration and was not run.
    #[serde(rename = "UNSUPPORTED")]
    Unsupported,

    /// The test executable is identical to the one recorded by a previous run, so execution
    /// was skipped.
    #[serde(rename = "NOCHANGE")]
    Unchanged,

    /// The executable the test requires does not exist on disk.
    #[serde(rename = "NOEXE")]
    MissingExecutable,
}

impl ResultKind {
    /// Returns the short code used in console output and reports.
    pub fn code(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Unsupported => "UNSUPPORTED",
            Self::Unchanged => "NOCHANGE",
            Self::MissingExecutable => "NOEXE",
        }
    }

    /// Returns a human-readable description of this kind.
    pub fn description(self) -> &'static str {
        match self {
            Self::Pass => "Passed",
            Self::Fail => "Failed",
            Self::Unsupported => "Unsupported",
            Self::Unchanged => "Executable Unchanged",
            Self::MissingExecutable => "Executable Missing",
        }
    }

    /// Returns true if this result causes the overall run to fail.
    ///
    /// A missing executable is a failure: the suite was expected to be built.
    pub fn is_failure(self) -> bool {
        match self {
            Self::Fail | Self::MissingExecutable => true,
            Self::Pass | Self::Unsupported | Self::Unchanged => false,
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad(self.code())
    }
}

/// A named value attached to a test result.
///
/// Metrics are serialized untagged, so reports contain plain JSON numbers and strings.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// An integer value, for example a size in bytes.
    Integer(i64),

    /// A real value, for example a time in seconds.
    Real(f64),

    /// A textual value, for example a content hash.
    Text(String),
}

impl MetricValue {
    /// Returns the text contained in this value, if it is textual.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Integer(_) | Self::Real(_) => None,
        }
    }

    /// Returns this value as a float, if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Real(value) => Some(*value),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value:.4}"),
            Self::Text(text) => f.pad(text),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}
