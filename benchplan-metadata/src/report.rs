// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{MetricValue, ResultKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The root of a benchplan JSON report.
///
/// Produced by `benchplan run --output <FILE>`, and read back as the previous-results store when
/// `previous-results` is enabled.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReportSummary {
    /// The version of the report format.
    #[serde(default)]
    pub format_version: u32,

    /// The time at which the run started, in RFC 3339 format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,

    /// The total wall-clock time the run took, in seconds.
    #[serde(default)]
    pub elapsed: f64,

    /// One entry per test, in the order tests finished.
    pub tests: Vec<TestReportEntry>,
}

impl ReportSummary {
    /// The current report format version.
    pub const FORMAT_VERSION: u32 = 1;

    /// Parses a report from a JSON string.
    pub fn parse_json(json: impl AsRef<str>) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json.as_ref())
    }

    /// Serializes this report to pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Returns the entry for the given test name, if present.
    ///
    /// If a test appears more than once, the last entry wins.
    pub fn find(&self, name: &str) -> Option<&TestReportEntry> {
        self.tests.iter().rev().find(|entry| entry.name == name)
    }
}

/// A single test's entry within a [`ReportSummary`].
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestReportEntry {
    /// The test identity, relative to the suite root.
    pub name: String,

    /// The result kind.
    pub code: ResultKind,

    /// How long the test took, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<f64>,

    /// Diagnostic output, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,

    /// Named metrics attached to the result.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, MetricValue>,
}
