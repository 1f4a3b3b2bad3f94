// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content fingerprints for test executables.
//!
//! When `previous-results` is enabled, a test whose executable is byte-for-byte identical to the
//! one recorded in the previous run's report is not run again.

use crate::{
    context::TestContext,
    errors::{FingerprintError, PreviousResultsReadError},
};
use benchplan_metadata::ReportSummary;
use camino::Utf8Path;
use std::{collections::HashMap, fmt, fs::File, io::Read};
use tracing::debug;
use xxhash_rust::xxh3::Xxh3;

/// A stable identity for the contents of a file: a 128-bit XXH3 digest, as 32 hex digits.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Creates a fingerprint from a recorded value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Computes the fingerprint of the given bytes.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Xxh3::new();
        hasher.update(bytes);
        Self::from_digest(hasher.digest128())
    }

    /// Computes the fingerprint of the file at `path`, reading it in chunks.
    pub fn of_file(path: &Utf8Path) -> Result<Self, FingerprintError> {
        let mut file = File::open(path).map_err(|err| FingerprintError::new(path, err))?;
        let mut hasher = Xxh3::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = file
                .read(&mut buf)
                .map_err(|err| FingerprintError::new(path, err))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self::from_digest(hasher.digest128()))
    }

    /// Returns the fingerprint as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_digest(digest: u128) -> Self {
        Self(format!("{digest:032x}"))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the fingerprint of the test's executable and stores it on the context.
///
/// If the fingerprint was already computed for this context, the stored value is returned.
pub fn compute<'a>(cx: &'a mut TestContext<'_>) -> Result<&'a Fingerprint, FingerprintError> {
    let fingerprint = match cx.fingerprint() {
        Some(fingerprint) => fingerprint.clone(),
        None => {
            let fingerprint = Fingerprint::of_file(cx.executable())?;
            debug!(
                test = cx.name(),
                %fingerprint,
                "computed executable fingerprint"
            );
            fingerprint
        }
    };
    Ok(cx.set_fingerprint(fingerprint))
}

/// Returns true if the fingerprint stored on the context matches the one recorded for the same
/// test in `previous`.
///
/// Returns false if the fingerprint hasn't been computed, or if there is no previous record for
/// this test.
pub fn same_as_previous(cx: &TestContext<'_>, previous: &PreviousResults) -> bool {
    match (cx.fingerprint(), previous.fingerprint(cx.name())) {
        (Some(current), Some(recorded)) => current == recorded,
        _ => false,
    }
}

/// Fingerprints recorded by a previous run, keyed by test name.
#[derive(Clone, Debug, Default)]
pub struct PreviousResults {
    hashes: HashMap<String, Fingerprint>,
}

impl PreviousResults {
    /// Returns an empty store, against which no test is ever unchanged.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Extracts the `hash` metric of every test in a report.
    pub fn from_report(report: &ReportSummary) -> Self {
        // Later entries for the same test overwrite earlier ones.
        let hashes = report
            .tests
            .iter()
            .filter_map(|entry| {
                let hash = entry.metrics.get("hash")?.as_text()?;
                Some((entry.name.clone(), Fingerprint::new(hash)))
            })
            .collect();
        Self { hashes }
    }

    /// Reads a report written by a previous run.
    pub fn read_from(path: &Utf8Path) -> Result<Self, PreviousResultsReadError> {
        let json =
            std::fs::read_to_string(path).map_err(|err| PreviousResultsReadError::Read {
                path: path.to_owned(),
                err,
            })?;
        let report =
            ReportSummary::parse_json(json).map_err(|err| PreviousResultsReadError::Parse {
                path: path.to_owned(),
                err,
            })?;
        Ok(Self::from_report(&report))
    }

    /// Records a fingerprint for a test.
    pub fn insert(&mut self, name: impl Into<String>, fingerprint: Fingerprint) {
        self.hashes.insert(name.into(), fingerprint);
    }

    /// Returns the recorded fingerprint for a test.
    pub fn fingerprint(&self, name: &str) -> Option<&Fingerprint> {
        self.hashes.get(name)
    }

    /// Returns the number of recorded fingerprints.
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}
