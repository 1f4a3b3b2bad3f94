// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-test state owned by a single driver invocation.

use crate::{
    config::{HarnessConfig, ThreadsRequired},
    errors::{ContextInitError, DriverError},
    fingerprint::Fingerprint,
    test_file::TestDeclaration,
};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;

/// Filesystem locations associated with a test.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestPaths {
    /// The declaration file.
    pub source_path: Utf8PathBuf,

    /// The directory containing the declaration file.
    pub source_dir: Utf8PathBuf,

    /// The per-directory temporary directory: `<source_dir>/<output-dir>`.
    pub tmp_dir: Utf8PathBuf,

    /// The per-test temporary path prefix: `<tmp_dir>/<file name>`.
    pub tmp_base: Utf8PathBuf,
}

impl TestPaths {
    /// Computes the paths for the declaration at `source_path`.
    pub fn new(source_path: impl Into<Utf8PathBuf>, output_dir: &str) -> Self {
        let source_path = source_path.into();
        let source_dir = source_path
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_default();
        let tmp_dir = source_dir.join(output_dir);
        let tmp_base = match source_path.file_name() {
            Some(file_name) => tmp_dir.join(file_name),
            None => tmp_dir.join("test"),
        };

        Self {
            source_path,
            source_dir,
            tmp_dir,
            tmp_base,
        }
    }

    /// The default output file for the test: `<tmp_base>.out`.
    pub fn output_file(&self) -> Utf8PathBuf {
        format!("{}.out", self.tmp_base).into()
    }
}

/// Everything known about a single test while it is being run.
///
/// Created by the driver for one test, and never shared with another test. Test modules read it
/// while mutating the plan, and may annotate it through [`params_mut`](Self::params_mut).
#[derive(Clone, Debug)]
pub struct TestContext<'cfg> {
    config: &'cfg HarnessConfig,
    name: String,
    paths: TestPaths,
    declaration: TestDeclaration,
    threads_required: usize,
    params: IndexMap<String, String>,
    fingerprint: Option<Fingerprint>,
}

impl<'cfg> TestContext<'cfg> {
    /// Creates the temporary directory for a test, then parses its declaration.
    pub fn init(
        config: &'cfg HarnessConfig,
        name: impl Into<String>,
        source_path: impl Into<Utf8PathBuf>,
    ) -> Result<Self, DriverError> {
        let paths = TestPaths::new(source_path, config.output_dir());
        std::fs::create_dir_all(&paths.tmp_dir)
            .map_err(|err| ContextInitError::new(&paths.tmp_dir, err))?;
        let declaration = TestDeclaration::from_file(&paths)?;
        Ok(Self::new(config, name, paths, declaration))
    }

    /// Creates a context from an already-parsed declaration.
    pub fn new(
        config: &'cfg HarnessConfig,
        name: impl Into<String>,
        paths: TestPaths,
        declaration: TestDeclaration,
    ) -> Self {
        let threads_required = declaration.threads().compute();

        let mut params = IndexMap::new();
        params.insert(
            "executable".to_owned(),
            declaration.executable().to_string(),
        );
        params.insert("threads".to_owned(), declaration.threads().to_string());

        Self {
            config,
            name: name.into(),
            paths,
            declaration,
            threads_required,
            params,
            fingerprint: None,
        }
    }

    /// Returns the harness configuration.
    pub fn config(&self) -> &'cfg HarnessConfig {
        self.config
    }

    /// Returns the test's identity: its path relative to the suite root.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the test's filesystem locations.
    pub fn paths(&self) -> &TestPaths {
        &self.paths
    }

    /// Returns the parsed declaration.
    pub fn declaration(&self) -> &TestDeclaration {
        &self.declaration
    }

    /// Returns the main executable.
    pub fn executable(&self) -> &Utf8Path {
        self.declaration.executable()
    }

    /// Returns the number of slots this test needs.
    pub fn threads_required(&self) -> usize {
        self.threads_required
    }

    /// Overrides the number of slots this test needs.
    pub fn set_threads_required(&mut self, threads: usize) {
        self.threads_required = threads;
    }

    /// Returns the declared thread requirement, before any clamping.
    pub fn declared_threads(&self) -> ThreadsRequired {
        self.declaration.threads()
    }

    /// Returns the parameter bag.
    pub fn params(&self) -> &IndexMap<String, String> {
        &self.params
    }

    /// Returns the parameter bag for modification.
    pub fn params_mut(&mut self) -> &mut IndexMap<String, String> {
        &mut self.params
    }

    /// Returns the executable's fingerprint, if it has been computed.
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    pub(crate) fn set_fingerprint(&mut self, fingerprint: Fingerprint) -> &Fingerprint {
        self.params
            .insert("hash".to_owned(), fingerprint.as_str().to_owned());
        self.fingerprint.insert(fingerprint)
    }
}
