// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Discovery of the tests in a suite.

use crate::errors::DiscoverTestsError;
use camino::{Utf8Path, Utf8PathBuf};
use owo_colors::{OwoColorize, Style};
use std::io::{self, Write};
use walkdir::WalkDir;

/// The extension of test declaration files.
pub const TEST_FILE_EXTENSION: &str = "test";

/// A single test to run.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TestInstance {
    /// The test identity: the path of its declaration relative to the suite root, with `/`
    /// separators.
    pub name: String,

    /// The path to the declaration file.
    pub path: Utf8PathBuf,
}

/// The list of tests in a run, sorted by name.
#[derive(Clone, Debug, Default)]
pub struct TestList {
    suite_root: Utf8PathBuf,
    tests: Vec<TestInstance>,
}

impl TestList {
    /// Finds every `.test` file under the given paths.
    ///
    /// Relative paths are resolved against the suite root. A path naming a file adds that file
    /// whatever its extension; a path naming a directory is walked recursively. If `paths` is
    /// empty the whole suite root is walked. Duplicates are removed.
    pub fn discover(
        suite_root: impl Into<Utf8PathBuf>,
        paths: &[Utf8PathBuf],
    ) -> Result<Self, DiscoverTestsError> {
        let suite_root = suite_root.into();
        let roots: Vec<Utf8PathBuf> = if paths.is_empty() {
            vec![suite_root.clone()]
        } else {
            paths.iter().map(|path| suite_root.join(path)).collect()
        };

        let mut tests = Vec::new();
        for root in roots {
            if !root.exists() {
                return Err(DiscoverTestsError::NotFound(root));
            }
            if root.is_file() {
                tests.push(TestInstance::new(&suite_root, root));
                continue;
            }

            for entry in WalkDir::new(&root).follow_links(true) {
                let entry = entry.map_err(|err| DiscoverTestsError::Walk {
                    root: root.clone(),
                    err,
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = Utf8PathBuf::from_path_buf(entry.into_path())
                    .map_err(DiscoverTestsError::NonUtf8Path)?;
                if path.extension() == Some(TEST_FILE_EXTENSION) {
                    tests.push(TestInstance::new(&suite_root, path));
                }
            }
        }

        tests.sort();
        tests.dedup();
        Ok(Self { suite_root, tests })
    }

    /// Creates a list from the given tests.
    pub fn new(suite_root: impl Into<Utf8PathBuf>, mut tests: Vec<TestInstance>) -> Self {
        tests.sort();
        tests.dedup();
        Self {
            suite_root: suite_root.into(),
            tests,
        }
    }

    /// Returns the suite root.
    pub fn suite_root(&self) -> &Utf8Path {
        &self.suite_root
    }

    /// Returns the number of tests.
    pub fn run_count(&self) -> usize {
        self.tests.len()
    }

    /// Iterates over the tests in order.
    pub fn iter_tests(&self) -> impl Iterator<Item = &TestInstance> + '_ {
        self.tests.iter()
    }

    /// Writes the list in human-readable form, one test per line.
    pub fn write_human(&self, mut writer: impl Write, colorize: bool) -> io::Result<()> {
        let mut styles = Styles::default();
        if colorize {
            styles.colorize();
        }

        for test in &self.tests {
            match test.name.rsplit_once('/') {
                Some((dir, file)) => writeln!(
                    writer,
                    "{}/{}",
                    dir.style(styles.dir),
                    file.style(styles.name)
                )?,
                None => writeln!(writer, "{}", test.name.style(styles.name))?,
            }
        }
        Ok(())
    }
}

impl TestInstance {
    /// Creates a new instance, naming it after its path relative to the suite root.
    pub fn new(suite_root: &Utf8Path, path: impl Into<Utf8PathBuf>) -> Self {
        let path = path.into();
        let relative = path.strip_prefix(suite_root).unwrap_or(&path);
        let name = relative
            .components()
            .map(|component| component.as_str())
            .collect::<Vec<_>>()
            .join("/");
        Self { name, path }
    }
}

#[derive(Clone, Debug, Default)]
struct Styles {
    dir: Style,
    name: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.dir = Style::new().dimmed();
        self.name = Style::new().bold();
    }
}
