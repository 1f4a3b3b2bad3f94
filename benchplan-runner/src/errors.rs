// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by benchplan.

use camino::{Utf8Path, Utf8PathBuf};
use config::ConfigError;
use itertools::Itertools;
use std::{borrow::Cow, fmt};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse benchplan config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8Path {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// Error returned while parsing a [`NumThreads`](crate::config::NumThreads) or
/// [`ThreadsRequired`](crate::config::ThreadsRequired) value from a string.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct ThreadCountParseError {
    message: Cow<'static, str>,
}

impl ThreadCountParseError {
    pub(crate) fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An error that occurred while parsing a test declaration file.
#[derive(Debug, Error)]
#[error("failed to parse test file `{path}`")]
pub struct TestFileParseError {
    path: Utf8PathBuf,
    #[source]
    kind: TestFileParseErrorKind,
}

impl TestFileParseError {
    pub(crate) fn new(path: impl Into<Utf8PathBuf>, kind: TestFileParseErrorKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Returns the path to the test file.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &TestFileParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a test declaration file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestFileParseErrorKind {
    /// The file could not be read.
    #[error("error reading file")]
    Read(#[source] std::io::Error),

    /// The file did not contain any `RUN:` lines.
    #[error("no `RUN:` lines found")]
    NoRunLines,

    /// A `THREADS:` line was specified more than once.
    #[error("line {line}: `THREADS:` specified more than once")]
    DuplicateThreads {
        /// The 1-based line number.
        line: usize,
    },

    /// A `THREADS:` line had an invalid value.
    #[error("line {line}: invalid `THREADS:` value")]
    InvalidThreads {
        /// The 1-based line number.
        line: usize,

        /// The underlying error.
        #[source]
        err: ThreadCountParseError,
    },

    /// A `METRIC:` line did not have the form `METRIC: <name>: <command>`.
    #[error("line {line}: expected `METRIC: <name>: <command>`")]
    InvalidMetric {
        /// The 1-based line number.
        line: usize,
    },

    /// A command could not be split into words.
    #[error("line {line}: invalid quoting in `{command}`")]
    InvalidQuoting {
        /// The 1-based line number.
        line: usize,

        /// The command that failed to parse.
        command: String,

        /// The underlying error.
        #[source]
        err: shell_words::ParseError,
    },

    /// A command was empty after parsing.
    #[error("line {line}: empty command")]
    EmptyCommand {
        /// The 1-based line number.
        line: usize,
    },

    /// A redirection operator was not followed by a path.
    #[error("line {line}: `{operator}` is not followed by a path")]
    DanglingRedirect {
        /// The 1-based line number.
        line: usize,

        /// The redirection operator.
        operator: &'static str,
    },

    /// An unknown `%` substitution was used.
    #[error("line {line}: unknown substitution `%{substitution}`")]
    UnknownSubstitution {
        /// The 1-based line number.
        line: usize,

        /// The character after the `%`.
        substitution: char,
    },
}

/// An error that occurred while preparing a test's context.
#[derive(Debug, Error)]
#[error("error creating temporary directory `{dir}`")]
pub struct ContextInitError {
    dir: Utf8PathBuf,
    #[source]
    err: std::io::Error,
}

impl ContextInitError {
    pub(crate) fn new(dir: impl Into<Utf8PathBuf>, err: std::io::Error) -> Self {
        Self {
            dir: dir.into(),
            err,
        }
    }
}

/// A test module was requested by configuration but is not known to the registry.
#[derive(Clone, Debug, Error)]
#[error(
    "unknown test module `{name}` (known modules: {})",
    .known_modules.iter().join(", ")
)]
pub struct UnknownModuleError {
    name: String,
    known_modules: Vec<String>,
}

impl UnknownModuleError {
    pub(crate) fn new(
        name: impl Into<String>,
        known_modules: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut known_modules: Vec<_> = known_modules.into_iter().map(|s| s.into()).collect();
        known_modules.sort_unstable();
        Self {
            name: name.into(),
            known_modules,
        }
    }

    /// Returns the name of the unknown module.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// An error that occurred while computing a content fingerprint.
#[derive(Debug, Error)]
#[error("error reading `{path}` to compute its fingerprint")]
pub struct FingerprintError {
    path: Utf8PathBuf,
    #[source]
    err: std::io::Error,
}

impl FingerprintError {
    pub(crate) fn new(path: impl Into<Utf8PathBuf>, err: std::io::Error) -> Self {
        Self {
            path: path.into(),
            err,
        }
    }
}

/// An error that occurred while reading a previous-results report.
#[derive(Debug, Error)]
pub enum PreviousResultsReadError {
    /// The report file could not be read.
    #[error("error reading previous results from `{path}`")]
    Read {
        /// The path to the report.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// The report file could not be parsed.
    #[error("error parsing previous results from `{path}`")]
    Parse {
        /// The path to the report.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: serde_json::Error,
    },
}

/// An error that aborted the setup of a single test before it produced a result.
///
/// These errors are reported at the harness level rather than as a test result: they indicate
/// a problem with the test declaration or with configuration, not with the code under test.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The test file could not be parsed.
    #[error(transparent)]
    TestFileParse(#[from] TestFileParseError),

    /// The test context could not be initialized.
    #[error(transparent)]
    ContextInit(#[from] ContextInitError),

    /// The configuration named a test module that doesn't exist.
    #[error(transparent)]
    UnknownModule(#[from] UnknownModuleError),

    /// The driver panicked while running the test.
    #[error("test run panicked: {message}")]
    Panicked {
        /// The panic message, if it was a string.
        message: String,
    },
}

/// An error that occurred while building a test's execution plan.
#[derive(Debug, Error)]
pub enum PlanBuildError {
    /// The configuration named a test module that doesn't exist.
    ///
    /// This is a configuration error, and aborts plan construction before any module runs.
    #[error(transparent)]
    UnknownModule(#[from] UnknownModuleError),

    /// A module failed while mutating the plan.
    #[error("test module `{module}` failed to set up the plan")]
    Module {
        /// The name of the module that failed.
        module: String,

        /// The underlying error.
        #[source]
        err: StepError,
    },
}

/// An error raised by a step of an execution plan.
///
/// Step errors never escape a test run: the driver converts them into a failed result carrying
/// the error message as diagnostic output.
#[derive(Debug, Error)]
pub enum StepError {
    /// A command could not be started.
    #[error("failed to start `{command}`")]
    Spawn {
        /// The command line.
        command: String,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// An I/O error occurred while waiting for or collecting output from a command.
    #[error("error waiting for `{command}`")]
    Wait {
        /// The command line.
        command: String,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// Information about the executable could not be read.
    #[error("error reading `{path}`")]
    ReadExecutable {
        /// The path to the executable.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// A fingerprint could not be computed.
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),

    /// A metric script produced output that isn't a number.
    #[error("metric `{name}` produced non-numeric output `{output}`")]
    InvalidMetric {
        /// The metric name.
        name: String,

        /// The trimmed output.
        output: String,
    },

    /// A custom error raised by a test module.
    #[error("{message}")]
    Custom {
        /// The error message.
        message: String,
    },
}

impl StepError {
    /// Creates a custom step error with the given message.
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom {
            message: message.into(),
        }
    }
}

/// An error that occurred while writing a report.
#[derive(Debug, Error)]
pub enum WriteReportError {
    /// The report could not be serialized.
    #[error("error serializing report")]
    Serialize(#[source] serde_json::Error),

    /// The report could not be written to disk.
    #[error("error writing report to `{path}`")]
    Write {
        /// The path to the report.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },
}

/// An error that occurred while discovering tests.
#[derive(Debug, Error)]
pub enum DiscoverTestsError {
    /// A directory could not be walked.
    #[error("error walking `{root}`")]
    Walk {
        /// The root being walked.
        root: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: walkdir::Error,
    },

    /// A path was not valid UTF-8.
    #[error("path `{}` is not valid UTF-8", .0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// A path given on the command line does not exist.
    #[error("test path `{0}` does not exist")]
    NotFound(Utf8PathBuf),
}

/// An error that occurred while building the suite runner.
#[derive(Debug, Error)]
#[error("error creating worker thread pool")]
pub struct RunnerBuildError(#[source] pub(crate) rayon::ThreadPoolBuildError);

/// Displays an error along with its chain of sources, one per line.
///
/// Used to turn step errors into diagnostic output for a failed result.
pub struct DisplayErrorChain<E>(E);

impl<E: std::error::Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self(error)
    }
}

impl<E: std::error::Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(err) = source {
            write!(f, "\n  caused by: {err}")?;
            source = err.source();
        }
        Ok(())
    }
}
