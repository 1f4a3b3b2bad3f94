// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING, StderrStyles};
use benchplan_metadata::BenchplanExitCode;
use benchplan_runner::errors::{
    ConfigParseError, DiscoverTestsError, PreviousResultsReadError, RunnerBuildError,
    UnknownModuleError, WriteReportError,
};
use camino::Utf8PathBuf;
use owo_colors::OwoColorize;
use std::{error::Error, path::PathBuf};
use thiserror::Error;
use tracing::error;

/// An error that was expected to occur, and that is reported without a backtrace.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not determine the current directory")]
    CurrentDirFailed {
        #[source]
        err: std::io::Error,
    },
    #[error("suite root is not valid UTF-8")]
    SuiteRootInvalidUtf8 { path: PathBuf },
    #[error("suite root `{suite_root}` is not a directory")]
    SuiteRootNotFound { suite_root: Utf8PathBuf },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("error discovering tests")]
    DiscoverTestsError {
        #[from]
        err: DiscoverTestsError,
    },
    #[error("unknown test module")]
    UnknownModule {
        #[from]
        err: UnknownModuleError,
    },
    #[error("error reading previous results")]
    PreviousResultsReadError {
        #[from]
        err: PreviousResultsReadError,
    },
    #[error("error building runner")]
    RunnerBuildError {
        #[from]
        err: RunnerBuildError,
    },
    #[error("error writing output")]
    WriteOutputError {
        #[source]
        err: std::io::Error,
    },
    #[error("error writing report")]
    WriteReportError {
        #[from]
        err: WriteReportError,
    },
    #[error("test run failed")]
    TestRunFailed,
    #[error("test setup failed")]
    TestSetupFailed,
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDirFailed { .. }
            | Self::SuiteRootInvalidUtf8 { .. }
            | Self::SuiteRootNotFound { .. }
            | Self::ConfigParseError { .. }
            | Self::DiscoverTestsError { .. }
            | Self::UnknownModule { .. }
            | Self::PreviousResultsReadError { .. }
            | Self::RunnerBuildError { .. } => BenchplanExitCode::SETUP_ERROR,
            Self::WriteOutputError { .. } | Self::WriteReportError { .. } => {
                BenchplanExitCode::WRITE_OUTPUT_ERROR
            }
            Self::TestRunFailed => BenchplanExitCode::TEST_RUN_FAILED,
            Self::TestSetupFailed => BenchplanExitCode::TEST_SETUP_FAILED,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::CurrentDirFailed { err } => {
                error!("could not determine the current directory");
                Some(err as &dyn Error)
            }
            Self::SuiteRootInvalidUtf8 { path } => {
                error!(
                    "suite root `{}` is not valid UTF-8",
                    path.display().style(styles.bold)
                );
                None
            }
            Self::SuiteRootNotFound { suite_root } => {
                error!(
                    "suite root `{}` is not a directory",
                    suite_root.style(styles.bold)
                );
                None
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse benchplan config at `{}`",
                    err.config_file().style(styles.bold)
                );
                err.source()
            }
            Self::DiscoverTestsError { err } => {
                error!("{err}");
                err.source()
            }
            Self::UnknownModule { err } => {
                error!("{err}");
                None
            }
            Self::PreviousResultsReadError { err } => {
                error!("{err}");
                err.source()
            }
            Self::RunnerBuildError { err } => {
                error!("{err}");
                err.source()
            }
            Self::WriteOutputError { err } => {
                error!("error writing output");
                Some(err as &dyn Error)
            }
            Self::WriteReportError { err } => {
                error!("{err}");
                err.source()
            }
            Self::TestRunFailed => {
                error!("test run failed");
                None
            }
            Self::TestSetupFailed => {
                error!("one or more tests could not be set up");
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
