// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::NumThreads;
use crate::errors::{ConfigParseError, ConfigParseErrorKind};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{collections::BTreeSet, time::Duration};

/// Harness-wide configuration for a benchplan run.
///
/// Read with [`from_sources`](Self::from_sources), then adjusted with
/// [`apply_overrides`](Self::apply_overrides). After that the config is read-only and shared
/// by every test driver.
#[derive(Clone, Debug)]
pub struct HarnessConfig {
    suite_root: Utf8PathBuf,
    unsupported: bool,
    no_execute: bool,
    previous_results: bool,
    previous_results_file: Utf8PathBuf,
    test_modules: Vec<String>,
    num_threads: NumThreads,
    run_under: String,
    output_dir: String,
    timeout: Option<Duration>,
}

impl HarnessConfig {
    /// The location of the config within a suite root.
    pub const CONFIG_PATH: &'static str = "benchplan.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Suite-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// Reads the config from the given file, or if not specified from `benchplan.toml` in the
    /// suite root.
    ///
    /// If the file isn't specified and the suite root doesn't have `benchplan.toml`, uses the
    /// default config options. Keys that aren't recognized are passed to `unknown_callback`.
    pub fn from_sources(
        suite_root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
        mut unknown_callback: impl FnMut(&Utf8Path, &BTreeSet<String>),
    ) -> Result<Self, ConfigParseError> {
        let suite_root = suite_root.into();

        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = suite_root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let (deserialized, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;

        if !unknown.is_empty() {
            unknown_callback(&config_file, &unknown);
        }

        Ok(deserialized.into_config(suite_root))
    }

    /// Returns the default config for the given suite root.
    pub fn default_config(suite_root: impl Into<Utf8PathBuf>) -> Self {
        let (deserialized, _) = Self::build_and_deserialize_config(&Self::make_default_config())
            .unwrap_or_else(|err| panic!("default config is always valid: {err}"));
        deserialized.into_config(suite_root.into())
    }

    /// Applies command-line overrides to this config.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        let ConfigOverrides {
            no_execute,
            num_threads,
            previous_results_file,
            test_modules,
            run_under,
            timeout,
        } = overrides;

        if no_execute {
            self.no_execute = true;
        }
        if let Some(num_threads) = num_threads {
            self.num_threads = num_threads;
        }
        if let Some(file) = previous_results_file {
            // Naming a previous-results file on the command line implies comparing against it.
            self.previous_results = true;
            self.previous_results_file = file;
        }
        if let Some(test_modules) = test_modules {
            self.test_modules = test_modules;
        }
        if let Some(run_under) = run_under {
            self.run_under = run_under;
        }
        if let Some(timeout) = timeout {
            self.timeout = Some(timeout);
        }
    }

    /// Returns the root of the test suite.
    pub fn suite_root(&self) -> &Utf8Path {
        &self.suite_root
    }

    /// Returns true if every test in the suite is unsupported.
    pub fn unsupported(&self) -> bool {
        self.unsupported
    }

    /// Returns true if this is a dry run.
    pub fn no_execute(&self) -> bool {
        self.no_execute
    }

    /// Returns true if executables should be compared against a previous run.
    pub fn previous_results(&self) -> bool {
        self.previous_results
    }

    /// Returns the path to the previous run's report.
    pub fn previous_results_file(&self) -> Utf8PathBuf {
        self.suite_root.join(&self.previous_results_file)
    }

    /// Returns the names of the test modules applied to each plan, in order.
    pub fn test_modules(&self) -> &[String] {
        &self.test_modules
    }

    /// Returns the global thread budget.
    pub fn num_threads(&self) -> NumThreads {
        self.num_threads
    }

    /// Returns the command prefix used by the `run_under` module.
    pub fn run_under(&self) -> &str {
        &self.run_under
    }

    /// Returns the name of the per-test temporary directory.
    pub fn output_dir(&self) -> &str {
        &self.output_dir
    }

    /// Returns the per-command timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(HarnessConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: HarnessConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // Both serde_path_to_error and the config crate report the key. Drop the key
                // from the config error so it's only printed once.
                let path = error.path().clone();
                let config_error = error.into_inner();
                let error = match config_error {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, ignored))
    }
}

/// Command-line overrides for a [`HarnessConfig`].
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Perform a dry run.
    pub no_execute: bool,

    /// Override the global thread budget.
    pub num_threads: Option<NumThreads>,

    /// Compare against this previous-results file, enabling `previous-results`.
    pub previous_results_file: Option<Utf8PathBuf>,

    /// Replace the list of test modules.
    pub test_modules: Option<Vec<String>>,

    /// Replace the `run-under` command prefix.
    pub run_under: Option<String>,

    /// Set a per-command timeout.
    pub timeout: Option<Duration>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct HarnessConfigDeserialize {
    unsupported: bool,
    no_execute: bool,
    previous_results: bool,
    previous_results_file: Utf8PathBuf,
    #[serde(default)]
    test_modules: Vec<String>,
    num_threads: NumThreads,
    #[serde(default)]
    run_under: String,
    output_dir: String,
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
}

impl HarnessConfigDeserialize {
    fn into_config(self, suite_root: Utf8PathBuf) -> HarnessConfig {
        HarnessConfig {
            suite_root,
            unsupported: self.unsupported,
            no_execute: self.no_execute,
            previous_results: self.previous_results,
            previous_results_file: self.previous_results_file,
            test_modules: self.test_modules,
            num_threads: self.num_threads,
            run_under: self.run_under,
            output_dir: self.output_dir,
            timeout: self.timeout,
        }
    }
}
