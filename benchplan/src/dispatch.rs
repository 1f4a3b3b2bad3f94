// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError,
    output::{OutputContext, OutputOpts, clap_styles},
};
use benchplan_metadata::BenchplanExitCode;
use benchplan_runner::{
    config::{ConfigOverrides, HarnessConfig, NumThreads, get_num_cpus},
    driver::TestRunDriver,
    fingerprint::PreviousResults,
    list::TestList,
    modules::ModuleRegistry,
    plan::ProcessExecutor,
    reporter::TestReporter,
    runner::SuiteRunner,
    slots::SlotController,
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use owo_colors::{OwoColorize, Style};
use std::{
    io::{self, Write},
    time::Duration,
};
use tracing::{info, warn};

/// A harness for running benchmark suites.
///
/// Tests are declared in `.test` files. Each test declares the commands to run, and the number of
/// threads it needs; tests run in parallel within a global thread budget.
#[derive(Debug, Parser)]
#[command(version, styles = clap_styles::style())]
pub struct BenchplanApp {
    #[command(flatten)]
    output: OutputOpts,

    #[command(flatten)]
    config_opts: ConfigOpts,

    #[command(subcommand)]
    command: Command,
}

impl BenchplanApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the exit code on success.
    pub fn exec(self, output: OutputContext) -> Result<i32, ExpectedError> {
        let suite_root = self.config_opts.suite_root()?;
        match self.command {
            Command::List { paths } => {
                let config = self.config_opts.make_config(&suite_root)?;
                let test_list = TestList::discover(config.suite_root(), &paths)?;
                if output.verbose {
                    info!(
                        "found {} tests in `{}`",
                        test_list.run_count(),
                        test_list.suite_root()
                    );
                }
                let mut stdout = io::stdout().lock();
                test_list
                    .write_human(&mut stdout, output.should_colorize_stdout())
                    .and_then(|()| stdout.flush())
                    .map_err(|err| ExpectedError::WriteOutputError { err })?;
                Ok(BenchplanExitCode::OK)
            }
            Command::Run(run_opts) => {
                let mut config = self.config_opts.make_config(&suite_root)?;
                config.apply_overrides(run_opts.config_overrides());
                run_opts.exec(&config, output)
            }
            Command::ShowModules => {
                let registry = ModuleRegistry::with_builtin_modules();
                let name_style = if output.should_colorize_stdout() {
                    Style::new().bold()
                } else {
                    Style::new()
                };
                let width = registry.names().map(str::len).max().unwrap_or_default();

                let mut stdout = io::stdout().lock();
                for module in registry.iter() {
                    writeln!(
                        stdout,
                        "{:<width$}  {}",
                        module.name().style(name_style),
                        module.description(),
                    )
                    .map_err(|err| ExpectedError::WriteOutputError { err })?;
                }
                Ok(BenchplanExitCode::OK)
            }
        }
    }
}

#[derive(Debug, Args)]
struct ConfigOpts {
    /// Root of the test suite [default: current directory]
    #[arg(long, global = true, value_name = "DIR")]
    suite_root: Option<Utf8PathBuf>,

    /// Config file [default: suite-root/benchplan.toml]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,
}

impl ConfigOpts {
    fn suite_root(&self) -> Result<Utf8PathBuf, ExpectedError> {
        let suite_root = match &self.suite_root {
            Some(suite_root) => suite_root.clone(),
            None => {
                let current_dir = std::env::current_dir()
                    .map_err(|err| ExpectedError::CurrentDirFailed { err })?;
                Utf8PathBuf::try_from(current_dir).map_err(|err| {
                    ExpectedError::SuiteRootInvalidUtf8 {
                        path: err.into_path_buf(),
                    }
                })?
            }
        };
        if !suite_root.is_dir() {
            return Err(ExpectedError::SuiteRootNotFound { suite_root });
        }
        Ok(suite_root)
    }

    fn make_config(&self, suite_root: &Utf8Path) -> Result<HarnessConfig, ExpectedError> {
        let config = HarnessConfig::from_sources(
            suite_root,
            self.config_file.as_deref(),
            |config_file, unknown| {
                let unknown_str = unknown
                    .iter()
                    .map(|key| key.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                warn!("ignoring unknown configuration keys in `{config_file}`: {unknown_str}");
            },
        )?;
        Ok(config)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the tests in the suite
    List {
        /// Test files or directories to list, relative to the suite root [default: all tests]
        #[arg(value_name = "PATHS")]
        paths: Vec<Utf8PathBuf>,
    },

    /// Run the tests in the suite
    ///
    /// Each test is run through the test modules named by `test-modules` in the config, and only
    /// starts once the threads it declares are free within the global thread budget.
    Run(RunOpts),

    /// Show the test modules that can be named in `test-modules`
    ShowModules,
}

#[derive(Debug, Args)]
struct RunOpts {
    /// Test files or directories to run, relative to the suite root [default: all tests]
    #[arg(value_name = "PATHS")]
    paths: Vec<Utf8PathBuf>,

    /// Global thread budget: a number, 0 for unlimited, or "num-cpus"
    #[arg(
        long,
        short = 'j',
        value_name = "THREADS",
        env = "BENCHPLAN_NUM_THREADS",
        allow_negative_numbers = true
    )]
    num_threads: Option<NumThreads>,

    /// Report every test as passing without running anything
    #[arg(long)]
    no_execute: bool,

    /// Skip tests whose executable is unchanged since this report, relative to the suite root
    #[arg(long, value_name = "FILE")]
    previous_results: Option<Utf8PathBuf>,

    /// Test modules to apply to each test, in order [default: from config]
    #[arg(long, value_delimiter = ',', value_name = "MODULES")]
    modules: Option<Vec<String>>,

    /// Command prefix used by the `run_under` module
    #[arg(long, value_name = "COMMAND")]
    run_under: Option<String>,

    /// Kill commands that run longer than this, e.g. "5m"
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Write a JSON report to this file
    #[arg(long, short = 'o', value_name = "FILE")]
    output: Option<Utf8PathBuf>,
}

impl RunOpts {
    fn config_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            no_execute: self.no_execute,
            num_threads: self.num_threads,
            previous_results_file: self.previous_results.clone(),
            test_modules: self.modules.clone(),
            run_under: self.run_under.clone(),
            timeout: self.timeout,
        }
    }

    fn exec(&self, config: &HarnessConfig, output: OutputContext) -> Result<i32, ExpectedError> {
        let test_list = TestList::discover(config.suite_root(), &self.paths)?;
        if test_list.run_count() == 0 {
            warn!("no tests to run");
            return Ok(BenchplanExitCode::NO_TESTS_RUN);
        }

        // Check module names up front, so a typo doesn't fail every test individually.
        let registry = ModuleRegistry::with_builtin_modules();
        registry.resolve(config.test_modules())?;

        let previous = if config.previous_results() {
            let path = config.previous_results_file();
            if path.exists() {
                Some(PreviousResults::read_from(&path)?)
            } else {
                warn!("previous results file `{path}` not found, no tests will be skipped");
                None
            }
        } else {
            None
        };

        let slots = SlotController::from_num_threads(config.num_threads());
        let workers = config.num_threads().compute().unwrap_or_else(get_num_cpus);
        let executor = ProcessExecutor::default();

        let mut driver = TestRunDriver::new(config, &registry, &slots, &executor);
        if let Some(previous) = &previous {
            driver = driver.with_previous_results(previous);
        }
        let runner = SuiteRunner::new(&test_list, driver, workers)?;

        let mut reporter = TestReporter::new();
        if output.should_colorize_stdout() {
            reporter.colorize();
        }
        reporter.set_show_metrics(output.verbose);

        let mut stdout = io::stdout();
        let run_stats = runner
            .try_execute(|event| reporter.report_event(event, &mut stdout))
            .map_err(|err| ExpectedError::WriteOutputError { err })?;

        if let Some(path) = &self.output {
            reporter.write_report(path)?;
        }

        if run_stats.setup_failed > 0 {
            Err(ExpectedError::TestSetupFailed)
        } else if !run_stats.is_success() {
            Err(ExpectedError::TestRunFailed)
        } else {
            Ok(BenchplanExitCode::OK)
        }
    }
}
