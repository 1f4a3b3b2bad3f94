// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reporting of test events.
//!
//! The [`TestReporter`] prints one status line per test as it finishes, prints the diagnostic
//! output of failing tests at the end of the run, and collects a [`ReportSummary`] that can be
//! written out as JSON.

use crate::{
    errors::{DisplayErrorChain, WriteReportError},
    list::TestInstance,
    plan::TestOutcome,
    runner::{CancelReason, RunStats, TestEvent},
};
use benchplan_metadata::{ReportSummary, ResultKind, TestReportEntry};
use camino::Utf8Path;
use debug_ignore::DebugIgnore;
use owo_colors::{OwoColorize, Style};
use std::{
    io::{self, Write},
    time::Duration,
};
use swrite::{SWrite, swrite};

/// Reports test events to a writer, and collects a JSON report.
#[derive(Debug)]
pub struct TestReporter<'a> {
    styles: Box<Styles>,
    show_metrics: bool,
    count_width: usize,
    final_outputs: DebugIgnore<Vec<(&'a TestInstance, String)>>,
    report: ReportSummary,
}

impl<'a> TestReporter<'a> {
    /// Creates a new reporter that doesn't use colors.
    pub fn new() -> Self {
        Self {
            styles: Box::default(),
            show_metrics: false,
            count_width: 1,
            final_outputs: DebugIgnore(Vec::new()),
            report: ReportSummary {
                format_version: ReportSummary::FORMAT_VERSION,
                ..ReportSummary::default()
            },
        }
    }

    /// Enables colorized output.
    pub fn colorize(&mut self) {
        self.styles.colorize();
    }

    /// Sets whether metrics are printed under each test's status line.
    pub fn set_show_metrics(&mut self, show_metrics: bool) {
        self.show_metrics = show_metrics;
    }

    /// Returns the report collected so far.
    pub fn report(&self) -> &ReportSummary {
        &self.report
    }

    /// Writes the collected report to the given path as pretty-printed JSON.
    pub fn write_report(&self, path: &Utf8Path) -> Result<(), WriteReportError> {
        let json = self
            .report
            .to_json_pretty()
            .map_err(WriteReportError::Serialize)?;
        std::fs::write(path, json).map_err(|err| WriteReportError::Write {
            path: path.to_owned(),
            err,
        })
    }

    /// Reports a test event to the given writer.
    pub fn report_event(&mut self, event: TestEvent<'a>, mut writer: impl Write) -> io::Result<()> {
        match event {
            TestEvent::RunStarted { test_list } => {
                let run_count = test_list.run_count();
                self.count_width = run_count.to_string().len();
                writeln!(
                    writer,
                    "{:>12} {} {} in {}",
                    "Starting".style(self.styles.pass),
                    run_count.style(self.styles.count),
                    plural(run_count, "test", "tests"),
                    test_list.suite_root(),
                )?;
            }
            TestEvent::TestStarted { .. } => {}
            TestEvent::TestFinished {
                test_instance,
                outcome,
                finished,
                ..
            } => {
                let kind_style = self.styles.for_kind(outcome.kind);
                write!(writer, "{:>12} ", outcome.kind.code().style(kind_style))?;
                self.write_progress(outcome.elapsed, finished, &mut writer)?;
                writeln!(writer, "{}", test_instance.name)?;

                if self.show_metrics {
                    for (name, value) in &outcome.metrics {
                        writeln!(writer, "{:>12} {name}: {value}", "")?;
                    }
                }

                if outcome.kind.is_failure() && !outcome.output.is_empty() {
                    self.final_outputs
                        .push((test_instance, outcome.output.clone()));
                }
                self.push_entry(test_instance, &outcome);
            }
            TestEvent::TestSetupFailed {
                test_instance,
                error,
                finished,
                ..
            } => {
                write!(writer, "{:>12} ", "SETUP FAIL".style(self.styles.fail))?;
                self.write_progress(Duration::ZERO, finished, &mut writer)?;
                writeln!(writer, "{}", test_instance.name)?;

                let output = DisplayErrorChain::new(&error).to_string();
                self.final_outputs.push((test_instance, output.clone()));
                self.push_entry(test_instance, &TestOutcome::new(ResultKind::Fail, output));
            }
            TestEvent::RunBeginCancel { running, reason } => {
                let reason = match reason {
                    CancelReason::ReportError => "error",
                };
                writeln!(
                    writer,
                    "{:>12} due to {}, {} {} still running",
                    "Canceling".style(self.styles.fail),
                    reason.style(self.styles.count),
                    running.style(self.styles.count),
                    plural(running, "test", "tests"),
                )?;
            }
            TestEvent::RunFinished {
                start_time,
                elapsed,
                run_stats,
            } => {
                self.report.start_time = Some(start_time.to_rfc3339());
                self.report.elapsed = elapsed.as_secs_f64();

                for (test_instance, output) in self.final_outputs.iter() {
                    writeln!(
                        writer,
                        "\n{} {} {}",
                        "---".style(self.styles.fail),
                        test_instance.name.style(self.styles.count),
                        "---".style(self.styles.fail),
                    )?;
                    writeln!(writer, "{}", output.trim_end())?;
                }

                let summary_style = if run_stats.is_success() {
                    self.styles.pass
                } else {
                    self.styles.fail
                };
                writeln!(
                    writer,
                    "{:>12} [{:>9.3}s] {}",
                    "Summary".style(summary_style),
                    elapsed.as_secs_f64(),
                    summary_str(&run_stats, &self.styles),
                )?;
            }
        }
        Ok(())
    }

    fn write_progress(
        &self,
        elapsed: Duration,
        finished: usize,
        mut writer: impl Write,
    ) -> io::Result<()> {
        // The width of the run count is fixed once the run starts.
        write!(
            writer,
            "[{:>9.3}s] ({:>width$}) ",
            elapsed.as_secs_f64(),
            finished.style(self.styles.count),
            width = self.count_width,
        )
    }

    fn push_entry(&mut self, test_instance: &TestInstance, outcome: &TestOutcome) {
        self.report.tests.push(TestReportEntry {
            name: test_instance.name.clone(),
            code: outcome.kind,
            elapsed: (!outcome.elapsed.is_zero()).then(|| outcome.elapsed.as_secs_f64()),
            output: outcome.output.clone(),
            metrics: outcome
                .metrics
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        });
    }
}

impl Default for TestReporter<'_> {
    fn default() -> Self {
        Self::new()
    }
}

fn summary_str(run_stats: &RunStats, styles: &Styles) -> String {
    let mut out = String::new();
    swrite!(out, "{}", run_stats.finished_count.style(styles.count));
    if run_stats.finished_count != run_stats.initial_run_count {
        swrite!(out, "/{}", run_stats.initial_run_count.style(styles.count));
    }
    swrite!(
        out,
        " {} run: {} {}",
        plural(run_stats.initial_run_count, "test", "tests"),
        run_stats.passed.style(styles.count),
        "passed".style(styles.pass),
    );

    let counts = [
        (run_stats.failed, "failed", styles.fail),
        (run_stats.missing_executable, "missing executable", styles.fail),
        (run_stats.setup_failed, "setup failed", styles.fail),
        (run_stats.unchanged, "unchanged", styles.skip),
        (run_stats.unsupported, "unsupported", styles.skip),
    ];
    for (count, description, style) in counts {
        if count > 0 {
            swrite!(
                out,
                ", {} {}",
                count.style(styles.count),
                description.style(style)
            );
        }
    }
    out
}

fn plural(count: usize, singular: &'static str, plural: &'static str) -> &'static str {
    if count == 1 { singular } else { plural }
}

#[derive(Debug, Default, Clone)]
struct Styles {
    count: Style,
    pass: Style,
    fail: Style,
    skip: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().yellow().bold();
    }

    fn for_kind(&self, kind: ResultKind) -> Style {
        match kind {
            ResultKind::Pass => self.pass,
            ResultKind::Fail | ResultKind::MissingExecutable => self.fail,
            ResultKind::Unsupported | ResultKind::Unchanged => self.skip,
        }
    }
}
