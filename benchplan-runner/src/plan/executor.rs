// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{ExecStatus, Invocation, RawOutcome, ShellCommand};
use crate::errors::StepError;
use duct::{Expression, cmd};
use std::{
    process::Output,
    thread,
    time::{Duration, Instant},
};
use tracing::debug;

/// Runs the commands of an [`Invocation`].
///
/// This is the innermost layer of every execution plan. The production implementation is
/// [`ProcessExecutor`]; tests substitute their own.
pub trait CommandExecutor: Send + Sync {
    /// Runs the commands in order, stopping at the first one that doesn't succeed.
    ///
    /// An unsuccessful command is reported through [`RawOutcome::status`]. An error is returned
    /// only if a command couldn't be run at all.
    fn execute(
        &self,
        invocation: &Invocation,
        timeout: Option<Duration>,
    ) -> Result<RawOutcome, StepError>;
}

/// Runs commands as child processes.
#[derive(Clone, Debug)]
pub struct ProcessExecutor {
    poll_interval: Duration,
}

impl ProcessExecutor {
    /// How often a running command is checked against its timeout.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

    /// Creates a new executor.
    pub fn new() -> Self {
        Self {
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }

    fn run_one(
        &self,
        command: &ShellCommand,
        timeout: Option<Duration>,
        outcome: &mut RawOutcome,
    ) -> Result<ExecStatus, StepError> {
        let command_line = command.to_string();
        debug!(command = %command_line, "running command");

        let handle = expression(command)
            .start()
            .map_err(|err| StepError::Spawn {
                command: command_line.clone(),
                err,
            })?;

        let start = Instant::now();
        let output = loop {
            match handle.try_wait() {
                Ok(Some(output)) => break output,
                Ok(None) => {}
                Err(err) => {
                    return Err(StepError::Wait {
                        command: command_line,
                        err,
                    });
                }
            }

            if let Some(timeout) = timeout
                && start.elapsed() >= timeout
            {
                debug!(command = %command_line, "command timed out, killing it");
                handle.kill().map_err(|err| StepError::Wait {
                    command: command_line.clone(),
                    err,
                })?;
                // Keep whatever the command printed before it was killed.
                match handle.wait() {
                    Ok(output) => append_output(outcome, output),
                    Err(err) => {
                        debug!(command = %command_line, %err, "no output after kill");
                    }
                }
                return Ok(ExecStatus::TimedOut {
                    command: command_line,
                    timeout,
                });
            }

            thread::sleep(self.poll_interval);
        };

        append_output(outcome, output);
        if output.status.success() {
            Ok(ExecStatus::Success)
        } else {
            Ok(ExecStatus::Failed {
                command: command_line,
                exit_code: output.status.code(),
            })
        }
    }
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandExecutor for ProcessExecutor {
    fn execute(
        &self,
        invocation: &Invocation,
        timeout: Option<Duration>,
    ) -> Result<RawOutcome, StepError> {
        let start = Instant::now();
        let mut outcome = RawOutcome::new(ExecStatus::Success, Duration::ZERO);

        for command in invocation.commands() {
            let status = self.run_one(command, timeout, &mut outcome)?;
            if !status.is_success() {
                outcome.status = status;
                break;
            }
        }

        outcome.elapsed = start.elapsed();
        Ok(outcome)
    }
}

fn expression(command: &ShellCommand) -> Expression {
    let mut expr = cmd(command.program.as_str(), &command.args).unchecked();

    for (key, value) in &command.env {
        expr = expr.env(key, value);
    }
    if let Some(cwd) = &command.cwd {
        expr = expr.dir(cwd);
    }
    if let Some(stdin) = &command.stdin {
        expr = expr.stdin_path(stdin);
    }
    expr = match &command.stdout {
        Some(path) => expr.stdout_path(path),
        None => expr.stdout_capture(),
    };
    expr = match &command.stderr {
        Some(path) => expr.stderr_path(path),
        None => expr.stderr_capture(),
    };

    expr
}

fn append_output(outcome: &mut RawOutcome, output: &Output) {
    outcome
        .stdout
        .push_str(&String::from_utf8_lossy(&output.stdout));
    outcome
        .stderr
        .push_str(&String::from_utf8_lossy(&output.stderr));
}
