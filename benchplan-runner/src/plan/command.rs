// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use benchplan_metadata::MetricValue;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::{fmt, time::Duration};

/// A single command within a script, along with its environment and redirections.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShellCommand {
    /// The program to run.
    pub program: String,

    /// Arguments passed to the program.
    pub args: Vec<String>,

    /// Extra environment variables set for the program.
    pub env: IndexMap<String, String>,

    /// The working directory. If `None`, the harness's working directory is used.
    pub cwd: Option<Utf8PathBuf>,

    /// A file to read standard input from.
    pub stdin: Option<Utf8PathBuf>,

    /// A file to write standard output to. If `None`, standard output is captured.
    pub stdout: Option<Utf8PathBuf>,

    /// A file to write standard error to. If `None`, standard error is captured.
    pub stderr: Option<Utf8PathBuf>,
}

impl ShellCommand {
    /// Creates a new command with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: IndexMap::new(),
            cwd: None,
            stdin: None,
            stdout: None,
            stderr: None,
        }
    }

    /// Adds an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds several arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    pub fn cwd(mut self, cwd: impl Into<Utf8PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Prefixes this command with a wrapper: `wrapper[0] wrapper[1..] program args...`.
    ///
    /// An empty wrapper leaves the command unchanged.
    pub fn wrap(&mut self, wrapper: &[String]) {
        let Some((wrapper_program, wrapper_args)) = wrapper.split_first() else {
            return;
        };

        let program = std::mem::replace(&mut self.program, wrapper_program.clone());
        let mut args = Vec::with_capacity(wrapper_args.len() + 1 + self.args.len());
        args.extend(wrapper_args.iter().cloned());
        args.push(program);
        args.append(&mut self.args);
        self.args = args;
    }

    /// Returns the program as a path.
    pub fn program_path(&self) -> &Utf8Path {
        Utf8Path::new(&self.program)
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{key}={} ", shell_words::quote(value))?;
        }
        write!(f, "{}", shell_words::quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", shell_words::quote(arg))?;
        }
        if let Some(stdin) = &self.stdin {
            write!(f, " < {}", shell_words::quote(stdin.as_str()))?;
        }
        if let Some(stdout) = &self.stdout {
            write!(f, " > {}", shell_words::quote(stdout.as_str()))?;
        }
        if let Some(stderr) = &self.stderr {
            write!(f, " 2> {}", shell_words::quote(stderr.as_str()))?;
        }
        Ok(())
    }
}

/// An ordered list of commands run one after the other.
///
/// Execution stops at the first command that doesn't succeed.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Invocation {
    commands: Vec<ShellCommand>,
}

impl Invocation {
    /// Creates a new invocation from the given commands.
    pub fn new(commands: impl IntoIterator<Item = ShellCommand>) -> Self {
        Self {
            commands: commands.into_iter().collect(),
        }
    }

    /// Appends a command.
    pub fn push(&mut self, command: ShellCommand) {
        self.commands.push(command);
    }

    /// Returns the commands in order.
    pub fn commands(&self) -> &[ShellCommand] {
        &self.commands
    }

    /// Iterates mutably over the commands in order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ShellCommand> {
        self.commands.iter_mut()
    }

    /// Returns true if there are no commands.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// How the commands of an [`Invocation`] finished.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExecStatus {
    /// Every command exited with status 0.
    Success,

    /// A command exited unsuccessfully.
    Failed {
        /// The command line that failed.
        command: String,

        /// The exit code, or `None` if the process was terminated by a signal.
        exit_code: Option<i32>,
    },

    /// A command ran past its timeout and was killed.
    TimedOut {
        /// The command line that timed out.
        command: String,

        /// The timeout that was exceeded.
        timeout: Duration,
    },
}

impl ExecStatus {
    /// Returns true if every command succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed {
                command,
                exit_code: Some(code),
            } => write!(f, "`{command}` exited with code {code}"),
            Self::Failed {
                command,
                exit_code: None,
            } => write!(f, "`{command}` was terminated by a signal"),
            Self::TimedOut { command, timeout } => write!(
                f,
                "`{command}` timed out after {}",
                humantime::format_duration(*timeout)
            ),
        }
    }
}

/// The raw result of running an [`Invocation`], before result processing.
#[derive(Clone, Debug)]
pub struct RawOutcome {
    /// How the invocation finished.
    pub status: ExecStatus,

    /// Captured standard output, concatenated across commands.
    pub stdout: String,

    /// Captured standard error, concatenated across commands.
    pub stderr: String,

    /// Wall-clock time taken by the invocation.
    pub elapsed: Duration,

    /// Metrics attached by run steps.
    pub metrics: IndexMap<String, MetricValue>,
}

impl RawOutcome {
    /// Creates a new outcome with no output and no metrics.
    pub fn new(status: ExecStatus, elapsed: Duration) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: String::new(),
            elapsed,
            metrics: IndexMap::new(),
        }
    }

    /// Returns captured output in the form shown to users for a failed test.
    pub fn diagnostic_output(&self) -> String {
        let mut output = String::new();
        if !self.stdout.is_empty() {
            output.push_str("--- stdout ---\n");
            output.push_str(&self.stdout);
            if !self.stdout.ends_with('\n') {
                output.push('\n');
            }
        }
        if !self.stderr.is_empty() {
            output.push_str("--- stderr ---\n");
            output.push_str(&self.stderr);
            if !self.stderr.ends_with('\n') {
                output.push('\n');
            }
        }
        output
    }
}
