// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use benchplan_runner::{
    config::{ConfigOverrides, HarnessConfig},
    errors::StepError,
    list::TestInstance,
    plan::{CommandExecutor, ExecStatus, Invocation, RawOutcome, ShellCommand},
};
use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::Result;
use std::{sync::Mutex, time::Duration};

/// A suite of test files in a temporary directory.
pub(crate) struct Suite {
    dir: Utf8TempDir,
}

impl Suite {
    pub(crate) fn new() -> Result<Self> {
        Ok(Self {
            dir: camino_tempfile::tempdir()?,
        })
    }

    pub(crate) fn root(&self) -> &Utf8Path {
        self.dir.path()
    }

    /// Writes a file relative to the suite root, creating parent directories.
    pub(crate) fn write(&self, path: &str, contents: impl AsRef<[u8]>) -> Result<Utf8PathBuf> {
        let path = self.root().join(path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Writes a test declaration and returns the corresponding instance.
    pub(crate) fn add_test(&self, name: &str, contents: &str) -> Result<TestInstance> {
        let path = self.write(name, contents)?;
        Ok(TestInstance::new(self.root(), path))
    }

    pub(crate) fn config(&self, overrides: ConfigOverrides) -> HarnessConfig {
        let mut config = HarnessConfig::default_config(self.root());
        config.apply_overrides(overrides);
        config
    }
}

type Respond = dyn Fn(&ShellCommand) -> (ExecStatus, String) + Send + Sync;

/// Records the programs it is asked to run, and answers from a closure instead of running them.
pub(crate) struct FakeExecutor {
    calls: Mutex<Vec<String>>,
    respond: Box<Respond>,
}

impl FakeExecutor {
    pub(crate) fn new(
        respond: impl Fn(&ShellCommand) -> (ExecStatus, String) + Send + Sync + 'static,
    ) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        }
    }

    pub(crate) fn succeeding() -> Self {
        Self::new(|_| (ExecStatus::Success, String::new()))
    }

    /// The file names of the programs run so far, in order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandExecutor for FakeExecutor {
    fn execute(
        &self,
        invocation: &Invocation,
        _timeout: Option<Duration>,
    ) -> Result<RawOutcome, StepError> {
        let mut outcome = RawOutcome::new(ExecStatus::Success, Duration::from_millis(1));
        for command in invocation.commands() {
            let program = Utf8Path::new(&command.program)
                .file_name()
                .unwrap_or(&command.program)
                .to_owned();
            self.calls.lock().unwrap().push(program);

            let (status, stdout) = (self.respond)(command);
            outcome.stdout.push_str(&stdout);
            if !status.is_success() {
                outcome.status = status;
                break;
            }
        }
        Ok(outcome)
    }
}
