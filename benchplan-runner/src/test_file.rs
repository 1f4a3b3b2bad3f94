// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing of `.test` declaration files.
//!
//! A declaration is a plain text file. Lines containing one of the directives `RUN:`,
//! `PREPARE:`, `VERIFY:`, `METRIC:` or `THREADS:` contribute to the test, and everything else is
//! ignored, so directives may sit behind a comment marker. A command ending in `\` continues on
//! the next line carrying the same directive.

use crate::{
    config::ThreadsRequired,
    context::TestPaths,
    errors::{TestFileParseError, TestFileParseErrorKind},
    plan::ShellCommand,
};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;

/// The parsed contents of a test declaration file.
#[derive(Clone, Debug)]
pub struct TestDeclaration {
    prepare: Vec<ShellCommand>,
    run: Vec<ShellCommand>,
    verify: Vec<ShellCommand>,
    metric_scripts: IndexMap<String, Vec<ShellCommand>>,
    threads: ThreadsRequired,
    executable: Utf8PathBuf,
}

impl TestDeclaration {
    /// Reads and parses the declaration at `paths.source_path`.
    pub fn from_file(paths: &TestPaths) -> Result<Self, TestFileParseError> {
        let contents = std::fs::read_to_string(&paths.source_path).map_err(|err| {
            TestFileParseError::new(&paths.source_path, TestFileParseErrorKind::Read(err))
        })?;
        Self::parse(paths, &contents)
    }

    /// Parses a declaration from its contents.
    pub fn parse(paths: &TestPaths, contents: &str) -> Result<Self, TestFileParseError> {
        Self::parse_impl(paths, contents)
            .map_err(|kind| TestFileParseError::new(&paths.source_path, kind))
    }

    /// Commands run before the run script.
    pub fn prepare(&self) -> &[ShellCommand] {
        &self.prepare
    }

    /// The run script. Never empty.
    pub fn run(&self) -> &[ShellCommand] {
        &self.run
    }

    /// Commands that verify the output of a successful run.
    pub fn verify(&self) -> &[ShellCommand] {
        &self.verify
    }

    /// Metric scripts, keyed by metric name, in declaration order.
    pub fn metric_scripts(&self) -> &IndexMap<String, Vec<ShellCommand>> {
        &self.metric_scripts
    }

    /// The declared thread requirement.
    pub fn threads(&self) -> ThreadsRequired {
        self.threads
    }

    /// The main executable: the program of the first `RUN:` command, resolved against the test
    /// directory.
    pub fn executable(&self) -> &Utf8Path {
        &self.executable
    }

    // ---
    // Helper methods
    // ---

    fn parse_impl(paths: &TestPaths, contents: &str) -> Result<Self, TestFileParseErrorKind> {
        let mut builder = DeclarationBuilder::new(paths);

        // A command continued with a trailing backslash: the directive, the line it started on,
        // and the text so far.
        let mut pending: Option<(Directive, usize, String)> = None;

        for (idx, line) in contents.lines().enumerate() {
            let line_no = idx + 1;
            let Some((directive, rest)) = Directive::find(line) else {
                continue;
            };

            let (start_line, mut text) = match pending.take() {
                Some((pending_directive, start, mut text)) if pending_directive == directive => {
                    text.push(' ');
                    text.push_str(rest.trim());
                    (start, text)
                }
                Some((pending_directive, start, text)) => {
                    // A different directive ends the continuation.
                    builder.add(pending_directive, start, &text)?;
                    (line_no, rest.trim().to_owned())
                }
                None => (line_no, rest.trim().to_owned()),
            };

            if let Some(stripped) = text.strip_suffix('\\') {
                text.truncate(stripped.trim_end().len());
                pending = Some((directive, start_line, text));
                continue;
            }

            builder.add(directive, start_line, &text)?;
        }

        // A continuation at the end of the file is completed as-is.
        if let Some((directive, start_line, text)) = pending {
            builder.add(directive, start_line, &text)?;
        }

        builder.finish()
    }
}

struct DeclarationBuilder<'a> {
    paths: &'a TestPaths,
    prepare: Vec<ShellCommand>,
    run: Vec<ShellCommand>,
    verify: Vec<ShellCommand>,
    metric_scripts: IndexMap<String, Vec<ShellCommand>>,
    threads: Option<ThreadsRequired>,
}

impl<'a> DeclarationBuilder<'a> {
    fn new(paths: &'a TestPaths) -> Self {
        Self {
            paths,
            prepare: Vec::new(),
            run: Vec::new(),
            verify: Vec::new(),
            metric_scripts: IndexMap::new(),
            threads: None,
        }
    }

    fn add(
        &mut self,
        directive: Directive,
        line: usize,
        text: &str,
    ) -> Result<(), TestFileParseErrorKind> {
        match directive {
            Directive::Run => self.run.push(parse_command(text, line, self.paths)?),
            Directive::Prepare => self.prepare.push(parse_command(text, line, self.paths)?),
            Directive::Verify => self.verify.push(parse_command(text, line, self.paths)?),
            Directive::Metric => {
                let (name, command) = text
                    .split_once(':')
                    .map(|(name, command)| (name.trim(), command.trim()))
                    .filter(|(name, command)| !name.is_empty() && !command.is_empty())
                    .ok_or(TestFileParseErrorKind::InvalidMetric { line })?;
                let command = parse_command(command, line, self.paths)?;
                self.metric_scripts
                    .entry(name.to_owned())
                    .or_default()
                    .push(command);
            }
            Directive::Threads => {
                if self.threads.is_some() {
                    return Err(TestFileParseErrorKind::DuplicateThreads { line });
                }
                let threads = text
                    .parse::<ThreadsRequired>()
                    .map_err(|err| TestFileParseErrorKind::InvalidThreads { line, err })?;
                self.threads = Some(threads);
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<TestDeclaration, TestFileParseErrorKind> {
        let Some(first) = self.run.first() else {
            return Err(TestFileParseErrorKind::NoRunLines);
        };
        let executable = self.paths.source_dir.join(first.program_path());

        Ok(TestDeclaration {
            prepare: self.prepare,
            run: self.run,
            verify: self.verify,
            metric_scripts: self.metric_scripts,
            threads: self.threads.unwrap_or_default(),
            executable,
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Directive {
    Run,
    Prepare,
    Verify,
    Metric,
    Threads,
}

impl Directive {
    const ALL: [(&'static str, Self); 5] = [
        ("RUN:", Self::Run),
        ("PREPARE:", Self::Prepare),
        ("VERIFY:", Self::Verify),
        ("METRIC:", Self::Metric),
        ("THREADS:", Self::Threads),
    ];

    /// Finds the earliest directive on the line, returning it and the text after it.
    fn find(line: &str) -> Option<(Self, &str)> {
        Self::ALL
            .iter()
            .filter_map(|&(keyword, directive)| {
                line.find(keyword)
                    .map(|pos| (pos, directive, &line[pos + keyword.len()..]))
            })
            .min_by_key(|&(pos, _, _)| pos)
            .map(|(_, directive, rest)| (directive, rest))
    }
}

fn parse_command(
    text: &str,
    line: usize,
    paths: &TestPaths,
) -> Result<ShellCommand, TestFileParseErrorKind> {
    let words = shell_words::split(text).map_err(|err| TestFileParseErrorKind::InvalidQuoting {
        line,
        command: text.to_owned(),
        err,
    })?;

    let mut program = None;
    let mut args = Vec::new();
    let mut stdin = None;
    let mut stdout = None;
    let mut stderr = None;

    let mut words = words.into_iter();
    while let Some(word) = words.next() {
        let (operator, target) = match word.as_str() {
            "<" => ("<", &mut stdin),
            ">" => (">", &mut stdout),
            "2>" => ("2>", &mut stderr),
            _ => {
                let word = substitute(&word, line, paths)?;
                if program.is_none() {
                    program = Some(word);
                } else {
                    args.push(word);
                }
                continue;
            }
        };

        let path = words
            .next()
            .ok_or(TestFileParseErrorKind::DanglingRedirect { line, operator })?;
        let path = substitute(&path, line, paths)?;
        *target = Some(paths.source_dir.join(path));
    }

    let program = program.ok_or(TestFileParseErrorKind::EmptyCommand { line })?;
    // Relative paths to programs are relative to the test directory; bare names are looked up
    // on PATH.
    let program = if program.contains('/') && Utf8Path::new(&program).is_relative() {
        let relative = program.strip_prefix("./").unwrap_or(&program);
        paths.source_dir.join(relative).into_string()
    } else {
        program
    };

    let mut command = ShellCommand::new(program).args(args).cwd(&paths.source_dir);
    command.stdin = stdin;
    command.stdout = stdout;
    command.stderr = stderr;
    Ok(command)
}

/// Expands `%` substitutions within a single word.
fn substitute(
    word: &str,
    line: usize,
    paths: &TestPaths,
) -> Result<String, TestFileParseErrorKind> {
    let mut out = String::with_capacity(word.len());
    let mut chars = word.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => out.push_str(paths.source_path.as_str()),
            Some('S') => out.push_str(paths.source_dir.as_str()),
            Some('t') => out.push_str(paths.tmp_base.as_str()),
            Some('T') => out.push_str(paths.tmp_dir.as_str()),
            Some('o') => out.push_str(paths.output_file().as_str()),
            Some('%') => out.push('%'),
            Some(substitution) => {
                return Err(TestFileParseErrorKind::UnknownSubstitution {
                    line,
                    substitution,
                });
            }
            // A trailing `%` stands for itself.
            None => out.push('%'),
        }
    }
    Ok(out)
}
