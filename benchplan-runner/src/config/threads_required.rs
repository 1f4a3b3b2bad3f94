// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::get_num_cpus;
use crate::errors::ThreadCountParseError;
use std::{fmt, str::FromStr};

/// The number of threads a test declares it needs, from its `THREADS:` line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ThreadsRequired {
    /// Take up "slots" equal to the number of threads.
    Count(usize),

    /// Take up as many slots as the number of CPUs.
    NumCpus,
}

impl ThreadsRequired {
    /// Gets the actual number of threads computed at runtime.
    pub fn compute(self) -> usize {
        match self {
            Self::Count(threads) => threads,
            Self::NumCpus => get_num_cpus(),
        }
    }
}

impl Default for ThreadsRequired {
    fn default() -> Self {
        Self::Count(1)
    }
}

impl FromStr for ThreadsRequired {
    type Err = ThreadCountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "num-cpus" {
            return Ok(Self::NumCpus);
        }

        // Unlike the global budget, a test can't ask for zero threads or a number relative to
        // the CPU count.
        match s.parse::<usize>() {
            Ok(0) => Err(ThreadCountParseError::new("threads required may not be 0")),
            Ok(n) => Ok(Self::Count(n)),
            Err(e) => Err(ThreadCountParseError::new(format!(
                "error: {e} parsing {s} (expected a positive integer or \"num-cpus\")"
            ))),
        }
    }
}

impl fmt::Display for ThreadsRequired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(threads) => write!(f, "{threads}"),
            Self::NumCpus => write!(f, "num-cpus"),
        }
    }
}
