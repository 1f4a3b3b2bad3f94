// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::get_num_cpus;
use crate::errors::ThreadCountParseError;
use serde::Deserialize;
use std::{cmp::Ordering, fmt, str::FromStr};

/// Type for the num-threads config key: the global thread budget.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum NumThreads {
    /// No budget: tests are never held back or clamped.
    #[default]
    Unlimited,

    /// A budget of the specified number of threads.
    Count(usize),

    /// A budget equal to the logical CPU count.
    NumCpus,
}

impl NumThreads {
    /// Gets the budget computed at runtime, or `None` if it is unlimited.
    pub fn compute(self) -> Option<usize> {
        match self {
            Self::Unlimited => None,
            Self::Count(threads) => Some(threads),
            Self::NumCpus => Some(get_num_cpus()),
        }
    }

    fn relative_to_cpus(offset: i64) -> Self {
        Self::Count((get_num_cpus() as i64 + offset).max(1) as usize)
    }
}

impl FromStr for NumThreads {
    type Err = ThreadCountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "num-cpus" {
            return Ok(Self::NumCpus);
        }

        match s.parse::<i64>() {
            Err(e) => Err(ThreadCountParseError::new(format!(
                "error: {e} parsing {s}"
            ))),
            Ok(0) => Ok(Self::Unlimited),
            Ok(j) if j < 0 => Ok(Self::relative_to_cpus(j)),
            Ok(j) => Ok(Self::Count(j as usize)),
        }
    }
}

impl fmt::Display for NumThreads {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => write!(f, "0"),
            Self::Count(threads) => write!(f, "{threads}"),
            Self::NumCpus => write!(f, "num-cpus"),
        }
    }
}

impl<'de> Deserialize<'de> for NumThreads {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = NumThreads;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "an integer or the string \"num-cpus\"")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v == "num-cpus" {
                    Ok(NumThreads::NumCpus)
                } else {
                    Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Str(v),
                        &self,
                    ))
                }
            }

            // Note that TOML uses i64, not u64.
            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match v.cmp(&0) {
                    Ordering::Greater => Ok(NumThreads::Count(v as usize)),
                    Ordering::Less => Ok(NumThreads::relative_to_cpus(v)),
                    Ordering::Equal => Ok(NumThreads::Unlimited),
                }
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match v {
                    0 => Ok(NumThreads::Unlimited),
                    v => Ok(NumThreads::Count(v as usize)),
                }
            }
        }

        deserializer.deserialize_any(V)
    }
}
