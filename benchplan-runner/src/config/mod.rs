// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for benchplan.
//!
//! Harness-wide settings are read from `benchplan.toml` at the root of a suite, layered over
//! the defaults in [`HarnessConfig::DEFAULT_CONFIG`], and then adjusted by command-line
//! overrides.

mod harness;
mod num_threads;
mod threads_required;

pub use harness::*;
pub use num_threads::*;
pub use threads_required::*;

use std::sync::LazyLock;
use tracing::warn;

/// Gets the number of available CPUs and caches the value.
#[inline]
pub fn get_num_cpus() -> usize {
    static NUM_CPUS: LazyLock<usize> =
        LazyLock::new(|| match std::thread::available_parallelism() {
            Ok(count) => count.into(),
            Err(err) => {
                warn!("unable to determine num-cpus ({err}), assuming 1 logical CPU");
                1
            }
        });

    *NUM_CPUS
}
