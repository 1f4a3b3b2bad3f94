// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admission control for concurrently running tests.
//!
//! Every test declares how many threads it needs. A [`SlotController`] holds the global pool of
//! free slots, and a test only starts executing once it has taken that many slots out of the
//! pool. Slots are handed back when the returned [`SlotGuard`] is dropped, on every exit path.
//!
//! The controller is a counting semaphore: one counter, guarded by one mutex, with a condition
//! variable used to wake up waiters when slots are released. There is no fairness between
//! waiters. Whichever waiter observes enough free slots first proceeds, so a test requiring many
//! slots may be starved by a steady stream of smaller tests.

use crate::config::NumThreads;
use std::{
    num::NonZeroUsize,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
};
use tracing::debug;

/// The process-wide pool of free execution slots.
///
/// Invariant: for a bounded controller, the number of free slots plus the number of slots held
/// by live [`SlotGuard`]s always equals the capacity.
#[derive(Debug)]
pub struct SlotController {
    capacity: Option<NonZeroUsize>,
    available: Mutex<usize>,
    released: Condvar,
}

impl SlotController {
    /// Creates a new controller with the given number of slots, all of them free.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity: Some(capacity),
            available: Mutex::new(capacity.get()),
            released: Condvar::new(),
        }
    }

    /// Creates a controller that never holds back a test.
    pub fn unlimited() -> Self {
        Self {
            capacity: None,
            available: Mutex::new(0),
            released: Condvar::new(),
        }
    }

    /// Creates a controller sized to the global thread budget.
    pub fn from_num_threads(num_threads: NumThreads) -> Self {
        match num_threads.compute().and_then(NonZeroUsize::new) {
            Some(capacity) => Self::new(capacity),
            None => Self::unlimited(),
        }
    }

    /// Returns the total number of slots, or `None` if the controller is unlimited.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity.map(NonZeroUsize::get)
    }

    /// Returns the number of currently free slots, or `None` if the controller is unlimited.
    pub fn available(&self) -> Option<usize> {
        self.capacity?;
        Some(*self.lock())
    }

    /// Clamps a requested number of slots down to the capacity.
    ///
    /// A request that is larger than the capacity could never be satisfied, so callers must
    /// clamp before calling [`acquire`](Self::acquire). Unlimited controllers never clamp.
    pub fn clamp(&self, requested: usize) -> usize {
        match self.capacity {
            Some(capacity) => requested.min(capacity.get()),
            None => requested,
        }
    }

    /// Blocks until `slots` slots are free, then takes them.
    ///
    /// The returned guard gives the slots back when dropped.
    ///
    /// This never fails, but if `slots` is larger than the capacity it blocks forever. Use
    /// [`clamp`](Self::clamp) first.
    pub fn acquire(&self, slots: usize) -> SlotGuard<'_> {
        if self.capacity.is_none() {
            return SlotGuard {
                controller: self,
                slots,
            };
        }

        let mut available = self.lock();
        loop {
            if *available >= slots {
                *available -= slots;
                debug!(slots, remaining = *available, "acquired slots");
                return SlotGuard {
                    controller: self,
                    slots,
                };
            }
            available = self
                .released
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Takes `slots` slots if they are free right now, without blocking.
    pub fn try_acquire(&self, slots: usize) -> Option<SlotGuard<'_>> {
        if self.capacity.is_none() {
            return Some(SlotGuard {
                controller: self,
                slots,
            });
        }

        let mut available = self.lock();
        (*available >= slots).then(|| {
            *available -= slots;
            SlotGuard {
                controller: self,
                slots,
            }
        })
    }

    // ---
    // Helper methods
    // ---

    fn release(&self, slots: usize) {
        let Some(capacity) = self.capacity else {
            return;
        };

        let mut available = self.lock();
        *available += slots;
        debug_assert!(
            *available <= capacity.get(),
            "released more slots than were acquired"
        );
        debug!(slots, remaining = *available, "released slots");
        drop(available);

        // Waiters may need different numbers of slots, so wake all of them up and let each one
        // re-check.
        self.released.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        // The counter is only ever updated in a single step, so a panic while the lock is held
        // can't leave it inconsistent.
        self.available
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Slots held by a running test.
///
/// Dropping the guard returns the slots to the controller exactly once.
#[derive(Debug)]
#[must_use = "slots are released as soon as the guard is dropped"]
pub struct SlotGuard<'a> {
    controller: &'a SlotController,
    slots: usize,
}

impl SlotGuard<'_> {
    /// Returns the number of slots held by this guard.
    pub fn slots(&self) -> usize {
        self.slots
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.controller.release(self.slots);
    }
}
