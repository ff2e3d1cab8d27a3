#![doc = include_str!("../README.md")]
//! The core, lock-free, binary-indexed slot allocator.
//!
//! This module provides `FastResourceContainer`, a fixed pool of `N`
//! interchangeable slots that any number of threads can claim and release
//! concurrently without a lock and without allocating after construction.
//!
//! # Internals
//!
//! -   **Slots:** One record per index, holding a signed free counter and a
//!     claim flag.
//! -   **Implicit tree:** The same flat array doubles as a binary tree. Index 0
//!     is the root; index `i` with lowest set bit `L` aggregates the free
//!     leaves of `[i, i + L)`. See the `tree` module for the arithmetic.
//! -   **Take:** Descends from the root towards any subtree with a positive
//!     count, claims the leaf with an atomic test-and-set, then decrements the
//!     leaf and every ancestor.
//! -   **Release:** Clears the claim flag, then increments the leaf and every
//!     ancestor.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

pub mod error;
pub mod logger;
pub mod metrics;
pub mod pages;
mod tree;

pub use crate::error::PoolError;
pub use crate::logger::PageLogger;
pub use crate::pages::{PagePool, PagePoolBuilder, PagePoolOptions, PageReader, PageWriter, PoolStats};

/// A single slot record.
struct Slot {
    /// Free leaves in the subtree rooted at this index. May dip below zero
    /// while a `take` and a `release` on the same leaf overlap.
    free_below: AtomicI32,
    /// Set by the thread that wins the claim on this leaf.
    locked: AtomicBool,
}

impl Slot {
    fn new(taken: bool) -> Self {
        Slot {
            free_below: AtomicI32::new(0),
            locked: AtomicBool::new(taken),
        }
    }
}

/// A lock-free allocator for a fixed pool of interchangeable slots.
///
/// `take` hands out an index that no other thread holds, `release` gives it
/// back. Both are non-blocking and complete in a bounded number of steps.
/// No ordering is guaranteed among free slots: callers must not read any
/// priority into which index `take` returns.
///
/// # Examples
///
/// ```
/// use fastslot::FastResourceContainer;
///
/// let pool = FastResourceContainer::new(2, false).unwrap();
/// let a = pool.take().unwrap();
/// let b = pool.take().unwrap();
/// assert_ne!(a, b);
/// assert!(pool.take().is_none());
///
/// pool.release(a);
/// assert_eq!(pool.free_count(), 1);
/// ```
pub struct FastResourceContainer {
    slots: Box<[Slot]>,
    /// The largest descent bit, half the smallest power of two `>= len`.
    tree_half: usize,
}

impl FastResourceContainer {
    /// Creates a container with `len` slots.
    ///
    /// With `all_taken` set every slot starts out claimed and the container
    /// reports zero free slots until something is released into it. A
    /// `len` of zero yields a valid container that never has a free slot.
    pub fn new(len: usize, all_taken: bool) -> Result<Self, PoolError> {
        if i32::try_from(len).is_err() {
            return Err(PoolError::CapacityOverflow(len));
        }

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(len)
            .map_err(|_| PoolError::Allocation { slots: len })?;
        slots.extend((0..len).map(|_| Slot::new(all_taken)));

        let container = FastResourceContainer {
            slots: slots.into_boxed_slice(),
            tree_half: tree::tree_half(len),
        };

        if !all_taken {
            for index in 0..len {
                container.release(index);
            }
        }

        Ok(container)
    }

    /// Returns the number of slots managed by this container.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if the container manages no slots at all.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the number of currently free slots.
    ///
    /// This is a single read of the root counter. It is exact when no `take`
    /// or `release` is in flight and a recent snapshot otherwise.
    pub fn free_count(&self) -> usize {
        self.slots
            .first()
            .map_or(0, |root| root.free_below.load(Ordering::Acquire).max(0) as usize)
    }

    /// Claims one free slot and returns its index.
    ///
    /// Returns `None` when no slot is free. Under heavy contention this can
    /// also happen while a slot is being released concurrently; callers that
    /// need one may simply retry.
    pub fn take(&self) -> Option<usize> {
        let root = self.slots.first()?;
        let mut free_here = root.free_below.load(Ordering::Acquire);
        if free_here <= 0 {
            return None;
        }

        // The set bits of `pos` double as the path chooser: bit `b` set means
        // the descent went right at level `b`.
        let mut pos = 0;
        let mut bit = self.tree_half;

        loop {
            if bit == 0 {
                if free_here > 0 && !self.slots[pos].locked.swap(true, Ordering::Acquire) {
                    for index in tree::path_to_root(pos) {
                        self.slots[index].free_below.fetch_sub(1, Ordering::AcqRel);
                    }
                    return Some(pos);
                }
            } else {
                let right = pos + bit;
                let right_free = self.free_at(right);
                let left_free = free_here.saturating_sub(right_free);

                if left_free > 0 {
                    free_here = left_free;
                    bit >>= 1;
                    continue;
                }
                if right_free > 0 {
                    pos = right;
                    free_here = right_free;
                    bit >>= 1;
                    continue;
                }
            }

            // Dead end, either a lost claim or a stale count.
            let (next, level, free) = self.backtrack(pos, bit)?;
            pos = next;
            bit = level;
            free_here = free;
        }
    }

    /// Releases a slot previously obtained from [`take`](Self::take).
    ///
    /// Out-of-range indices are ignored. Releasing a slot twice, or one the
    /// caller does not hold, is not detected and corrupts the free counts.
    pub fn release(&self, index: usize) {
        let Some(slot) = self.slots.get(index) else {
            return;
        };

        // The flag must be clear before any ancestor advertises the slot.
        slot.locked.store(false, Ordering::Release);
        for index in tree::path_to_root(index) {
            self.slots[index].free_below.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn free_at(&self, index: usize) -> i32 {
        self.slots
            .get(index)
            .map_or(0, |slot| slot.free_below.load(Ordering::Acquire))
    }

    /// Walks up from a dead end at (`pos`, `bit`) and returns the first right
    /// sibling not yet explored that still advertises a free leaf, as the new
    /// `(pos, bit, free)` descent state.
    fn backtrack(&self, mut pos: usize, bit: usize) -> Option<(usize, usize, i32)> {
        let mut level = tree::parent_level(bit);
        while level <= self.tree_half {
            if pos & level != 0 {
                // Came from the right; the left side was already ruled out.
                pos -= level;
            } else {
                let right = pos + level;
                let right_free = self.free_at(right);
                if right_free > 0 {
                    return Some((right, level >> 1, right_free));
                }
            }
            level <<= 1;
        }
        None
    }
}

impl fmt::Debug for FastResourceContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FastResourceContainer")
            .field("len", &self.len())
            .field("free", &self.free_count())
            .finish()
    }
}
