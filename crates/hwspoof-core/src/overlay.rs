//! Directory-stream overlay for the CPU topology directory.
//!
//! Streams are keyed by the address of their `DIR` handle. Each tracked
//! stream owns a [`TopologyCursor`] and a fixed slot index, which the
//! inception layer uses to pick storage for synthesized entries.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::cloak::topology::{EntryVerdict, TopologyCursor};
use crate::error::TableError;

pub const MAX_TRACKED_DIRS: usize = 16;

#[derive(Debug)]
struct DirSlot {
    handle: usize,
    cursor: TopologyCursor,
}

#[derive(Debug)]
pub struct DirectoryOverlay {
    slots: Mutex<Vec<Option<DirSlot>>>,
}

impl Default for DirectoryOverlay {
    fn default() -> Self {
        Self::with_capacity(MAX_TRACKED_DIRS)
    }
}

impl DirectoryOverlay {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots: Mutex::new(slots),
        }
    }

    /// Track `handle` as a topology stream. Returns its slot index.
    pub fn register(&self, handle: usize, threads: u32) -> Result<usize, TableError> {
        let mut slots = self.lock();
        let capacity = slots.len();
        let index = slots
            .iter()
            .position(|s| matches!(s, Some(d) if d.handle == handle))
            .or_else(|| slots.iter().position(Option::is_none))
            .ok_or(TableError::Full { capacity })?;
        slots[index] = Some(DirSlot {
            handle,
            cursor: TopologyCursor::new(threads),
        });
        Ok(index)
    }

    pub fn unregister(&self, handle: usize) -> bool {
        let mut slots = self.lock();
        let found = slots
            .iter_mut()
            .find(|s| matches!(s, Some(d) if d.handle == handle));
        let removed = match found {
            Some(slot) => {
                *slot = None;
                true
            }
            None => false,
        };
        removed
    }

    pub fn is_tracked(&self, handle: usize) -> bool {
        self.lock().iter().flatten().any(|d| d.handle == handle)
    }

    /// Verdict for a real entry. `None` when the stream is not tracked.
    pub fn observe(&self, handle: usize, name: &[u8]) -> Option<EntryVerdict> {
        self.with_slot(handle, |_, cursor| cursor.observe(name))
    }

    /// Next synthetic index once the real stream is exhausted, with the
    /// stream's slot index. `None` when untracked or complete.
    pub fn next_missing(&self, handle: usize) -> Option<(usize, u32)> {
        self.with_slot(handle, |slot, cursor| cursor.next_missing().map(|n| (slot, n)))
            .flatten()
    }

    fn with_slot<R>(
        &self,
        handle: usize,
        f: impl FnOnce(usize, &mut TopologyCursor) -> R,
    ) -> Option<R> {
        let mut slots = self.lock();
        let result = slots
            .iter_mut()
            .enumerate()
            .find_map(|(i, s)| match s {
                Some(d) if d.handle == handle => Some((i, &mut d.cursor)),
                _ => None,
            })
            .map(|(i, cursor)| f(i, cursor));
        result
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Option<DirSlot>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
