//! Descriptor virtualization table.
//!
//! Maps live OS descriptors to a generated payload and a cursor. One lock
//! guards the whole table; it is held for the lookup and a bounded copy
//! only, never across a real libc call.

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::buffer::SharedBuffer;
use crate::category::SpoofCategory;
use crate::error::{SeekError, TableError};

pub const MAX_TRACKED_FDS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// One virtualized descriptor. `cursor <= buffer.len()` always holds.
#[derive(Debug, Clone)]
pub struct VirtualDescriptor {
    pub fd: i32,
    pub category: SpoofCategory,
    buffer: SharedBuffer,
    cursor: usize,
}

impl VirtualDescriptor {
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn remaining(&self) -> &[u8] {
        &self.buffer[self.cursor..]
    }
}

#[derive(Debug)]
pub struct DescriptorTable {
    slots: Mutex<Vec<Option<VirtualDescriptor>>>,
    /// Live entry count, read without the lock so untracked descriptors
    /// skip it entirely while nothing is virtualized.
    live: AtomicUsize,
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::with_capacity(MAX_TRACKED_FDS)
    }
}

impl DescriptorTable {
    /// Table with `capacity` slots. It never grows.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots: Mutex::new(slots),
            live: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.lock().len()
    }

    /// Live entries.
    pub fn len(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, fd: i32) -> bool {
        if self.is_empty() {
            return false;
        }
        self.lock().iter().flatten().any(|vd| vd.fd == fd)
    }

    /// Snapshot of the entry for `fd`.
    pub fn get(&self, fd: i32) -> Option<VirtualDescriptor> {
        self.lock().iter().flatten().find(|vd| vd.fd == fd).cloned()
    }

    /// Back `fd` with `buffer` from offset 0.
    ///
    /// A stale entry for the same descriptor number is replaced (the kernel
    /// reused it after a close we never saw). At capacity the registration
    /// is refused and the descriptor stays genuine.
    pub fn register(
        &self,
        fd: i32,
        category: SpoofCategory,
        buffer: SharedBuffer,
    ) -> Result<(), TableError> {
        let mut slots = self.lock();
        let capacity = slots.len();
        let entry = VirtualDescriptor {
            fd,
            category,
            buffer,
            cursor: 0,
        };
        let index = match slots.iter().position(|s| matches!(s, Some(vd) if vd.fd == fd)) {
            Some(i) => i,
            None => {
                let free = slots
                    .iter()
                    .position(Option::is_none)
                    .ok_or(TableError::Full { capacity })?;
                self.live.fetch_add(1, Ordering::AcqRel);
                free
            }
        };
        slots[index] = Some(entry);
        Ok(())
    }

    /// Remove `fd`. Returns whether it was tracked.
    pub fn unregister(&self, fd: i32) -> bool {
        let mut slots = self.lock();
        let removed = match slots.iter_mut().find(|s| matches!(s, Some(vd) if vd.fd == fd)) {
            Some(slot) => {
                *slot = None;
                self.live.fetch_sub(1, Ordering::AcqRel);
                true
            }
            None => false,
        };
        removed
    }

    /// Copy from the cursor into `out` and advance. `None` when untracked.
    pub fn read(&self, fd: i32, out: &mut [u8]) -> Option<usize> {
        self.with_entry(fd, |vd| {
            let src = vd.remaining();
            let n = src.len().min(out.len());
            out[..n].copy_from_slice(&src[..n]);
            vd.cursor += n;
            n
        })
    }

    /// `fgets` over the cursor: copy up to `out.len() - 1` bytes, stopping
    /// after a newline, and NUL-terminate.
    ///
    /// `Some(None)` means nothing was stored: end of content, or no room at
    /// all. A one-byte `out` only has room for the terminator and always
    /// yields `Some(Some(0))`, without looking at the cursor.
    pub fn read_line(&self, fd: i32, out: &mut [u8]) -> Option<Option<usize>> {
        self.with_entry(fd, |vd| {
            match out.len() {
                0 => return None,
                1 => {
                    out[0] = 0;
                    return Some(0);
                }
                _ => {}
            }
            let src = vd.remaining();
            if src.is_empty() {
                return None;
            }
            let limit = src.len().min(out.len() - 1);
            let n = match src[..limit].iter().position(|&b| b == b'\n') {
                Some(nl) => nl + 1,
                None => limit,
            };
            out[..n].copy_from_slice(&src[..n]);
            out[n] = 0;
            vd.cursor += n;
            Some(n)
        })
    }

    /// `getdelim` over the cursor: consume through the next `delim` (or
    /// to the end). Returns the payload and the consumed range so the
    /// caller can copy outside the lock. An empty range means end of content.
    pub fn read_until(&self, fd: i32, delim: u8) -> Option<(SharedBuffer, Range<usize>)> {
        self.with_entry(fd, |vd| {
            let start = vd.cursor;
            let end = match vd.remaining().iter().position(|&b| b == delim) {
                Some(p) => start + p + 1,
                None => vd.len(),
            };
            vd.cursor = end;
            (vd.buffer.clone(), start..end)
        })
    }

    /// Reposition the cursor. Targets outside `[0, len]` are rejected and
    /// leave the cursor where it was.
    pub fn seek(&self, fd: i32, offset: i64, whence: Whence) -> Option<Result<u64, SeekError>> {
        self.with_entry(fd, |vd| -> Result<u64, SeekError> {
            let base = match whence {
                Whence::Set => 0i64,
                Whence::Cur => vd.cursor as i64,
                Whence::End => vd.len() as i64,
            };
            let target = base
                .checked_add(offset)
                .filter(|t| (0..=vd.len() as i64).contains(t))
                .ok_or(SeekError::InvalidArgument)?;
            vd.cursor = target as usize;
            Ok(target as u64)
        })
    }

    fn with_entry<R>(&self, fd: i32, f: impl FnOnce(&mut VirtualDescriptor) -> R) -> Option<R> {
        if self.live.load(Ordering::Acquire) == 0 {
            return None;
        }
        let mut slots = self.lock();
        let result = slots.iter_mut().flatten().find(|vd| vd.fd == fd).map(f);
        result
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Option<VirtualDescriptor>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn payload(bytes: &[u8]) -> SharedBuffer {
        Arc::from(bytes)
    }

    #[test]
    fn test_untracked_descriptor() {
        let table = DescriptorTable::default();
        let mut out = [0u8; 8];
        assert_eq!(table.read(3, &mut out), None);
        assert_eq!(table.seek(3, 0, Whence::Set), None);
        assert!(table.read_until(3, b'\n').is_none());
        assert!(!table.unregister(3));
    }

    #[test]
    fn test_read_advances_cursor() {
        let table = DescriptorTable::default();
        table.register(5, SpoofCategory::CpuInfo, payload(b"hello world")).unwrap();
        let mut out = [0u8; 4];
        assert_eq!(table.read(5, &mut out), Some(4));
        assert_eq!(&out, b"hell");
        assert_eq!(table.get(5).unwrap().cursor(), 4);
        let mut rest = [0u8; 64];
        assert_eq!(table.read(5, &mut rest), Some(7));
        assert_eq!(&rest[..7], b"o world");
        assert_eq!(table.read(5, &mut rest), Some(0));
    }

    #[test]
    fn test_reregister_replaces_stale_entry() {
        let table = DescriptorTable::with_capacity(2);
        table.register(7, SpoofCategory::CpuOnline, payload(b"old")).unwrap();
        let mut out = [0u8; 1];
        table.read(7, &mut out).unwrap();
        table.register(7, SpoofCategory::CpuPresent, payload(b"new")).unwrap();
        assert_eq!(table.len(), 1);
        let vd = table.get(7).unwrap();
        assert_eq!(vd.category, SpoofCategory::CpuPresent);
        assert_eq!(vd.cursor(), 0);
    }

    #[test]
    fn test_read_line_semantics() {
        let table = DescriptorTable::default();
        table.register(4, SpoofCategory::CpuInfo, payload(b"ab\ncdef\n")).unwrap();
        let mut out = [0xFFu8; 8];
        assert_eq!(table.read_line(4, &mut out), Some(Some(3)));
        assert_eq!(&out[..4], b"ab\n\0");
        // Room for 2 bytes plus terminator
        let mut small = [0xFFu8; 3];
        assert_eq!(table.read_line(4, &mut small), Some(Some(2)));
        assert_eq!(&small, b"cd\0");
        assert_eq!(table.read_line(4, &mut out), Some(Some(3)));
        assert_eq!(&out[..4], b"ef\n\0");
        assert_eq!(table.read_line(4, &mut out), Some(None));
        let mut none: [u8; 0] = [];
        assert_eq!(table.read_line(4, &mut none), Some(None));
    }

    #[test]
    fn test_one_byte_line_buffer_gets_terminator_only() {
        let table = DescriptorTable::default();
        table.register(6, SpoofCategory::CpuOnline, payload(b"0-15\n")).unwrap();
        let mut one = [0xFFu8; 1];
        assert_eq!(table.read_line(6, &mut one), Some(Some(0)));
        assert_eq!(one, [0]);
        assert_eq!(table.get(6).unwrap().cursor(), 0);

        let mut out = [0u8; 16];
        assert_eq!(table.read_line(6, &mut out), Some(Some(5)));
        // Still a terminator-only success once the content is exhausted
        let mut one = [0xFFu8; 1];
        assert_eq!(table.read_line(6, &mut one), Some(Some(0)));
        assert_eq!(one, [0]);
    }

    #[test]
    fn test_read_until_ranges() {
        let table = DescriptorTable::default();
        table.register(9, SpoofCategory::SelfEnviron, payload(b"A=1\0B=2")).unwrap();
        let (buf, range) = table.read_until(9, 0).unwrap();
        assert_eq!(&buf[range], b"A=1\0");
        let (buf, range) = table.read_until(9, 0).unwrap();
        assert_eq!(&buf[range], b"B=2");
        let (_, range) = table.read_until(9, 0).unwrap();
        assert!(range.is_empty());
    }

    #[test]
    fn test_seek_bounds() {
        let table = DescriptorTable::default();
        table.register(3, SpoofCategory::DmiTable, payload(&[1u8; 10])).unwrap();
        assert_eq!(table.seek(3, 4, Whence::Set), Some(Ok(4)));
        assert_eq!(table.seek(3, 3, Whence::Cur), Some(Ok(7)));
        assert_eq!(table.seek(3, 0, Whence::End), Some(Ok(10)));
        assert_eq!(table.seek(3, 1, Whence::End), Some(Err(SeekError::InvalidArgument)));
        assert_eq!(table.seek(3, -11, Whence::End), Some(Err(SeekError::InvalidArgument)));
        assert_eq!(table.get(3).unwrap().cursor(), 10);
        assert_eq!(table.seek(3, -10, Whence::Cur), Some(Ok(0)));
        assert_eq!(table.seek(3, i64::MAX, Whence::End), Some(Err(SeekError::InvalidArgument)));
    }

    #[test]
    fn test_full_table_refuses() {
        let table = DescriptorTable::with_capacity(2);
        table.register(1, SpoofCategory::CpuInfo, payload(b"a")).unwrap();
        table.register(2, SpoofCategory::CpuInfo, payload(b"b")).unwrap();
        assert_eq!(
            table.register(3, SpoofCategory::CpuInfo, payload(b"c")),
            Err(TableError::Full { capacity: 2 })
        );
        assert!(!table.contains(3));
        assert!(table.unregister(1));
        table.register(3, SpoofCategory::CpuInfo, payload(b"c")).unwrap();
        assert!(table.contains(3));
    }
}
