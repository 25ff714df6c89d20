//! CPU topology directory streams.
//!
//! Real `cpuN` entries at or above the simulated thread count are skipped;
//! once the real stream ends, indices below it that never appeared are
//! handed out as synthetic entries.

use std::cell::UnsafeCell;
use std::ffi::CStr;

use libc::{c_char, c_int, dirent, dirent64, DIR};

use hwspoof_core::cloak::{cpu_entry_name, EntryVerdict};
use hwspoof_core::overlay::MAX_TRACKED_DIRS;
use hwspoof_core::SpoofCategory;

use crate::reals::{ClosedirFn, OpendirFn, Readdir64Fn, ReaddirFn};
use crate::state::{InceptionGuard, SpoofState};

/// The two Linux directory entry layouts share field names.
trait DirEntry {
    unsafe fn name(&self) -> &[u8];
    fn fill(&mut self, name: &[u8], index: u32);
}

macro_rules! impl_dir_entry {
    ($t:ty) => {
        impl DirEntry for $t {
            unsafe fn name(&self) -> &[u8] {
                CStr::from_ptr(self.d_name.as_ptr()).to_bytes()
            }

            fn fill(&mut self, name: &[u8], index: u32) {
                let len = name.len().min(self.d_name.len() - 1);
                for (dst, src) in self.d_name.iter_mut().zip(&name[..len]) {
                    *dst = *src as c_char;
                }
                self.d_name[len] = 0;
                // Synthetic inode, never 0 (which readers treat as deleted)
                self.d_ino = 0x4000_0000 + index as u64;
                self.d_off = 0;
                self.d_reclen = std::mem::size_of::<$t>() as u16;
                self.d_type = libc::DT_DIR;
            }
        }
    };
}

impl_dir_entry!(dirent);
impl_dir_entry!(dirent64);

/// One synthetic entry per overlay slot. Valid until the next `readdir` on
/// the same stream, like the real ones.
struct SyntheticEntries<T>(UnsafeCell<[T; MAX_TRACKED_DIRS]>);

unsafe impl<T> Sync for SyntheticEntries<T> {}

impl<T: DirEntry> SyntheticEntries<T> {
    unsafe fn fill(&self, slot: usize, index: u32) -> *mut T {
        let entries = &mut *self.0.get();
        let Some(entry) = entries.get_mut(slot) else {
            return std::ptr::null_mut();
        };
        entry.fill(cpu_entry_name(index).as_bytes(), index);
        entry
    }
}

static SYNTHETIC: SyntheticEntries<dirent> =
    SyntheticEntries(UnsafeCell::new(unsafe { std::mem::zeroed() }));
static SYNTHETIC64: SyntheticEntries<dirent64> =
    SyntheticEntries(UnsafeCell::new(unsafe { std::mem::zeroed() }));

pub unsafe fn opendir_impl(path: *const c_char) -> *mut DIR {
    let real_opendir = real!(REAL_OPENDIR, OpendirFn);
    let Some(_guard) = InceptionGuard::enter() else {
        return real_opendir(path);
    };
    let Some(state) = SpoofState::get() else {
        return real_opendir(path);
    };
    if path.is_null()
        || state.classifier.classify(CStr::from_ptr(path).to_bytes())
            != Some(SpoofCategory::CpuTopologyDir)
    {
        return real_opendir(path);
    }

    let dir = real_opendir(path);
    if !dir.is_null() {
        match state.dirs.register(dir as usize, state.content.threads()) {
            Ok(slot) => spoof_log!("topology stream tracked in slot {}", slot),
            Err(e) => spoof_log!("{}; topology stream stays genuine", e),
        }
    }
    dir
}

unsafe fn readdir_common<T: DirEntry>(
    dir: *mut DIR,
    real: unsafe extern "C" fn(*mut DIR) -> *mut T,
    storage: &SyntheticEntries<T>,
) -> *mut T {
    let Some(_guard) = InceptionGuard::enter() else {
        return real(dir);
    };
    let Some(state) = SpoofState::get() else {
        return real(dir);
    };
    let handle = dir as usize;
    if dir.is_null() || !state.dirs.is_tracked(handle) {
        return real(dir);
    }

    let caller_errno = crate::get_errno();
    crate::set_errno(0);
    loop {
        let entry = real(dir);
        if entry.is_null() {
            break;
        }
        if state.dirs.observe(handle, (*entry).name()) != Some(EntryVerdict::Hide) {
            crate::set_errno(caller_errno);
            return entry;
        }
    }
    if crate::get_errno() != 0 {
        // Read error, reported as-is
        return std::ptr::null_mut();
    }
    crate::set_errno(caller_errno);

    match state.dirs.next_missing(handle) {
        Some((slot, index)) => {
            spoof_log!("synthesized cpu{}", index);
            storage.fill(slot, index)
        }
        None => std::ptr::null_mut(),
    }
}

pub unsafe fn readdir_impl(dir: *mut DIR) -> *mut dirent {
    readdir_common(dir, real!(REAL_READDIR, ReaddirFn), &SYNTHETIC)
}

pub unsafe fn readdir64_impl(dir: *mut DIR) -> *mut dirent64 {
    readdir_common(dir, real!(REAL_READDIR64, Readdir64Fn), &SYNTHETIC64)
}

pub unsafe fn closedir_impl(dir: *mut DIR) -> c_int {
    if !dir.is_null() {
        if let Some(_guard) = InceptionGuard::enter() {
            if let Some(state) = SpoofState::get() {
                state.dirs.unregister(dir as usize);
            }
        }
    }
    real!(REAL_CLOSEDIR, ClosedirFn)(dir)
}
