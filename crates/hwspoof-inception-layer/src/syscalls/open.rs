use std::ffi::CStr;
use std::fmt::Write;

use libc::{c_char, c_int, c_uint, c_void, mode_t};

use hwspoof_config::SCRUBBED_VARS;
use hwspoof_core::buffer::{self, BoundedBuf, SharedBuffer};
use hwspoof_core::cloak::{filter_environ, filter_maps, SNAPSHOT_CAPACITY};
use hwspoof_core::classify::{is_relative_candidate, join_relative};
use hwspoof_core::{GenerateError, SpoofCategory};

use crate::macros::StackWriter;
use crate::reals::{LseekFn, OpenFn, OpenatFn, ReadFn, RealSymbol};
use crate::state::{ErrnoGuard, InceptionGuard, SpoofState};

/// Longest directory resolved for a relative open.
const RESOLVE_MAX: usize = 512;

/// Category of `path` as opened relative to `dirfd`. A relative path is
/// only resolved, through `/proc/self/fd/<dirfd>` or `/proc/self/cwd`,
/// when its leaf names a virtualized resource.
pub(crate) unsafe fn classify_at(
    state: &SpoofState,
    dirfd: c_int,
    path: &[u8],
) -> Option<SpoofCategory> {
    if path.first() == Some(&b'/') {
        return state.classifier.classify(path);
    }
    if !is_relative_candidate(path) || (dirfd < 0 && dirfd != libc::AT_FDCWD) {
        return None;
    }

    let mut link = [0u8; 32];
    let mut writer = StackWriter::new(&mut link[..31]);
    let _ = if dirfd == libc::AT_FDCWD {
        writer.write_str("/proc/self/cwd")
    } else {
        write!(writer, "/proc/self/fd/{}", dirfd)
    };
    let mut dir = [0u8; RESOLVE_MAX];
    let n = {
        let _errno = ErrnoGuard::save();
        libc::readlink(link.as_ptr().cast(), dir.as_mut_ptr().cast(), dir.len())
    };
    if n <= 0 || n as usize >= dir.len() {
        return None;
    }
    let mut joined = [0u8; RESOLVE_MAX];
    let full = join_relative(&dir[..n as usize], path, &mut joined)?;
    state.classifier.classify(full)
}

/// Category for a read-only open of `path`, if one applies. Directory
/// categories are only served through `opendir`.
pub(crate) unsafe fn classify_open(
    state: &SpoofState,
    dirfd: c_int,
    path: *const c_char,
    flags: c_int,
) -> Option<SpoofCategory> {
    if path.is_null() || flags & libc::O_ACCMODE != libc::O_RDONLY {
        return None;
    }
    let category = classify_at(state, dirfd, CStr::from_ptr(path).to_bytes())?;
    if category.is_directory() {
        return None;
    }
    Some(category)
}

/// Back a freshly opened real descriptor with synthetic content.
pub(crate) unsafe fn virtualize(state: &SpoofState, category: SpoofCategory, fd: c_int) {
    let buffer = match category {
        SpoofCategory::SelfMaps | SpoofCategory::SelfEnviron => snapshot(state, category, fd),
        _ => state.content.payload(category).unwrap_or_else(buffer::empty),
    };
    match state.table.register(fd, category, buffer) {
        Ok(()) => spoof_log!("{} served synthetically on fd {}", category, fd),
        Err(e) => {
            spoof_log!("{}; fd {} ({}) stays genuine", e, fd, category);
            if category.is_snapshot() {
                // The snapshot consumed the real stream
                let real_lseek = real!(REAL_LSEEK, LseekFn);
                real_lseek(fd, 0, libc::SEEK_SET);
            }
        }
    }
}

/// Read the genuine resource behind `fd` and filter it. Any failure serves
/// empty content so nothing unfiltered is exposed.
unsafe fn snapshot(state: &SpoofState, category: SpoofCategory, fd: c_int) -> SharedBuffer {
    let filtered = read_all(fd).and_then(|raw| match category {
        SpoofCategory::SelfMaps => filter_maps(&raw, &state.library_name, SNAPSHOT_CAPACITY),
        _ => filter_environ(&raw, &SCRUBBED_VARS, SNAPSHOT_CAPACITY),
    });
    match filtered {
        Ok(buf) => buf,
        Err(e) => {
            spoof_log!("{} snapshot failed: {}", category, e);
            buffer::empty()
        }
    }
}

unsafe fn read_all(fd: c_int) -> Result<Vec<u8>, GenerateError> {
    let real_read: ReadFn = real!(REAL_READ, ReadFn);
    let mut out = BoundedBuf::new(SNAPSHOT_CAPACITY);
    let mut chunk = [0u8; 4096];
    loop {
        let n = real_read(fd, chunk.as_mut_ptr() as *mut c_void, chunk.len());
        if n < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err.into());
        }
        if n == 0 {
            return Ok(out.into_vec());
        }
        out.extend(&chunk[..n as usize])?;
    }
}

pub unsafe fn open_impl(
    real: &RealSymbol,
    path: *const c_char,
    flags: c_int,
    mode: mode_t,
) -> c_int {
    let real_open = std::mem::transmute::<*mut c_void, OpenFn>(real.get());
    let Some(_guard) = InceptionGuard::enter() else {
        return real_open(path, flags, mode as c_uint);
    };
    let Some(state) = SpoofState::get() else {
        return real_open(path, flags, mode as c_uint);
    };
    let Some(category) = classify_open(state, libc::AT_FDCWD, path, flags) else {
        return real_open(path, flags, mode as c_uint);
    };

    let fd = real_open(path, flags, mode as c_uint);
    if fd >= 0 {
        let _errno = ErrnoGuard::save();
        virtualize(state, category, fd);
    }
    fd
}

pub unsafe fn openat_impl(
    real: &RealSymbol,
    dirfd: c_int,
    path: *const c_char,
    flags: c_int,
    mode: mode_t,
) -> c_int {
    let real_openat = std::mem::transmute::<*mut c_void, OpenatFn>(real.get());
    let Some(_guard) = InceptionGuard::enter() else {
        return real_openat(dirfd, path, flags, mode as c_uint);
    };
    let Some(state) = SpoofState::get() else {
        return real_openat(dirfd, path, flags, mode as c_uint);
    };
    let Some(category) = classify_open(state, dirfd, path, flags) else {
        return real_openat(dirfd, path, flags, mode as c_uint);
    };

    let fd = real_openat(dirfd, path, flags, mode as c_uint);
    if fd >= 0 {
        let _errno = ErrnoGuard::save();
        virtualize(state, category, fd);
    }
    fd
}
