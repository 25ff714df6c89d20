use libc::{c_int, c_void, off64_t, off_t, size_t, ssize_t};

use hwspoof_core::{SeekError, Whence};

use crate::reals::{CloseFn, Dup2Fn, Dup3Fn, Lseek64Fn, LseekFn, ReadChkFn, ReadFn};
use crate::state::{InceptionGuard, SpoofState};

/// Serve a read from the table. `None` means the descriptor is genuine.
unsafe fn virtual_read(fd: c_int, buf: *mut c_void, count: size_t) -> Option<ssize_t> {
    if buf.is_null() {
        return None;
    }
    let _guard = InceptionGuard::enter()?;
    let state = SpoofState::get()?;
    if state.table.is_empty() {
        return None;
    }
    let out = std::slice::from_raw_parts_mut(buf as *mut u8, count);
    state.table.read(fd, out).map(|n| n as ssize_t)
}

pub unsafe fn read_impl(fd: c_int, buf: *mut c_void, count: size_t) -> ssize_t {
    match virtual_read(fd, buf, count) {
        Some(n) => n,
        None => real!(REAL_READ, ReadFn)(fd, buf, count),
    }
}

/// Fortified `read`: a request larger than the destination is left to the
/// real implementation, which reports the overflow.
pub unsafe fn read_chk_impl(fd: c_int, buf: *mut c_void, nbytes: size_t, buflen: size_t) -> ssize_t {
    if nbytes <= buflen {
        if let Some(n) = virtual_read(fd, buf, nbytes) {
            return n;
        }
    }
    real!(REAL_READ_CHK, ReadChkFn)(fd, buf, nbytes, buflen)
}

pub(crate) fn whence_from(raw: c_int) -> Option<Whence> {
    match raw {
        libc::SEEK_SET => Some(Whence::Set),
        libc::SEEK_CUR => Some(Whence::Cur),
        libc::SEEK_END => Some(Whence::End),
        _ => None,
    }
}

/// Seek a tracked descriptor. `None` means the descriptor is genuine;
/// otherwise the new offset, or -1 with `EINVAL`.
unsafe fn virtual_seek(fd: c_int, offset: i64, whence: c_int) -> Option<i64> {
    let _guard = InceptionGuard::enter()?;
    let state = SpoofState::get()?;
    if !state.table.contains(fd) {
        return None;
    }
    let result = match whence_from(whence) {
        Some(whence) => state.table.seek(fd, offset, whence)?,
        None => Err(SeekError::InvalidArgument),
    };
    match result {
        Ok(pos) => Some(pos as i64),
        Err(SeekError::InvalidArgument) => {
            crate::set_errno(libc::EINVAL);
            Some(-1)
        }
    }
}

pub unsafe fn lseek_impl(fd: c_int, offset: off_t, whence: c_int) -> off_t {
    match virtual_seek(fd, offset as i64, whence) {
        Some(pos) => pos as off_t,
        None => real!(REAL_LSEEK, LseekFn)(fd, offset, whence),
    }
}

pub unsafe fn lseek64_impl(fd: c_int, offset: off64_t, whence: c_int) -> off64_t {
    match virtual_seek(fd, offset, whence) {
        Some(pos) => pos as off64_t,
        None => real!(REAL_LSEEK64, Lseek64Fn)(fd, offset, whence),
    }
}

fn release(fd: c_int, why: &str) {
    if let Some(_guard) = InceptionGuard::enter() {
        if let Some(state) = SpoofState::get() {
            if state.table.unregister(fd) {
                spoof_log!("fd {} released ({})", fd, why);
            }
        }
    }
}

/// The entry goes before the real close so a concurrent open reusing the
/// number never finds it.
pub unsafe fn close_impl(fd: c_int) -> c_int {
    release(fd, "close");
    real!(REAL_CLOSE, CloseFn)(fd)
}

/// A successful `dup2` onto a tracked descriptor closed it implicitly. A
/// failed one closed nothing, so the entry is only dropped afterwards.
pub unsafe fn dup2_impl(oldfd: c_int, newfd: c_int) -> c_int {
    let ret = real!(REAL_DUP2, Dup2Fn)(oldfd, newfd);
    if ret >= 0 && oldfd != newfd {
        let _errno = crate::state::ErrnoGuard::save();
        release(newfd, "dup2");
    }
    ret
}

pub unsafe fn dup3_impl(oldfd: c_int, newfd: c_int, flags: c_int) -> c_int {
    let ret = real!(REAL_DUP3, Dup3Fn)(oldfd, newfd, flags);
    if ret >= 0 {
        let _errno = crate::state::ErrnoGuard::save();
        release(newfd, "dup3");
    }
    ret
}
