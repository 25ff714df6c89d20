//! Buffered streams.
//!
//! glibc refills a `FILE` buffer through internal aliases we never see, so
//! a classified `fopen` hands out a `fopencookie` stream whose callbacks
//! read and seek the descriptor table. Every stdio reader (`fscanf`,
//! `fgetc`, the unlocked variants) then sees the synthetic bytes. The
//! explicit `fread`/`fgets`/`getline`/`getdelim` entry points still serve
//! streams built some other way over a tracked descriptor, keyed by
//! `fileno`.

use std::ffi::CStr;

use libc::{c_char, c_int, c_void, off64_t, size_t, ssize_t, FILE};

use hwspoof_core::Whence;

use crate::reals::{
    FcloseFn, FgetsFn, FopenFn, FreadFn, GetdelimFn, GetlineFn, ReadFn, RealSymbol,
};
use crate::state::{ErrnoGuard, InceptionGuard, SpoofState};
use crate::syscalls::io::whence_from;
use crate::syscalls::open::{classify_at, virtualize};

/// glibc `cookie_io_functions_t`.
#[repr(C)]
struct CookieIo {
    read: Option<unsafe extern "C" fn(*mut c_void, *mut c_char, size_t) -> ssize_t>,
    write: Option<unsafe extern "C" fn(*mut c_void, *const c_char, size_t) -> ssize_t>,
    seek: Option<unsafe extern "C" fn(*mut c_void, *mut off64_t, c_int) -> c_int>,
    close: Option<unsafe extern "C" fn(*mut c_void) -> c_int>,
}

extern "C" {
    fn fopencookie(cookie: *mut c_void, mode: *const c_char, io: CookieIo) -> *mut FILE;
}

/// Cookie behind a synthetic stream. The real stream keeps the descriptor
/// open, and the table entry is keyed by that descriptor.
struct SyntheticStream {
    fd: c_int,
    real: *mut FILE,
}

/// `r` modes without `+`.
unsafe fn is_read_only_mode(mode: *const c_char) -> bool {
    let mode = CStr::from_ptr(mode).to_bytes();
    mode.first() == Some(&b'r') && !mode.contains(&b'+')
}

pub unsafe fn fopen_impl(real: &RealSymbol, path: *const c_char, mode: *const c_char) -> *mut FILE {
    let real_fopen = std::mem::transmute::<*mut c_void, FopenFn>(real.get());
    let Some(_guard) = InceptionGuard::enter() else {
        return real_fopen(path, mode);
    };
    if path.is_null() || mode.is_null() || !is_read_only_mode(mode) {
        return real_fopen(path, mode);
    }
    let Some(state) = SpoofState::get() else {
        return real_fopen(path, mode);
    };
    let category = match classify_at(state, libc::AT_FDCWD, CStr::from_ptr(path).to_bytes()) {
        Some(c) if !c.is_directory() => c,
        _ => return real_fopen(path, mode),
    };

    let fp = real_fopen(path, mode);
    if fp.is_null() {
        return fp;
    }
    let _errno = ErrnoGuard::save();
    let fd = libc::fileno(fp);
    if fd < 0 {
        return fp;
    }
    virtualize(state, category, fd);
    if !state.table.contains(fd) {
        // Table full: the stream stays genuine
        return fp;
    }
    synthetic_stream(fd, fp, mode).unwrap_or(fp)
}

/// Wrap the real stream behind `fd`. `None` leaves the caller with the
/// real stream, still served by the explicit readers below.
unsafe fn synthetic_stream(fd: c_int, real: *mut FILE, mode: *const c_char) -> Option<*mut FILE> {
    let cookie = Box::into_raw(Box::new(SyntheticStream { fd, real }));
    let io = CookieIo {
        read: Some(stream_read),
        write: None,
        seek: Some(stream_seek),
        close: Some(stream_close),
    };
    let stream = fopencookie(cookie.cast(), mode, io);
    if stream.is_null() {
        drop(Box::from_raw(cookie));
        spoof_log!("fopencookie failed; fd {} keeps its plain stream", fd);
        return None;
    }
    Some(stream)
}

unsafe extern "C" fn stream_read(cookie: *mut c_void, buf: *mut c_char, size: size_t) -> ssize_t {
    let stream = &*(cookie as *const SyntheticStream);
    if size == 0 || buf.is_null() {
        return 0;
    }
    let out = std::slice::from_raw_parts_mut(buf as *mut u8, size);
    match SpoofState::get().and_then(|state| state.table.read(stream.fd, out)) {
        Some(n) => n as ssize_t,
        None => real!(REAL_READ, ReadFn)(stream.fd, buf.cast(), size),
    }
}

unsafe extern "C" fn stream_seek(cookie: *mut c_void, offset: *mut off64_t, whence: c_int) -> c_int {
    let stream = &*(cookie as *const SyntheticStream);
    let result = whence_from(whence).and_then(|whence| {
        SpoofState::get().and_then(|state| state.table.seek(stream.fd, *offset, whence))
    });
    match result {
        Some(Ok(pos)) => {
            *offset = pos as off64_t;
            0
        }
        _ => {
            crate::set_errno(libc::EINVAL);
            -1
        }
    }
}

unsafe extern "C" fn stream_close(cookie: *mut c_void) -> c_int {
    let stream = Box::from_raw(cookie as *mut SyntheticStream);
    if let Some(state) = SpoofState::get() {
        if state.table.unregister(stream.fd) {
            spoof_log!("stream on fd {} released", stream.fd);
        }
    }
    real!(REAL_FCLOSE, FcloseFn)(stream.real)
}

/// Descriptor behind a stream the table tracks.
unsafe fn tracked_fd(state: &SpoofState, stream: *mut FILE) -> Option<c_int> {
    if stream.is_null() || state.table.is_empty() {
        return None;
    }
    let fd = {
        // Synthetic streams have no descriptor and fail with EBADF
        let _errno = ErrnoGuard::save();
        libc::fileno(stream)
    };
    if fd >= 0 && state.table.contains(fd) {
        Some(fd)
    } else {
        None
    }
}

pub unsafe fn fread_impl(ptr: *mut c_void, size: size_t, nmemb: size_t, stream: *mut FILE) -> size_t {
    let real_fread = real!(REAL_FREAD, FreadFn);
    let Some(_guard) = InceptionGuard::enter() else {
        return real_fread(ptr, size, nmemb, stream);
    };
    let Some(state) = SpoofState::get() else {
        return real_fread(ptr, size, nmemb, stream);
    };
    let Some(fd) = tracked_fd(state, stream) else {
        return real_fread(ptr, size, nmemb, stream);
    };
    let total = match size.checked_mul(nmemb) {
        Some(t) if t > 0 && !ptr.is_null() => t,
        _ => return 0,
    };
    let out = std::slice::from_raw_parts_mut(ptr as *mut u8, total);
    match state.table.read(fd, out) {
        Some(n) => n / size,
        None => real_fread(ptr, size, nmemb, stream),
    }
}

pub unsafe fn fgets_impl(s: *mut c_char, size: c_int, stream: *mut FILE) -> *mut c_char {
    let real_fgets = real!(REAL_FGETS, FgetsFn);
    let Some(_guard) = InceptionGuard::enter() else {
        return real_fgets(s, size, stream);
    };
    let Some(state) = SpoofState::get() else {
        return real_fgets(s, size, stream);
    };
    let Some(fd) = tracked_fd(state, stream) else {
        return real_fgets(s, size, stream);
    };
    if s.is_null() || size <= 0 {
        return std::ptr::null_mut();
    }
    let out = std::slice::from_raw_parts_mut(s as *mut u8, size as usize);
    match state.table.read_line(fd, out) {
        Some(Some(_)) => s,
        Some(None) => std::ptr::null_mut(),
        None => real_fgets(s, size, stream),
    }
}

/// `getdelim` over a tracked stream. `None` means the stream is genuine.
unsafe fn virtual_getdelim(
    lineptr: *mut *mut c_char,
    n: *mut size_t,
    delim: c_int,
    stream: *mut FILE,
) -> Option<ssize_t> {
    let _guard = InceptionGuard::enter()?;
    let state = SpoofState::get()?;
    let fd = tracked_fd(state, stream)?;
    if lineptr.is_null() || n.is_null() {
        crate::set_errno(libc::EINVAL);
        return Some(-1);
    }

    let (buffer, range) = state.table.read_until(fd, delim as u8)?;
    if range.is_empty() {
        return Some(-1);
    }
    let len = range.len();
    if (*lineptr).is_null() || *n < len + 1 {
        let grown = libc::realloc(*lineptr as *mut c_void, len + 1) as *mut c_char;
        if grown.is_null() {
            // Give the line back so a retry sees it
            let _ = state.table.seek(fd, -(len as i64), Whence::Cur);
            crate::set_errno(libc::ENOMEM);
            return Some(-1);
        }
        *lineptr = grown;
        *n = len + 1;
    }
    std::ptr::copy_nonoverlapping(buffer[range].as_ptr(), *lineptr as *mut u8, len);
    *(*lineptr).add(len) = 0;
    Some(len as ssize_t)
}

pub unsafe fn getdelim_impl(
    lineptr: *mut *mut c_char,
    n: *mut size_t,
    delim: c_int,
    stream: *mut FILE,
) -> ssize_t {
    match virtual_getdelim(lineptr, n, delim, stream) {
        Some(r) => r,
        None => real!(REAL_GETDELIM, GetdelimFn)(lineptr, n, delim, stream),
    }
}

pub unsafe fn getline_impl(lineptr: *mut *mut c_char, n: *mut size_t, stream: *mut FILE) -> ssize_t {
    match virtual_getdelim(lineptr, n, b'\n' as c_int, stream) {
        Some(r) => r,
        None => real!(REAL_GETLINE, GetlineFn)(lineptr, n, stream),
    }
}

pub unsafe fn fclose_impl(stream: *mut FILE) -> c_int {
    if !stream.is_null() {
        if let Some(_guard) = InceptionGuard::enter() {
            if let Some(state) = SpoofState::get() {
                let fd = {
                    let _errno = ErrnoGuard::save();
                    libc::fileno(stream)
                };
                if fd >= 0 && state.table.unregister(fd) {
                    spoof_log!("stream on fd {} released", fd);
                }
            }
        }
    }
    real!(REAL_FCLOSE, FcloseFn)(stream)
}
