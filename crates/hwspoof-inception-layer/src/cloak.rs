//! Hiding the layer from the process it runs in.

use std::ffi::{CStr, CString};

use libc::{c_char, c_void};

use hwspoof_config::SCRUBBED_VARS;

extern "C" {
    static mut environ: *mut *mut c_char;
}

const FALLBACK_LIBRARY_NAME: &[u8] = b"libhwspoof_inception_layer.so";

/// One captured `KEY=VALUE` assignment.
#[derive(Debug)]
pub struct Assignment {
    text: CString,
    key_len: usize,
}

impl Assignment {
    pub fn as_ptr(&self) -> *const c_char {
        self.text.as_ptr()
    }

    /// `KEY=` prefix, used to look the variable up in another environment.
    pub fn prefix(&self) -> &[u8] {
        &self.text.as_bytes()[..=self.key_len]
    }

    pub fn key(&self) -> &[u8] {
        &self.text.as_bytes()[..self.key_len]
    }
}

/// Assignments of the injection and configuration variables as seen at
/// load, in [`SCRUBBED_VARS`] order (the injection variable first).
#[derive(Debug, Default)]
pub struct InjectionRecord {
    entries: Vec<Assignment>,
}

impl InjectionRecord {
    pub fn capture() -> Self {
        let mut entries = Vec::with_capacity(SCRUBBED_VARS.len());
        for key in SCRUBBED_VARS {
            let Some(c_key) = CString::new(key).ok() else {
                continue;
            };
            let value = unsafe { libc::getenv(c_key.as_ptr()) };
            if value.is_null() {
                continue;
            }
            let value = unsafe { CStr::from_ptr(value) }.to_bytes();
            let mut text = Vec::with_capacity(key.len() + 1 + value.len());
            text.extend_from_slice(key.as_bytes());
            text.push(b'=');
            text.extend_from_slice(value);
            if let Ok(text) = CString::new(text) {
                entries.push(Assignment {
                    text,
                    key_len: key.len(),
                });
            }
        }
        Self { entries }
    }

    pub fn entries(&self) -> &[Assignment] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Unbind every captured variable and zero its `KEY=VALUE` storage so a
/// raw scan of `environ` finds nothing either. Returns how many entries
/// were wiped.
///
/// Not synchronized with other threads touching the environment.
pub unsafe fn scrub_environment(record: &InjectionRecord) -> usize {
    let mut wiped = 0;
    for assignment in record.entries() {
        let storage = find_entry(assignment.prefix());
        let Ok(key) = CString::new(assignment.key()) else {
            continue;
        };
        libc::unsetenv(key.as_ptr());
        if !storage.is_null() {
            let len = libc::strlen(storage);
            std::ptr::write_bytes(storage, 0, len);
            wiped += 1;
        }
    }
    wiped
}

unsafe fn find_entry(prefix: &[u8]) -> *mut c_char {
    let mut cursor = environ;
    if cursor.is_null() {
        return std::ptr::null_mut();
    }
    while !(*cursor).is_null() {
        let entry = CStr::from_ptr(*cursor).to_bytes();
        if entry.starts_with(prefix) {
            return *cursor;
        }
        cursor = cursor.add(1);
    }
    std::ptr::null_mut()
}

/// Whether a NULL-terminated environment array binds the variable `prefix`
/// (`KEY=`) names.
pub unsafe fn env_contains(envp: *const *const c_char, prefix: &[u8]) -> bool {
    if envp.is_null() {
        return false;
    }
    let mut cursor = envp;
    while !(*cursor).is_null() {
        if CStr::from_ptr(*cursor).to_bytes().starts_with(prefix) {
            return true;
        }
        cursor = cursor.add(1);
    }
    false
}

pub unsafe fn env_len(envp: *const *const c_char) -> usize {
    if envp.is_null() {
        return 0;
    }
    let mut n = 0;
    while !(*envp.add(n)).is_null() {
        n += 1;
    }
    n
}

/// The current process environment.
pub unsafe fn current_environ() -> *const *const c_char {
    environ as *const *const c_char
}

/// Base name of the shared object this code was loaded from.
pub fn library_file_name() -> Box<[u8]> {
    let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };
    let anchor = library_file_name as fn() -> Box<[u8]> as *const c_void;
    let found = unsafe { libc::dladdr(anchor, &mut info) } != 0;
    if !found || info.dli_fname.is_null() {
        return FALLBACK_LIBRARY_NAME.into();
    }
    let path = unsafe { CStr::from_ptr(info.dli_fname) }.to_bytes();
    let name = match path.iter().rposition(|&b| b == b'/') {
        Some(slash) => &path[slash + 1..],
        None => path,
    };
    if name.is_empty() {
        FALLBACK_LIBRARY_NAME.into()
    } else {
        name.into()
    }
}
