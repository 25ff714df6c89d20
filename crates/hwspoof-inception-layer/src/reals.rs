//! Real Symbol Storage
//!
//! Lazily resolved pointers to the implementations behind our interposed
//! exports, found with `dlsym(RTLD_NEXT)`. Safe to use before the
//! constructor has run: the loader itself opens files while relocating us,
//! so every entry point resolves what it needs on the spot.
//!
//! A symbol that cannot be resolved means the host libc is unusable for
//! us; that is reported on stderr and the process aborts.

use libc::{
    c_char, c_int, c_void, dirent, dirent64, off64_t, off_t, pid_t,
    posix_spawn_file_actions_t, posix_spawnattr_t, size_t, ssize_t, DIR, FILE,
};
use std::sync::atomic::{AtomicPtr, Ordering};

pub struct RealSymbol {
    ptr: AtomicPtr<c_void>,
    /// NUL-terminated symbol name
    name: &'static str,
}

impl RealSymbol {
    pub const fn new(name: &'static str) -> Self {
        Self {
            ptr: AtomicPtr::new(std::ptr::null_mut()),
            name,
        }
    }

    /// Resolved pointer. Never null; aborts when resolution fails.
    pub unsafe fn get(&self) -> *mut c_void {
        let p = self.ptr.load(Ordering::Acquire);
        if !p.is_null() {
            return p;
        }
        let f = libc::dlsym(libc::RTLD_NEXT, self.name.as_ptr() as *const c_char);
        if f.is_null() {
            unresolved(self.name);
        }
        self.ptr.store(f, Ordering::Release);
        f
    }
}

#[cold]
unsafe fn unresolved(name: &str) -> ! {
    let name = name.trim_end_matches('\0');
    let parts: [&[u8]; 3] = [
        b"[hwspoof] fatal: cannot resolve real ",
        name.as_bytes(),
        b"\n",
    ];
    for part in parts {
        libc::write(2, part.as_ptr() as *const c_void, part.len());
    }
    libc::abort()
}

pub type OpenFn = unsafe extern "C" fn(*const c_char, c_int, ...) -> c_int;
pub type OpenatFn = unsafe extern "C" fn(c_int, *const c_char, c_int, ...) -> c_int;
pub type ReadFn = unsafe extern "C" fn(c_int, *mut c_void, size_t) -> ssize_t;
pub type ReadChkFn = unsafe extern "C" fn(c_int, *mut c_void, size_t, size_t) -> ssize_t;
pub type LseekFn = unsafe extern "C" fn(c_int, off_t, c_int) -> off_t;
pub type Lseek64Fn = unsafe extern "C" fn(c_int, off64_t, c_int) -> off64_t;
pub type CloseFn = unsafe extern "C" fn(c_int) -> c_int;
pub type Dup2Fn = unsafe extern "C" fn(c_int, c_int) -> c_int;
pub type Dup3Fn = unsafe extern "C" fn(c_int, c_int, c_int) -> c_int;
pub type FopenFn = unsafe extern "C" fn(*const c_char, *const c_char) -> *mut FILE;
pub type FreadFn = unsafe extern "C" fn(*mut c_void, size_t, size_t, *mut FILE) -> size_t;
pub type FgetsFn = unsafe extern "C" fn(*mut c_char, c_int, *mut FILE) -> *mut c_char;
pub type GetlineFn = unsafe extern "C" fn(*mut *mut c_char, *mut size_t, *mut FILE) -> ssize_t;
pub type GetdelimFn =
    unsafe extern "C" fn(*mut *mut c_char, *mut size_t, c_int, *mut FILE) -> ssize_t;
pub type FcloseFn = unsafe extern "C" fn(*mut FILE) -> c_int;
pub type OpendirFn = unsafe extern "C" fn(*const c_char) -> *mut DIR;
pub type ReaddirFn = unsafe extern "C" fn(*mut DIR) -> *mut dirent;
pub type Readdir64Fn = unsafe extern "C" fn(*mut DIR) -> *mut dirent64;
pub type ClosedirFn = unsafe extern "C" fn(*mut DIR) -> c_int;
pub type ExecveFn =
    unsafe extern "C" fn(*const c_char, *const *const c_char, *const *const c_char) -> c_int;
pub type ExecvFn = unsafe extern "C" fn(*const c_char, *const *const c_char) -> c_int;
pub type SystemFn = unsafe extern "C" fn(*const c_char) -> c_int;
pub type PopenFn = unsafe extern "C" fn(*const c_char, *const c_char) -> *mut FILE;
pub type PcloseFn = unsafe extern "C" fn(*mut FILE) -> c_int;
pub type PosixSpawnFn = unsafe extern "C" fn(
    *mut pid_t,
    *const c_char,
    *const posix_spawn_file_actions_t,
    *const posix_spawnattr_t,
    *const *mut c_char,
    *const *mut c_char,
) -> c_int;

pub static REAL_OPEN: RealSymbol = RealSymbol::new("open\0");
pub static REAL_OPEN64: RealSymbol = RealSymbol::new("open64\0");
pub static REAL_OPENAT: RealSymbol = RealSymbol::new("openat\0");
pub static REAL_OPENAT64: RealSymbol = RealSymbol::new("openat64\0");
pub static REAL_READ: RealSymbol = RealSymbol::new("read\0");
pub static REAL_READ_CHK: RealSymbol = RealSymbol::new("__read_chk\0");
pub static REAL_LSEEK: RealSymbol = RealSymbol::new("lseek\0");
pub static REAL_LSEEK64: RealSymbol = RealSymbol::new("lseek64\0");
pub static REAL_CLOSE: RealSymbol = RealSymbol::new("close\0");
pub static REAL_DUP2: RealSymbol = RealSymbol::new("dup2\0");
pub static REAL_DUP3: RealSymbol = RealSymbol::new("dup3\0");
pub static REAL_FOPEN: RealSymbol = RealSymbol::new("fopen\0");
pub static REAL_FOPEN64: RealSymbol = RealSymbol::new("fopen64\0");
pub static REAL_FREAD: RealSymbol = RealSymbol::new("fread\0");
pub static REAL_FGETS: RealSymbol = RealSymbol::new("fgets\0");
pub static REAL_GETLINE: RealSymbol = RealSymbol::new("getline\0");
pub static REAL_GETDELIM: RealSymbol = RealSymbol::new("getdelim\0");
pub static REAL_FCLOSE: RealSymbol = RealSymbol::new("fclose\0");
pub static REAL_OPENDIR: RealSymbol = RealSymbol::new("opendir\0");
pub static REAL_READDIR: RealSymbol = RealSymbol::new("readdir\0");
pub static REAL_READDIR64: RealSymbol = RealSymbol::new("readdir64\0");
pub static REAL_CLOSEDIR: RealSymbol = RealSymbol::new("closedir\0");
pub static REAL_EXECVE: RealSymbol = RealSymbol::new("execve\0");
pub static REAL_EXECV: RealSymbol = RealSymbol::new("execv\0");
pub static REAL_EXECVP: RealSymbol = RealSymbol::new("execvp\0");
pub static REAL_EXECVPE: RealSymbol = RealSymbol::new("execvpe\0");
pub static REAL_POSIX_SPAWN: RealSymbol = RealSymbol::new("posix_spawn\0");
pub static REAL_POSIX_SPAWNP: RealSymbol = RealSymbol::new("posix_spawnp\0");
pub static REAL_SYSTEM: RealSymbol = RealSymbol::new("system\0");
pub static REAL_POPEN: RealSymbol = RealSymbol::new("popen\0");
pub static REAL_PCLOSE: RealSymbol = RealSymbol::new("pclose\0");
