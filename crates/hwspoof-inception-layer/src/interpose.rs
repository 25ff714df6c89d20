//! Exported symbols. The dynamic linker binds the host program's calls to
//! these ahead of libc; each forwards to its `*_impl`.

#![cfg(target_os = "linux")]

use libc::{
    c_char, c_int, c_void, dirent, dirent64, mode_t, off64_t, off_t, pid_t,
    posix_spawn_file_actions_t, posix_spawnattr_t, size_t, ssize_t, DIR, FILE,
};

use crate::reals::{self, PosixSpawnFn};
use crate::syscalls::{dir, io, open, process, shell, stdio};

// ---- open family ----

#[no_mangle]
pub unsafe extern "C" fn open(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    open::open_impl(&reals::REAL_OPEN, path, flags, mode)
}

#[no_mangle]
pub unsafe extern "C" fn open64(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    open::open_impl(&reals::REAL_OPEN64, path, flags, mode)
}

#[no_mangle]
pub unsafe extern "C" fn openat(
    dirfd: c_int,
    path: *const c_char,
    flags: c_int,
    mode: mode_t,
) -> c_int {
    open::openat_impl(&reals::REAL_OPENAT, dirfd, path, flags, mode)
}

#[no_mangle]
pub unsafe extern "C" fn openat64(
    dirfd: c_int,
    path: *const c_char,
    flags: c_int,
    mode: mode_t,
) -> c_int {
    open::openat_impl(&reals::REAL_OPENAT64, dirfd, path, flags, mode)
}

// ---- descriptor I/O ----

#[no_mangle]
pub unsafe extern "C" fn read(fd: c_int, buf: *mut c_void, count: size_t) -> ssize_t {
    io::read_impl(fd, buf, count)
}

#[no_mangle]
pub unsafe extern "C" fn __read_chk(
    fd: c_int,
    buf: *mut c_void,
    nbytes: size_t,
    buflen: size_t,
) -> ssize_t {
    io::read_chk_impl(fd, buf, nbytes, buflen)
}

#[no_mangle]
pub unsafe extern "C" fn lseek(fd: c_int, offset: off_t, whence: c_int) -> off_t {
    io::lseek_impl(fd, offset, whence)
}

#[no_mangle]
pub unsafe extern "C" fn lseek64(fd: c_int, offset: off64_t, whence: c_int) -> off64_t {
    io::lseek64_impl(fd, offset, whence)
}

#[no_mangle]
pub unsafe extern "C" fn close(fd: c_int) -> c_int {
    io::close_impl(fd)
}

#[no_mangle]
pub unsafe extern "C" fn dup2(oldfd: c_int, newfd: c_int) -> c_int {
    io::dup2_impl(oldfd, newfd)
}

#[no_mangle]
pub unsafe extern "C" fn dup3(oldfd: c_int, newfd: c_int, flags: c_int) -> c_int {
    io::dup3_impl(oldfd, newfd, flags)
}

// ---- stdio ----

#[no_mangle]
pub unsafe extern "C" fn fopen(path: *const c_char, mode: *const c_char) -> *mut FILE {
    stdio::fopen_impl(&reals::REAL_FOPEN, path, mode)
}

#[no_mangle]
pub unsafe extern "C" fn fopen64(path: *const c_char, mode: *const c_char) -> *mut FILE {
    stdio::fopen_impl(&reals::REAL_FOPEN64, path, mode)
}

#[no_mangle]
pub unsafe extern "C" fn fread(
    ptr: *mut c_void,
    size: size_t,
    nmemb: size_t,
    stream: *mut FILE,
) -> size_t {
    stdio::fread_impl(ptr, size, nmemb, stream)
}

#[no_mangle]
pub unsafe extern "C" fn fgets(s: *mut c_char, size: c_int, stream: *mut FILE) -> *mut c_char {
    stdio::fgets_impl(s, size, stream)
}

#[no_mangle]
pub unsafe extern "C" fn getline(
    lineptr: *mut *mut c_char,
    n: *mut size_t,
    stream: *mut FILE,
) -> ssize_t {
    stdio::getline_impl(lineptr, n, stream)
}

#[no_mangle]
pub unsafe extern "C" fn getdelim(
    lineptr: *mut *mut c_char,
    n: *mut size_t,
    delim: c_int,
    stream: *mut FILE,
) -> ssize_t {
    stdio::getdelim_impl(lineptr, n, delim, stream)
}

#[no_mangle]
pub unsafe extern "C" fn fclose(stream: *mut FILE) -> c_int {
    stdio::fclose_impl(stream)
}

// ---- directories ----

#[no_mangle]
pub unsafe extern "C" fn opendir(path: *const c_char) -> *mut DIR {
    dir::opendir_impl(path)
}

#[no_mangle]
pub unsafe extern "C" fn readdir(d: *mut DIR) -> *mut dirent {
    dir::readdir_impl(d)
}

#[no_mangle]
pub unsafe extern "C" fn readdir64(d: *mut DIR) -> *mut dirent64 {
    dir::readdir64_impl(d)
}

#[no_mangle]
pub unsafe extern "C" fn closedir(d: *mut DIR) -> c_int {
    dir::closedir_impl(d)
}

// ---- process replacement ----

#[no_mangle]
pub unsafe extern "C" fn execve(
    path: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    process::execve_impl(path, argv, envp)
}

#[no_mangle]
pub unsafe extern "C" fn execv(path: *const c_char, argv: *const *const c_char) -> c_int {
    process::execv_impl(path, argv)
}

#[no_mangle]
pub unsafe extern "C" fn execvp(file: *const c_char, argv: *const *const c_char) -> c_int {
    process::execvp_impl(file, argv)
}

#[no_mangle]
pub unsafe extern "C" fn execvpe(
    file: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    process::execvpe_impl(file, argv, envp)
}

#[no_mangle]
pub unsafe extern "C" fn posix_spawn(
    pid: *mut pid_t,
    path: *const c_char,
    file_actions: *const posix_spawn_file_actions_t,
    attrp: *const posix_spawnattr_t,
    argv: *const *mut c_char,
    envp: *const *mut c_char,
) -> c_int {
    let real = real!(REAL_POSIX_SPAWN, PosixSpawnFn);
    process::posix_spawn_impl(real, pid, path, file_actions, attrp, argv, envp)
}

#[no_mangle]
pub unsafe extern "C" fn posix_spawnp(
    pid: *mut pid_t,
    file: *const c_char,
    file_actions: *const posix_spawn_file_actions_t,
    attrp: *const posix_spawnattr_t,
    argv: *const *mut c_char,
    envp: *const *mut c_char,
) -> c_int {
    let real = real!(REAL_POSIX_SPAWNP, PosixSpawnFn);
    process::posix_spawn_impl(real, pid, file, file_actions, attrp, argv, envp)
}

// ---- list-argument exec ----
//
// execl, execle and execlp are variadic. Their bodies live in
// src/c/variadic_exec.c, which gathers the list into an argv and calls
// back into the bridges below. The exported names are naked trampolines
// that tail-jump into the C bodies with the caller's frame untouched.

#[no_mangle]
pub unsafe extern "C" fn hwspoof_execv_bridge(
    path: *const c_char,
    argv: *const *const c_char,
) -> c_int {
    process::execv_impl(path, argv)
}

#[no_mangle]
pub unsafe extern "C" fn hwspoof_execve_bridge(
    path: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    process::execve_impl(path, argv, envp)
}

#[no_mangle]
pub unsafe extern "C" fn hwspoof_execvp_bridge(
    file: *const c_char,
    argv: *const *const c_char,
) -> c_int {
    process::execvp_impl(file, argv)
}

#[cfg(target_arch = "x86_64")]
macro_rules! tail_jump {
    ($target:ident) => {
        core::arch::naked_asm!("jmp {}", sym $target)
    };
}

#[cfg(target_arch = "aarch64")]
macro_rules! tail_jump {
    ($target:ident) => {
        core::arch::naked_asm!("b {}", sym $target)
    };
}

macro_rules! variadic_export {
    ($($export:ident => $body:ident),* $(,)?) => {
        extern "C" {
            $(fn $body();)*
        }
        $(
            #[no_mangle]
            #[unsafe(naked)]
            pub unsafe extern "C" fn $export() {
                tail_jump!($body)
            }
        )*
    };
}

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
variadic_export! {
    execl => hwspoof_execl,
    execle => hwspoof_execle,
    execlp => hwspoof_execlp,
}

// ---- shells ----

#[no_mangle]
pub unsafe extern "C" fn system(command: *const c_char) -> c_int {
    shell::system_impl(command)
}

#[no_mangle]
pub unsafe extern "C" fn popen(command: *const c_char, mode: *const c_char) -> *mut FILE {
    shell::popen_impl(command, mode)
}

#[no_mangle]
pub unsafe extern "C" fn pclose(stream: *mut FILE) -> c_int {
    shell::pclose_impl(stream)
}
