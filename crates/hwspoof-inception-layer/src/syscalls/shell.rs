//! `system` and `popen`. glibc starts their shells through an internal
//! spawn that never reaches our exports, so a scrubbed process would drop
//! the layer in every shell it runs. When the environment lacks captured
//! assignments the shell is spawned here instead, the way glibc does it,
//! through the real `posix_spawn` with a re-injected environment.

use std::ffi::CStr;
use std::mem;
use std::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use libc::{c_char, c_int, pid_t, posix_spawn_file_actions_t, posix_spawnattr_t, FILE};

use crate::cloak::current_environ;
use crate::reals::{CloseFn, FcloseFn, PcloseFn, PopenFn, PosixSpawnFn, SystemFn};
use crate::state::{ErrnoGuard, InceptionGuard, SpoofState};
use crate::syscalls::process::{needs_injection, with_injected_env};

const SHELL_PATH: &[u8] = b"/bin/sh\0";
const SHELL_NAME: &[u8] = b"sh\0";
const SHELL_FLAG: &[u8] = b"-c\0";
const END_OF_OPTIONS: &[u8] = b"--\0";
const AVAILABILITY_CHECK: &[u8] = b"exit 0\0";

/// `W_EXITCODE(127, 0)`, reported when the shell could not be started.
const SHELL_NOT_STARTED: c_int = 127 << 8;

/// A shell started by `popen_impl`.
struct ShellChild {
    stream: usize,
    /// Parent end of the pipe
    fd: c_int,
    pid: pid_t,
}

static SHELL_CHILDREN: Mutex<Vec<ShellChild>> = Mutex::new(Vec::new());

fn shell_children() -> MutexGuard<'static, Vec<ShellChild>> {
    SHELL_CHILDREN.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The process context, when a shell started now would miss captured
/// assignments.
unsafe fn injecting_state() -> Option<&'static SpoofState> {
    let state = SpoofState::get()?;
    needs_injection(state, current_environ()).then_some(state)
}

/// `/bin/sh -c -- command`. Returns the `posix_spawn` result.
unsafe fn spawn_shell(
    state: &SpoofState,
    pid: &mut pid_t,
    command: *const c_char,
    actions: *const posix_spawn_file_actions_t,
    attr: *const posix_spawnattr_t,
) -> c_int {
    let argv: [*const c_char; 5] = [
        SHELL_NAME.as_ptr().cast(),
        SHELL_FLAG.as_ptr().cast(),
        END_OF_OPTIONS.as_ptr().cast(),
        command,
        ptr::null(),
    ];
    let real_spawn = real!(REAL_POSIX_SPAWN, PosixSpawnFn);
    with_injected_env(state, current_environ(), |env| {
        real_spawn(
            pid,
            SHELL_PATH.as_ptr().cast(),
            actions,
            attr,
            argv.as_ptr() as *const *mut c_char,
            env as *const *mut c_char,
        )
    })
}

/// Wait status of `pid`, or -1 with errno set.
unsafe fn wait_for(pid: pid_t) -> c_int {
    let mut status = 0;
    loop {
        if libc::waitpid(pid, &mut status, 0) == pid {
            return status;
        }
        if crate::get_errno() != libc::EINTR {
            return -1;
        }
    }
}

pub unsafe fn system_impl(command: *const c_char) -> c_int {
    let real_system = real!(REAL_SYSTEM, SystemFn);
    let Some(_guard) = InceptionGuard::enter() else {
        return real_system(command);
    };
    let Some(state) = injecting_state() else {
        return real_system(command);
    };
    if command.is_null() {
        // Nonzero when a shell is available
        return c_int::from(run_shell(state, AVAILABILITY_CHECK.as_ptr().cast()) == 0);
    }
    run_shell(state, command)
}

/// glibc's `system`: SIGINT and SIGQUIT ignored and SIGCHLD blocked in
/// the caller while the shell runs; the shell gets the caller's mask and
/// default dispositions for the signals that were not already ignored.
unsafe fn run_shell(state: &SpoofState, command: *const c_char) -> c_int {
    let mut ignore: libc::sigaction = mem::zeroed();
    ignore.sa_sigaction = libc::SIG_IGN;
    libc::sigemptyset(&mut ignore.sa_mask);
    let mut old_int: libc::sigaction = mem::zeroed();
    let mut old_quit: libc::sigaction = mem::zeroed();
    libc::sigaction(libc::SIGINT, &ignore, &mut old_int);
    libc::sigaction(libc::SIGQUIT, &ignore, &mut old_quit);

    let mut chld: libc::sigset_t = mem::zeroed();
    libc::sigemptyset(&mut chld);
    libc::sigaddset(&mut chld, libc::SIGCHLD);
    let mut old_mask: libc::sigset_t = mem::zeroed();
    libc::sigprocmask(libc::SIG_BLOCK, &chld, &mut old_mask);

    let mut defaults: libc::sigset_t = mem::zeroed();
    libc::sigemptyset(&mut defaults);
    if old_int.sa_sigaction != libc::SIG_IGN {
        libc::sigaddset(&mut defaults, libc::SIGINT);
    }
    if old_quit.sa_sigaction != libc::SIG_IGN {
        libc::sigaddset(&mut defaults, libc::SIGQUIT);
    }

    let mut attr: posix_spawnattr_t = mem::zeroed();
    libc::posix_spawnattr_init(&mut attr);
    libc::posix_spawnattr_setsigmask(&mut attr, &old_mask);
    libc::posix_spawnattr_setsigdefault(&mut attr, &defaults);
    libc::posix_spawnattr_setflags(
        &mut attr,
        (libc::POSIX_SPAWN_SETSIGDEF | libc::POSIX_SPAWN_SETSIGMASK) as libc::c_short,
    );

    let mut pid: pid_t = 0;
    let spawned = spawn_shell(state, &mut pid, command, ptr::null(), &attr);
    libc::posix_spawnattr_destroy(&mut attr);
    let status = if spawned == 0 {
        spoof_log!("system shell {} started with re-injected environment", pid);
        wait_for(pid)
    } else {
        SHELL_NOT_STARTED
    };

    let _errno = ErrnoGuard::save();
    libc::sigaction(libc::SIGINT, &old_int, ptr::null_mut());
    libc::sigaction(libc::SIGQUIT, &old_quit, ptr::null_mut());
    libc::sigprocmask(libc::SIG_SETMASK, &old_mask, ptr::null_mut());
    status
}

/// `r` or `w`, optionally followed by `e`: (reading, close-on-exec).
fn parse_popen_mode(mode: &[u8]) -> Option<(bool, bool)> {
    let (&first, rest) = mode.split_first()?;
    let reading = match first {
        b'r' => true,
        b'w' => false,
        _ => return None,
    };
    if rest.iter().any(|&b| b != b'e') {
        return None;
    }
    Some((reading, !rest.is_empty()))
}

pub unsafe fn popen_impl(command: *const c_char, mode: *const c_char) -> *mut FILE {
    let real_popen = real!(REAL_POPEN, PopenFn);
    let Some(_guard) = InceptionGuard::enter() else {
        return real_popen(command, mode);
    };
    if command.is_null() || mode.is_null() {
        return real_popen(command, mode);
    }
    let Some(state) = injecting_state() else {
        return real_popen(command, mode);
    };
    let Some((reading, cloexec)) = parse_popen_mode(CStr::from_ptr(mode).to_bytes()) else {
        crate::set_errno(libc::EINVAL);
        return ptr::null_mut();
    };

    let mut fds: [c_int; 2] = [-1; 2];
    if libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) != 0 {
        return ptr::null_mut();
    }
    let (parent_fd, child_fd, child_target) = if reading {
        (fds[0], fds[1], libc::STDOUT_FILENO)
    } else {
        (fds[1], fds[0], libc::STDIN_FILENO)
    };

    let mut actions: posix_spawn_file_actions_t = mem::zeroed();
    libc::posix_spawn_file_actions_init(&mut actions);
    libc::posix_spawn_file_actions_adddup2(&mut actions, child_fd, child_target);
    // Streams from earlier popen calls must not leak into this shell
    for child in shell_children().iter() {
        if child.fd != child_target {
            libc::posix_spawn_file_actions_addclose(&mut actions, child.fd);
        }
    }

    let mut pid: pid_t = 0;
    let spawned = spawn_shell(state, &mut pid, command, &actions, ptr::null());
    libc::posix_spawn_file_actions_destroy(&mut actions);
    let real_close = real!(REAL_CLOSE, CloseFn);
    real_close(child_fd);
    if spawned != 0 {
        real_close(parent_fd);
        crate::set_errno(spawned);
        return ptr::null_mut();
    }

    if !cloexec {
        libc::fcntl(parent_fd, libc::F_SETFD, 0);
    }
    let stream_mode: &[u8] = if reading { b"r\0" } else { b"w\0" };
    let stream = libc::fdopen(parent_fd, stream_mode.as_ptr().cast());
    if stream.is_null() {
        let _errno = ErrnoGuard::save();
        real_close(parent_fd);
        wait_for(pid);
        return ptr::null_mut();
    }

    shell_children().push(ShellChild {
        stream: stream as usize,
        fd: parent_fd,
        pid,
    });
    spoof_log!("popen shell {} started with re-injected environment", pid);
    stream
}

/// Streams from `popen_impl` are closed and reaped here; anything else
/// belongs to the real `pclose`.
pub unsafe fn pclose_impl(stream: *mut FILE) -> c_int {
    let child = {
        let mut children = shell_children();
        children
            .iter()
            .position(|c| c.stream == stream as usize)
            .map(|i| children.swap_remove(i))
    };
    let Some(child) = child else {
        return real!(REAL_PCLOSE, PcloseFn)(stream);
    };
    real!(REAL_FCLOSE, FcloseFn)(stream);
    wait_for(child.pid)
}
