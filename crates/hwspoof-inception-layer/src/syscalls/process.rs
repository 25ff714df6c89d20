//! Image replacement and spawning: carry the layer into descendants.

use libc::{c_char, c_int, pid_t, posix_spawn_file_actions_t, posix_spawnattr_t};

use hwspoof_config::SCRUBBED_VARS;
use hwspoof_core::cloak::{collect_missing, fill_slots, EnvPlan, STACK_ENV_SLOTS};

use crate::cloak::{current_environ, env_contains, env_len};
use crate::reals::{ExecveFn, ExecvFn, PosixSpawnFn};
use crate::state::{InceptionGuard, SpoofState};

/// Whether `envp` lacks any captured assignment.
pub(crate) unsafe fn needs_injection(state: &SpoofState, envp: *const *const c_char) -> bool {
    state
        .injection
        .entries()
        .iter()
        .any(|a| !env_contains(envp, a.prefix()))
}

/// Run `f` with `envp`, or with a copy that has every captured assignment
/// `envp` lacks prepended. If the copy cannot be allocated `envp` is used
/// unchanged.
pub(crate) unsafe fn with_injected_env<R>(
    state: &SpoofState,
    envp: *const *const c_char,
    f: impl FnOnce(*const *const c_char) -> R,
) -> R {
    let mut missing = [std::ptr::null::<c_char>(); SCRUBBED_VARS.len()];
    let captured = state
        .injection
        .entries()
        .iter()
        .map(|a| (a.prefix(), a.as_ptr()));
    let n_missing = collect_missing(captured, |prefix| env_contains(envp, prefix), &mut missing);
    let missing = &missing[..n_missing];

    let existing = env_len(envp);
    let entries = (0..existing).map(|i| *envp.add(i));
    match EnvPlan::new(n_missing, existing) {
        EnvPlan::Unchanged => f(envp),
        EnvPlan::Stack { total } => {
            spoof_log!("re-injecting {} environment entries", n_missing);
            let mut slots = [std::ptr::null::<c_char>(); STACK_ENV_SLOTS];
            fill_slots(&mut slots[..total], missing, entries, std::ptr::null());
            f(slots.as_ptr())
        }
        EnvPlan::Heap { total } => {
            let mut heap: Vec<*const c_char> = Vec::new();
            if heap.try_reserve_exact(total).is_err() {
                spoof_log!("cannot allocate {} environment slots, passing through", total);
                return f(envp);
            }
            spoof_log!("re-injecting {} environment entries", n_missing);
            heap.resize(total, std::ptr::null());
            fill_slots(&mut heap, missing, entries, std::ptr::null());
            f(heap.as_ptr())
        }
    }
}

pub unsafe fn execve_impl(
    path: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    let real_execve = real!(REAL_EXECVE, ExecveFn);
    let Some(_guard) = InceptionGuard::enter() else {
        return real_execve(path, argv, envp);
    };
    let Some(state) = SpoofState::get() else {
        return real_execve(path, argv, envp);
    };
    with_injected_env(state, envp, |env| real_execve(path, argv, env))
}

/// `execv` uses the current environment; when it needs augmenting the
/// call goes out as `execve`.
pub unsafe fn execv_impl(path: *const c_char, argv: *const *const c_char) -> c_int {
    let real_execv = real!(REAL_EXECV, ExecvFn);
    let Some(_guard) = InceptionGuard::enter() else {
        return real_execv(path, argv);
    };
    let Some(state) = SpoofState::get() else {
        return real_execv(path, argv);
    };
    let real_execve = real!(REAL_EXECVE, ExecveFn);
    with_injected_env(state, current_environ(), |env| real_execve(path, argv, env))
}

pub unsafe fn execvpe_impl(
    file: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    let real_execvpe = real!(REAL_EXECVPE, ExecveFn);
    let Some(_guard) = InceptionGuard::enter() else {
        return real_execvpe(file, argv, envp);
    };
    let Some(state) = SpoofState::get() else {
        return real_execvpe(file, argv, envp);
    };
    with_injected_env(state, envp, |env| real_execvpe(file, argv, env))
}

/// `execvp` counterpart of [`execv_impl`], going out as `execvpe`.
pub unsafe fn execvp_impl(file: *const c_char, argv: *const *const c_char) -> c_int {
    let real_execvp = real!(REAL_EXECVP, ExecvFn);
    let Some(_guard) = InceptionGuard::enter() else {
        return real_execvp(file, argv);
    };
    let Some(state) = SpoofState::get() else {
        return real_execvp(file, argv);
    };
    let real_execvpe = real!(REAL_EXECVPE, ExecveFn);
    with_injected_env(state, current_environ(), |env| real_execvpe(file, argv, env))
}

pub unsafe fn posix_spawn_impl(
    real: PosixSpawnFn,
    pid: *mut pid_t,
    path: *const c_char,
    file_actions: *const posix_spawn_file_actions_t,
    attrp: *const posix_spawnattr_t,
    argv: *const *mut c_char,
    envp: *const *mut c_char,
) -> c_int {
    let Some(_guard) = InceptionGuard::enter() else {
        return real(pid, path, file_actions, attrp, argv, envp);
    };
    let Some(state) = SpoofState::get() else {
        return real(pid, path, file_actions, attrp, argv, envp);
    };
    with_injected_env(state, envp as *const *const c_char, |env| {
        real(pid, path, file_actions, attrp, argv, env as *const *mut c_char)
    })
}
