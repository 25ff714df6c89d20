//! # hwspoof-inception-layer
//!
//! LD_PRELOAD inception layer presenting a synthetic hardware identity.
//! Zero-allocation on the interception paths and recursion-safe.
//!
//! # Safety rules for code in this crate
//!
//! - Never call an interposed libc function from inside an `*_impl`
//!   except through `reals`. Use `libc::write(2, ...)` (via `spoof_log!`)
//!   for diagnostics, never `println!`/`eprintln!`.
//! - Every `*_impl` takes an [`state::InceptionGuard`] before touching
//!   [`state::SpoofState`]; without the guard it delegates to the real
//!   function immediately.
//! - Never hold a table lock across a real libc call.

// Allow unsafe FFI functions without safety docs - these are inherently unsafe C ABI
#![allow(clippy::missing_safety_doc)]

// Macros must be defined before modules that use them
#[macro_use]
pub mod macros;

pub mod cloak;
pub mod interpose;
pub mod reals;
pub mod state;
pub mod syscalls;

/// Set the calling thread's errno.
#[inline]
pub fn set_errno(e: libc::c_int) {
    unsafe { *libc::__errno_location() = e };
}

#[inline]
pub fn get_errno() -> libc::c_int {
    unsafe { *libc::__errno_location() }
}

/// Build the process context as soon as the loader maps us, before the
/// host program's `main` can read its environment.
#[cfg(target_os = "linux")]
#[link_section = ".init_array"]
#[used]
pub static INSTALL_SPOOF_STATE: unsafe extern "C" fn() = {
    unsafe extern "C" fn install() {
        let _guard = crate::state::InceptionGuard::enter();
        crate::state::SpoofState::install();
    }
    install
};
