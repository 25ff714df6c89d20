//! Interception bodies. Each `*_impl` takes the reentrancy guard, looks
//! the call up in the process context and otherwise delegates to the real
//! function.

pub mod dir;
pub mod io;
pub mod open;
pub mod process;
pub mod shell;
pub mod stdio;
