/// One diagnostic line on stderr when `SPOOF_LOG` is on.
///
/// Formats into a stack buffer and writes it with a single `write(2)`, so
/// it never allocates and never re-enters an interposed function. errno is
/// preserved across the call.
#[macro_export]
macro_rules! spoof_log {
    ($($arg:tt)*) => {
        {
            if $crate::state::LOG_ENABLED.load(std::sync::atomic::Ordering::Relaxed) {
                use std::fmt::Write;
                let _errno = $crate::state::ErrnoGuard::save();
                let mut buf = [0u8; 512];
                let mut wrapper = $crate::macros::StackWriter::new(&mut buf);
                let pid = unsafe { libc::getpid() };
                let _ = write!(wrapper, "[hwspoof] pid={} ", pid);
                let _ = write!(wrapper, $($arg)*);
                let _ = writeln!(wrapper);

                let msg = wrapper.as_bytes();
                unsafe {
                    libc::write(2, msg.as_ptr() as *const libc::c_void, msg.len());
                }
            }
        }
    };
}

/// Typed real implementation: `real!(REAL_OPEN, OpenFn)`.
#[macro_export]
macro_rules! real {
    ($storage:ident, $t:ty) => {
        std::mem::transmute::<*mut libc::c_void, $t>($crate::reals::$storage.get())
    };
}

/// Truncating `fmt::Write` sink over a borrowed buffer. A full buffer keeps
/// the longest valid UTF-8 prefix.
pub struct StackWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> StackWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.pos]
    }
}

impl<'a> std::fmt::Write for StackWriter<'a> {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        let remaining = self.buf.len() - self.pos;
        let mut to_copy = std::cmp::min(s.len(), remaining);
        while !s.is_char_boundary(to_copy) {
            to_copy -= 1;
        }
        self.buf[self.pos..self.pos + to_copy].copy_from_slice(&s.as_bytes()[..to_copy]);
        self.pos += to_copy;
        Ok(())
    }
}
