//! Process context and the per-thread reentrancy guard.

use std::ffi::CStr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

use hwspoof_config::SpoofConfig;
use hwspoof_core::{Classifier, DescriptorTable, DirectoryOverlay, GeneratedContent};

use crate::cloak::{self, InjectionRecord};

/// Mirrors `SpoofConfig::log`; read by `spoof_log!` without touching the context.
pub static LOG_ENABLED: AtomicBool = AtomicBool::new(false);

static SPOOF_STATE: AtomicPtr<SpoofState> = AtomicPtr::new(std::ptr::null_mut());
static INSTALLING: AtomicBool = AtomicBool::new(false);

/// Everything an interception needs, built once per process and never freed.
pub struct SpoofState {
    pub config: SpoofConfig,
    pub classifier: Classifier,
    pub content: GeneratedContent,
    pub table: DescriptorTable,
    pub dirs: DirectoryOverlay,
    /// Injection and configuration assignments captured at load
    pub injection: InjectionRecord,
    /// File name of this library as it appears in `/proc/self/maps`
    pub library_name: Box<[u8]>,
}

impl SpoofState {
    /// The process context, installing it on first use.
    ///
    /// Returns `None` while another thread is installing; callers pass the
    /// operation through to the real implementation in that window.
    pub fn get() -> Option<&'static Self> {
        let ptr = SPOOF_STATE.load(Ordering::Acquire);
        if !ptr.is_null() {
            return Some(unsafe { &*ptr });
        }
        Self::install()
    }

    pub fn install() -> Option<&'static Self> {
        if INSTALLING.swap(true, Ordering::AcqRel) {
            return None;
        }
        // Another thread may have finished between our load and the swap.
        let existing = SPOOF_STATE.load(Ordering::Acquire);
        if !existing.is_null() {
            INSTALLING.store(false, Ordering::Release);
            return Some(unsafe { &*existing });
        }

        let ptr = Box::into_raw(Box::new(Self::build()));
        SPOOF_STATE.store(ptr, Ordering::Release);
        INSTALLING.store(false, Ordering::Release);
        spoof_log!("installed (table capacity {})", unsafe { &*ptr }.table.capacity());
        Some(unsafe { &*ptr })
    }

    fn build() -> Self {
        let config = SpoofConfig::from_lookup(getenv);
        LOG_ENABLED.store(config.log, Ordering::Relaxed);

        // Captured before scrubbing so descendants can be re-injected even
        // when this process hides the variables from itself.
        let injection = InjectionRecord::capture();
        if config.cloak {
            let scrubbed = unsafe { cloak::scrub_environment(&injection) };
            spoof_log!("scrubbed {} environment entries", scrubbed);
        }

        let pid = std::process::id();
        Self {
            config,
            classifier: Classifier::new(config, pid),
            content: GeneratedContent::default_machine(pid),
            table: DescriptorTable::default(),
            dirs: DirectoryOverlay::default(),
            injection,
            library_name: cloak::library_file_name(),
        }
    }
}

/// `getenv` for a key without a terminator. Keys longer than the stack
/// buffer are treated as unset.
fn getenv(key: &str) -> Option<String> {
    let mut buf = [0u8; 64];
    let bytes = key.as_bytes();
    if bytes.len() >= buf.len() {
        return None;
    }
    buf[..bytes.len()].copy_from_slice(bytes);
    let value = unsafe { libc::getenv(buf.as_ptr() as *const libc::c_char) };
    if value.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(value) }.to_string_lossy().into_owned())
}

const KEY_UNSET: usize = usize::MAX;
const KEY_FAILED: usize = usize::MAX - 1;

// Lock-free so the first interception on any thread can create it.
static GUARD_KEY: AtomicUsize = AtomicUsize::new(KEY_UNSET);

fn guard_key() -> Option<libc::pthread_key_t> {
    match GUARD_KEY.load(Ordering::Acquire) {
        KEY_FAILED => return None,
        KEY_UNSET => {}
        key => return Some(key as libc::pthread_key_t),
    }

    let mut key: libc::pthread_key_t = 0;
    if unsafe { libc::pthread_key_create(&mut key, None) } != 0 {
        return match GUARD_KEY.compare_exchange(
            KEY_UNSET,
            KEY_FAILED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) | Err(KEY_FAILED) => None,
            Err(winner) => Some(winner as libc::pthread_key_t),
        };
    }

    match GUARD_KEY.compare_exchange(KEY_UNSET, key as usize, Ordering::AcqRel, Ordering::Acquire)
    {
        Ok(_) => Some(key),
        Err(current) => {
            // Another thread beat us, clean up and use their key
            unsafe { libc::pthread_key_delete(key) };
            if current == KEY_FAILED {
                None
            } else {
                Some(current as libc::pthread_key_t)
            }
        }
    }
}

/// Marks the current thread as inside the inception layer until dropped.
///
/// `enter` returns `None` when the thread is already inside (a real
/// function called back into one of our exports) or when no TLS key could
/// be created; either way the caller delegates to the real function.
pub struct InceptionGuard {
    key: libc::pthread_key_t,
}

impl InceptionGuard {
    pub fn enter() -> Option<Self> {
        let key = guard_key()?;
        unsafe {
            if !libc::pthread_getspecific(key).is_null() {
                return None;
            }
            libc::pthread_setspecific(key, std::ptr::NonNull::<u8>::dangling().as_ptr().cast());
        }
        Some(Self { key })
    }
}

impl Drop for InceptionGuard {
    fn drop(&mut self) {
        unsafe { libc::pthread_setspecific(self.key, std::ptr::null()) };
    }
}

/// Restores errno on drop.
pub struct ErrnoGuard(libc::c_int);

impl ErrnoGuard {
    pub fn save() -> Self {
        Self(crate::get_errno())
    }
}

impl Drop for ErrnoGuard {
    fn drop(&mut self) {
        crate::set_errno(self.0);
    }
}
