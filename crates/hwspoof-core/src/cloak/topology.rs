//! Filtering of the `/sys/devices/system/cpu` listing.
//!
//! Real `cpuN` entries at or above the simulated thread count are hidden.
//! Once the real stream is exhausted, any index below the thread count the
//! host did not list is synthesized, so a full enumeration always reports
//! exactly `cpu0..cpu{T-1}`.

use crate::classify::parse_decimal;

/// Highest thread count the cursor can track.
pub const MAX_TOPOLOGY_CPUS: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryVerdict {
    Show,
    Hide,
}

/// `cpu` followed by a purely numeric suffix.
pub fn cpu_index(name: &[u8]) -> Option<u64> {
    parse_decimal(name.strip_prefix(b"cpu")?)
}

/// Verdict for one real entry against `threads`. Malformed names show.
pub fn classify_entry(name: &[u8], threads: u32) -> EntryVerdict {
    match cpu_index(name) {
        Some(n) if n >= u64::from(threads) => EntryVerdict::Hide,
        _ => EntryVerdict::Show,
    }
}

/// Per-stream enumeration state.
#[derive(Debug, Clone)]
pub struct TopologyCursor {
    threads: u32,
    seen: [u64; 4],
    next_candidate: u32,
}

impl TopologyCursor {
    pub fn new(threads: u32) -> Self {
        Self {
            threads: threads.min(MAX_TOPOLOGY_CPUS),
            seen: [0; 4],
            next_candidate: 0,
        }
    }

    pub fn threads(&self) -> u32 {
        self.threads
    }

    /// Record a real entry and decide whether it is shown.
    pub fn observe(&mut self, name: &[u8]) -> EntryVerdict {
        let verdict = classify_entry(name, self.threads);
        if verdict == EntryVerdict::Show {
            if let Some(n) = cpu_index(name) {
                // n < threads <= MAX_TOPOLOGY_CPUS here
                self.mark_seen(n as u32);
            }
        }
        verdict
    }

    /// Next index the real stream never produced. Call only once the real
    /// stream is exhausted; returns `None` when the listing is complete.
    pub fn next_missing(&mut self) -> Option<u32> {
        while self.next_candidate < self.threads {
            let n = self.next_candidate;
            self.next_candidate += 1;
            if !self.is_seen(n) {
                self.mark_seen(n);
                return Some(n);
            }
        }
        None
    }

    fn is_seen(&self, n: u32) -> bool {
        self.seen[(n / 64) as usize] & (1 << (n % 64)) != 0
    }

    fn mark_seen(&mut self, n: u32) {
        self.seen[(n / 64) as usize] |= 1 << (n % 64);
    }
}

/// Fixed-size `cpuN` name, for filling a synthetic directory entry.
#[derive(Clone, Copy)]
pub struct CpuName {
    bytes: [u8; 16],
    len: usize,
}

impl CpuName {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

pub fn cpu_entry_name(index: u32) -> CpuName {
    let mut bytes = [0u8; 16];
    bytes[..3].copy_from_slice(b"cpu");
    let mut digits = [0u8; 10];
    let mut n = index;
    let mut count = 0;
    loop {
        digits[count] = b'0' + (n % 10) as u8;
        count += 1;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    for i in 0..count {
        bytes[3 + i] = digits[count - 1 - i];
    }
    CpuName {
        bytes,
        len: 3 + count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_entry() {
        assert_eq!(classify_entry(b"cpu0", 16), EntryVerdict::Show);
        assert_eq!(classify_entry(b"cpu15", 16), EntryVerdict::Show);
        assert_eq!(classify_entry(b"cpu16", 16), EntryVerdict::Hide);
        assert_eq!(classify_entry(b"cpu1000", 16), EntryVerdict::Hide);
        assert_eq!(classify_entry(b"cpufreq", 16), EntryVerdict::Show);
        assert_eq!(classify_entry(b"cpuidle", 16), EntryVerdict::Show);
        assert_eq!(classify_entry(b"cpu", 16), EntryVerdict::Show);
        assert_eq!(classify_entry(b"cpu1x", 16), EntryVerdict::Show);
        assert_eq!(classify_entry(b"online", 16), EntryVerdict::Show);
        assert_eq!(classify_entry(b"..", 16), EntryVerdict::Show);
    }

    #[test]
    fn test_cpu_entry_name() {
        assert_eq!(cpu_entry_name(0).as_bytes(), b"cpu0");
        assert_eq!(cpu_entry_name(7).as_bytes(), b"cpu7");
        assert_eq!(cpu_entry_name(15).as_bytes(), b"cpu15");
        assert_eq!(cpu_entry_name(u32::MAX).as_bytes(), b"cpu4294967295");
    }

    #[test]
    fn test_next_missing_fills_gaps() {
        let mut cursor = TopologyCursor::new(4);
        assert_eq!(cursor.observe(b"cpu1"), EntryVerdict::Show);
        assert_eq!(cursor.observe(b"cpu3"), EntryVerdict::Show);
        assert_eq!(cursor.observe(b"cpu9"), EntryVerdict::Hide);
        assert_eq!(cursor.next_missing(), Some(0));
        assert_eq!(cursor.next_missing(), Some(2));
        assert_eq!(cursor.next_missing(), None);
        assert_eq!(cursor.next_missing(), None);
    }
}
