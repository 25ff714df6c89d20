//! Environment assembly for descendants.
//!
//! A scrubbed process no longer carries the injection and configuration
//! variables, so every image replacement or spawn gets a rebuilt
//! environment: the captured assignments the target environment lacks,
//! first, then the target environment itself, then the terminator.
//!
//! Generic over the slot type so the inception layer can work on raw C
//! string pointers without allocating.

/// Environments up to this many slots (entries plus terminator) are
/// rebuilt on the stack.
pub const STACK_ENV_SLOTS: usize = 256;

/// Where a rebuilt environment has to live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvPlan {
    /// Every captured assignment is already bound; use the target as is.
    Unchanged,
    /// `total` slots fit in a [`STACK_ENV_SLOTS`] array.
    Stack { total: usize },
    /// `total` slots need a heap allocation.
    Heap { total: usize },
}

impl EnvPlan {
    pub fn new(missing: usize, existing: usize) -> Self {
        if missing == 0 {
            return EnvPlan::Unchanged;
        }
        let total = missing + existing + 1;
        if total <= STACK_ENV_SLOTS {
            EnvPlan::Stack { total }
        } else {
            EnvPlan::Heap { total }
        }
    }
}

/// Collect, in capture order, the entries whose `KEY=` prefix the target
/// environment does not bind. `bound` answers that for one prefix.
/// Stops when `missing` is full; returns how many were written.
pub fn collect_missing<'a, T, I, F>(captured: I, mut bound: F, missing: &mut [T]) -> usize
where
    T: Copy,
    I: IntoIterator<Item = (&'a [u8], T)>,
    F: FnMut(&[u8]) -> bool,
{
    let mut n = 0;
    for (prefix, entry) in captured {
        if n == missing.len() {
            break;
        }
        if !bound(prefix) {
            missing[n] = entry;
            n += 1;
        }
    }
    n
}

/// Write `missing`, then `existing`, then `terminator` into `slots`.
///
/// `slots` must be exactly `missing.len() + existing.len() + 1` long.
pub fn fill_slots<T, I>(slots: &mut [T], missing: &[T], existing: I, terminator: T)
where
    T: Copy,
    I: ExactSizeIterator<Item = T>,
{
    debug_assert_eq!(slots.len(), missing.len() + existing.len() + 1);
    let (head, rest) = slots.split_at_mut(missing.len());
    head.copy_from_slice(missing);
    let mut written = 0;
    for (slot, entry) in rest.iter_mut().zip(existing) {
        *slot = entry;
        written += 1;
    }
    rest[written] = terminator;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound_in<'e>(env: &'e [&'e str]) -> impl FnMut(&[u8]) -> bool + 'e {
        move |prefix| env.iter().any(|e| e.as_bytes().starts_with(prefix))
    }

    const CAPTURED: [(&[u8], &str); 3] = [
        (b"LD_PRELOAD=" as &[u8], "LD_PRELOAD=/opt/libhwspoof.so"),
        (b"SPOOF_DDR=" as &[u8], "SPOOF_DDR=0"),
        (b"SPOOF_LOG=" as &[u8], "SPOOF_LOG=1"),
    ];

    #[test]
    fn test_only_unbound_entries_are_missing() {
        let env = ["HOME=/root", "SPOOF_DDR=1"];
        let mut missing = [""; 3];
        let n = collect_missing(CAPTURED, bound_in(&env), &mut missing);
        assert_eq!(&missing[..n], ["LD_PRELOAD=/opt/libhwspoof.so", "SPOOF_LOG=1"]);
    }

    #[test]
    fn test_prefix_match_needs_the_equals_sign() {
        let env = ["LD_PRELOAD_PATH=/x", "SPOOF_DDR=", "SPOOF_LOG=1"];
        let mut missing = [""; 3];
        let n = collect_missing(CAPTURED, bound_in(&env), &mut missing);
        assert_eq!(&missing[..n], ["LD_PRELOAD=/opt/libhwspoof.so"]);
    }

    #[test]
    fn test_collection_stops_when_full() {
        let mut missing = [""; 2];
        let n = collect_missing(CAPTURED, |_: &[u8]| false, &mut missing);
        assert_eq!(n, 2);
        assert_eq!(missing, ["LD_PRELOAD=/opt/libhwspoof.so", "SPOOF_DDR=0"]);
    }

    #[test]
    fn test_plan_boundaries() {
        assert_eq!(EnvPlan::new(0, 10_000), EnvPlan::Unchanged);
        assert_eq!(EnvPlan::new(1, 0), EnvPlan::Stack { total: 2 });
        assert_eq!(
            EnvPlan::new(2, STACK_ENV_SLOTS - 3),
            EnvPlan::Stack { total: STACK_ENV_SLOTS }
        );
        assert_eq!(
            EnvPlan::new(2, STACK_ENV_SLOTS - 2),
            EnvPlan::Heap { total: STACK_ENV_SLOTS + 1 }
        );
    }

    #[test]
    fn test_missing_entries_are_prepended() {
        let missing = ["LD_PRELOAD=/opt/libhwspoof.so", "SPOOF_LOG=1"];
        let existing = ["HOME=/root", "PATH=/bin"];
        let mut slots = ["?"; 5];
        fill_slots(&mut slots, &missing, existing.iter().copied(), "<end>");
        assert_eq!(
            slots,
            ["LD_PRELOAD=/opt/libhwspoof.so", "SPOOF_LOG=1", "HOME=/root", "PATH=/bin", "<end>"]
        );
    }

    #[test]
    fn test_empty_target_environment() {
        let mut slots = [0usize; 2];
        fill_slots(&mut slots, &[7], std::iter::empty(), 0);
        assert_eq!(slots, [7, 0]);
    }

    #[test]
    fn test_heap_sized_environment() {
        let existing: Vec<usize> = (1..=STACK_ENV_SLOTS).collect();
        let plan = EnvPlan::new(1, existing.len());
        let EnvPlan::Heap { total } = plan else {
            panic!("expected heap plan, got {plan:?}");
        };
        let mut slots = vec![usize::MAX; total];
        fill_slots(&mut slots, &[0xAA], existing.iter().copied(), 0);
        assert_eq!(slots[0], 0xAA);
        assert_eq!(&slots[1..=STACK_ENV_SLOTS], &existing[..]);
        assert_eq!(slots[total - 1], 0);
    }
}
