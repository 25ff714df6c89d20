//! Path → category mapping.
//!
//! Runs inside every interposed open, so it works on raw bytes and never
//! allocates or calls into libc.

use hwspoof_config::SpoofConfig;

use crate::category::SpoofCategory;

pub const PROC_CPUINFO: &str = "/proc/cpuinfo";
pub const CPU_ONLINE: &str = "/sys/devices/system/cpu/online";
pub const CPU_PRESENT: &str = "/sys/devices/system/cpu/present";
pub const CPU_TOPOLOGY_DIR: &str = "/sys/devices/system/cpu";
pub const DMI_TABLE: &str = "/sys/firmware/dmi/tables/DMI";
pub const DMI_ENTRY_POINT: &str = "/sys/firmware/dmi/tables/smbios_entry_point";
pub const SELF_MAPS: &str = "/proc/self/maps";
pub const SELF_ENVIRON: &str = "/proc/self/environ";

/// PCI address of the one device whose link speed is reported.
pub const PCIE_DEVICE: &str = "0000:05:00.0";

const CACHE_PREFIX: &[u8] = b"/sys/devices/system/cpu/cpu";
const CACHE_SUFFIX: &[u8] = b"/cache/index3/size";

#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    config: SpoofConfig,
    self_pid: u32,
}

impl Classifier {
    /// `self_pid` lets `/proc/<pid>/...` match like `/proc/self/...`.
    pub fn new(config: SpoofConfig, self_pid: u32) -> Self {
        Self { config, self_pid }
    }

    pub fn config(&self) -> &SpoofConfig {
        &self.config
    }

    /// Category for `path`, or `None` when it is not virtualized or its
    /// toggle is off.
    pub fn classify(&self, path: &[u8]) -> Option<SpoofCategory> {
        self.raw_category(path)
            .filter(|category| category.is_enabled(&self.config))
    }

    fn raw_category(&self, path: &[u8]) -> Option<SpoofCategory> {
        match path {
            b"/proc/cpuinfo" => Some(SpoofCategory::CpuInfo),
            b"/sys/devices/system/cpu/online" => Some(SpoofCategory::CpuOnline),
            b"/sys/devices/system/cpu/present" => Some(SpoofCategory::CpuPresent),
            b"/sys/devices/system/cpu" | b"/sys/devices/system/cpu/" => {
                Some(SpoofCategory::CpuTopologyDir)
            }
            b"/sys/firmware/dmi/tables/DMI" => Some(SpoofCategory::DmiTable),
            b"/sys/firmware/dmi/tables/smbios_entry_point" => Some(SpoofCategory::DmiEntryPoint),
            _ => self
                .match_proc_self(path)
                .or_else(|| match_cache_size(path))
                .or_else(|| match_pcie(path)),
        }
    }

    /// `/proc/{self,thread-self,<own pid>}/{maps,environ}`
    fn match_proc_self(&self, path: &[u8]) -> Option<SpoofCategory> {
        let rest = path.strip_prefix(b"/proc/")?;
        let slash = rest.iter().position(|&b| b == b'/')?;
        let (who, leaf) = rest.split_at(slash);
        let is_self = match who {
            b"self" | b"thread-self" => true,
            digits => parse_decimal(digits) == Some(u64::from(self.self_pid)),
        };
        if !is_self {
            return None;
        }
        match leaf {
            b"/maps" => Some(SpoofCategory::SelfMaps),
            b"/environ" => Some(SpoofCategory::SelfEnviron),
            _ => None,
        }
    }
}

/// `/sys/devices/system/cpu/cpu<digits>/cache/index3/size`
fn match_cache_size(path: &[u8]) -> Option<SpoofCategory> {
    let rest = path.strip_prefix(CACHE_PREFIX)?;
    let digits_end = rest.iter().position(|b| !b.is_ascii_digit())?;
    if digits_end == 0 || &rest[digits_end..] != CACHE_SUFFIX {
        return None;
    }
    Some(SpoofCategory::CacheSize)
}

/// `.../0000:05:00.0/{max,current}_link_speed`
fn match_pcie(path: &[u8]) -> Option<SpoofCategory> {
    let mut components = path.rsplitn(3, |&b| b == b'/');
    let leaf = components.next()?;
    let parent = components.next()?;
    // Require something before the parent so bare relative names don't match.
    components.next()?;
    if parent != PCIE_DEVICE.as_bytes() {
        return None;
    }
    match leaf {
        b"max_link_speed" => Some(SpoofCategory::PcieMaxLinkSpeed),
        b"current_link_speed" => Some(SpoofCategory::PcieCurrentLinkSpeed),
        _ => None,
    }
}

/// Whether a relative `path` could name a virtualized resource once joined
/// to its directory. Only the leaf names of known resources qualify, so
/// most relative opens never need their directory resolved.
pub fn is_relative_candidate(path: &[u8]) -> bool {
    if path.first() == Some(&b'/') {
        return false;
    }
    let leaf = match path.iter().rposition(|&b| b == b'/') {
        Some(slash) => &path[slash + 1..],
        None => path,
    };
    matches!(
        leaf,
        b"cpuinfo"
            | b"online"
            | b"present"
            | b"size"
            | b"DMI"
            | b"smbios_entry_point"
            | b"maps"
            | b"environ"
            | b"max_link_speed"
            | b"current_link_speed"
    )
}

/// `dir` and the relative `path` joined into `out`, with leading `./`
/// components of `path` dropped. `None` when the result does not fit.
pub fn join_relative<'o>(dir: &[u8], path: &[u8], out: &'o mut [u8]) -> Option<&'o [u8]> {
    let mut path = path;
    while let Some(rest) = path.strip_prefix(b"./") {
        path = rest;
    }
    let dir = match dir {
        b"/" => &b""[..],
        d => d.strip_suffix(b"/").unwrap_or(d),
    };
    let len = dir.len() + 1 + path.len();
    if len > out.len() {
        return None;
    }
    out[..dir.len()].copy_from_slice(dir);
    out[dir.len()] = b'/';
    out[dir.len() + 1..len].copy_from_slice(path);
    Some(&out[..len])
}

/// Non-empty, digits only, no overflow.
pub fn parse_decimal(digits: &[u8]) -> Option<u64> {
    if digits.is_empty() {
        return None;
    }
    digits.iter().try_fold(0u64, |acc, &b| {
        if !b.is_ascii_digit() {
            return None;
        }
        acc.checked_mul(10)?.checked_add(u64::from(b - b'0'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new(SpoofConfig::default(), 4242)
    }

    #[test]
    fn test_exact_paths() {
        let c = classifier();
        assert_eq!(c.classify(PROC_CPUINFO.as_bytes()), Some(SpoofCategory::CpuInfo));
        assert_eq!(c.classify(CPU_ONLINE.as_bytes()), Some(SpoofCategory::CpuOnline));
        assert_eq!(c.classify(CPU_PRESENT.as_bytes()), Some(SpoofCategory::CpuPresent));
        assert_eq!(c.classify(DMI_TABLE.as_bytes()), Some(SpoofCategory::DmiTable));
        assert_eq!(
            c.classify(DMI_ENTRY_POINT.as_bytes()),
            Some(SpoofCategory::DmiEntryPoint)
        );
        assert_eq!(c.classify(SELF_MAPS.as_bytes()), Some(SpoofCategory::SelfMaps));
        assert_eq!(c.classify(SELF_ENVIRON.as_bytes()), Some(SpoofCategory::SelfEnviron));
        assert_eq!(
            c.classify(CPU_TOPOLOGY_DIR.as_bytes()),
            Some(SpoofCategory::CpuTopologyDir)
        );
        assert_eq!(
            c.classify(b"/sys/devices/system/cpu/"),
            Some(SpoofCategory::CpuTopologyDir)
        );
    }

    #[test]
    fn test_unrelated_paths_pass_through() {
        let c = classifier();
        for path in [
            &b"/proc/meminfo"[..],
            b"/proc/cpuinfo2",
            b"/etc/passwd",
            b"",
            b"/sys/devices/system/cpu/possible",
            b"/proc/self/status",
            b"/proc/1/maps",
        ] {
            assert_eq!(c.classify(path), None, "{}", String::from_utf8_lossy(path));
        }
    }

    #[test]
    fn test_proc_pid_forms() {
        let c = classifier();
        assert_eq!(c.classify(b"/proc/4242/maps"), Some(SpoofCategory::SelfMaps));
        assert_eq!(c.classify(b"/proc/4242/environ"), Some(SpoofCategory::SelfEnviron));
        assert_eq!(
            c.classify(b"/proc/thread-self/maps"),
            Some(SpoofCategory::SelfMaps)
        );
        assert_eq!(c.classify(b"/proc/42420/maps"), None);
    }

    #[test]
    fn test_cache_size_pattern() {
        let c = classifier();
        assert_eq!(
            c.classify(b"/sys/devices/system/cpu/cpu0/cache/index3/size"),
            Some(SpoofCategory::CacheSize)
        );
        assert_eq!(
            c.classify(b"/sys/devices/system/cpu/cpu127/cache/index3/size"),
            Some(SpoofCategory::CacheSize)
        );
        assert_eq!(c.classify(b"/sys/devices/system/cpu/cpu/cache/index3/size"), None);
        assert_eq!(c.classify(b"/sys/devices/system/cpu/cpu1a/cache/index3/size"), None);
        assert_eq!(c.classify(b"/sys/devices/system/cpu/cpu1/cache/index2/size"), None);
        assert_eq!(c.classify(b"/sys/devices/system/cpu/cpu1/cache/index3/size/x"), None);
    }

    #[test]
    fn test_pcie_scoped_to_device() {
        let c = classifier();
        assert_eq!(
            c.classify(b"/sys/bus/pci/devices/0000:05:00.0/max_link_speed"),
            Some(SpoofCategory::PcieMaxLinkSpeed)
        );
        assert_eq!(
            c.classify(b"/sys/devices/pci0000:00/0000:00:03.1/0000:05:00.0/current_link_speed"),
            Some(SpoofCategory::PcieCurrentLinkSpeed)
        );
        assert_eq!(
            c.classify(b"/sys/bus/pci/devices/0000:06:00.0/max_link_speed"),
            None
        );
        assert_eq!(
            c.classify(b"/sys/bus/pci/devices/0000:05:00.0/max_link_width"),
            None
        );
        assert_eq!(c.classify(b"0000:05:00.0/max_link_speed"), None);
    }

    #[test]
    fn test_disabled_toggle_hides_category() {
        let c = Classifier::new(
            SpoofConfig {
                cpu: false,
                ddr: false,
                ..Default::default()
            },
            1,
        );
        assert_eq!(c.classify(PROC_CPUINFO.as_bytes()), None);
        assert_eq!(c.classify(DMI_TABLE.as_bytes()), None);
        assert_eq!(c.classify(DMI_ENTRY_POINT.as_bytes()), None);
        assert_eq!(c.classify(CPU_ONLINE.as_bytes()), Some(SpoofCategory::CpuOnline));
    }

    #[test]
    fn test_relative_candidates() {
        assert!(is_relative_candidate(b"cpuinfo"));
        assert!(is_relative_candidate(b"cpu/online"));
        assert!(is_relative_candidate(b"cpu3/cache/index3/size"));
        assert!(is_relative_candidate(b"self/maps"));
        assert!(!is_relative_candidate(b"/proc/cpuinfo"));
        assert!(!is_relative_candidate(b"meminfo"));
        assert!(!is_relative_candidate(b"cpuinfo/"));
        assert!(!is_relative_candidate(b""));
    }

    #[test]
    fn test_join_relative_classifies_like_absolute() {
        let c = classifier();
        let mut buf = [0u8; 128];
        let joined = join_relative(b"/proc", b"cpuinfo", &mut buf).unwrap();
        assert_eq!(joined, b"/proc/cpuinfo");
        assert_eq!(c.classify(joined), Some(SpoofCategory::CpuInfo));

        let joined = join_relative(b"/sys/devices/system/", b"./cpu/online", &mut buf).unwrap();
        assert_eq!(c.classify(joined), Some(SpoofCategory::CpuOnline));

        let joined = join_relative(b"/", b"proc/self/maps", &mut buf).unwrap();
        assert_eq!(joined, b"/proc/self/maps");
    }

    #[test]
    fn test_join_relative_respects_buffer() {
        let mut buf = [0u8; 13];
        assert_eq!(join_relative(b"/proc", b"cpuinfo", &mut buf), Some(&b"/proc/cpuinfo"[..]));
        let mut small = [0u8; 12];
        assert_eq!(join_relative(b"/proc", b"cpuinfo", &mut small), None);
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal(b"0"), Some(0));
        assert_eq!(parse_decimal(b"0042"), Some(42));
        assert_eq!(parse_decimal(b""), None);
        assert_eq!(parse_decimal(b"4x"), None);
        assert_eq!(parse_decimal(b"99999999999999999999999"), None);
    }
}
