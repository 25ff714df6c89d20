use hwspoof_config::SpoofConfig;

/// Every resource kind the inception layer virtualizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpoofCategory {
    /// `/proc/cpuinfo`
    CpuInfo,
    /// `/sys/devices/system/cpu/cpu<N>/cache/index3/size`
    CacheSize,
    /// `/sys/devices/system/cpu/online`
    CpuOnline,
    /// `/sys/devices/system/cpu/present`
    CpuPresent,
    /// `max_link_speed` of the designated PCIe device
    PcieMaxLinkSpeed,
    /// `current_link_speed` of the designated PCIe device
    PcieCurrentLinkSpeed,
    /// `/sys/firmware/dmi/tables/DMI`
    DmiTable,
    /// `/sys/firmware/dmi/tables/smbios_entry_point`
    DmiEntryPoint,
    /// `/proc/self/maps`
    SelfMaps,
    /// `/proc/self/environ`
    SelfEnviron,
    /// `/sys/devices/system/cpu` when opened as a directory stream
    CpuTopologyDir,
}

impl SpoofCategory {
    pub const ALL: [SpoofCategory; 11] = [
        SpoofCategory::CpuInfo,
        SpoofCategory::CacheSize,
        SpoofCategory::CpuOnline,
        SpoofCategory::CpuPresent,
        SpoofCategory::PcieMaxLinkSpeed,
        SpoofCategory::PcieCurrentLinkSpeed,
        SpoofCategory::DmiTable,
        SpoofCategory::DmiEntryPoint,
        SpoofCategory::SelfMaps,
        SpoofCategory::SelfEnviron,
        SpoofCategory::CpuTopologyDir,
    ];

    /// Whether the toggle governing this category is on.
    pub fn is_enabled(self, config: &SpoofConfig) -> bool {
        match self {
            SpoofCategory::CpuInfo => config.cpu,
            SpoofCategory::CacheSize
            | SpoofCategory::CpuOnline
            | SpoofCategory::CpuPresent
            | SpoofCategory::CpuTopologyDir => config.topology,
            SpoofCategory::PcieMaxLinkSpeed | SpoofCategory::PcieCurrentLinkSpeed => config.pcie,
            SpoofCategory::DmiTable | SpoofCategory::DmiEntryPoint => config.ddr,
            SpoofCategory::SelfMaps | SpoofCategory::SelfEnviron => config.cloak,
        }
    }

    /// Served through the directory overlay rather than the descriptor table.
    pub fn is_directory(self) -> bool {
        matches!(self, SpoofCategory::CpuTopologyDir)
    }

    /// Regenerated from the genuine resource on every open.
    pub fn is_snapshot(self) -> bool {
        matches!(self, SpoofCategory::SelfMaps | SpoofCategory::SelfEnviron)
    }

    pub fn name(self) -> &'static str {
        match self {
            SpoofCategory::CpuInfo => "cpuinfo",
            SpoofCategory::CacheSize => "cache-size",
            SpoofCategory::CpuOnline => "cpu-online",
            SpoofCategory::CpuPresent => "cpu-present",
            SpoofCategory::PcieMaxLinkSpeed => "pcie-max-speed",
            SpoofCategory::PcieCurrentLinkSpeed => "pcie-current-speed",
            SpoofCategory::DmiTable => "dmi-table",
            SpoofCategory::DmiEntryPoint => "dmi-entry-point",
            SpoofCategory::SelfMaps => "self-maps",
            SpoofCategory::SelfEnviron => "self-environ",
            SpoofCategory::CpuTopologyDir => "cpu-topology",
        }
    }
}

impl std::fmt::Display for SpoofCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
