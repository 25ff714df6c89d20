//! Synthetic payload generators.
//!
//! [`GeneratedContent`] renders every static payload once. A generator that
//! overflows its capacity yields an empty payload for its categories; the
//! descriptor is still virtualized, so the genuine bytes never leak through.

pub mod cpuinfo;
pub mod dmi;
pub mod facts;

use hwspoof_config::{log_gen_debug, log_gen_warn};

use crate::buffer::{self, SharedBuffer};
use crate::category::SpoofCategory;
use crate::error::GenerateError;

pub use cpuinfo::{CpuProfile, Lcg, THREADRIPPER_1900X};
pub use dmi::{DmiTables, MemoryModule, DEFAULT_MODULES};

/// Every load-time payload, shared read-only by all descriptors.
#[derive(Debug, Clone)]
pub struct GeneratedContent {
    pub profile: CpuProfile,
    pub cpuinfo: SharedBuffer,
    pub dmi_table: SharedBuffer,
    pub dmi_entry_point: SharedBuffer,
    pub pcie_link_speed: SharedBuffer,
    pub cpu_mask: SharedBuffer,
    pub l3_cache_size: SharedBuffer,
}

impl GeneratedContent {
    /// Render all payloads. `seed` drives the clock sequence.
    pub fn build(profile: CpuProfile, modules: &[MemoryModule], seed: u32) -> Self {
        let mut rng = Lcg::new(seed);
        let cpuinfo = or_empty("cpuinfo", cpuinfo::generate_cpuinfo(&profile, &mut rng));
        let (dmi_table, dmi_entry_point) = match dmi::generate_dmi(modules) {
            Ok(tables) => (tables.table, tables.entry_point),
            Err(e) => {
                log_gen_warn!("DMI generation failed", error = tracing::field::display(&e));
                (buffer::empty(), buffer::empty())
            }
        };
        let content = Self {
            profile,
            cpuinfo,
            dmi_table,
            dmi_entry_point,
            pcie_link_speed: or_empty("pcie", facts::pcie_link_speed()),
            cpu_mask: or_empty("cpu-mask", facts::cpu_mask(&profile)),
            l3_cache_size: or_empty("l3", facts::l3_cache_size(&profile)),
        };
        log_gen_debug!(
            "Generated payloads",
            cpuinfo = content.cpuinfo.len(),
            dmi = content.dmi_table.len()
        );
        content
    }

    /// The default simulated machine.
    pub fn default_machine(seed: u32) -> Self {
        Self::build(THREADRIPPER_1900X, &DEFAULT_MODULES, seed)
    }

    /// Static payload for `category`. Snapshot and directory categories
    /// have none; they are produced per open.
    pub fn payload(&self, category: SpoofCategory) -> Option<SharedBuffer> {
        let buf = match category {
            SpoofCategory::CpuInfo => &self.cpuinfo,
            SpoofCategory::CacheSize => &self.l3_cache_size,
            SpoofCategory::CpuOnline | SpoofCategory::CpuPresent => &self.cpu_mask,
            SpoofCategory::PcieMaxLinkSpeed | SpoofCategory::PcieCurrentLinkSpeed => {
                &self.pcie_link_speed
            }
            SpoofCategory::DmiTable => &self.dmi_table,
            SpoofCategory::DmiEntryPoint => &self.dmi_entry_point,
            SpoofCategory::SelfMaps | SpoofCategory::SelfEnviron | SpoofCategory::CpuTopologyDir => {
                return None
            }
        };
        Some(buf.clone())
    }

    pub fn threads(&self) -> u32 {
        self.profile.threads()
    }
}

fn or_empty(what: &str, result: Result<SharedBuffer, GenerateError>) -> SharedBuffer {
    result.unwrap_or_else(|e| {
        log_gen_warn!(
            "Generation failed, serving empty content",
            payload = what,
            error = tracing::field::display(&e)
        );
        buffer::empty()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_file_category_has_payload() {
        let content = GeneratedContent::default_machine(1);
        for category in SpoofCategory::ALL {
            let expected = !(category.is_snapshot() || category.is_directory());
            assert_eq!(content.payload(category).is_some(), expected, "{category}");
        }
    }

    #[test]
    fn test_payloads_share_storage() {
        let content = GeneratedContent::default_machine(1);
        let a = content.payload(SpoofCategory::CpuOnline).unwrap();
        let b = content.payload(SpoofCategory::CpuPresent).unwrap();
        assert!(std::sync::Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_overflowing_profile_serves_empty() {
        let huge = CpuProfile {
            physical_cores: 64,
            ..THREADRIPPER_1900X
        };
        let content = GeneratedContent::build(huge, &DEFAULT_MODULES, 1);
        assert!(content.cpuinfo.is_empty());
        assert_eq!(&*content.cpu_mask, b"0-127\n");
    }
}
