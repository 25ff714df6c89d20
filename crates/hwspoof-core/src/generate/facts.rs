//! One-line sysfs attributes.

use crate::buffer::{BoundedBuf, SharedBuffer};
use crate::error::GenerateError;
use crate::generate::cpuinfo::CpuProfile;

pub const FACT_CAPACITY: usize = 64;

pub const PCIE_LINK_SPEED: &str = "32.0 GT/s PCIe";

/// `max_link_speed` / `current_link_speed`
pub fn pcie_link_speed() -> Result<SharedBuffer, GenerateError> {
    line(format_args!("{PCIE_LINK_SPEED}"))
}

/// `online` / `present`: every logical processor, as a kernel cpu list.
pub fn cpu_mask(profile: &CpuProfile) -> Result<SharedBuffer, GenerateError> {
    match profile.threads() {
        0 => line(format_args!("")),
        n => line(format_args!("0-{}", n - 1)),
    }
}

/// `cache/index3/size`
pub fn l3_cache_size(profile: &CpuProfile) -> Result<SharedBuffer, GenerateError> {
    line(format_args!("{}K", profile.l3_size_kb))
}

fn line(args: std::fmt::Arguments<'_>) -> Result<SharedBuffer, GenerateError> {
    let mut buf = BoundedBuf::new(FACT_CAPACITY);
    buf.format(args)?;
    buf.push(b'\n')?;
    Ok(buf.into_shared())
}
