//! `hwspoof preview`: render payloads without preloading anything.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use clap::ValueEnum;

use hwspoof_config::log_cli_info;
use hwspoof_core::{GeneratedContent, SpoofCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PreviewTarget {
    /// /proc/cpuinfo
    Cpuinfo,
    /// SMBIOS memory table (hex dump)
    Dmi,
    /// SMBIOS entry point (hex dump)
    EntryPoint,
    /// CPU online/present mask
    Online,
    /// Per-core L3 cache size
    Cache,
    /// PCIe link speed
    Pcie,
}

impl PreviewTarget {
    pub fn category(self) -> SpoofCategory {
        match self {
            PreviewTarget::Cpuinfo => SpoofCategory::CpuInfo,
            PreviewTarget::Dmi => SpoofCategory::DmiTable,
            PreviewTarget::EntryPoint => SpoofCategory::DmiEntryPoint,
            PreviewTarget::Online => SpoofCategory::CpuOnline,
            PreviewTarget::Cache => SpoofCategory::CacheSize,
            PreviewTarget::Pcie => SpoofCategory::PcieMaxLinkSpeed,
        }
    }

    fn is_binary(self) -> bool {
        matches!(self, PreviewTarget::Dmi | PreviewTarget::EntryPoint)
    }
}

/// The bytes a spoofed process would read for `target`.
pub fn render(target: PreviewTarget, seed: u32) -> Vec<u8> {
    let content = GeneratedContent::default_machine(seed);
    let payload = content
        .payload(target.category())
        .map(|p| p.to_vec())
        .unwrap_or_default();
    if target.is_binary() {
        hex_dump(&payload).into_bytes()
    } else {
        payload
    }
}

pub fn cmd_preview(target: PreviewTarget, seed: u32) -> Result<()> {
    let rendered = render(target, seed);
    log_cli_info!(
        "Rendered preview",
        category = target.category().name(),
        bytes = rendered.len()
    );
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(&rendered)
        .and_then(|_| stdout.flush())
        .context("Failed to write preview")
}

/// `offset  hex bytes  |ascii|`, 16 bytes per line.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 4 + 16);
    for (line, chunk) in bytes.chunks(16).enumerate() {
        let _ = write!(out, "{:08x}  ", line * 16);
        for i in 0..16 {
            match chunk.get(i) {
                Some(b) => {
                    let _ = write!(out, "{:02x} ", b);
                }
                None => out.push_str("   "),
            }
            if i == 7 {
                out.push(' ');
            }
        }
        out.push_str(" |");
        for &b in chunk {
            out.push(if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            });
        }
        out.push_str("|\n");
    }
    out
}
