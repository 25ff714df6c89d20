//! Synthetic SMBIOS memory table (`/sys/firmware/dmi/tables/DMI`) and its
//! 64-bit entry point (`smbios_entry_point`).
//!
//! The table carries one Type 17 (Memory Device) structure per module and a
//! Type 127 end-of-table marker. The entry point is derived from the emitted
//! table, so its size field and checksum always describe the real bytes.

use crate::buffer::{BoundedBuf, SharedBuffer};
use crate::error::GenerateError;

pub const DMI_TABLE_CAPACITY: usize = 4096;
pub const ENTRY_POINT_CAPACITY: usize = 32;

pub const TYPE_MEMORY_DEVICE: u8 = 17;
pub const TYPE_END_OF_TABLE: u8 = 127;

/// Formatted-area length of a SMBIOS 3.3 Type 17 structure.
pub const MEMORY_DEVICE_LEN: u8 = 0x54;
pub const ENTRY_POINT_LEN: u8 = 0x18;

const FORM_FACTOR_DIMM: u8 = 0x09;
const MEMORY_TYPE_DDR5: u8 = 0x22;
const NO_HANDLE: u16 = 0xFFFF;

#[derive(Debug, Clone, Copy)]
pub struct MemoryModule {
    pub handle: u16,
    pub size_mb: u16,
    pub speed_mts: u16,
    pub locator: &'static str,
    pub bank: &'static str,
    pub manufacturer: &'static str,
    pub serial: &'static str,
    pub asset_tag: &'static str,
    pub part_number: &'static str,
}

pub const DEFAULT_MODULES: [MemoryModule; 2] = [
    MemoryModule {
        handle: 0x0040,
        size_mb: 16384,
        speed_mts: 4800,
        locator: "DIMM_A1",
        bank: "BANK 0",
        manufacturer: "Samsung",
        serial: "12345678",
        asset_tag: "AssetTag0",
        part_number: "M425R2GA3BB0-CQKOL",
    },
    MemoryModule {
        handle: 0x0041,
        size_mb: 16384,
        speed_mts: 4800,
        locator: "DIMM_B1",
        bank: "BANK 1",
        manufacturer: "Samsung",
        serial: "12345679",
        asset_tag: "AssetTag1",
        part_number: "M425R2GA3BB0-CQKOL",
    },
];

#[derive(Debug, Clone)]
pub struct DmiTables {
    pub table: SharedBuffer,
    pub entry_point: SharedBuffer,
}

pub fn generate_dmi(modules: &[MemoryModule]) -> Result<DmiTables, GenerateError> {
    let mut table = BoundedBuf::new(DMI_TABLE_CAPACITY);
    for module in modules {
        push_memory_device(&mut table, module)?;
    }
    push_end_of_table(&mut table)?;

    let table_len = u32::try_from(table.len()).map_err(|_| GenerateError::Overflow {
        capacity: DMI_TABLE_CAPACITY,
    })?;
    let mut entry = BoundedBuf::new(ENTRY_POINT_CAPACITY);
    entry.extend(&entry_point(table_len))?;

    Ok(DmiTables {
        table: table.into_shared(),
        entry_point: entry.into_shared(),
    })
}

fn push_memory_device(buf: &mut BoundedBuf, m: &MemoryModule) -> Result<(), GenerateError> {
    let mut area = [0u8; MEMORY_DEVICE_LEN as usize];
    area[0] = TYPE_MEMORY_DEVICE;
    area[1] = MEMORY_DEVICE_LEN;
    area[2..4].copy_from_slice(&m.handle.to_le_bytes());
    area[4..6].copy_from_slice(&NO_HANDLE.to_le_bytes()); // physical memory array
    area[6..8].copy_from_slice(&NO_HANDLE.to_le_bytes()); // error information
    area[8..10].copy_from_slice(&64u16.to_le_bytes()); // total width
    area[10..12].copy_from_slice(&64u16.to_le_bytes()); // data width
    area[12..14].copy_from_slice(&m.size_mb.to_le_bytes());
    area[14] = FORM_FACTOR_DIMM;
    area[15] = 0; // device set
    area[16] = 1; // locator
    area[17] = 2; // bank locator
    area[18] = MEMORY_TYPE_DDR5;
    area[21..23].copy_from_slice(&m.speed_mts.to_le_bytes());
    area[23] = 3; // manufacturer
    area[24] = 4; // serial number
    area[25] = 5; // asset tag
    area[26] = 6; // part number
    area[32..34].copy_from_slice(&m.speed_mts.to_le_bytes()); // configured speed
    buf.extend(&area)?;

    push_strings(
        buf,
        &[
            m.locator,
            m.bank,
            m.manufacturer,
            m.serial,
            m.asset_tag,
            m.part_number,
        ],
    )
}

/// String-set region: each string NUL-terminated, then one more NUL.
fn push_strings(buf: &mut BoundedBuf, strings: &[&str]) -> Result<(), GenerateError> {
    for s in strings {
        buf.extend(s.as_bytes())?;
        buf.push(0)?;
    }
    if strings.is_empty() {
        buf.push(0)?;
    }
    buf.push(0)
}

fn push_end_of_table(buf: &mut BoundedBuf) -> Result<(), GenerateError> {
    buf.extend(&[TYPE_END_OF_TABLE, 4])?;
    buf.extend_u16(NO_HANDLE)?;
    push_strings(buf, &[])
}

/// SMBIOS 3.x (`_SM3_`) entry point for a table of `table_len` bytes.
pub fn entry_point(table_len: u32) -> [u8; ENTRY_POINT_LEN as usize] {
    let mut ep = [0u8; ENTRY_POINT_LEN as usize];
    ep[0..5].copy_from_slice(b"_SM3_");
    ep[6] = ENTRY_POINT_LEN;
    ep[7] = 3; // major
    ep[8] = 3; // minor
    ep[9] = 1; // docrev
    ep[10] = 1; // entry point revision
    ep[12..16].copy_from_slice(&table_len.to_le_bytes());
    // table address (16..24) stays zero: the kernel exports the table itself
    ep[5] = checksum(&ep);
    ep
}

/// Byte that brings the wrapping sum of `bytes` (with the checksum slot at
/// index 5 treated as zero) to 0 mod 256.
pub fn checksum(bytes: &[u8]) -> u8 {
    let sum = bytes
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 5)
        .fold(0u8, |acc, (_, b)| acc.wrapping_add(*b));
    0u8.wrapping_sub(sum)
}

/// Walk the structures of a table, yielding `(type, handle, strings)`.
///
/// Stops at the end-of-table marker or at the first malformed structure.
pub fn walk_structures(table: &[u8]) -> Vec<(u8, u16, Vec<&[u8]>)> {
    let mut out = Vec::new();
    let mut offset = 0usize;
    while offset + 4 <= table.len() {
        let ty = table[offset];
        let len = table[offset + 1] as usize;
        let handle = u16::from_le_bytes([table[offset + 2], table[offset + 3]]);
        if len < 4 || offset + len > table.len() {
            break;
        }
        let strings_start = offset + len;
        let Some(end) = table[strings_start..]
            .windows(2)
            .position(|w| w[0] == 0 && w[1] == 0)
            .map(|p| strings_start + p)
        else {
            break;
        };
        let strings = table[strings_start..end]
            .split(|&b| b == 0)
            .filter(|s| !s.is_empty())
            .collect();
        out.push((ty, handle, strings));
        offset = end + 2;
        if ty == TYPE_END_OF_TABLE {
            break;
        }
    }
    out
}
