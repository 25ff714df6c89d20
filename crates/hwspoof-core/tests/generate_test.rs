//! Properties of the generated payloads.

use hwspoof_core::cloak::{filter_environ, filter_maps, SNAPSHOT_CAPACITY};
use hwspoof_core::generate::dmi::{self, walk_structures, TYPE_END_OF_TABLE, TYPE_MEMORY_DEVICE};
use hwspoof_core::generate::{GeneratedContent, THREADRIPPER_1900X};
use hwspoof_config::SCRUBBED_VARS;

fn records(cpuinfo: &str) -> Vec<Vec<(&str, &str)>> {
    cpuinfo
        .split("\n\n")
        .filter(|r| !r.is_empty())
        .map(|r| {
            r.lines()
                .map(|l| {
                    let (k, v) = l.split_once(':').expect("field separator");
                    (k.trim_end(), v.trim_start())
                })
                .collect()
        })
        .collect()
}

fn field<'a>(record: &[(&str, &'a str)], name: &str) -> &'a str {
    record
        .iter()
        .find(|(k, _)| *k == name)
        .map(|(_, v)| *v)
        .unwrap_or_else(|| panic!("missing field {name}"))
}

#[test]
fn test_cpuinfo_topology() {
    let content = GeneratedContent::default_machine(std::process::id());
    let text = std::str::from_utf8(&content.cpuinfo).unwrap();
    let records = records(text);
    assert_eq!(records.len(), 16);

    for (i, record) in records.iter().enumerate() {
        let apic: usize = field(record, "apicid").parse().unwrap();
        let expected = if i < 8 { 2 * i } else { 2 * (i - 8) + 1 };
        assert_eq!(apic, expected, "processor {i}");
        assert_eq!(field(record, "initial apicid"), field(record, "apicid"));
        assert_eq!(field(record, "processor"), i.to_string());
        assert_eq!(field(record, "core id"), (i % 8).to_string());
        assert_eq!(field(record, "siblings"), "16");
        assert_eq!(field(record, "cpu cores"), "8");
        assert_eq!(field(record, "model name"), THREADRIPPER_1900X.model_name);
        assert_eq!(field(record, "cpu family"), "23");
    }
}

#[test]
fn test_cpuinfo_clock_range() {
    for seed in [0u32, 1, 2, 1000, 65535, u32::MAX] {
        let content = GeneratedContent::default_machine(seed);
        let text = std::str::from_utf8(&content.cpuinfo).unwrap();
        for record in records(text) {
            let raw = field(&record, "cpu MHz");
            let (_, decimals) = raw.split_once('.').unwrap();
            assert_eq!(decimals.len(), 3, "{raw}");
            let mhz: f64 = raw.parse().unwrap();
            assert!((2200.0..3800.0).contains(&mhz), "{mhz}");
        }
    }
}

#[test]
fn test_cpuinfo_field_order() {
    let content = GeneratedContent::default_machine(5);
    let text = std::str::from_utf8(&content.cpuinfo).unwrap();
    let all = records(text);
    let first = &all[0];
    let names: Vec<&str> = first.iter().map(|(k, _)| *k).collect();
    assert_eq!(
        names,
        [
            "processor",
            "vendor_id",
            "cpu family",
            "model",
            "model name",
            "stepping",
            "microcode",
            "cpu MHz",
            "cache size",
            "physical id",
            "siblings",
            "core id",
            "cpu cores",
            "apicid",
            "initial apicid",
            "fpu",
            "fpu_exception",
            "cpuid level",
            "wp",
            "flags",
            "bugs",
            "bogomips",
            "TLB size",
            "clflush size",
            "cache_alignment",
            "address sizes",
            "power management",
        ]
    );
}

#[test]
fn test_dmi_size_matches_entry_point() {
    let content = GeneratedContent::default_machine(1);
    let ep = &content.dmi_entry_point;
    assert_eq!(ep.len(), 24);
    assert_eq!(&ep[..5], b"_SM3_");
    let declared = u32::from_le_bytes([ep[12], ep[13], ep[14], ep[15]]);
    assert_eq!(declared as usize, content.dmi_table.len());
    let sum = ep.iter().fold(0u8, |a, b| a.wrapping_add(*b));
    assert_eq!(sum, 0);
    assert_eq!(dmi::checksum(ep), ep[5]);
}

#[test]
fn test_dmi_single_end_marker_after_devices() {
    let content = GeneratedContent::default_machine(1);
    let structures = walk_structures(&content.dmi_table);
    let types: Vec<u8> = structures.iter().map(|(t, _, _)| *t).collect();
    assert_eq!(types, vec![TYPE_MEMORY_DEVICE, TYPE_MEMORY_DEVICE, TYPE_END_OF_TABLE]);
    assert_eq!(content.dmi_table.len(), 2 * (84 + 62) + 6);
    assert!(content.dmi_table.ends_with(&[TYPE_END_OF_TABLE, 4, 0xFF, 0xFF, 0, 0]));
}

#[test]
fn test_maps_filter_removes_library() {
    let maps = b"00400000-00401000 r-xp 00000000 08:01 1 /bin/true\n\
7f00-7f01 r-xp 00000000 08:01 2 /tmp/build/libhwspoof_inception_layer.so\n";
    let out = filter_maps(maps, b"libhwspoof_inception_layer.so", SNAPSHOT_CAPACITY).unwrap();
    assert!(!out
        .windows(b"libhwspoof".len())
        .any(|w| w == b"libhwspoof"));
    assert!(out.starts_with(b"00400000"));
}

#[test]
fn test_environ_filter_preserves_other_records() {
    let env = b"A=1\0LD_PRELOAD=/x.so\0B= spaced =\0SPOOF_TOPOLOGY=0\0C=\0";
    let out = filter_environ(env, &SCRUBBED_VARS, SNAPSHOT_CAPACITY).unwrap();
    assert_eq!(&out[..], b"A=1\0B= spaced =\0C=\0");
}
