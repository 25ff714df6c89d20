//! Synthetic `/proc/cpuinfo`.

use std::fmt;

use crate::buffer::{BoundedBuf, SharedBuffer};
use crate::error::GenerateError;

pub const CPUINFO_CAPACITY: usize = 32 * 1024;

/// Zen 1 feature flags as reported by Linux.
pub const ZEN1_FLAGS: &str = "fpu vme de pse tsc msr pae mce cx8 apic sep mtrr pge mca cmov pat \
pse36 clflush mmx fxsr sse sse2 ht syscall nx mmxext fxsr_opt pdpe1gb rdtscp lm constant_tsc \
rep_good nopl nonstop_tsc cpuid extd_apicid aperfmperf rapl pni pclmulqdq monitor ssse3 fma cx16 \
sse4_1 sse4_2 movbe popcnt aes xsave avx f16c rdrand lahf_lm cmp_legacy svm extapic cr8_legacy \
abm sse4a misalignsse 3dnowprefetch osvw skinit wdt tce topoext perfctr_core perfctr_nb bpext \
perfctr_llc mwaitx cpb hw_pstate ssbd ibpb vmmcall fsgsbase bmi1 avx2 smep bmi2 rdseed adx smap \
clflushopt sha xsaveopt xsavec xgetbv1 clzero irperf xsaveerptr arat npt lbrv svm_lock nrip_save \
tsc_scale vmcb_clean flushbyasid decodeassists pausefilter pfthreshold avic v_vmsave_vmload vgif";

pub const ZEN1_BUGS: &str = "sysret_ss_attrs spectre_v1 spectre_v2 spec_store_bypass";

/// Static identity of the simulated processor.
#[derive(Debug, Clone, Copy)]
pub struct CpuProfile {
    pub vendor_id: &'static str,
    pub model_name: &'static str,
    pub family: u32,
    pub model: u32,
    pub stepping: u32,
    pub microcode: &'static str,
    /// Physical cores; every core runs two hardware threads.
    pub physical_cores: u32,
    pub cache_size_kb: u32,
    pub l3_size_kb: u32,
    pub bogomips: &'static str,
    pub cpuid_level: u32,
    pub flags: &'static str,
    pub bugs: &'static str,
    /// Clock floor and span, in tenths of MHz.
    pub mhz_floor_tenths: u32,
    pub mhz_span_tenths: u32,
}

pub const THREADRIPPER_1900X: CpuProfile = CpuProfile {
    vendor_id: "AuthenticAMD",
    model_name: "AMD Ryzen Threadripper 1900X 8-Core Processor",
    family: 23,
    model: 1,
    stepping: 1,
    microcode: "0x08001137",
    physical_cores: 8,
    cache_size_kb: 512,
    l3_size_kb: 4096,
    bogomips: "7186.36",
    cpuid_level: 13,
    flags: ZEN1_FLAGS,
    bugs: ZEN1_BUGS,
    mhz_floor_tenths: 22_000,
    mhz_span_tenths: 16_000,
};

impl CpuProfile {
    /// Logical processor count (2-way SMT).
    pub const fn threads(&self) -> u32 {
        self.physical_cores * 2
    }

    /// Placement of logical processor `index`.
    pub fn logical_cpu(&self, index: u32) -> LogicalCpu {
        let (core_id, thread) = if index < self.physical_cores {
            (index, 0)
        } else {
            (index - self.physical_cores, 1)
        };
        LogicalCpu {
            index,
            core_id,
            thread,
            apic_id: core_id * 2 + thread,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalCpu {
    pub index: u32,
    pub core_id: u32,
    /// SMT sibling number, 0 or 1.
    pub thread: u32,
    pub apic_id: u32,
}

/// Classic ANSI C linear congruential generator.
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u32,
}

impl Lcg {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Next 15-bit output.
    pub fn next_output(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        (self.state >> 16) & 0x7FFF
    }
}

/// Clock frequency in tenths of MHz. Displays with three decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClockMhz(pub u32);

impl ClockMhz {
    pub fn draw(profile: &CpuProfile, rng: &mut Lcg) -> Self {
        ClockMhz(profile.mhz_floor_tenths + rng.next_output() % profile.mhz_span_tenths)
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / 10.0
    }
}

impl fmt::Display for ClockMhz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}00", self.0 / 10, self.0 % 10)
    }
}

/// Render one record per logical processor, drawing clocks from `rng`.
pub fn generate_cpuinfo(profile: &CpuProfile, rng: &mut Lcg) -> Result<SharedBuffer, GenerateError> {
    let mut buf = BoundedBuf::new(CPUINFO_CAPACITY);
    for index in 0..profile.threads() {
        let cpu = profile.logical_cpu(index);
        let mhz = ClockMhz::draw(profile, rng);
        write_record(&mut buf, profile, &cpu, mhz)?;
    }
    Ok(buf.into_shared())
}

fn write_record(
    buf: &mut BoundedBuf,
    p: &CpuProfile,
    cpu: &LogicalCpu,
    mhz: ClockMhz,
) -> Result<(), GenerateError> {
    buf.format(format_args!(
        "processor\t: {}\n\
         vendor_id\t: {}\n\
         cpu family\t: {}\n\
         model\t\t: {}\n\
         model name\t: {}\n\
         stepping\t: {}\n\
         microcode\t: {}\n\
         cpu MHz\t\t: {}\n\
         cache size\t: {} KB\n\
         physical id\t: 0\n\
         siblings\t: {}\n\
         core id\t\t: {}\n\
         cpu cores\t: {}\n\
         apicid\t\t: {}\n\
         initial apicid\t: {}\n",
        cpu.index,
        p.vendor_id,
        p.family,
        p.model,
        p.model_name,
        p.stepping,
        p.microcode,
        mhz,
        p.cache_size_kb,
        p.threads(),
        cpu.core_id,
        p.physical_cores,
        cpu.apic_id,
        cpu.apic_id,
    ))?;
    buf.format(format_args!(
        "fpu\t\t: yes\n\
         fpu_exception\t: yes\n\
         cpuid level\t: {}\n\
         wp\t\t: yes\n\
         flags\t\t: {}\n\
         bugs\t\t: {}\n\
         bogomips\t: {}\n\
         TLB size\t: 2560 4K pages\n\
         clflush size\t: 64\n\
         cache_alignment\t: 64\n\
         address sizes\t: 48 bits physical, 48 bits virtual\n\
         power management: ts ttp tm hwpstate cpb eff_freq_ro [13] [14]\n\
         \n",
        p.cpuid_level, p.flags, p.bugs, p.bogomips,
    ))
}
