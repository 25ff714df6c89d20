//! Filters that remove this library's fingerprint from introspection
//! resources and directory listings.

pub mod environ;
pub mod inject;
pub mod maps;
pub mod topology;

pub use environ::filter_environ;
pub use inject::{collect_missing, fill_slots, EnvPlan, STACK_ENV_SLOTS};
pub use maps::filter_maps;
pub use topology::{cpu_entry_name, EntryVerdict, TopologyCursor};

/// Ceiling for a filtered `/proc/self/{maps,environ}` snapshot.
pub const SNAPSHOT_CAPACITY: usize = 4 * 1024 * 1024;
