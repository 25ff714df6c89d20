//! # hwspoof-config
//!
//! Toggle configuration for hwspoof.
//!
//! The inception layer resolves its toggles once, from the process
//! environment, through [`SpoofConfig::from_lookup`]. The launcher layers:
//! 1. Built-in defaults
//! 2. `<config dir>/hwspoof/profile.toml` (global)
//! 3. `.hwspoof/profile.toml` (project-local, overrides global)
//! 4. Environment variables (highest priority)

pub mod logging;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Variable the dynamic loader reads to preload the inception layer.
pub const INJECTION_VAR: &str = "LD_PRELOAD";

pub const ENV_CPU: &str = "SPOOF_CPU";
pub const ENV_PCIE: &str = "SPOOF_PCIE";
pub const ENV_DDR: &str = "SPOOF_DDR";
pub const ENV_TOPOLOGY: &str = "SPOOF_TOPOLOGY";
pub const ENV_CLOAK: &str = "SPOOF_CLOAK";
pub const ENV_LOG: &str = "SPOOF_LOG";

/// Every configuration variable, in the order they are exported to children.
pub const CONFIG_VARS: [&str; 6] = [ENV_CPU, ENV_PCIE, ENV_DDR, ENV_TOPOLOGY, ENV_CLOAK, ENV_LOG];

/// Variables hidden from the instrumented program: the injection variable
/// followed by every configuration variable.
pub const SCRUBBED_VARS: [&str; 7] = [
    INJECTION_VAR,
    ENV_CPU,
    ENV_PCIE,
    ENV_DDR,
    ENV_TOPOLOGY,
    ENV_CLOAK,
    ENV_LOG,
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Resolved toggle set. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpoofConfig {
    /// Serve a synthetic `/proc/cpuinfo`
    pub cpu: bool,
    /// Serve synthetic link speeds for the designated PCIe device
    pub pcie: bool,
    /// Serve a synthetic SMBIOS memory table and entry point
    pub ddr: bool,
    /// Serve synthetic online/present masks, L3 size and topology listing
    pub topology: bool,
    /// Hide the library from the environment, maps and environ
    pub cloak: bool,
    /// Write one diagnostic line per interception event to stderr
    pub log: bool,
}

impl Default for SpoofConfig {
    fn default() -> Self {
        Self {
            cpu: true,
            pcie: true,
            ddr: true,
            topology: true,
            cloak: true,
            log: false,
        }
    }
}

/// Partial profile as read from a TOML file. Absent keys leave the
/// lower layer untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileOverrides {
    pub cpu: Option<bool>,
    pub pcie: Option<bool>,
    pub ddr: Option<bool>,
    pub topology: Option<bool>,
    pub cloak: Option<bool>,
    pub log: Option<bool>,
}

/// Parse a toggle value.
///
/// Integers enable when non-zero; `true/yes/on` and `false/no/off` are
/// accepted case-insensitively. Anything else is rejected so the caller
/// keeps its default.
pub fn parse_toggle(raw: &str) -> Option<bool> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        return Some(n != 0);
    }
    const TRUE: [&str; 3] = ["true", "yes", "on"];
    const FALSE: [&str; 3] = ["false", "no", "off"];
    if TRUE.iter().any(|t| raw.eq_ignore_ascii_case(t)) {
        Some(true)
    } else if FALSE.iter().any(|f| raw.eq_ignore_ascii_case(f)) {
        Some(false)
    } else {
        None
    }
}

impl SpoofConfig {
    /// Load config from the standard profile locations plus environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = SpoofConfig::default();

        if let Some(global_path) = Self::global_profile_path() {
            if global_path.exists() {
                debug!("Loading global profile from {:?}", global_path);
                config.merge(Self::read_profile(&global_path)?);
            }
        }

        let project_path = Path::new(".hwspoof/profile.toml");
        if project_path.exists() {
            debug!("Loading project profile from {:?}", project_path);
            config.merge(Self::read_profile(project_path)?);
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults, then the given profile file, then environment overrides.
    pub fn load_profile(path: &Path) -> Result<Self, ConfigError> {
        let mut config = SpoofConfig::default();
        config.merge(Self::read_profile(path)?);
        config.apply_env_overrides();
        Ok(config)
    }

    /// Global profile path: `<config dir>/hwspoof/profile.toml`
    pub fn global_profile_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("hwspoof/profile.toml"))
    }

    /// Resolve from the process environment only.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve from an arbitrary variable lookup on top of the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut config = SpoofConfig::default();
        config.apply_lookup(lookup);
        config
    }

    /// Apply profile values that are present.
    pub fn merge(&mut self, profile: ProfileOverrides) {
        if let Some(v) = profile.cpu {
            self.cpu = v;
        }
        if let Some(v) = profile.pcie {
            self.pcie = v;
        }
        if let Some(v) = profile.ddr {
            self.ddr = v;
        }
        if let Some(v) = profile.topology {
            self.topology = v;
        }
        if let Some(v) = profile.cloak {
            self.cloak = v;
        }
        if let Some(v) = profile.log {
            self.log = v;
        }
    }

    /// Variable assignments that reproduce this config in a child process.
    pub fn to_env_pairs(&self) -> [(&'static str, &'static str); 6] {
        let flag = |on: bool| if on { "1" } else { "0" };
        [
            (ENV_CPU, flag(self.cpu)),
            (ENV_PCIE, flag(self.pcie)),
            (ENV_DDR, flag(self.ddr)),
            (ENV_TOPOLOGY, flag(self.topology)),
            (ENV_CLOAK, flag(self.cloak)),
            (ENV_LOG, flag(self.log)),
        ]
    }

    /// Render the config as a TOML profile.
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    fn read_profile(path: &Path) -> Result<ProfileOverrides, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_lookup(|key| std::env::var(key).ok());
    }

    fn apply_lookup<F>(&mut self, mut lookup: F)
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut set = |key: &str, slot: &mut bool| {
            if let Some(v) = lookup(key).as_deref().and_then(parse_toggle) {
                *slot = v;
            }
        };
        set(ENV_CPU, &mut self.cpu);
        set(ENV_PCIE, &mut self.pcie);
        set(ENV_DDR, &mut self.ddr);
        set(ENV_TOPOLOGY, &mut self.topology);
        set(ENV_CLOAK, &mut self.cloak);
        set(ENV_LOG, &mut self.log);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl FnMut(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = SpoofConfig::default();
        assert!(config.cpu);
        assert!(config.pcie);
        assert!(config.ddr);
        assert!(config.topology);
        assert!(config.cloak);
        assert!(!config.log);
    }

    #[test]
    fn test_parse_toggle_integers() {
        assert_eq!(parse_toggle("0"), Some(false));
        assert_eq!(parse_toggle("1"), Some(true));
        assert_eq!(parse_toggle("42"), Some(true));
        assert_eq!(parse_toggle(" -1 "), Some(true));
    }

    #[test]
    fn test_parse_toggle_words() {
        assert_eq!(parse_toggle("TRUE"), Some(true));
        assert_eq!(parse_toggle("yes"), Some(true));
        assert_eq!(parse_toggle("On"), Some(true));
        assert_eq!(parse_toggle("false"), Some(false));
        assert_eq!(parse_toggle("NO"), Some(false));
        assert_eq!(parse_toggle("off"), Some(false));
        assert_eq!(parse_toggle("maybe"), None);
        assert_eq!(parse_toggle(""), None);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = SpoofConfig::from_lookup(lookup_from(&[
            (ENV_CPU, "0"),
            (ENV_LOG, "1"),
            (ENV_DDR, "garbage"),
        ]));
        assert!(!config.cpu);
        assert!(config.log);
        // Unparseable values keep the default
        assert!(config.ddr);
        assert!(config.pcie);
    }

    #[test]
    fn test_merge_only_present_keys() {
        let mut config = SpoofConfig::default();
        config.merge(ProfileOverrides {
            pcie: Some(false),
            ..Default::default()
        });
        assert!(!config.pcie);
        assert!(config.cpu);
        assert!(config.cloak);
    }

    #[test]
    fn test_env_pairs_round_trip() {
        let config = SpoofConfig {
            cpu: false,
            log: true,
            ..Default::default()
        };
        let pairs = config.to_env_pairs();
        let restored = SpoofConfig::from_lookup(lookup_from(&pairs));
        assert_eq!(restored, config);
    }

    #[test]
    fn test_scrubbed_vars_cover_config_vars() {
        assert_eq!(SCRUBBED_VARS[0], INJECTION_VAR);
        for var in CONFIG_VARS {
            assert!(SCRUBBED_VARS.contains(&var));
        }
    }

    #[test]
    fn test_to_toml_parses_back() {
        let config = SpoofConfig {
            topology: false,
            ..Default::default()
        };
        let parsed: SpoofConfig = toml::from_str(&config.to_toml()).unwrap();
        assert_eq!(parsed, config);
    }
}
