//! Integration tests for hwspoof-config
//!
//! These tests verify profile loading with real file system operations.

use hwspoof_config::{ProfileOverrides, SpoofConfig, CONFIG_VARS};
use tempfile::tempdir;

fn clear_spoof_env() {
    for var in CONFIG_VARS {
        std::env::remove_var(var);
    }
}

/// Test loading a partial profile from a real file
#[test]
fn test_load_profile_from_file() {
    clear_spoof_env();
    let temp = tempdir().unwrap();
    let path = temp.path().join("profile.toml");
    std::fs::write(
        &path,
        r#"
cpu = false
log = true
"#,
    )
    .unwrap();

    let config = SpoofConfig::load_profile(&path).unwrap();
    assert!(!config.cpu);
    assert!(config.log);
    assert!(config.pcie);
    assert!(config.ddr);
    assert!(config.topology);
    assert!(config.cloak);
}

/// Test profile hierarchy: project values override global ones key by key
#[test]
fn test_profile_hierarchy_project_overrides_global() {
    let temp = tempdir().unwrap();

    let global_path = temp.path().join("global.toml");
    std::fs::write(&global_path, "pcie = false\nddr = false\n").unwrap();
    let project_path = temp.path().join("project.toml");
    std::fs::write(&project_path, "ddr = true\n").unwrap();

    let global: ProfileOverrides =
        toml::from_str(&std::fs::read_to_string(&global_path).unwrap()).unwrap();
    let project: ProfileOverrides =
        toml::from_str(&std::fs::read_to_string(&project_path).unwrap()).unwrap();

    let mut config = SpoofConfig::default();
    config.merge(global);
    config.merge(project);

    assert!(!config.pcie, "global value survives when project is silent");
    assert!(config.ddr, "project value wins");
}

/// Test that a malformed profile reports a TOML error
#[test]
fn test_invalid_profile_is_an_error() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("profile.toml");
    std::fs::write(&path, "cpu = \"not a bool\"").unwrap();

    let err = SpoofConfig::load_profile(&path).unwrap_err();
    assert!(err.to_string().contains("TOML parse error"));
}

/// Test that a missing profile reports an IO error
#[test]
fn test_missing_profile_is_an_error() {
    let temp = tempdir().unwrap();
    let err = SpoofConfig::load_profile(&temp.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, hwspoof_config::ConfigError::Io(_)));
}

/// Test that the rendered default profile is loadable
#[test]
fn test_default_profile_round_trip() {
    clear_spoof_env();
    let temp = tempdir().unwrap();
    let path = temp.path().join("profile.toml");
    std::fs::write(&path, SpoofConfig::default().to_toml()).unwrap();

    let config = SpoofConfig::load_profile(&path).unwrap();
    assert_eq!(config, SpoofConfig::default());
}
