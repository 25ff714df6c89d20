//! `hwspoof run`: replace this process with the target program, preloaded.

use std::ffi::{CString, OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use hwspoof_config::{
    log_cli_debug, log_cli_error, log_cli_info, log_cli_warn, SpoofConfig, CONFIG_VARS, INJECTION_VAR,
};

const LIBRARY_FILE: &str = "libhwspoof_inception_layer.so";

pub fn cmd_run(config: &SpoofConfig, library: Option<PathBuf>, command: &[String]) -> Result<()> {
    if command.is_empty() {
        anyhow::bail!("No command specified");
    }
    let library = match library {
        Some(path) if path.exists() => path,
        Some(path) => anyhow::bail!("Inception layer not found at {}", path.display()),
        None => find_inception_library()?,
    };
    let library = std::fs::canonicalize(&library)
        .with_context(|| format!("Failed to resolve {}", library.display()))?;

    let env = child_environment(std::env::vars_os(), config, &library);
    log_cli_info!(
        "Launching under inception layer",
        program = command[0].as_str(),
        library = tracing::field::display(library.display())
    );

    let program = CString::new(command[0].as_bytes()).context("Command contains a NUL byte")?;
    let args = command
        .iter()
        .map(|a| CString::new(a.as_bytes()))
        .collect::<Result<Vec<_>, _>>()
        .context("Argument contains a NUL byte")?;
    let env = env
        .iter()
        .map(|e| CString::new(e.as_bytes()))
        .collect::<Result<Vec<_>, _>>()
        .context("Environment contains a NUL byte")?;

    match nix::unistd::execvpe(&program, &args, &env) {
        Ok(never) => match never {},
        Err(errno) => {
            log_cli_error!("exec failed", errno = tracing::field::display(errno));
            Err(errno).with_context(|| format!("Failed to execute: {}", command[0]))
        }
    }
}

/// `KEY=VALUE` entries for the child: the current environment minus any
/// inherited configuration, then the resolved toggles and the preload
/// entry with our library first.
pub fn child_environment<I>(inherited: I, config: &SpoofConfig, library: &Path) -> Vec<OsString>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut preload = library.as_os_str().to_os_string();
    let mut env = Vec::new();
    for (key, value) in inherited {
        if key.as_os_str() == OsStr::new(INJECTION_VAR) {
            if !value.is_empty() {
                log_cli_warn!(
                    "Keeping inherited preload entries after the inception layer",
                    inherited = tracing::field::debug(&value)
                );
                preload.push(":");
                preload.push(&value);
            }
            continue;
        }
        if CONFIG_VARS.iter().any(|v| key.as_os_str() == OsStr::new(v)) {
            continue;
        }
        env.push(assignment(&key, &value));
    }
    for (key, value) in config.to_env_pairs() {
        env.push(assignment(OsStr::new(key), OsStr::new(value)));
    }
    log_cli_debug!("Preload list", value = tracing::field::debug(&preload));
    env.push(assignment(OsStr::new(INJECTION_VAR), &preload));
    env
}

fn assignment(key: &OsStr, value: &OsStr) -> OsString {
    let mut entry = OsString::with_capacity(key.len() + 1 + value.len());
    entry.push(key);
    entry.push("=");
    entry.push(value);
    entry
}

/// Locate the shared object next to this executable, in a release build
/// tree, or in the installed location.
pub fn find_inception_library() -> Result<PathBuf> {
    let candidates = [
        // Development: relative to cargo target
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.join(LIBRARY_FILE))),
        // Also check target/release relative to CWD if not in EXE dir
        Some(PathBuf::from("target/release").join(LIBRARY_FILE)),
        // Installed location (standard Linux/FHS)
        Some(PathBuf::from("/usr/local/lib/hwspoof").join(LIBRARY_FILE)),
    ];

    for candidate in candidates.into_iter().flatten() {
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    anyhow::bail!(
        "Could not find the hwspoof inception layer.\n\
        Build with: cargo build -p hwspoof-inception-layer --release\n\
        Expected at: target/release/{}",
        LIBRARY_FILE
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(env: &[OsString]) -> Vec<String> {
        env.iter().map(|e| e.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_child_environment_sets_toggles_and_preload() {
        let config = SpoofConfig {
            ddr: false,
            ..SpoofConfig::default()
        };
        let inherited = vec![
            (OsString::from("HOME"), OsString::from("/root")),
            (OsString::from("SPOOF_DDR"), OsString::from("1")),
        ];
        let env = entries(&child_environment(inherited, &config, Path::new("/opt/libx.so")));
        assert_eq!(env[0], "HOME=/root");
        assert!(env.contains(&"SPOOF_DDR=0".to_string()));
        assert_eq!(env.iter().filter(|e| e.starts_with("SPOOF_DDR=")).count(), 1);
        assert_eq!(env.last().unwrap(), "LD_PRELOAD=/opt/libx.so");
    }

    #[test]
    fn test_existing_preload_is_kept_after_ours() {
        let inherited = vec![(OsString::from("LD_PRELOAD"), OsString::from("/usr/lib/libother.so"))];
        let env = entries(&child_environment(
            inherited,
            &SpoofConfig::default(),
            Path::new("/opt/libx.so"),
        ));
        assert_eq!(
            env.iter().filter(|e| e.starts_with("LD_PRELOAD=")).collect::<Vec<_>>(),
            ["LD_PRELOAD=/opt/libx.so:/usr/lib/libother.so"]
        );
    }

    #[test]
    fn test_missing_explicit_library_is_an_error() {
        let err = cmd_run(
            &SpoofConfig::default(),
            Some(PathBuf::from("/nonexistent/libhwspoof.so")),
            &["true".to_string()],
        )
        .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
