//! # hwspoof CLI
//!
//! Launch programs under the inception layer and inspect the synthetic
//! hardware identity it serves.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use hwspoof_config::logging::{init_logging, LogLevel};
use hwspoof_config::{log_cli_debug, SpoofConfig};

mod preview;
mod run;

use preview::PreviewTarget;

/// hwspoof - present a synthetic hardware identity to unmodified programs
#[derive(Parser)]
#[command(name = "hwspoof")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command with the inception layer preloaded
    Run {
        /// Profile file used instead of the global and project profiles
        #[arg(short, long, value_name = "FILE")]
        profile: Option<PathBuf>,

        /// Inception layer shared object (default: search standard locations)
        #[arg(long, value_name = "PATH", env = "HWSPOOF_LIBRARY")]
        library: Option<PathBuf>,

        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },

    /// Print a synthetic payload as a spoofed process would read it
    Preview {
        #[arg(value_enum)]
        target: PreviewTarget,

        /// Clock sequence seed (a spoofed process uses its pid)
        #[arg(long, default_value_t = 1)]
        seed: u32,
    },

    /// Show the resolved configuration
    Config {
        /// Print JSON instead of a TOML profile
        #[arg(long)]
        json: bool,

        /// Profile file used instead of the global and project profiles
        #[arg(short, long, value_name = "FILE")]
        profile: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LogLevel::from_verbosity(cli.verbose));

    match cli.command {
        Commands::Run {
            profile,
            library,
            command,
        } => {
            let config = resolve_config(profile.as_ref())?;
            run::cmd_run(&config, library, &command)
        }
        Commands::Preview { target, seed } => preview::cmd_preview(target, seed),
        Commands::Config { json, profile } => {
            let config = resolve_config(profile.as_ref())?;
            cmd_config(&config, json)
        }
    }
}

fn resolve_config(profile: Option<&PathBuf>) -> Result<SpoofConfig> {
    let config = match profile {
        Some(path) => SpoofConfig::load_profile(path)
            .with_context(|| format!("Failed to load profile {}", path.display()))?,
        None => SpoofConfig::load().context("Failed to load configuration")?,
    };
    log_cli_debug!("Resolved configuration", config = tracing::field::debug(&config));
    Ok(config)
}

fn cmd_config(config: &SpoofConfig, json: bool) -> Result<()> {
    if json {
        let rendered =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
        println!("{}", rendered);
    } else {
        print!("{}", config.to_toml());
    }
    Ok(())
}
