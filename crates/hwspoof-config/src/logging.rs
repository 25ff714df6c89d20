//! Structured logging utilities for hwspoof components.
//!
//! Provides consistent logging with component prefixes and structured fields.
//! Only the launcher installs a subscriber. Inside the inception layer the
//! generation macros run once at load and go nowhere; descriptor tracking
//! and cloaking never log through `tracing` (the layer writes raw lines
//! with `spoof_log!` instead).
//!
//! # Usage
//!
//! ```ignore
//! use hwspoof_config::logging::*;
//!
//! log_cli_info!("Launching command", program = "lscpu");
//! log_gen_debug!("Generated payload", category = "cpuinfo", len = 12345);
//! ```

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const CLI: &'static str = "CLI";
    pub const GEN: &'static str = "GEN";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Map a `-v` count to a level: none is warn, one is info, two is debug.
    pub fn from_verbosity(count: u8) -> Self {
        match count {
            0 => LogLevel::Warn,
            1 => LogLevel::Info,
            2 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

// === CLI logging macros ===

#[macro_export]
macro_rules! log_cli_error {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::error!(component = $crate::logging::Component::CLI, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_cli_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = $crate::logging::Component::CLI, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_cli_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = $crate::logging::Component::CLI, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_cli_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = $crate::logging::Component::CLI, $($key = $value,)* $msg)
    };
}

// === GEN logging macros ===

#[macro_export]
macro_rules! log_gen_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = $crate::logging::Component::GEN, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_gen_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = $crate::logging::Component::GEN, $($key = $value,)* $msg)
    };
}

/// Initialize logging with the given level filter.
/// Call this once at application startup.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let filter = match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
