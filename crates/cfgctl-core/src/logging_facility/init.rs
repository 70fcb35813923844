//! Logging initialization module
//!
//! Provides a single initialization point for the logging facility.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Logging profile configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Human-readable output for one-shot invocations; `-v` raises the level
    Cli { verbosity: u8 },
    /// Human-readable output for a long-running daemon
    Daemon,
    /// JSON structured output
    Production,
    /// Test capture mode for deterministic testing
    Test,
}

impl Profile {
    /// Filter used when `RUST_LOG` is not set
    pub fn default_directive(&self) -> &'static str {
        match self {
            Profile::Cli { verbosity: 0 } => "warn",
            Profile::Cli { verbosity: 1 } => "info",
            Profile::Cli { verbosity: 2 } => "debug",
            Profile::Cli { .. } => "trace",
            Profile::Daemon | Profile::Production => "info",
            Profile::Test => "debug",
        }
    }
}

static INIT_ONCE: Once = Once::new();

/// Initialize the logging facility
///
/// This function should be called once at process startup. Later calls are
/// ignored, whatever their profile.
///
/// # Example
///
/// ```
/// use cfgctl_core::logging_facility::{init, Profile};
///
/// init(Profile::Daemon);
/// ```
pub fn init(profile: Profile) {
    INIT_ONCE.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(profile.default_directive()));
        match profile {
            Profile::Cli { .. } => {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .without_time()
                    .try_init()
                    .ok();
            }
            Profile::Daemon => {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .try_init()
                    .ok();
            }
            Profile::Production => {
                tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .try_init()
                    .ok();
            }
            Profile::Test => {
                super::test_capture::init_test_capture();
            }
        }
    });
}
