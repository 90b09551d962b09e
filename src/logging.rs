//! Opt-in `tracing` subscriber for debugging render and session behavior.
//!
//! The library only emits events; nothing is printed unless the host calls
//! [`init`] or installs its own subscriber.

use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::EnvConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogInit {
    Installed,
    /// Nothing was requested through the environment.
    Disabled,
    /// Another global subscriber was already installed.
    AlreadySet,
}

fn default_directive(config: &EnvConfig) -> &'static str {
    if config.debug {
        "tape_stream=debug,stream_transport=debug"
    } else {
        "tape_stream=info,stream_transport=info"
    }
}

/// Installs a global fmt subscriber writing to `config.log_path`.
///
/// `RUST_LOG` overrides the default filter when set.
pub fn init(config: &EnvConfig) -> io::Result<LogInit> {
    let Some(path) = config.log_path.as_deref() else {
        return Ok(LogInit::Disabled);
    };

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config)));

    match tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
    {
        Ok(()) => Ok(LogInit::Installed),
        Err(_) => Ok(LogInit::AlreadySet),
    }
}
