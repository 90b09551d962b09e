//! Environment configuration.

use std::env;
use std::time::Duration;

pub const DEFAULT_FADE_WINDOW: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    /// How long a freshly appended range keeps its fade-in mark.
    pub fade_window: Duration,
    /// Disables the built-in syntax highlighter; code renders as plain text.
    pub no_highlight: bool,
    pub debug: bool,
    pub log_path: Option<String>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            fade_window: DEFAULT_FADE_WINDOW,
            no_highlight: false,
            debug: false,
            log_path: None,
        }
    }
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            fade_window: env_millis("TAPE_STREAM_FADE_MS").unwrap_or(DEFAULT_FADE_WINDOW),
            no_highlight: env_flag("TAPE_STREAM_NO_HIGHLIGHT"),
            debug: env_flag("TAPE_STREAM_DEBUG"),
            log_path: env_string_opt("TAPE_STREAM_LOG"),
        }
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

fn env_millis(key: &str) -> Option<Duration> {
    env_string_opt(key)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}
