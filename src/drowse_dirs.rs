//! Centralized filesystem paths for Drowse.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Config | `~/Library/Application Support/drowse/` | `~/.config/drowse/` |
//! | Descriptors | `<config>/schedules/` | `<config>/schedules/` |
//! | Job artifacts | `~/Library/LaunchAgents/` | `~/Library/LaunchAgents/` |
//!
//! # Environment Overrides
//!
//! - `DROWSE_CONFIG_DIR` overrides [`config_dir`]
//! - `DROWSE_LAUNCH_AGENTS_DIR` overrides [`launch_agents_dir`]

use std::path::PathBuf;

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/drowse/` by default. Override with
/// the `DROWSE_CONFIG_DIR` environment variable.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("DROWSE_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("drowse"))
        .unwrap_or_else(|| PathBuf::from("/tmp/drowse-config"))
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Directory holding one JSON descriptor per active schedule.
#[must_use]
pub fn schedules_dir() -> PathBuf {
    config_dir().join("schedules")
}

/// Per-user launchd agents directory (`~/Library/LaunchAgents`).
///
/// Override with `DROWSE_LAUNCH_AGENTS_DIR`.
#[must_use]
pub fn launch_agents_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("DROWSE_LAUNCH_AGENTS_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::home_dir()
        .map(|h| h.join("Library").join("LaunchAgents"))
        .unwrap_or_else(|| PathBuf::from("/tmp/drowse-launch-agents"))
}
