//! Configuration types for the sleep scheduler.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DrowseConfig {
    /// Schedule timing policy.
    pub schedule: ScheduleConfig,
    /// External job settings.
    pub job: JobConfig,
    /// Countdown display settings.
    pub countdown: CountdownConfig,
}

/// Timing policy applied when a schedule is created or restored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Seconds between the reminder notification and the sleep moment.
    pub lead_time_secs: u64,
    /// A pending schedule whose sleep moment passed more than this many
    /// seconds ago is treated as already fired during startup reconciliation.
    pub stale_after_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            lead_time_secs: 300,
            stale_after_secs: 600,
        }
    }
}

impl ScheduleConfig {
    /// Reminder lead time as a [`Duration`].
    #[must_use]
    pub fn lead_time(&self) -> Duration {
        Duration::from_secs(self.lead_time_secs)
    }

    /// Staleness threshold as a [`Duration`].
    #[must_use]
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// Settings for the external sleep job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Filename / label prefix shared by every artifact this app owns.
    pub label_prefix: String,
    /// Program and arguments run by the scheduling authority.
    pub sleep_command: Vec<String>,
    /// Directory for the job's stdout/stderr logs.
    pub log_dir: PathBuf,
    /// Job artifact directory (None = `~/Library/LaunchAgents`).
    pub launch_agents_dir: Option<PathBuf>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            label_prefix: "com.user.sleep.".to_owned(),
            sleep_command: vec![
                "/usr/bin/osascript".to_owned(),
                "-e".to_owned(),
                "tell application \"System Events\" to sleep".to_owned(),
            ],
            log_dir: PathBuf::from("/tmp"),
            launch_agents_dir: None,
        }
    }
}

impl JobConfig {
    /// Resolved job artifact directory.
    #[must_use]
    pub fn launch_agents_dir(&self) -> PathBuf {
        self.launch_agents_dir
            .clone()
            .unwrap_or_else(crate::drowse_dirs::launch_agents_dir)
    }
}

/// Countdown display settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CountdownConfig {
    /// Also run the countdown for clock-time schedules (delay schedules
    /// always get one).
    pub for_absolute_time: bool,
}

impl DrowseConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::DrowseError::Config(e.to_string()))
    }

    /// Load from `path` when it exists, otherwise return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> crate::error::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::DrowseError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values that serde cannot reject on its own.
    ///
    /// # Errors
    ///
    /// Returns [`DrowseError::Config`](crate::error::DrowseError::Config)
    /// describing the first invalid field.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.job.label_prefix.trim().is_empty() {
            return Err(crate::error::DrowseError::Config(
                "job.label_prefix must not be empty".to_owned(),
            ));
        }
        if self.job.label_prefix.contains('/') {
            return Err(crate::error::DrowseError::Config(
                "job.label_prefix must not contain '/'".to_owned(),
            ));
        }
        if self.job.sleep_command.is_empty() {
            return Err(crate::error::DrowseError::Config(
                "job.sleep_command must name a program".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = DrowseConfig::default();
        assert_eq!(config.schedule.lead_time(), Duration::from_secs(300));
        assert_eq!(config.job.label_prefix, "com.user.sleep.");
        assert_eq!(config.job.sleep_command[0], "/usr/bin/osascript");
        assert!(!config.countdown.for_absolute_time);
        config.validate().unwrap();
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = DrowseConfig::default();
        config.schedule.lead_time_secs = 120;
        config.job.log_dir = PathBuf::from("/var/tmp");
        config.save_to_file(&path).unwrap();

        let loaded = DrowseConfig::from_file(&path).unwrap();
        assert_eq!(loaded.schedule.lead_time_secs, 120);
        assert_eq!(loaded.job.log_dir, PathBuf::from("/var/tmp"));
    }

    #[test]
    fn partial_file_uses_defaults_for_missing_fields() {
        let config: DrowseConfig = toml::from_str("[schedule]\nstale_after_secs = 60\n").unwrap();
        assert_eq!(config.schedule.stale_after_secs, 60);
        assert_eq!(config.schedule.lead_time_secs, 300);
        assert_eq!(config.job.label_prefix, "com.user.sleep.");
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[schedule\nlead_time_secs = ").unwrap();
        assert!(DrowseConfig::from_file(&path).is_err());
    }

    #[test]
    fn load_or_default_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = DrowseConfig::load_or_default(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.schedule.lead_time_secs, 300);
    }

    #[test]
    fn validate_rejects_empty_command_and_bad_prefix() {
        let mut config = DrowseConfig::default();
        config.job.sleep_command.clear();
        assert!(config.validate().is_err());

        let mut config = DrowseConfig::default();
        config.job.label_prefix = "a/b".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_launch_agents_dir_wins() {
        let mut config = DrowseConfig::default();
        config.job.launch_agents_dir = Some(PathBuf::from("/opt/agents"));
        assert_eq!(config.job.launch_agents_dir(), PathBuf::from("/opt/agents"));
    }
}
