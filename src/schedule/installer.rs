//! Installs the external sleep job.
//!
//! [`LaunchAgentInstaller`] writes a launchd property list per schedule and
//! registers it with a [`SchedulingAuthority`]. The job fires on calendar
//! matching (hour and minute, no day), which is how launchd's
//! `StartCalendarInterval` works.

use crate::config::JobConfig;
use crate::error::InstallError;
use crate::schedule::authority::SchedulingAuthority;
use crate::schedule::store::id_from_file_name;
use chrono::{DateTime, Local, Timelike};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const JOB_EXTENSION: &str = "plist";

/// Creates and removes the durable external trigger for a schedule.
pub trait ActionInstaller: Send + Sync {
    /// Install a job keyed by `id` that puts the machine to sleep at
    /// `sleep_at`'s local hour and minute.
    fn install(&self, id: &str, sleep_at: DateTime<Local>) -> Result<(), InstallError>;

    /// Unregister and delete the job for `id`. Both steps are always
    /// attempted; a job that is already gone is not an error.
    fn remove(&self, id: &str) -> Result<(), InstallError>;

    /// Ids of every job artifact this installer owns.
    fn installed(&self) -> Result<Vec<String>, InstallError>;
}

/// launchd-backed installer writing to `~/Library/LaunchAgents`.
pub struct LaunchAgentInstaller {
    dir: PathBuf,
    job: JobConfig,
    authority: Arc<dyn SchedulingAuthority>,
}

impl LaunchAgentInstaller {
    /// Create an installer for the directory configured in `job`.
    #[must_use]
    pub fn new(job: JobConfig, authority: Arc<dyn SchedulingAuthority>) -> Self {
        Self {
            dir: job.launch_agents_dir(),
            job,
            authority,
        }
    }

    /// Label used for `id` (also the artifact's file stem).
    #[must_use]
    pub fn label(&self, id: &str) -> String {
        format!("{}{id}", self.job.label_prefix)
    }

    /// Path of the job artifact for `id`.
    #[must_use]
    pub fn job_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{JOB_EXTENSION}", self.label(id)))
    }

    fn write_job(&self, path: &Path, contents: &str) -> Result<(), InstallError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| InstallError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let tmp_path = path.with_extension("plist.tmp");
        let written = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .and_then(|mut file| {
                file.write_all(contents.as_bytes())?;
                file.sync_all()
            })
            .and_then(|()| set_job_permissions(&tmp_path))
            .and_then(|()| std::fs::rename(&tmp_path, path));

        written.map_err(|source| {
            let _ = std::fs::remove_file(&tmp_path);
            InstallError::Io {
                path: path.to_path_buf(),
                source,
            }
        })
    }
}

impl ActionInstaller for LaunchAgentInstaller {
    fn install(&self, id: &str, sleep_at: DateTime<Local>) -> Result<(), InstallError> {
        let label = self.label(id);
        let path = self.job_path(id);
        let plist = render_job_plist(
            &label,
            &self.job.sleep_command,
            sleep_at.hour(),
            sleep_at.minute(),
            &self.job.log_dir,
        );
        self.write_job(&path, &plist)?;

        let code = match self.authority.register(&path) {
            Ok(code) => code,
            Err(source) => {
                let _ = std::fs::remove_file(&path);
                return Err(InstallError::Io { path, source });
            }
        };
        if code != 0 {
            let _ = std::fs::remove_file(&path);
            return Err(InstallError::AuthorityRejected {
                action: "register",
                path,
                code,
            });
        }

        info!(
            label = %label,
            hour = sleep_at.hour(),
            minute = sleep_at.minute(),
            "sleep job registered"
        );
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<(), InstallError> {
        let path = self.job_path(id);
        if !path.exists() {
            let label = self.label(id);
            match self.authority.unregister_label(&label) {
                Ok(0) => info!(id, "unloaded sleep job whose artifact was already gone"),
                Ok(code) => debug!(id, code, "no job artifact and nothing loaded under its label"),
                Err(e) => warn!(id, "no job artifact; label unload failed: {e}"),
            }
            return Ok(());
        }

        let mut failures = Vec::new();

        match self.authority.unregister(&path) {
            Ok(0) => {}
            Ok(code) => failures.push(InstallError::AuthorityRejected {
                action: "unregister",
                path: path.clone(),
                code,
            }),
            Err(source) => failures.push(InstallError::Io {
                path: path.clone(),
                source,
            }),
        }

        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => failures.push(InstallError::Io {
                path: path.clone(),
                source,
            }),
        }

        if failures.is_empty() {
            info!(id, "sleep job removed");
            Ok(())
        } else {
            warn!(id, failures = failures.len(), "sleep job removal incomplete");
            Err(InstallError::Cleanup(failures))
        }
    }

    fn installed(&self) -> Result<Vec<String>, InstallError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(InstallError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut ids: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                id_from_file_name(
                    &entry.file_name().to_string_lossy(),
                    &self.job.label_prefix,
                    JOB_EXTENSION,
                )
            })
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(unix)]
fn set_job_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_job_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Render the launchd property list for one sleep job.
#[must_use]
pub fn render_job_plist(
    label: &str,
    program: &[String],
    hour: u32,
    minute: u32,
    log_dir: &Path,
) -> String {
    let arguments: String = program
        .iter()
        .map(|arg| format!("        <string>{}</string>\n", xml_escape(arg)))
        .collect();
    let stdout_path = xml_escape(&log_dir.join(format!("{label}.log")).to_string_lossy());
    let stderr_path = xml_escape(&log_dir.join(format!("{label}.err")).to_string_lossy());
    let label = xml_escape(label);

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{label}</string>
    <key>ProgramArguments</key>
    <array>
{arguments}    </array>
    <key>StartCalendarInterval</key>
    <dict>
        <key>Hour</key>
        <integer>{hour}</integer>
        <key>Minute</key>
        <integer>{minute}</integer>
    </dict>
    <key>StandardOutPath</key>
    <string>{stdout_path}</string>
    <key>StandardErrorPath</key>
    <string>{stderr_path}</string>
    <key>RunAtLoad</key>
    <false/>
</dict>
</plist>
"#
    )
}

fn xml_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}
