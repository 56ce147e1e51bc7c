//! Scheduling authority capability.
//!
//! The authority is the platform service that keeps a job registered and
//! fires it outside this process's lifetime. On macOS that is launchd,
//! driven through `launchctl`.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

/// Registers and unregisters job artifacts with the platform.
///
/// Both calls return the authority's exit code. A non-zero code is a failure
/// signal, not an error; `Err` is reserved for failing to reach the
/// authority at all.
pub trait SchedulingAuthority: Send + Sync {
    /// Register the job described by `job_path`.
    fn register(&self, job_path: &Path) -> std::io::Result<i32>;

    /// Unregister the job described by `job_path`.
    fn unregister(&self, job_path: &Path) -> std::io::Result<i32>;

    /// Unregister a job by label when its artifact is already gone.
    fn unregister_label(&self, label: &str) -> std::io::Result<i32>;
}

/// `launchctl load` / `launchctl unload` / `launchctl remove`.
#[derive(Debug, Clone)]
pub struct Launchctl {
    program: String,
}

impl Default for Launchctl {
    fn default() -> Self {
        Self {
            program: "/bin/launchctl".to_owned(),
        }
    }
}

impl Launchctl {
    /// Use a different `launchctl` binary (e.g. a wrapper script).
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, verb: &str, target: &OsStr) -> std::io::Result<i32> {
        let output = Command::new(&self.program)
            .arg(verb)
            .arg(target)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        let code = output.status.code().unwrap_or(-1);
        debug!(
            program = %self.program,
            verb,
            target = %target.to_string_lossy(),
            code,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "scheduling authority call finished"
        );
        Ok(code)
    }
}

impl SchedulingAuthority for Launchctl {
    fn register(&self, job_path: &Path) -> std::io::Result<i32> {
        self.run("load", job_path.as_os_str())
    }

    fn unregister(&self, job_path: &Path) -> std::io::Result<i32> {
        self.run("unload", job_path.as_os_str())
    }

    fn unregister_label(&self, label: &str) -> std::io::Result<i32> {
        self.run("remove", OsStr::new(label))
    }
}
