//! File-backed store for the active schedule descriptor.
//!
//! Each descriptor lives in its own `<prefix><id>.json` file. Writes go to a
//! `.tmp` sibling first and are renamed into place, so a crash mid-write
//! never leaves a partial artifact under the published name.

use crate::error::StoreError;
use crate::schedule::descriptor::ScheduleDescriptor;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const ARTIFACT_EXTENSION: &str = "json";

/// Persists schedule descriptors under a directory.
#[derive(Debug, Clone)]
pub struct ActionStore {
    dir: PathBuf,
    prefix: String,
}

impl ActionStore {
    /// Create a store rooted at `dir`, owning files that start with `prefix`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// Directory this store owns.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the artifact for `id`.
    #[must_use]
    pub fn artifact_path(&self, id: &str) -> PathBuf {
        self.dir
            .join(format!("{}{id}.{ARTIFACT_EXTENSION}", self.prefix))
    }

    /// Write `descriptor` atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the directory or file cannot be written.
    pub fn persist(&self, descriptor: &ScheduleDescriptor) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.artifact_path(&descriptor.id);
        let json = serde_json::to_vec_pretty(descriptor).map_err(|e| StoreError::Io {
            path: path.clone(),
            source: std::io::Error::other(e),
        })?;

        let tmp_path = path.with_extension("json.tmp");
        let write_result = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .and_then(|mut file| {
                file.write_all(&json)?;
                file.sync_all()
            });
        if let Err(source) = write_result {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(StoreError::Io {
                path: tmp_path,
                source,
            });
        }

        if let Err(source) = std::fs::rename(&tmp_path, &path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(StoreError::Io { path, source });
        }

        debug!(id = %descriptor.id, path = %path.display(), "persisted schedule descriptor");
        Ok(())
    }

    /// Read the descriptor for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the file cannot be read and
    /// [`StoreError::CorruptArtifact`] when it cannot be parsed or belongs to
    /// a different id.
    pub fn load(&self, id: &str) -> Result<ScheduleDescriptor, StoreError> {
        let path = self.artifact_path(id);
        let bytes = std::fs::read(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        let descriptor: ScheduleDescriptor =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::CorruptArtifact {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        if descriptor.id != id {
            return Err(StoreError::CorruptArtifact {
                path,
                reason: format!("artifact names id {id} but contains {}", descriptor.id),
            });
        }
        Ok(descriptor)
    }

    /// Remove the artifact for `id`. A missing artifact is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when an existing artifact cannot be removed.
    pub fn clear(&self, id: &str) -> Result<(), StoreError> {
        let path = self.artifact_path(id);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(id, "cleared schedule descriptor");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    /// Identifiers of every artifact in the store directory.
    ///
    /// The iterator is lazy and single-pass. Files that do not follow the
    /// naming convention (including in-flight `.tmp` files) are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the directory exists but cannot be
    /// listed. A missing directory yields an empty iterator.
    pub fn scan(&self) -> Result<impl Iterator<Item = String> + use<>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => Some(entries),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let prefix = self.prefix.clone();
        Ok(entries.into_iter().flatten().filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("skipping unreadable schedule store entry: {e}");
                    return None;
                }
            };
            id_from_file_name(&entry.file_name().to_string_lossy(), &prefix, ARTIFACT_EXTENSION)
        }))
    }
}

/// Extract the id from `<prefix><id>.<extension>`.
pub(crate) fn id_from_file_name(name: &str, prefix: &str, extension: &str) -> Option<String> {
    let stem = name
        .strip_prefix(prefix)?
        .strip_suffix(extension)?
        .strip_suffix('.')?;
    if stem.is_empty() || stem.contains('.') {
        return None;
    }
    Some(stem.to_owned())
}
