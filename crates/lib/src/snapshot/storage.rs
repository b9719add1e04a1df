//! Snapshot storage.
//!
//! One JSON file per stack. Writes go through a temporary file in the same
//! directory that is renamed over the target, so a crash never leaves a
//! truncated snapshot behind.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::consts::SNAPSHOT_VERSION;

use super::types::{Snapshot, SnapshotError};

/// Reads and writes the snapshot of one stack.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
  path: PathBuf,
}

impl SnapshotStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  /// Store for `stack` under `state_dir`, i.e. `<state_dir>/<stack>.json`.
  pub fn for_stack(state_dir: &Path, stack: &str) -> Self {
    Self::new(state_dir.join(format!("{}.json", stack)))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Load the snapshot.
  ///
  /// Returns `Ok(None)` if nothing has been applied yet.
  pub fn load(&self) -> Result<Option<Snapshot>, SnapshotError> {
    let content = match fs::read_to_string(&self.path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(SnapshotError::Read(e)),
    };

    let snapshot: Snapshot = serde_json::from_str(&content).map_err(SnapshotError::Parse)?;
    if snapshot.version != SNAPSHOT_VERSION {
      return Err(SnapshotError::UnsupportedVersion(snapshot.version));
    }

    debug!(path = %self.path.display(), nodes = snapshot.nodes.len(), "snapshot loaded");
    Ok(Some(snapshot))
  }

  /// Save the snapshot atomically, replacing any previous one.
  pub fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
    let dir = match self.path.parent() {
      Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
      _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(SnapshotError::CreateDir)?;

    let content = serde_json::to_string_pretty(snapshot).map_err(SnapshotError::Serialize)?;
    let mut temp = NamedTempFile::new_in(&dir).map_err(SnapshotError::Write)?;
    temp.write_all(content.as_bytes()).map_err(SnapshotError::Write)?;
    temp.persist(&self.path).map_err(|e| SnapshotError::Write(e.error))?;

    debug!(path = %self.path.display(), nodes = snapshot.nodes.len(), "snapshot saved");
    Ok(())
  }

  /// Remove the snapshot. Missing files are fine.
  pub fn clear(&self) -> Result<(), SnapshotError> {
    match fs::remove_file(&self.path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(SnapshotError::Write(e)),
    }
  }
}
