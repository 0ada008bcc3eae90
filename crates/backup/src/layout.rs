//! Backup directory layout on disk.
//!
//! ```text
//! <backups_root>/
//!   backup_2024-01-15_14-30-00/
//!     persons.json
//!     attendance.json
//!     attendance_persons.json
//!     backup_summary.json
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::BackupError;

const DIR_PREFIX: &str = "backup_";
const PARTIAL_SUFFIX: &str = ".partial";

/// `backup_<YYYY-MM-DD>_<HH-MM-SS>` for the given local time.
pub fn backup_dir_name(captured_at: DateTime<Local>) -> String {
    captured_at
        .format(&format!("{DIR_PREFIX}%Y-%m-%d_%H-%M-%S"))
        .to_string()
}

/// Create this run's directory under `root`, refusing to reuse an existing one.
pub fn create_backup_dir(root: &Path, captured_at: DateTime<Local>) -> Result<PathBuf, BackupError> {
    fs::create_dir_all(root).map_err(|e| BackupError::io(root, e))?;

    let dir = root.join(backup_dir_name(captured_at));
    match fs::create_dir(&dir) {
        Ok(()) => Ok(dir),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(BackupError::OutputExists(dir)),
        Err(e) => Err(BackupError::io(dir, e)),
    }
}

/// Backup directory names under `root`, newest first.
///
/// A missing root yields an empty list.
pub fn list_backups(root: &Path) -> Result<Vec<String>, BackupError> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(root).map_err(|e| BackupError::io(root, e))? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable backup entry");
                continue;
            }
        };
        if entry.path().is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    names.reverse();
    Ok(names)
}

/// Resolve a user-supplied backup path; relative paths are taken from `base_dir`.
pub fn resolve_backup_path(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Pretty-print `value` into `path` via a sibling temp file and a rename.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), BackupError> {
    let payload = serde_json::to_vec_pretty(value).map_err(|source| BackupError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let mut partial = path.as_os_str().to_owned();
    partial.push(PARTIAL_SUFFIX);
    let partial = PathBuf::from(partial);

    let result = (|| -> io::Result<()> {
        let mut file = fs::File::create(&partial)?;
        file.write_all(&payload)?;
        file.sync_all()?;
        fs::rename(&partial, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&partial);
        return Err(BackupError::io(path, e));
    }
    Ok(())
}

/// Read and parse a JSON document.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, BackupError> {
    let text = fs::read_to_string(path).map_err(|e| BackupError::io(path, e))?;
    serde_json::from_str(&text).map_err(|source| BackupError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
