//! Versioned JSON snapshots with atomic replace-on-write.
//!
//! A snapshot is written to a temp file in the target's directory, fsynced and
//! renamed over the target, so a crash mid-write leaves the previous snapshot
//! intact.

use crate::errors::StoreError;
use serde::{de::DeserializeOwned, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

pub trait Snapshot: Serialize + DeserializeOwned + Default + Send + 'static {
    /// Current schema version written into every snapshot.
    const VERSION: u32;
}

/// Read a snapshot. `Ok(None)` when the file does not exist.
pub fn read<T: Snapshot>(path: &Path) -> Result<Option<T>, StoreError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let value: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|e| corrupt(path, e))?;

    let found = value
        .get("version")
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| StoreError::Corrupt {
            path: path.to_path_buf(),
            message: "missing or invalid version field".to_string(),
        })?;
    if found != T::VERSION {
        return Err(StoreError::UnsupportedVersion {
            path: path.to_path_buf(),
            found,
            expected: T::VERSION,
        });
    }

    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| corrupt(path, e))
}

/// Read a snapshot, falling back to the default state when it is missing or
/// unusable. Corruption is logged, not raised: re-announcing a few items beats
/// refusing to start.
pub fn read_or_default<T: Snapshot>(path: &Path) -> T {
    match read::<T>(path) {
        Ok(Some(state)) => {
            log::info!("Loaded state from {}", path.display());
            state
        }
        Ok(None) => {
            log::info!("No state at {}, starting fresh", path.display());
            T::default()
        }
        Err(e) if e.is_corrupt() => {
            log::warn!("{e}; starting with empty state");
            T::default()
        }
        Err(e) => {
            log::error!("Failed to load state: {e}; starting with empty state");
            T::default()
        }
    }
}

/// Atomically replace the snapshot at `path` with `state`.
pub async fn write<T: Snapshot>(path: &Path, state: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(state)?;
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic(&path, &bytes)).await?
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let io_err = |source: std::io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = parent_dir(path);
    std::fs::create_dir_all(&dir).map_err(io_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn corrupt(path: &Path, e: serde_json::Error) -> StoreError {
    StoreError::Corrupt {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}
