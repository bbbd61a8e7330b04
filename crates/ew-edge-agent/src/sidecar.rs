//! Atomic write-then-rename JSON sidecar helper shared by
//! `policy_cache`, `command_state`, `cost_caps`, and `power_saver`
//! (spec.md §6 "Persisted state on the edge"). A torn write on power
//! loss can only ever leave the previous, still-valid file in place —
//! never a half-written one.

use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::SidecarError;

/// Serializes `value` to `path` by writing a `.tmp` sibling, fsyncing
/// it, then renaming over the target — the rename is atomic on the
/// same filesystem, so readers never observe a partial file.
pub fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), SidecarError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension("tmp");
    {
        let file = std::fs::File::create(&tmp_path)?;
        use std::io::Write;
        let mut file = file;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    if let Some(dir) = path.parent() {
        // Best-effort directory fsync so the rename itself survives a
        // crash; not all platforms support syncing a directory handle.
        if let Ok(dir_file) = std::fs::File::open(dir) {
            let _ = dir_file.sync_all();
        }
    }
    Ok(())
}

/// Reads and decodes `path`, returning `None` if it doesn't exist yet
/// or fails to parse. Per spec.md §7 CorruptLocalState: a corrupt JSON
/// sidecar is ignored and replaced with defaults, not treated as fatal.
pub fn read_or_default<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = std::fs::read(path).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "sidecar file corrupt, using defaults");
            None
        }
    }
}
