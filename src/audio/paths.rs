//! Recording paths and rotation of earlier takes
//!
//! Recordings are stored as `{id}.wav` in a working directory (`record/` by
//! default). Before a take reuses a name, the existing file and its earlier
//! rotations are shifted up: `A.wav` → `A,01.wav`, `A,01.wav` → `A,02.wav`,
//! and so on, so a re-recording never silently destroys a previous one.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, StudioError};

/// Highest rotation suffix. Once `,01` through `,99` all exist, rotation
/// stops and the next take overwrites the unrotated file.
pub const MAX_ROTATIONS: u32 = 99;

/// Create the recording directory if it doesn't exist.
pub fn create_recording_dir(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| StudioError::fs(dir, e))?;
    Ok(dir.to_path_buf())
}

/// Target file for a script entry id.
pub fn wav_path_for(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{}.wav", id))
}

/// `dir/A.wav` with n = 3 → `dir/A,03.wav`
fn rotation_path(path: &Path, n: u32) -> PathBuf {
    let mut name = OsString::from(path.file_stem().unwrap_or_default());
    name.push(format!(",{:02}", n));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

/// Move any existing file at `path` out of the way before a new take.
///
/// The chain is shifted from its highest member down, so each rename lands
/// on a free name. Returns `path` unchanged: rotation never alters where the
/// caller writes.
pub fn rotate_existing(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Ok(path.to_path_buf());
    }

    let Some(free) = (1..=MAX_ROTATIONS).find(|&n| !rotation_path(path, n).exists()) else {
        log::warn!(
            "Rotation limit of {} reached for {:?}; previous take will be overwritten",
            MAX_ROTATIONS,
            path
        );
        return Ok(path.to_path_buf());
    };

    for n in (1..free).rev() {
        let from = rotation_path(path, n);
        let to = rotation_path(path, n + 1);
        fs::rename(&from, &to).map_err(|e| StudioError::fs(&from, e))?;
    }

    let first = rotation_path(path, 1);
    fs::rename(path, &first).map_err(|e| StudioError::fs(path, e))?;
    log::info!("Rotated {:?} -> {:?} ({} earlier takes)", path, first, free - 1);

    Ok(path.to_path_buf())
}
