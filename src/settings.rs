use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::AudioFormat;
use crate::error::{Result, StudioError};

const APP_DIR_NAME: &str = "arayuru-recorder";
const SETTINGS_FILE_NAME: &str = "settings.json";

/// Shortest accepted callback period and poll interval.
const MIN_INTERVAL_MS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioSettings {
    /// Directory recordings are written to, relative to the working directory
    /// unless absolute.
    pub recording_dir: PathBuf,

    /// How often the foreground drains captured audio and checks for the end
    /// of playback.
    pub poll_interval_ms: u64,

    /// Device callback period. 100 ms is 1600 frames at 16 kHz.
    pub buffer_duration_ms: u64,

    /// Seconds of captured audio kept for display.
    pub display_window_secs: u32,

    /// Blocks the writer queue holds before the capture callback gives up on
    /// the session.
    pub writer_queue_blocks: usize,
}

impl Default for StudioSettings {
    fn default() -> Self {
        Self {
            recording_dir: PathBuf::from("record"),
            poll_interval_ms: 100,
            buffer_duration_ms: 100,
            display_window_secs: 60,
            writer_queue_blocks: 256,
        }
    }
}

impl StudioSettings {
    pub fn audio_format(&self) -> AudioFormat {
        AudioFormat::new(Duration::from_millis(
            self.buffer_duration_ms.max(MIN_INTERVAL_MS),
        ))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_INTERVAL_MS))
    }
}

/// `<config dir>/arayuru-recorder/settings.json`, if the platform has a
/// config directory.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(SETTINGS_FILE_NAME))
}

/// Read settings from `path`. A missing or unreadable file yields defaults.
pub fn load_settings(path: &Path) -> StudioSettings {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<StudioSettings>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Settings: failed to parse {:?}: {}", path, e);
                StudioSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => StudioSettings::default(),
        Err(e) => {
            log::warn!("Settings: failed to read {:?}: {}", path, e);
            StudioSettings::default()
        }
    }
}

pub fn save_settings(path: &Path, settings: &StudioSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StudioError::fs(parent, e))?;
    }

    let contents = serde_json::to_string_pretty(settings)
        .map_err(|e| StudioError::Settings(format!("serialize: {}", e)))?;

    // Write to a temp file in the same directory, then rename over the target.
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents).map_err(|e| StudioError::fs(&tmp_path, e))?;

    // Windows rename fails if the destination exists.
    if cfg!(windows) && path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(StudioError::fs(path, e));
            }
        }
    }

    std::fs::rename(&tmp_path, path).map_err(|e| StudioError::fs(&tmp_path, e))?;
    Ok(())
}
