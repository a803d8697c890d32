//! Error taxonomy for the recorder core
//!
//! Every fallible operation in the crate returns [`Result`]. Errors raised on
//! the audio thread never cross the callback boundary directly; they are
//! parked in a [`crate::audio::SessionFault`] and surfaced as
//! [`StudioError::SessionFault`] by the next foreground poll.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StudioError>;

#[derive(Error, Debug)]
pub enum StudioError {
    /// Stream could not be opened or started.
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("File system error on {path:?}: {source}")]
    FileSystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("File not found: {0:?}")]
    FileNotFound(PathBuf),

    #[error("Unsupported audio format in {path:?}: {detail}")]
    FormatMismatch { path: PathBuf, detail: String },

    /// Caller error: start while active, stop while idle, navigate mid-session.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Script {0:?} contains no entries")]
    EmptyScript(PathBuf),

    #[error("Malformed script row at line {line}: {content:?}")]
    MalformedScriptRow { line: usize, content: String },

    #[error("Session aborted: {0}")]
    SessionFault(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl StudioError {
    pub fn device<S: Into<String>>(msg: S) -> Self {
        Self::DeviceUnavailable(msg.into())
    }

    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn fs(path: &Path, source: io::Error) -> Self {
        Self::FileSystem {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Map a `hound` error raised while opening or reading `path`.
    pub fn from_wav(path: &Path, err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(e) if e.kind() == io::ErrorKind::NotFound => {
                Self::FileNotFound(path.to_path_buf())
            }
            hound::Error::IoError(e) => Self::fs(path, e),
            other => Self::FormatMismatch {
                path: path.to_path_buf(),
                detail: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_not_found_maps_to_file_not_found() {
        let err = hound::Error::IoError(io::Error::new(io::ErrorKind::NotFound, "gone"));
        let mapped = StudioError::from_wav(Path::new("record/A01.wav"), err);
        assert!(matches!(mapped, StudioError::FileNotFound(p) if p == Path::new("record/A01.wav")));
    }

    #[test]
    fn test_wav_format_error_maps_to_format_mismatch() {
        let mapped = StudioError::from_wav(Path::new("x.wav"), hound::Error::Unsupported);
        assert!(matches!(mapped, StudioError::FormatMismatch { .. }));
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            StudioError::invalid_state("already recording").to_string(),
            "Invalid state: already recording"
        );
        assert_eq!(
            StudioError::MalformedScriptRow {
                line: 3,
                content: "A03".into()
            }
            .to_string(),
            "Malformed script row at line 3: \"A03\""
        );
    }
}
