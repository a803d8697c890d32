//! WAV playback through the shared device
//!
//! The playback callback pulls the next block straight from the open WAV.
//! When fewer samples remain than the device asked for, that short block is
//! the last one and the callback signals completion. The foreground poller
//! notices the inactive stream and closes the session.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hound::{WavIntoSamples, WavReader};

use super::device::{AudioDevice, PcmStream, PlaybackCallback, PlaybackFill};
use super::{AudioFormat, SessionFault};
use crate::error::{Result, StudioError};

/// Returned by [`Player::get_current_time`] before any playback.
pub const NO_SESSION: f64 = -1.0;

type SampleReader = WavIntoSamples<BufReader<File>, i16>;

struct PlaybackSession {
    path: PathBuf,
    stop_requested: Arc<AtomicBool>,
    fault: SessionFault,
    /// `None` once stopped or naturally finished.
    stream: Option<Box<dyn PcmStream>>,
    start_clock: Duration,
    frames_played: Arc<AtomicU64>,
    total_frames: u64,
}

impl PlaybackSession {
    fn close_stream(&mut self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.stop() {
                log::warn!("Stopping playback stream: {}", e);
            }
        }
    }
}

pub struct Player {
    device: AudioDevice,
    format: AudioFormat,
    session: Option<PlaybackSession>,
}

impl Player {
    pub fn new(device: AudioDevice, format: AudioFormat) -> Self {
        Self {
            device,
            format,
            session: None,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.session.as_ref().map_or(false, |s| s.stream.is_some())
    }

    /// File of the current or most recent session.
    pub fn current_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.path.as_path())
    }

    /// Length of the current or most recent file.
    pub fn total_duration(&self) -> Option<f64> {
        self.session
            .as_ref()
            .map(|s| self.format.frames_to_secs(s.total_frames))
    }

    pub fn start(&mut self, path: &Path) -> Result<()> {
        if self.is_playing() {
            return Err(StudioError::invalid_state("playback already in progress"));
        }
        // A finished session no longer describes the player once a new start
        // is attempted, whether or not it succeeds.
        self.session = None;

        let reader = WavReader::open(path).map_err(|e| StudioError::from_wav(path, e))?;
        let spec = reader.spec();
        if !self.format.accepts(&spec) {
            return Err(StudioError::FormatMismatch {
                path: path.to_path_buf(),
                detail: format!(
                    "{} ch / {} Hz / {} bit, expected {} ch / {} Hz / {} bit",
                    spec.channels,
                    spec.sample_rate,
                    spec.bits_per_sample,
                    self.format.channels,
                    self.format.sample_rate,
                    self.format.bits_per_sample
                ),
            });
        }
        let total_frames = reader.duration() as u64;

        let stop_requested = Arc::new(AtomicBool::new(false));
        let frames_played = Arc::new(AtomicU64::new(0));
        let fault = SessionFault::new();

        let callback = playback_callback(
            reader.into_samples::<i16>(),
            stop_requested.clone(),
            frames_played.clone(),
            fault.clone(),
        );

        let mut stream = self.device.open_playback(&self.format, callback)?;
        stream.start()?;
        let start_clock = stream.clock().unwrap_or_default();

        log::info!(
            "Playback started: {:?} ({:.2}s)",
            path,
            self.format.frames_to_secs(total_frames)
        );

        self.session = Some(PlaybackSession {
            path: path.to_path_buf(),
            stop_requested,
            fault,
            stream: Some(stream),
            start_clock,
            frames_played,
            total_frames,
        });
        Ok(())
    }

    /// Seconds of playback.
    ///
    /// While the stream runs this follows the device clock. Once it has
    /// stopped or finished, it is the number of frames actually delivered,
    /// so a completed file reports its full length. [`NO_SESSION`] before
    /// the first start.
    pub fn get_current_time(&self) -> f64 {
        let Some(session) = self.session.as_ref() else {
            return NO_SESSION;
        };

        let running_clock = session
            .stream
            .as_ref()
            .filter(|s| s.is_active())
            .and_then(|s| s.clock());

        match running_clock {
            Some(now) => now.saturating_sub(session.start_clock).as_secs_f64(),
            None => self
                .format
                .frames_to_secs(session.frames_played.load(Ordering::SeqCst)),
        }
    }

    /// Foreground check for end of playback. Returns `true` on the poll that
    /// observes the stream has finished on its own; the stream is closed.
    pub fn poll_finished(&mut self) -> Result<bool> {
        let Some(session) = self.session.as_mut() else {
            return Ok(false);
        };
        let Some(stream) = session.stream.as_ref() else {
            return Ok(false);
        };

        if let Some(msg) = session.fault.message() {
            log::error!("Playback aborted: {}", msg);
            session.close_stream();
            return Err(StudioError::SessionFault(msg));
        }

        if !stream.is_active() {
            session.close_stream();
            log::info!(
                "Playback finished: {:?} ({:.2}s)",
                session.path,
                self.format
                    .frames_to_secs(session.frames_played.load(Ordering::SeqCst))
            );
            return Ok(true);
        }
        Ok(false)
    }

    /// Stop playback. A session that already finished is left as is.
    pub fn stop(&mut self) -> Result<()> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| StudioError::invalid_state("no playback session"))?;
        if session.stream.is_some() {
            session.close_stream();
            log::info!("Playback stopped: {:?}", session.path);
        }
        Ok(())
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.close_stream();
        }
    }
}

fn playback_callback(
    mut samples: SampleReader,
    stop_requested: Arc<AtomicBool>,
    frames_played: Arc<AtomicU64>,
    fault: SessionFault,
) -> PlaybackCallback {
    let mut finished = false;

    Box::new(move |out: &mut [i16]| {
        if finished {
            return PlaybackFill::complete(0);
        }

        let mut filled = 0;
        while filled < out.len() {
            match samples.next() {
                Some(Ok(s)) => {
                    out[filled] = s;
                    filled += 1;
                }
                Some(Err(e)) => {
                    log::error!("Playback read failed: {}", e);
                    fault.raise(format!("read failed: {}", e));
                    finished = true;
                    frames_played.fetch_add(filled as u64, Ordering::SeqCst);
                    return PlaybackFill::complete(filled);
                }
                None => break,
            }
        }
        frames_played.fetch_add(filled as u64, Ordering::SeqCst);

        // Short block: end of file.
        if filled < out.len() || stop_requested.load(Ordering::SeqCst) {
            finished = true;
            PlaybackFill::complete(filled)
        } else {
            PlaybackFill::cont(filled)
        }
    })
}
