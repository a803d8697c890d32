//! Audio core: streams, capture hand-off, WAV persistence and playback
//!
//! Capture and playback run against a PCM stream whose callback fires on an
//! audio-owned thread. The only data crossing from that thread to the
//! foreground is the [`CaptureBuffer`]; raw samples go to disk through a
//! dedicated writer thread so the callback never blocks on file I/O.

pub mod capture_buffer;
pub mod cpal_backend;
pub mod device;
pub mod levels;
pub mod paths;
pub mod player;
pub mod recorder;
pub mod waveform;
mod writer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use capture_buffer::CaptureBuffer;
pub use cpal_backend::CpalBackend;
pub use device::{
    AudioBackend, AudioDevice, CaptureCallback, ManualBackend, PcmStream, PlaybackCallback,
    PlaybackFill, StreamControl,
};
pub use paths::{create_recording_dir, rotate_existing, wav_path_for, MAX_ROTATIONS};
pub use player::Player;
pub use recorder::{Recorder, RecordingSummary};
pub use waveform::WaveformBuffer;

/// Fixed mono sample rate for every stream and file.
pub const SAMPLE_RATE: u32 = 16_000;
pub const CHANNELS: u16 = 1;
pub const BITS_PER_SAMPLE: u16 = 16;

/// One callback period worth of raw PCM samples.
pub type SampleBlock = Vec<i16>;

/// Display-side copy of a [`SampleBlock`].
pub type DisplayBlock = Vec<f32>;

/// Stream and file format. Built once per process; every stream, file and
/// buffer agrees on it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioFormat {
    pub channels: u16,
    pub bits_per_sample: u16,
    pub sample_rate: u32,
    /// Length of one callback period.
    pub buffer_duration: Duration,
}

impl AudioFormat {
    pub fn new(buffer_duration: Duration) -> Self {
        Self {
            channels: CHANNELS,
            bits_per_sample: BITS_PER_SAMPLE,
            sample_rate: SAMPLE_RATE,
            buffer_duration,
        }
    }

    /// Frames delivered per callback period (1600 for 0.1 s).
    pub fn frames_per_buffer(&self) -> usize {
        ((self.sample_rate as f64 * self.buffer_duration.as_secs_f64()).round() as usize).max(1)
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    pub fn frames_to_secs(&self, frames: u64) -> f64 {
        frames as f64 / self.sample_rate as f64
    }

    pub fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: hound::SampleFormat::Int,
        }
    }

    /// True when a WAV header matches this format exactly.
    pub fn accepts(&self, spec: &hound::WavSpec) -> bool {
        spec.channels == self.channels
            && spec.sample_rate == self.sample_rate
            && spec.bits_per_sample == self.bits_per_sample
            && spec.sample_format == hound::SampleFormat::Int
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

/// Failure raised on the audio thread, observed by the foreground poller.
///
/// The flag is checked lock-free on every poll; the mutex is only touched
/// when a fault is actually raised or collected.
#[derive(Debug, Clone, Default)]
pub struct SessionFault {
    raised: Arc<AtomicBool>,
    message: Arc<Mutex<Option<String>>>,
}

impl SessionFault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fault. The first message wins.
    pub fn raise<S: Into<String>>(&self, msg: S) {
        let mut slot = self.message.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(msg.into());
        }
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Message of the first fault, if any.
    pub fn message(&self) -> Option<String> {
        if !self.is_raised() {
            return None;
        }
        self.message
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_format_matches_device_boundary() {
        let format = AudioFormat::default();
        assert_eq!(format.channels, 1);
        assert_eq!(format.bits_per_sample, 16);
        assert_eq!(format.sample_rate, 16_000);
        assert_eq!(format.frames_per_buffer(), 1600);
        assert_eq!(format.bytes_per_frame(), 2);
    }

    #[test]
    fn test_accepts_only_exact_spec() {
        let format = AudioFormat::default();
        let mut spec = format.wav_spec();
        assert!(format.accepts(&spec));

        spec.sample_rate = 44_100;
        assert!(!format.accepts(&spec));

        let stereo = hound::WavSpec {
            channels: 2,
            ..format.wav_spec()
        };
        assert!(!format.accepts(&stereo));
    }

    #[test]
    fn test_session_fault_keeps_first_message() {
        let fault = SessionFault::new();
        assert!(!fault.is_raised());
        assert_eq!(fault.message(), None);

        fault.raise("writer queue full");
        fault.raise("second");
        assert!(fault.is_raised());
        assert_eq!(fault.message().as_deref(), Some("writer queue full"));

        // Clones observe the same fault.
        let other = fault.clone();
        assert!(other.is_raised());
    }
}
