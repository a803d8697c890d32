//! PCM stream abstraction
//!
//! An [`AudioBackend`] opens capture or playback streams that invoke a
//! registered callback on their own thread, once per buffer period. The
//! callback answers with a [`StreamControl`] telling the stream whether to
//! keep going or to finish after the current block.
//!
//! A backend is shared as an [`AudioDevice`] (`Arc<dyn AudioBackend>`): the
//! same device session is handed to the recorder and the player explicitly.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::AudioFormat;
use crate::error::{Result, StudioError};

/// Callback answer: keep streaming or complete after this block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamControl {
    Continue,
    Complete,
}

/// Result of a playback callback: how many frames were written into the
/// output slice and whether the stream should finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackFill {
    pub frames: usize,
    pub control: StreamControl,
}

impl PlaybackFill {
    pub fn cont(frames: usize) -> Self {
        Self {
            frames,
            control: StreamControl::Continue,
        }
    }

    pub fn complete(frames: usize) -> Self {
        Self {
            frames,
            control: StreamControl::Complete,
        }
    }
}

/// Invoked with each captured block.
pub type CaptureCallback = Box<dyn FnMut(&[i16]) -> StreamControl + Send + 'static>;

/// Invoked with an output slice to fill. Frames past `PlaybackFill::frames`
/// are rendered as silence by the backend.
pub type PlaybackCallback = Box<dyn FnMut(&mut [i16]) -> PlaybackFill + Send + 'static>;

/// An open stream. Dropping it closes the stream.
pub trait PcmStream {
    fn start(&mut self) -> Result<()>;

    /// Stop synchronously: no callback runs after this returns. Calling it on
    /// a stream that already completed is a no-op.
    fn stop(&mut self) -> Result<()>;

    /// Running and the callback has not signalled completion.
    fn is_active(&self) -> bool;

    /// Device clock while the stream runs; `None` once it has stopped.
    fn clock(&self) -> Option<Duration>;
}

pub trait AudioBackend: Send + Sync {
    fn open_capture(
        &self,
        format: &AudioFormat,
        callback: CaptureCallback,
    ) -> Result<Box<dyn PcmStream>>;

    fn open_playback(
        &self,
        format: &AudioFormat,
        callback: PlaybackCallback,
    ) -> Result<Box<dyn PcmStream>>;
}

/// Shared device session.
pub type AudioDevice = Arc<dyn AudioBackend>;

// ---------------------------------------------------------------------------
// Manual backend
// ---------------------------------------------------------------------------

enum ManualCallback {
    Capture(CaptureCallback),
    Playback(PlaybackCallback),
}

struct ManualSlot {
    callback: Option<ManualCallback>,
    running: bool,
    completed: bool,
    frames: u64,
    sample_rate: u32,
}

impl ManualSlot {
    fn is_active(&self) -> bool {
        self.running && !self.completed && self.callback.is_some()
    }
}

type SharedSlot = Arc<Mutex<ManualSlot>>;

#[derive(Default)]
struct ManualState {
    capture: Option<SharedSlot>,
    playback: Option<SharedSlot>,
    unavailable: bool,
}

/// Backend driven by the caller instead of hardware.
///
/// The caller plays the audio thread: [`push_capture`](Self::push_capture)
/// feeds a block to the open capture stream and
/// [`pull_playback`](Self::pull_playback) asks the open playback stream for
/// one. The device clock advances by the frames processed, so timing is
/// deterministic.
#[derive(Clone, Default)]
pub struct ManualBackend {
    state: Arc<Mutex<ManualState>>,
}

impl ManualBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `open_*` calls fail as if the device were busy.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock_state().unavailable = unavailable;
    }

    /// Deliver one captured block. Returns `None` when no capture stream is
    /// running (never opened, stopped, closed or already completed).
    pub fn push_capture(&self, samples: &[i16]) -> Option<StreamControl> {
        let slot = self.lock_state().capture.clone()?;
        let mut slot = slot.lock().unwrap_or_else(|e| e.into_inner());
        if !slot.is_active() {
            return None;
        }
        let control = match slot.callback.as_mut() {
            Some(ManualCallback::Capture(cb)) => cb(samples),
            _ => return None,
        };
        slot.frames += samples.len() as u64;
        if control == StreamControl::Complete {
            slot.completed = true;
        }
        Some(control)
    }

    /// Request `frames` frames from the playback stream. Returns the frames
    /// the callback produced (short on the final block) and its answer.
    pub fn pull_playback(&self, frames: usize) -> Option<(Vec<i16>, StreamControl)> {
        let slot = self.lock_state().playback.clone()?;
        let mut slot = slot.lock().unwrap_or_else(|e| e.into_inner());
        if !slot.is_active() {
            return None;
        }
        let mut out = vec![0i16; frames];
        let fill = match slot.callback.as_mut() {
            Some(ManualCallback::Playback(cb)) => cb(&mut out),
            _ => return None,
        };
        let produced = fill.frames.min(frames);
        out.truncate(produced);
        slot.frames += produced as u64;
        if fill.control == StreamControl::Complete {
            slot.completed = true;
        }
        Some((out, fill.control))
    }

    /// Simulate losing the device: open streams stop as if they had
    /// completed, without their callbacks asking to.
    pub fn disconnect(&self) {
        let state = self.lock_state();
        for slot in [&state.capture, &state.playback].into_iter().flatten() {
            slot.lock().unwrap_or_else(|e| e.into_inner()).completed = true;
        }
    }

    pub fn capture_active(&self) -> bool {
        Self::slot_active(self.lock_state().capture.as_ref())
    }

    pub fn playback_active(&self) -> bool {
        Self::slot_active(self.lock_state().playback.as_ref())
    }

    fn slot_active(slot: Option<&SharedSlot>) -> bool {
        slot.map(|s| s.lock().unwrap_or_else(|e| e.into_inner()).is_active())
            .unwrap_or(false)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn open(&self, format: &AudioFormat, callback: ManualCallback) -> Result<Box<dyn PcmStream>> {
        let mut state = self.lock_state();
        if state.unavailable {
            return Err(StudioError::device("manual device is unavailable"));
        }
        let slot = Arc::new(Mutex::new(ManualSlot {
            callback: None,
            running: false,
            completed: false,
            frames: 0,
            sample_rate: format.sample_rate,
        }));
        let target = match callback {
            ManualCallback::Capture(_) => &mut state.capture,
            ManualCallback::Playback(_) => &mut state.playback,
        };
        let occupied = target.as_ref().map_or(false, |s| {
            s.lock()
                .unwrap_or_else(|e| e.into_inner())
                .callback
                .is_some()
        });
        if occupied {
            return Err(StudioError::device("manual stream already open"));
        }
        slot.lock().unwrap_or_else(|e| e.into_inner()).callback = Some(callback);
        *target = Some(slot.clone());
        Ok(Box::new(ManualStream { slot }))
    }
}

impl AudioBackend for ManualBackend {
    fn open_capture(
        &self,
        format: &AudioFormat,
        callback: CaptureCallback,
    ) -> Result<Box<dyn PcmStream>> {
        self.open(format, ManualCallback::Capture(callback))
    }

    fn open_playback(
        &self,
        format: &AudioFormat,
        callback: PlaybackCallback,
    ) -> Result<Box<dyn PcmStream>> {
        self.open(format, ManualCallback::Playback(callback))
    }
}

struct ManualStream {
    slot: SharedSlot,
}

impl ManualStream {
    fn lock(&self) -> std::sync::MutexGuard<'_, ManualSlot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PcmStream for ManualStream {
    fn start(&mut self) -> Result<()> {
        let mut slot = self.lock();
        if slot.callback.is_none() {
            return Err(StudioError::device("manual stream is closed"));
        }
        slot.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.lock().running = false;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.lock().is_active()
    }

    fn clock(&self) -> Option<Duration> {
        let slot = self.lock();
        if !slot.running {
            return None;
        }
        Some(Duration::from_secs_f64(
            slot.frames as f64 / slot.sample_rate as f64,
        ))
    }
}

impl Drop for ManualStream {
    fn drop(&mut self) {
        let mut slot = self.lock();
        slot.running = false;
        // Releases everything the callback captured (writer queue, reader).
        slot.callback = None;
    }
}
