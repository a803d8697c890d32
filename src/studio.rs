//! Recording studio facade
//!
//! Ties the script navigator to the recorder and player: the current entry
//! picks the file, the lifecycle reducer decides what is allowed, and
//! `poll()` is the single foreground tick that moves captured audio into the
//! display buffer and notices sessions that ended on their own.

use std::path::{Path, PathBuf};

use crate::audio::{
    create_recording_dir, wav_path_for, AudioDevice, AudioFormat, Player, Recorder,
    RecordingSummary, WaveformBuffer,
};
use crate::error::{Result, StudioError};
use crate::script::{ScriptEntry, ScriptNavigator};
use crate::settings::StudioSettings;
use crate::state_machine::{reduce, Effect, Event, State};

/// What one foreground tick observed.
#[derive(Debug, Clone, PartialEq)]
pub struct PollUpdate {
    /// Display samples captured since the previous poll, in order.
    pub samples: Vec<f32>,
    /// Largest magnitude in `samples`.
    pub peak: f32,
    /// Seconds of audio captured into the display since it was last reset.
    pub recorded_secs: f64,
    /// Player time, or -1 before any playback.
    pub playback_secs: f64,
    /// Playback reached the end of the file during this poll.
    pub finished_playback: bool,
    /// A session was torn down during this poll.
    pub fault: Option<String>,
}

pub struct Studio {
    format: AudioFormat,
    recording_dir: PathBuf,
    recorder: Recorder,
    player: Player,
    navigator: ScriptNavigator,
    waveform: WaveformBuffer,
    state: State,
    last_recording: Option<RecordingSummary>,
}

impl Studio {
    /// Build a studio on `device`, creating the recording directory. The
    /// built-in one-line script is loaded.
    pub fn new(device: AudioDevice, settings: &StudioSettings) -> Result<Self> {
        let format = settings.audio_format();
        let recording_dir = create_recording_dir(&settings.recording_dir)?;

        log::info!(
            "Studio ready: dir={:?}, {} Hz, {} frames per buffer",
            recording_dir,
            format.sample_rate,
            format.frames_per_buffer()
        );

        Ok(Self {
            format,
            recording_dir,
            recorder: Recorder::new(device.clone(), format)
                .with_queue_blocks(settings.writer_queue_blocks),
            player: Player::new(device, format),
            navigator: ScriptNavigator::with_default()?,
            waveform: WaveformBuffer::new(format.sample_rate, settings.display_window_secs),
            state: State::Idle,
            last_recording: None,
        })
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    pub fn recording_dir(&self) -> &Path {
        &self.recording_dir
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, State::Recording { .. })
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, State::Playing { .. })
    }

    // -----------------
    // Script
    // -----------------

    pub fn current_entry(&self) -> Option<&ScriptEntry> {
        self.navigator.current()
    }

    /// File the current entry records to and plays from.
    pub fn current_path(&self) -> Option<PathBuf> {
        self.current_entry()
            .map(|entry| wav_path_for(&self.recording_dir, &entry.id))
    }

    pub fn has_prev(&self) -> bool {
        self.navigator.has_prev()
    }

    pub fn has_next(&self) -> bool {
        self.navigator.has_next()
    }

    pub fn position(&self) -> (usize, usize) {
        self.navigator.position()
    }

    pub fn script_label(&self) -> &str {
        self.navigator.label()
    }

    pub fn navigator(&self) -> &ScriptNavigator {
        &self.navigator
    }

    /// Load a script file. Rejected mid-session; a parse failure leaves the
    /// current script and display untouched.
    pub fn load_script(&mut self, path: &Path) -> Result<()> {
        self.navigate(|nav| nav.load(path).map(|()| true))
    }

    /// Advance to the next entry. Returns whether the position moved.
    pub fn next(&mut self) -> Result<bool> {
        self.navigate_moved(ScriptNavigator::next)
    }

    pub fn prev(&mut self) -> Result<bool> {
        self.navigate_moved(ScriptNavigator::prev)
    }

    fn navigate_moved(&mut self, step: fn(&mut ScriptNavigator) -> bool) -> Result<bool> {
        let mut moved = false;
        self.navigate(|nav| {
            moved = step(nav);
            Ok(moved)
        })?;
        Ok(moved)
    }

    fn navigate<F>(&mut self, op: F) -> Result<()>
    where
        F: FnOnce(&mut ScriptNavigator) -> Result<bool>,
    {
        let (next, effects) = reduce(&self.state, Event::Navigate)?;
        if op(&mut self.navigator)? {
            self.apply(next, effects)?;
        }
        Ok(())
    }

    // -----------------
    // Sessions
    // -----------------

    /// Record the current entry. Returns the target file.
    pub fn start_recording(&mut self) -> Result<PathBuf> {
        let (entry_id, path) = self.current_target()?;
        self.dispatch(Event::StartRecord {
            entry_id,
            path: path.clone(),
        })?;
        Ok(path)
    }

    /// Stop recording and finalize the file. Display samples still queued
    /// are moved into the waveform.
    pub fn stop_recording(&mut self) -> Result<RecordingSummary> {
        self.last_recording = None;
        let result = self.dispatch(Event::StopRecord);
        self.absorb_captured();
        result?;
        self.last_recording
            .clone()
            .ok_or_else(|| StudioError::invalid_state("recording produced no summary"))
    }

    /// Play back the current entry's file.
    pub fn start_playback(&mut self) -> Result<()> {
        let (entry_id, path) = self.current_target()?;
        self.dispatch(Event::StartPlay { entry_id, path })
    }

    pub fn stop_playback(&mut self) -> Result<()> {
        self.dispatch(Event::StopPlay)
    }

    pub fn last_recording(&self) -> Option<&RecordingSummary> {
        self.last_recording.as_ref()
    }

    pub fn playback_time(&self) -> f64 {
        self.player.get_current_time()
    }

    pub fn waveform(&self) -> &WaveformBuffer {
        &self.waveform
    }

    /// Foreground tick. Never fails: faults are reported in the update and
    /// the studio returns to idle.
    pub fn poll(&mut self) -> PollUpdate {
        let samples = self.absorb_captured();
        let mut finished_playback = false;
        let mut fault = None;

        let observed = match self.state {
            State::Idle => None,
            State::Recording { .. } => match self.recorder.check_session() {
                Ok(()) => None,
                Err(e) => Some(Event::SessionFault {
                    message: e.to_string(),
                }),
            },
            State::Playing { .. } => match self.player.poll_finished() {
                Ok(true) => Some(Event::PlaybackFinished),
                Ok(false) => None,
                Err(e) => Some(Event::SessionFault {
                    message: e.to_string(),
                }),
            },
        };

        if let Some(event) = observed {
            match &event {
                Event::PlaybackFinished => finished_playback = true,
                Event::SessionFault { message } => fault = Some(message.clone()),
                _ => {}
            }
            if let Err(e) = self.dispatch(event) {
                log::warn!("Poll transition failed: {}", e);
            }
        }

        PollUpdate {
            peak: self.waveform.peak(),
            samples,
            recorded_secs: self.waveform.duration_secs(),
            playback_secs: self.player.get_current_time(),
            finished_playback,
            fault,
        }
    }

    fn absorb_captured(&mut self) -> Vec<f32> {
        let samples: Vec<f32> = self.recorder.get_data().into_iter().flatten().collect();
        self.waveform.push_samples(&samples);
        samples
    }

    fn current_target(&self) -> Result<(String, PathBuf)> {
        let entry = self
            .current_entry()
            .ok_or_else(|| StudioError::invalid_state("no script entry selected"))?;
        Ok((
            entry.id.clone(),
            wav_path_for(&self.recording_dir, &entry.id),
        ))
    }

    fn dispatch(&mut self, event: Event) -> Result<()> {
        log::debug!("Event: {:?} (state: {})", event, self.state.as_str());
        let (next, effects) = reduce(&self.state, event)?;
        self.apply(next, effects)
    }

    /// Run effects in order, then commit `next`. A failed effect leaves the
    /// studio idle: a start that failed never began, and a stop that failed
    /// has still torn its session down.
    fn apply(&mut self, next: State, effects: Vec<Effect>) -> Result<()> {
        for effect in effects {
            if let Err(e) = self.run_effect(effect) {
                self.state = State::Idle;
                return Err(e);
            }
        }
        if next != self.state {
            log::debug!("State: {} -> {}", self.state.as_str(), next.as_str());
        }
        self.state = next;
        Ok(())
    }

    fn run_effect(&mut self, effect: Effect) -> Result<()> {
        match effect {
            Effect::ResetDisplay => {
                self.waveform.clear();
                Ok(())
            }
            Effect::StartRecorder { path } => self.recorder.start(&path),
            Effect::StopRecorder => {
                let summary = self.recorder.stop()?;
                self.last_recording = Some(summary);
                Ok(())
            }
            Effect::StartPlayer { path } => self.player.start(&path),
            Effect::StopPlayer => self.player.stop(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ManualBackend;
    use std::sync::Arc;

    fn studio() -> (tempfile::TempDir, ManualBackend, Studio) {
        let dir = tempfile::tempdir().unwrap();
        let settings = StudioSettings {
            recording_dir: dir.path().join("record"),
            ..StudioSettings::default()
        };
        let backend = ManualBackend::new();
        let studio = Studio::new(Arc::new(backend.clone()), &settings).unwrap();
        (dir, backend, studio)
    }

    #[test]
    fn test_new_creates_dir_and_loads_default_script() {
        let (dir, _backend, studio) = studio();
        assert!(dir.path().join("record").is_dir());
        assert_eq!(studio.script_label(), "A");
        assert_eq!(studio.position(), (1, 1));
        assert_eq!(
            studio.current_path().unwrap(),
            dir.path().join("record").join("A01.wav")
        );
        assert!(studio.state().is_idle());
    }

    #[test]
    fn test_poll_while_idle_is_quiet() {
        let (_dir, _backend, mut studio) = studio();
        let update = studio.poll();
        assert!(update.samples.is_empty());
        assert_eq!(update.peak, 0.0);
        assert_eq!(update.playback_secs, -1.0);
        assert!(!update.finished_playback);
        assert_eq!(update.fault, None);
    }

    #[test]
    fn test_record_poll_stop() {
        let (_dir, backend, mut studio) = studio();
        let path = studio.start_recording().unwrap();
        assert!(studio.is_recording());

        backend.push_capture(&[100; 1600]);
        backend.push_capture(&[-200; 1600]);
        let update = studio.poll();
        assert_eq!(update.samples.len(), 3200);
        assert_eq!(update.peak, 200.0);
        assert!((update.recorded_secs - 0.2).abs() < 1e-9);

        backend.push_capture(&[5; 800]);
        let summary = studio.stop_recording().unwrap();
        assert_eq!(summary.path, path);
        assert_eq!(summary.frames_written, 4000);
        assert!(studio.state().is_idle());
        // The tail captured before stop reached the display.
        assert_eq!(studio.waveform().len(), 4000);
    }

    #[test]
    fn test_record_and_play_are_exclusive() {
        let (_dir, _backend, mut studio) = studio();
        studio.start_recording().unwrap();
        assert!(matches!(
            studio.start_playback(),
            Err(StudioError::InvalidState(_))
        ));
        assert!(matches!(studio.next(), Err(StudioError::InvalidState(_))));
        assert!(studio.is_recording());
        studio.stop_recording().unwrap();
    }

    #[test]
    fn test_failed_playback_start_stays_idle() {
        let (_dir, _backend, mut studio) = studio();
        let err = studio.start_playback().unwrap_err();
        assert!(matches!(err, StudioError::FileNotFound(_)));
        assert!(studio.state().is_idle());
        assert!(matches!(
            studio.stop_playback(),
            Err(StudioError::InvalidState(_))
        ));
    }

    #[test]
    fn test_device_failure_leaves_studio_idle() {
        let (_dir, backend, mut studio) = studio();
        backend.set_unavailable(true);
        assert!(matches!(
            studio.start_recording(),
            Err(StudioError::DeviceUnavailable(_))
        ));
        assert!(studio.state().is_idle());

        backend.set_unavailable(false);
        studio.start_recording().unwrap();
        studio.stop_recording().unwrap();
    }
}
