//! End-to-end studio sessions against the manual audio backend
//!
//! The test plays the audio thread: `push_capture` delivers captured blocks
//! and `pull_playback` consumes played ones, so every run is deterministic
//! and needs no sound card.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arayuru_lib::audio::{ManualBackend, StreamControl};
use arayuru_lib::{Studio, StudioError, StudioSettings};

const BLOCK: usize = 1600;

struct Fixture {
    dir: tempfile::TempDir,
    backend: ManualBackend,
    studio: Studio,
}

impl Fixture {
    fn new() -> Self {
        Self::with_settings(StudioSettings::default())
    }

    fn with_settings(settings: StudioSettings) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let settings = StudioSettings {
            recording_dir: dir.path().join("record"),
            ..settings
        };
        let backend = ManualBackend::new();
        let studio = Studio::new(Arc::new(backend.clone()), &settings).unwrap();
        Self {
            dir,
            backend,
            studio,
        }
    }

    fn record_dir(&self) -> PathBuf {
        self.dir.path().join("record")
    }

    fn load_script(&mut self, text: &str) {
        let path = self.dir.path().join("script.txt");
        std::fs::write(&path, text).unwrap();
        self.studio.load_script(&path).unwrap();
    }

    /// One take of `blocks` constant-valued blocks.
    fn record_take(&mut self, value: i16, blocks: usize) -> PathBuf {
        let path = self.studio.start_recording().unwrap();
        for _ in 0..blocks {
            assert_eq!(
                self.backend.push_capture(&[value; BLOCK]),
                Some(StreamControl::Continue)
            );
        }
        self.studio.poll();
        self.studio.stop_recording().unwrap();
        path
    }
}

fn read_samples(path: &Path) -> Vec<i16> {
    hound::WavReader::open(path)
        .unwrap()
        .into_samples::<i16>()
        .map(|s| s.unwrap())
        .collect()
}

#[test]
fn record_then_play_back_a_script_entry() {
    let mut fx = Fixture::new();
    fx.load_script("# demo\nA01 こんにちは\nA02 さようなら ありがとう\n");
    assert_eq!(fx.studio.position(), (1, 2));
    assert!(!fx.studio.has_prev());
    assert!(fx.studio.has_next());

    assert!(fx.studio.next().unwrap());
    let entry = fx.studio.current_entry().unwrap();
    assert_eq!(entry.id, "A02");
    assert_eq!(entry.pronunciation.as_deref(), Some("ありがとう"));

    let path = fx.record_take(1234, 3);
    assert_eq!(path, fx.record_dir().join("A02.wav"));
    assert_eq!(fx.studio.last_recording().unwrap().frames_written, 3 * BLOCK as u64);

    let reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(reader.spec().channels, 1);
    assert_eq!(reader.spec().sample_rate, 16_000);
    assert_eq!(reader.spec().bits_per_sample, 16);
    assert_eq!(read_samples(&path), vec![1234; 3 * BLOCK]);

    // Play: three full blocks, then an empty final one.
    fx.studio.start_playback().unwrap();
    assert!(fx.studio.is_playing());
    let mut played = Vec::new();
    loop {
        let (block, control) = fx.backend.pull_playback(BLOCK).unwrap();
        played.extend(block);
        let update = fx.studio.poll();
        if control == StreamControl::Complete {
            assert!(update.finished_playback);
            assert!((update.playback_secs - 0.3).abs() < 1e-9);
            break;
        }
        assert!(!update.finished_playback);
        assert!(update.playback_secs > 0.0);
    }
    assert_eq!(played, vec![1234; 3 * BLOCK]);
    assert!(fx.studio.state().is_idle());

    // Time stays at the total once finished.
    let later = fx.studio.poll();
    assert!((later.playback_secs - 0.3).abs() < 1e-9);
    assert!(!later.finished_playback);
}

#[test]
fn re_recording_rotates_earlier_takes() {
    let mut fx = Fixture::new();
    fx.record_take(1, 1);
    fx.record_take(2, 1);
    fx.record_take(3, 2);

    let dir = fx.record_dir();
    assert_eq!(read_samples(&dir.join("A01.wav")), vec![3; 2 * BLOCK]);
    assert_eq!(read_samples(&dir.join("A01,01.wav")), vec![2; BLOCK]);
    assert_eq!(read_samples(&dir.join("A01,02.wav")), vec![1; BLOCK]);
    assert!(!dir.join("A01,03.wav").exists());
}

#[test]
fn poll_drains_blocks_in_order_and_reset_on_navigation() {
    let mut fx = Fixture::new();
    fx.load_script("A01 one\nA02 two\n");

    fx.studio.start_recording().unwrap();
    fx.backend.push_capture(&[10; BLOCK]);
    let first = fx.studio.poll();
    fx.backend.push_capture(&[-20; BLOCK]);
    fx.backend.push_capture(&[30; BLOCK]);
    let second = fx.studio.poll();
    let third = fx.studio.poll();

    assert_eq!(first.samples, vec![10.0; BLOCK]);
    assert_eq!(first.peak, 10.0);
    let mut expected = vec![-20.0; BLOCK];
    expected.extend(vec![30.0; BLOCK]);
    assert_eq!(second.samples, expected);
    assert_eq!(second.peak, 30.0);
    assert!(third.samples.is_empty());
    assert!((third.recorded_secs - 0.3).abs() < 1e-9);

    // Navigation is refused mid-session and leaves everything in place.
    assert!(matches!(fx.studio.next(), Err(StudioError::InvalidState(_))));
    assert_eq!(fx.studio.position(), (1, 2));

    fx.studio.stop_recording().unwrap();
    assert_eq!(fx.studio.waveform().len(), 3 * BLOCK);

    assert!(fx.studio.next().unwrap());
    assert!(fx.studio.waveform().is_empty());

    // A no-op move at the end keeps the display.
    fx.record_take(5, 1);
    assert!(!fx.studio.next().unwrap());
    assert_eq!(fx.studio.waveform().len(), BLOCK);
}

#[test]
fn stop_mid_playback_freezes_time() {
    let mut fx = Fixture::new();
    fx.record_take(7, 10);

    fx.studio.start_playback().unwrap();
    fx.backend.pull_playback(BLOCK).unwrap();
    fx.backend.pull_playback(BLOCK).unwrap();
    fx.studio.stop_playback().unwrap();

    assert!(fx.studio.state().is_idle());
    assert!(!fx.backend.playback_active());
    assert!((fx.studio.playback_time() - 0.2).abs() < 1e-9);
    assert!(matches!(
        fx.studio.stop_playback(),
        Err(StudioError::InvalidState(_))
    ));
}

#[test]
fn device_loss_during_recording_keeps_the_partial_take() {
    let mut fx = Fixture::new();
    let path = fx.studio.start_recording().unwrap();
    fx.backend.push_capture(&[9; BLOCK]);
    fx.backend.disconnect();

    let update = fx.studio.poll();
    assert!(update.fault.is_some());
    assert_eq!(update.samples, vec![9.0; BLOCK]);
    assert!(fx.studio.state().is_idle());
    assert_eq!(read_samples(&path), vec![9; BLOCK]);

    // The studio can record again afterwards.
    fx.record_take(4, 1);
    assert_eq!(read_samples(&path), vec![4; BLOCK]);
    assert_eq!(read_samples(&fx.record_dir().join("A01,01.wav")), vec![9; BLOCK]);
}

#[test]
fn writer_queue_overflow_aborts_the_take() {
    const LARGE: usize = 10 * BLOCK;
    let mut fx = Fixture::with_settings(StudioSettings {
        writer_queue_blocks: 1,
        ..StudioSettings::default()
    });
    let path = fx.studio.start_recording().unwrap();

    // Blocks arrive faster than the writer drains a one-slot queue.
    let mut accepted = 0;
    let mut overflowed = false;
    for _ in 0..500 {
        match fx.backend.push_capture(&[7; LARGE]) {
            Some(StreamControl::Continue) => accepted += 1,
            Some(StreamControl::Complete) => {
                overflowed = true;
                break;
            }
            None => panic!("capture stream closed unexpectedly"),
        }
    }
    assert!(overflowed, "queue never filled after {} blocks", accepted);
    assert!(!fx.backend.capture_active());

    let update = fx.studio.poll();
    let fault = update.fault.expect("overflow surfaces as a fault");
    assert!(fault.contains("WAV writer queue overflow"), "{}", fault);
    assert_eq!(update.samples.len(), accepted * LARGE);
    assert!(fx.studio.state().is_idle());
    assert!(!fx.studio.is_recording());

    // Every accepted block reached the file and the header is finalized.
    assert_eq!(read_samples(&path), vec![7; accepted * LARGE]);
}

#[test]
fn bad_script_keeps_current_one() {
    let mut fx = Fixture::new();
    fx.load_script("B01 first\nB02 second\n");
    fx.studio.next().unwrap();

    let bad = fx.dir.path().join("bad.txt");
    std::fs::write(&bad, "# only comments\n").unwrap();
    assert!(matches!(
        fx.studio.load_script(&bad),
        Err(StudioError::EmptyScript(_))
    ));
    assert_eq!(fx.studio.position(), (2, 2));
    assert_eq!(fx.studio.current_entry().unwrap().id, "B02");
    assert_eq!(fx.studio.script_label(), "script.txt");
}

#[test]
fn settings_shape_the_audio_format() {
    let fx = Fixture::with_settings(StudioSettings {
        buffer_duration_ms: 200,
        ..StudioSettings::default()
    });
    assert_eq!(fx.studio.format().frames_per_buffer(), 3200);
    assert!(fx.record_dir().is_dir());
}
