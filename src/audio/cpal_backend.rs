//! Hardware backend using CPAL
//!
//! Streams are opened mono at 16 kHz. i16 is preferred; devices that only
//! offer f32 or u16 at that rate are converted sample by sample inside the
//! callback. The callback period is fixed to the format's buffer length when
//! the device accepts it, otherwise the device default is used.
//!
//! Nothing is resampled or downmixed. A device without a native mono 16 kHz
//! configuration (many built-in cards offer only 48 kHz stereo) fails with
//! [`StudioError::DeviceUnavailable`]. Supporting those would take a
//! conversion stage between the device callback and the session callback:
//! average the channels to mono, then resample with `rubato`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, Device, FromSample, Sample, SampleFormat, SampleRate, SizedSample, Stream,
    StreamConfig, SupportedBufferSize,
};

use super::device::{AudioBackend, CaptureCallback, PcmStream, PlaybackCallback, StreamControl};
use super::AudioFormat;
use crate::error::{Result, StudioError};

/// Order in which device sample formats are tried.
const PREFERRED_FORMATS: [SampleFormat; 3] = [SampleFormat::I16, SampleFormat::F32, SampleFormat::U16];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Capture,
    Playback,
}

/// Default host input/output devices.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }

    fn device(direction: Direction) -> Result<Device> {
        let host = cpal::default_host();
        let device = match direction {
            Direction::Capture => host.default_input_device(),
            Direction::Playback => host.default_output_device(),
        };
        let device = device.ok_or_else(|| match direction {
            Direction::Capture => StudioError::device("No audio input device found"),
            Direction::Playback => StudioError::device("No audio output device found"),
        })?;
        log::info!(
            "Using audio {:?} device: {}",
            direction,
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );
        Ok(device)
    }

    /// Pick a sample format and stream config for the fixed mono format.
    fn negotiate(
        device: &Device,
        direction: Direction,
        format: &AudioFormat,
    ) -> Result<(SampleFormat, StreamConfig)> {
        let ranges: Vec<_> = match direction {
            Direction::Capture => device
                .supported_input_configs()
                .map_err(|e| StudioError::device(e.to_string()))?
                .collect(),
            Direction::Playback => device
                .supported_output_configs()
                .map_err(|e| StudioError::device(e.to_string()))?
                .collect(),
        };

        let rate = SampleRate(format.sample_rate);
        let frames = format.frames_per_buffer() as u32;

        for wanted in PREFERRED_FORMATS {
            let range = ranges.iter().find(|r| {
                r.channels() == format.channels
                    && r.sample_format() == wanted
                    && r.min_sample_rate() <= rate
                    && r.max_sample_rate() >= rate
            });
            if let Some(range) = range {
                let buffer_size = match range.buffer_size() {
                    SupportedBufferSize::Range { min, max } if *min <= frames && frames <= *max => {
                        BufferSize::Fixed(frames)
                    }
                    _ => {
                        log::debug!(
                            "Device does not accept {} frame buffers, using default",
                            frames
                        );
                        BufferSize::Default
                    }
                };
                let config = StreamConfig {
                    channels: format.channels,
                    sample_rate: rate,
                    buffer_size,
                };
                log::info!(
                    "Audio config: {} Hz, {} channels, {:?}, {:?}",
                    rate.0,
                    format.channels,
                    wanted,
                    config.buffer_size
                );
                return Ok((wanted, config));
            }
        }

        // No conversion stage: see the module docs.
        Err(StudioError::device(format!(
            "Device supports no mono {} Hz configuration",
            format.sample_rate
        )))
    }
}

impl AudioBackend for CpalBackend {
    fn open_capture(
        &self,
        format: &AudioFormat,
        callback: CaptureCallback,
    ) -> Result<Box<dyn PcmStream>> {
        let device = Self::device(Direction::Capture)?;
        let (sample_format, config) = Self::negotiate(&device, Direction::Capture, format)?;
        let shared = Arc::new(StreamShared::default());
        let frames = format.frames_per_buffer();

        let stream = match sample_format {
            SampleFormat::I16 => {
                build_capture::<i16>(&device, &config, callback, shared.clone(), frames)
            }
            SampleFormat::F32 => {
                build_capture::<f32>(&device, &config, callback, shared.clone(), frames)
            }
            SampleFormat::U16 => {
                build_capture::<u16>(&device, &config, callback, shared.clone(), frames)
            }
            other => {
                return Err(StudioError::device(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        }?;

        Ok(Box::new(CpalStream { stream, shared }))
    }

    fn open_playback(
        &self,
        format: &AudioFormat,
        callback: PlaybackCallback,
    ) -> Result<Box<dyn PcmStream>> {
        let device = Self::device(Direction::Playback)?;
        let (sample_format, config) = Self::negotiate(&device, Direction::Playback, format)?;
        let shared = Arc::new(StreamShared::default());
        let frames = format.frames_per_buffer();

        let stream = match sample_format {
            SampleFormat::I16 => {
                build_playback::<i16>(&device, &config, callback, shared.clone(), frames)
            }
            SampleFormat::F32 => {
                build_playback::<f32>(&device, &config, callback, shared.clone(), frames)
            }
            SampleFormat::U16 => {
                build_playback::<u16>(&device, &config, callback, shared.clone(), frames)
            }
            other => {
                return Err(StudioError::device(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        }?;

        Ok(Box::new(CpalStream { stream, shared }))
    }
}

/// State shared between a stream's callback and its owner.
#[derive(Default)]
struct StreamShared {
    /// Callback answered `Complete`.
    completed: AtomicBool,
    /// Stream error reported by the host.
    failed: AtomicBool,
    playing: AtomicBool,
    started_at: Mutex<Option<Instant>>,
}

fn error_callback(shared: Arc<StreamShared>) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| {
        log::error!("Audio stream error: {}", err);
        shared.failed.store(true, Ordering::SeqCst);
    }
}

fn build_capture<T>(
    device: &Device,
    config: &StreamConfig,
    mut callback: CaptureCallback,
    shared: Arc<StreamShared>,
    frames: usize,
) -> Result<Stream>
where
    T: SizedSample + Send + 'static,
    i16: FromSample<T>,
{
    let mut scratch: Vec<i16> = Vec::with_capacity(frames);
    let cb_shared = shared.clone();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if cb_shared.completed.load(Ordering::Acquire) {
                    return;
                }
                scratch.clear();
                scratch.extend(data.iter().map(|&s| i16::from_sample(s)));
                if callback(&scratch) == StreamControl::Complete {
                    cb_shared.completed.store(true, Ordering::Release);
                }
            },
            error_callback(shared),
            None,
        )
        .map_err(|e| StudioError::device(format!("Failed to create audio stream: {}", e)))
}

fn build_playback<T>(
    device: &Device,
    config: &StreamConfig,
    mut callback: PlaybackCallback,
    shared: Arc<StreamShared>,
    frames: usize,
) -> Result<Stream>
where
    T: SizedSample + FromSample<i16> + Send + 'static,
{
    let mut scratch: Vec<i16> = Vec::with_capacity(frames);
    let cb_shared = shared.clone();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if cb_shared.completed.load(Ordering::Acquire) {
                    data.fill(T::EQUILIBRIUM);
                    return;
                }
                scratch.clear();
                scratch.resize(data.len(), 0);
                let fill = callback(&mut scratch);
                let produced = fill.frames.min(data.len());
                for (dst, &src) in data[..produced].iter_mut().zip(&scratch[..produced]) {
                    *dst = T::from_sample(src);
                }
                data[produced..].fill(T::EQUILIBRIUM);
                if fill.control == StreamControl::Complete {
                    cb_shared.completed.store(true, Ordering::Release);
                }
            },
            error_callback(shared),
            None,
        )
        .map_err(|e| StudioError::device(format!("Failed to create audio stream: {}", e)))
}

struct CpalStream {
    stream: Stream,
    shared: Arc<StreamShared>,
}

impl PcmStream for CpalStream {
    fn start(&mut self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| StudioError::device(format!("Failed to start stream: {}", e)))?;
        *self
            .shared
            .started_at
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
        self.shared.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if !self.shared.playing.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.stream
            .pause()
            .map_err(|e| StudioError::device(format!("Failed to stop stream: {}", e)))
    }

    fn is_active(&self) -> bool {
        self.shared.playing.load(Ordering::SeqCst)
            && !self.shared.completed.load(Ordering::Acquire)
            && !self.shared.failed.load(Ordering::SeqCst)
    }

    fn clock(&self) -> Option<Duration> {
        if !self.shared.playing.load(Ordering::SeqCst) {
            return None;
        }
        self.shared
            .started_at
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map(|t| t.elapsed())
    }
}

/// Name and default rate of a host device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub is_input: bool,
}

/// Enumerate host input and output devices.
pub fn list_devices() -> Vec<DeviceInfo> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    if let Ok(inputs) = host.input_devices() {
        for device in inputs {
            if let Ok(config) = device.default_input_config() {
                devices.push(DeviceInfo {
                    name: device.name().unwrap_or_else(|_| "Unknown".to_string()),
                    sample_rate: config.sample_rate().0,
                    channels: config.channels(),
                    is_input: true,
                });
            }
        }
    }
    if let Ok(outputs) = host.output_devices() {
        for device in outputs {
            if let Ok(config) = device.default_output_config() {
                devices.push(DeviceInfo {
                    name: device.name().unwrap_or_else(|_| "Unknown".to_string()),
                    sample_rate: config.sample_rate().0,
                    channels: config.channels(),
                    is_input: false,
                });
            }
        }
    }
    devices
}
