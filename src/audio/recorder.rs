//! Audio recorder: capture stream → WAV file + display queue
//!
//! A recording session owns a capture stream and a WAV writer thread. Each
//! callback hands the raw block to the writer, publishes a display copy to the
//! [`CaptureBuffer`], then checks the stop flag. Stopping is cooperative: the
//! flag is set, the stream is stopped and closed, and only then is the WAV
//! finalized.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};

use super::capture_buffer::CaptureBuffer;
use super::device::{AudioDevice, CaptureCallback, PcmStream, StreamControl};
use super::paths::rotate_existing;
use super::writer::{WriterHandle, WriterMsg};
use super::{AudioFormat, DisplayBlock, SessionFault};
use crate::error::{Result, StudioError};

/// Blocks the writer queue can hold before the callback gives up (~25 s at
/// 0.1 s periods).
pub const DEFAULT_WRITER_QUEUE_BLOCKS: usize = 256;

/// Outcome of a finished recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSummary {
    pub path: PathBuf,
    pub frames_written: u64,
    pub bytes_written: u64,
    pub duration_secs: f64,
}

struct RecordingSession {
    path: PathBuf,
    stop_requested: Arc<AtomicBool>,
    fault: SessionFault,
    stream: Box<dyn PcmStream>,
    writer: WriterHandle,
}

/// Records the shared device's input to one WAV file at a time.
pub struct Recorder {
    device: AudioDevice,
    format: AudioFormat,
    queue_blocks: usize,
    buffer: CaptureBuffer,
    session: Option<RecordingSession>,
}

impl Recorder {
    pub fn new(device: AudioDevice, format: AudioFormat) -> Self {
        Self {
            device,
            format,
            queue_blocks: DEFAULT_WRITER_QUEUE_BLOCKS,
            buffer: CaptureBuffer::new(),
            session: None,
        }
    }

    pub fn with_queue_blocks(mut self, blocks: usize) -> Self {
        self.queue_blocks = blocks.max(1);
        self
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.path.as_path())
    }

    /// Start recording to `path`, rotating any earlier take out of the way.
    pub fn start(&mut self, path: &Path) -> Result<()> {
        if self.session.is_some() {
            return Err(StudioError::invalid_state("recording already in progress"));
        }

        rotate_existing(path)?;

        let fault = SessionFault::new();
        let writer = WriterHandle::spawn(path, &self.format, self.queue_blocks, fault.clone())?;
        let stop_requested = Arc::new(AtomicBool::new(false));
        self.buffer.clear();

        let callback = capture_callback(
            writer.sender(),
            self.buffer.clone(),
            stop_requested.clone(),
            fault.clone(),
        );

        let mut stream = match self.device.open_capture(&self.format, callback) {
            Ok(stream) => stream,
            Err(e) => {
                discard(writer, path);
                return Err(e);
            }
        };
        if let Err(e) = stream.start() {
            drop(stream);
            discard(writer, path);
            return Err(e);
        }

        log::info!("Recording started: {:?}", path);

        self.session = Some(RecordingSession {
            path: path.to_path_buf(),
            stop_requested,
            fault,
            stream,
            writer,
        });
        Ok(())
    }

    /// Blocks captured since the previous call, in capture order.
    pub fn get_data(&self) -> Vec<DisplayBlock> {
        self.buffer.drain()
    }

    /// Ask the audio thread to finish after its next block without waiting.
    pub fn request_stop(&self) -> Result<()> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| StudioError::invalid_state("not recording"))?;
        session.stop_requested.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stop capture, close the stream, then finalize the WAV.
    pub fn stop(&mut self) -> Result<RecordingSummary> {
        let session = self
            .session
            .take()
            .ok_or_else(|| StudioError::invalid_state("not recording"))?;
        self.finish_session(session)
    }

    /// Foreground health check. A fault raised on the audio or writer thread,
    /// or a stream that ended without being asked to, tears the session down.
    pub fn check_session(&mut self) -> Result<()> {
        let Some(session) = self.session.as_ref() else {
            return Ok(());
        };

        let reason = session.fault.message().or_else(|| {
            let asked = session.stop_requested.load(Ordering::SeqCst);
            (!asked && !session.stream.is_active())
                .then(|| "capture stream stopped unexpectedly".to_string())
        });

        match reason {
            Some(reason) => {
                log::error!("Recording aborted: {}", reason);
                if let Some(session) = self.session.take() {
                    session.fault.raise(reason.clone());
                    if let Err(e) = self.finish_session(session) {
                        log::debug!("Teardown after fault: {}", e);
                    }
                }
                Err(StudioError::SessionFault(reason))
            }
            None => Ok(()),
        }
    }

    fn finish_session(&mut self, session: RecordingSession) -> Result<RecordingSummary> {
        let RecordingSession {
            path,
            stop_requested,
            fault,
            mut stream,
            writer,
            ..
        } = session;

        stop_requested.store(true, Ordering::SeqCst);
        if let Err(e) = stream.stop() {
            log::warn!("Stopping capture stream: {}", e);
        }
        drop(stream);

        let totals = writer.finish()?;
        if let Some(msg) = fault.message() {
            return Err(StudioError::SessionFault(msg));
        }

        let summary = RecordingSummary {
            path,
            frames_written: totals.frames,
            bytes_written: totals.bytes,
            duration_secs: self.format.frames_to_secs(totals.frames),
        };
        log::info!(
            "Recording stopped, WAV finalized: {:?} ({:.2}s)",
            summary.path,
            summary.duration_secs
        );
        Ok(summary)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = self.finish_session(session) {
                log::warn!("Recording closed with error: {}", e);
            }
        }
    }
}

/// Finalize and delete a file created for a session that never started.
fn discard(writer: WriterHandle, path: &Path) {
    if let Err(e) = writer.finish() {
        log::debug!("Discarding {:?}: {}", path, e);
    }
    if let Err(e) = std::fs::remove_file(path) {
        log::warn!("Could not remove unused {:?}: {}", path, e);
    }
}

fn capture_callback(
    tx: mpsc::Sender<WriterMsg>,
    buffer: CaptureBuffer,
    stop_requested: Arc<AtomicBool>,
    fault: SessionFault,
) -> CaptureCallback {
    let mut finished = false;

    Box::new(move |data: &[i16]| {
        if finished {
            return StreamControl::Complete;
        }

        if let Err(e) = tx.try_send(WriterMsg::Block(data.to_vec())) {
            let reason = match e {
                TrySendError::Full(_) => "WAV writer queue overflow",
                TrySendError::Closed(_) => "WAV writer closed",
            };
            log::error!("Capture callback: {}", reason);
            fault.raise(reason);
            finished = true;
            return StreamControl::Complete;
        }

        buffer.enqueue(to_display(data));

        if stop_requested.load(Ordering::SeqCst) {
            finished = true;
            StreamControl::Complete
        } else {
            StreamControl::Continue
        }
    })
}

/// Plain amplitude values (±32768), as plotted and metered.
fn to_display(data: &[i16]) -> DisplayBlock {
    data.iter().map(|&s| s as f32).collect()
}
