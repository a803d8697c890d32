//! Dedicated WAV writer thread
//!
//! The capture callback never touches the file. It pushes each raw block
//! into a bounded queue with `try_send`; this thread appends the samples to
//! the WAV body and finalizes the header when told to finish.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hound::WavWriter;
use tokio::sync::mpsc;

use super::{AudioFormat, SampleBlock, SessionFault};
use crate::error::{Result, StudioError};

type FileWriter = WavWriter<BufWriter<File>>;

#[derive(Debug)]
pub(crate) enum WriterMsg {
    Block(SampleBlock),
    Finish,
}

/// Totals reported once the file is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WriteTotals {
    pub frames: u64,
    pub bytes: u64,
}

pub(crate) struct WriterHandle {
    tx: mpsc::Sender<WriterMsg>,
    join: Option<JoinHandle<Result<WriteTotals>>>,
    path: PathBuf,
}

impl WriterHandle {
    /// Create the WAV file and start the writer thread. The file exists with
    /// a valid header before this returns.
    pub fn spawn(
        path: &Path,
        format: &AudioFormat,
        queue_blocks: usize,
        fault: SessionFault,
    ) -> Result<Self> {
        let writer = WavWriter::create(path, format.wav_spec()).map_err(|e| match e {
            hound::Error::IoError(io) => StudioError::fs(path, io),
            other => StudioError::fs(
                path,
                std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
            ),
        })?;

        let (tx, rx) = mpsc::channel(queue_blocks.max(1));
        let thread_path = path.to_path_buf();
        let bytes_per_frame = format.bytes_per_frame() as u64;

        let join = thread::Builder::new()
            .name("wav-writer".into())
            .spawn(move || write_loop(writer, rx, thread_path, bytes_per_frame, fault))
            .map_err(StudioError::Io)?;

        Ok(Self {
            tx,
            join: Some(join),
            path: path.to_path_buf(),
        })
    }

    /// Sender for the capture callback.
    pub fn sender(&self) -> mpsc::Sender<WriterMsg> {
        self.tx.clone()
    }

    /// Flush everything queued so far, finalize the header and close the
    /// file. Must be called after the capture stream is closed.
    pub fn finish(mut self) -> Result<WriteTotals> {
        self.send_finish();
        self.join_thread()
    }

    // `blocking_send` would panic when called from inside the polling
    // runtime, so spin on `try_send` instead. Nothing else sends once the
    // stream is closed, so the queue only drains from here.
    fn send_finish(&self) {
        let mut msg = WriterMsg::Finish;
        loop {
            match self.tx.try_send(msg) {
                Ok(()) => return,
                Err(mpsc::error::TrySendError::Full(back)) => {
                    msg = back;
                    thread::sleep(Duration::from_millis(1));
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    log::warn!("WAV writer for {:?} exited before finish", self.path);
                    return;
                }
            }
        }
    }

    fn join_thread(&mut self) -> Result<WriteTotals> {
        match self.join.take() {
            Some(join) => join
                .join()
                .map_err(|_| StudioError::SessionFault("WAV writer thread panicked".into()))?,
            None => Err(StudioError::invalid_state("writer already finished")),
        }
    }
}

impl Drop for WriterHandle {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.send_finish();
            if let Err(e) = self.join_thread() {
                log::warn!("WAV writer for {:?} closed with error: {}", self.path, e);
            }
        }
    }
}

fn write_loop(
    mut writer: FileWriter,
    mut rx: mpsc::Receiver<WriterMsg>,
    path: PathBuf,
    bytes_per_frame: u64,
    fault: SessionFault,
) -> Result<WriteTotals> {
    let mut frames: u64 = 0;
    let mut write_error: Option<StudioError> = None;

    while let Some(msg) = rx.blocking_recv() {
        match msg {
            WriterMsg::Block(block) => {
                if write_error.is_some() {
                    continue;
                }
                match write_block(&mut writer, &block) {
                    Ok(()) => frames += block.len() as u64,
                    Err(e) => {
                        log::error!("Failed to write audio data to {:?}: {}", path, e);
                        fault.raise(format!("write to {:?} failed: {}", path, e));
                        write_error = Some(StudioError::SessionFault(e.to_string()));
                    }
                }
            }
            WriterMsg::Finish => break,
        }
    }

    writer.finalize().map_err(|e| match e {
        hound::Error::IoError(io) => StudioError::fs(&path, io),
        other => StudioError::SessionFault(other.to_string()),
    })?;

    if let Some(err) = write_error {
        return Err(err);
    }

    log::debug!("WAV finalized: {:?} ({} frames)", path, frames);
    Ok(WriteTotals {
        frames,
        bytes: frames * bytes_per_frame,
    })
}

fn write_block(writer: &mut FileWriter, block: &[i16]) -> hound::Result<()> {
    let mut samples = writer.get_i16_writer(block.len() as u32);
    for &s in block {
        samples.write_sample(s);
    }
    samples.flush()
}
