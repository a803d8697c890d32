//! Studio lifecycle state machine
//!
//! All transitions go through `reduce()`, which returns the next state and
//! the effects the studio must run to get there. Recording and playback
//! share one device session, so at most one of them is active; navigation
//! is only allowed while idle.

use std::path::PathBuf;

use crate::error::{Result, StudioError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum State {
    #[default]
    Idle,
    Recording {
        entry_id: String,
        path: PathBuf,
    },
    Playing {
        entry_id: String,
        path: PathBuf,
    },
}

impl State {
    pub fn is_idle(&self) -> bool {
        matches!(self, State::Idle)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Recording { .. } => "recording",
            State::Playing { .. } => "playing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    StartRecord { entry_id: String, path: PathBuf },
    StopRecord,
    StartPlay { entry_id: String, path: PathBuf },
    StopPlay,
    /// The poller saw the playback stream finish on its own.
    PlaybackFinished,
    /// The poller tore down a session after an audio-thread failure.
    SessionFault { message: String },
    /// Script load or prev/next.
    Navigate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    StartRecorder { path: PathBuf },
    StopRecorder,
    StartPlayer { path: PathBuf },
    StopPlayer,
    /// Drop the displayed waveform.
    ResetDisplay,
}

/// Reducer function: (state, event) -> (next_state, effects)
///
/// Caller errors (starting while busy, stopping while idle, navigating
/// mid-session) are rejected with `InvalidState`. Poller notifications that
/// no longer match the state are ignored.
pub fn reduce(state: &State, event: Event) -> Result<(State, Vec<Effect>)> {
    use Effect::*;
    use Event::*;
    use State::*;

    let next = match (state, event) {
        // -----------------
        // Idle
        // -----------------
        (Idle, StartRecord { entry_id, path }) => (
            Recording {
                entry_id,
                path: path.clone(),
            },
            vec![ResetDisplay, StartRecorder { path }],
        ),
        (Idle, StartPlay { entry_id, path }) => (
            Playing {
                entry_id,
                path: path.clone(),
            },
            vec![StartPlayer { path }],
        ),
        (Idle, Navigate) => (Idle, vec![ResetDisplay]),
        (Idle, StopRecord) => {
            return Err(StudioError::invalid_state("stop record while idle"));
        }
        (Idle, StopPlay) => {
            return Err(StudioError::invalid_state("stop playback while idle"));
        }

        // -----------------
        // Recording
        // -----------------
        (Recording { .. }, StopRecord) => (Idle, vec![StopRecorder]),
        (Recording { entry_id, .. }, SessionFault { message }) => {
            log::warn!("Recording of {} aborted: {}", entry_id, message);
            (Idle, vec![])
        }

        // -----------------
        // Playing
        // -----------------
        (Playing { .. }, StopPlay) => (Idle, vec![StopPlayer]),
        (Playing { .. }, PlaybackFinished) => (Idle, vec![]),
        (Playing { entry_id, .. }, SessionFault { message }) => {
            log::warn!("Playback of {} aborted: {}", entry_id, message);
            (Idle, vec![])
        }

        // -----------------
        // Stale poller notifications (drop silently)
        // -----------------
        (_, PlaybackFinished) | (_, SessionFault { .. }) => (state.clone(), vec![]),

        // -----------------
        // Busy
        // -----------------
        (busy, event) => {
            return Err(StudioError::invalid_state(format!(
                "{:?} rejected while {}",
                event,
                busy.as_str()
            )));
        }
    };

    Ok(next)
}
