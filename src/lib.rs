//! Speech-corpus recording core
//!
//! An operator steps through a script of prompts, records each utterance to
//! `record/{id}.wav`, plays it back and re-records as needed. Earlier takes
//! are rotated to `{id},01.wav`, `{id},02.wav`, ... instead of being
//! overwritten.
//!
//! [`Studio`] is the entry point for a front end. It owns the [`Recorder`],
//! [`Player`] and [`ScriptNavigator`] on one shared [`AudioDevice`]; a front
//! end calls its operations and renders what [`Studio::poll`] reports.
//!
//! [`Recorder`]: audio::Recorder
//! [`Player`]: audio::Player
//! [`AudioDevice`]: audio::AudioDevice

pub mod audio;
mod cli;
pub mod error;
pub mod script;
pub mod settings;
pub mod state_machine;
pub mod studio;

pub use error::{Result, StudioError};
pub use script::{ScriptEntry, ScriptNavigator};
pub use settings::StudioSettings;
pub use studio::{PollUpdate, Studio};

/// Run the terminal front end with the process arguments.
pub fn run() -> Result<()> {
    cli::run()
}
