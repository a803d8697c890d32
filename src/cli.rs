//! Terminal front end
//!
//! One command per line on stdin:
//!
//! | key | action            |
//! |-----|-------------------|
//! | `r` | start/stop record |
//! | `p` | start/stop play   |
//! | `n` | next entry        |
//! | `b` | previous entry    |
//! | `s` | show entry        |
//! | `q` | quit              |

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

use crate::audio::levels::analyze_wav;
use crate::audio::waveform::LevelMeter;
use crate::audio::{cpal_backend, CpalBackend};
use crate::error::{Result, StudioError};
use crate::settings::{default_settings_path, load_settings, save_settings, StudioSettings};
use crate::studio::{PollUpdate, Studio};

/// Bars in the recording meter, oldest audio on the left.
const METER_BARS: usize = 24;

const METER_LEVELS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

#[derive(Parser, Debug)]
#[command(version, about = "Record a speech corpus one prompt at a time", long_about = None)]
pub struct Args {
    /// Script file: one `id prompt [pronunciation]` per line
    pub script: Option<PathBuf>,

    /// Settings file (JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory recordings are written to
    #[arg(short, long)]
    pub record_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Print audio devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Write the resolved settings to the settings file and exit
    #[arg(long)]
    pub save_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Record,
    Play,
    Next,
    Prev,
    Show,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "r" => Some(Command::Record),
            "p" => Some(Command::Play),
            "n" => Some(Command::Next),
            "b" => Some(Command::Prev),
            "s" => Some(Command::Show),
            "q" => Some(Command::Quit),
            _ => None,
        }
    }
}

pub fn run() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if args.list_devices {
        print_devices();
        return Ok(());
    }

    let settings = resolve_settings(&args);
    if args.save_config {
        let path = write_settings(&args, &settings)?;
        println!("settings written to {}", path.display());
        return Ok(());
    }

    let mut studio = Studio::new(Arc::new(CpalBackend::new()), &settings)?;
    if let Some(script) = args.script.as_deref() {
        studio.load_script(script)?;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    runtime.block_on(event_loop(&mut studio, settings.poll_interval()))?;
    Ok(())
}

fn settings_path(args: &Args) -> Option<PathBuf> {
    args.config.clone().or_else(default_settings_path)
}

fn resolve_settings(args: &Args) -> StudioSettings {
    let mut settings = match settings_path(args) {
        Some(path) => {
            log::debug!("Settings: {:?}", path);
            load_settings(&path)
        }
        None => StudioSettings::default(),
    };
    if let Some(dir) = &args.record_dir {
        settings.recording_dir = dir.clone();
    }
    settings
}

fn write_settings(args: &Args, settings: &StudioSettings) -> Result<PathBuf> {
    let path = settings_path(args)
        .ok_or_else(|| StudioError::Settings("no config directory; pass --config".into()))?;
    save_settings(&path, settings)?;
    Ok(path)
}

fn print_devices() {
    for device in cpal_backend::list_devices() {
        println!(
            "{:<6} {} ({} Hz, {} ch)",
            if device.is_input { "input" } else { "output" },
            device.name,
            device.sample_rate,
            device.channels
        );
    }
}

/// Forward stdin lines from a blocking reader thread.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    let spawned = thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        log::error!("Failed to start stdin reader: {}", e);
    }
    rx
}

async fn event_loop(studio: &mut Studio, poll_interval: std::time::Duration) -> Result<()> {
    let mut lines = spawn_stdin_reader();
    let mut tick = interval(poll_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut meter = LevelMeter::<METER_BARS>::new();

    println!("r: record  p: play  n: next  b: back  s: show  q: quit");
    show_entry(studio);

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else {
                    log::debug!("stdin closed");
                    break;
                };
                match Command::parse(&line) {
                    Some(Command::Quit) => break,
                    Some(command) => {
                        meter.reset();
                        handle(studio, command);
                    }
                    None if line.trim().is_empty() => {}
                    None => println!("unknown command: {:?}", line.trim()),
                }
            }
            _ = tick.tick() => {
                let update = studio.poll();
                render(studio, &update, &mut meter);
            }
        }
    }

    shutdown(studio);
    Ok(())
}

fn handle(studio: &mut Studio, command: Command) {
    let result = match command {
        Command::Record if studio.is_recording() => studio.stop_recording().map(|summary| {
            println!(
                "\nsaved {} ({:.2}s)",
                summary.path.display(),
                summary.duration_secs
            );
            match analyze_wav(&summary.path, studio.format()) {
                Ok(stats) => println!(
                    "peak {} ({:.1} dBFS), rms {:.0}{}",
                    stats.peak_abs,
                    stats.peak_dbfs(),
                    stats.rms,
                    if stats.is_clipped() { ", clipped" } else { "" }
                ),
                Err(e) => log::warn!("Level analysis failed: {}", e),
            }
        }),
        Command::Record => studio.start_recording().map(|path| {
            println!("recording {}", path.display());
        }),
        Command::Play if studio.is_playing() => studio.stop_playback(),
        Command::Play => studio.start_playback(),
        Command::Next => studio.next().map(|moved| {
            if moved {
                show_entry(studio);
            }
        }),
        Command::Prev => studio.prev().map(|moved| {
            if moved {
                show_entry(studio);
            }
        }),
        Command::Show => {
            show_entry(studio);
            Ok(())
        }
        Command::Quit => Ok(()),
    };

    if let Err(e) = result {
        println!("\n{}", e);
    }
}

fn show_entry(studio: &Studio) {
    let (index, count) = studio.position();
    let Some(entry) = studio.current_entry() else {
        println!("[{}] no entries", studio.script_label());
        return;
    };
    println!(
        "[{}] {} / {}  {}.wav{}{}",
        studio.script_label(),
        index,
        count,
        entry.id,
        if studio.has_prev() { "  <b" } else { "" },
        if studio.has_next() { "  n>" } else { "" }
    );
    match &entry.pronunciation {
        Some(hint) => println!("  {}  ({})", entry.prompt, hint),
        None => println!("  {}", entry.prompt),
    }
}

fn render(studio: &Studio, update: &PollUpdate, meter: &mut LevelMeter<METER_BARS>) {
    if let Some(fault) = &update.fault {
        println!("\nsession aborted: {}", fault);
        return;
    }
    if update.finished_playback {
        println!("\nplayback finished ({:.2}s)", update.playback_secs);
        return;
    }

    let line = if studio.is_recording() {
        let mut bars = studio.waveform().rms_bars::<METER_BARS>();
        meter.apply(&mut bars);
        format!(
            "\rREC {:6.1}s [{}] peak {:5}",
            update.recorded_secs,
            meter_line(&bars),
            update.peak as i32
        )
    } else if studio.is_playing() {
        format!("\rPLAY {:6.2}s", update.playback_secs)
    } else {
        return;
    };

    let mut stdout = std::io::stdout().lock();
    let _ = write!(stdout, "{}", line);
    let _ = stdout.flush();
}

/// One block character per bar, height proportional to its level.
fn meter_line(bars: &[f32]) -> String {
    let top = (METER_LEVELS.len() - 1) as f32;
    bars.iter()
        .map(|&level| METER_LEVELS[(level.clamp(0.0, 1.0) * top).round() as usize])
        .collect()
}

fn shutdown(studio: &mut Studio) {
    if studio.is_recording() {
        match studio.stop_recording() {
            Ok(summary) => println!("\nsaved {}", summary.path.display()),
            Err(e) => log::error!("Stopping recording on exit: {}", e),
        }
    }
    if studio.is_playing() {
        if let Err(e) = studio.stop_playback() {
            log::error!("Stopping playback on exit: {}", e);
        }
    }
}
