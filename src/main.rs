// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use virtuoso::audio;
use virtuoso::config::{self, Audio, Samples};
use virtuoso::controller::layout::KeyboardLayout;
use virtuoso::controller::{keyboard, terminal, Controller, LogScreen};
use virtuoso::notes::NoteRegistry;
use virtuoso::piano::Piano;

/// How long to wait for the samples before giving up on a headless melody.
const LOAD_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "An interactive virtual piano."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct SessionArgs {
    /// The path to the piano config.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// The audio device to play through. Overrides the config.
    #[arg(short, long)]
    device: Option<String>,
    /// A directory of piano samples. Overrides the config.
    #[arg(short, long)]
    samples: Option<PathBuf>,
    /// A melody file to play instead of the built-in one. Overrides the config.
    #[arg(short, long)]
    melody: Option<PathBuf>,
    /// Writes logs to this file.
    #[arg(short, long)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the keys of the piano and their keyboard bindings.
    Notes {},
    /// Starts an interactive piano.
    Play {
        #[clap(flatten)]
        session: SessionArgs,
        /// Reads line commands from standard input instead of drawing a keyboard.
        #[arg(long)]
        headless: bool,
    },
    /// Plays the melody once and exits.
    Melody {
        #[clap(flatten)]
        session: SessionArgs,
    },
    /// Writes the built-in melody to a YAML file.
    ExportMelody {
        /// Where to write the melody.
        path: PathBuf,
    },
}

/// Loads the config and applies the command line overrides.
fn player_config(session: &SessionArgs) -> Result<config::Player, Box<dyn Error>> {
    let mut player = match &session.config {
        Some(path) => config::Player::deserialize(path)?,
        None => config::Player::default(),
    };
    if let Some(device) = &session.device {
        player.set_audio(Audio::new(device));
    }
    if let Some(directory) = &session.samples {
        player.set_samples(Samples::from_directory(directory, None));
    }
    if let Some(melody) = &session.melody {
        player.playback_mut().set_melody(melody);
    }
    Ok(player)
}

/// Logs to the given file, or to stderr unless stderr is in use by the terminal.
fn init_logging(log_file: Option<&Path>, interactive: bool) -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log_file {
        Some(path) => builder
            .with_ansi(false)
            .with_writer(Mutex::new(File::create(path)?))
            .init(),
        None if interactive => builder.with_writer(io::sink).init(),
        None => builder.with_writer(io::stderr).init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            init_logging(None, false)?;
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Notes {} => {
            let registry = NoteRegistry::default();
            println!("Notes (count: {}):", registry.len());
            for key in registry.keys() {
                println!(
                    "- {} ({:?}){}",
                    key.id(),
                    key.color(),
                    key.input_binding()
                        .map(|binding| format!(" key: {}", binding))
                        .unwrap_or_default()
                );
            }
        }
        Commands::Play { session, headless } => {
            init_logging(session.log_file.as_deref(), !headless)?;
            let piano = Piano::from_config(&player_config(&session)?)?;

            if headless {
                let driver = Arc::new(keyboard::Driver::new());
                let mut controller = Controller::new(piano, driver, Box::new(LogScreen::new()));
                controller.join().await?;
                return Ok(());
            }

            let layout = Arc::new(KeyboardLayout::new(piano.registry(), 2..=5, 3));
            let session = terminal::TerminalSession::start()?;
            let driver = Arc::new(terminal::Driver::new(layout.clone(), &session));
            let screen = Box::new(terminal::Screen::new(layout, "virtuoso"));
            let mut controller = Controller::new(piano, driver, screen);
            let result = controller.join().await;
            drop(session);
            result?;
        }
        Commands::Melody { session } => {
            init_logging(session.log_file.as_deref(), false)?;
            let mut piano = Piano::from_config(&player_config(&session)?)?;
            piano.start_and_wait(LOAD_TIMEOUT)?;
            if !piano.view().ready {
                return Err("samples did not finish loading".into());
            }

            info!(melody = piano.melody().name(), "Playing melody");
            if !piano.play_melody() {
                return Err("melody did not start".into());
            }
            let cancel_handle = piano.cancel_handle().ok_or("melody is not playing")?;

            println!("Playing {}. Press enter to stop.", piano.melody().name());
            {
                let cancel_handle = cancel_handle.clone();
                thread::spawn(move || {
                    let mut line = String::new();
                    if matches!(io::stdin().read_line(&mut line), Ok(read) if read > 0) {
                        cancel_handle.cancel();
                    }
                });
            }

            while piano.view().is_playing() {
                piano.poll()?;
                // Sleep until the next action is due, waking early if cancelled.
                let wait = piano
                    .next_due()
                    .map(|due| Duration::from_secs_f64((due - piano.now()).max(0.0)))
                    .unwrap_or(POLL_INTERVAL);
                cancel_handle.wait_timeout(wait.clamp(Duration::from_millis(1), POLL_INTERVAL));
            }
            piano.dispose();
        }
        Commands::ExportMelody { path } => {
            init_logging(None, false)?;
            let melody = virtuoso::melody::Melody::prince_igor();
            melody.save(&path)?;
            println!("Wrote {} to {}.", melody.name(), path.display());
        }
    }

    Ok(())
}
