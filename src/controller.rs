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
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::time::MissedTickBehavior;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{debug, error, info, span, warn, Instrument, Level};

use crate::input::InputEvent;
use crate::piano::{Piano, PianoView};

pub mod keyboard;
pub mod layout;
pub mod terminal;

/// How often the piano is polled for sample loading and scheduled playback.
const TICK: Duration = Duration::from_millis(5);

/// Controller events that will trigger behavior in the piano.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Starts audio output. Sent in response to an explicit user action.
    Start,

    /// Live input for the keyboard.
    Input(InputEvent),

    /// Mutes or unmutes the output.
    ToggleMute,

    /// Plays the melody. If it is already playing, does nothing.
    Play,

    /// Stops the melody. If nothing is playing, does nothing.
    Stop,

    /// Plays the melody if idle, otherwise stops it.
    ToggleMelody,

    /// Ends the session.
    Quit,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Renders the piano whenever its view changes.
pub trait Screen: Send + 'static {
    fn draw(&mut self, view: &PianoView) -> Result<(), io::Error>;
}

/// A screen that writes view changes to the log, for headless sessions.
pub struct LogScreen {}

impl LogScreen {
    pub fn new() -> LogScreen {
        LogScreen {}
    }
}

impl Default for LogScreen {
    fn default() -> Self {
        LogScreen::new()
    }
}

impl Screen for LogScreen {
    fn draw(&mut self, view: &PianoView) -> Result<(), io::Error> {
        info!(view = %view, "Piano");
        Ok(())
    }
}

/// Drives a piano from a driver's events.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given driver and screen.
    pub fn new(piano: Piano, driver: Arc<dyn Driver>, screen: Box<dyn Screen>) -> Controller {
        let span = span!(Level::INFO, "controller");
        Controller {
            handle: tokio::spawn(Controller::run(piano, driver, screen).instrument(span)),
        }
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Runs the event loop until the driver quits or closes.
    async fn run(mut piano: Piano, driver: Arc<dyn Driver>, mut screen: Box<dyn Screen>) {
        let (events_tx, mut events_rx) = mpsc::channel(64);
        let join_handle = driver.monitor_events(events_tx);

        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(melody = piano.melody().name(), "Controller started.");

        let mut last_view: Option<PianoView> = None;
        loop {
            tokio::select! {
                event = events_rx.recv() => match event {
                    Some(Event::Quit) | None => break,
                    Some(event) => Controller::handle(&mut piano, event),
                },
                _ = ticker.tick() => {
                    if let Err(e) = piano.poll() {
                        error!(err = %e, "Piano is unavailable");
                    }
                }
            }

            let view = piano.view();
            if last_view.as_ref() != Some(&view) {
                if let Err(e) = screen.draw(&view) {
                    error!(err = %e, "Unable to draw");
                }
                last_view = Some(view);
            }
        }

        info!("Controller closing.");
        piano.dispose();
        drop(events_rx);
        match join_handle.await {
            Ok(Err(e)) => error!(err = %e, "Event monitor failed"),
            Err(e) => error!("Error waiting for event monitor to stop: {}", e),
            Ok(Ok(())) => {}
        }
    }

    fn handle(piano: &mut Piano, event: Event) {
        debug!(event = ?event, "Received event.");
        match event {
            Event::Start => {
                if let Err(e) = piano.start_audio() {
                    error!(err = %e, "Unable to start audio");
                }
            }
            Event::Input(input) => {
                piano.handle_input(&input);
            }
            Event::ToggleMute => {
                let muted = piano.toggle_mute();
                info!(muted, "Mute toggled");
            }
            Event::Play => {
                if !piano.play_melody() {
                    warn!(view = %piano.view(), "Melody can't start now");
                }
            }
            Event::Stop => piano.stop_melody(),
            Event::ToggleMelody => {
                piano.toggle_melody();
            }
            Event::Quit => {}
        }
    }
}
