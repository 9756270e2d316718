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

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;
use crate::input::{InputEvent, PointerPhase};
use crate::notes::NoteId;

const START: &str = "start";
const PLAY: &str = "play";
const STOP: &str = "stop";
const MUTE: &str = "mute";
const DOWN: &str = "down";
const UP: &str = "up";
const PRESS: &str = "press";
const RELEASE: &str = "release";
const QUIT: &str = "quit";

/// A controller that reads line commands from standard input, for headless sessions.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Parses a single command line.
    fn parse(input: &str) -> Option<Event> {
        let mut words = input.split_whitespace();
        let command = words.next()?.to_lowercase();
        let argument = words.next();

        let event = match (command.as_str(), argument) {
            (START, None) => Event::Start,
            (PLAY, None) => Event::Play,
            (STOP, None) => Event::Stop,
            (MUTE, None) => Event::ToggleMute,
            (QUIT, None) => Event::Quit,
            (DOWN, Some(key)) => Event::Input(InputEvent::key_down(key)),
            (UP, Some(key)) => Event::Input(InputEvent::key_up(key)),
            (PRESS, Some(note)) => Event::Input(InputEvent::pointer(
                note.parse::<NoteId>().ok()?,
                PointerPhase::Down,
            )),
            (RELEASE, Some(note)) => Event::Input(InputEvent::pointer(
                note.parse::<NoteId>().ok()?,
                PointerPhase::Up,
            )),
            _ => return None,
        };
        Some(event)
    }

    /// Reads one command. Returns false at the end of input or after quit.
    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command ({}, {}, {}, {}, {} <key>, {} <key>, {} <note>, {} <note>, {}): ",
            START, PLAY, STOP, MUTE, DOWN, UP, PRESS, RELEASE, QUIT,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            events_tx
                .blocking_send(Event::Quit)
                .map_err(io::Error::other)?;
            return Ok(false);
        }

        match Driver::parse(&input) {
            Some(event) => {
                let quit = event == Event::Quit;
                events_tx.blocking_send(event).map_err(io::Error::other)?;
                Ok(!quit)
            }
            None => {
                if !input.trim().is_empty() {
                    warn!(input = input.trim(), "Unrecognized input");
                }
                Ok(true)
            }
        }
    }
}

impl Default for Driver {
    fn default() -> Self {
        Driver::new()
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}
            Ok(())
        })
    }
}
