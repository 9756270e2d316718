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
//! An interactive terminal keyboard.
//!
//! Physical keys play their bound notes and the mouse plays the drawn keys, including
//! dragging across them. Key releases are only reported by terminals that support
//! keyboard enhancements; elsewhere every press is followed by an immediate release.

use std::{
    io::{self, stdout, Write},
    panic,
    sync::Arc,
    time::Duration,
};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{
        self, DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture,
        Event as TermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers,
        KeyboardEnhancementFlags, MouseButton, MouseEvent, MouseEventKind,
        PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    execute, queue,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{
        self, disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{debug, info, span, warn, Level};

use super::{layout::KeyboardLayout, Event};
use crate::{
    input::{InputEvent, PointerPhase},
    notes::{KeyColor, NoteId},
    piano::PianoView,
};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const HELP: &str =
    "enter: start audio  space: play/stop melody  m: mute  esc: quit  keys A..; play C3..E4";

/// Raw mode and the alternate screen for as long as the session lives.
pub struct TerminalSession {
    enhancements: bool,
}

impl TerminalSession {
    pub fn start() -> Result<TerminalSession, io::Error> {
        // Keyboard enhancements must be pushed before entering the alternate screen.
        let enhancements = terminal::supports_keyboard_enhancement().unwrap_or(false);
        if enhancements {
            execute!(
                stdout(),
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )?;
        } else {
            warn!("Terminal doesn't report key releases, notes will be released right away");
        }

        enable_raw_mode()?;
        execute!(
            stdout(),
            EnterAlternateScreen,
            EnableMouseCapture,
            EnableFocusChange,
            Hide
        )?;

        let original_hook = panic::take_hook();
        panic::set_hook(Box::new(move |panic_info| {
            restore(enhancements);
            original_hook(panic_info);
        }));

        Ok(TerminalSession { enhancements })
    }

    /// Whether key releases are reported.
    pub fn reports_releases(&self) -> bool {
        self.enhancements
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        restore(self.enhancements);
    }
}

fn restore(enhancements: bool) {
    if enhancements {
        let _ = execute!(stdout(), PopKeyboardEnhancementFlags);
    }
    let _ = execute!(
        stdout(),
        DisableFocusChange,
        DisableMouseCapture,
        Show,
        LeaveAlternateScreen
    );
    let _ = disable_raw_mode();
}

/// Turns terminal events into controller events.
pub struct Translator {
    layout: Arc<KeyboardLayout>,
    reports_releases: bool,
    /// The key under the held mouse button.
    hovered: Option<NoteId>,
}

impl Translator {
    pub fn new(layout: Arc<KeyboardLayout>, reports_releases: bool) -> Translator {
        Translator {
            layout,
            reports_releases,
            hovered: None,
        }
    }

    pub fn translate(&mut self, event: &TermEvent) -> Vec<Event> {
        match event {
            TermEvent::Key(key) => self.key(key),
            TermEvent::Mouse(mouse) => self.mouse(mouse),
            TermEvent::FocusLost => vec![Event::Input(InputEvent::FocusLost)],
            _ => Vec::new(),
        }
    }

    fn key(&self, key: &KeyEvent) -> Vec<Event> {
        let pressed = key.kind == KeyEventKind::Press;
        match key.code {
            KeyCode::Esc | KeyCode::Enter | KeyCode::Char(' ' | 'm' | 'M') if !pressed => {
                Vec::new()
            }
            KeyCode::Esc => vec![Event::Quit],
            KeyCode::Char('c') if pressed && key.modifiers.contains(KeyModifiers::CONTROL) => {
                vec![Event::Quit]
            }
            KeyCode::Enter => vec![Event::Start],
            KeyCode::Char(' ') => vec![Event::ToggleMelody],
            KeyCode::Char('m' | 'M') => vec![Event::ToggleMute],
            KeyCode::Char(c) => {
                let code = c.to_string();
                match key.kind {
                    KeyEventKind::Press if !self.reports_releases => vec![
                        Event::Input(InputEvent::key_down(&code)),
                        Event::Input(InputEvent::key_up(&code)),
                    ],
                    KeyEventKind::Press => vec![Event::Input(InputEvent::key_down(&code))],
                    KeyEventKind::Repeat => vec![Event::Input(InputEvent::KeyDown {
                        code,
                        repeat: true,
                    })],
                    KeyEventKind::Release => vec![Event::Input(InputEvent::key_up(&code))],
                }
            }
            _ => Vec::new(),
        }
    }

    fn mouse(&mut self, mouse: &MouseEvent) -> Vec<Event> {
        let under = self.layout.hit(mouse.column, mouse.row);
        let pointer = |note, phase| Event::Input(InputEvent::pointer(note, phase));
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                self.hovered = under;
                match under {
                    Some(note) => vec![pointer(note, PointerPhase::Down)],
                    None => vec![Event::Input(InputEvent::PrimaryPressed)],
                }
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                if under == self.hovered {
                    return Vec::new();
                }
                let mut events = Vec::new();
                if let Some(left) = self.hovered {
                    events.push(pointer(left, PointerPhase::Leave));
                }
                if let Some(entered) = under {
                    events.push(pointer(entered, PointerPhase::Enter));
                }
                self.hovered = under;
                events
            }
            MouseEventKind::Up(MouseButton::Left) => match self.hovered.take() {
                Some(note) => vec![pointer(note, PointerPhase::Up)],
                None => vec![Event::Input(InputEvent::PrimaryReleased)],
            },
            _ => Vec::new(),
        }
    }
}

/// Reads terminal input.
pub struct Driver {
    layout: Arc<KeyboardLayout>,
    reports_releases: bool,
}

impl Driver {
    pub fn new(layout: Arc<KeyboardLayout>, session: &TerminalSession) -> Driver {
        Driver {
            layout,
            reports_releases: session.reports_releases(),
        }
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        let mut translator = Translator::new(self.layout.clone(), self.reports_releases);
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "terminal driver");
            let _enter = span.enter();

            info!("Terminal driver started.");

            while !events_tx.is_closed() {
                if !event::poll(POLL_INTERVAL)? {
                    continue;
                }
                let event = event::read()?;
                for event in translator.translate(&event) {
                    debug!(event = ?event, "Terminal event");
                    let quit = event == Event::Quit;
                    if events_tx.blocking_send(event).is_err() || quit {
                        return Ok(());
                    }
                }
            }
            Ok(())
        })
    }
}

/// Draws the keyboard and the piano's status.
pub struct Screen {
    layout: Arc<KeyboardLayout>,
    title: String,
}

impl Screen {
    pub fn new(layout: Arc<KeyboardLayout>, title: &str) -> Screen {
        Screen {
            layout,
            title: title.to_string(),
        }
    }

    fn status(view: &PianoView) -> String {
        if let Some(failure) = &view.failure {
            return format!("error: {}", failure);
        }
        let mut status = if view.ready {
            match view.is_playing() {
                true => "playing".to_string(),
                false => "ready".to_string(),
            }
        } else if view.loading {
            "loading samples...".to_string()
        } else {
            "press enter to start audio".to_string()
        };
        if view.muted {
            status.push_str(" (muted)");
        }
        status
    }

    fn render<W: Write>(&self, out: &mut W, view: &PianoView) -> Result<(), io::Error> {
        queue!(
            out,
            Clear(ClearType::All),
            MoveTo(0, 0),
            Print(format!("{}  [{}]", self.title, Screen::status(view))),
            MoveTo(0, 1),
            Print(HELP)
        )?;

        for key in self.layout.keys() {
            let active = view.active.contains(&key.note);
            let (background, foreground) = match (key.color, active) {
                (KeyColor::White, false) => (Color::White, Color::Black),
                (KeyColor::White, true) => (Color::Yellow, Color::Black),
                (KeyColor::Black, false) => (Color::Black, Color::White),
                (KeyColor::Black, true) => (Color::DarkYellow, Color::White),
            };
            for row in 0..key.height {
                let mut cells = " ".repeat(key.width as usize);
                if row + 1 == key.height && !key.label.is_empty() {
                    cells = format!("{:^width$}", key.label, width = key.width as usize);
                }
                queue!(
                    out,
                    MoveTo(key.left, key.top + row),
                    SetBackgroundColor(background),
                    SetForegroundColor(foreground),
                    Print(cells)
                )?;
                // The last column of a white key is its border.
                if key.color == KeyColor::White {
                    queue!(
                        out,
                        MoveTo(key.left + key.width - 1, key.top + row),
                        SetBackgroundColor(Color::Grey),
                        Print(" ")
                    )?;
                }
            }
        }

        let active: Vec<String> = view.active.iter().map(NoteId::to_string).collect();
        queue!(
            out,
            ResetColor,
            MoveTo(0, self.layout.bottom() + 1),
            Print(format!("notes: {}", active.join(" ")))
        )?;
        out.flush()
    }
}

impl super::Screen for Screen {
    fn draw(&mut self, view: &PianoView) -> Result<(), io::Error> {
        self.render(&mut stdout(), view)
    }
}

#[cfg(test)]
mod test {
    use crossterm::event::{KeyEventState, MouseEvent};

    use super::*;
    use crate::{notes::NoteRegistry, scheduler::PlaybackState, testutil::note};

    fn layout() -> Arc<KeyboardLayout> {
        Arc::new(KeyboardLayout::new(&NoteRegistry::default(), 3..=4, 2))
    }

    fn key(code: KeyCode, kind: KeyEventKind) -> TermEvent {
        TermEvent::Key(KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind,
            state: KeyEventState::NONE,
        })
    }

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> TermEvent {
        TermEvent::Mouse(MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        })
    }

    #[test]
    fn test_keys_with_releases() {
        let mut translator = Translator::new(layout(), true);
        assert_eq!(
            vec![Event::Input(InputEvent::key_down("a"))],
            translator.translate(&key(KeyCode::Char('a'), KeyEventKind::Press))
        );
        assert_eq!(
            vec![Event::Input(InputEvent::KeyDown {
                code: "a".to_string(),
                repeat: true
            })],
            translator.translate(&key(KeyCode::Char('a'), KeyEventKind::Repeat))
        );
        assert_eq!(
            vec![Event::Input(InputEvent::key_up("a"))],
            translator.translate(&key(KeyCode::Char('a'), KeyEventKind::Release))
        );

        assert_eq!(
            vec![Event::Start],
            translator.translate(&key(KeyCode::Enter, KeyEventKind::Press))
        );
        assert_eq!(
            vec![Event::ToggleMelody],
            translator.translate(&key(KeyCode::Char(' '), KeyEventKind::Press))
        );
        assert!(translator
            .translate(&key(KeyCode::Char(' '), KeyEventKind::Release))
            .is_empty());
        assert_eq!(
            vec![Event::ToggleMute],
            translator.translate(&key(KeyCode::Char('m'), KeyEventKind::Press))
        );
        assert_eq!(
            vec![Event::Quit],
            translator.translate(&key(KeyCode::Esc, KeyEventKind::Press))
        );
    }

    #[test]
    fn test_keys_without_releases() {
        let mut translator = Translator::new(layout(), false);
        assert_eq!(
            vec![
                Event::Input(InputEvent::key_down("h")),
                Event::Input(InputEvent::key_up("h")),
            ],
            translator.translate(&key(KeyCode::Char('h'), KeyEventKind::Press))
        );
    }

    #[test]
    fn test_mouse_glide() {
        let mut translator = Translator::new(layout(), true);
        let pointer = |n: &str, phase| Event::Input(InputEvent::pointer(note(n), phase));

        assert_eq!(
            vec![pointer("C3", PointerPhase::Down)],
            translator.translate(&mouse(MouseEventKind::Down(MouseButton::Left), 0, 6))
        );
        // Still over C3.
        assert!(translator
            .translate(&mouse(MouseEventKind::Drag(MouseButton::Left), 1, 6))
            .is_empty());
        assert_eq!(
            vec![
                pointer("C3", PointerPhase::Leave),
                pointer("D3", PointerPhase::Enter)
            ],
            translator.translate(&mouse(MouseEventKind::Drag(MouseButton::Left), 4, 6))
        );
        assert_eq!(
            vec![pointer("D3", PointerPhase::Leave)],
            translator.translate(&mouse(MouseEventKind::Drag(MouseButton::Left), 4, 12))
        );
        assert_eq!(
            vec![Event::Input(InputEvent::PrimaryReleased)],
            translator.translate(&mouse(MouseEventKind::Up(MouseButton::Left), 4, 12))
        );

        translator.translate(&mouse(MouseEventKind::Down(MouseButton::Left), 3, 3));
        assert_eq!(
            vec![pointer("C#3", PointerPhase::Up)],
            translator.translate(&mouse(MouseEventKind::Up(MouseButton::Left), 3, 3))
        );
    }

    #[test]
    fn test_mouse_drag_onto_keys() {
        let mut translator = Translator::new(layout(), true);
        let pointer = |n: &str, phase| Event::Input(InputEvent::pointer(note(n), phase));

        // Pressed on the status line above the keyboard.
        assert_eq!(
            vec![Event::Input(InputEvent::PrimaryPressed)],
            translator.translate(&mouse(MouseEventKind::Down(MouseButton::Left), 0, 0))
        );
        assert_eq!(
            vec![pointer("C3", PointerPhase::Enter)],
            translator.translate(&mouse(MouseEventKind::Drag(MouseButton::Left), 0, 6))
        );
        assert_eq!(
            vec![
                pointer("C3", PointerPhase::Leave),
                pointer("D3", PointerPhase::Enter)
            ],
            translator.translate(&mouse(MouseEventKind::Drag(MouseButton::Left), 4, 6))
        );
    }

    #[test]
    fn test_render() -> Result<(), io::Error> {
        let screen = Screen::new(layout(), "virtuoso");
        let view = PianoView {
            active: vec![note("C3")],
            loading: false,
            ready: true,
            failure: None,
            playback: PlaybackState::Idle,
            muted: true,
        };
        let mut out: Vec<u8> = Vec::new();
        screen.render(&mut out, &view)?;

        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("virtuoso  [ready (muted)]"));
        assert!(text.contains("notes: C3"));
        Ok(())
    }
}
