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
//! The input reconciler.
//!
//! Pointer, touch and physical keyboard input arrive with different event shapes. The
//! reconciler tracks what each channel is holding and turns the raw events into one
//! note on per press and one note off per release, written to the active note set
//! first and then to the voice engine.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};

use tracing::{debug, trace};

use crate::{
    active::ActiveNotes,
    engine::VoiceEngine,
    notes::{NoteId, NoteRegistry},
    scheduler::PlaybackState,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerPhase {
    Down,
    Up,
    Enter,
    Leave,
}

/// A raw input event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputEvent {
    /// A pointer event scoped to a key. `emulated` marks pointer events synthesized from
    /// touch input, which are ignored.
    Pointer {
        note: NoteId,
        phase: PointerPhase,
        emulated: bool,
    },
    /// The primary button was pressed somewhere other than a key. Dragging onto a key
    /// afterwards plays it.
    PrimaryPressed,
    /// The primary button was released somewhere other than a key.
    PrimaryReleased,
    TouchStart(NoteId),
    TouchEnd(NoteId),
    /// A physical key went down. `repeat` is set for auto-repeat.
    KeyDown { code: String, repeat: bool },
    KeyUp { code: String },
    /// Input focus went elsewhere; anything held is let go.
    FocusLost,
}

impl InputEvent {
    pub fn pointer(note: NoteId, phase: PointerPhase) -> InputEvent {
        InputEvent::Pointer {
            note,
            phase,
            emulated: false,
        }
    }

    pub fn key_down(code: &str) -> InputEvent {
        InputEvent::KeyDown {
            code: code.to_string(),
            repeat: false,
        }
    }

    pub fn key_up(code: &str) -> InputEvent {
        InputEvent::KeyUp {
            code: code.to_string(),
        }
    }
}

/// An effective change made to the active note set and the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteChange {
    On(NoteId),
    Off(NoteId),
}

impl fmt::Display for NoteChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteChange::On(note) => write!(f, "on({})", note),
            NoteChange::Off(note) => write!(f, "off({})", note),
        }
    }
}

/// Why live input was not passed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Gate {
    Muted,
    NotReady,
    Playing,
}

/// Merges live input channels into note changes.
pub struct InputReconciler {
    registry: Arc<NoteRegistry>,
    notes: ActiveNotes,
    /// Whether the primary pointer button is held anywhere.
    primary_held: bool,
    /// The key the held pointer is sounding.
    under_pointer: Option<NoteId>,
    /// Physical keys held, by lowercase key code.
    held_keys: HashMap<String, NoteId>,
    touches: HashSet<NoteId>,
}

impl InputReconciler {
    pub fn new(registry: Arc<NoteRegistry>, notes: ActiveNotes) -> InputReconciler {
        InputReconciler {
            registry,
            notes,
            primary_held: false,
            under_pointer: None,
            held_keys: HashMap::new(),
            touches: HashSet::new(),
        }
    }

    pub fn is_primary_held(&self) -> bool {
        self.primary_held
    }

    /// Whether the physical key is logically held.
    pub fn is_key_held(&self, code: &str) -> bool {
        self.held_keys.contains_key(&code.to_lowercase())
    }

    /// Handles one raw event and returns the changes that reached the note set and the
    /// engine.
    pub fn handle(
        &mut self,
        event: &InputEvent,
        engine: &mut VoiceEngine,
        playback: PlaybackState,
    ) -> Vec<NoteChange> {
        let mut intents = Vec::new();
        match event {
            InputEvent::Pointer { emulated: true, .. } => {
                trace!(event = ?event, "Ignoring emulated pointer event");
            }
            InputEvent::Pointer {
                note,
                phase,
                emulated: false,
            } => self.pointer(*note, *phase, &mut intents),
            InputEvent::PrimaryPressed => self.primary_held = true,
            InputEvent::PrimaryReleased => {
                self.primary_held = false;
                if let Some(note) = self.under_pointer.take() {
                    intents.push(NoteChange::Off(note));
                }
            }
            InputEvent::TouchStart(note) => {
                if self.touches.insert(*note) {
                    intents.push(NoteChange::On(*note));
                }
            }
            InputEvent::TouchEnd(note) => {
                if self.touches.remove(note) {
                    intents.push(NoteChange::Off(*note));
                }
            }
            InputEvent::KeyDown { code, repeat } => {
                let Some(note) = self.registry.note_for_binding(code) else {
                    trace!(code, "Unmapped key");
                    return Vec::new();
                };
                let code = code.to_lowercase();
                if *repeat || self.held_keys.contains_key(&code) {
                    trace!(code, note = %note, "Suppressing key repeat");
                    return Vec::new();
                }
                self.held_keys.insert(code, note);
                intents.push(NoteChange::On(note));
            }
            InputEvent::KeyUp { code } => {
                if let Some(note) = self.held_keys.remove(&code.to_lowercase()) {
                    intents.push(NoteChange::Off(note));
                }
            }
            InputEvent::FocusLost => {
                self.primary_held = false;
                intents.extend(self.under_pointer.take().map(NoteChange::Off));
                intents.extend(self.held_keys.drain().map(|(_, note)| NoteChange::Off(note)));
                intents.extend(self.touches.drain().map(NoteChange::Off));
            }
        }

        if intents.is_empty() {
            return intents;
        }
        if let Some(gate) = gate(engine, playback) {
            debug!(gate = ?gate, changes = intents.len(), "Live input rejected");
            return Vec::new();
        }
        intents
            .into_iter()
            .filter(|change| self.apply(*change, engine))
            .collect()
    }

    fn pointer(&mut self, note: NoteId, phase: PointerPhase, intents: &mut Vec<NoteChange>) {
        match phase {
            PointerPhase::Down => {
                self.primary_held = true;
                if let Some(previous) = self.under_pointer.replace(note) {
                    if previous != note {
                        intents.push(NoteChange::Off(previous));
                    }
                }
                intents.push(NoteChange::On(note));
            }
            PointerPhase::Enter => {
                if !self.primary_held || self.under_pointer == Some(note) {
                    return;
                }
                // A leave that never arrived.
                if let Some(previous) = self.under_pointer.replace(note) {
                    intents.push(NoteChange::Off(previous));
                }
                intents.push(NoteChange::On(note));
            }
            PointerPhase::Leave => {
                if self.primary_held && self.under_pointer == Some(note) {
                    self.under_pointer = None;
                    intents.push(NoteChange::Off(note));
                }
            }
            PointerPhase::Up => {
                self.primary_held = false;
                if let Some(held) = self.under_pointer.take() {
                    intents.push(NoteChange::Off(held));
                }
            }
        }
    }

    /// Writes the change to the note set, then the engine. Returns false when the set
    /// already reflected it.
    fn apply(&self, change: NoteChange, engine: &mut VoiceEngine) -> bool {
        match change {
            NoteChange::On(note) => {
                if !self.notes.press(note) {
                    return false;
                }
                engine.note_on(note, None, None);
            }
            NoteChange::Off(note) => {
                if !self.notes.release(&note) {
                    return false;
                }
                engine.note_off(note, None);
            }
        }
        debug!(change = %change, "Live input");
        true
    }
}

fn gate(engine: &VoiceEngine, playback: PlaybackState) -> Option<Gate> {
    if engine.is_muted() {
        Some(Gate::Muted)
    } else if !engine.is_ready() {
        Some(Gate::NotReady)
    } else if playback == PlaybackState::Playing {
        Some(Gate::Playing)
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::{
        audio::mock::{Call, NoteEventKind},
        testutil::{engine_with, note, ready_engine, StaticSamples},
    };

    const IDLE: PlaybackState = PlaybackState::Idle;

    fn reconciler() -> (InputReconciler, ActiveNotes) {
        let notes = ActiveNotes::default();
        (
            InputReconciler::new(Arc::new(NoteRegistry::default()), notes.clone()),
            notes,
        )
    }

    #[test]
    fn test_pointer_press_is_idempotent() {
        let (mut engine, device) = ready_engine();
        let (mut input, notes) = reconciler();
        let down = InputEvent::pointer(note("C4"), PointerPhase::Down);

        assert_eq!(vec![NoteChange::On(note("C4"))], input.handle(&down, &mut engine, IDLE));
        assert!(input.handle(&down, &mut engine, IDLE).is_empty());
        assert_eq!(vec![note("C4")], notes.snapshot());
        assert_eq!(1, device.note_events().len());

        let up = InputEvent::pointer(note("C4"), PointerPhase::Up);
        assert_eq!(vec![NoteChange::Off(note("C4"))], input.handle(&up, &mut engine, IDLE));
        assert!(input.handle(&up, &mut engine, IDLE).is_empty());
        assert!(notes.is_empty());
        assert_eq!(2, device.note_events().len());
    }

    #[test]
    fn test_drag_glide() {
        let (mut engine, device) = ready_engine();
        let (mut input, notes) = reconciler();
        let (a, b, c) = (note("A3"), note("B3"), note("C4"));

        for event in [
            InputEvent::pointer(a, PointerPhase::Down),
            InputEvent::pointer(a, PointerPhase::Leave),
            InputEvent::pointer(b, PointerPhase::Enter),
            InputEvent::pointer(b, PointerPhase::Leave),
            InputEvent::pointer(c, PointerPhase::Enter),
        ] {
            input.handle(&event, &mut engine, IDLE);
        }

        assert_eq!(vec![c], notes.snapshot());
        let events: Vec<(NoteEventKind, NoteId)> = device
            .note_events()
            .iter()
            .map(|e| (e.kind, e.note))
            .collect();
        assert_eq!(
            vec![
                (NoteEventKind::On, a),
                (NoteEventKind::Off, a),
                (NoteEventKind::On, b),
                (NoteEventKind::Off, b),
                (NoteEventKind::On, c),
            ],
            events
        );

        // Releasing anywhere lets go of the last key.
        input.handle(&InputEvent::PrimaryReleased, &mut engine, IDLE);
        assert!(notes.is_empty());
        assert!(!input.is_primary_held());
    }

    #[test]
    fn test_drag_from_outside_the_keys() {
        let (mut engine, device) = ready_engine();
        let (mut input, notes) = reconciler();
        let (a, b) = (note("E4"), note("F4"));

        assert!(input
            .handle(&InputEvent::PrimaryPressed, &mut engine, IDLE)
            .is_empty());
        assert!(input.is_primary_held());
        assert!(device.calls().is_empty());

        for event in [
            InputEvent::pointer(a, PointerPhase::Enter),
            InputEvent::pointer(a, PointerPhase::Leave),
            InputEvent::pointer(b, PointerPhase::Enter),
        ] {
            input.handle(&event, &mut engine, IDLE);
        }

        assert_eq!(vec![b], notes.snapshot());
        let events: Vec<(NoteEventKind, NoteId)> = device
            .note_events()
            .iter()
            .map(|e| (e.kind, e.note))
            .collect();
        assert_eq!(
            vec![
                (NoteEventKind::On, a),
                (NoteEventKind::Off, a),
                (NoteEventKind::On, b),
            ],
            events
        );
    }

    #[test]
    fn test_enter_without_press_does_nothing() {
        let (mut engine, device) = ready_engine();
        let (mut input, notes) = reconciler();
        input.handle(
            &InputEvent::pointer(note("D4"), PointerPhase::Enter),
            &mut engine,
            IDLE,
        );
        assert!(notes.is_empty());
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_missed_leave_does_not_stick() {
        let (mut engine, _device) = ready_engine();
        let (mut input, notes) = reconciler();
        input.handle(&InputEvent::pointer(note("A3"), PointerPhase::Down), &mut engine, IDLE);
        let changes = input.handle(
            &InputEvent::pointer(note("B3"), PointerPhase::Enter),
            &mut engine,
            IDLE,
        );
        assert_eq!(
            vec![NoteChange::Off(note("A3")), NoteChange::On(note("B3"))],
            changes
        );
        assert_eq!(vec![note("B3")], notes.snapshot());
    }

    #[test]
    fn test_key_repeat_suppressed() {
        let (mut engine, device) = ready_engine();
        let (mut input, notes) = reconciler();

        input.handle(&InputEvent::key_down("a"), &mut engine, IDLE);
        assert!(input.is_key_held("a"));
        assert_eq!(1, device.calls().len());

        let repeat = InputEvent::KeyDown {
            code: "a".to_string(),
            repeat: true,
        };
        for _ in 0..5 {
            assert!(input.handle(&repeat, &mut engine, IDLE).is_empty());
        }
        // Some platforms repeat without the flag.
        assert!(input
            .handle(&InputEvent::key_down("A"), &mut engine, IDLE)
            .is_empty());
        assert_eq!(1, device.calls().len());
        assert_eq!(vec![note("C3")], notes.snapshot());

        input.handle(&InputEvent::key_up("a"), &mut engine, IDLE);
        assert!(notes.is_empty());
        assert_eq!(2, device.calls().len());
    }

    #[test]
    fn test_unmapped_keys_ignored() {
        let (mut engine, device) = ready_engine();
        let (mut input, notes) = reconciler();
        assert!(input
            .handle(&InputEvent::key_down("z"), &mut engine, IDLE)
            .is_empty());
        assert!(input
            .handle(&InputEvent::key_up("z"), &mut engine, IDLE)
            .is_empty());
        assert!(notes.is_empty());
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_dropped_while_not_ready() {
        let (mut engine, device) = engine_with(Arc::new(StaticSamples));
        let (mut input, notes) = reconciler();

        input.handle(&InputEvent::key_down("h"), &mut engine, IDLE);
        input.handle(&InputEvent::TouchStart(note("C4")), &mut engine, IDLE);
        assert!(notes.is_empty());
        assert!(device.calls().is_empty());

        engine.unlock_output().expect("unlock");
        engine
            .wait_until_settled(Duration::from_secs(3))
            .expect("settled")
            .expect("loaded");
        device.clear_calls();

        // Nothing was queued while loading.
        assert!(notes.is_empty());
        input.handle(&InputEvent::key_up("h"), &mut engine, IDLE);
        input.handle(&InputEvent::TouchEnd(note("C4")), &mut engine, IDLE);
        assert!(device.calls().is_empty());

        input.handle(&InputEvent::key_down("h"), &mut engine, IDLE);
        assert_eq!(vec![note("A3")], notes.snapshot());
        assert_eq!(1, device.note_events().len());
    }

    #[test]
    fn test_mute_short_circuits() {
        let (mut engine, device) = ready_engine();
        let (mut input, notes) = reconciler();
        engine.set_muted(true);
        device.clear_calls();

        assert!(input
            .handle(&InputEvent::key_down("k"), &mut engine, IDLE)
            .is_empty());
        assert!(notes.is_empty());
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_rejected_while_playing() {
        let (mut engine, device) = ready_engine();
        let (mut input, notes) = reconciler();
        let playing = PlaybackState::Playing;

        assert!(input
            .handle(&InputEvent::key_down("k"), &mut engine, playing)
            .is_empty());
        assert!(input
            .handle(
                &InputEvent::pointer(note("E4"), PointerPhase::Down),
                &mut engine,
                playing
            )
            .is_empty());
        assert!(notes.is_empty());
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_emulated_pointer_ignored() {
        let (mut engine, device) = ready_engine();
        let (mut input, notes) = reconciler();

        input.handle(&InputEvent::TouchStart(note("G4")), &mut engine, IDLE);
        let emulated = InputEvent::Pointer {
            note: note("G4"),
            phase: PointerPhase::Down,
            emulated: true,
        };
        assert!(input.handle(&emulated, &mut engine, IDLE).is_empty());
        assert!(!input.is_primary_held());

        input.handle(&InputEvent::TouchEnd(note("G4")), &mut engine, IDLE);
        assert!(notes.is_empty());
        assert_eq!(2, device.note_events().len());
    }

    #[test]
    fn test_channels_share_the_note_set() {
        let (mut engine, device) = ready_engine();
        let (mut input, notes) = reconciler();

        input.handle(&InputEvent::key_down("k"), &mut engine, IDLE);
        // Already on from the keyboard, so the pointer adds nothing.
        assert!(input
            .handle(
                &InputEvent::pointer(note("C4"), PointerPhase::Down),
                &mut engine,
                IDLE
            )
            .is_empty());
        assert_eq!(vec![note("C4")], notes.snapshot());
        assert_eq!(1, device.note_events().len());
    }

    #[test]
    fn test_focus_lost_releases_everything() {
        let (mut engine, device) = ready_engine();
        let (mut input, notes) = reconciler();

        input.handle(&InputEvent::key_down("a"), &mut engine, IDLE);
        input.handle(&InputEvent::key_down("d"), &mut engine, IDLE);
        input.handle(&InputEvent::pointer(note("C5"), PointerPhase::Down), &mut engine, IDLE);
        assert_eq!(3, notes.len());

        let changes = input.handle(&InputEvent::FocusLost, &mut engine, IDLE);
        assert_eq!(3, changes.len());
        assert!(notes.is_empty());
        assert!(!input.is_key_held("a"));
        assert_eq!(
            3,
            device
                .calls()
                .iter()
                .filter(|call| matches!(call, Call::Release { .. }))
                .count()
        );
    }
}
