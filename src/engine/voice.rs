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
//! Voice bookkeeping for the engine.
//!
//! Each key is monophonic: starting a note cuts whatever voice that key still has,
//! whether it is held or still ringing out its release.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::{audio::VoiceId, notes::NoteId};

/// Global voice ID counter.
static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(1);

struct Voice {
    id: VoiceId,
    note: NoteId,
    released_at: Option<f64>,
}

impl Voice {
    /// True if the voice can still be heard at the given time.
    fn audible_at(&self, at: f64, release: f64) -> bool {
        match self.released_at {
            None => true,
            Some(released_at) => released_at + release > at,
        }
    }
}

/// Tracks the voices the engine has started.
pub struct VoiceManager {
    voices: Vec<Voice>,
    /// Length of a voice's release, used to forget voices that have rung out.
    release: f64,
}

impl VoiceManager {
    pub fn new(release: f64) -> VoiceManager {
        VoiceManager {
            voices: Vec::new(),
            release,
        }
    }

    /// Allocates a voice for the note starting at `at`. Returns the new voice and the
    /// voices of the same key that must be cut at `at`.
    pub fn start(&mut self, note: NoteId, at: f64) -> (VoiceId, Vec<VoiceId>) {
        let release = self.release;
        self.voices.retain(|v| v.audible_at(at, release) || v.note == note);

        let cut: Vec<VoiceId> = self
            .voices
            .iter()
            .filter(|v| v.note == note && v.audible_at(at, release))
            .map(|v| v.id)
            .collect();
        self.voices.retain(|v| v.note != note);
        if !cut.is_empty() {
            debug!(note = %note, voices = cut.len(), "Retriggering key");
        }

        let id = NEXT_VOICE_ID.fetch_add(1, Ordering::SeqCst);
        self.voices.push(Voice {
            id,
            note,
            released_at: None,
        });
        (id, cut)
    }

    /// Marks the held voice for the note as released at `at`, returning it.
    pub fn release(&mut self, note: &NoteId, at: f64) -> Option<VoiceId> {
        let voice = self
            .voices
            .iter_mut()
            .find(|v| v.note == *note && v.released_at.is_none())?;
        voice.released_at = Some(at);
        Some(voice.id)
    }

    /// Forgets every voice, returning their ids.
    pub fn clear(&mut self) -> Vec<VoiceId> {
        self.voices.drain(..).map(|v| v.id).collect()
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}
