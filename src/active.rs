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
//! The set of notes currently sounding because of user interaction or scripted playback.
//!
//! The set is shared between the writers (the input reconciler and the playback
//! scheduler) and the rendering layer, so it is a cheap cloneable handle.

use std::{collections::BTreeSet, sync::Arc};

use parking_lot::RwLock;

use crate::notes::NoteId;

/// A shared handle to the active note set.
#[derive(Clone, Default)]
pub struct ActiveNotes {
    notes: Arc<RwLock<BTreeSet<NoteId>>>,
}

impl ActiveNotes {
    pub fn new() -> ActiveNotes {
        ActiveNotes::default()
    }

    /// Adds the note. Returns false if it was already active.
    pub fn press(&self, note: NoteId) -> bool {
        self.notes.write().insert(note)
    }

    /// Removes the note. Returns false if it was not active.
    pub fn release(&self, note: &NoteId) -> bool {
        self.notes.write().remove(note)
    }

    pub fn contains(&self, note: &NoteId) -> bool {
        self.notes.read().contains(note)
    }

    /// Empties the set, returning the notes that were active.
    pub fn clear(&self) -> Vec<NoteId> {
        let mut notes = self.notes.write();
        std::mem::take(&mut *notes).into_iter().collect()
    }

    /// The active notes in pitch order.
    pub fn snapshot(&self) -> Vec<NoteId> {
        self.notes.read().iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.notes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.read().is_empty()
    }
}

impl std::fmt::Debug for ActiveNotes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.notes.read().iter()).finish()
    }
}
