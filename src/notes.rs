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
//! The note registry.
//!
//! Every key on the virtual keyboard is described by an immutable [KeyDescriptor].
//! The [NoteId] is the join key between the registry, the active note set and the
//! voice engine.

use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Pitch class names in ascending order, spelled with sharps.
const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// The lowest octave on the built-in keyboard.
pub const LOWEST_OCTAVE: i8 = 1;

/// The highest octave on the built-in keyboard.
pub const HIGHEST_OCTAVE: i8 = 6;

/// Computer keyboard bindings for C3 through E4. White keys run along the home row,
/// black keys along the row above it.
const DEFAULT_BINDINGS: [(&str, &str); 17] = [
    ("C3", "a"),
    ("C#3", "w"),
    ("D3", "s"),
    ("D#3", "e"),
    ("E3", "d"),
    ("F3", "f"),
    ("F#3", "t"),
    ("G3", "g"),
    ("G#3", "y"),
    ("A3", "h"),
    ("A#3", "u"),
    ("B3", "j"),
    ("C4", "k"),
    ("C#4", "o"),
    ("D4", "l"),
    ("D#4", "p"),
    ("E4", ";"),
];

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum NoteError {
    #[error("malformed note identifier '{0}'")]
    Malformed(String),
    #[error("note {0} appears more than once in the registry")]
    Duplicate(NoteId),
    #[error("input binding '{binding}' is assigned to both {first} and {second}")]
    DuplicateBinding {
        binding: String,
        first: NoteId,
        second: NoteId,
    },
}

/// Identifies a pitch and octave, e.g. `C#4`. Ordered by pitch.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NoteId {
    octave: i8,
    pitch_class: u8,
}

impl NoteId {
    /// Creates a note from a pitch class index (0 = C) and an octave.
    pub fn new(pitch_class: u8, octave: i8) -> Result<NoteId, NoteError> {
        if pitch_class as usize >= PITCH_CLASSES.len() {
            return Err(NoteError::Malformed(format!("{}{}", pitch_class, octave)));
        }
        Ok(NoteId {
            octave,
            pitch_class,
        })
    }

    /// Creates a note from a MIDI note number, where 60 is C4.
    pub fn from_midi(number: u8) -> NoteId {
        NoteId {
            octave: (number / 12) as i8 - 1,
            pitch_class: number % 12,
        }
    }

    /// The pitch class name, spelled with a sharp where needed.
    pub fn pitch_class(&self) -> &'static str {
        PITCH_CLASSES[self.pitch_class as usize]
    }

    pub fn octave(&self) -> i8 {
        self.octave
    }

    pub fn color(&self) -> KeyColor {
        if self.pitch_class().ends_with('#') {
            KeyColor::Black
        } else {
            KeyColor::White
        }
    }

    /// The MIDI note number for this note.
    pub fn midi_number(&self) -> i32 {
        (i32::from(self.octave) + 1) * 12 + i32::from(self.pitch_class)
    }

    /// The equal tempered frequency of this note, tuned to A4 = 440 Hz.
    pub fn frequency(&self) -> f64 {
        440.0 * 2f64.powf(f64::from(self.midi_number() - 69) / 12.0)
    }

    /// A spoken form of the note, e.g. "C sharp 4".
    pub fn spoken_name(&self) -> String {
        let name = self.pitch_class();
        match name.strip_suffix('#') {
            Some(natural) => format!("{} sharp {}", natural, self.octave),
            None => format!("{} {}", name, self.octave),
        }
    }
}

impl FromStr for NoteId {
    type Err = NoteError;

    /// Parses identifiers such as `C4`, `C#4`, `Db4` or `A-1`. Flats are normalized to
    /// their sharp spelling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || NoteError::Malformed(s.to_string());
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        let letter = chars.next().ok_or_else(malformed)?.to_ascii_uppercase();
        let natural = PITCH_CLASSES
            .iter()
            .position(|name| name.len() == 1 && name.starts_with(letter))
            .ok_or_else(malformed)? as i32;

        let rest = chars.as_str();
        let (offset, octave) = if let Some(octave) = rest.strip_prefix('#') {
            (1, octave)
        } else if let Some(octave) = rest.strip_prefix('b') {
            (-1, octave)
        } else {
            (0, rest)
        };

        let octave: i8 = octave.parse().map_err(|_| malformed())?;
        let midi = (i32::from(octave) + 1) * 12 + natural + offset;
        if !(0..=127).contains(&midi) {
            return Err(malformed());
        }
        Ok(NoteId::from_midi(midi as u8))
    }
}

impl TryFrom<String> for NoteId {
    type Error = NoteError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NoteId> for String {
    fn from(note: NoteId) -> Self {
        note.to_string()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pitch_class(), self.octave)
    }
}

impl fmt::Debug for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// The color of a key on the keyboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyColor {
    White,
    Black,
}

/// Static metadata for one key.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyDescriptor {
    id: NoteId,
    input_binding: Option<String>,
}

impl KeyDescriptor {
    /// Creates a new key descriptor. Bindings are stored lowercased.
    pub fn new(id: NoteId, input_binding: Option<&str>) -> KeyDescriptor {
        KeyDescriptor {
            id,
            input_binding: input_binding.map(str::to_lowercase),
        }
    }

    pub fn id(&self) -> NoteId {
        self.id
    }

    pub fn pitch_class(&self) -> &'static str {
        self.id.pitch_class()
    }

    pub fn octave(&self) -> i8 {
        self.id.octave()
    }

    pub fn color(&self) -> KeyColor {
        self.id.color()
    }

    /// The physical key that plays this note, if any.
    pub fn input_binding(&self) -> Option<&str> {
        self.input_binding.as_deref()
    }

    /// The label drawn on the key: its binding, uppercased, or nothing.
    pub fn display_label(&self) -> String {
        self.input_binding
            .as_deref()
            .map(str::to_uppercase)
            .unwrap_or_default()
    }
}

/// An ordered, immutable table of keys with derived lookups.
#[derive(Clone, Debug)]
pub struct NoteRegistry {
    keys: Vec<KeyDescriptor>,
    index: HashMap<NoteId, usize>,
    bindings: HashMap<String, NoteId>,
}

impl NoteRegistry {
    /// Builds a registry from the given descriptors, rejecting duplicate notes and
    /// duplicate bindings.
    pub fn new(keys: Vec<KeyDescriptor>) -> Result<NoteRegistry, NoteError> {
        let mut index = HashMap::with_capacity(keys.len());
        let mut bindings: HashMap<String, NoteId> = HashMap::new();

        for (position, key) in keys.iter().enumerate() {
            if index.insert(key.id(), position).is_some() {
                return Err(NoteError::Duplicate(key.id()));
            }
            if let Some(binding) = key.input_binding() {
                if let Some(first) = bindings.insert(binding.to_string(), key.id()) {
                    return Err(NoteError::DuplicateBinding {
                        binding: binding.to_string(),
                        first,
                        second: key.id(),
                    });
                }
            }
        }

        Ok(NoteRegistry {
            keys,
            index,
            bindings,
        })
    }

    /// All keys in keyboard order.
    pub fn keys(&self) -> &[KeyDescriptor] {
        &self.keys
    }

    pub fn white_keys(&self) -> impl Iterator<Item = &KeyDescriptor> {
        self.keys.iter().filter(|k| k.color() == KeyColor::White)
    }

    pub fn black_keys(&self) -> impl Iterator<Item = &KeyDescriptor> {
        self.keys.iter().filter(|k| k.color() == KeyColor::Black)
    }

    pub fn get(&self, note: &NoteId) -> Option<&KeyDescriptor> {
        self.index.get(note).map(|position| &self.keys[*position])
    }

    pub fn contains(&self, note: &NoteId) -> bool {
        self.index.contains_key(note)
    }

    /// Looks up the note bound to a physical key code. Matching is case-insensitive.
    pub fn note_for_binding(&self, code: &str) -> Option<NoteId> {
        self.bindings.get(&code.to_lowercase()).copied()
    }

    /// Every note id in keyboard order.
    pub fn note_ids(&self) -> Vec<NoteId> {
        self.keys.iter().map(KeyDescriptor::id).collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Default for NoteRegistry {
    /// The built-in keyboard, C1 through B6, with bindings from C3 to E4.
    fn default() -> Self {
        let bindings: HashMap<NoteId, &str> = DEFAULT_BINDINGS
            .iter()
            .filter_map(|(note, binding)| note.parse().ok().map(|note| (note, *binding)))
            .collect();

        let keys = (LOWEST_OCTAVE..=HIGHEST_OCTAVE)
            .flat_map(|octave| (0..PITCH_CLASSES.len() as u8).map(move |pc| (pc, octave)))
            .map(|(pitch_class, octave)| NoteId {
                octave,
                pitch_class,
            })
            .map(|id| KeyDescriptor::new(id, bindings.get(&id).copied()))
            .collect();

        NoteRegistry::new(keys).unwrap_or_else(|_| NoteRegistry {
            keys: Vec::new(),
            index: HashMap::new(),
            bindings: HashMap::new(),
        })
    }
}
