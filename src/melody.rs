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
//! Scripted melodies.
//!
//! A melody is an immutable list of events, each placed in musical time. The
//! built-in melody is the opening of the Polovtsian Dances from Prince Igor.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    notes::{NoteId, NoteRegistry},
    transport::Tempo,
};

mod time;

pub use time::{NoteValue, Position};

#[derive(Debug, thiserror::Error)]
pub enum MelodyError {
    #[error("invalid musical time '{value}': {reason}")]
    Time { value: String, reason: String },

    #[error("unable to load melody: {0}")]
    Load(#[from] config::ConfigError),

    #[error("unable to serialize melody: {0}")]
    Serialize(#[from] serde_yml::Error),

    #[error("unable to write melody file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("melody '{0}' has no events")]
    Empty(String),

    #[error("event {index} plays {note}, which is not on the keyboard")]
    UnknownNote { index: usize, note: NoteId },

    #[error("event {index} ({note}) has no length")]
    ZeroDuration { index: usize, note: NoteId },
}

/// A note placed in musical time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScriptedEvent {
    note: NoteId,
    time: Position,
    duration: NoteValue,
}

impl ScriptedEvent {
    pub fn new(note: NoteId, time: Position, duration: NoteValue) -> ScriptedEvent {
        ScriptedEvent {
            note,
            time,
            duration,
        }
    }

    pub fn note(&self) -> NoteId {
        self.note
    }

    pub fn time(&self) -> Position {
        self.time
    }

    pub fn duration(&self) -> NoteValue {
        self.duration
    }

    /// Resolves the event to seconds at the given tempo.
    pub fn at_tempo(&self, tempo: &Tempo) -> TimedEvent {
        TimedEvent {
            note: self.note,
            start: self.time.to_seconds(tempo),
            duration: self.duration.to_seconds(tempo),
        }
    }
}

/// An event resolved to seconds from the start of the melody.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimedEvent {
    pub note: NoteId,
    pub start: f64,
    pub duration: f64,
}

impl TimedEvent {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// A named, ordered sequence of scripted events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Melody {
    #[serde(default)]
    name: String,
    events: Vec<ScriptedEvent>,
}

impl Melody {
    pub fn new(name: &str, events: Vec<ScriptedEvent>) -> Melody {
        Melody {
            name: name.to_string(),
            events,
        }
    }

    /// The opening phrase of "Stranger in Paradise", from the Polovtsian Dances.
    pub fn prince_igor() -> Melody {
        // MIDI note numbers: A3 = 57, C4 = 60, D4 = 62, E4 = 64, F4 = 65, G4 = 67.
        let events = [
            (57, (0, 0), 4),
            (60, (0, 1), 4),
            (64, (0, 2), 4),
            (62, (0, 3), 4),
            (60, (1, 0), 2),
            (57, (1, 2), 2),
            (57, (2, 0), 4),
            (60, (2, 1), 4),
            (64, (2, 2), 4),
            (67, (2, 3), 4),
            (65, (3, 0), 2),
            (62, (3, 2), 2),
        ]
        .into_iter()
        .map(|(midi, (bars, beats), division)| {
            ScriptedEvent::new(
                NoteId::from_midi(midi),
                Position::musical(bars, beats, 0.0),
                NoteValue::note(division),
            )
        })
        .collect();

        Melody::new("Prince Igor", events)
    }

    /// Loads a melody from a YAML file. An unnamed melody takes the file's name.
    pub fn from_file(path: &Path) -> Result<Melody, MelodyError> {
        let mut melody = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Melody>()?;

        if melody.name.is_empty() {
            melody.name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
                .unwrap_or_default();
        }
        info!(
            path = %path.display(),
            name = %melody.name,
            events = melody.events.len(),
            "Loaded melody"
        );
        Ok(melody)
    }

    /// Parses a melody from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Melody, MelodyError> {
        Ok(Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<Melody>()?)
    }

    pub fn to_yaml(&self) -> Result<String, MelodyError> {
        Ok(serde_yml::to_string(self)?)
    }

    /// Writes the melody to a YAML file.
    pub fn save(&self, path: &Path) -> Result<(), MelodyError> {
        fs::write(path, self.to_yaml()?).map_err(|source| MelodyError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), name = %self.name, "Saved melody");
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn events(&self) -> &[ScriptedEvent] {
        &self.events
    }

    /// Checks that the melody has events, that every note is on the keyboard and that
    /// every event has a length.
    pub fn validate(&self, registry: &NoteRegistry) -> Result<(), MelodyError> {
        if self.events.is_empty() {
            return Err(MelodyError::Empty(self.name.clone()));
        }
        for (index, event) in self.events.iter().enumerate() {
            if !registry.contains(&event.note) {
                return Err(MelodyError::UnknownNote {
                    index,
                    note: event.note,
                });
            }
            if event.duration.to_seconds(&Tempo::default()) <= 0.0 {
                return Err(MelodyError::ZeroDuration {
                    index,
                    note: event.note,
                });
            }
        }
        Ok(())
    }

    /// Every event resolved to seconds, in melody order.
    pub fn timed(&self, tempo: &Tempo) -> Vec<TimedEvent> {
        self.events.iter().map(|e| e.at_tempo(tempo)).collect()
    }

    /// The latest end of any event, in seconds.
    pub fn total_duration(&self, tempo: &Tempo) -> f64 {
        self.timed(tempo)
            .iter()
            .map(TimedEvent::end)
            .fold(0.0, f64::max)
    }
}

impl Default for Melody {
    fn default() -> Self {
        Melody::prince_igor()
    }
}
