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
//! Loads piano samples from a directory of audio files.
//!
//! Files are named after the note they hold, with sharps spelled `s`: `C4.mp3`,
//! `Ds4.mp3`, `Fs2.wav`. A sparse set is fine: notes without a file of their own are
//! repitched from the nearest recorded note.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use tracing::{debug, info, span, Level};

use super::{
    decode::decode_file, resample::resample, LoadError, LoadedSample, SampleProvider, SampleSet,
};
use crate::notes::NoteId;

const DEFAULT_EXTENSION: &str = "mp3";

/// Sample files on disk.
pub struct FileSamples {
    directory: PathBuf,
    extension: String,
}

impl FileSamples {
    pub fn new(directory: &Path, extension: Option<&str>) -> FileSamples {
        FileSamples {
            directory: directory.to_path_buf(),
            extension: extension
                .unwrap_or(DEFAULT_EXTENSION)
                .trim_start_matches('.')
                .to_string(),
        }
    }

    /// The file that would hold the given note.
    pub fn path_for(&self, note: &NoteId) -> PathBuf {
        let name = format!(
            "{}{}.{}",
            note.pitch_class().replace('#', "s"),
            note.octave(),
            self.extension
        );
        self.directory.join(name)
    }

    /// Decodes the file for a note, converted to the target rate. Missing files yield None.
    fn load_note(&self, note: &NoteId, sample_rate: u32) -> Result<Option<Vec<f32>>, LoadError> {
        let path = self.path_for(note);
        if !path.is_file() {
            return Ok(None);
        }

        let decoded = decode_file(&path)?;
        debug!(
            note = %note,
            file = %path.display(),
            frames = decoded.samples.len(),
            sample_rate = decoded.sample_rate,
            "Decoded sample"
        );

        if decoded.sample_rate == sample_rate {
            return Ok(Some(decoded.samples));
        }
        Ok(Some(resample(
            &decoded.samples,
            sample_rate as f64 / decoded.sample_rate as f64,
        )?))
    }
}

impl SampleProvider for FileSamples {
    fn load(&self, notes: &[NoteId], sample_rate: u32) -> Result<SampleSet, LoadError> {
        let span = span!(Level::INFO, "load samples");
        let _enter = span.enter();

        if notes.is_empty() {
            return Err(LoadError::NoNotes);
        }

        let mut recorded: Vec<(NoteId, Vec<f32>)> = Vec::new();
        for note in notes {
            if let Some(samples) = self.load_note(note, sample_rate)? {
                recorded.push((*note, samples));
            }
        }
        if recorded.is_empty() {
            return Err(LoadError::NoSamples(self.directory.clone()));
        }

        let mut samples = HashMap::with_capacity(notes.len());
        for note in notes {
            let Some((source, data)) = recorded
                .iter()
                .min_by_key(|(source, _)| (source.midi_number() - note.midi_number()).abs())
            else {
                continue;
            };

            let semitones = note.midi_number() - source.midi_number();
            let data = if semitones == 0 {
                data.clone()
            } else {
                // Raising the pitch shortens the sample.
                resample(data, 2f64.powf(-f64::from(semitones) / 12.0))?
            };
            samples.insert(*note, LoadedSample::new(data));
        }

        let set = SampleSet::new(sample_rate, samples);
        info!(
            directory = %self.directory.display(),
            recorded = recorded.len(),
            notes = set.len(),
            memory_kb = set.memory_usage() / 1024,
            "Loaded sample set"
        );
        Ok(set)
    }
}
