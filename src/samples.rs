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
//! Piano sample sets.
//!
//! This module provides:
//! - The in-memory [SampleSet] handed to the audio device once loading completes
//! - Decoding of sample files from disk, with repitching to fill gaps
//! - A synthesized fallback set rendered from an FM piano patch

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use crate::notes::NoteId;

mod decode;
mod loader;
mod resample;
mod synth;

pub use loader::FileSamples;
pub use synth::SynthesizedSamples;

/// Errors raised while building a sample set.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unable to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        source: symphonia::core::errors::Error,
    },

    #[error("{0} contains no audio track")]
    NoTrack(PathBuf),

    #[error("no samples found in {0}")]
    NoSamples(PathBuf),

    #[error("no notes were requested")]
    NoNotes,

    #[error("unable to resample by {ratio}: {reason}")]
    Resample { ratio: f64, reason: String },
}

/// A mono sample held in memory, already at the output sample rate.
#[derive(Clone)]
pub struct LoadedSample {
    data: Arc<Vec<f32>>,
}

impl LoadedSample {
    pub fn new(data: Vec<f32>) -> LoadedSample {
        LoadedSample {
            data: Arc::new(data),
        }
    }

    /// The sample frames.
    pub fn data(&self) -> Arc<Vec<f32>> {
        self.data.clone()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One sample per playable note, all at the same sample rate.
pub struct SampleSet {
    sample_rate: u32,
    samples: HashMap<NoteId, LoadedSample>,
}

impl SampleSet {
    pub fn new(sample_rate: u32, samples: HashMap<NoteId, LoadedSample>) -> SampleSet {
        SampleSet {
            sample_rate,
            samples,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn get(&self, note: &NoteId) -> Option<&LoadedSample> {
        self.samples.get(note)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Total memory held by the sample data, in bytes.
    pub fn memory_usage(&self) -> usize {
        self.samples
            .values()
            .map(|s| s.len() * std::mem::size_of::<f32>())
            .sum()
    }
}

impl std::fmt::Debug for SampleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleSet")
            .field("notes", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .field("memory_kb", &(self.memory_usage() / 1024))
            .finish()
    }
}

/// Produces a sample set for the given notes. Providers run on a background thread, so
/// they may block.
pub trait SampleProvider: Send + Sync {
    fn load(&self, notes: &[NoteId], sample_rate: u32) -> Result<SampleSet, LoadError>;
}
