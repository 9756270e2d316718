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
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use super::{duration_or, ConfigError};

const DEFAULT_BPM: f64 = 120.0;
const DEFAULT_CLEANUP_BUFFER: Duration = Duration::from_millis(800);
const DEFAULT_LOOKAHEAD: Duration = Duration::ZERO;

/// Scripted melody playback.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Playback {
    /// Tempo in beats per minute (default: 120).
    bpm: Option<f64>,

    /// Time after the last note ends before playback returns to idle (default: 800ms).
    cleanup_buffer: Option<String>,

    /// How far ahead of the clock scripted events are dispatched (default: 0ms).
    lookahead: Option<String>,

    /// A melody file. When absent the built-in melody is played.
    melody: Option<PathBuf>,
}

impl Playback {
    pub fn bpm(&self) -> Result<f64, ConfigError> {
        let bpm = self.bpm.unwrap_or(DEFAULT_BPM);
        if !(bpm.is_finite() && bpm > 0.0) {
            return Err(ConfigError::Invalid {
                field: "playback.bpm",
                reason: format!("{} is not a positive tempo", bpm),
            });
        }
        Ok(bpm)
    }

    pub fn cleanup_buffer(&self) -> Result<Duration, ConfigError> {
        duration_or(
            "playback.cleanup_buffer",
            &self.cleanup_buffer,
            DEFAULT_CLEANUP_BUFFER,
        )
    }

    pub fn lookahead(&self) -> Result<Duration, ConfigError> {
        duration_or("playback.lookahead", &self.lookahead, DEFAULT_LOOKAHEAD)
    }

    pub fn melody(&self) -> Option<&Path> {
        self.melody.as_deref()
    }

    /// Overrides the melody file.
    pub fn set_melody(&mut self, melody: &Path) {
        self.melody = Some(melody.to_path_buf());
    }

    pub(super) fn resolve(&mut self, base: &Path) {
        if let Some(melody) = &self.melody {
            if melody.is_relative() {
                self.melody = Some(base.join(melody));
            }
        }
    }
}
