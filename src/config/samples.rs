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
    sync::Arc,
    time::Duration,
};

use serde::Deserialize;

use super::{duration_or, ConfigError};
use crate::samples::{FileSamples, SampleProvider, SynthesizedSamples};

const DEFAULT_SYNTH_LENGTH: Duration = Duration::from_millis(2500);

/// Where the piano samples come from.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Samples {
    /// A directory of sample files. When absent the piano is synthesized.
    directory: Option<PathBuf>,

    /// The sample file extension (default: mp3).
    extension: Option<String>,

    /// How long each synthesized note is rendered for (default: 2.5s).
    length: Option<String>,
}

impl Samples {
    /// Creates a samples configuration reading from the given directory.
    pub fn from_directory(directory: &Path, extension: Option<&str>) -> Samples {
        Samples {
            directory: Some(directory.to_path_buf()),
            extension: extension.map(str::to_string),
            length: None,
        }
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// Resolves a relative sample directory against the given base.
    pub(super) fn resolve(&mut self, base: &Path) {
        if let Some(directory) = &self.directory {
            if directory.is_relative() {
                self.directory = Some(base.join(directory));
            }
        }
    }

    /// Returns the synthesized note length.
    pub fn length(&self) -> Result<Duration, ConfigError> {
        duration_or("samples.length", &self.length, DEFAULT_SYNTH_LENGTH)
    }

    /// Builds the sample provider this configuration describes.
    pub fn provider(&self) -> Result<Arc<dyn SampleProvider>, ConfigError> {
        Ok(match &self.directory {
            Some(directory) => Arc::new(FileSamples::new(directory, self.extension.as_deref())),
            None => Arc::new(SynthesizedSamples::new(Some(self.length()?))),
        })
    }
}
