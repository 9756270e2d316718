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
use std::path::Path;

use config::{Config, File, FileFormat};
use serde::Deserialize;

use super::{Audio, ConfigError, Playback, Samples, Voice};

/// The configuration for the piano. Every section is optional.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Player {
    #[serde(default)]
    audio: Audio,
    #[serde(default)]
    samples: Samples,
    #[serde(default)]
    voice: Voice,
    #[serde(default)]
    playback: Playback,
}

impl Player {
    /// Parse a player configuration from a YAML file. Relative paths in the file are
    /// resolved against the file's directory.
    pub fn deserialize(path: &Path) -> Result<Player, ConfigError> {
        let mut player = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Player>()?;

        if let Some(base) = path.parent() {
            player.samples.resolve(base);
            player.playback.resolve(base);
        }
        Ok(player)
    }

    /// Parse a player configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Player, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<Player>()?)
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn set_audio(&mut self, audio: Audio) {
        self.audio = audio;
    }

    pub fn samples(&self) -> &Samples {
        &self.samples
    }

    pub fn set_samples(&mut self, samples: Samples) {
        self.samples = samples;
    }

    pub fn voice(&self) -> &Voice {
        &self.voice
    }

    pub fn playback(&self) -> &Playback {
        &self.playback
    }

    pub fn playback_mut(&mut self) -> &mut Playback {
        &mut self.playback
    }
}
