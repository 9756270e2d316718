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
use std::time::Duration;

use serde::Deserialize;

use super::{duration_or, ConfigError};
use crate::audio::mixer::{db_to_gain, MixSettings};

const DEFAULT_DEVICE: &str = "default";
const DEFAULT_VOLUME_DB: f32 = -10.0;
const DEFAULT_REVERB_DECAY: Duration = Duration::from_millis(1500);
const DEFAULT_REVERB_WET: f32 = 0.3;

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Audio {
    /// The audio device. `default` uses the host's default output.
    device: Option<String>,

    /// Output sample rate in Hz. Defaults to the device's preferred rate.
    sample_rate: Option<u32>,

    /// Master volume in decibels (default: -10).
    volume_db: Option<f32>,

    /// The reverb on the master bus.
    reverb: Option<Reverb>,
}

/// The reverb configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Reverb {
    /// Time for the tail to fall by 60dB (default: 1.5s).
    decay: Option<String>,

    /// Dry/wet crossfade from 0 to 1 (default: 0.3).
    wet: Option<f32>,
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: Some(device.to_string()),
            ..Default::default()
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    /// Returns the requested sample rate, if any.
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    pub fn volume_db(&self) -> f32 {
        self.volume_db.unwrap_or(DEFAULT_VOLUME_DB)
    }

    /// Returns the reverb decay time.
    pub fn reverb_decay(&self) -> Result<Duration, ConfigError> {
        let decay = self.reverb.as_ref().and_then(|r| r.decay.clone());
        duration_or("audio.reverb.decay", &decay, DEFAULT_REVERB_DECAY)
    }

    /// Returns the reverb wet level.
    pub fn reverb_wet(&self) -> Result<f32, ConfigError> {
        let wet = self
            .reverb
            .as_ref()
            .and_then(|r| r.wet)
            .unwrap_or(DEFAULT_REVERB_WET);
        if !(0.0..=1.0).contains(&wet) {
            return Err(ConfigError::Invalid {
                field: "audio.reverb.wet",
                reason: format!("{} is outside 0 to 1", wet),
            });
        }
        Ok(wet)
    }

    /// Returns the master bus settings for the mixer.
    pub fn mix_settings(&self) -> Result<MixSettings, ConfigError> {
        Ok(MixSettings {
            volume: db_to_gain(self.volume_db()),
            reverb_decay: self.reverb_decay()?.as_secs_f64(),
            reverb_wet: self.reverb_wet()?,
        })
    }
}
