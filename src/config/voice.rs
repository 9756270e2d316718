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

const DEFAULT_VELOCITY: f32 = 0.8;
const DEFAULT_RELEASE_GRACE: Duration = Duration::from_millis(50);
const DEFAULT_RELEASE: Duration = Duration::from_millis(1200);

/// How voices are triggered and released.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Voice {
    /// Velocity used when none is given (default: 0.8).
    velocity: Option<f32>,

    /// Delay added to note-offs without an explicit time (default: 50ms).
    release_grace: Option<String>,

    /// The release fade of a voice after its note-off (default: 1.2s).
    release: Option<String>,
}

impl Voice {
    pub fn velocity(&self) -> Result<f32, ConfigError> {
        let velocity = self.velocity.unwrap_or(DEFAULT_VELOCITY);
        if !(0.0..=1.0).contains(&velocity) {
            return Err(ConfigError::Invalid {
                field: "voice.velocity",
                reason: format!("{} is outside 0 to 1", velocity),
            });
        }
        Ok(velocity)
    }

    pub fn release_grace(&self) -> Result<Duration, ConfigError> {
        duration_or("voice.release_grace", &self.release_grace, DEFAULT_RELEASE_GRACE)
    }

    pub fn release(&self) -> Result<Duration, ConfigError> {
        duration_or("voice.release", &self.release, DEFAULT_RELEASE)
    }
}
