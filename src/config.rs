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

use duration_string::DurationString;

pub mod audio;
pub mod error;
pub mod playback;
pub mod player;
pub mod samples;
pub mod voice;

pub use audio::{Audio, Reverb};
pub use error::ConfigError;
pub use playback::Playback;
pub use player::Player;
pub use samples::Samples;
pub use voice::Voice;

/// Parses an optional duration field such as `50ms` or `1.2s`, falling back to the default.
fn duration_or(
    field: &'static str,
    value: &Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => parse_duration(field, value),
        None => Ok(default),
    }
}

fn parse_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let trimmed = value.trim();
    // duration-string has no fractional units, so plain and fractional seconds are read here.
    if let Some(seconds) = trimmed
        .strip_suffix('s')
        .filter(|s| !s.ends_with('m') && !s.ends_with('n') && !s.ends_with('u'))
        .or(Some(trimmed))
        .and_then(|s| s.parse::<f64>().ok())
    {
        if seconds.is_finite() && seconds >= 0.0 {
            return Ok(Duration::from_secs_f64(seconds));
        }
    }

    DurationString::from_string(trimmed.to_string())
        .map(Duration::from)
        .map_err(|e| ConfigError::Duration {
            field,
            value: value.to_string(),
            reason: e.to_string(),
        })
}
