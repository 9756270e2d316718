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
use std::any::Any;
use std::{error::Error, fmt, sync::Arc};

use crate::config;
use crate::notes::NoteId;
use crate::samples::SampleSet;

pub mod cpal;
pub mod mixer;
pub mod mock;
pub mod reverb;

/// Identifies one sounding instance of a note.
pub type VoiceId = u64;

/// A time reference in seconds. Every scheduled time handed to a device is measured
/// against the device's own clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// An audio output capable of playing piano voices at scheduled times.
pub trait Device: Any + fmt::Display + std::marker::Send + std::marker::Sync {
    /// Starts audio output. Calling this again once output is running does nothing.
    fn unlock(&self) -> Result<(), Box<dyn Error>>;

    /// Hands the loaded sample set to the output.
    fn install_samples(&self, samples: Arc<SampleSet>) -> Result<(), Box<dyn Error>>;

    /// Starts a voice for the note at the given clock time.
    fn start_voice(
        &self,
        voice: VoiceId,
        note: NoteId,
        at: f64,
        velocity: f32,
    ) -> Result<(), Box<dyn Error>>;

    /// Begins the release of a voice at the given clock time, fading out over `fade`
    /// seconds.
    fn release_voice(&self, voice: VoiceId, at: f64, fade: f64) -> Result<(), Box<dyn Error>>;

    /// Silences every voice, including voices scheduled to start in the future.
    fn release_all(&self) -> Result<(), Box<dyn Error>>;

    /// Mutes or unmutes the output. Voices keep playing underneath.
    fn set_muted(&self, muted: bool) -> Result<(), Box<dyn Error>>;

    /// The output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// The clock that scheduled times are measured against.
    fn clock(&self) -> Arc<dyn Clock>;

    /// Stops output and releases the underlying resources. Safe to call more than once.
    fn dispose(&self);

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Device>, Box<dyn Error>>;
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets the device described by the given configuration.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(device)));
    };

    Ok(Arc::new(cpal::Device::get(config)?))
}
