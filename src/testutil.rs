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
//! Shared fixtures for tests.

use std::{
    collections::HashMap,
    error::Error,
    fs::File,
    path::PathBuf,
    sync::Arc,
    thread,
    time::{Duration, SystemTime},
};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::{
    audio::mock,
    engine::{EngineSettings, VoiceEngine},
    notes::{NoteId, NoteRegistry},
    samples::{LoadError, LoadedSample, SampleProvider, SampleSet},
};

/// A provider that hands back a tiny buffer for every note, immediately.
pub struct StaticSamples;

impl SampleProvider for StaticSamples {
    fn load(&self, notes: &[NoteId], sample_rate: u32) -> Result<SampleSet, LoadError> {
        let samples: HashMap<NoteId, LoadedSample> = notes
            .iter()
            .map(|note| (*note, LoadedSample::new(vec![0.5; 16])))
            .collect();
        Ok(SampleSet::new(sample_rate, samples))
    }
}

/// A provider whose fetch always fails.
pub struct FailingSamples;

impl SampleProvider for FailingSamples {
    fn load(&self, _: &[NoteId], _: u32) -> Result<SampleSet, LoadError> {
        Err(LoadError::NoSamples(PathBuf::from("/nowhere")))
    }
}

/// Parses a note, panicking on malformed input.
pub fn note(s: &str) -> NoteId {
    s.parse().expect("valid note")
}

/// Creates an engine over the default registry and a mock device.
pub fn engine_with(provider: Arc<dyn SampleProvider>) -> (VoiceEngine, mock::Device) {
    let device = mock::Device::get("mock-piano");
    let engine = VoiceEngine::new(
        Arc::new(device.clone()),
        provider,
        NoteRegistry::default().note_ids(),
        EngineSettings::default(),
    );
    (engine, device)
}

/// Creates an engine that has been unlocked and has finished loading samples. The mock
/// device's call log is cleared.
pub fn ready_engine() -> (VoiceEngine, mock::Device) {
    let (mut engine, device) = engine_with(Arc::new(StaticSamples));
    engine.unlock_output().expect("unlock");
    engine
        .wait_until_settled(Duration::from_secs(3))
        .expect("load finished")
        .expect("load succeeded");
    assert!(engine.is_ready());
    device.clear_calls();
    (engine, device)
}

/// Asserts two times are equal to within a microsecond.
pub fn assert_time(expected: f64, actual: f64) {
    assert!(
        (expected - actual).abs() < 1e-6,
        "expected time {}, got {}",
        expected,
        actual
    );
}

/// Wait for the given predicate to return true or fail.
#[inline]
pub fn eventually<F>(predicate: F, error_msg: &str)
where
    F: Fn() -> bool,
{
    let start = SystemTime::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        let elapsed = start.elapsed().expect("System time error");
        if elapsed > timeout {
            panic!("{}", error_msg);
        }
        if predicate() {
            return;
        }
        thread::sleep(tick);
    }
}

/// Writes mono channels of float samples to a WAV file.
pub fn write_wav(
    path: PathBuf,
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
) -> Result<(), Box<dyn Error>> {
    let file = File::create(path)?;
    let num_channels = channels.len();
    assert!(num_channels <= u16::MAX.into(), "Too many channels!");
    let mut writer = WavWriter::new(
        file,
        WavSpec {
            channels: num_channels as u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
    )?;

    let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
    for frame in 0..frames {
        for channel in channels.iter() {
            writer.write_sample(channel.get(frame).copied().unwrap_or(0.0))?;
        }
    }
    writer.finalize()?;

    Ok(())
}
