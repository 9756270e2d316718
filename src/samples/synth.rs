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
//! A synthesized piano used when no sample directory is configured.
//!
//! Each note is rendered once as an FM triangle tone: a triangle carrier frequency
//! modulated by a sine at 1.2 times the note frequency, shaped by an attack/decay/
//! sustain envelope and a short noise transient for the hammer.

use std::{collections::HashMap, f64::consts::TAU, time::Duration};

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{info, span, Level};

use super::{LoadError, LoadedSample, SampleProvider, SampleSet};
use crate::notes::NoteId;

const DEFAULT_LENGTH: Duration = Duration::from_millis(2500);
const HARMONICITY: f64 = 1.2;
const MODULATION_INDEX: f64 = 0.8;
const ATTACK: f64 = 0.01;
const DECAY: f64 = 0.4;
const SUSTAIN: f64 = 0.1;
const HAMMER_LENGTH: f64 = 0.006;
const HAMMER_LEVEL: f64 = 0.08;
const PEAK: f64 = 0.8;

/// Renders every requested note with the FM piano patch.
pub struct SynthesizedSamples {
    length: Duration,
}

impl SynthesizedSamples {
    pub fn new(length: Option<Duration>) -> SynthesizedSamples {
        SynthesizedSamples {
            length: length.unwrap_or(DEFAULT_LENGTH),
        }
    }

    /// Renders a single note.
    pub fn render(&self, note: &NoteId, sample_rate: u32) -> Vec<f32> {
        let sample_rate = f64::from(sample_rate);
        let frames = (self.length.as_secs_f64() * sample_rate) as usize;
        let frequency = note.frequency();
        let mut rng = StdRng::seed_from_u64(note.midi_number() as u64);

        let mut carrier_phase = 0.0f64;
        let mut modulator_phase = 0.0f64;
        let mut output = Vec::with_capacity(frames);
        for frame in 0..frames {
            let t = frame as f64 / sample_rate;

            let modulator = (modulator_phase * TAU).sin();
            modulator_phase = (modulator_phase + frequency * HARMONICITY / sample_rate).fract();
            // The modulation fades with the envelope's decay, so the tone mellows.
            let index = MODULATION_INDEX * (-t / DECAY).exp();
            let instantaneous = frequency * (1.0 + index * modulator);
            carrier_phase = (carrier_phase + instantaneous / sample_rate).rem_euclid(1.0);

            let mut value = triangle(carrier_phase) * envelope(t);
            if t < HAMMER_LENGTH {
                value += rng.gen_range(-1.0..1.0) * HAMMER_LEVEL * (1.0 - t / HAMMER_LENGTH);
            }
            output.push((value * PEAK) as f32);
        }
        output
    }
}

impl SampleProvider for SynthesizedSamples {
    fn load(&self, notes: &[NoteId], sample_rate: u32) -> Result<SampleSet, LoadError> {
        let span = span!(Level::INFO, "render samples");
        let _enter = span.enter();

        if notes.is_empty() {
            return Err(LoadError::NoNotes);
        }

        let samples: HashMap<NoteId, LoadedSample> = notes
            .iter()
            .map(|note| (*note, LoadedSample::new(self.render(note, sample_rate))))
            .collect();

        let set = SampleSet::new(sample_rate, samples);
        info!(
            notes = set.len(),
            memory_kb = set.memory_usage() / 1024,
            "Rendered synthesized piano"
        );
        Ok(set)
    }
}

fn triangle(phase: f64) -> f64 {
    1.0 - 4.0 * (phase - 0.5).abs()
}

/// Attack, then an exponential fall to the sustain level, then a slow natural decay.
fn envelope(t: f64) -> f64 {
    if t < ATTACK {
        return t / ATTACK;
    }
    let since_attack = t - ATTACK;
    let decayed = SUSTAIN + (1.0 - SUSTAIN) * (-since_attack * 5.0 / DECAY).exp();
    decayed * (-since_attack / 3.0).exp()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_render_shape() {
        let synth = SynthesizedSamples::new(Some(Duration::from_millis(500)));
        let a4: NoteId = "A4".parse().expect("note");
        let rendered = synth.render(&a4, 8000);

        assert_eq!(4000, rendered.len());
        assert!(rendered.iter().all(|s| s.abs() <= 1.0));

        let peak = |range: std::ops::Range<usize>| {
            rendered[range]
                .iter()
                .fold(0.0f32, |acc, s| acc.max(s.abs()))
        };
        // Loud right after the attack, much quieter once the decay has settled.
        assert!(peak(80..400) > 0.5);
        assert!(peak(3600..4000) < 0.2);
        // Deterministic between renders.
        assert_eq!(rendered, synth.render(&a4, 8000));
    }

    #[test]
    fn test_load_covers_every_note() -> Result<(), LoadError> {
        let synth = SynthesizedSamples::new(Some(Duration::from_millis(50)));
        let notes: Vec<NoteId> = ["C3", "C#3", "D3"]
            .iter()
            .map(|n| n.parse().expect("note"))
            .collect();
        let set = synth.load(&notes, 8000)?;
        assert_eq!(3, set.len());
        assert_eq!(400, set.get(&notes[1]).expect("C#3").len());
        assert!(matches!(synth.load(&[], 8000), Err(LoadError::NoNotes)));
        Ok(())
    }
}
