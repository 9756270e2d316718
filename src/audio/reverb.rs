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
//! A Schroeder reverb for the master bus: four parallel damped comb filters feeding
//! two series allpass filters.

/// Comb delays in frames at 48kHz.
const COMB_DELAYS: [usize; 4] = [1557, 1617, 1491, 1422];

/// Allpass delays in frames at 48kHz.
const ALLPASS_DELAYS: [usize; 2] = [225, 556];

const ALLPASS_GAIN: f32 = 0.5;
const DAMPING: f32 = 0.4;

struct Comb {
    buffer: Vec<f32>,
    position: usize,
    feedback: f32,
    filtered: f32,
}

impl Comb {
    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.position];
        self.filtered = delayed * (1.0 - DAMPING) + self.filtered * DAMPING;
        self.buffer[self.position] = input + self.filtered * self.feedback;
        self.position = (self.position + 1) % self.buffer.len();
        delayed
    }
}

struct Allpass {
    buffer: Vec<f32>,
    position: usize,
}

impl Allpass {
    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.position];
        let output = -ALLPASS_GAIN * input + delayed;
        self.buffer[self.position] = input + ALLPASS_GAIN * delayed;
        self.position = (self.position + 1) % self.buffer.len();
        output
    }
}

/// The reverb. `decay` is the time in seconds for the tail to fall by 60dB, `wet` is
/// the crossfade between the dry and the reverberated signal.
pub struct Reverb {
    combs: Vec<Comb>,
    allpasses: Vec<Allpass>,
    wet: f32,
}

impl Reverb {
    pub fn new(sample_rate: u32, decay: f64, wet: f32) -> Reverb {
        let scale = |frames: usize| ((frames as f64 * sample_rate as f64 / 48000.0) as usize).max(1);
        let decay = decay.max(0.01);

        let combs = COMB_DELAYS
            .iter()
            .map(|delay| {
                let frames = scale(*delay);
                let delay_secs = frames as f64 / sample_rate as f64;
                Comb {
                    buffer: vec![0.0; frames],
                    position: 0,
                    feedback: 10f64.powf(-3.0 * delay_secs / decay).min(0.98) as f32,
                    filtered: 0.0,
                }
            })
            .collect();
        let allpasses = ALLPASS_DELAYS
            .iter()
            .map(|delay| Allpass {
                buffer: vec![0.0; scale(*delay)],
                position: 0,
            })
            .collect();

        Reverb {
            combs,
            allpasses,
            wet: wet.clamp(0.0, 1.0),
        }
    }

    /// Processes one mono frame, returning the mixed output.
    pub fn process(&mut self, dry: f32) -> f32 {
        if self.wet == 0.0 {
            return dry;
        }

        let mut wet = self.combs.iter_mut().map(|c| c.process(dry)).sum::<f32>() * 0.25;
        for allpass in self.allpasses.iter_mut() {
            wet = allpass.process(wet);
        }

        dry * (1.0 - self.wet) + wet * self.wet
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_dry_passthrough() {
        let mut reverb = Reverb::new(44100, 1.5, 0.0);
        assert_eq!(0.5, reverb.process(0.5));
    }

    #[test]
    fn test_tail_rings_and_decays() {
        let sample_rate = 8000;
        let mut reverb = Reverb::new(sample_rate, 0.5, 1.0);
        reverb.process(1.0);

        // The first comb echo arrives after the shortest comb delay.
        let early: f32 = (0..sample_rate / 2)
            .map(|_| reverb.process(0.0).abs())
            .sum();
        assert!(early > 0.0);

        // Several decay times later the tail has died away.
        for _ in 0..sample_rate * 3 {
            reverb.process(0.0);
        }
        let late: f32 = (0..sample_rate / 2)
            .map(|_| reverb.process(0.0).abs())
            .sum();
        assert!(late < early * 0.01);
    }
}
