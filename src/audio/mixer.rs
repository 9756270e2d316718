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
//! The voice mixer that runs on the audio thread.
//!
//! The mixer never blocks: the control side talks to it through a command channel
//! that is drained at the start of every block. Voice starts and releases carry
//! clock times, which the mixer converts to frames so that scheduling is frame
//! accurate regardless of block size.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crossbeam_channel::Receiver;
use tracing::warn;

use super::{reverb::Reverb, Clock, VoiceId};
use crate::notes::NoteId;
use crate::samples::SampleSet;

/// Fade applied to the start of every voice so samples never click in.
const DECLICK_SECONDS: f64 = 0.002;

/// Fade used when every voice is silenced at once.
pub const RELEASE_ALL_SECONDS: f64 = 0.01;

/// Commands sent from the control side to the mixer.
pub enum Command {
    Install(Arc<SampleSet>),
    Start {
        voice: VoiceId,
        note: NoteId,
        at: f64,
        velocity: f32,
    },
    Release {
        voice: VoiceId,
        at: f64,
        fade: f64,
    },
    ReleaseAll,
    SetMuted(bool),
}

/// Mixer settings for the master bus.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MixSettings {
    /// Linear master gain.
    pub volume: f32,
    /// Reverb decay in seconds.
    pub reverb_decay: f64,
    /// Reverb dry/wet crossfade, 0 to 1.
    pub reverb_wet: f32,
}

/// Converts decibels to linear gain.
pub fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// A clock driven by the number of frames the mixer has rendered.
pub struct FrameClock {
    frame: Arc<AtomicU64>,
    sample_rate: u32,
}

impl FrameClock {
    pub fn new(frame: Arc<AtomicU64>, sample_rate: u32) -> FrameClock {
        FrameClock { frame, sample_rate }
    }
}

impl Clock for FrameClock {
    fn now(&self) -> f64 {
        self.frame.load(Ordering::Acquire) as f64 / f64::from(self.sample_rate)
    }
}

/// A linear fade to silence starting at `at_frame`.
#[derive(Clone, Copy)]
struct Release {
    at_frame: u64,
    frames: u64,
}

impl Release {
    fn end_frame(&self) -> u64 {
        self.at_frame + self.frames
    }

    /// Starts no later and ends no later, so it is never louder than `other`.
    fn covers(&self, other: &Release) -> bool {
        self.at_frame <= other.at_frame && self.end_frame() <= other.end_frame()
    }

    /// The fade's gain at the frame, or None once it has finished.
    fn gain_at(&self, frame: u64) -> Option<f32> {
        if frame < self.at_frame {
            return Some(1.0);
        }
        let elapsed = frame - self.at_frame;
        if elapsed >= self.frames {
            return None;
        }
        Some(1.0 - elapsed as f32 / self.frames as f32)
    }
}

struct MixVoice {
    id: VoiceId,
    data: Arc<Vec<f32>>,
    start_frame: u64,
    gain: f32,
    /// Pending fades. The quietest one applies.
    releases: Vec<Release>,
    finished: bool,
}

impl MixVoice {
    /// Adds a fade unless an existing one already silences the voice sooner.
    fn release(&mut self, release: Release) {
        if self.releases.iter().any(|existing| existing.covers(&release)) {
            return;
        }
        self.releases.retain(|existing| !release.covers(existing));
        self.releases.push(release);
    }

    /// The voice's contribution at an absolute frame.
    fn value_at(&mut self, frame: u64, declick_frames: u64) -> f32 {
        if frame < self.start_frame {
            return 0.0;
        }

        let position = (frame - self.start_frame) as usize;
        let Some(sample) = self.data.get(position) else {
            self.finished = true;
            return 0.0;
        };

        let mut level = self.gain;
        if (position as u64) < declick_frames {
            level *= position as f32 / declick_frames as f32;
        }
        let mut fade = 1.0f32;
        for release in self.releases.iter() {
            match release.gain_at(frame) {
                Some(gain) => fade = fade.min(gain),
                None => {
                    self.finished = true;
                    return 0.0;
                }
            }
        }
        level *= fade;

        sample * level
    }
}

/// Mixes scheduled voices into an interleaved output buffer.
pub struct Mixer {
    channels: u16,
    sample_rate: u32,
    commands: Receiver<Command>,
    frame: Arc<AtomicU64>,
    samples: Option<Arc<SampleSet>>,
    voices: Vec<MixVoice>,
    reverb: Reverb,
    volume: f32,
    muted: bool,
    scratch: Vec<f32>,
}

impl Mixer {
    pub fn new(
        channels: u16,
        sample_rate: u32,
        settings: MixSettings,
        commands: Receiver<Command>,
        frame: Arc<AtomicU64>,
    ) -> Mixer {
        Mixer {
            channels: channels.max(1),
            sample_rate,
            commands,
            frame,
            samples: None,
            voices: Vec::new(),
            reverb: Reverb::new(sample_rate, settings.reverb_decay, settings.reverb_wet),
            volume: settings.volume,
            muted: false,
            scratch: Vec::new(),
        }
    }

    fn to_frame(&self, at: f64, now: u64) -> u64 {
        let frame = (at.max(0.0) * f64::from(self.sample_rate)).round() as u64;
        frame.max(now)
    }

    fn seconds_to_frames(&self, seconds: f64) -> u64 {
        ((seconds.max(0.0) * f64::from(self.sample_rate)).round() as u64).max(1)
    }

    fn apply(&mut self, command: Command, now: u64) {
        match command {
            Command::Install(samples) => {
                if samples.sample_rate() != self.sample_rate {
                    warn!(
                        expected = self.sample_rate,
                        actual = samples.sample_rate(),
                        "Sample set rate does not match the output; pitch will be off"
                    );
                }
                self.samples = Some(samples);
            }
            Command::Start {
                voice,
                note,
                at,
                velocity,
            } => {
                let Some(sample) = self.samples.as_ref().and_then(|s| s.get(&note)) else {
                    return;
                };
                let data = sample.data();
                let start_frame = self.to_frame(at, now);
                self.voices.push(MixVoice {
                    id: voice,
                    data,
                    start_frame,
                    gain: velocity.clamp(0.0, 1.0),
                    releases: Vec::new(),
                    finished: false,
                });
            }
            Command::Release { voice, at, fade } => {
                let at_frame = self.to_frame(at, now);
                let frames = self.seconds_to_frames(fade);
                if let Some(v) = self.voices.iter_mut().find(|v| v.id == voice) {
                    v.release(Release { at_frame, frames });
                }
            }
            Command::ReleaseAll => {
                let frames = self.seconds_to_frames(RELEASE_ALL_SECONDS);
                self.voices.retain(|v| v.start_frame <= now);
                for v in self.voices.iter_mut() {
                    v.release(Release {
                        at_frame: now,
                        frames,
                    });
                }
            }
            Command::SetMuted(muted) => self.muted = muted,
        }
    }

    /// Renders the next block into `output`, which holds interleaved frames.
    pub fn render(&mut self, output: &mut [f32]) {
        let channels = self.channels as usize;
        let frames = output.len() / channels;
        let start = self.frame.load(Ordering::Acquire);

        while let Ok(command) = self.commands.try_recv() {
            self.apply(command, start);
        }

        self.scratch.clear();
        self.scratch.resize(frames, 0.0);
        let declick_frames = self.seconds_to_frames(DECLICK_SECONDS);
        for voice in self.voices.iter_mut() {
            for (i, mono) in self.scratch.iter_mut().enumerate() {
                *mono += voice.value_at(start + i as u64, declick_frames);
                if voice.finished {
                    break;
                }
            }
        }
        self.voices.retain(|v| !v.finished);

        let gain = if self.muted { 0.0 } else { self.volume };
        for (frame, mono) in output.chunks_mut(channels).zip(self.scratch.iter()) {
            let value = self.reverb.process(*mono) * gain;
            frame.fill(value);
        }

        self.frame.store(start + frames as u64, Ordering::Release);
    }

    /// The number of voices currently held by the mixer, pending ones included.
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use crossbeam_channel::Sender;

    use super::*;
    use crate::samples::LoadedSample;

    const RATE: u32 = 1000;

    fn note(s: &str) -> NoteId {
        s.parse().expect("note")
    }

    fn mixer() -> (Mixer, Sender<Command>, FrameClock) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let frame = Arc::new(AtomicU64::new(0));
        let settings = MixSettings {
            volume: 1.0,
            reverb_decay: 1.0,
            reverb_wet: 0.0,
        };
        let mixer = Mixer::new(2, RATE, settings, rx, frame.clone());

        let mut samples = HashMap::new();
        samples.insert(note("C4"), LoadedSample::new(vec![1.0; 500]));
        samples.insert(note("D4"), LoadedSample::new(vec![0.5; 500]));
        tx.send(Command::Install(Arc::new(SampleSet::new(RATE, samples))))
            .expect("send");
        (mixer, tx, FrameClock::new(frame, RATE))
    }

    fn render(mixer: &mut Mixer, frames: usize) -> Vec<f32> {
        let mut output = vec![0.0; frames * 2];
        mixer.render(&mut output);
        output.chunks(2).map(|f| f[0]).collect()
    }

    #[test]
    fn test_scheduled_start_is_frame_accurate() {
        let (mut mixer, tx, clock) = mixer();
        tx.send(Command::Start {
            voice: 1,
            note: note("C4"),
            at: 0.05,
            velocity: 1.0,
        })
        .expect("send");

        let output = render(&mut mixer, 100);
        assert!(output[..50].iter().all(|s| *s == 0.0));
        // Declicked over the first couple of frames, then full level.
        assert_eq!(0.0, output[50]);
        assert_eq!(1.0, output[60]);
        assert!((clock.now() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_release_fades_then_finishes() {
        let (mut mixer, tx, _clock) = mixer();
        tx.send(Command::Start {
            voice: 1,
            note: note("C4"),
            at: 0.0,
            velocity: 1.0,
        })
        .expect("send");
        tx.send(Command::Release {
            voice: 1,
            at: 0.02,
            fade: 0.01,
        })
        .expect("send");

        let output = render(&mut mixer, 40);
        assert_eq!(1.0, output[19]);
        assert!(output[25] > 0.0 && output[25] < 1.0);
        assert!(output[30..].iter().all(|s| *s == 0.0));
        assert_eq!(0, mixer.voice_count());
    }

    #[test]
    fn test_retrigger_cut_shortens_ringing_release() {
        let (mut mixer, tx, _clock) = mixer();
        tx.send(Command::Start {
            voice: 1,
            note: note("C4"),
            at: 0.0,
            velocity: 1.0,
        })
        .expect("send");
        tx.send(Command::Release {
            voice: 1,
            at: 0.1,
            fade: 1.2,
        })
        .expect("send");
        let output = render(&mut mixer, 200);
        assert!(output[150] > 0.9 && output[150] < 1.0);

        // A later but shorter fade, as sent when the key is struck again.
        tx.send(Command::Release {
            voice: 1,
            at: 0.2,
            fade: 0.015,
        })
        .expect("send");
        let output = render(&mut mixer, 20);
        // Keeps fading from where the long release was, never louder.
        assert!(output[5] <= output[0] && output[0] < 0.95);
        assert!(output[15..].iter().all(|s| *s == 0.0));
        assert_eq!(0, mixer.voice_count());

        // A slower fade arriving later changes nothing.
        tx.send(Command::Start {
            voice: 2,
            note: note("D4"),
            at: 0.3,
            velocity: 1.0,
        })
        .expect("send");
        tx.send(Command::Release {
            voice: 2,
            at: 0.3,
            fade: 0.01,
        })
        .expect("send");
        tx.send(Command::Release {
            voice: 2,
            at: 0.305,
            fade: 1.0,
        })
        .expect("send");
        render(&mut mixer, 100);
        assert_eq!(0, mixer.voice_count());
    }

    #[test]
    fn test_release_all_drops_pending_voices() {
        let (mut mixer, tx, _clock) = mixer();
        tx.send(Command::Start {
            voice: 1,
            note: note("C4"),
            at: 0.0,
            velocity: 1.0,
        })
        .expect("send");
        tx.send(Command::Start {
            voice: 2,
            note: note("D4"),
            at: 0.2,
            velocity: 1.0,
        })
        .expect("send");
        render(&mut mixer, 50);
        assert_eq!(2, mixer.voice_count());

        tx.send(Command::ReleaseAll).expect("send");
        let output = render(&mut mixer, 300);
        assert!(output[20..].iter().all(|s| *s == 0.0));
        assert_eq!(0, mixer.voice_count());
    }

    #[test]
    fn test_mute_silences_output_only() {
        let (mut mixer, tx, _clock) = mixer();
        tx.send(Command::SetMuted(true)).expect("send");
        tx.send(Command::Start {
            voice: 1,
            note: note("D4"),
            at: 0.0,
            velocity: 0.5,
        })
        .expect("send");
        assert!(render(&mut mixer, 20).iter().all(|s| *s == 0.0));
        assert_eq!(1, mixer.voice_count());

        tx.send(Command::SetMuted(false)).expect("send");
        assert_eq!(0.25, render(&mut mixer, 20)[10]);
    }

    #[test]
    fn test_unknown_note_is_ignored() {
        let (mut mixer, tx, _clock) = mixer();
        tx.send(Command::Start {
            voice: 1,
            note: note("C7"),
            at: 0.0,
            velocity: 1.0,
        })
        .expect("send");
        render(&mut mixer, 10);
        assert_eq!(0, mixer.voice_count());
    }
}
