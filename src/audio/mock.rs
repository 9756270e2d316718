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
    collections::HashMap,
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{Clock, VoiceId};
use crate::{notes::NoteId, samples::SampleSet};

const MOCK_SAMPLE_RATE: u32 = 44100;

/// A manually advanced clock.
#[derive(Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new() -> ManualClock {
        ManualClock::default()
    }

    pub fn set(&self, now: f64) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, seconds: f64) {
        *self.now.lock() += seconds;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }
}

/// Every call made against the mock device, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Unlock,
    Install {
        notes: usize,
    },
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
    Muted(bool),
    Dispose,
}

/// Whether a note event turned a voice on or off.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteEventKind {
    On,
    Off,
}

/// A voice start or release, resolved to its note.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteEvent {
    pub kind: NoteEventKind,
    pub note: NoteId,
    pub at: f64,
}

/// A mock device. Doesn't actually play anything, but records what it was asked to do.
#[derive(Clone)]
pub struct Device {
    name: String,
    clock: Arc<ManualClock>,
    calls: Arc<Mutex<Vec<Call>>>,
    deny_unlock: Arc<AtomicBool>,
    unlocked: Arc<AtomicBool>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            clock: Arc::new(ManualClock::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
            deny_unlock: Arc::new(AtomicBool::new(false)),
            unlocked: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes subsequent unlock attempts fail, as a platform refusing audio would.
    pub fn set_deny_unlock(&self, deny: bool) {
        self.deny_unlock.store(deny, Ordering::Relaxed);
    }

    /// The device's manual clock.
    pub fn manual_clock(&self) -> Arc<ManualClock> {
        self.clock.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Voice starts and releases resolved to notes, in call order.
    pub fn note_events(&self) -> Vec<NoteEvent> {
        let mut voices: HashMap<VoiceId, NoteId> = HashMap::new();
        let mut events = Vec::new();
        for call in self.calls.lock().iter() {
            match call {
                Call::Start {
                    voice, note, at, ..
                } => {
                    voices.insert(*voice, *note);
                    events.push(NoteEvent {
                        kind: NoteEventKind::On,
                        note: *note,
                        at: *at,
                    });
                }
                Call::Release { voice, at, .. } => {
                    if let Some(note) = voices.get(voice) {
                        events.push(NoteEvent {
                            kind: NoteEventKind::Off,
                            note: *note,
                            at: *at,
                        });
                    }
                }
                _ => {}
            }
        }
        events
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked.load(Ordering::Relaxed)
    }

    fn record(&self, call: Call) {
        debug!(device = self.name, call = ?call, "Mock device call");
        self.calls.lock().push(call);
    }
}

impl super::Device for Device {
    fn unlock(&self) -> Result<(), Box<dyn Error>> {
        if self.deny_unlock.load(Ordering::Relaxed) {
            return Err(format!("{} refused to start output", self.name).into());
        }
        if !self.unlocked.swap(true, Ordering::Relaxed) {
            info!(device = self.name, "Output unlocked (mock)");
            self.record(Call::Unlock);
        }
        Ok(())
    }

    fn install_samples(&self, samples: Arc<SampleSet>) -> Result<(), Box<dyn Error>> {
        self.record(Call::Install {
            notes: samples.len(),
        });
        Ok(())
    }

    fn start_voice(
        &self,
        voice: VoiceId,
        note: NoteId,
        at: f64,
        velocity: f32,
    ) -> Result<(), Box<dyn Error>> {
        self.record(Call::Start {
            voice,
            note,
            at,
            velocity,
        });
        Ok(())
    }

    fn release_voice(&self, voice: VoiceId, at: f64, fade: f64) -> Result<(), Box<dyn Error>> {
        self.record(Call::Release { voice, at, fade });
        Ok(())
    }

    fn release_all(&self) -> Result<(), Box<dyn Error>> {
        self.record(Call::ReleaseAll);
        Ok(())
    }

    fn set_muted(&self, muted: bool) -> Result<(), Box<dyn Error>> {
        self.record(Call::Muted(muted));
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        MOCK_SAMPLE_RATE
    }

    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    fn dispose(&self) {
        self.unlocked.store(false, Ordering::Relaxed);
        self.record(Call::Dispose);
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Device>, Box<dyn Error>> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name,)
    }
}
