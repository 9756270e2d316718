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
//! The transport: a musical time reference running on the audio device's clock.

use std::sync::Arc;

use tracing::{debug, info};

use crate::audio::Clock;

/// Time signature (numerator/denominator)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeSignature {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        TimeSignature {
            numerator,
            denominator,
        }
    }

    /// Length of a measure in quarter notes.
    pub fn quarters_per_measure(&self) -> f64 {
        f64::from(self.numerator) * 4.0 / f64::from(self.denominator.max(1))
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        TimeSignature::new(4, 4)
    }
}

/// A tempo in quarter notes per minute with a time signature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo {
    bpm: f64,
    time_signature: TimeSignature,
}

impl Tempo {
    pub fn new(bpm: f64, time_signature: TimeSignature) -> Tempo {
        Tempo {
            bpm,
            time_signature,
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    /// Seconds per quarter note.
    pub fn seconds_per_quarter(&self) -> f64 {
        60.0 / self.bpm
    }

    pub fn seconds_per_measure(&self) -> f64 {
        self.time_signature.quarters_per_measure() * self.seconds_per_quarter()
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Tempo::new(120.0, TimeSignature::default())
    }
}

/// Tracks where musical time zero sits on the device clock.
pub struct Transport {
    clock: Arc<dyn Clock>,
    tempo: Tempo,
    started_at: Option<f64>,
}

impl Transport {
    pub fn new(clock: Arc<dyn Clock>, tempo: Tempo) -> Transport {
        Transport {
            clock,
            tempo,
            started_at: None,
        }
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// The current time on the underlying clock.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Starts the transport if it is stopped. Returns the clock time it started at.
    pub fn ensure_started(&mut self) -> f64 {
        match self.started_at {
            Some(started_at) => started_at,
            None => {
                let now = self.clock.now();
                info!(at = now, bpm = self.tempo.bpm(), "Transport started");
                self.started_at = Some(now);
                now
            }
        }
    }

    /// Seconds since the transport started, if it is running.
    pub fn position(&self) -> Option<f64> {
        self.started_at.map(|started_at| self.clock.now() - started_at)
    }

    pub fn stop(&mut self) {
        if self.started_at.take().is_some() {
            debug!("Transport stopped");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::audio::mock::ManualClock;

    #[test]
    fn test_tempo_lengths() {
        let tempo = Tempo::default();
        assert_eq!(0.5, tempo.seconds_per_quarter());
        assert_eq!(2.0, tempo.seconds_per_measure());

        let waltz = Tempo::new(90.0, TimeSignature::new(3, 4));
        assert!((waltz.seconds_per_measure() - 2.0).abs() < 1e-9);

        let compound = Tempo::new(120.0, TimeSignature::new(6, 8));
        assert_eq!(1.5, compound.seconds_per_measure());
    }

    #[test]
    fn test_start_and_stop() {
        let clock = Arc::new(ManualClock::new());
        clock.set(3.0);
        let mut transport = Transport::new(clock.clone(), Tempo::default());
        assert!(!transport.is_running());
        assert_eq!(None, transport.position());

        assert_eq!(3.0, transport.ensure_started());
        clock.advance(1.5);
        // Already running, so the origin stays put.
        assert_eq!(3.0, transport.ensure_started());
        assert_eq!(Some(1.5), transport.position());

        transport.stop();
        assert!(!transport.is_running());
        assert_eq!(4.5, transport.ensure_started());
    }
}
