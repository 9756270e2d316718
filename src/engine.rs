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
//! The voice engine.
//!
//! The engine owns the audio device and the sample set. It becomes ready in two
//! phases: audio output is unlocked by an explicit user action, and the sample set is
//! loaded on a background thread whose completion is picked up by [VoiceEngine::poll]
//! on the event loop. Until both have happened every note request is dropped.

use std::{
    collections::HashSet,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use tracing::{debug, error, info, span, trace, warn, Level};

use crate::{
    audio::{Clock, Device},
    config,
    notes::NoteId,
    samples::{LoadError, SampleProvider, SampleSet},
};

mod readiness;
mod voice;

pub use readiness::{Failure, Readiness};
use voice::VoiceManager;

/// Fade used when a key is retriggered before its previous voice has finished.
const RETRIGGER_FADE: f64 = 0.015;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("audio output was denied: {0}")]
    UnlockDenied(String),

    #[error("audio output has not been unlocked")]
    OutputLocked,

    #[error("unable to load piano samples: {0}")]
    SampleLoad(#[from] LoadError),

    #[error("the sample loader stopped without reporting a result")]
    LoaderGone,

    #[error("audio device error: {0}")]
    Device(String),

    #[error("the voice engine has been disposed")]
    Disposed,
}

/// Voice defaults.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineSettings {
    /// Velocity used when a note-on gives none.
    pub velocity: f32,
    /// Seconds added to a note-off that gives no time.
    pub release_grace: f64,
    /// Seconds a voice takes to fade after its note-off.
    pub release: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            velocity: 0.8,
            release_grace: 0.05,
            release: 1.2,
        }
    }
}

impl EngineSettings {
    pub fn from_config(voice: &config::Voice) -> Result<EngineSettings, config::ConfigError> {
        Ok(EngineSettings {
            velocity: voice.velocity()?,
            release_grace: voice.release_grace()?.as_secs_f64(),
            release: voice.release()?.as_secs_f64(),
        })
    }
}

/// Plays piano voices on an audio device.
pub struct VoiceEngine {
    device: Arc<dyn Device>,
    clock: Arc<dyn Clock>,
    provider: Arc<dyn SampleProvider>,
    notes: Vec<NoteId>,
    known: HashSet<NoteId>,
    settings: EngineSettings,
    readiness: Readiness,
    loader: Option<Receiver<Result<SampleSet, LoadError>>>,
    voices: VoiceManager,
    muted: bool,
}

impl VoiceEngine {
    /// Creates an engine for the given notes. Nothing is started until
    /// [VoiceEngine::unlock_output] is called.
    pub fn new(
        device: Arc<dyn Device>,
        provider: Arc<dyn SampleProvider>,
        notes: Vec<NoteId>,
        settings: EngineSettings,
    ) -> VoiceEngine {
        VoiceEngine {
            clock: device.clock(),
            device,
            provider,
            known: notes.iter().copied().collect(),
            notes,
            voices: VoiceManager::new(settings.release),
            settings,
            readiness: Readiness::Uninitialized,
            loader: None,
            muted: false,
        }
    }

    pub fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    pub fn is_loading(&self) -> bool {
        self.readiness.is_loading()
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// The current time on the device clock.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// The device clock, shared with the transport.
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Starts audio output, then begins loading samples. Must be triggered by an explicit
    /// user action. Once output is running this does nothing.
    pub fn unlock_output(&mut self) -> Result<(), EngineError> {
        match self.readiness {
            Readiness::Disposed => return Err(EngineError::Disposed),
            Readiness::Uninitialized | Readiness::Failed(Failure::Unlock(_)) => {}
            _ => {
                debug!(readiness = %self.readiness, "Output already unlocked");
                return Ok(());
            }
        }

        self.readiness = Readiness::Unlocking;
        if let Err(e) = self.device.unlock() {
            let reason = e.to_string();
            error!(device = %self.device, err = reason, "Unable to start audio output");
            self.readiness = Readiness::Failed(Failure::Unlock(reason.clone()));
            return Err(EngineError::UnlockDenied(reason));
        }

        info!(device = %self.device, "Audio output unlocked");
        self.readiness = Readiness::LoadingSamples;
        self.load_samples()
    }

    /// Starts loading the sample set in the background. Loading starts on its own once
    /// output is unlocked; calling this again while loading or after completion does
    /// nothing.
    pub fn load_samples(&mut self) -> Result<(), EngineError> {
        match self.readiness {
            Readiness::Disposed => Err(EngineError::Disposed),
            Readiness::LoadingSamples if self.loader.is_none() => {
                let (tx, rx) = crossbeam_channel::bounded(1);
                let provider = self.provider.clone();
                let notes = self.notes.clone();
                let sample_rate = self.device.sample_rate();
                thread::spawn(move || {
                    let span = span!(Level::INFO, "sample loader");
                    let _enter = span.enter();

                    let started = Instant::now();
                    let result = provider.load(&notes, sample_rate);
                    debug!(elapsed = ?started.elapsed(), ok = result.is_ok(), "Sample load finished");
                    // The engine may have been disposed in the meantime.
                    let _ = tx.send(result);
                });
                info!(notes = self.notes.len(), sample_rate, "Loading samples");
                self.loader = Some(rx);
                Ok(())
            }
            Readiness::LoadingSamples
            | Readiness::Ready
            | Readiness::Failed(Failure::SampleLoad(_)) => Ok(()),
            _ => Err(EngineError::OutputLocked),
        }
    }

    /// Picks up a finished sample load without blocking. Returns the outcome once, when
    /// loading completes.
    pub fn poll(&mut self) -> Option<Result<(), EngineError>> {
        let result = match self.loader.as_ref()?.try_recv() {
            Ok(result) => Ok(result),
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(EngineError::LoaderGone),
        };
        Some(self.settle(result))
    }

    /// Blocks until the sample load completes or the timeout passes.
    pub fn wait_until_settled(&mut self, timeout: Duration) -> Option<Result<(), EngineError>> {
        let result = match self.loader.as_ref()?.recv_timeout(timeout) {
            Ok(result) => Ok(result),
            Err(RecvTimeoutError::Timeout) => return None,
            Err(RecvTimeoutError::Disconnected) => Err(EngineError::LoaderGone),
        };
        Some(self.settle(result))
    }

    fn settle(
        &mut self,
        result: Result<Result<SampleSet, LoadError>, EngineError>,
    ) -> Result<(), EngineError> {
        self.loader = None;
        let installed = match result {
            Ok(Ok(samples)) => {
                info!(samples = ?samples, "Samples loaded");
                self.device
                    .install_samples(Arc::new(samples))
                    .map_err(|e| EngineError::Device(e.to_string()))
            }
            Ok(Err(e)) => Err(EngineError::SampleLoad(e)),
            Err(e) => Err(e),
        };

        match installed {
            Ok(()) => {
                self.readiness = Readiness::Ready;
                info!("Piano ready");
                Ok(())
            }
            Err(e) => {
                error!(err = %e, "Sample set unavailable, the piano will stay silent");
                self.readiness = Readiness::Failed(Failure::SampleLoad(e.to_string()));
                Err(e)
            }
        }
    }

    /// Starts a voice for the note. `at` defaults to now, `velocity` to the configured
    /// velocity. Starting a key that is still sounding cuts its previous voice. Dropped
    /// when the engine is not ready or the note is unknown.
    pub fn note_on(&mut self, note: NoteId, at: Option<f64>, velocity: Option<f32>) {
        if !self.is_ready() {
            trace!(note = %note, readiness = %self.readiness, "Dropping note on");
            return;
        }
        if !self.known.contains(&note) {
            debug!(note = %note, "Ignoring note outside the sample range");
            return;
        }

        let at = at.unwrap_or_else(|| self.now());
        let velocity = velocity.unwrap_or(self.settings.velocity).clamp(0.0, 1.0);
        let (voice, cut) = self.voices.start(note, at);
        for previous in cut {
            if let Err(e) = self.device.release_voice(previous, at, RETRIGGER_FADE) {
                warn!(note = %note, err = %e, "Unable to cut previous voice");
            }
        }

        debug!(note = %note, at, velocity, voice, "Note on");
        if let Err(e) = self.device.start_voice(voice, note, at, velocity) {
            error!(note = %note, err = %e, "Unable to start voice");
        }
    }

    /// Releases the note's held voice. `at` defaults to now plus the release grace.
    /// Dropped when the engine is not ready; a note that is not held is a no-op.
    pub fn note_off(&mut self, note: NoteId, at: Option<f64>) {
        if !self.is_ready() {
            trace!(note = %note, readiness = %self.readiness, "Dropping note off");
            return;
        }

        let at = at.unwrap_or_else(|| self.now() + self.settings.release_grace);
        let Some(voice) = self.voices.release(&note, at) else {
            trace!(note = %note, "Note off for a note that is not held");
            return;
        };

        debug!(note = %note, at, voice, "Note off");
        if let Err(e) = self.device.release_voice(voice, at, self.settings.release) {
            error!(note = %note, err = %e, "Unable to release voice");
        }
    }

    /// Silences every sounding or pending voice.
    pub fn release_all(&mut self) {
        if self.readiness == Readiness::Disposed {
            return;
        }

        let released = self.voices.clear();
        debug!(voices = released.len(), "Releasing all voices");
        if let Err(e) = self.device.release_all() {
            error!(err = %e, "Unable to release voices");
        }
    }

    /// Mutes or unmutes the output gain. Voices and readiness are unaffected.
    pub fn set_muted(&mut self, muted: bool) {
        if self.readiness == Readiness::Disposed || self.muted == muted {
            return;
        }
        self.muted = muted;
        info!(muted, "Output mute changed");
        if let Err(e) = self.device.set_muted(muted) {
            error!(err = %e, "Unable to change mute");
        }
    }

    /// Releases all audio resources. Safe in any state and more than once.
    pub fn dispose(&mut self) {
        if self.readiness == Readiness::Disposed {
            return;
        }
        self.release_all();
        self.loader = None;
        self.device.dispose();
        self.readiness = Readiness::Disposed;
        info!("Voice engine disposed");
    }
}

impl Drop for VoiceEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for VoiceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceEngine")
            .field("device", &self.device.to_string())
            .field("readiness", &self.readiness)
            .field("voices", &self.voices.len())
            .field("muted", &self.muted)
            .finish()
    }
}
