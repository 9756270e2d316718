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
//! The piano session.
//!
//! A [Piano] owns everything a session needs: the registry, the voice engine, the
//! active note set, the input reconciler, the scheduler and the transport. Front ends
//! feed it input and call [Piano::poll] on every turn of their event loop, then render
//! from [Piano::view].

use std::{error::Error, fmt, sync::Arc, time::Duration};

use tracing::{error, info, warn};

use crate::{
    active::ActiveNotes,
    audio::{self, Device},
    config,
    engine::{EngineError, EngineSettings, VoiceEngine},
    input::{InputEvent, InputReconciler, NoteChange},
    melody::{Melody, MelodyError},
    notes::{NoteId, NoteRegistry},
    playsync::CancelHandle,
    scheduler::{PlaybackState, Scheduler, SchedulerSettings},
    transport::{Tempo, TimeSignature, Transport},
};

/// A snapshot of everything the rendering layer shows.
#[derive(Clone, Debug, PartialEq)]
pub struct PianoView {
    /// Keys to highlight, in pitch order.
    pub active: Vec<NoteId>,
    pub loading: bool,
    pub ready: bool,
    /// Why the piano can't play, if it can't.
    pub failure: Option<String>,
    pub playback: PlaybackState,
    pub muted: bool,
}

impl PianoView {
    pub fn is_playing(&self) -> bool {
        self.playback == PlaybackState::Playing
    }
}

impl fmt::Display for PianoView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if let Some(failure) = &self.failure {
            failure.as_str()
        } else if self.ready {
            "ready"
        } else if self.loading {
            "loading"
        } else {
            "press start"
        };
        write!(f, "[{}] {}", status, self.playback)?;
        if self.muted {
            write!(f, " (muted)")?;
        }
        let active: Vec<String> = self.active.iter().map(NoteId::to_string).collect();
        write!(f, " {}", active.join(" "))
    }
}

/// An interactive piano session.
pub struct Piano {
    registry: Arc<NoteRegistry>,
    notes: ActiveNotes,
    engine: VoiceEngine,
    input: InputReconciler,
    scheduler: Scheduler,
    transport: Transport,
    melody: Melody,
}

impl Piano {
    pub fn new(
        registry: Arc<NoteRegistry>,
        engine: VoiceEngine,
        scheduler: SchedulerSettings,
        tempo: Tempo,
        melody: Melody,
    ) -> Piano {
        let notes = ActiveNotes::new();
        Piano {
            input: InputReconciler::new(registry.clone(), notes.clone()),
            transport: Transport::new(engine.clock(), tempo),
            scheduler: Scheduler::new(scheduler),
            registry,
            notes,
            engine,
            melody,
        }
    }

    /// Builds a session from the configuration, on the configured audio device.
    pub fn from_config(config: &config::Player) -> Result<Piano, Box<dyn Error>> {
        let device = audio::get_device(config.audio())?;
        Piano::with_device(config, device)
    }

    /// Builds a session from the configuration on the given device.
    pub fn with_device(
        config: &config::Player,
        device: Arc<dyn Device>,
    ) -> Result<Piano, Box<dyn Error>> {
        let registry = Arc::new(NoteRegistry::default());
        let engine = VoiceEngine::new(
            device,
            config.samples().provider()?,
            registry.note_ids(),
            EngineSettings::from_config(config.voice())?,
        );

        let playback = config.playback();
        let melody = match playback.melody() {
            Some(path) => Melody::from_file(path)?,
            None => Melody::prince_igor(),
        };
        melody.validate(&registry)?;

        Ok(Piano::new(
            registry,
            engine,
            SchedulerSettings::from_config(playback)?,
            Tempo::new(playback.bpm()?, TimeSignature::default()),
            melody,
        ))
    }

    pub fn registry(&self) -> &NoteRegistry {
        &self.registry
    }

    /// A handle to the active note set.
    pub fn active_notes(&self) -> ActiveNotes {
        self.notes.clone()
    }

    pub fn melody(&self) -> &Melody {
        &self.melody
    }

    /// Replaces the melody. Takes effect on the next play.
    pub fn set_melody(&mut self, melody: Melody) -> Result<(), MelodyError> {
        melody.validate(&self.registry)?;
        info!(melody = melody.name(), "Melody changed");
        self.melody = melody;
        Ok(())
    }

    /// Starts audio output and sample loading. Call this in response to an explicit
    /// user action.
    pub fn start_audio(&mut self) -> Result<(), EngineError> {
        self.engine.unlock_output()
    }

    /// Starts audio and waits for the samples, for sessions without an event loop.
    /// Returns Ok if the samples are still loading when the timeout passes.
    pub fn start_and_wait(&mut self, timeout: Duration) -> Result<(), EngineError> {
        self.start_audio()?;
        match self.wait_for_samples(timeout) {
            Some(Err(e)) => {
                error!(err = %e, "Piano failed to load");
                Err(e)
            }
            Some(Ok(())) => Ok(()),
            None => {
                if self.engine.is_loading() {
                    warn!(?timeout, "Samples still loading");
                }
                Ok(())
            }
        }
    }

    /// Picks up sample loading and dispatches due playback. Returns true when the view
    /// may have changed. A failed sample load is returned once.
    pub fn poll(&mut self) -> Result<bool, EngineError> {
        let mut changed = false;
        if let Some(result) = self.engine.poll() {
            result?;
            changed = true;
        }
        let playing = self.scheduler.is_playing();
        changed |= self.scheduler.tick(&mut self.engine, &self.notes) > 0;
        changed |= playing != self.scheduler.is_playing();
        Ok(changed)
    }

    /// Blocks until sample loading finishes or the timeout passes.
    pub fn wait_for_samples(&mut self, timeout: Duration) -> Option<Result<(), EngineError>> {
        self.engine.wait_until_settled(timeout)
    }

    /// When the scheduler next has something to do, on the device clock.
    pub fn next_due(&self) -> Option<f64> {
        self.scheduler.next_due()
    }

    /// The current device clock time.
    pub fn now(&self) -> f64 {
        self.engine.now()
    }

    /// Passes live input through the reconciler.
    pub fn handle_input(&mut self, event: &InputEvent) -> Vec<NoteChange> {
        self.input
            .handle(event, &mut self.engine, self.scheduler.state())
    }

    /// Flips the mute flag and returns the new value.
    pub fn toggle_mute(&mut self) -> bool {
        let muted = !self.engine.is_muted();
        self.engine.set_muted(muted);
        muted
    }

    /// Starts the melody. Returns false if it is already playing or the piano isn't
    /// ready.
    pub fn play_melody(&mut self) -> bool {
        self.scheduler.start(
            &mut self.engine,
            &self.notes,
            &mut self.transport,
            &self.melody,
        )
    }

    /// A handle that stops the current melody on the next poll, from any thread.
    pub fn cancel_handle(&self) -> Option<CancelHandle> {
        self.scheduler.cancel_handle()
    }

    pub fn stop_melody(&mut self) {
        self.scheduler.stop(&mut self.engine, &self.notes);
    }

    /// Plays the melody if idle, otherwise stops it. Returns true if it is now playing.
    pub fn toggle_melody(&mut self) -> bool {
        if self.scheduler.is_playing() {
            self.stop_melody();
            false
        } else {
            self.play_melody()
        }
    }

    pub fn view(&self) -> PianoView {
        let readiness = self.engine.readiness();
        PianoView {
            active: self.notes.snapshot(),
            loading: readiness.is_loading(),
            ready: readiness.is_ready(),
            failure: readiness.failure().map(ToString::to_string),
            playback: self.scheduler.state(),
            muted: self.engine.is_muted(),
        }
    }

    /// Stops playback and the transport and releases the audio device. Safe in any state.
    pub fn dispose(&mut self) {
        self.scheduler.stop(&mut self.engine, &self.notes);
        self.transport.stop();
        self.notes.clear();
        self.engine.dispose();
    }
}

impl Drop for Piano {
    fn drop(&mut self) {
        self.dispose();
    }
}
