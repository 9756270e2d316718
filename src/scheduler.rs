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
//! The playback scheduler.
//!
//! Starting a melody turns it into a [Plan]: a flat list of actions at absolute device
//! clock times. The scheduler dispatches due actions whenever it is ticked, so nothing
//! scheduled outlives the run that owns it. Stopping cancels the run, releases every
//! voice and clears the active note set.

use std::fmt;

use tracing::{debug, info, span, Level};

use crate::{
    active::ActiveNotes,
    config,
    engine::VoiceEngine,
    melody::Melody,
    notes::NoteId,
    playsync::CancelHandle,
    transport::{Tempo, Transport},
};

/// Something the scheduler does at a point in time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Action {
    NoteOff(NoteId),
    NoteOn(NoteId),
    /// Returns the scheduler to idle once release tails have rung out.
    Finish,
}

impl Action {
    /// Order among actions due at the same time: a note ends before the next begins.
    fn rank(&self) -> u8 {
        match self {
            Action::NoteOff(_) => 0,
            Action::NoteOn(_) => 1,
            Action::Finish => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledAction {
    pub at: f64,
    pub action: Action,
}

/// A melody resolved into absolute-time actions.
#[derive(Clone, Debug, PartialEq)]
pub struct Plan {
    actions: Vec<ScheduledAction>,
}

impl Plan {
    /// Resolves the melody at the tempo, with musical time zero at `origin` on the
    /// device clock. The plan finishes `cleanup_buffer` seconds after the last note ends.
    pub fn build(melody: &Melody, tempo: &Tempo, origin: f64, cleanup_buffer: f64) -> Plan {
        let mut actions = Vec::with_capacity(melody.events().len() * 2 + 1);
        for event in melody.timed(tempo) {
            actions.push(ScheduledAction {
                at: origin + event.start,
                action: Action::NoteOn(event.note),
            });
            actions.push(ScheduledAction {
                at: origin + event.end(),
                action: Action::NoteOff(event.note),
            });
        }
        actions.push(ScheduledAction {
            at: origin + melody.total_duration(tempo) + cleanup_buffer,
            action: Action::Finish,
        });
        actions.sort_by(|a, b| a.at.total_cmp(&b.at).then(a.action.rank().cmp(&b.action.rank())));

        Plan { actions }
    }

    pub fn actions(&self) -> &[ScheduledAction] {
        &self.actions
    }

    /// When the plan returns to idle.
    pub fn finish_time(&self) -> Option<f64> {
        self.actions.last().map(|action| action.at)
    }
}

/// Whether a melody is being played.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Playing => write!(f, "playing"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SchedulerSettings {
    /// Seconds after the last note ends before playback returns to idle.
    pub cleanup_buffer: f64,
    /// How far ahead of the clock actions are handed to the engine. The active note set
    /// still changes when the clock reaches each action.
    pub lookahead: f64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        SchedulerSettings {
            cleanup_buffer: 0.8,
            lookahead: 0.0,
        }
    }
}

impl SchedulerSettings {
    pub fn from_config(
        playback: &config::Playback,
    ) -> Result<SchedulerSettings, config::ConfigError> {
        Ok(SchedulerSettings {
            cleanup_buffer: playback.cleanup_buffer()?.as_secs_f64(),
            lookahead: playback.lookahead()?.as_secs_f64(),
        })
    }
}

/// A single playback run. Only the run that owns the plan may act on it.
struct Run {
    melody: String,
    plan: Plan,
    /// Next action to hand to the engine.
    sent: usize,
    /// Next action to apply to the active note set. Never ahead of `sent`.
    shown: usize,
    cancel_handle: CancelHandle,
}

/// Plays melodies against the voice engine and the active note set.
pub struct Scheduler {
    settings: SchedulerSettings,
    run: Option<Run>,
}

impl Scheduler {
    pub fn new(settings: SchedulerSettings) -> Scheduler {
        Scheduler {
            settings,
            run: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        match self.run {
            Some(_) => PlaybackState::Playing,
            None => PlaybackState::Idle,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.run.is_some()
    }

    /// The current run's cancel handle. Cancelling it stops playback on the next tick.
    pub fn cancel_handle(&self) -> Option<CancelHandle> {
        self.run.as_ref().map(|run| run.cancel_handle.clone())
    }

    /// Actions left in the current run.
    pub fn pending(&self) -> usize {
        self.run
            .as_ref()
            .map(|run| run.plan.actions.len() - run.shown)
            .unwrap_or(0)
    }

    /// The clock time at which the next tick has something to do.
    pub fn next_due(&self) -> Option<f64> {
        let run = self.run.as_ref()?;
        let send = run
            .plan
            .actions
            .get(run.sent)
            .map(|action| action.at - self.settings.lookahead);
        let show = run.plan.actions.get(run.shown).map(|action| action.at);
        match (send, show) {
            (Some(send), Some(show)) => Some(send.min(show)),
            (send, show) => send.or(show),
        }
    }

    /// Starts playing the melody from now. Does nothing and returns false if a melody is
    /// already playing or the engine is not ready.
    pub fn start(
        &mut self,
        engine: &mut VoiceEngine,
        notes: &ActiveNotes,
        transport: &mut Transport,
        melody: &Melody,
    ) -> bool {
        if self.is_playing() {
            debug!("Playback already in progress");
            return false;
        }
        if !engine.is_ready() {
            debug!(readiness = %engine.readiness(), "Engine not ready, not starting playback");
            return false;
        }

        transport.ensure_started();
        let origin = transport.now();

        // Anything held live is let go; live input can't release it while playing.
        for note in notes.clear() {
            engine.note_off(note, Some(origin));
        }

        let plan = Plan::build(
            melody,
            &transport.tempo(),
            origin,
            self.settings.cleanup_buffer,
        );
        info!(
            melody = melody.name(),
            events = melody.events().len(),
            origin,
            finish = ?plan.finish_time(),
            "Playback started"
        );
        self.run = Some(Run {
            melody: melody.name().to_string(),
            plan,
            sent: 0,
            shown: 0,
            cancel_handle: CancelHandle::new(),
        });
        true
    }

    /// Hands actions within the lookahead to the engine, then applies every action the
    /// clock has reached to the active note set. Returns the number applied.
    pub fn tick(&mut self, engine: &mut VoiceEngine, notes: &ActiveNotes) -> usize {
        let Some(run) = self.run.as_mut() else {
            return 0;
        };
        if run.cancel_handle.is_cancelled() {
            self.stop(engine, notes);
            return 0;
        }

        let span = span!(Level::DEBUG, "playback", melody = %run.melody);
        let _enter = span.enter();

        let now = engine.now();
        let horizon = now + self.settings.lookahead;
        while let Some(scheduled) = run.plan.actions.get(run.sent).copied() {
            if scheduled.at > horizon {
                break;
            }
            run.sent += 1;

            match scheduled.action {
                Action::NoteOn(note) => engine.note_on(note, Some(scheduled.at), None),
                Action::NoteOff(note) => engine.note_off(note, Some(scheduled.at)),
                Action::Finish => (),
            }
            debug!(at = scheduled.at, action = ?scheduled.action, "Dispatched");
        }

        let mut applied = 0;
        let mut finished = false;
        while let Some(scheduled) = run.plan.actions.get(run.shown).copied() {
            if scheduled.at > now {
                break;
            }
            run.shown += 1;
            applied += 1;

            match scheduled.action {
                Action::NoteOn(note) => {
                    notes.press(note);
                }
                Action::NoteOff(note) => {
                    notes.release(&note);
                }
                Action::Finish => {
                    finished = true;
                    break;
                }
            }
        }

        if finished {
            notes.clear();
            self.run = None;
            info!("Playback finished");
        }
        applied
    }

    /// Stops playback. Nothing from the stopped run is dispatched afterwards, every voice
    /// is released and the active note set is cleared.
    pub fn stop(&mut self, engine: &mut VoiceEngine, notes: &ActiveNotes) {
        let Some(run) = self.run.take() else {
            return;
        };
        run.cancel_handle.cancel();
        engine.release_all();
        notes.clear();
        info!(
            melody = %run.melody,
            skipped = run.plan.actions.len() - run.sent,
            "Playback stopped"
        );
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new(SchedulerSettings::default())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::{
        audio::mock::{Call, NoteEvent, NoteEventKind},
        melody::{NoteValue, Position, ScriptedEvent},
        testutil::{assert_time, engine_with, note, ready_engine, StaticSamples},
    };

    fn two_notes() -> Melody {
        Melody::new(
            "two notes",
            vec![
                ScriptedEvent::new(note("A3"), Position::Seconds(0.0), NoteValue::Seconds(0.5)),
                ScriptedEvent::new(note("C4"), Position::Seconds(0.5), NoteValue::Seconds(0.5)),
            ],
        )
    }

    fn transport(engine: &VoiceEngine) -> Transport {
        Transport::new(engine.clock(), Tempo::default())
    }

    #[test]
    fn test_plan_ordering() {
        let plan = Plan::build(&two_notes(), &Tempo::default(), 10.0, 0.8);
        let actions: Vec<(f64, Action)> = plan.actions().iter().map(|a| (a.at, a.action)).collect();
        assert_eq!(
            vec![
                (10.0, Action::NoteOn(note("A3"))),
                (10.5, Action::NoteOff(note("A3"))),
                (10.5, Action::NoteOn(note("C4"))),
                (11.0, Action::NoteOff(note("C4"))),
                (11.8, Action::Finish),
            ],
            actions
        );
        assert_eq!(Some(11.8), plan.finish_time());
    }

    #[test]
    fn test_scripted_run_to_completion() {
        let (mut engine, device) = ready_engine();
        let clock = device.manual_clock();
        let notes = ActiveNotes::default();
        let mut transport = transport(&engine);
        let mut scheduler = Scheduler::default();

        assert!(scheduler.start(&mut engine, &notes, &mut transport, &two_notes()));
        assert_eq!(PlaybackState::Playing, scheduler.state());
        assert!(transport.is_running());

        assert_eq!(1, scheduler.tick(&mut engine, &notes));
        assert_eq!(vec![note("A3")], notes.snapshot());

        clock.set(0.25);
        assert_eq!(0, scheduler.tick(&mut engine, &notes));
        assert_eq!(vec![note("A3")], notes.snapshot());

        clock.set(0.5);
        assert_eq!(2, scheduler.tick(&mut engine, &notes));
        assert_eq!(vec![note("C4")], notes.snapshot());

        clock.set(1.0);
        assert_eq!(1, scheduler.tick(&mut engine, &notes));
        assert!(notes.is_empty());
        // Release tails are still ringing.
        assert_eq!(PlaybackState::Playing, scheduler.state());

        clock.set(1.7);
        scheduler.tick(&mut engine, &notes);
        assert!(scheduler.is_playing());

        clock.set(1.8);
        assert_eq!(1, scheduler.tick(&mut engine, &notes));
        assert_eq!(PlaybackState::Idle, scheduler.state());
        assert!(notes.is_empty());

        let events = device.note_events();
        let expected = [
            (NoteEventKind::On, "A3", 0.0),
            (NoteEventKind::Off, "A3", 0.5),
            (NoteEventKind::On, "C4", 0.5),
            (NoteEventKind::Off, "C4", 1.0),
        ];
        assert_eq!(expected.len(), events.len());
        for ((kind, name, at), NoteEvent { kind: k, note: n, at: a }) in
            expected.iter().zip(events.iter())
        {
            assert_eq!(kind, k);
            assert_eq!(note(name), *n);
            assert_time(*at, *a);
        }
    }

    #[test]
    fn test_stop_before_anything_fires() {
        let (mut engine, device) = ready_engine();
        let clock = device.manual_clock();
        clock.set(5.0);
        let notes = ActiveNotes::default();
        let mut transport = transport(&engine);
        let mut scheduler = Scheduler::default();

        assert!(scheduler.start(&mut engine, &notes, &mut transport, &Melody::prince_igor()));
        let cancel_handle = scheduler.cancel_handle().expect("running");
        scheduler.stop(&mut engine, &notes);

        assert!(cancel_handle.is_cancelled());
        assert_eq!(PlaybackState::Idle, scheduler.state());
        assert!(notes.is_empty());
        assert_eq!(vec![Call::ReleaseAll], device.calls());

        // Well past the end of the melody, nothing from the old run shows up.
        device.clear_calls();
        clock.set(60.0);
        assert_eq!(0, scheduler.tick(&mut engine, &notes));
        assert!(notes.is_empty());
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_stop_mid_note_releases_voices() {
        let (mut engine, device) = ready_engine();
        let clock = device.manual_clock();
        let notes = ActiveNotes::default();
        let mut transport = transport(&engine);
        let mut scheduler = Scheduler::default();

        scheduler.start(&mut engine, &notes, &mut transport, &two_notes());
        scheduler.tick(&mut engine, &notes);
        clock.set(0.3);
        scheduler.tick(&mut engine, &notes);
        assert_eq!(vec![note("A3")], notes.snapshot());

        scheduler.stop(&mut engine, &notes);
        assert!(notes.is_empty());
        assert_eq!(Some(&Call::ReleaseAll), device.calls().last());

        clock.set(3.0);
        let calls = device.calls().len();
        scheduler.tick(&mut engine, &notes);
        assert_eq!(calls, device.calls().len());
    }

    #[test]
    fn test_start_guards() {
        let (mut idle_engine, device) = engine_with(Arc::new(StaticSamples));
        let notes = ActiveNotes::default();
        let mut transport = transport(&idle_engine);
        let mut scheduler = Scheduler::default();

        assert!(!scheduler.start(&mut idle_engine, &notes, &mut transport, &two_notes()));
        assert_eq!(PlaybackState::Idle, scheduler.state());
        assert!(!transport.is_running());
        assert!(device.calls().is_empty());

        let (mut engine, _device) = ready_engine();
        let mut transport = Transport::new(engine.clock(), Tempo::default());
        assert!(scheduler.start(&mut engine, &notes, &mut transport, &two_notes()));
        assert!(!scheduler.start(&mut engine, &notes, &mut transport, &two_notes()));
        assert_eq!(5, scheduler.pending());
    }

    #[test]
    fn test_start_lets_go_of_live_notes() {
        let (mut engine, device) = ready_engine();
        let notes = ActiveNotes::default();
        notes.press(note("E4"));
        engine.note_on(note("E4"), None, None);

        let mut transport = transport(&engine);
        let mut scheduler = Scheduler::default();
        scheduler.start(&mut engine, &notes, &mut transport, &two_notes());
        assert!(notes.is_empty());

        let events = device.note_events();
        assert_eq!(
            NoteEvent {
                kind: NoteEventKind::Off,
                note: note("E4"),
                at: 0.0,
            },
            events[1]
        );
    }

    #[test]
    fn test_cancel_handle_stops_on_next_tick() {
        let (mut engine, device) = ready_engine();
        let notes = ActiveNotes::default();
        let mut transport = transport(&engine);
        let mut scheduler = Scheduler::default();

        scheduler.start(&mut engine, &notes, &mut transport, &two_notes());
        scheduler.tick(&mut engine, &notes);
        scheduler.cancel_handle().expect("running").cancel();

        assert_eq!(0, scheduler.tick(&mut engine, &notes));
        assert!(!scheduler.is_playing());
        assert!(notes.is_empty());
        assert_eq!(Some(&Call::ReleaseAll), device.calls().last());
    }

    #[test]
    fn test_lookahead_highlights_keys_on_time() {
        let (mut engine, device) = ready_engine();
        let clock = device.manual_clock();
        let notes = ActiveNotes::default();
        let mut transport = transport(&engine);
        let mut scheduler = Scheduler::new(SchedulerSettings {
            cleanup_buffer: 0.8,
            lookahead: 0.1,
        });

        scheduler.start(&mut engine, &notes, &mut transport, &two_notes());
        clock.set(0.45);
        assert_eq!(1, scheduler.tick(&mut engine, &notes));
        assert_eq!(Some(0.5), scheduler.next_due());

        // The engine already has the change at 0.5, the key highlight waits for it.
        let events = device.note_events();
        assert_eq!(3, events.len());
        assert_time(0.5, events[1].at);
        assert_time(0.5, events[2].at);
        assert_eq!(vec![note("A3")], notes.snapshot());

        clock.set(0.5);
        assert_eq!(2, scheduler.tick(&mut engine, &notes));
        assert_eq!(vec![note("C4")], notes.snapshot());
        assert_eq!(3, device.note_events().len());
        assert_time(0.9, scheduler.next_due().expect("running"));

        clock.set(0.95);
        assert_eq!(0, scheduler.tick(&mut engine, &notes));
        assert_eq!(4, device.note_events().len());
        assert_eq!(vec![note("C4")], notes.snapshot());

        clock.set(1.0);
        assert_eq!(1, scheduler.tick(&mut engine, &notes));
        assert!(notes.is_empty());
    }
}
