// Playback Session - Timed note actions for one realtime run
// Holds the pending queue and the set of sounding notes under one owner

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

use super::sink::MidiSink;
use crate::arranger::ArrangedChordEvent;
use crate::arranger::model::DEFAULT_VELOCITY;
use crate::midi::{ms_per_beat, ChannelMessage, ChannelRouting};

/// Delay after the last note-off before the closing all-notes-off sweep
pub const COMPLETION_MARGIN_MS: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Scheduled,
    Running,
    Completed,
    Cancelled,
}

impl SessionState {
    pub fn is_finished(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Cancelled)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Scheduled => "scheduled",
            SessionState::Running => "running",
            SessionState::Completed => "completed",
            SessionState::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Observer notification for every note edge and sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackSignal {
    On { note: u8, velocity: u8, channel: u8 },
    Off { note: u8, velocity: u8, channel: u8 },
    AllOff { channel: u8 },
}

pub type SignalCallback = Arc<dyn Fn(PlaybackSignal) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionKind {
    NoteOff { channel: u8, note: u8 },
    NoteOn { channel: u8, note: u8, velocity: u8 },
    /// All notes off on every channel, then the session completes
    Sweep,
    /// Complete without touching other notes
    Finish,
}

impl ActionKind {
    // Offs before ons at the same instant so a repeated pitch retriggers
    fn rank(&self) -> u8 {
        match self {
            ActionKind::NoteOff { .. } => 0,
            ActionKind::NoteOn { .. } => 1,
            ActionKind::Sweep | ActionKind::Finish => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedAction {
    pub at_ms: f64,
    pub kind: ActionKind,
}

/// Every timed action of a session, sorted by time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackPlan {
    pub actions: Vec<TimedAction>,
    pub end_ms: f64,
}

impl PlaybackPlan {
    /// Lay out note-on/off pairs (strummed by note index) and the final sweep
    pub fn from_events(events: &[ArrangedChordEvent], tempo: f64, routing: &ChannelRouting) -> Self {
        let ms_per_beat = ms_per_beat(tempo);
        let mut actions = Vec::new();
        let mut last_off_ms: f64 = 0.0;

        for event in events {
            let start_ms = event.start_beat * ms_per_beat;
            let gate_scale = (f64::from(event.gate_percent) / 100.0).max(0.01);
            let duration_ms = (event.duration_beats * ms_per_beat * gate_scale).max(1.0);
            let strum_ms = if event.strum_ms.is_finite() {
                event.strum_ms.max(0.0)
            } else {
                0.0
            };
            let channel = routing.resolve(event);
            let velocity = match event.velocity.min(127) {
                0 => DEFAULT_VELOCITY as u8,
                v => v,
            };

            for (index, &note) in event.notes.iter().enumerate() {
                let note = note.min(127);
                let on_ms = start_ms + index as f64 * strum_ms;
                let off_ms = on_ms + duration_ms;

                actions.push(TimedAction {
                    at_ms: on_ms,
                    kind: ActionKind::NoteOn { channel, note, velocity },
                });
                actions.push(TimedAction {
                    at_ms: off_ms,
                    kind: ActionKind::NoteOff { channel, note },
                });
                last_off_ms = last_off_ms.max(off_ms);
            }
        }

        actions.sort_by(|a, b| {
            a.at_ms
                .partial_cmp(&b.at_ms)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.kind.rank().cmp(&b.kind.rank()))
        });

        let end_ms = last_off_ms + COMPLETION_MARGIN_MS;
        actions.push(TimedAction {
            at_ms: end_ms,
            kind: ActionKind::Sweep,
        });

        PlaybackPlan { actions, end_ms }
    }

    /// A single note, then completion without a sweep so other sessions
    /// keep sounding
    pub fn single_note(channel: u8, note: u8, velocity: u8, duration_ms: f64) -> Self {
        PlaybackPlan {
            actions: vec![
                TimedAction {
                    at_ms: 0.0,
                    kind: ActionKind::NoteOn { channel, note, velocity },
                },
                TimedAction {
                    at_ms: duration_ms,
                    kind: ActionKind::NoteOff { channel, note },
                },
                TimedAction {
                    at_ms: duration_ms,
                    kind: ActionKind::Finish,
                },
            ],
            end_ms: duration_ms,
        }
    }

    pub fn note_on_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| matches!(a.kind, ActionKind::NoteOn { .. }))
            .count()
    }
}

/// Send counters for a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub sent: usize,
    pub failed: usize,
}

/// One playback run. Only this type touches the sounding set, so a
/// note-on firing and a concurrent stop never interleave.
pub struct PlaybackSession {
    id: String,
    state: SessionState,
    pending: VecDeque<TimedAction>,
    /// (channel, note) for every note-on whose note-off has not been sent
    sounding: Vec<(u8, u8)>,
    sink: Arc<dyn MidiSink>,
    on_signal: Option<SignalCallback>,
    stats: SessionStats,
    state_tx: watch::Sender<SessionState>,
}

impl fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .field("sounding", &self.sounding)
            .field("stats", &self.stats)
            .finish()
    }
}

impl PlaybackSession {
    pub fn new(plan: PlaybackPlan, sink: Arc<dyn MidiSink>, on_signal: Option<SignalCallback>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        let mut session = PlaybackSession {
            id: uuid::Uuid::new_v4().to_string(),
            state: SessionState::Idle,
            pending: plan.actions.into(),
            sounding: Vec::new(),
            sink,
            on_signal,
            stats: SessionStats::default(),
            state_tx,
        };
        session.set_state(SessionState::Scheduled);
        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn sounding(&self) -> &[(u8, u8)] {
        &self.sounding
    }

    /// Receiver that observes every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Time of the next pending action, if any
    pub fn next_due_ms(&self) -> Option<f64> {
        if self.state.is_finished() {
            return None;
        }
        self.pending.front().map(|a| a.at_ms)
    }

    /// Fire every action due at or before `now_ms`; returns how many fired
    pub fn advance_to(&mut self, now_ms: f64) -> usize {
        if self.state.is_finished() {
            return 0;
        }

        let mut fired = 0;
        while let Some(action) = self.pending.front().copied() {
            if action.at_ms > now_ms {
                break;
            }
            self.pending.pop_front();
            if self.state == SessionState::Scheduled {
                self.set_state(SessionState::Running);
            }
            self.fire(action.kind);
            fired += 1;

            if self.state.is_finished() {
                break;
            }
        }
        fired
    }

    /// Cancel: drop pending actions, release sounding notes, then send
    /// all-notes-off on every channel. Safe to call more than once.
    pub fn stop(&mut self) {
        if self.state.is_finished() {
            return;
        }

        self.pending.clear();

        for (channel, note) in std::mem::take(&mut self.sounding) {
            self.send(ChannelMessage::NoteOff { channel, note });
        }
        for channel in 1..=16 {
            self.send(ChannelMessage::AllNotesOff { channel });
        }

        self.set_state(SessionState::Cancelled);
        log::info!(
            "Playback session {} cancelled ({} sent, {} failed)",
            self.id,
            self.stats.sent,
            self.stats.failed
        );
    }

    fn fire(&mut self, kind: ActionKind) {
        match kind {
            ActionKind::NoteOn { channel, note, velocity } => {
                self.send(ChannelMessage::NoteOn { channel, note, velocity });
                self.sounding.push((channel, note));
                self.signal(PlaybackSignal::On { note, velocity, channel });
            }
            ActionKind::NoteOff { channel, note } => {
                self.send(ChannelMessage::NoteOff { channel, note });
                if let Some(index) = self.sounding.iter().position(|&s| s == (channel, note)) {
                    self.sounding.remove(index);
                }
                self.signal(PlaybackSignal::Off { note, velocity: 0, channel });
            }
            ActionKind::Sweep => {
                for channel in 1..=16 {
                    self.send(ChannelMessage::AllNotesOff { channel });
                    self.signal(PlaybackSignal::AllOff { channel });
                }
                self.sounding.clear();
                self.complete();
            }
            ActionKind::Finish => self.complete(),
        }
    }

    fn complete(&mut self) {
        self.pending.clear();
        self.set_state(SessionState::Completed);
        log::info!(
            "Playback session {} completed ({} sent, {} failed)",
            self.id,
            self.stats.sent,
            self.stats.failed
        );
    }

    fn send(&mut self, message: ChannelMessage) {
        match self.sink.send(&message.to_bytes()) {
            Ok(()) => self.stats.sent += 1,
            Err(e) => {
                self.stats.failed += 1;
                log::warn!("MIDI send to {} failed: {}", self.sink.name(), e);
            }
        }
    }

    fn signal(&self, signal: PlaybackSignal) {
        if let Some(callback) = &self.on_signal {
            callback(signal);
        }
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arranger::LaneMode;
    use crate::playback::sink::RecordingSink;
    use std::sync::Mutex;

    fn event(start_beat: f64, notes: Vec<u8>, strum_ms: f64) -> ArrangedChordEvent {
        ArrangedChordEvent {
            block_id: "b".to_string(),
            section_id: "s".to_string(),
            section_name: "Verse".to_string(),
            mode: LaneMode::Harmony,
            midi_channel: None,
            start_beat,
            duration_beats: 1.0,
            notes,
            velocity: 100,
            gate_percent: 100,
            strum_ms,
            chord_index: 0,
        }
    }

    fn session_for(events: &[ArrangedChordEvent]) -> (PlaybackSession, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let plan = PlaybackPlan::from_events(events, 120.0, &ChannelRouting::default());
        (PlaybackSession::new(plan, sink.clone(), None), sink)
    }

    #[test]
    fn test_plan_timing_with_strum() {
        let plan = PlaybackPlan::from_events(
            &[event(1.0, vec![60, 64, 67], 20.0)],
            120.0,
            &ChannelRouting::default(),
        );

        let ons: Vec<f64> = plan
            .actions
            .iter()
            .filter(|a| matches!(a.kind, ActionKind::NoteOn { .. }))
            .map(|a| a.at_ms)
            .collect();
        assert_eq!(ons, vec![500.0, 520.0, 540.0]);
        assert_eq!(plan.end_ms, 540.0 + 500.0 + COMPLETION_MARGIN_MS);
        assert_eq!(plan.actions.last().map(|a| a.kind), Some(ActionKind::Sweep));
        assert_eq!(plan.note_on_count(), 3);
    }

    #[test]
    fn test_plan_gate_and_minimum_duration() {
        let mut short = event(0.0, vec![60], 0.0);
        short.gate_percent = 50;
        let plan = PlaybackPlan::from_events(&[short], 120.0, &ChannelRouting::default());
        assert_eq!(plan.actions[1].at_ms, 250.0);

        let mut tiny = event(0.0, vec![60], 0.0);
        tiny.duration_beats = 0.0;
        let plan = PlaybackPlan::from_events(&[tiny], 120.0, &ChannelRouting::default());
        assert_eq!(plan.actions[1].at_ms, 1.0);
    }

    #[test]
    fn test_off_sorts_before_on_at_same_time() {
        let plan = PlaybackPlan::from_events(
            &[event(0.0, vec![60], 0.0), event(1.0, vec![60], 0.0)],
            120.0,
            &ChannelRouting::default(),
        );
        assert_eq!(plan.actions[1].at_ms, 500.0);
        assert!(matches!(plan.actions[1].kind, ActionKind::NoteOff { .. }));
        assert!(matches!(plan.actions[2].kind, ActionKind::NoteOn { .. }));
    }

    #[test]
    fn test_natural_completion() {
        let (mut session, sink) = session_for(&[event(0.0, vec![60, 64], 0.0)]);
        assert_eq!(session.state(), SessionState::Scheduled);

        session.advance_to(0.0);
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.sounding().len(), 2);

        session.advance_to(500.0);
        assert!(session.sounding().is_empty());
        assert_eq!(session.state(), SessionState::Running);

        session.advance_to(530.0);
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(session.next_due_ms(), None);

        let messages = sink.messages();
        assert_eq!(messages.len(), 4 + 16);
        assert!(messages[4..]
            .iter()
            .all(|m| matches!(m, ChannelMessage::AllNotesOff { .. })));
    }

    #[test]
    fn test_stop_releases_sounding_notes_and_silences_all_channels() {
        let mut chord = event(0.0, vec![60, 64], 0.0);
        chord.midi_channel = Some(4);
        let (mut session, sink) = session_for(&[chord, event(2.0, vec![67], 0.0)]);

        session.advance_to(100.0);
        sink.clear();
        session.stop();

        assert_eq!(session.state(), SessionState::Cancelled);
        assert_eq!(session.pending_len(), 0);
        assert!(session.sounding().is_empty());

        let messages = sink.messages();
        assert_eq!(messages[0], ChannelMessage::NoteOff { channel: 4, note: 60 });
        assert_eq!(messages[1], ChannelMessage::NoteOff { channel: 4, note: 64 });
        for channel in 1..=16u8 {
            assert!(messages.contains(&ChannelMessage::AllNotesOff { channel }));
        }

        // Nothing fires after cancellation
        sink.clear();
        assert_eq!(session.advance_to(10_000.0), 0);
        assert!(sink.sent().is_empty());

        // Second stop is a no-op
        session.stop();
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn test_stop_before_start_sends_sweep_only() {
        let (mut session, sink) = session_for(&[event(0.0, vec![60], 0.0)]);
        session.stop();
        let messages = sink.messages();
        assert_eq!(messages.len(), 16);
        assert!(!messages.iter().any(|m| matches!(m, ChannelMessage::NoteOn { .. })));
    }

    #[test]
    fn test_overlapping_same_pitch_tracks_both() {
        let mut first = event(0.0, vec![60], 0.0);
        first.gate_percent = 200;
        let (mut session, _sink) = session_for(&[first, event(1.0, vec![60], 0.0)]);

        session.advance_to(600.0);
        assert_eq!(session.sounding(), &[(1, 60), (1, 60)]);
        session.advance_to(1000.0);
        assert_eq!(session.sounding().len(), 0);
    }

    #[test]
    fn test_send_failures_are_counted() {
        let sink: Arc<dyn MidiSink> = Arc::new(RecordingSink::failing());
        let plan = PlaybackPlan::from_events(&[event(0.0, vec![60], 0.0)], 120.0, &ChannelRouting::default());
        let mut session = PlaybackSession::new(plan, sink, None);

        session.advance_to(0.0);
        assert_eq!(session.stats().failed, 1);
        assert_eq!(session.state(), SessionState::Running);

        session.stop();
        assert_eq!(session.state(), SessionState::Cancelled);
        assert_eq!(session.stats().sent, 0);
    }

    #[test]
    fn test_signals_reported() {
        let seen: Arc<Mutex<Vec<PlaybackSignal>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        let callback: SignalCallback = Arc::new(move |s| seen_cb.lock().unwrap().push(s));

        let plan = PlaybackPlan::from_events(&[event(0.0, vec![62], 0.0)], 120.0, &ChannelRouting::default());
        let mut session = PlaybackSession::new(plan, Arc::new(RecordingSink::new()), Some(callback));
        session.advance_to(1_000.0);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], PlaybackSignal::On { note: 62, velocity: 100, channel: 1 });
        assert_eq!(seen[1], PlaybackSignal::Off { note: 62, velocity: 0, channel: 1 });
        assert_eq!(seen.len(), 2 + 16);
        assert_eq!(seen[17], PlaybackSignal::AllOff { channel: 16 });
    }

    #[test]
    fn test_single_note_finishes_without_sweep() {
        let sink = Arc::new(RecordingSink::new());
        let plan = PlaybackPlan::single_note(2, 72, 90, 250.0);
        let mut session = PlaybackSession::new(plan, sink.clone(), None);

        session.advance_to(249.0);
        assert_eq!(session.sounding(), &[(2, 72)]);
        session.advance_to(250.0);

        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(
            sink.messages(),
            vec![
                ChannelMessage::NoteOn { channel: 2, note: 72, velocity: 90 },
                ChannelMessage::NoteOff { channel: 2, note: 72 },
            ]
        );
    }

    #[test]
    fn test_state_changes_observable() {
        let (mut session, _sink) = session_for(&[event(0.0, vec![60], 0.0)]);
        let rx = session.subscribe();
        assert_eq!(*rx.borrow(), SessionState::Scheduled);
        session.stop();
        assert_eq!(*rx.borrow(), SessionState::Cancelled);
    }
}
