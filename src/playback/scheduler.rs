// Realtime Scheduler - Drives playback sessions against the tokio clock
// One active session at a time; starting a new one stops the previous

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::{sleep_until, Instant};

use super::session::{PlaybackPlan, PlaybackSession, SessionState, SessionStats, SignalCallback};
use super::sink::{MidiSink, SinkError};
use crate::arranger::{clamp_midi, ArrangedChordEvent};
use crate::midi::{clamp_channel, ChannelRouting, DEFAULT_TEMPO};

pub const TEST_NOTE_MIN_MS: u64 = 40;
pub const TEST_NOTE_MAX_MS: u64 = 4000;

/// Longest single timer wait; later actions fire when it runs out
const MAX_TIMER_WAIT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Nothing to play")]
    NothingToPlay,

    #[error("Realtime playback needs a running tokio runtime")]
    NoRuntime,

    #[error("MIDI output error: {0}")]
    Sink(#[from] SinkError),
}

pub type PlaybackResult<T> = Result<T, PlaybackError>;

/// Realtime playback options
#[derive(Clone)]
pub struct PlaybackOptions {
    /// Beats per minute
    pub tempo: f64,

    /// Channel selection for events without their own channel
    pub routing: ChannelRouting,

    /// Called for every note edge and closing sweep
    pub on_signal: Option<SignalCallback>,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        PlaybackOptions {
            tempo: DEFAULT_TEMPO,
            routing: ChannelRouting::default(),
            on_signal: None,
        }
    }
}

impl fmt::Debug for PlaybackOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackOptions")
            .field("tempo", &self.tempo)
            .field("routing", &self.routing)
            .field("on_signal", &self.on_signal.is_some())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owned reference to one playback session
#[derive(Clone)]
pub struct PlaybackHandle {
    id: String,
    session: Arc<Mutex<PlaybackSession>>,
    state_rx: watch::Receiver<SessionState>,
    task: Option<AbortHandle>,
}

impl fmt::Debug for PlaybackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("driven", &self.task.is_some())
            .finish()
    }
}

impl PlaybackHandle {
    fn new(session: PlaybackSession, task: Option<AbortHandle>) -> Self {
        PlaybackHandle {
            id: session.id().to_string(),
            state_rx: session.subscribe(),
            session: Arc::new(Mutex::new(session)),
            task,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        lock(&self.session).state()
    }

    pub fn stats(&self) -> SessionStats {
        lock(&self.session).stats()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_finished()
    }

    /// Cancel the session. When this returns no timed action is left
    /// pending and every sounding note has been released.
    pub fn stop(&self) {
        lock(&self.session).stop();
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    /// Fire everything due at `now_ms` after the session began. Used when
    /// the caller owns the clock.
    pub fn advance_to(&self, now_ms: f64) -> usize {
        lock(&self.session).advance_to(now_ms)
    }

    /// Wait until the session completes or is cancelled
    pub async fn finished(&self) -> SessionState {
        let mut rx = self.state_rx.clone();
        loop {
            let state = *rx.borrow_and_update();
            if state.is_finished() {
                return state;
            }
            if rx.changed().await.is_err() {
                return *rx.borrow();
            }
        }
    }
}

fn deadline(origin: Instant, due_ms: f64) -> Instant {
    let offset = Duration::try_from_secs_f64(due_ms / 1000.0)
        .unwrap_or(MAX_TIMER_WAIT)
        .min(MAX_TIMER_WAIT);
    origin.checked_add(offset).unwrap_or(origin)
}

async fn drive(session: Arc<Mutex<PlaybackSession>>, origin: Instant) {
    loop {
        let due_ms = match lock(&session).next_due_ms() {
            Some(due) => due.max(0.0),
            None => break,
        };

        sleep_until(deadline(origin, due_ms)).await;

        let elapsed_ms = origin.elapsed().as_secs_f64() * 1000.0;
        lock(&session).advance_to(elapsed_ms.max(due_ms));
    }
}

/// Realtime MIDI scheduler bound to one output sink
pub struct Scheduler {
    sink: Arc<dyn MidiSink>,
    active: Mutex<Option<PlaybackHandle>>,
}

impl Scheduler {
    pub fn new(sink: Arc<dyn MidiSink>) -> Self {
        Scheduler {
            sink,
            active: Mutex::new(None),
        }
    }

    pub fn sink(&self) -> &Arc<dyn MidiSink> {
        &self.sink
    }

    /// Arm a session without starting a clock; drive it with
    /// `PlaybackHandle::advance_to`
    pub fn prepare(
        &self,
        events: &[ArrangedChordEvent],
        options: &PlaybackOptions,
    ) -> PlaybackResult<PlaybackHandle> {
        self.arm(events, options, None)
    }

    /// Start realtime playback on the current tokio runtime
    pub fn start(
        &self,
        events: &[ArrangedChordEvent],
        options: &PlaybackOptions,
    ) -> PlaybackResult<PlaybackHandle> {
        let runtime = Handle::try_current().map_err(|_| PlaybackError::NoRuntime)?;
        self.arm(events, options, Some(&runtime))
    }

    fn arm(
        &self,
        events: &[ArrangedChordEvent],
        options: &PlaybackOptions,
        runtime: Option<&Handle>,
    ) -> PlaybackResult<PlaybackHandle> {
        if events.is_empty() {
            return Err(PlaybackError::NothingToPlay);
        }

        let mut active = lock(&self.active);
        if let Some(previous) = active.take() {
            previous.stop();
        }

        let plan = PlaybackPlan::from_events(events, options.tempo, &options.routing);
        let note_ons = plan.note_on_count();
        let end_ms = plan.end_ms;
        let session = PlaybackSession::new(plan, self.sink.clone(), options.on_signal.clone());
        let handle = spawn(session, runtime);

        log::info!(
            "Playback session {} started on {}: {} events, {} notes, {:.0} ms",
            handle.id(),
            self.sink.name(),
            events.len(),
            note_ons,
            end_ms
        );

        *active = Some(handle.clone());
        Ok(handle)
    }

    /// Stop the active session, if any. Returns whether one was running.
    pub fn stop(&self) -> bool {
        match lock(&self.active).take() {
            Some(handle) => {
                let was_live = !handle.is_finished();
                handle.stop();
                was_live
            }
            None => false,
        }
    }

    /// The current session while it is still live
    pub fn active(&self) -> Option<PlaybackHandle> {
        lock(&self.active)
            .as_ref()
            .filter(|handle| !handle.is_finished())
            .cloned()
    }

    /// Play one note for `duration_ms` (clamped to 40-4000 ms) without
    /// disturbing the active session
    pub fn send_test_note(
        &self,
        channel: i32,
        note: i32,
        velocity: i32,
        duration_ms: u64,
    ) -> PlaybackResult<PlaybackHandle> {
        let runtime = Handle::try_current().map_err(|_| PlaybackError::NoRuntime)?;

        let channel = clamp_channel(channel);
        let note = clamp_midi(f64::from(note));
        let velocity = clamp_midi(f64::from(velocity));
        let duration_ms = duration_ms.clamp(TEST_NOTE_MIN_MS, TEST_NOTE_MAX_MS);

        let plan = PlaybackPlan::single_note(channel, note, velocity, duration_ms as f64);
        let session = PlaybackSession::new(plan, self.sink.clone(), None);

        log::info!(
            "Test note {} on channel {} for {} ms via {}",
            note,
            channel,
            duration_ms,
            self.sink.name()
        );

        Ok(spawn(session, Some(&runtime)))
    }
}

fn spawn(session: PlaybackSession, runtime: Option<&Handle>) -> PlaybackHandle {
    let mut handle = PlaybackHandle::new(session, None);
    if let Some(runtime) = runtime {
        let task = runtime.spawn(drive(handle.session.clone(), Instant::now()));
        handle.task = Some(task.abort_handle());
    }
    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arranger::LaneMode;
    use crate::midi::ChannelMessage;
    use crate::playback::sink::RecordingSink;

    fn event(start_beat: f64, notes: Vec<u8>) -> ArrangedChordEvent {
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
            strum_ms: 0.0,
            chord_index: 0,
        }
    }

    fn scheduler() -> (Scheduler, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        (Scheduler::new(sink.clone()), sink)
    }

    fn note_ons(sink: &RecordingSink) -> Vec<ChannelMessage> {
        sink.messages()
            .into_iter()
            .filter(|m| matches!(m, ChannelMessage::NoteOn { .. }))
            .collect()
    }

    #[test]
    fn test_empty_events_rejected() {
        let (scheduler, sink) = scheduler();
        let result = scheduler.prepare(&[], &PlaybackOptions::default());
        assert!(matches!(result, Err(PlaybackError::NothingToPlay)));
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn test_start_without_runtime() {
        let (scheduler, _sink) = scheduler();
        let result = scheduler.start(&[event(0.0, vec![60])], &PlaybackOptions::default());
        assert!(matches!(result, Err(PlaybackError::NoRuntime)));
    }

    #[test]
    fn test_channel_precedence_in_sent_bytes() {
        let (scheduler, sink) = scheduler();
        let mut options = PlaybackOptions::default();
        options.routing = ChannelRouting::new(Some(1)).with_mode_channel(LaneMode::Harmony, 3);

        let mut with_override = event(0.0, vec![60]);
        with_override.midi_channel = Some(5);
        let handle = scheduler.prepare(&[with_override], &options).unwrap();
        handle.advance_to(0.0);
        assert_eq!(sink.sent()[0], vec![0x94, 60, 100]);

        handle.stop();
        sink.clear();
        let handle = scheduler.prepare(&[event(0.0, vec![60])], &options).unwrap();
        handle.advance_to(0.0);
        assert_eq!(sink.sent()[0], vec![0x92, 60, 100]);

        handle.stop();
        sink.clear();
        options.routing = ChannelRouting::new(Some(1));
        let handle = scheduler.prepare(&[event(0.0, vec![60])], &options).unwrap();
        handle.advance_to(0.0);
        assert_eq!(sink.sent()[0], vec![0x90, 60, 100]);
    }

    #[test]
    fn test_stop_then_advance_sends_nothing_new() {
        let (scheduler, sink) = scheduler();
        let mut chord = event(0.0, vec![60, 64, 67]);
        chord.midi_channel = Some(2);
        let handle = scheduler
            .prepare(&[chord, event(1.0, vec![62])], &PlaybackOptions::default())
            .unwrap();

        handle.advance_to(10.0);
        assert_eq!(handle.state(), SessionState::Running);
        sink.clear();

        assert!(scheduler.stop());
        assert_eq!(handle.state(), SessionState::Cancelled);

        let messages = sink.messages();
        let offs_on_2 = messages
            .iter()
            .filter(|m| matches!(m, ChannelMessage::NoteOff { channel: 2, .. }))
            .count();
        assert_eq!(offs_on_2, 3);
        assert!(messages.contains(&ChannelMessage::AllNotesOff { channel: 2 }));

        sink.clear();
        handle.advance_to(60_000.0);
        assert!(note_ons(&sink).is_empty());
        assert!(sink.sent().is_empty());
        assert!(!scheduler.stop());
    }

    #[test]
    fn test_new_session_supersedes_previous() {
        let (scheduler, sink) = scheduler();
        let first = scheduler
            .prepare(&[event(0.0, vec![60])], &PlaybackOptions::default())
            .unwrap();
        first.advance_to(0.0);

        let second = scheduler
            .prepare(&[event(0.0, vec![72])], &PlaybackOptions::default())
            .unwrap();

        assert_eq!(first.state(), SessionState::Cancelled);
        assert_eq!(second.state(), SessionState::Scheduled);
        assert!(sink
            .messages()
            .contains(&ChannelMessage::NoteOff { channel: 1, note: 60 }));
        assert_eq!(scheduler.active().map(|h| h.id().to_string()), Some(second.id().to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_realtime_playback_completes() {
        let (scheduler, sink) = scheduler();
        let handle = scheduler
            .start(
                &[event(0.0, vec![60, 64, 67]), event(1.0, vec![65, 69, 72])],
                &PlaybackOptions::default(),
            )
            .unwrap();

        assert_eq!(handle.finished().await, SessionState::Completed);

        let messages = sink.messages();
        assert_eq!(note_ons(&sink).len(), 6);
        assert_eq!(messages.len(), 12 + 16);
        assert!(scheduler.active().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_realtime_stop_cancels_pending() {
        let (scheduler, sink) = scheduler();
        let handle = scheduler
            .start(
                &[event(0.0, vec![60]), event(4.0, vec![67])],
                &PlaybackOptions::default(),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handle.state(), SessionState::Running);
        assert_eq!(note_ons(&sink).len(), 1);

        handle.stop();
        sink.clear();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(sink.sent().is_empty());
        assert_eq!(handle.finished().await, SessionState::Cancelled);
    }

    #[test]
    fn test_deadline_caps_huge_offsets() {
        let origin = Instant::now();
        assert_eq!(deadline(origin, 1500.0), origin + Duration::from_millis(1500));
        assert_eq!(deadline(origin, 1e30), origin + MAX_TIMER_WAIT);
        assert_eq!(deadline(origin, f64::INFINITY), origin + MAX_TIMER_WAIT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_duration_still_completes() {
        let (scheduler, sink) = scheduler();
        let mut long = event(0.0, vec![60]);
        long.duration_beats = 1e20;
        let handle = scheduler.start(&[long], &PlaybackOptions::default()).unwrap();

        assert_eq!(handle.finished().await, SessionState::Completed);
        assert_eq!(note_ons(&sink).len(), 1);
        assert!(sink
            .messages()
            .contains(&ChannelMessage::NoteOff { channel: 1, note: 60 }));
        assert!(handle.stats().sent > 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_test_note_clamps_duration() {
        let (scheduler, sink) = scheduler();
        let handle = scheduler.send_test_note(20, 200, 90, 5).unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            sink.messages(),
            vec![ChannelMessage::NoteOn { channel: 16, note: 127, velocity: 90 }]
        );

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(handle.state(), SessionState::Completed);
        assert_eq!(sink.messages().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_test_note_leaves_active_session_alone() {
        let (scheduler, _sink) = scheduler();
        let playback = scheduler
            .start(&[event(0.0, vec![60])], &PlaybackOptions::default())
            .unwrap();
        let note = scheduler.send_test_note(1, 72, 100, 100).unwrap();

        assert_eq!(note.finished().await, SessionState::Completed);
        assert_eq!(playback.state(), SessionState::Running);
        assert_eq!(playback.finished().await, SessionState::Completed);
    }
}
