// Playback - Realtime MIDI output for flattened arrangements
// Sinks, the per-run session state machine, and the tokio-driven scheduler

pub mod sink;
pub mod session;
pub mod scheduler;

// Re-export main types
pub use sink::{LogSink, MidiSink, RecordingSink, SinkError};
#[cfg(feature = "midir")]
pub use sink::{list_output_ports, MidirSink};
pub use session::{
    PlaybackPlan, PlaybackSession, PlaybackSignal, SessionState, SessionStats, SignalCallback,
    COMPLETION_MARGIN_MS,
};
pub use scheduler::{PlaybackError, PlaybackHandle, PlaybackOptions, PlaybackResult, Scheduler};
