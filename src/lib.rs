// chordflow - Chord arrangement renderer
// Module declarations

pub mod adapters;
pub mod arranger;
pub mod commands;
pub mod config;
pub mod midi;
pub mod playback;
pub mod storage;
pub mod theory;

pub use arranger::{ArrangedChordEvent, Arrangement, ArrangementBlock, Chord, Section};
pub use config::{RenderConfig, SongDocument};
pub use midi::{export_midi, MidiExportOptions};
pub use playback::{PlaybackHandle, PlaybackOptions, Scheduler};
