// Arranger - Sections placed on a shared beat timeline
// Model, normalization, structural edits, and event flattening

pub mod model;
pub mod normalize;
pub mod arrangement;
pub mod flatten;
pub mod snapshot;

// Re-export main types
pub use model::{ArrangementBlock, BlockIntent, Chord, ChordMetadata, LaneMode, Section};
pub use normalize::{normalize_blocks, normalize_channel, total_beats};
pub use arrangement::Arrangement;
pub use flatten::{clamp_midi, events_total_beats, flatten, ArrangedChordEvent};
pub use snapshot::{to_osc_progression, ArrangementSnapshot, OscProgressionChord};
