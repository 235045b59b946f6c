// Theory Engine - Chord qualities, voicings, and scale helpers
// Pure functions from (root, quality, inversion, drop, range) to pitch sets

pub mod quality;
pub mod voicing;
pub mod scale;

// Re-export main types
pub use quality::{chord_notes, diatonic_quality, ChordQuality, Extension, Mode};
pub use voicing::{
    apply_drop_voicing, apply_inversion, apply_voicing, constrain_to_range, voicing_description,
    DropVoicing,
};
pub use scale::{
    chord_name, generate_chord, generate_diatonic_chord, parse_degree, roman_numeral,
    scale_degree_root, scale_notes, DiatonicChordParams, NoteRange, VoicingParams,
};
