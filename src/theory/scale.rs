// Scales - Scale degrees, chord naming, and complete chord generation
// Builds voiced chords from (root, quality) or (key, degree, mode)

use serde::{Deserialize, Serialize};

use super::quality::{chord_notes, diatonic_quality, ChordQuality, Extension, Mode};
use super::voicing::{apply_voicing, constrain_to_range, DropVoicing};

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Inclusive MIDI note range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRange {
    pub min: i32,
    pub max: i32,
}

impl NoteRange {
    pub fn new(min: i32, max: i32) -> Self {
        NoteRange { min, max }
    }
}

/// Parameters for a single voiced chord
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoicingParams {
    pub root: i32,
    pub quality: ChordQuality,
    #[serde(default)]
    pub inversion: usize,
    #[serde(default)]
    pub drop: DropVoicing,
    #[serde(default)]
    pub range: Option<NoteRange>,
}

impl VoicingParams {
    pub fn new(root: i32, quality: ChordQuality) -> Self {
        VoicingParams {
            root,
            quality,
            inversion: 0,
            drop: DropVoicing::None,
            range: None,
        }
    }
}

/// Parameters for a chord built on a scale degree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiatonicChordParams {
    pub key_root: i32,
    /// Scale degree (1-7)
    pub degree: u8,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub extension: Option<Extension>,
    #[serde(default)]
    pub inversion: usize,
    #[serde(default)]
    pub drop: DropVoicing,
    #[serde(default)]
    pub range: Option<NoteRange>,
}

/// The seven notes of a mode starting at `root`
pub fn scale_notes(root: i32, mode: Mode) -> Vec<i32> {
    let mut notes = Vec::with_capacity(7);
    let mut current = root;
    notes.push(current);
    // Last step returns to the octave
    for step in &mode.steps()[..6] {
        current += step;
        notes.push(current);
    }
    notes
}

/// Root pitch of a scale degree (1-7) in a key
pub fn scale_degree_root(key_root: i32, degree: u8, mode: Mode) -> i32 {
    let index = (usize::from(degree.max(1)) - 1) % 7;
    scale_notes(key_root, mode)[index]
}

/// Semitone offset of a degree string such as "b7" or "#4"; unknown -> 0
pub fn parse_degree(degree: &str) -> i32 {
    match degree.trim() {
        "1" => 0,
        "b2" => 1,
        "2" => 2,
        "b3" => 3,
        "3" => 4,
        "4" => 5,
        "#4" | "b5" => 6,
        "5" => 7,
        "#5" | "b6" => 8,
        "6" => 9,
        "b7" => 10,
        "7" => 11,
        _ => 0,
    }
}

/// Chord name from root pitch and quality, e.g. "CMaj7"
pub fn chord_name(root: i32, quality: ChordQuality) -> String {
    let name = NOTE_NAMES[root.rem_euclid(12) as usize];
    format!("{}{}", name, quality.tag())
}

/// Roman numeral for a degree, lowercase for minor and diminished chords
pub fn roman_numeral(degree: u8, mode: Mode) -> String {
    const NUMERALS: [&str; 7] = ["I", "II", "III", "IV", "V", "VI", "VII"];

    let quality = diatonic_quality(degree, mode);
    let numeral = NUMERALS[(usize::from(degree.max(1)) - 1) % 7];

    match quality {
        ChordQuality::HalfDiminished7
        | ChordQuality::Diminished
        | ChordQuality::Diminished7 => format!("{}°", numeral.to_lowercase()),
        q if q.is_minor() => numeral.to_lowercase(),
        ChordQuality::Augmented | ChordQuality::Augmented7 => format!("{}+", numeral),
        _ => numeral.to_string(),
    }
}

/// Chord notes, then voicing, then optional range constraint
pub fn generate_chord(params: &VoicingParams) -> Vec<i32> {
    let base = chord_notes(params.root, params.quality);
    let voiced = apply_voicing(&base, params.inversion, params.drop);

    match params.range {
        Some(range) => constrain_to_range(&voiced, range.min, range.max),
        None => voiced,
    }
}

/// Degree root, diatonic quality, optional extension, then `generate_chord`
pub fn generate_diatonic_chord(params: &DiatonicChordParams) -> Vec<i32> {
    let root = scale_degree_root(params.key_root, params.degree, params.mode);
    let mut quality = diatonic_quality(params.degree, params.mode);
    if let Some(extension) = params.extension {
        quality = quality.extend(extension);
    }

    generate_chord(&VoicingParams {
        root,
        quality,
        inversion: params.inversion,
        drop: params.drop,
        range: params.range,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_notes_c_major() {
        assert_eq!(scale_notes(60, Mode::Ionian), vec![60, 62, 64, 65, 67, 69, 71]);
    }

    #[test]
    fn test_scale_notes_a_aeolian() {
        assert_eq!(scale_notes(57, Mode::Aeolian), vec![57, 59, 60, 62, 64, 65, 67]);
    }

    #[test]
    fn test_scale_degree_root() {
        assert_eq!(scale_degree_root(60, 5, Mode::Ionian), 67);
        assert_eq!(scale_degree_root(60, 1, Mode::Dorian), 60);
    }

    #[test]
    fn test_parse_degree() {
        assert_eq!(parse_degree("b7"), 10);
        assert_eq!(parse_degree("#4"), 6);
        assert_eq!(parse_degree("?"), 0);
    }

    #[test]
    fn test_chord_name() {
        assert_eq!(chord_name(60, ChordQuality::Major7), "CMaj7");
        assert_eq!(chord_name(61, ChordQuality::Minor), "C#min");
        assert_eq!(chord_name(-1, ChordQuality::Major), "BMaj");
    }

    #[test]
    fn test_roman_numerals() {
        assert_eq!(roman_numeral(1, Mode::Ionian), "I");
        assert_eq!(roman_numeral(2, Mode::Ionian), "ii");
        assert_eq!(roman_numeral(5, Mode::Ionian), "V");
        assert_eq!(roman_numeral(7, Mode::Ionian), "vii°");
    }

    #[test]
    fn test_generate_chord_with_voicing_and_range() {
        let mut params = VoicingParams::new(60, ChordQuality::Major7);
        assert_eq!(generate_chord(&params), vec![60, 64, 67, 71]);

        params.inversion = 1;
        params.drop = DropVoicing::Drop2;
        assert_eq!(generate_chord(&params), vec![59, 64, 67, 72]);

        params.range = Some(NoteRange::new(60, 72));
        for note in generate_chord(&params) {
            assert!((60..=72).contains(&note));
        }
    }

    #[test]
    fn test_generate_diatonic_chord() {
        // V9 in C major: G dom9
        let params = DiatonicChordParams {
            key_root: 60,
            degree: 5,
            mode: Mode::Ionian,
            extension: Some(Extension::Ninth),
            inversion: 0,
            drop: DropVoicing::None,
            range: None,
        };
        assert_eq!(generate_diatonic_chord(&params), vec![67, 71, 74, 77, 81]);
    }

    #[test]
    fn test_generate_diatonic_minor_ii() {
        let params = DiatonicChordParams {
            key_root: 60,
            degree: 2,
            mode: Mode::Ionian,
            extension: None,
            inversion: 0,
            drop: DropVoicing::None,
            range: None,
        };
        assert_eq!(generate_diatonic_chord(&params), vec![62, 65, 69]);
    }
}
