// Chord Qualities - Interval tables, extensions, and diatonic lookup
// Closed enums replace string-keyed tables; parsing falls back to major

use serde::{Deserialize, Serialize};
use std::fmt;

/// Intervallic type of a chord
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChordQuality {
    // Triads
    Major,
    Minor,
    Diminished,
    Augmented,
    Sus2,
    Sus4,

    // Seventh chords
    Major7,
    Minor7,
    Dominant7,
    Diminished7,
    HalfDiminished7,
    MinorMajor7,
    Augmented7,

    // Extended chords
    Major9,
    Minor9,
    Dominant9,
    Major11,
    Minor11,
    Dominant11,
    Major13,
    Minor13,
    Dominant13,
}

impl ChordQuality {
    pub const ALL: [ChordQuality; 22] = [
        ChordQuality::Major,
        ChordQuality::Minor,
        ChordQuality::Diminished,
        ChordQuality::Augmented,
        ChordQuality::Sus2,
        ChordQuality::Sus4,
        ChordQuality::Major7,
        ChordQuality::Minor7,
        ChordQuality::Dominant7,
        ChordQuality::Diminished7,
        ChordQuality::HalfDiminished7,
        ChordQuality::MinorMajor7,
        ChordQuality::Augmented7,
        ChordQuality::Major9,
        ChordQuality::Minor9,
        ChordQuality::Dominant9,
        ChordQuality::Major11,
        ChordQuality::Minor11,
        ChordQuality::Dominant11,
        ChordQuality::Major13,
        ChordQuality::Minor13,
        ChordQuality::Dominant13,
    ];

    /// Semitone offsets from the root
    pub fn intervals(&self) -> &'static [i32] {
        match self {
            ChordQuality::Major => &[0, 4, 7],
            ChordQuality::Minor => &[0, 3, 7],
            ChordQuality::Diminished => &[0, 3, 6],
            ChordQuality::Augmented => &[0, 4, 8],
            ChordQuality::Sus2 => &[0, 2, 7],
            ChordQuality::Sus4 => &[0, 5, 7],
            ChordQuality::Major7 => &[0, 4, 7, 11],
            ChordQuality::Minor7 => &[0, 3, 7, 10],
            ChordQuality::Dominant7 => &[0, 4, 7, 10],
            ChordQuality::Diminished7 => &[0, 3, 6, 9],
            ChordQuality::HalfDiminished7 => &[0, 3, 6, 10],
            ChordQuality::MinorMajor7 => &[0, 3, 7, 11],
            ChordQuality::Augmented7 => &[0, 4, 8, 10],
            ChordQuality::Major9 => &[0, 4, 7, 11, 14],
            ChordQuality::Minor9 => &[0, 3, 7, 10, 14],
            ChordQuality::Dominant9 => &[0, 4, 7, 10, 14],
            ChordQuality::Major11 => &[0, 4, 7, 11, 14, 17],
            ChordQuality::Minor11 => &[0, 3, 7, 10, 14, 17],
            ChordQuality::Dominant11 => &[0, 4, 7, 10, 14, 17],
            ChordQuality::Major13 => &[0, 4, 7, 11, 14, 17, 21],
            ChordQuality::Minor13 => &[0, 3, 7, 10, 14, 17, 21],
            ChordQuality::Dominant13 => &[0, 4, 7, 10, 14, 17, 21],
        }
    }

    /// Short tag used in song files and chord names (e.g. "Maj7", "hdim7")
    pub fn tag(&self) -> &'static str {
        match self {
            ChordQuality::Major => "Maj",
            ChordQuality::Minor => "min",
            ChordQuality::Diminished => "dim",
            ChordQuality::Augmented => "aug",
            ChordQuality::Sus2 => "sus2",
            ChordQuality::Sus4 => "sus4",
            ChordQuality::Major7 => "Maj7",
            ChordQuality::Minor7 => "min7",
            ChordQuality::Dominant7 => "dom7",
            ChordQuality::Diminished7 => "dim7",
            ChordQuality::HalfDiminished7 => "hdim7",
            ChordQuality::MinorMajor7 => "minMaj7",
            ChordQuality::Augmented7 => "aug7",
            ChordQuality::Major9 => "Maj9",
            ChordQuality::Minor9 => "min9",
            ChordQuality::Dominant9 => "dom9",
            ChordQuality::Major11 => "Maj11",
            ChordQuality::Minor11 => "min11",
            ChordQuality::Dominant11 => "dom11",
            ChordQuality::Major13 => "Maj13",
            ChordQuality::Minor13 => "min13",
            ChordQuality::Dominant13 => "dom13",
        }
    }

    /// Parse an external quality tag, falling back to a major triad
    pub fn parse_lossy(s: &str) -> Self {
        ChordQuality::ALL
            .iter()
            .copied()
            .find(|q| q.tag() == s.trim())
            .unwrap_or(ChordQuality::Major)
    }

    /// Add a 7th/9th/11th/13th extension.
    ///
    /// Diminished and augmented chords collapse every extension to their
    /// seventh; qualities without a mapping are returned unchanged.
    pub fn extend(&self, extension: Extension) -> Self {
        use ChordQuality::*;
        use Extension::*;

        match (self, extension) {
            (Major | Major7, Seventh) => Major7,
            (Major | Major7, Ninth) => Major9,
            (Major | Major7, Eleventh) => Major11,
            (Major | Major7, Thirteenth) => Major13,

            (Minor | Minor7, Seventh) => Minor7,
            (Minor | Minor7, Ninth) => Minor9,
            (Minor | Minor7, Eleventh) => Minor11,
            (Minor | Minor7, Thirteenth) => Minor13,

            (Sus2 | Sus4 | Dominant7, Seventh) => Dominant7,
            (Sus2 | Sus4 | Dominant7, Ninth) => Dominant9,
            (Sus2 | Sus4 | Dominant7, Eleventh) => Dominant11,
            (Sus2 | Sus4 | Dominant7, Thirteenth) => Dominant13,

            (Diminished, _) => Diminished7,
            (Augmented, _) => Augmented7,
            (HalfDiminished7, _) => HalfDiminished7,

            (other, _) => *other,
        }
    }

    pub fn is_minor(&self) -> bool {
        self.tag().contains("min")
    }
}

impl fmt::Display for ChordQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl From<String> for ChordQuality {
    fn from(s: String) -> Self {
        ChordQuality::parse_lossy(&s)
    }
}

impl From<ChordQuality> for String {
    fn from(q: ChordQuality) -> Self {
        q.tag().to_string()
    }
}

/// Chord extension degree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Extension {
    Seventh,
    Ninth,
    Eleventh,
    Thirteenth,
}

impl TryFrom<u8> for Extension {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            7 => Ok(Extension::Seventh),
            9 => Ok(Extension::Ninth),
            11 => Ok(Extension::Eleventh),
            13 => Ok(Extension::Thirteenth),
            other => Err(format!("unsupported chord extension: {}", other)),
        }
    }
}

impl From<Extension> for u8 {
    fn from(ext: Extension) -> Self {
        match ext {
            Extension::Seventh => 7,
            Extension::Ninth => 9,
            Extension::Eleventh => 11,
            Extension::Thirteenth => 13,
        }
    }
}

/// Church modes, rotations of the major scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    Ionian,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Aeolian,
    Locrian,
}

/// Qualities of the seven diatonic chords of the major scale
const MAJOR_SCALE_QUALITIES: [ChordQuality; 7] = [
    ChordQuality::Major,
    ChordQuality::Minor,
    ChordQuality::Minor,
    ChordQuality::Major,
    ChordQuality::Dominant7,
    ChordQuality::Minor,
    ChordQuality::HalfDiminished7,
];

impl Mode {
    /// Rotation relative to Ionian
    pub fn offset(&self) -> usize {
        match self {
            Mode::Ionian => 0,
            Mode::Dorian => 1,
            Mode::Phrygian => 2,
            Mode::Lydian => 3,
            Mode::Mixolydian => 4,
            Mode::Aeolian => 5,
            Mode::Locrian => 6,
        }
    }

    /// Whole/half step pattern, octave step last
    pub fn steps(&self) -> [i32; 7] {
        match self {
            Mode::Ionian => [2, 2, 1, 2, 2, 2, 1],
            Mode::Dorian => [2, 1, 2, 2, 2, 1, 2],
            Mode::Phrygian => [1, 2, 2, 2, 1, 2, 2],
            Mode::Lydian => [2, 2, 2, 1, 2, 2, 1],
            Mode::Mixolydian => [2, 2, 1, 2, 2, 1, 2],
            Mode::Aeolian => [2, 1, 2, 2, 1, 2, 2],
            Mode::Locrian => [1, 2, 2, 1, 2, 2, 2],
        }
    }

    /// Parse a mode name, defaulting to Ionian
    pub fn from_string(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "dorian" => Mode::Dorian,
            "phrygian" => Mode::Phrygian,
            "lydian" => Mode::Lydian,
            "mixolydian" => Mode::Mixolydian,
            "aeolian" | "minor" => Mode::Aeolian,
            "locrian" => Mode::Locrian,
            _ => Mode::Ionian,
        }
    }
}

/// Quality of the chord built on a scale degree (1-7) in a mode
pub fn diatonic_quality(degree: u8, mode: Mode) -> ChordQuality {
    let index = (usize::from(degree.max(1)) - 1 + mode.offset()) % 7;
    MAJOR_SCALE_QUALITIES[index]
}

/// Generate the unclamped pitches of a chord: `root + interval` per table entry
pub fn chord_notes(root: i32, quality: ChordQuality) -> Vec<i32> {
    quality.intervals().iter().map(|interval| root + interval).collect()
}
