// Arrangement Model - Chords, sections, and timeline blocks
// Fixed-shape records for the symbolic song handed over by the editor

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::theory::{self, ChordQuality, DropVoicing, VoicingParams};

/// Shortest chord slot the renderer will emit, in beats
pub const MIN_CHORD_BEATS: f64 = 0.25;

/// Default per-step velocity
pub const DEFAULT_VELOCITY: i32 = 100;

/// Default per-step gate percentage
pub const DEFAULT_GATE_PERCENT: i32 = 100;

/// Lane a block is placed on; only used for channel routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneMode {
    #[default]
    Harmony,
    Drum,
    #[serde(other)]
    Other,
}

impl LaneMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaneMode::Harmony => "harmony",
            LaneMode::Drum => "drum",
            LaneMode::Other => "other",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "harmony" => LaneMode::Harmony,
            "drum" => LaneMode::Drum,
            _ => LaneMode::Other,
        }
    }
}

/// Editorial purpose of a block. Carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockIntent {
    Main,
    Fill,
    Break,
    Transition,
    Custom,
}

/// How a chord was built, plus per-step performance data.
///
/// Per-step arrays are indexed by the chord's local beat index; missing
/// entries fall back to defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChordMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<ChordQuality>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inversion: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop: Option<DropVoicing>,

    /// MIDI velocity per step (0-127)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub velocities: Vec<i32>,

    /// Gate length per step, percent of the slot (1-200)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gate: Vec<i32>,

    /// Intra-chord note stagger per step, milliseconds
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub strum: Vec<f64>,
}

impl ChordMetadata {
    pub fn velocity_at(&self, step: usize) -> Option<i32> {
        self.velocities.get(step).copied()
    }

    pub fn gate_at(&self, step: usize) -> Option<i32> {
        self.gate.get(step).copied()
    }

    pub fn strum_at(&self, step: usize) -> Option<f64> {
        self.strum.get(step).copied()
    }
}

/// One chord slot in a progression. Empty `notes` is a rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chord {
    #[serde(default)]
    pub notes: Vec<i32>,

    /// Duration in beats
    pub duration: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ChordMetadata>,
}

impl Chord {
    pub fn new(notes: Vec<i32>, duration: f64) -> Self {
        Chord {
            notes,
            duration,
            metadata: None,
        }
    }

    /// A silent slot that still occupies time
    pub fn rest(duration: f64) -> Self {
        Chord::new(Vec::new(), duration)
    }

    /// Build a chord from voicing parameters, recording how it was voiced
    pub fn from_voicing(params: &VoicingParams, duration: f64) -> Self {
        Chord {
            notes: theory::generate_chord(params),
            duration,
            metadata: Some(ChordMetadata {
                root: Some(params.root),
                quality: Some(params.quality),
                inversion: Some(params.inversion),
                drop: Some(params.drop),
                ..Default::default()
            }),
        }
    }

    pub fn with_metadata(mut self, metadata: ChordMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Duration used for rendering, never shorter than a sixteenth
    pub fn render_beats(&self) -> f64 {
        if self.duration.is_finite() && self.duration > MIN_CHORD_BEATS {
            self.duration
        } else {
            MIN_CHORD_BEATS
        }
    }

    pub fn is_rest(&self) -> bool {
        self.notes.is_empty()
    }
}

fn default_repeats() -> u32 {
    1
}

fn default_beats_per_bar() -> u32 {
    4
}

/// A named chord progression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub progression: Vec<Chord>,

    #[serde(default = "default_repeats")]
    pub repeats: u32,

    #[serde(default = "default_beats_per_bar")]
    pub beats_per_bar: u32,
}

impl Section {
    /// Create a new empty section with a generated id
    pub fn new(name: impl Into<String>) -> Self {
        Section {
            id: format!("sec-{}", Uuid::new_v4()),
            name: name.into(),
            progression: Vec::new(),
            repeats: 1,
            beats_per_bar: 4,
        }
    }

    pub fn with_progression(mut self, progression: Vec<Chord>) -> Self {
        self.progression = progression;
        self
    }

    pub fn with_repeats(mut self, repeats: u32) -> Self {
        self.repeats = repeats.max(1);
        self
    }

    /// Sum of the chords' nominal durations
    pub fn base_beats(&self) -> f64 {
        self.progression
            .iter()
            .map(|chord| {
                if chord.duration.is_finite() {
                    chord.duration.max(0.0)
                } else {
                    0.0
                }
            })
            .sum()
    }

    /// Sum of the chords' rendered durations (each at least a sixteenth)
    pub fn render_beats(&self) -> f64 {
        self.progression.iter().map(Chord::render_beats).sum()
    }

    /// Base length times the section's own repeat count
    pub fn effective_beats(&self) -> f64 {
        self.base_beats() * f64::from(self.repeats.max(1))
    }

    /// Display name, never empty
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            "Section"
        } else {
            &self.name
        }
    }
}

/// One placement of a section on the song timeline.
///
/// `start_beat` and `length_beats` are derived by normalization and must not
/// be edited directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrangementBlock {
    pub id: String,
    pub source_id: String,

    #[serde(default)]
    pub mode: LaneMode,

    /// Channel override (1-16)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midi_channel: Option<i32>,

    #[serde(default)]
    pub start_beat: f64,

    #[serde(default)]
    pub length_beats: f64,

    #[serde(default)]
    pub label: String,

    /// Overrides the section's repeat count when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeats: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<BlockIntent>,
}

impl ArrangementBlock {
    /// Create an unplaced block for a section
    pub fn for_section(section: &Section, mode: LaneMode) -> Self {
        ArrangementBlock {
            id: format!("arr-{}-{}", section.id, &Uuid::new_v4().simple().to_string()[..6]),
            source_id: section.id.clone(),
            mode,
            midi_channel: None,
            start_beat: 0.0,
            length_beats: 0.0,
            label: section.display_name().to_string(),
            repeats: None,
            intent: Some(BlockIntent::Main),
        }
    }

    pub fn with_repeats(mut self, repeats: u32) -> Self {
        self.repeats = Some(repeats);
        self
    }

    pub fn with_channel(mut self, channel: i32) -> Self {
        self.midi_channel = Some(channel);
        self
    }

    /// Repeat count after applying the section default, at least 1
    pub fn effective_repeats(&self, section: &Section) -> u32 {
        self.repeats
            .filter(|r| *r > 0)
            .unwrap_or(section.repeats)
            .max(1)
    }

    pub fn end_beat(&self) -> f64 {
        self.start_beat + self.length_beats
    }
}
