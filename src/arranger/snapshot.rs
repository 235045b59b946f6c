// Snapshot & OSC View - Side-channel shapes of a flattened arrangement
// JSON export snapshot and the simplified slot list sent to the DAW bridge

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::flatten::{events_total_beats, flatten, ArrangedChordEvent};
use super::model::{ArrangementBlock, Section};

/// Complete, self-describing export of an arrangement
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrangementSnapshot {
    pub exported_at: DateTime<Utc>,
    pub tempo: f64,
    pub time_signature: String,
    pub total_beats: f64,
    pub block_count: usize,
    pub sections: Vec<Section>,
    pub blocks: Vec<ArrangementBlock>,
    pub events: Vec<ArrangedChordEvent>,
}

impl ArrangementSnapshot {
    /// Flatten and bundle an arrangement with its tempo settings
    pub fn capture(
        sections: &[Section],
        blocks: &[ArrangementBlock],
        tempo: f64,
        time_signature: &str,
    ) -> Self {
        let events = flatten(sections, blocks);

        ArrangementSnapshot {
            exported_at: Utc::now(),
            tempo,
            time_signature: time_signature.to_string(),
            total_beats: events_total_beats(&events),
            block_count: blocks.len(),
            sections: sections.to_vec(),
            blocks: blocks.to_vec(),
            events,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// One slot of the DAW bridge progression; empty `notes` is silence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscProgressionChord {
    pub notes: Vec<u8>,
    pub duration: f64,
}

/// Simplified sequential view: pitches + duration per slot, with gaps
/// between events filled by empty placeholder slots
pub fn to_osc_progression(events: &[ArrangedChordEvent]) -> Vec<OscProgressionChord> {
    let mut sorted: Vec<&ArrangedChordEvent> = events.iter().collect();
    sorted.sort_by(|a, b| {
        a.start_beat
            .partial_cmp(&b.start_beat)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut progression = Vec::with_capacity(sorted.len());
    let mut cursor = 0.0;

    for event in sorted {
        if event.start_beat > cursor {
            progression.push(OscProgressionChord {
                notes: Vec::new(),
                duration: event.start_beat - cursor,
            });
            cursor = event.start_beat;
        }

        progression.push(OscProgressionChord {
            notes: event.notes.clone(),
            duration: event.duration_beats,
        });
        cursor += event.duration_beats;
    }

    progression
}
