// Event Flattening - Expand sections + placed blocks into chord events
// Pure function of its inputs; consumed by the file codec and the scheduler

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::model::{
    ArrangementBlock, LaneMode, Section, DEFAULT_GATE_PERCENT, DEFAULT_VELOCITY,
};

/// One chord occurrence on the absolute song timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrangedChordEvent {
    pub block_id: String,
    pub section_id: String,
    pub section_name: String,
    pub mode: LaneMode,

    /// Block-level channel override (1-16)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midi_channel: Option<u8>,

    /// Absolute start in beats
    pub start_beat: f64,

    pub duration_beats: f64,

    /// MIDI pitches (0-127); empty for a rest
    pub notes: Vec<u8>,

    /// MIDI velocity (0-127)
    pub velocity: u8,

    /// Sounding length as percent of the slot (1-200)
    pub gate_percent: u16,

    /// Stagger between successive notes, milliseconds
    pub strum_ms: f64,

    /// Position within the source section's progression
    pub chord_index: usize,
}

impl ArrangedChordEvent {
    pub fn end_beat(&self) -> f64 {
        self.start_beat + self.duration_beats
    }

    /// Beats the notes actually sound for, after the gate is applied
    pub fn gated_beats(&self) -> f64 {
        self.duration_beats * f64::from(self.gate_percent) / 100.0
    }

    pub fn is_rest(&self) -> bool {
        self.notes.is_empty()
    }
}

/// Round and clamp any value into the 7-bit MIDI data range
pub fn clamp_midi(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 127.0) as u8
}

fn clamp_gate(value: i32) -> u16 {
    value.clamp(1, 200) as u16
}

fn clamp_strum(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

fn sort_by_start(events: &mut [ArrangedChordEvent]) {
    // Stable, so equal starts keep block order
    events.sort_by(|a, b| {
        a.start_beat
            .partial_cmp(&b.start_beat)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Flatten normalized blocks into a time-ordered event list.
///
/// Each block repeats its section `effective_repeats` times; within a
/// repeat the chord cursor advances by each chord's rendered duration.
/// Per-step velocity, gate and strum are looked up at the chord's local beat
/// index. Rests are kept as events with no notes.
pub fn flatten(sections: &[Section], blocks: &[ArrangementBlock]) -> Vec<ArrangedChordEvent> {
    let section_map: HashMap<&str, &Section> =
        sections.iter().map(|s| (s.id.as_str(), s)).collect();

    let mut sorted_blocks: Vec<&ArrangementBlock> = blocks.iter().collect();
    sorted_blocks.sort_by(|a, b| {
        a.start_beat
            .partial_cmp(&b.start_beat)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut events = Vec::new();

    for block in sorted_blocks {
        let Some(section) = section_map.get(block.source_id.as_str()) else {
            log::debug!("Skipping block {}: section {} not found", block.id, block.source_id);
            continue;
        };

        let repeats = block.effective_repeats(section);
        let section_length = section.render_beats();
        let midi_channel = block.midi_channel.map(|ch| ch.clamp(1, 16) as u8);

        for repeat_index in 0..repeats {
            let repeat_offset = f64::from(repeat_index) * section_length;
            let mut chord_cursor: f64 = 0.0;

            for (chord_index, chord) in section.progression.iter().enumerate() {
                let duration_beats = chord.render_beats();
                let step = chord_cursor.floor().max(0.0) as usize;
                let metadata = chord.metadata.as_ref();

                let velocity = metadata
                    .and_then(|m| m.velocity_at(step))
                    .unwrap_or(DEFAULT_VELOCITY);
                let gate = metadata
                    .and_then(|m| m.gate_at(step))
                    .unwrap_or(DEFAULT_GATE_PERCENT);
                let strum = metadata.and_then(|m| m.strum_at(step)).unwrap_or(0.0);

                events.push(ArrangedChordEvent {
                    block_id: block.id.clone(),
                    section_id: section.id.clone(),
                    section_name: section.display_name().to_string(),
                    mode: block.mode,
                    midi_channel,
                    start_beat: block.start_beat + repeat_offset + chord_cursor,
                    duration_beats,
                    notes: chord.notes.iter().map(|&n| clamp_midi(f64::from(n))).collect(),
                    velocity: clamp_midi(f64::from(velocity)),
                    gate_percent: clamp_gate(gate),
                    strum_ms: clamp_strum(strum),
                    chord_index,
                });

                chord_cursor += duration_beats;
            }
        }
    }

    sort_by_start(&mut events);
    events
}

/// End of the last sounding slot, in beats
pub fn events_total_beats(events: &[ArrangedChordEvent]) -> f64 {
    events
        .iter()
        .map(ArrangedChordEvent::end_beat)
        .fold(0.0, f64::max)
}
