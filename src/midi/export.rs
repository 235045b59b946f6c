// MIDI Export - Flattened chord events to a format-0 Standard MIDI File
// Single track: tempo + time signature at tick 0, note pairs, end of track

use serde::{Deserialize, Serialize};

use super::message::{ChannelMessage, ChannelRouting};
use super::timing::{sanitize_ppq, sanitize_tempo, us_per_quarter, TimeSignature, DEFAULT_PPQ, DEFAULT_TEMPO};
use crate::arranger::ArrangedChordEvent;

/// MIDI export options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MidiExportOptions {
    /// Pulses per quarter note (PPQ) - typically 480 or 960
    pub ppq: u16,

    /// Beats per minute
    pub tempo: f64,

    /// "N/D" time signature
    pub time_signature: String,

    /// Write each event on its routed channel instead of channel 1
    #[serde(default)]
    pub routing: Option<ChannelRouting>,
}

impl Default for MidiExportOptions {
    fn default() -> Self {
        MidiExportOptions {
            ppq: DEFAULT_PPQ,
            tempo: DEFAULT_TEMPO,
            time_signature: "4/4".to_string(),
            routing: None,
        }
    }
}

/// A channel message at an absolute tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedMessage {
    pub tick: u32,
    pub message: ChannelMessage,
}

/// Append a MIDI variable-length quantity (7 bits per byte, MSB first)
pub fn write_vlq(out: &mut Vec<u8>, value: u32) {
    let value = value.min(0x0FFF_FFFF);
    let mut groups = [0u8; 4];
    let mut count = 0;
    let mut rest = value;
    loop {
        groups[count] = (rest & 0x7F) as u8;
        count += 1;
        rest >>= 7;
        if rest == 0 {
            break;
        }
    }
    for i in (0..count).rev() {
        let continuation = if i > 0 { 0x80 } else { 0x00 };
        out.push(groups[i] | continuation);
    }
}

fn beats_to_ticks(beats: f64, ppq: u16) -> u32 {
    let ticks = (beats * f64::from(ppq)).round();
    if ticks.is_finite() {
        ticks.clamp(0.0, f64::from(u32::MAX)) as u32
    } else {
        0
    }
}

/// Note-on/note-off pairs for every note, sorted by (tick, status) so a
/// note-off sorts before a note-on sharing its tick
pub fn build_timeline(
    events: &[ArrangedChordEvent],
    ppq: u16,
    routing: Option<&ChannelRouting>,
) -> Vec<TimedMessage> {
    let mut timeline = Vec::new();

    for event in events {
        let start_tick = beats_to_ticks(event.start_beat, ppq);
        let gate_scale = (f64::from(event.gate_percent) / 100.0).max(0.01);
        let duration_ticks = beats_to_ticks(event.duration_beats * gate_scale, ppq).max(1);
        let end_tick = start_tick.saturating_add(duration_ticks);
        let channel = routing.map(|r| r.resolve(event)).unwrap_or(1);

        for &note in &event.notes {
            timeline.push(TimedMessage {
                tick: start_tick,
                message: ChannelMessage::NoteOn {
                    channel,
                    note: note.min(127),
                    velocity: event.velocity.min(127),
                },
            });
            timeline.push(TimedMessage {
                tick: end_tick,
                message: ChannelMessage::NoteOff {
                    channel,
                    note: note.min(127),
                },
            });
        }
    }

    timeline.sort_by_key(|m| (m.tick, m.message.status()));
    timeline
}

fn push_meta(track: &mut Vec<u8>, delta: u32, meta_type: u8, data: &[u8]) {
    write_vlq(track, delta);
    track.push(0xFF);
    track.push(meta_type);
    write_vlq(track, data.len() as u32);
    track.extend_from_slice(data);
}

/// Export flattened events to MIDI file bytes.
///
/// Always returns a structurally valid file; an empty event list produces
/// the tempo and time signature followed by end of track.
pub fn export_midi(events: &[ArrangedChordEvent], options: &MidiExportOptions) -> Vec<u8> {
    let ppq = sanitize_ppq(options.ppq);
    let tempo = sanitize_tempo(options.tempo);
    let us = us_per_quarter(tempo);
    let signature = TimeSignature::parse(&options.time_signature);

    let mut track = Vec::new();

    push_meta(&mut track, 0, 0x51, &us.to_be_bytes()[1..]);
    push_meta(
        &mut track,
        0,
        0x58,
        &[signature.numerator, signature.denominator_pow, 24, 8],
    );

    let mut last_tick = 0u32;
    for timed in build_timeline(events, ppq, options.routing.as_ref()) {
        write_vlq(&mut track, timed.tick.saturating_sub(last_tick));
        track.extend_from_slice(&timed.message.to_bytes());
        last_tick = timed.tick;
    }

    push_meta(&mut track, 0, 0x2F, &[]);

    let mut bytes = Vec::with_capacity(22 + track.len());
    bytes.extend_from_slice(b"MThd");
    bytes.extend_from_slice(&6u32.to_be_bytes());
    bytes.extend_from_slice(&0u16.to_be_bytes()); // format 0
    bytes.extend_from_slice(&1u16.to_be_bytes()); // one track
    bytes.extend_from_slice(&ppq.to_be_bytes());

    bytes.extend_from_slice(b"MTrk");
    bytes.extend_from_slice(&(track.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&track);

    log::debug!(
        "Exported {} events to {} MIDI bytes at {} BPM, {} PPQ",
        events.len(),
        bytes.len(),
        tempo,
        ppq
    );

    bytes
}
