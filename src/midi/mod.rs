// MIDI - Timing, channel messages, and the Standard MIDI File codec
// Shared by file export and realtime playback

pub mod timing;
pub mod message;
pub mod export;

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use serde::Serialize;

// Re-export main types
pub use timing::{ms_per_beat, sanitize_ppq, sanitize_tempo, us_per_quarter, TimeSignature, DEFAULT_PPQ, DEFAULT_TEMPO};
pub use message::{clamp_channel, ChannelMessage, ChannelRouting, CC_ALL_NOTES_OFF};
pub use export::{build_timeline, export_midi, write_vlq, MidiExportOptions, TimedMessage};

/// Summary of a parsed MIDI file
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MidiFileSummary {
    pub tracks: usize,
    pub ppq: Option<u16>,
    pub tempo_us_per_quarter: Option<u32>,
    pub time_signature: Option<String>,
    pub note_ons: usize,
    pub note_offs: usize,
    pub length_ticks: u32,
}

/// Parse MIDI bytes and count what they contain
pub fn inspect_midi(bytes: &[u8]) -> Result<MidiFileSummary, midly::Error> {
    let smf = Smf::parse(bytes)?;

    let ppq = match smf.header.timing {
        Timing::Metrical(ticks) => Some(u16::from(ticks)),
        Timing::Timecode(..) => None,
    };

    let mut summary = MidiFileSummary {
        tracks: smf.tracks.len(),
        ppq,
        tempo_us_per_quarter: None,
        time_signature: None,
        note_ons: 0,
        note_offs: 0,
        length_ticks: 0,
    };

    for track in &smf.tracks {
        let mut tick = 0u32;
        for event in track {
            tick = tick.saturating_add(u32::from(event.delta));
            match &event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(us)) if summary.tempo_us_per_quarter.is_none() => {
                    summary.tempo_us_per_quarter = Some(u32::from(*us));
                }
                TrackEventKind::Meta(MetaMessage::TimeSignature(n, pow, _, _))
                    if summary.time_signature.is_none() =>
                {
                    let signature = TimeSignature {
                        numerator: *n,
                        denominator_pow: *pow,
                    };
                    summary.time_signature = Some(signature.to_string());
                }
                TrackEventKind::Midi { message, .. } => match message {
                    MidiMessage::NoteOn { vel, .. } if u8::from(*vel) > 0 => summary.note_ons += 1,
                    MidiMessage::NoteOn { .. } | MidiMessage::NoteOff { .. } => summary.note_offs += 1,
                    _ => {}
                },
                _ => {}
            }
        }
        summary.length_ticks = summary.length_ticks.max(tick);
    }

    Ok(summary)
}
