// Channel Messages - Note on/off and all-notes-off encoding
// Shared by the file codec and the realtime scheduler via midly live events

use midly::live::LiveEvent;
use midly::MidiMessage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::arranger::{ArrangedChordEvent, LaneMode};

/// Controller number for "all notes off"
pub const CC_ALL_NOTES_OFF: u8 = 123;

/// Clamp a 1-based channel into 1-16
pub fn clamp_channel(channel: i32) -> u8 {
    channel.clamp(1, 16) as u8
}

/// A three-byte channel voice message, channels 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    AllNotesOff { channel: u8 },
}

impl ChannelMessage {
    pub fn channel(&self) -> u8 {
        match *self {
            ChannelMessage::NoteOn { channel, .. }
            | ChannelMessage::NoteOff { channel, .. }
            | ChannelMessage::AllNotesOff { channel } => channel,
        }
    }

    /// Status byte, e.g. 0x90 for a note-on on channel 1
    pub fn status(&self) -> u8 {
        let nibble = clamp_channel(i32::from(self.channel())) - 1;
        match self {
            ChannelMessage::NoteOff { .. } => 0x80 | nibble,
            ChannelMessage::NoteOn { .. } => 0x90 | nibble,
            ChannelMessage::AllNotesOff { .. } => 0xB0 | nibble,
        }
    }

    fn to_live_event(self) -> LiveEvent<'static> {
        let channel = (clamp_channel(i32::from(self.channel())) - 1).into();
        let message = match self {
            ChannelMessage::NoteOn { note, velocity, .. } => MidiMessage::NoteOn {
                key: note.min(127).into(),
                vel: velocity.min(127).into(),
            },
            ChannelMessage::NoteOff { note, .. } => MidiMessage::NoteOff {
                key: note.min(127).into(),
                vel: 0.into(),
            },
            ChannelMessage::AllNotesOff { .. } => MidiMessage::Controller {
                controller: CC_ALL_NOTES_OFF.into(),
                value: 0.into(),
            },
        };
        LiveEvent::Midi { channel, message }
    }

    /// Raw bytes `[status, data1, data2]` as sent on the wire
    pub fn to_bytes(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3);
        if let Err(e) = self.to_live_event().write_std(&mut out) {
            // Writing into a Vec cannot fail short of allocation failure
            log::error!("Failed to encode MIDI message {:?}: {}", self, e);
        }
        out
    }

    /// Decode a raw channel message; anything else is `None`
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match LiveEvent::parse(bytes).ok()? {
            LiveEvent::Midi { channel, message } => {
                let channel = u8::from(channel) + 1;
                match message {
                    MidiMessage::NoteOn { key, vel } => Some(ChannelMessage::NoteOn {
                        channel,
                        note: key.into(),
                        velocity: vel.into(),
                    }),
                    MidiMessage::NoteOff { key, .. } => Some(ChannelMessage::NoteOff {
                        channel,
                        note: key.into(),
                    }),
                    MidiMessage::Controller { controller, .. }
                        if u8::from(controller) == CC_ALL_NOTES_OFF =>
                    {
                        Some(ChannelMessage::AllNotesOff { channel })
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// Channel selection: event override, then lane map, then default, then 1
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRouting {
    #[serde(default)]
    pub default_channel: Option<u8>,

    #[serde(default)]
    pub mode_channels: HashMap<LaneMode, u8>,
}

impl ChannelRouting {
    pub fn new(default_channel: Option<u8>) -> Self {
        ChannelRouting {
            default_channel,
            mode_channels: HashMap::new(),
        }
    }

    pub fn with_mode_channel(mut self, mode: LaneMode, channel: u8) -> Self {
        self.mode_channels.insert(mode, channel);
        self
    }

    /// Resolve the 1-based output channel for an event
    pub fn resolve(&self, event: &ArrangedChordEvent) -> u8 {
        let channel = event
            .midi_channel
            .or_else(|| self.mode_channels.get(&event.mode).copied())
            .or(self.default_channel)
            .unwrap_or(1);
        clamp_channel(i32::from(channel))
    }
}
