// Render Configuration - Tempo, meter, resolution, and channel routing
// Read from song JSON; malformed values fall back to defaults when sanitized

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::arranger::{Arrangement, ArrangementBlock, LaneMode, Section};
use crate::midi::{
    clamp_channel, sanitize_ppq, sanitize_tempo, ChannelRouting, MidiExportOptions, TimeSignature,
    DEFAULT_PPQ, DEFAULT_TEMPO,
};
use crate::playback::PlaybackOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid song JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Render settings shared by file export and playback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderConfig {
    /// Beats per minute
    pub tempo: f64,

    /// "N/D"
    pub time_signature: String,

    /// Pulses per quarter note
    pub ppq: u16,

    /// Channel for events with no override or lane mapping (1-16)
    pub default_channel: u8,

    /// Per-lane channels; missing lanes use the default channel
    pub mode_channels: HashMap<LaneMode, u8>,

    /// Write routed channels into exported files instead of channel 1
    pub route_file_channels: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            tempo: DEFAULT_TEMPO,
            time_signature: "4/4".to_string(),
            ppq: DEFAULT_PPQ,
            default_channel: 1,
            mode_channels: HashMap::new(),
            route_file_channels: false,
        }
    }
}

impl RenderConfig {
    /// Copy with every value in its legal range
    pub fn sanitized(&self) -> Self {
        RenderConfig {
            tempo: sanitize_tempo(self.tempo),
            time_signature: self.time_signature().to_string(),
            ppq: sanitize_ppq(self.ppq),
            default_channel: clamp_channel(i32::from(self.default_channel)),
            mode_channels: self
                .mode_channels
                .iter()
                .map(|(mode, channel)| (*mode, clamp_channel(i32::from(*channel))))
                .collect(),
            route_file_channels: self.route_file_channels,
        }
    }

    pub fn time_signature(&self) -> TimeSignature {
        TimeSignature::parse(&self.time_signature)
    }

    pub fn routing(&self) -> ChannelRouting {
        let config = self.sanitized();
        ChannelRouting {
            default_channel: Some(config.default_channel),
            mode_channels: config.mode_channels,
        }
    }

    pub fn export_options(&self) -> MidiExportOptions {
        let config = self.sanitized();
        MidiExportOptions {
            ppq: config.ppq,
            tempo: config.tempo,
            time_signature: config.time_signature.clone(),
            routing: if config.route_file_channels {
                Some(self.routing())
            } else {
                None
            },
        }
    }

    pub fn playback_options(&self) -> PlaybackOptions {
        PlaybackOptions {
            tempo: sanitize_tempo(self.tempo),
            routing: self.routing(),
            on_signal: None,
        }
    }
}

/// A complete song as stored on disk: sections, placements, settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongDocument {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub sections: Vec<Section>,

    #[serde(default)]
    pub blocks: Vec<ArrangementBlock>,

    #[serde(default)]
    pub config: RenderConfig,

    /// Lane for blocks seeded when `blocks` is empty
    #[serde(default)]
    pub fallback_mode: LaneMode,
}

impl SongDocument {
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> ConfigResult<Self> {
        let json = fs::read_to_string(path)?;
        let document = Self::from_json(&json)?;
        log::info!(
            "Loaded song {:?}: {} sections, {} blocks",
            document.name,
            document.sections.len(),
            document.blocks.len()
        );
        Ok(document)
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Normalized arrangement; blocks are seeded from sections when empty
    pub fn arrangement(&self) -> Arrangement {
        Arrangement::new(self.sections.clone(), self.blocks.clone(), self.fallback_mode)
    }
}
