// Operator Commands
// Song-level operations behind a simple success/failure result
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::adapters::{self, OutputAdapter};
use crate::arranger::{
    to_osc_progression, ArrangedChordEvent, Arrangement, ArrangementBlock, ArrangementSnapshot,
    LaneMode, OscProgressionChord, Section,
};
use crate::config::{RenderConfig, SongDocument};
use crate::midi;
use crate::playback::{PlaybackHandle, Scheduler};
use crate::storage;
use crate::theory::{self, DiatonicChordParams, VoicingParams};

#[derive(Debug, Serialize)]
pub struct CommandError {
    message: String,
}

impl<E: std::fmt::Display> From<E> for CommandError {
    fn from(error: E) -> Self {
        CommandError {
            message: error.to_string(),
        }
    }
}

impl CommandError {
    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

// ==================== ARRANGEMENT COMMANDS ====================

/// Sections and placements as handed over by the editor
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrangementInput {
    pub sections: Vec<Section>,
    #[serde(default)]
    pub blocks: Vec<ArrangementBlock>,
    #[serde(default)]
    pub config: RenderConfig,
    #[serde(default)]
    pub fallback_mode: LaneMode,
}

impl ArrangementInput {
    fn arrangement(&self) -> Arrangement {
        Arrangement::new(self.sections.clone(), self.blocks.clone(), self.fallback_mode)
    }

    /// Flattened events, or an error when nothing would sound
    fn audible_events(&self) -> CommandResult<Vec<ArrangedChordEvent>> {
        let events = self.arrangement().events();
        if events.iter().all(ArrangedChordEvent::is_rest) {
            return Err(CommandError {
                message: "Nothing to render".to_string(),
            });
        }
        Ok(events)
    }
}

impl From<SongDocument> for ArrangementInput {
    fn from(song: SongDocument) -> Self {
        ArrangementInput {
            sections: song.sections,
            blocks: song.blocks,
            config: song.config,
            fallback_mode: song.fallback_mode,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrangementSummary {
    pub blocks: Vec<ArrangementBlock>,
    pub total_beats: f64,
    pub event_count: usize,
}

/// Normalize blocks and report the resulting timeline
pub fn normalize_arrangement_command(input: &ArrangementInput) -> CommandResult<ArrangementSummary> {
    let arrangement = input.arrangement();
    Ok(ArrangementSummary {
        event_count: arrangement.events().len(),
        total_beats: arrangement.total_beats(),
        blocks: arrangement.blocks().to_vec(),
    })
}

/// Flatten an arrangement into timed chord events
pub fn flatten_events_command(input: &ArrangementInput) -> CommandResult<Vec<ArrangedChordEvent>> {
    Ok(input.arrangement().events())
}

// ==================== EXPORT COMMANDS ====================

/// Render an arrangement to Standard MIDI File bytes
pub fn export_midi_command(input: &ArrangementInput) -> CommandResult<Vec<u8>> {
    let events = input.audible_events()?;
    let bytes = midi::export_midi(&events, &input.config.export_options());
    log::info!("Exported {} events to {} MIDI bytes", events.len(), bytes.len());
    Ok(bytes)
}

/// Self-describing JSON snapshot of the arrangement
pub fn snapshot_command(input: &ArrangementInput) -> CommandResult<ArrangementSnapshot> {
    let arrangement = input.arrangement();
    let config = input.config.sanitized();
    Ok(ArrangementSnapshot::capture(
        arrangement.sections(),
        arrangement.blocks(),
        config.tempo,
        &config.time_signature,
    ))
}

/// Simplified slot list for the OSC bridge
pub fn osc_progression_command(input: &ArrangementInput) -> CommandResult<Vec<OscProgressionChord>> {
    let events = input.audible_events()?;
    Ok(to_osc_progression(&events))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedArtifact {
    pub path: String,
    pub sha256: String,
    pub size: usize,
}

/// Write exported bytes to disk
pub fn save_artifact_command(dir: &Path, filename: &str, data: &[u8]) -> CommandResult<SavedArtifact> {
    let (path, sha256) = storage::write_artifact(dir, filename, data).map_err(|e| CommandError {
        message: format!("Failed to save {}: {}", filename, e),
    })?;

    Ok(SavedArtifact {
        path: path.to_string_lossy().to_string(),
        sha256,
        size: data.len(),
    })
}

/// List all output destinations
pub fn list_output_adapters() -> Vec<&'static OutputAdapter> {
    adapters::OUTPUT_ADAPTERS.iter().collect()
}

// ==================== PLAYBACK COMMANDS ====================

/// Start realtime playback, replacing any running session
pub fn play_command(scheduler: &Scheduler, input: &ArrangementInput) -> CommandResult<PlaybackHandle> {
    let events = input.audible_events()?;
    let handle = scheduler.start(&events, &input.config.playback_options())?;
    Ok(handle)
}

/// Stop realtime playback. Returns whether a session was running.
pub fn stop_command(scheduler: &Scheduler) -> CommandResult<bool> {
    Ok(scheduler.stop())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestNoteInput {
    pub channel: i32,
    pub note: i32,
    pub velocity: i32,
    pub duration_ms: u64,
}

impl Default for TestNoteInput {
    fn default() -> Self {
        TestNoteInput {
            channel: 1,
            note: 60,
            velocity: 100,
            duration_ms: 250,
        }
    }
}

/// Sound one note to check the output
pub fn send_test_note_command(scheduler: &Scheduler, input: &TestNoteInput) -> CommandResult<PlaybackHandle> {
    let handle =
        scheduler.send_test_note(input.channel, input.note, input.velocity, input.duration_ms)?;
    Ok(handle)
}

// ==================== THEORY COMMANDS ====================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedChord {
    pub name: String,
    pub notes: Vec<i32>,
    pub voicing: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeral: Option<String>,
}

fn check_midi_range(notes: &[i32]) -> CommandResult<()> {
    match notes.iter().find(|n| !(0..=127).contains(*n)) {
        Some(note) => Err(CommandError {
            message: format!("Note {} is outside the MIDI range 0-127", note),
        }),
        None => Ok(()),
    }
}

/// Voice a chord from root and quality
pub fn generate_chord_command(params: &VoicingParams) -> CommandResult<GeneratedChord> {
    let notes = theory::generate_chord(params);
    check_midi_range(&notes)?;

    Ok(GeneratedChord {
        name: theory::chord_name(params.root, params.quality),
        notes,
        voicing: theory::voicing_description(params.inversion, params.drop),
        numeral: None,
    })
}

/// Voice the chord on a scale degree of a key
pub fn generate_diatonic_chord_command(params: &DiatonicChordParams) -> CommandResult<GeneratedChord> {
    let notes = theory::generate_diatonic_chord(params);
    check_midi_range(&notes)?;

    let root = theory::scale_degree_root(params.key_root, params.degree, params.mode);
    let mut quality = theory::diatonic_quality(params.degree, params.mode);
    if let Some(extension) = params.extension {
        quality = quality.extend(extension);
    }

    Ok(GeneratedChord {
        name: theory::chord_name(root, quality),
        notes,
        voicing: theory::voicing_description(params.inversion, params.drop),
        numeral: Some(theory::roman_numeral(params.degree, params.mode)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arranger::Chord;
    use crate::playback::{PlaybackError, RecordingSink};
    use crate::theory::{ChordQuality, Mode};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn verse_input() -> ArrangementInput {
        let mut section = Section::new("Verse")
            .with_progression(vec![Chord::new(vec![60, 64, 67], 4.0)])
            .with_repeats(2);
        section.id = "verse".to_string();
        ArrangementInput {
            sections: vec![section],
            blocks: Vec::new(),
            config: RenderConfig::default(),
            fallback_mode: LaneMode::Harmony,
        }
    }

    #[test]
    fn test_normalize_seeds_blocks() {
        let summary = normalize_arrangement_command(&verse_input()).unwrap();
        assert_eq!(summary.blocks.len(), 1);
        assert_eq!(summary.total_beats, 8.0);
        assert_eq!(summary.event_count, 2);
    }

    #[test]
    fn test_export_midi_command() {
        let bytes = export_midi_command(&verse_input()).unwrap();
        assert_eq!(&bytes[0..4], b"MThd");

        let summary = midi::inspect_midi(&bytes).unwrap();
        assert_eq!(summary.note_ons, 6);
    }

    #[test]
    fn test_nothing_to_render() {
        let mut input = verse_input();
        input.sections[0].progression = vec![Chord::rest(4.0)];

        let error = export_midi_command(&input).unwrap_err();
        assert_eq!(error.message(), "Nothing to render");
        assert!(osc_progression_command(&input).is_err());

        input.sections.clear();
        assert!(export_midi_command(&input).is_err());
    }

    #[test]
    fn test_snapshot_and_osc() {
        let snapshot = snapshot_command(&verse_input()).unwrap();
        assert_eq!(snapshot.events.len(), 2);
        assert_eq!(snapshot.tempo, 120.0);

        let progression = osc_progression_command(&verse_input()).unwrap();
        assert_eq!(progression.len(), 2);
        assert_eq!(progression[1].notes, vec![60, 64, 67]);
    }

    #[test]
    fn test_save_artifact_command() {
        let temp_dir = TempDir::new().unwrap();
        let saved = save_artifact_command(temp_dir.path(), "verse.mid", b"MThd").unwrap();
        assert_eq!(saved.size, 4);
        assert!(saved.path.ends_with("verse.mid"));

        let error = save_artifact_command(temp_dir.path(), "../x.mid", b"").unwrap_err();
        assert!(error.message().starts_with("Failed to save"));
    }

    #[test]
    fn test_play_requires_runtime() {
        let scheduler = Scheduler::new(Arc::new(RecordingSink::new()));
        let error = play_command(&scheduler, &verse_input()).unwrap_err();
        assert_eq!(error.message(), PlaybackError::NoRuntime.to_string());
        assert!(!stop_command(&scheduler).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_and_stop_commands() {
        let sink = Arc::new(RecordingSink::new());
        let scheduler = Scheduler::new(sink.clone());

        let handle = play_command(&scheduler, &verse_input()).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(stop_command(&scheduler).unwrap());
        assert!(handle.is_finished());
        assert!(!sink.sent().is_empty());
    }

    #[test]
    fn test_generate_chord_command() {
        let chord = generate_chord_command(&VoicingParams::new(60, ChordQuality::Major7)).unwrap();
        assert_eq!(chord.name, "CMaj7");
        assert_eq!(chord.notes, vec![60, 64, 67, 71]);

        assert!(generate_chord_command(&VoicingParams::new(126, ChordQuality::Major)).is_err());
    }

    #[test]
    fn test_generate_diatonic_chord_command() {
        let params = DiatonicChordParams {
            key_root: 60,
            degree: 2,
            mode: Mode::Ionian,
            extension: None,
            inversion: 0,
            drop: Default::default(),
            range: None,
        };
        let chord = generate_diatonic_chord_command(&params).unwrap();
        assert_eq!(chord.name, "Dmin");
        assert_eq!(chord.notes, vec![62, 65, 69]);
        assert_eq!(chord.numeral.as_deref(), Some("ii"));
    }

    #[test]
    fn test_list_output_adapters() {
        let adapters = list_output_adapters();
        assert_eq!(adapters.len(), 4);
        assert!(adapters.iter().any(|a| a.id == "midi-out"));
    }
}
