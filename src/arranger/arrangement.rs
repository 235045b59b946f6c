// Arrangement - Editable song (sections + timeline blocks)
// Every structural edit re-runs normalization before returning

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::flatten::{flatten, ArrangedChordEvent};
use super::model::{ArrangementBlock, Chord, LaneMode, Section};
use super::normalize::{normalize_blocks, total_beats};

/// A consistent snapshot of sections and their placements
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "ArrangementData")]
pub struct Arrangement {
    sections: Vec<Section>,
    blocks: Vec<ArrangementBlock>,
    fallback_mode: LaneMode,
}

/// Arrangement as stored; loading renormalizes it
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArrangementData {
    #[serde(default)]
    sections: Vec<Section>,
    #[serde(default)]
    blocks: Vec<ArrangementBlock>,
    #[serde(default)]
    fallback_mode: LaneMode,
}

impl From<ArrangementData> for Arrangement {
    fn from(data: ArrangementData) -> Self {
        Arrangement::new(data.sections, data.blocks, data.fallback_mode)
    }
}

impl Arrangement {
    /// Build from loaded data, seeding a timeline when no block survives
    pub fn new(sections: Vec<Section>, blocks: Vec<ArrangementBlock>, fallback_mode: LaneMode) -> Self {
        let mut arrangement = Arrangement {
            sections,
            blocks,
            fallback_mode,
        };
        arrangement.renormalize(true);
        arrangement
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn blocks(&self) -> &[ArrangementBlock] {
        &self.blocks
    }

    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }

    pub fn block(&self, id: &str) -> Option<&ArrangementBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn total_beats(&self) -> f64 {
        total_beats(&self.blocks)
    }

    /// Flatten the current state into note events
    pub fn events(&self) -> Vec<ArrangedChordEvent> {
        flatten(&self.sections, &self.blocks)
    }

    fn renormalize(&mut self, seed_if_empty: bool) {
        self.blocks = normalize_blocks(&self.blocks, &self.sections, self.fallback_mode, seed_if_empty);
    }

    fn block_index(&self, id: &str) -> Option<usize> {
        self.blocks.iter().position(|b| b.id == id)
    }

    fn section_index(&self, id: &str) -> Option<usize> {
        self.sections.iter().position(|s| s.id == id)
    }

    // ==================== BLOCK EDITS ====================

    /// Append a block for a section at the end of the timeline
    pub fn add_block(&mut self, section_id: &str) -> Option<String> {
        let section = self.section(section_id)?;
        let block = ArrangementBlock::for_section(section, self.fallback_mode);
        let id = block.id.clone();
        self.blocks.push(block);
        self.renormalize(false);
        Some(id)
    }

    /// Insert a copy of a block right after it
    pub fn duplicate_block(&mut self, block_id: &str) -> Option<String> {
        let index = self.block_index(block_id)?;
        let mut copy = self.blocks[index].clone();
        copy.id = format!("arr-{}-{}", copy.source_id, &Uuid::new_v4().simple().to_string()[..6]);
        let id = copy.id.clone();
        self.blocks.insert(index + 1, copy);
        self.renormalize(false);
        Some(id)
    }

    pub fn delete_block(&mut self, block_id: &str) -> bool {
        let Some(index) = self.block_index(block_id) else {
            return false;
        };
        self.blocks.remove(index);
        self.renormalize(false);
        true
    }

    /// Move a block to a new list position; start beats follow the order
    pub fn move_block(&mut self, from: usize, to: usize) -> bool {
        if from >= self.blocks.len() {
            return false;
        }
        let block = self.blocks.remove(from);
        let to = to.min(self.blocks.len());
        self.blocks.insert(to, block);
        self.renormalize(false);
        true
    }

    pub fn set_block_repeats(&mut self, block_id: &str, repeats: Option<u32>) -> bool {
        let Some(index) = self.block_index(block_id) else {
            return false;
        };
        self.blocks[index].repeats = repeats.map(|r| r.max(1));
        self.renormalize(false);
        true
    }

    pub fn set_block_channel(&mut self, block_id: &str, channel: Option<i32>) -> bool {
        let Some(index) = self.block_index(block_id) else {
            return false;
        };
        self.blocks[index].midi_channel = channel;
        self.renormalize(false);
        true
    }

    /// Give every section without a block one at the end of the timeline
    pub fn append_missing_sections(&mut self) {
        let missing: Vec<ArrangementBlock> = self
            .sections
            .iter()
            .filter(|s| !self.blocks.iter().any(|b| b.source_id == s.id))
            .map(|s| ArrangementBlock::for_section(s, self.fallback_mode))
            .collect();
        self.blocks.extend(missing);
        self.renormalize(false);
    }

    // ==================== SECTION EDITS ====================

    pub fn add_section(&mut self, section: Section) -> String {
        let id = section.id.clone();
        self.sections.push(section);
        self.renormalize(true);
        id
    }

    /// Remove a section; its blocks disappear with it
    pub fn delete_section(&mut self, section_id: &str) -> bool {
        let Some(index) = self.section_index(section_id) else {
            return false;
        };
        self.sections.remove(index);
        self.renormalize(false);
        true
    }

    pub fn rename_section(&mut self, section_id: &str, name: impl Into<String>) -> bool {
        let Some(index) = self.section_index(section_id) else {
            return false;
        };
        self.sections[index].name = name.into();
        self.renormalize(false);
        true
    }

    /// Copy a section (new id, " (copy)" suffix) right after the original
    pub fn duplicate_section(&mut self, section_id: &str) -> Option<String> {
        let index = self.section_index(section_id)?;
        let mut copy = self.sections[index].clone();
        copy.id = format!("sec-{}", Uuid::new_v4());
        copy.name = format!("{} (copy)", copy.display_name());
        let id = copy.id.clone();
        self.sections.insert(index + 1, copy);
        self.renormalize(false);
        Some(id)
    }

    pub fn set_section_repeats(&mut self, section_id: &str, repeats: u32) -> bool {
        let Some(index) = self.section_index(section_id) else {
            return false;
        };
        self.sections[index].repeats = repeats.max(1);
        self.renormalize(false);
        true
    }

    pub fn set_section_progression(&mut self, section_id: &str, progression: Vec<Chord>) -> bool {
        let Some(index) = self.section_index(section_id) else {
            return false;
        };
        self.sections[index].progression = progression;
        self.renormalize(false);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song() -> Arrangement {
        let verse = Section::new("Verse").with_progression(vec![Chord::new(vec![60, 64, 67], 4.0)]);
        let chorus = Section::new("Chorus")
            .with_progression(vec![Chord::new(vec![65, 69, 72], 2.0), Chord::new(vec![67, 71, 74], 2.0)])
            .with_repeats(2);
        Arrangement::new(vec![verse, chorus], Vec::new(), LaneMode::Harmony)
    }

    fn assert_contiguous(arrangement: &Arrangement) {
        let mut cursor = 0.0;
        for block in arrangement.blocks() {
            assert_eq!(block.start_beat, cursor);
            cursor += block.length_beats;
        }
        assert_eq!(arrangement.total_beats(), cursor);
    }

    #[test]
    fn test_new_seeds_timeline() {
        let arrangement = song();
        assert_eq!(arrangement.blocks().len(), 2);
        assert_eq!(arrangement.total_beats(), 12.0);
        assert_contiguous(&arrangement);
    }

    #[test]
    fn test_block_edits_keep_timeline_contiguous() {
        let mut arrangement = song();
        let verse_id = arrangement.sections()[0].id.clone();

        let added = arrangement.add_block(&verse_id).unwrap();
        assert_eq!(arrangement.block(&added).unwrap().start_beat, 12.0);
        assert_contiguous(&arrangement);

        let first = arrangement.blocks()[0].id.clone();
        arrangement.duplicate_block(&first).unwrap();
        assert_eq!(arrangement.blocks().len(), 4);
        assert_eq!(arrangement.blocks()[1].source_id, verse_id);
        assert_contiguous(&arrangement);

        assert!(arrangement.move_block(3, 0));
        assert_contiguous(&arrangement);

        assert!(arrangement.delete_block(&first));
        assert!(!arrangement.delete_block(&first));
        assert_eq!(arrangement.blocks().len(), 3);
        assert_contiguous(&arrangement);
    }

    #[test]
    fn test_section_repeat_change_reflows_blocks() {
        let mut arrangement = song();
        let verse_id = arrangement.sections()[0].id.clone();

        assert!(arrangement.set_section_repeats(&verse_id, 3));

        assert_eq!(arrangement.blocks()[0].length_beats, 12.0);
        assert_eq!(arrangement.blocks()[1].start_beat, 12.0);
        assert_contiguous(&arrangement);
    }

    #[test]
    fn test_delete_section_removes_its_blocks() {
        let mut arrangement = song();
        let verse_id = arrangement.sections()[0].id.clone();

        assert!(arrangement.delete_section(&verse_id));

        assert_eq!(arrangement.blocks().len(), 1);
        assert_eq!(arrangement.blocks()[0].start_beat, 0.0);
        assert_contiguous(&arrangement);
    }

    #[test]
    fn test_duplicate_and_rename_section() {
        let mut arrangement = song();
        let verse_id = arrangement.sections()[0].id.clone();

        let copy_id = arrangement.duplicate_section(&verse_id).unwrap();
        assert_eq!(arrangement.section(&copy_id).unwrap().name, "Verse (copy)");
        // A duplicated section has no block until asked for one
        assert_eq!(arrangement.blocks().len(), 2);

        arrangement.append_missing_sections();
        assert_eq!(arrangement.blocks().len(), 3);
        assert_contiguous(&arrangement);

        assert!(arrangement.rename_section(&verse_id, "Intro"));
        assert_eq!(arrangement.blocks()[0].label, "Intro");
    }

    #[test]
    fn test_progression_change_updates_lengths() {
        let mut arrangement = song();
        let verse_id = arrangement.sections()[0].id.clone();

        arrangement.set_section_progression(&verse_id, vec![Chord::new(vec![60], 1.0); 6]);

        assert_eq!(arrangement.blocks()[0].length_beats, 6.0);
        assert_eq!(arrangement.blocks()[1].start_beat, 6.0);
        assert_eq!(arrangement.events().len(), 6 + 4);
    }

    #[test]
    fn test_block_overrides() {
        let mut arrangement = song();
        let block_id = arrangement.blocks()[1].id.clone();

        assert!(arrangement.set_block_repeats(&block_id, Some(1)));
        assert_eq!(arrangement.blocks()[1].length_beats, 4.0);

        assert!(arrangement.set_block_channel(&block_id, Some(22)));
        assert_eq!(arrangement.blocks()[1].midi_channel, Some(16));
    }

    #[test]
    fn test_deserialize_renormalizes_layout() {
        let json = r#"{
            "sections": [
                { "id": "sec-a", "name": "Verse",
                  "progression": [{ "notes": [60, 64, 67], "duration": 3 }] }
            ],
            "blocks": [
                { "id": "b1", "sourceId": "sec-a", "startBeat": 50, "lengthBeats": 3 },
                { "id": "b2", "sourceId": "gone", "startBeat": 0, "lengthBeats": 9 }
            ]
        }"#;

        let arrangement: Arrangement = serde_json::from_str(json).unwrap();

        assert_eq!(arrangement.blocks().len(), 1);
        assert_eq!(arrangement.blocks()[0].id, "b1");
        assert_eq!(arrangement.blocks()[0].start_beat, 0.0);
        assert_eq!(arrangement.total_beats(), 3.0);
        assert_eq!(arrangement.events()[0].start_beat, 0.0);
    }

    #[test]
    fn test_serialized_arrangement_loads_back() {
        let arrangement = song();
        let json = serde_json::to_string(&arrangement).unwrap();
        let loaded: Arrangement = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, arrangement);
    }
}
