// Timeline Normalization - Gapless, non-overlapping block layout
// Recomputes every derived block field from the live sections

use std::collections::HashMap;

use super::model::{ArrangementBlock, LaneMode, Section};

/// Clamp a raw channel override into 1-16. Zero and absent both mean
/// "no override".
pub fn normalize_channel(channel: Option<i32>) -> Option<i32> {
    match channel {
        Some(0) | None => None,
        Some(ch) => Some(ch.clamp(1, 16)),
    }
}

/// Length of one block placement in beats
pub fn block_length_beats(block: &ArrangementBlock, section: &Section) -> f64 {
    section.base_beats().max(1.0) * f64::from(block.effective_repeats(section))
}

/// Lay blocks out back-to-back from beat 0.
///
/// Blocks whose source section no longer exists are dropped. When nothing
/// survives and `seed_if_empty` is set, one block per section is created in
/// section order so a freshly loaded song always has a timeline. The result
/// depends only on block order and the sections, so normalizing twice is a
/// no-op.
pub fn normalize_blocks(
    blocks: &[ArrangementBlock],
    sections: &[Section],
    fallback_mode: LaneMode,
    seed_if_empty: bool,
) -> Vec<ArrangementBlock> {
    let section_map: HashMap<&str, &Section> =
        sections.iter().map(|s| (s.id.as_str(), s)).collect();

    let mut valid: Vec<ArrangementBlock> = blocks
        .iter()
        .filter(|block| {
            let known = section_map.contains_key(block.source_id.as_str());
            if !known {
                log::debug!(
                    "Dropping block {} referencing missing section {}",
                    block.id,
                    block.source_id
                );
            }
            known
        })
        .cloned()
        .collect();

    if valid.is_empty() && seed_if_empty {
        valid = sections
            .iter()
            .map(|section| ArrangementBlock::for_section(section, fallback_mode))
            .collect();
    }

    let mut cursor = 0.0;
    for block in valid.iter_mut() {
        // Filtered above; seeded blocks come from the same sections
        let Some(section) = section_map.get(block.source_id.as_str()) else {
            continue;
        };

        block.length_beats = block_length_beats(block, section);
        block.midi_channel = normalize_channel(block.midi_channel);
        block.label = section.display_name().to_string();
        block.start_beat = cursor;
        cursor += block.length_beats;
    }

    valid
}

/// Total timeline length of normalized blocks
pub fn total_beats(blocks: &[ArrangementBlock]) -> f64 {
    blocks.iter().map(|b| b.length_beats).sum()
}
