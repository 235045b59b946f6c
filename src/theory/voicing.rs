// Voicing - Inversions, drop voicings, and range constraints
// Pure pitch-set transforms; every output is sorted ascending

use serde::{Deserialize, Serialize};

/// Drop voicing type, encoded in song files as 0, 2, 3 or 23
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum DropVoicing {
    /// Close voicing
    #[default]
    None,

    /// Second-highest note down an octave
    Drop2,

    /// Third-highest note down an octave
    Drop3,

    /// Second-highest and fourth-highest notes down an octave
    Drop24,
}

impl DropVoicing {
    /// Decode a drop code; unknown codes are treated as close voicing
    pub fn from_code(code: u8) -> Self {
        match code {
            2 => DropVoicing::Drop2,
            3 => DropVoicing::Drop3,
            23 => DropVoicing::Drop24,
            _ => DropVoicing::None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            DropVoicing::None => 0,
            DropVoicing::Drop2 => 2,
            DropVoicing::Drop3 => 3,
            DropVoicing::Drop24 => 23,
        }
    }
}

impl From<u8> for DropVoicing {
    fn from(code: u8) -> Self {
        DropVoicing::from_code(code)
    }
}

impl From<DropVoicing> for u8 {
    fn from(drop: DropVoicing) -> Self {
        drop.code()
    }
}

fn sorted(notes: &[i32]) -> Vec<i32> {
    let mut out = notes.to_vec();
    out.sort_unstable();
    out
}

/// Raise the lowest `inversion` notes by an octave
pub fn apply_inversion(notes: &[i32], inversion: usize) -> Vec<i32> {
    if notes.is_empty() || inversion == 0 {
        return notes.to_vec();
    }

    let mut inverted = sorted(notes);
    let count = inversion.min(inverted.len());
    for note in inverted.iter_mut().take(count) {
        *note += 12;
    }
    inverted.sort_unstable();
    inverted
}

/// Lower upper chord tones by an octave. Chords with fewer than four notes
/// are returned unchanged.
///
/// For a four-note chord, drop-2-and-4 lowers index 0 of the sorted chord,
/// which is the lowest note.
pub fn apply_drop_voicing(notes: &[i32], drop: DropVoicing) -> Vec<i32> {
    if notes.len() < 4 || drop == DropVoicing::None {
        return notes.to_vec();
    }

    let mut voiced = sorted(notes);
    let len = voiced.len();
    match drop {
        DropVoicing::None => {}
        DropVoicing::Drop2 => voiced[len - 2] -= 12,
        DropVoicing::Drop3 => voiced[len - 3] -= 12,
        DropVoicing::Drop24 => {
            voiced[len - 2] -= 12;
            voiced[len - 4] -= 12;
        }
    }
    voiced.sort_unstable();
    voiced
}

/// Inversion first, then drop voicing on the inverted pitch order
pub fn apply_voicing(base: &[i32], inversion: usize, drop: DropVoicing) -> Vec<i32> {
    let inverted = apply_inversion(base, inversion);
    apply_drop_voicing(&inverted, drop)
}

/// Octave-shift each note into `[min, max]`: raise while below `min`, then
/// lower while above `max`.
///
/// A window narrower than an octave can leave a note below `min`; the upper
/// bound always holds.
pub fn constrain_to_range(notes: &[i32], min: i32, max: i32) -> Vec<i32> {
    notes
        .iter()
        .map(|&note| {
            let mut n = note;
            while n < min {
                n += 12;
            }
            while n > max {
                n -= 12;
            }
            n
        })
        .collect()
}

/// Human-readable voicing name, e.g. "1st Inversion Drop 2"
pub fn voicing_description(inversion: usize, drop: DropVoicing) -> String {
    let inversion_name = match inversion.min(3) {
        0 => "Root Position",
        1 => "1st Inversion",
        2 => "2nd Inversion",
        _ => "3rd Inversion",
    };

    match drop {
        DropVoicing::None => inversion_name.to_string(),
        DropVoicing::Drop2 => format!("{} Drop 2", inversion_name),
        DropVoicing::Drop3 => format!("{} Drop 3", inversion_name),
        DropVoicing::Drop24 => format!("{} Drop 2&4", inversion_name),
    }
}
