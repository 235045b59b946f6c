// Timing - Tempo and time signature conversions
// Malformed values degrade to 120 BPM and 4/4 instead of failing

use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_TEMPO: f64 = 120.0;
pub const DEFAULT_PPQ: u16 = 480;

/// Replace non-finite or non-positive tempos with the default
pub fn sanitize_tempo(bpm: f64) -> f64 {
    if bpm.is_finite() && bpm > 0.0 {
        bpm
    } else {
        DEFAULT_TEMPO
    }
}

/// Pulses per quarter note usable in a metrical SMF header (1..=0x7FFF)
pub fn sanitize_ppq(ppq: u16) -> u16 {
    if ppq == 0 {
        DEFAULT_PPQ
    } else {
        ppq.min(0x7FFF)
    }
}

/// Microseconds per quarter note, limited to the 24-bit tempo field
pub fn us_per_quarter(bpm: f64) -> u32 {
    let beats_per_second = sanitize_tempo(bpm) / 60.0;
    let us = (1_000_000.0 / beats_per_second).round();
    us.clamp(1.0, 16_777_215.0) as u32
}

/// Milliseconds per beat
pub fn ms_per_beat(bpm: f64) -> f64 {
    60_000.0 / sanitize_tempo(bpm)
}

/// Time signature as stored in the SMF meta event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    /// log2 of the denominator (2 = quarter note)
    pub denominator_pow: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        TimeSignature {
            numerator: 4,
            denominator_pow: 2,
        }
    }
}

impl TimeSignature {
    /// Parse "N/D". Unparseable or zero parts fall back to 4.
    pub fn parse(s: &str) -> Self {
        let (num_raw, den_raw) = match s.split_once('/') {
            Some((n, d)) => (n, d),
            None => (s, ""),
        };

        let numerator = num_raw
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(4)
            .min(255) as u8;
        let denominator = den_raw
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|d| *d > 0)
            .unwrap_or(4);
        let denominator_pow = (denominator as f64).log2().round().clamp(0.0, 255.0) as u8;

        TimeSignature {
            numerator,
            denominator_pow,
        }
    }

    pub fn denominator(&self) -> u32 {
        1u32.checked_shl(u32::from(self.denominator_pow)).unwrap_or(u32::MAX)
    }

    pub fn beats_per_bar(&self) -> u32 {
        u32::from(self.numerator)
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator())
    }
}
