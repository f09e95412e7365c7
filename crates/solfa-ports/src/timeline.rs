use crate::types::Beat;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TempoChange {
    pub offset: Beat,
    /// Quarter notes per minute at the written tempo.
    pub bpm: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeSignature {
    /// Length of one written beat in quarter notes.
    pub fn beat_unit(self) -> Beat {
        4.0 / self.denominator as f64
    }

    pub fn measure_beats(self) -> Beat {
        self.numerator as f64 * self.beat_unit()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeSignatureChange {
    pub offset: Beat,
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeSignatureChange {
    pub fn signature(&self) -> TimeSignature {
        TimeSignature {
            numerator: self.numerator,
            denominator: self.denominator,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasureInfo {
    /// 1-based.
    pub measure: u32,
    pub start_beat: Beat,
    pub duration_beats: Beat,
}

impl MeasureInfo {
    pub fn end_beat(&self) -> Beat {
        self.start_beat + self.duration_beats
    }
}

/// A note of the reference part, in beats.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceNote {
    pub offset: Beat,
    pub duration: Beat,
    /// MIDI note number.
    pub pitch: u8,
}

/// Inclusive, 1-based measure selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureRange {
    pub start: u32,
    pub end: u32,
}

/// Supplies the timing tables of the currently loaded score/part.
pub trait ScoreTimelinePort: Send + Sync {
    fn tempo_timeline(&self) -> Vec<TempoChange>;
    fn time_signature_timeline(&self) -> Vec<TimeSignatureChange>;
    fn measures(&self) -> Vec<MeasureInfo>;

    fn reference_notes(&self) -> Vec<ReferenceNote> {
        Vec::new()
    }
}
