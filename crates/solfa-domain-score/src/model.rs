use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use solfa_ports::timeline::{
    MeasureInfo, MeasureRange, ReferenceNote, ScoreTimelinePort, TempoChange, TimeSignature,
    TimeSignatureChange,
};
use solfa_ports::types::Beat;

/// Tolerance for comparing beat positions that came out of float arithmetic.
pub const BEAT_EPSILON: Beat = 1e-9;

/// Playback speed multiplier, 1.0 = written tempo. Always positive.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Speed(f64);

impl Speed {
    pub const NORMAL: Speed = Speed(1.0);

    pub fn new(value: f64) -> Result<Self, ConfigError> {
        if value.is_finite() && value > 0.0 {
            Ok(Self(value))
        } else {
            Err(ConfigError::NonPositiveSpeed(value))
        }
    }

    pub fn from_percent(percent: u32) -> Result<Self, ConfigError> {
        Self::new(percent as f64 / 100.0)
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

/// Tempo, signature and measure tables of one score part.
///
/// Tables are validated and sorted on construction and never change
/// afterwards; share it behind an `Arc`.
#[derive(Clone, Debug, PartialEq)]
pub struct TimelineModel {
    tempos: Vec<TempoChange>,
    signatures: Vec<TimeSignatureChange>,
    measures: Vec<MeasureInfo>,
    notes: Vec<ReferenceNote>,
}

impl TimelineModel {
    pub fn new(
        mut tempos: Vec<TempoChange>,
        mut signatures: Vec<TimeSignatureChange>,
        mut measures: Vec<MeasureInfo>,
    ) -> Result<Self, ConfigError> {
        if tempos.is_empty() {
            return Err(ConfigError::EmptyTempoTable);
        }
        if signatures.is_empty() {
            return Err(ConfigError::EmptyTimeSignatureTable);
        }

        for tempo in &tempos {
            check_offset(tempo.offset)?;
            if !(tempo.bpm.is_finite() && tempo.bpm > 0.0) {
                return Err(ConfigError::NonPositiveTempo {
                    offset: tempo.offset,
                    bpm: tempo.bpm,
                });
            }
        }
        for ts in &signatures {
            check_offset(ts.offset)?;
            if ts.numerator == 0 || !ts.denominator.is_power_of_two() {
                return Err(ConfigError::InvalidTimeSignature {
                    offset: ts.offset,
                    numerator: ts.numerator,
                    denominator: ts.denominator,
                });
            }
        }

        tempos.sort_by(|a, b| a.offset.total_cmp(&b.offset));
        signatures.sort_by(|a, b| a.offset.total_cmp(&b.offset));
        measures.sort_by_key(|m| m.measure);

        Ok(Self {
            tempos,
            signatures,
            measures,
            notes: Vec::new(),
        })
    }

    pub fn from_port(port: &dyn ScoreTimelinePort) -> Result<Self, ConfigError> {
        Ok(Self::new(
            port.tempo_timeline(),
            port.time_signature_timeline(),
            port.measures(),
        )?
        .with_reference_notes(port.reference_notes()))
    }

    pub fn with_reference_notes(mut self, mut notes: Vec<ReferenceNote>) -> Self {
        notes.sort_by(|a, b| a.offset.total_cmp(&b.offset));
        self.notes = notes;
        self
    }

    pub fn tempos(&self) -> &[TempoChange] {
        &self.tempos
    }

    pub fn signatures(&self) -> &[TimeSignatureChange] {
        &self.signatures
    }

    pub fn measures(&self) -> &[MeasureInfo] {
        &self.measures
    }

    pub fn reference_notes(&self) -> &[ReferenceNote] {
        &self.notes
    }

    /// Index of the latest tempo change at or before `beat`, 0 if `beat`
    /// precedes them all.
    pub fn tempo_index_at(&self, beat: Beat) -> usize {
        self.tempos
            .partition_point(|t| t.offset <= beat + BEAT_EPSILON)
            .saturating_sub(1)
    }

    pub fn signature_index_at(&self, beat: Beat) -> usize {
        self.signatures
            .partition_point(|ts| ts.offset <= beat + BEAT_EPSILON)
            .saturating_sub(1)
    }

    pub fn tempo_at(&self, beat: Beat) -> &TempoChange {
        &self.tempos[self.tempo_index_at(beat)]
    }

    pub fn time_signature_at(&self, beat: Beat) -> &TimeSignatureChange {
        &self.signatures[self.signature_index_at(beat)]
    }

    pub fn signature_at(&self, beat: Beat) -> TimeSignature {
        self.time_signature_at(beat).signature()
    }

    pub fn measure(&self, number: u32) -> Option<&MeasureInfo> {
        self.measures
            .binary_search_by_key(&number, |m| m.measure)
            .ok()
            .map(|idx| &self.measures[idx])
    }

    pub fn measure_to_beat(&self, number: u32) -> Result<Beat, ConfigError> {
        self.measure(number)
            .map(|m| m.start_beat)
            .ok_or(ConfigError::UnknownMeasure(number))
    }

    /// Measure containing `beat`. A beat on a boundary belongs to the
    /// measure starting there; beats outside the table clamp to the first
    /// or last measure.
    pub fn measure_at(&self, beat: Beat) -> Option<&MeasureInfo> {
        let idx = self
            .measures
            .partition_point(|m| m.start_beat <= beat + BEAT_EPSILON)
            .saturating_sub(1);
        self.measures.get(idx)
    }

    pub fn beat_to_measure(&self, beat: Beat) -> Option<u32> {
        self.measure_at(beat).map(|m| m.measure)
    }

    /// `[start, end)` in beats covering the whole of both boundary measures.
    pub fn range_beats(&self, range: MeasureRange) -> Result<(Beat, Beat), ConfigError> {
        let start = self
            .measure(range.start)
            .ok_or(ConfigError::UnknownMeasure(range.start))?;
        let end = self
            .measure(range.end)
            .ok_or(ConfigError::UnknownMeasure(range.end))?;
        let (start_beat, end_beat) = (start.start_beat, end.end_beat());
        if end_beat < start_beat {
            return Err(ConfigError::InvalidRange {
                start: start_beat,
                end: end_beat,
            });
        }
        Ok((start_beat, end_beat))
    }

    /// Pitch of the first reference note sounding at `beat`, ends inclusive.
    pub fn reference_pitch_at(&self, beat: Beat) -> Option<u8> {
        self.notes
            .iter()
            .find(|n| n.offset <= beat && beat <= n.offset + n.duration)
            .map(|n| n.pitch)
    }
}

fn check_offset(offset: Beat) -> Result<(), ConfigError> {
    if offset.is_finite() && offset >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidOffset(offset))
    }
}
