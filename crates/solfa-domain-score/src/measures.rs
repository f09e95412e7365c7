use crate::error::ConfigError;
use crate::model::BEAT_EPSILON;
use solfa_ports::timeline::{MeasureInfo, TimeSignatureChange};
use solfa_ports::types::Beat;

/// Build a contiguous measure table from the signature changes alone, for
/// scores that carry no explicit bar list.
///
/// A signature change that lands inside a measure cuts that measure short;
/// the next one starts at the change.
pub fn derive_measures(
    signatures: &[TimeSignatureChange],
    total_beats: Beat,
) -> Result<Vec<MeasureInfo>, ConfigError> {
    if signatures.is_empty() {
        return Err(ConfigError::EmptyTimeSignatureTable);
    }
    let mut sorted = signatures.to_vec();
    sorted.sort_by(|a, b| a.offset.total_cmp(&b.offset));
    for ts in &sorted {
        if ts.numerator == 0 || !ts.denominator.is_power_of_two() {
            return Err(ConfigError::InvalidTimeSignature {
                offset: ts.offset,
                numerator: ts.numerator,
                denominator: ts.denominator,
            });
        }
    }

    let mut measures = Vec::new();
    let mut start = 0.0;
    let mut number = 1;
    let mut idx = 0;
    while start < total_beats - BEAT_EPSILON {
        while sorted
            .get(idx + 1)
            .map_or(false, |next| next.offset <= start + BEAT_EPSILON)
        {
            idx += 1;
        }
        let mut duration = sorted[idx].signature().measure_beats();
        if let Some(next) = sorted.get(idx + 1) {
            duration = duration.min(next.offset - start);
        }
        measures.push(MeasureInfo {
            measure: number,
            start_beat: start,
            duration_beats: duration,
        });
        start += duration;
        number += 1;
    }
    Ok(measures)
}

/// True when every measure starts where the previous one ends.
pub fn is_contiguous(measures: &[MeasureInfo]) -> bool {
    measures
        .windows(2)
        .all(|pair| (pair[0].end_beat() - pair[1].start_beat).abs() <= BEAT_EPSILON)
}
