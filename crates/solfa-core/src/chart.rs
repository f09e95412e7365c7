use serde::{Deserialize, Serialize};
use solfa_domain_score::TimelineModel;
use solfa_ports::capture::{PitchSample, RenderedSpan};
use solfa_ports::types::Beat;

/// Reference and sung pitch contours sampled on one beat axis.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub beat_axis: Vec<Beat>,
    pub reference: Vec<Option<f64>>,
    /// Sung pitch as fractional MIDI note numbers.
    pub live: Vec<Option<f64>>,
    pub span: Option<RenderedSpan>,
}

impl ChartData {
    pub fn len(&self) -> usize {
        self.beat_axis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beat_axis.is_empty()
    }
}

pub fn hz_to_midi(hz: f64) -> Option<f64> {
    if hz.is_finite() && hz > 0.0 {
        Some(69.0 + 12.0 * (hz / 440.0).log2())
    } else {
        None
    }
}

pub fn build_chart(
    timeline: &TimelineModel,
    start_beat: Beat,
    end_beat: Beat,
    pitches: &[PitchSample],
    span: Option<RenderedSpan>,
) -> ChartData {
    let points = pitches.len();
    if points == 0 {
        return ChartData {
            span,
            ..ChartData::default()
        };
    }

    let step = (end_beat - start_beat) / points as f64;
    let beat_axis: Vec<Beat> = (0..points).map(|i| start_beat + i as f64 * step).collect();

    let mut labels = Vec::with_capacity(points);
    let mut prev_measure = None;
    for &beat in &beat_axis {
        let measure = timeline.beat_to_measure(beat);
        if measure != prev_measure {
            labels.push(measure.map(|m| format!("Bar {m}")).unwrap_or_default());
        } else {
            labels.push(String::new());
        }
        prev_measure = measure;
    }

    let reference = beat_axis
        .iter()
        .map(|&beat| timeline.reference_pitch_at(beat).map(f64::from))
        .collect();
    let live = pitches.iter().map(|p| hz_to_midi(p.hz)).collect();

    ChartData {
        labels,
        beat_axis,
        reference,
        live,
        span,
    }
}
