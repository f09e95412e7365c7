use serde::{Deserialize, Serialize};
use solfa_domain_score::{seconds_per_quarter, ConfigError, Speed, TimelineModel, BEAT_EPSILON};
use solfa_ports::playback::{LeadInPattern, LeadInPolicy};
use solfa_ports::timeline::{MeasureRange, TimeSignatureChange};
use solfa_ports::types::{Beat, Seconds};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Accent {
    Strong,
    Weak,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum BeatKind {
    LeadIn { bar: u32, index: u32 },
    Main { beat: Beat },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BeatEvent {
    pub time: Seconds,
    pub accent: Accent,
    pub kind: BeatKind,
}

impl BeatEvent {
    pub fn is_lead_in(&self) -> bool {
        matches!(self.kind, BeatKind::LeadIn { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduleRequest {
    pub start_beat: Beat,
    pub end_beat: Beat,
    pub speed: f64,
    pub lead_in: LeadInPolicy,
    pub click_enabled: bool,
}

impl ScheduleRequest {
    pub fn for_range(
        timeline: &TimelineModel,
        range: MeasureRange,
        speed: f64,
        lead_in: LeadInPolicy,
        click_enabled: bool,
    ) -> Result<Self, ConfigError> {
        let (start_beat, end_beat) = timeline.range_beats(range)?;
        Ok(Self {
            start_beat,
            end_beat,
            speed,
            lead_in,
            click_enabled,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BeatSchedule {
    pub events: Vec<BeatEvent>,
    pub lead_in_events: usize,
    pub lead_in_seconds: Seconds,
    // Counted even when the main pass was muted.
    pub main_seconds: Seconds,
}

impl BeatSchedule {
    pub fn lead_in(&self) -> &[BeatEvent] {
        &self.events[..self.lead_in_events]
    }

    pub fn main(&self) -> &[BeatEvent] {
        &self.events[self.lead_in_events..]
    }

    pub fn total_seconds(&self) -> Seconds {
        self.lead_in_seconds + self.main_seconds
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.total_seconds() <= 0.0
    }
}

#[derive(Clone, Debug)]
pub struct BeatScheduler {
    timeline: Arc<TimelineModel>,
}

impl BeatScheduler {
    pub fn new(timeline: Arc<TimelineModel>) -> Self {
        Self { timeline }
    }

    pub fn timeline(&self) -> &Arc<TimelineModel> {
        &self.timeline
    }

    pub fn schedule(&self, request: &ScheduleRequest) -> Result<BeatSchedule, ConfigError> {
        let speed = Speed::new(request.speed)?;
        let (start, end) = (request.start_beat, request.end_beat);
        if !(start.is_finite() && end.is_finite()) || start < 0.0 || end < start {
            return Err(ConfigError::InvalidRange { start, end });
        }
        if end - start <= BEAT_EPSILON {
            return Ok(BeatSchedule::default());
        }

        let mut schedule = BeatSchedule::default();
        self.push_lead_in(&mut schedule, request, speed);
        self.push_main(&mut schedule, request, speed);

        tracing::debug!(
            start,
            end,
            events = schedule.events.len(),
            lead_in = schedule.lead_in_events,
            seconds = schedule.total_seconds(),
            "beat schedule built"
        );
        Ok(schedule)
    }

    fn push_lead_in(&self, schedule: &mut BeatSchedule, request: &ScheduleRequest, speed: Speed) {
        let policy = request.lead_in;
        let mut bars = policy.bars;
        if !request.click_enabled && policy.shorten_when_muted {
            bars = bars.saturating_sub(1);
        }

        let ts = self.timeline.time_signature_at(request.start_beat);
        let tempo = self.timeline.tempo_at(request.start_beat);
        let seconds_per_beat = seconds_per_quarter(tempo, speed) * ts.signature().beat_unit();
        let beats_per_bar = match policy.pattern {
            LeadInPattern::FirstMeasure => self.first_measure_beats(request.start_beat, ts),
            LeadInPattern::FixedBeats(beats) => beats,
        };

        let mut time = 0.0;
        for bar in 0..bars {
            for index in 0..beats_per_bar {
                schedule.events.push(BeatEvent {
                    time,
                    accent: accent_for_index(index as i64, ts.numerator),
                    kind: BeatKind::LeadIn { bar, index },
                });
                time += seconds_per_beat;
            }
        }
        schedule.lead_in_events = schedule.events.len();
        schedule.lead_in_seconds = time;
    }

    // Pickup bars count in with their own, shorter length.
    fn first_measure_beats(&self, start_beat: Beat, ts: &TimeSignatureChange) -> u32 {
        match self.timeline.measure_at(start_beat) {
            Some(m) if (m.start_beat - start_beat).abs() <= BEAT_EPSILON => {
                let beats = (m.duration_beats / ts.signature().beat_unit()).round();
                (beats as u32).max(1)
            }
            _ => ts.numerator,
        }
    }

    fn push_main(&self, schedule: &mut BeatSchedule, request: &ScheduleRequest, speed: Speed) {
        let tempos = self.timeline.tempos();
        let signatures = self.timeline.signatures();
        let end = request.end_beat;

        let mut tempo_idx = self.timeline.tempo_index_at(request.start_beat);
        let mut ts_idx = self.timeline.signature_index_at(request.start_beat);
        let mut cursor = request.start_beat;
        let mut clock = schedule.lead_in_seconds;

        while cursor < end - BEAT_EPSILON {
            let next_tempo = tempos.get(tempo_idx + 1).map(|t| t.offset);
            let next_ts = signatures.get(ts_idx + 1).map(|ts| ts.offset);
            let next_change = next_tempo
                .unwrap_or(f64::INFINITY)
                .min(next_ts.unwrap_or(f64::INFINITY))
                .min(end);

            if next_change <= cursor + BEAT_EPSILON {
                // A change point sits exactly on the cursor: step past it and
                // re-read the active tempo/signature.
                let mut advanced = false;
                if next_tempo.map_or(false, |offset| offset <= cursor + BEAT_EPSILON) {
                    tempo_idx += 1;
                    advanced = true;
                }
                if next_ts.map_or(false, |offset| offset <= cursor + BEAT_EPSILON) {
                    ts_idx += 1;
                    advanced = true;
                }
                if !advanced {
                    break;
                }
                continue;
            }

            let ts = &signatures[ts_idx];
            let spq = seconds_per_quarter(&tempos[tempo_idx], speed);
            if request.click_enabled {
                let unit = ts.signature().beat_unit();
                let mut beat = first_grid_beat(&self.timeline, cursor, ts);
                while beat < next_change - BEAT_EPSILON {
                    schedule.events.push(BeatEvent {
                        time: clock + (beat - cursor) * spq,
                        accent: accent_at(&self.timeline, beat, ts),
                        kind: BeatKind::Main { beat },
                    });
                    beat += unit;
                }
            }

            clock += (next_change - cursor) * spq;
            cursor = next_change;
        }

        schedule.main_seconds = clock - schedule.lead_in_seconds;
    }
}

fn accent_for_index(index: i64, numerator: u32) -> Accent {
    if index.rem_euclid(numerator.max(1) as i64) == 0 {
        Accent::Strong
    } else {
        Accent::Weak
    }
}

/// Start of the beat grid around `beat`: the start of its measure when the
/// measure table covers it and the measure begins under `ts`, otherwise the
/// signature change itself.
pub fn grid_anchor(timeline: &TimelineModel, beat: Beat, ts: &TimeSignatureChange) -> Beat {
    match timeline.measure_at(beat) {
        Some(m)
            if m.start_beat <= beat + BEAT_EPSILON
                && beat < m.end_beat() - BEAT_EPSILON
                && m.start_beat >= ts.offset - BEAT_EPSILON =>
        {
            m.start_beat
        }
        _ => ts.offset,
    }
}

pub fn first_grid_beat(timeline: &TimelineModel, from: Beat, ts: &TimeSignatureChange) -> Beat {
    let anchor = grid_anchor(timeline, from, ts);
    let unit = ts.signature().beat_unit();
    let steps = ((from - anchor) / unit - BEAT_EPSILON).ceil().max(0.0);
    anchor + steps * unit
}

pub fn accent_at(timeline: &TimelineModel, beat: Beat, ts: &TimeSignatureChange) -> Accent {
    let anchor = grid_anchor(timeline, beat, ts);
    let index = ((beat - anchor) / ts.signature().beat_unit()).round() as i64;
    accent_for_index(index, ts.numerator)
}
