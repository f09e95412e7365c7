use crate::model::{Speed, TimelineModel, BEAT_EPSILON};
use solfa_ports::timeline::TempoChange;
use solfa_ports::types::{Beat, Seconds};

/// Seconds per quarter-note beat for a tempo entry at the given speed.
pub fn seconds_per_quarter(tempo: &TempoChange, speed: Speed) -> Seconds {
    60.0 / (tempo.bpm * speed.get())
}

impl TimelineModel {
    /// Wall-clock time needed to play from `from` to `to`.
    /// Negative when `to` precedes `from`.
    pub fn seconds_between(&self, from: Beat, to: Beat, speed: Speed) -> Seconds {
        if to < from {
            return -self.seconds_between(to, from, speed);
        }

        let tempos = self.tempos();
        let mut idx = self.tempo_index_at(from);
        let mut cursor = from;
        let mut elapsed = 0.0;
        while cursor < to - BEAT_EPSILON {
            let seg_end = tempos
                .get(idx + 1)
                .map(|next| next.offset)
                .unwrap_or(f64::INFINITY)
                .min(to);
            elapsed += (seg_end - cursor) * seconds_per_quarter(&tempos[idx], speed);
            cursor = seg_end;
            idx += 1;
        }
        elapsed
    }

    /// Beat reached after playing `seconds` starting at `from`.
    pub fn beats_after(&self, from: Beat, seconds: Seconds, speed: Speed) -> Beat {
        let tempos = self.tempos();
        let mut idx = self.tempo_index_at(from);
        let mut cursor = from;
        let mut remaining = seconds.max(0.0);
        loop {
            let spq = seconds_per_quarter(&tempos[idx], speed);
            let Some(next) = tempos.get(idx + 1) else {
                return cursor + remaining / spq;
            };
            if next.offset <= cursor {
                idx += 1;
                continue;
            }
            let seg_seconds = (next.offset - cursor) * spq;
            if remaining <= seg_seconds {
                return cursor + remaining / spq;
            }
            remaining -= seg_seconds;
            cursor = next.offset;
            idx += 1;
        }
    }

    /// Absolute time of `beat` measured from beat 0.
    pub fn beat_to_seconds(&self, beat: Beat, speed: Speed) -> Seconds {
        self.seconds_between(0.0, beat, speed)
    }
}
