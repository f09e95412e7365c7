use crate::scheduler::{Accent, BeatSchedule};
use serde::{Deserialize, Serialize};
use solfa_ports::audio::SampleBuffer;
use solfa_ports::storage::PracticeSettings;
use solfa_ports::types::Seconds;
use std::f32::consts::TAU;
use std::sync::Arc;

const CLICK_FREQ_HZ: f32 = 1_000.0;
const CLICK_SECONDS: f32 = 0.03;
const CLICK_DECAY: f32 = 120.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccentGains {
    pub strong: f32,
    pub weak: f32,
}

impl AccentGains {
    pub fn from_settings(settings: &PracticeSettings) -> Self {
        Self {
            strong: settings.strong_gain.get(),
            weak: settings.weak_gain.get(),
        }
    }

    pub fn gain(&self, accent: Accent) -> f32 {
        match accent {
            Accent::Strong => self.strong,
            Accent::Weak => self.weak,
        }
    }
}

impl Default for AccentGains {
    fn default() -> Self {
        Self {
            strong: 1.0,
            weak: 0.1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ClickSample {
    sample_rate_hz: u32,
    samples: SampleBuffer,
}

impl ClickSample {
    pub fn synth(sample_rate_hz: u32) -> Self {
        let sr = sample_rate_hz.max(1) as f32;
        let len = (sr * CLICK_SECONDS) as usize;
        let samples: Vec<f32> = (0..len)
            .map(|i| {
                let t = i as f32 / sr;
                (t * CLICK_FREQ_HZ * TAU).sin() * (-t * CLICK_DECAY).exp()
            })
            .collect();
        Self::from_samples(sample_rate_hz, samples)
    }

    pub fn from_samples(sample_rate_hz: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate_hz,
            samples: Arc::from(samples),
        }
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn samples(&self) -> &SampleBuffer {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

pub fn seconds_to_samples(seconds: Seconds, sample_rate_hz: u32) -> usize {
    if seconds <= 0.0 {
        return 0;
    }
    (seconds * sample_rate_hz as f64).round() as usize
}

// Clicks near the end are cut at the buffer end.
pub fn render_click_track(
    schedule: &BeatSchedule,
    click: &ClickSample,
    gains: AccentGains,
) -> Vec<f32> {
    let sample_rate = click.sample_rate_hz();
    let len = (schedule.total_seconds() * sample_rate as f64).ceil().max(0.0) as usize;
    let mut output = vec![0.0_f32; len];
    for event in &schedule.events {
        let start = seconds_to_samples(event.time, sample_rate);
        mix_at(&mut output, start, click.samples(), gains.gain(event.accent));
    }
    output
}

pub fn mix_at(output: &mut [f32], start: usize, source: &[f32], gain: f32) {
    if start >= output.len() {
        return;
    }
    let n = source.len().min(output.len() - start);
    for (out, sample) in output[start..start + n].iter_mut().zip(&source[..n]) {
        *out += sample * gain;
    }
}
