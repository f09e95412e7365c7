use solfa_ports::audio::{AudioError, AudioSink, SampleBuffer, VoiceId};
use solfa_ports::timeline::ReferenceNote;
use std::f32::consts::TAU;
use std::sync::Arc;

const PREVIEW_SECONDS: f32 = 1.0;
const PREVIEW_GAIN: f32 = 0.5;
const FADE_SECONDS: f32 = 0.01;

pub fn midi_to_hz(pitch: u8) -> f32 {
    440.0 * 2f32.powf((pitch as f32 - 69.0) / 12.0)
}

/// Sine tone with short linear fades so it starts and stops without a pop.
pub fn sine_tone(pitch: u8, sample_rate_hz: u32, seconds: f32) -> SampleBuffer {
    let sr = sample_rate_hz.max(1) as f32;
    let len = (sr * seconds).max(0.0) as usize;
    let fade = ((sr * FADE_SECONDS) as usize).max(1);
    let freq = midi_to_hz(pitch);
    let samples: Vec<f32> = (0..len)
        .map(|i| {
            let edge = i.min(len - 1 - i);
            let env = (edge as f32 / fade as f32).min(1.0);
            (i as f32 / sr * freq * TAU).sin() * env
        })
        .collect();
    Arc::from(samples)
}

#[derive(Debug, Default)]
pub struct NotePreview {
    voice: Option<VoiceId>,
}

impl NotePreview {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn preview_note(
        &mut self,
        sink: &dyn AudioSink,
        notes: &[ReferenceNote],
    ) -> Result<Option<ReferenceNote>, AudioError> {
        self.stop(sink);
        let Some(first) = notes.iter().min_by(|a, b| a.offset.total_cmp(&b.offset)) else {
            return Ok(None);
        };
        let tone = sine_tone(first.pitch, sink.sample_rate_hz(), PREVIEW_SECONDS);
        self.voice = Some(sink.start_voice(tone, PREVIEW_GAIN)?);
        tracing::debug!(pitch = first.pitch, "note preview");
        Ok(Some(*first))
    }

    pub fn stop(&mut self, sink: &dyn AudioSink) {
        if let Some(voice) = self.voice.take() {
            sink.stop_voice(voice);
        }
    }

    pub fn is_active(&self) -> bool {
        self.voice.is_some()
    }
}
