use crate::types::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum AudioError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("unsupported config: {0}")]
    UnsupportedConfig(String),
    #[error("sink closed")]
    Closed,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Audio callback: must be realtime-safe.
pub trait AudioRenderCallback: Send + 'static {
    fn render(&mut self, sample_time_start: SampleTime, out_l: &mut [f32], out_r: &mut [f32]);
}

pub trait AudioStreamHandle: Send {
    fn close(self: Box<Self>);
}

pub trait AudioOutputPort: Send + Sync {
    fn list_outputs(&self) -> Result<Vec<AudioOutputDevice>, AudioError>;

    fn open_output(
        &self,
        device_id: &DeviceId,
        config: AudioConfig,
        cb: Box<dyn AudioRenderCallback>,
    ) -> Result<Box<dyn AudioStreamHandle>, AudioError>;

    fn default_output(&self) -> Result<AudioOutputDevice, AudioError> {
        self.list_outputs()?
            .into_iter()
            .next()
            .ok_or_else(|| AudioError::DeviceNotFound("no output devices".to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoiceId(pub u64);

/// Mono sample data shared between the control thread and the audio thread.
pub type SampleBuffer = Arc<[f32]>;

/// Process-wide sound output used by the playback engine.
///
/// Thread model: every method is called from the control thread; the
/// implementation forwards work to its audio thread without blocking.
pub trait AudioSink: Send + Sync {
    fn sample_rate_hz(&self) -> u32;

    /// Start a voice playing `samples` once from its first frame.
    fn start_voice(&self, samples: SampleBuffer, gain: f32) -> Result<VoiceId, AudioError>;

    /// Stop a voice. Unknown or finished voices are ignored.
    fn stop_voice(&self, voice: VoiceId);

    /// Fire-and-forget one-shot, used for realtime clicks.
    fn trigger(&self, samples: SampleBuffer, gain: f32) -> Result<(), AudioError> {
        self.start_voice(samples, gain).map(|_| ())
    }
}
