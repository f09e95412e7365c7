use crate::audio_params::AudioParams;
use parking_lot::Mutex;
use rtrb::{Consumer, Producer, RingBuffer};
use solfa_ports::audio::{
    AudioError, AudioOutputPort, AudioRenderCallback, AudioSink, AudioStreamHandle, SampleBuffer,
    VoiceId,
};
use solfa_ports::types::{AudioConfig, DeviceId, SampleTime};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

const COMMAND_QUEUE_CAPACITY: usize = 1024;
const MAX_VOICES: usize = 64;

pub struct AudioClock {
    sample_time: AtomicU64,
}

impl AudioClock {
    pub fn new() -> Self {
        Self {
            sample_time: AtomicU64::new(0),
        }
    }

    pub fn set(&self, sample_time: SampleTime) {
        self.sample_time.store(sample_time, Ordering::Relaxed);
    }

    pub fn get(&self) -> SampleTime {
        self.sample_time.load(Ordering::Relaxed)
    }
}

impl Default for AudioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub enum MixerCommand {
    Start {
        voice: VoiceId,
        samples: SampleBuffer,
        gain: f32,
    },
    Stop {
        voice: VoiceId,
    },
    StopAll,
}

struct ActiveVoice {
    id: VoiceId,
    samples: SampleBuffer,
    position: usize,
    gain: f32,
}

/// Audio-thread side of the sink: plays sample buffers started from the
/// control thread and sums them into the output.
pub struct ClickMixer {
    params: Arc<AudioParams>,
    clock: Arc<AudioClock>,
    consumer: Consumer<MixerCommand>,
    voices: Vec<ActiveVoice>,
    limiter_gain: f32,
}

impl ClickMixer {
    pub fn new(
        params: Arc<AudioParams>,
        consumer: Consumer<MixerCommand>,
        clock: Arc<AudioClock>,
    ) -> Self {
        Self {
            params,
            clock,
            consumer,
            voices: Vec::with_capacity(MAX_VOICES),
            limiter_gain: 1.0,
        }
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    fn apply_commands(&mut self) {
        while let Ok(command) = self.consumer.pop() {
            match command {
                MixerCommand::Start {
                    voice,
                    samples,
                    gain,
                } => {
                    if self.voices.len() >= MAX_VOICES {
                        // Oldest voice goes first.
                        self.voices.remove(0);
                    }
                    self.voices.push(ActiveVoice {
                        id: voice,
                        samples,
                        position: 0,
                        gain,
                    });
                }
                MixerCommand::Stop { voice } => self.voices.retain(|v| v.id != voice),
                MixerCommand::StopAll => self.voices.clear(),
            }
        }
    }

    fn apply_limiter(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        let limit = 0.98_f32;
        let peak = out_l
            .iter()
            .chain(out_r.iter())
            .fold(0.0_f32, |peak, value| peak.max(value.abs()));

        let target_gain = if peak > limit { limit / peak } else { 1.0 };
        let current_gain = self.limiter_gain;
        let coeff = if target_gain < current_gain { 0.25 } else { 0.01 };
        let new_gain = (current_gain + coeff * (target_gain - current_gain)).clamp(0.0, 1.0);
        self.limiter_gain = new_gain;

        if new_gain < 0.999 {
            for value in out_l.iter_mut().chain(out_r.iter_mut()) {
                *value *= new_gain;
            }
        }
    }
}

impl AudioRenderCallback for ClickMixer {
    fn render(&mut self, sample_time_start: SampleTime, out_l: &mut [f32], out_r: &mut [f32]) {
        let frames = out_l.len().min(out_r.len());
        self.apply_commands();

        out_l.fill(0.0);
        out_r.fill(0.0);

        let master = self.params.master();
        for voice in &mut self.voices {
            let remaining = voice.samples.len().saturating_sub(voice.position);
            let n = remaining.min(frames);
            let source = &voice.samples[voice.position..voice.position + n];
            for (i, sample) in source.iter().enumerate() {
                let value = sample * voice.gain * master;
                out_l[i] += value;
                out_r[i] += value;
            }
            voice.position += n;
        }
        self.voices.retain(|v| v.position < v.samples.len());

        self.apply_limiter(&mut out_l[..frames], &mut out_r[..frames]);
        self.clock
            .set(sample_time_start.saturating_add(frames as u64));
    }
}

pub struct MixerSink {
    sample_rate_hz: u32,
    producer: Mutex<Producer<MixerCommand>>,
    next_voice: AtomicU64,
    stream: Mutex<Option<Box<dyn AudioStreamHandle>>>,
    closed: AtomicBool,
}

impl MixerSink {
    pub fn detached(
        sample_rate_hz: u32,
        params: Arc<AudioParams>,
        clock: Arc<AudioClock>,
    ) -> (Self, ClickMixer) {
        let (producer, consumer) = RingBuffer::new(COMMAND_QUEUE_CAPACITY);
        let sink = Self {
            sample_rate_hz,
            producer: Mutex::new(producer),
            next_voice: AtomicU64::new(1),
            stream: Mutex::new(None),
            closed: AtomicBool::new(false),
        };
        (sink, ClickMixer::new(params, consumer, clock))
    }

    pub fn open(
        port: &dyn AudioOutputPort,
        device_id: &DeviceId,
        config: AudioConfig,
        params: Arc<AudioParams>,
        clock: Arc<AudioClock>,
    ) -> Result<Self, AudioError> {
        let (sink, mixer) = Self::detached(config.sample_rate_hz, params, clock);
        let stream = port.open_output(device_id, config, Box::new(mixer))?;
        *sink.stream.lock() = Some(stream);
        tracing::info!(device = %device_id, sample_rate = config.sample_rate_hz, "audio sink opened");
        Ok(sink)
    }

    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.producer.lock().push(MixerCommand::StopAll);
        if let Some(stream) = self.stream.lock().take() {
            stream.close();
        }
        tracing::info!("audio sink closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn send(&self, command: MixerCommand) -> Result<(), AudioError> {
        if self.is_closed() {
            return Err(AudioError::Closed);
        }
        self.producer
            .lock()
            .push(command)
            .map_err(|_| AudioError::Backend("mixer command queue full".to_string()))
    }
}

impl AudioSink for MixerSink {
    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    fn start_voice(&self, samples: SampleBuffer, gain: f32) -> Result<VoiceId, AudioError> {
        let voice = VoiceId(self.next_voice.fetch_add(1, Ordering::Relaxed));
        self.send(MixerCommand::Start {
            voice,
            samples,
            gain,
        })?;
        Ok(voice)
    }

    fn stop_voice(&self, voice: VoiceId) {
        if let Err(err) = self.send(MixerCommand::Stop { voice }) {
            tracing::debug!(?voice, %err, "stop ignored");
        }
    }
}

impl Drop for MixerSink {
    fn drop(&mut self) {
        self.close();
    }
}
