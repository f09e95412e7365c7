use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, FromSample, Sample, SampleFormat, SampleRate, SizedSample, StreamConfig,
    SupportedStreamConfig, SupportedStreamConfigRange,
};
use solfa_ports::audio::{AudioError, AudioOutputPort, AudioRenderCallback, AudioStreamHandle};
use solfa_ports::types::{AudioConfig, AudioOutputDevice, DeviceId};
use std::sync::mpsc;
use std::thread;

const FALLBACK_BLOCK_FRAMES: usize = 4096;

/// Output devices of one cpal host. Streams run on their own thread so the
/// non-`Send` cpal stream never leaves it.
pub struct CpalAudioOutputPort {
    host: cpal::Host,
}

impl CpalAudioOutputPort {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    pub fn with_host(host: cpal::Host) -> Self {
        Self { host }
    }
}

impl Default for CpalAudioOutputPort {
    fn default() -> Self {
        Self::new()
    }
}

fn backend<E: std::fmt::Display>(err: E) -> AudioError {
    AudioError::Backend(err.to_string())
}

fn enumerate_outputs(host: &cpal::Host) -> Result<Vec<(DeviceId, cpal::Device)>, AudioError> {
    let host_id = format!("{:?}", host.id());
    Ok(host
        .output_devices()
        .map_err(backend)?
        .enumerate()
        .map(|(index, device)| {
            let name = device_name(&device);
            (DeviceId(format!("cpal:{host_id}:{index}:{name}")), device)
        })
        .collect())
}

fn device_name(device: &cpal::Device) -> String {
    device.name().unwrap_or_else(|_| "Unknown Output".to_string())
}

fn find_output(host: &cpal::Host, device_id: &DeviceId) -> Result<cpal::Device, AudioError> {
    enumerate_outputs(host)?
        .into_iter()
        .find(|(id, _)| id == device_id)
        .map(|(_, device)| device)
        .ok_or_else(|| AudioError::DeviceNotFound(device_id.to_string()))
}

/// Prefer float formats; fall back to the device default when nothing
/// matches the requested channel count and rate.
fn pick_config(
    device: &cpal::Device,
    desired: AudioConfig,
) -> Result<(StreamConfig, SampleFormat), AudioError> {
    let ranges = device.supported_output_configs().map_err(backend)?;
    let chosen = best_match(ranges, desired)
        .or_else(|| device.default_output_config().ok())
        .ok_or_else(|| AudioError::UnsupportedConfig("no usable stream config".to_string()))?;

    let sample_format = chosen.sample_format();
    let mut config = chosen.config();
    config.buffer_size = desired
        .buffer_size_frames
        .map_or(BufferSize::Default, BufferSize::Fixed);
    Ok((config, sample_format))
}

fn best_match(
    ranges: impl Iterator<Item = SupportedStreamConfigRange>,
    desired: AudioConfig,
) -> Option<SupportedStreamConfig> {
    ranges
        .filter(|range| range.channels() == desired.channels)
        .filter(|range| {
            (range.min_sample_rate().0..=range.max_sample_rate().0)
                .contains(&desired.sample_rate_hz)
        })
        .filter_map(|range| {
            let rank = match range.sample_format() {
                SampleFormat::F32 => 3,
                SampleFormat::I16 => 2,
                SampleFormat::U16 => 1,
                _ => return None,
            };
            Some((rank, range))
        })
        .max_by_key(|(rank, _)| *rank)
        .map(|(_, range)| range.with_sample_rate(SampleRate(desired.sample_rate_hz)))
}

/// Scratch stereo buffers handed to the render callback each period.
struct RenderBlock {
    callback: Box<dyn AudioRenderCallback>,
    left: Vec<f32>,
    right: Vec<f32>,
    sample_time: u64,
}

impl RenderBlock {
    fn new(callback: Box<dyn AudioRenderCallback>, frames: usize) -> Self {
        Self {
            callback,
            left: vec![0.0; frames],
            right: vec![0.0; frames],
            sample_time: 0,
        }
    }

    fn fill<T>(&mut self, data: &mut [T], channels: usize)
    where
        T: Sample + FromSample<f32>,
    {
        if channels == 0 {
            return;
        }
        let frames = data.len() / channels;
        if frames > self.left.len() {
            self.left.resize(frames, 0.0);
            self.right.resize(frames, 0.0);
        }
        let (left, right) = (&mut self.left[..frames], &mut self.right[..frames]);
        self.callback.render(self.sample_time, left, right);

        for (frame, out) in data.chunks_exact_mut(channels).enumerate() {
            let (l, r) = (left[frame].clamp(-1.0, 1.0), right[frame].clamp(-1.0, 1.0));
            if channels == 1 {
                out[0] = T::from_sample((l + r) * 0.5);
                continue;
            }
            out[0] = T::from_sample(l);
            out[1] = T::from_sample(r);
            for extra in &mut out[2..] {
                *extra = T::EQUILIBRIUM;
            }
        }
        self.sample_time = self.sample_time.saturating_add(frames as u64);
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut block: RenderBlock,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| block.fill(data, channels),
            |err| tracing::error!(%err, "cpal stream error"),
            None,
        )
        .map_err(backend)
}

fn start_stream(
    device_id: &DeviceId,
    desired: AudioConfig,
    callback: Box<dyn AudioRenderCallback>,
) -> Result<cpal::Stream, AudioError> {
    let host = cpal::default_host();
    let device = find_output(&host, device_id)?;
    let (config, format) = pick_config(&device, desired)?;

    let frames = match config.buffer_size {
        BufferSize::Fixed(frames) => frames as usize,
        BufferSize::Default => FALLBACK_BLOCK_FRAMES,
    };
    let block = RenderBlock::new(callback, frames);
    let stream = match format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, block)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, block)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, block)?,
        other => {
            return Err(AudioError::UnsupportedConfig(format!(
                "sample format {other:?}"
            )))
        }
    };
    stream.play().map_err(backend)?;
    tracing::info!(
        device = %device_id,
        sample_rate = config.sample_rate.0,
        channels = config.channels,
        ?format,
        "output stream running"
    );
    Ok(stream)
}

pub struct CpalAudioStreamHandle {
    stop_tx: mpsc::Sender<()>,
    worker: Option<thread::JoinHandle<()>>,
}

impl AudioStreamHandle for CpalAudioStreamHandle {
    fn close(mut self: Box<Self>) {
        let _ = self.stop_tx.send(());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("audio stream thread panicked");
            }
        }
    }
}

impl AudioOutputPort for CpalAudioOutputPort {
    fn list_outputs(&self) -> Result<Vec<AudioOutputDevice>, AudioError> {
        let mut outputs = Vec::new();
        for (id, device) in enumerate_outputs(&self.host)? {
            let Ok(default) = device.default_output_config() else {
                tracing::debug!(device = %id, "skipping output without default config");
                continue;
            };
            outputs.push(AudioOutputDevice {
                name: device_name(&device),
                id,
                default_config: AudioConfig {
                    sample_rate_hz: default.sample_rate().0,
                    channels: default.channels(),
                    buffer_size_frames: None,
                },
            });
        }
        Ok(outputs)
    }

    fn open_output(
        &self,
        device_id: &DeviceId,
        config: AudioConfig,
        cb: Box<dyn AudioRenderCallback>,
    ) -> Result<Box<dyn AudioStreamHandle>, AudioError> {
        let device_id = device_id.clone();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let worker = thread::Builder::new()
            .name("solfa-audio-out".to_string())
            .spawn(move || match start_stream(&device_id, config, cb) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .map_err(backend)?;

        ready_rx.recv().map_err(backend)??;
        Ok(Box::new(CpalAudioStreamHandle {
            stop_tx,
            worker: Some(worker),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solfa_ports::types::SampleTime;

    struct Ramp;

    impl AudioRenderCallback for Ramp {
        fn render(&mut self, start: SampleTime, out_l: &mut [f32], out_r: &mut [f32]) {
            for (i, (l, r)) in out_l.iter_mut().zip(out_r.iter_mut()).enumerate() {
                *l = 0.5;
                *r = if start == 0 && i == 0 { 2.0 } else { -0.5 };
            }
        }
    }

    #[test]
    fn fills_stereo_and_extra_channels() {
        let mut block = RenderBlock::new(Box::new(Ramp), 1);
        let mut data = [1.0_f32; 8];
        block.fill(&mut data, 4);
        assert_eq!(data, [0.5, 1.0, 0.0, 0.0, 0.5, -0.5, 0.0, 0.0]);
        assert_eq!(block.sample_time, 2);
    }

    #[test]
    fn downmixes_to_mono() {
        let mut block = RenderBlock::new(Box::new(Ramp), 4);
        block.sample_time = 10;
        let mut data = [1.0_f32; 3];
        block.fill(&mut data, 1);
        assert_eq!(data, [0.0, 0.0, 0.0]);
        assert_eq!(block.sample_time, 13);
    }

    #[test]
    fn integer_formats_center_on_silence() {
        let mut block = RenderBlock::new(Box::new(Ramp), 2);
        block.sample_time = 5;
        let mut data = [0_u16; 3];
        block.fill(&mut data, 3);
        assert_eq!(data[2], u16::EQUILIBRIUM);
    }
}
