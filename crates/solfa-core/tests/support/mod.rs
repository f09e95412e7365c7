#![allow(dead_code)]

use parking_lot::Mutex;
use solfa_domain_score::TimelineModel;
use solfa_ports::audio::{AudioError, AudioSink, SampleBuffer, VoiceId};
use solfa_ports::timeline::{MeasureInfo, TempoChange, TimeSignatureChange};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub enum SinkCall {
    Start { voice: VoiceId, len: usize, gain: f32 },
    Stop(VoiceId),
}

/// Audio sink that only records what it was asked to play.
pub struct RecordingSink {
    sample_rate_hz: u32,
    next_voice: AtomicU64,
    fail: AtomicBool,
    calls: Mutex<Vec<SinkCall>>,
}

impl RecordingSink {
    pub fn new(sample_rate_hz: u32) -> Arc<Self> {
        Arc::new(Self {
            sample_rate_hz,
            next_voice: AtomicU64::new(1),
            fail: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_next_starts(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    pub fn started_gains(&self) -> Vec<f32> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SinkCall::Start { gain, .. } => Some(*gain),
                SinkCall::Stop(_) => None,
            })
            .collect()
    }

    pub fn starts(&self) -> usize {
        self.started_gains().len()
    }
}

impl AudioSink for RecordingSink {
    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    fn start_voice(&self, samples: SampleBuffer, gain: f32) -> Result<VoiceId, AudioError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AudioError::DeviceUnavailable("unplugged".to_string()));
        }
        let voice = VoiceId(self.next_voice.fetch_add(1, Ordering::SeqCst));
        self.calls.lock().push(SinkCall::Start {
            voice,
            len: samples.len(),
            gain,
        });
        Ok(voice)
    }

    fn stop_voice(&self, voice: VoiceId) {
        self.calls.lock().push(SinkCall::Stop(voice));
    }
}

/// Two bars of 4/4 at 120 bpm.
pub fn two_bar_timeline() -> Arc<TimelineModel> {
    Arc::new(
        TimelineModel::new(
            vec![TempoChange {
                offset: 0.0,
                bpm: 120.0,
            }],
            vec![TimeSignatureChange {
                offset: 0.0,
                numerator: 4,
                denominator: 4,
            }],
            vec![
                MeasureInfo {
                    measure: 1,
                    start_beat: 0.0,
                    duration_beats: 4.0,
                },
                MeasureInfo {
                    measure: 2,
                    start_beat: 4.0,
                    duration_beats: 4.0,
                },
            ],
        )
        .expect("timeline"),
    )
}
