use crate::playback::{LeadInPolicy, RenderMode};
use crate::types::*;
use serde::{Deserialize, Serialize};

fn default_speed_percent() -> u32 {
    100
}

fn default_click_enabled() -> bool {
    true
}

fn default_latency_compensation_ms() -> u32 {
    1000
}

fn default_strong_gain() -> Volume01 {
    Volume01::new(1.0)
}

fn default_weak_gain() -> Volume01 {
    Volume01::new(0.1)
}

fn default_master_volume() -> Volume01 {
    Volume01::new(0.8)
}

fn default_sample_rate_hz() -> u32 {
    48_000
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PracticeSettings {
    #[serde(default = "default_speed_percent")]
    pub speed_percent: u32,
    #[serde(default = "default_click_enabled")]
    pub click_enabled: bool,
    pub lead_in: LeadInPolicy,
    #[serde(default = "default_latency_compensation_ms")]
    pub latency_compensation_ms: u32,
    #[serde(default = "default_strong_gain")]
    pub strong_gain: Volume01,
    #[serde(default = "default_weak_gain")]
    pub weak_gain: Volume01,
    #[serde(default = "default_master_volume")]
    pub master_volume: Volume01,
    pub render_mode: RenderMode,
    pub selected_audio_out: Option<DeviceId>,
    #[serde(default = "default_sample_rate_hz")]
    pub sample_rate_hz: u32,
}

impl PracticeSettings {
    pub fn speed(&self) -> f64 {
        self.speed_percent as f64 / 100.0
    }
}

impl Default for PracticeSettings {
    fn default() -> Self {
        Self {
            speed_percent: default_speed_percent(),
            click_enabled: default_click_enabled(),
            lead_in: LeadInPolicy::default(),
            latency_compensation_ms: default_latency_compensation_ms(),
            strong_gain: default_strong_gain(),
            weak_gain: default_weak_gain(),
            master_volume: default_master_volume(),
            render_mode: RenderMode::default(),
            selected_audio_out: None,
            sample_rate_hz: default_sample_rate_hz(),
        }
    }
}

pub trait StoragePort: Send + Sync {
    fn load_settings(&self) -> Result<PracticeSettings, StorageError>;
    fn save_settings(&self, s: &PracticeSettings) -> Result<(), StorageError>;
}
