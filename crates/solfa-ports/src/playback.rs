use crate::audio::AudioError;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RenderMode {
    /// Pre-render one buffer with every click mixed in.
    #[default]
    Offline,
    /// One click per timer tick, re-reading the timeline each beat.
    Realtime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LeadInPattern {
    /// Repeat the first measure of the destination region.
    #[default]
    FirstMeasure,
    /// Repeat a fixed number of beats regardless of the signature.
    FixedBeats(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadInPolicy {
    pub bars: u32,
    pub pattern: LeadInPattern,
    /// Play one bar less when the click is muted.
    pub shorten_when_muted: bool,
}

impl Default for LeadInPolicy {
    fn default() -> Self {
        Self {
            bars: 1,
            pattern: LeadInPattern::FirstMeasure,
            shorten_when_muted: true,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PlaybackError {
    #[error("audio error: {0}")]
    Audio(#[from] AudioError),
    #[error("nothing prepared to play")]
    NotPrepared,
}
