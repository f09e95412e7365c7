use crate::timeline::MeasureRange;
use crate::types::Seconds;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("pitch extraction failed: {0}")]
    Extraction(String),
    #[error("timing lookup failed: {0}")]
    Timing(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// Identifies one recording attempt. Issued in increasing order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionToken(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub range: MeasureRange,
    /// Multiplier, 1.0 = written tempo.
    pub speed: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PitchSample {
    pub time: Seconds,
    /// 0 or negative when unvoiced.
    pub hz: f64,
}

/// Where the selected range sits in the rendered reference audio.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderedSpan {
    pub start_time: Seconds,
    pub duration: Seconds,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ServiceCompletion {
    Captured {
        token: SessionToken,
        result: Result<(), ServiceError>,
    },
    Pitches {
        token: SessionToken,
        result: Result<Vec<PitchSample>, ServiceError>,
    },
    Span {
        token: SessionToken,
        result: Result<RenderedSpan, ServiceError>,
    },
}

impl ServiceCompletion {
    pub fn token(&self) -> SessionToken {
        match self {
            ServiceCompletion::Captured { token, .. }
            | ServiceCompletion::Pitches { token, .. }
            | ServiceCompletion::Span { token, .. } => *token,
        }
    }
}

/// Adapters report finished work through this callback, possibly from a
/// background thread.
pub type CompletionCallback = Arc<dyn Fn(ServiceCompletion) + Send + Sync + 'static>;

/// Audio capture and pitch extraction backend.
///
/// Requests return as soon as the work is queued; results arrive later
/// through the completion callback tagged with the request token.
pub trait CapturePort: Send + Sync {
    fn begin_capture(
        &self,
        token: SessionToken,
        request: CaptureRequest,
        done: CompletionCallback,
    ) -> Result<(), ServiceError>;

    fn cancel_capture(&self) -> Result<(), ServiceError>;

    fn extract_pitches(
        &self,
        token: SessionToken,
        range: MeasureRange,
        done: CompletionCallback,
    ) -> Result<(), ServiceError>;
}

pub trait TimingPort: Send + Sync {
    fn rendered_span(
        &self,
        token: SessionToken,
        range: MeasureRange,
        speed: f64,
        done: CompletionCallback,
    ) -> Result<(), ServiceError>;
}
