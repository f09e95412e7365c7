use crate::chart::ChartData;
use crate::session::SessionPhase;
use serde::{Deserialize, Serialize};
use solfa_ports::capture::SessionToken;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    PhaseChanged {
        token: SessionToken,
        phase: SessionPhase,
    },
    CountdownUpdated {
        token: SessionToken,
        remaining_beats: u32,
    },
    RecordingStarted {
        token: SessionToken,
    },
    PlaybackStateChanged {
        playing: bool,
    },
    ChartReady {
        token: SessionToken,
        chart: ChartData,
    },
    ErrorSurfaced {
        message: String,
    },
    Cancelled {
        token: SessionToken,
        message: String,
    },
    ReplayChanged {
        replaying: bool,
    },
}
