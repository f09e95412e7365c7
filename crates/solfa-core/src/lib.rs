pub mod audio_graph;
pub mod audio_params;
pub mod chart;
pub mod click;
pub mod diagnostics;
pub mod ipc;
pub mod playback_engine;
pub mod preview;
pub mod scheduler;
pub mod session;
pub mod task;

pub use audio_graph::*;
pub use audio_params::*;
pub use chart::*;
pub use click::*;
pub use diagnostics::*;
pub use ipc::*;
pub use playback_engine::*;
pub use preview::*;
pub use scheduler::*;
pub use session::*;
pub use task::*;
